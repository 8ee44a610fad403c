/*
 * Work Stealing
 *
 * When a core runs out of work, it scans the other cores for one movable
 * entity instead of idling until the next balance pass. At most one
 * entity is stolen per invocation; the accounting of the source's
 * running entity is flushed before the victim leaves, the same path an
 * ordinary dequeue takes.
 */

use crate::entity::EntityRef;
use crate::policy::RrScheduler;
use crate::run_queue::lock_pair;
use crate::smp::can_move;
use crate::traits::KernelCtx;
use crate::types::CoreId;

impl RrScheduler {
    /// Try to pull one runnable entity onto the idle `target` core.
    /// Returns whether anything was stolen.
    pub fn steal_for(&self, ctx: &dyn KernelCtx, target: CoreId) -> bool {
        let tgt_cq = self.core_queue(target);

        for src_cq in self.cores() {
            let source = src_cq.core();
            if source == target {
                continue;
            }
            if !ctx.core_online(source) {
                continue;
            }
            #[cfg(feature = "groups")]
            if self.group_scheduling() && src_cq.serves() != tgt_cq.serves() {
                continue;
            }

            let irq = ctx.irq_save();
            let stolen = {
                let (mut src_rq, mut tgt_rq) = lock_pair(src_cq, tgt_cq);
                if src_rq.is_empty() {
                    false
                } else {
                    let candidate: Option<EntityRef> = src_rq
                        .iter()
                        .find(|ent| {
                            can_move(ctx, ent, &src_rq, source, target)
                                && ctx.governs(ent.id())
                        })
                        .cloned();
                    match candidate {
                        Some(ent) => {
                            self.update_curr(ctx, source, &src_rq);
                            self.move_entity_locked(
                                ctx, &ent, source, target, &mut src_rq, &mut tgt_rq,
                            );
                            ctx.request_resched(target);
                            log::debug!(
                                "idle core {} stole entity {:?} from core {}",
                                target.0,
                                ent.id(),
                                source.0
                            );
                            true
                        }
                        None => false,
                    }
                }
            };
            ctx.irq_restore(irq);

            if stolen {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fill_core, TestCtx};

    #[test]
    fn test_steals_exactly_one_entity() {
        let sched = RrScheduler::new(3);
        let ctx = TestCtx::new(3);
        let ents = fill_core(&sched, &ctx, 0, 2);
        fill_core(&sched, &ctx, 1, 1);

        assert!(sched.steal_for(&ctx, CoreId(2)));
        assert_eq!(sched.queue_len(CoreId(2)), 1);
        assert_eq!(sched.queue_len(CoreId(0)), 1);
        assert_eq!(sched.queue_len(CoreId(1)), 1);
        assert_eq!(ents[0].assigned_core(), CoreId(2));
        assert_eq!(ctx.take_resched(), [CoreId(2)]);
        assert_eq!(ctx.irq_depth(), 0);
    }

    #[test]
    fn test_empty_sources_leave_everything_untouched() {
        let sched = RrScheduler::new(3);
        let ctx = TestCtx::new(3);

        assert!(!sched.steal_for(&ctx, CoreId(2)));
        for core in 0..3 {
            assert_eq!(sched.queue_len(CoreId(core)), 0);
        }
        assert!(ctx.take_resched().is_empty());
    }

    #[test]
    fn test_affinity_excluding_target_blocks_the_steal() {
        let sched = RrScheduler::new(2);
        let ctx = TestCtx::new(2);
        let ents = fill_core(&sched, &ctx, 0, 2);
        for ent in &ents {
            ctx.set_affinity(ent.id(), &[CoreId(0)]);
        }

        assert!(!sched.steal_for(&ctx, CoreId(1)));
        assert_eq!(sched.queue_len(CoreId(0)), 2);
        assert_eq!(sched.queue_len(CoreId(1)), 0);
    }

    #[test]
    fn test_source_current_entity_is_not_stolen() {
        let sched = RrScheduler::new(2);
        let ctx = TestCtx::new(2);
        let ents = fill_core(&sched, &ctx, 0, 2);
        let curr = crate::traits::SchedPolicy::pick_next_task(&sched, &ctx, CoreId(0)).unwrap();
        assert_eq!(curr.id(), ents[0].id());

        assert!(sched.steal_for(&ctx, CoreId(1)));
        // The executing head stays; the second entity moves.
        assert_eq!(ents[0].assigned_core(), CoreId(0));
        assert_eq!(ents[1].assigned_core(), CoreId(1));
    }

    #[test]
    fn test_foreign_policy_entities_are_skipped() {
        let sched = RrScheduler::new(2);
        let ctx = TestCtx::new(2);
        let ents = fill_core(&sched, &ctx, 0, 1);
        ctx.set_foreign(ents[0].id());

        assert!(!sched.steal_for(&ctx, CoreId(1)));
        assert_eq!(sched.queue_len(CoreId(0)), 1);
    }

    #[cfg(feature = "groups")]
    #[test]
    fn test_group_mismatch_blocks_the_steal() {
        use crate::types::GroupMask;

        let sched =
            RrScheduler::with_group_map(&[GroupMask::BACKGROUND, GroupMask::FOREGROUND]);
        let ctx = TestCtx::new(2);
        fill_core(&sched, &ctx, 0, 2);

        // Core 1 serves a different partition than core 0.
        assert!(!sched.steal_for(&ctx, CoreId(1)));
        assert_eq!(sched.queue_len(CoreId(0)), 2);
        assert_eq!(sched.queue_len(CoreId(1)), 0);
    }
}
