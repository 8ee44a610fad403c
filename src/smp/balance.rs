/*
 * Load Balancer
 *
 * Periodic pass, driven by the host on a fixed interval. Per scheduling
 * group (or once, ungrouped): find the most- and least-loaded serving
 * cores from the racy mirrors, and when they differ by more than one
 * entity, migrate exactly one movable entity after rechecking the
 * imbalance under both locks. Deliberately gentle: one migration per
 * group per pass, never a full rebalance.
 */

use crate::entity::EntityRef;
use crate::policy::RrScheduler;
use crate::run_queue::{lock_pair, CoreQueue};
use crate::smp::can_move;
use crate::traits::KernelCtx;
use crate::types::CoreId;

struct CoreLoad {
    core: CoreId,
    nr: usize,
}

impl RrScheduler {
    /// One balancing pass over every scheduling group.
    pub fn load_balance(&self, ctx: &dyn KernelCtx) {
        log::trace!("starting load balance pass");
        #[cfg(feature = "groups")]
        if self.group_scheduling() {
            for group in [
                crate::types::SchedGroup::Foreground,
                crate::types::SchedGroup::Background,
            ] {
                self.balance_one(ctx, |cq| cq.serves().contains(group.service_mask()));
                log::trace!("finished balancing group {:?}", group);
            }
            return;
        }
        self.balance_one(ctx, |_| true);
    }

    /// Balance within one partition of cores; `serves` filters the cores
    /// eligible for this pass.
    fn balance_one(&self, ctx: &dyn KernelCtx, serves: impl Fn(&CoreQueue) -> bool) {
        let mut eligible = 0usize;
        let mut max: Option<CoreLoad> = None;
        let mut min: Option<CoreLoad> = None;

        for cq in self.cores() {
            if !ctx.core_online(cq.core()) {
                continue;
            }
            if !serves(cq) {
                continue;
            }
            let nr = cq.load();
            if max.as_ref().is_none_or(|m| nr > m.nr) {
                max = Some(CoreLoad { core: cq.core(), nr });
            }
            if min.as_ref().is_none_or(|m| nr < m.nr) {
                min = Some(CoreLoad { core: cq.core(), nr });
            }
            eligible += 1;
        }
        if eligible < 2 {
            return;
        }
        let (Some(max), Some(min)) = (max, min) else {
            return;
        };
        // More than one entity of difference counts as imbalance.
        if max.nr <= min.nr + 1 {
            log::trace!("cores balanced, no migration");
            return;
        }

        let irq = ctx.irq_save();
        {
            let (mut src_rq, mut dst_rq) =
                lock_pair(self.core_queue(max.core), self.core_queue(min.core));

            // The mirrors were stale if the imbalance is gone now.
            if src_rq.len() > dst_rq.len() + 1 {
                let candidate: Option<EntityRef> = src_rq
                    .iter()
                    .find(|ent| can_move(ctx, ent, &src_rq, max.core, min.core))
                    .cloned();
                if let Some(ent) = candidate {
                    self.move_entity_locked(ctx, &ent, max.core, min.core, &mut src_rq, &mut dst_rq);
                    log::debug!(
                        "balanced entity {:?} from core {} to core {}",
                        ent.id(),
                        max.core.0,
                        min.core.0
                    );
                }
            } else {
                log::trace!("imbalance resolved before locking");
            }
        }
        ctx.irq_restore(irq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fill_core, TestCtx};

    #[test]
    fn test_no_migration_within_threshold() {
        let sched = RrScheduler::new(2);
        let ctx = TestCtx::new(2);
        fill_core(&sched, &ctx, 0, 2);
        fill_core(&sched, &ctx, 1, 1);

        sched.load_balance(&ctx);
        assert_eq!(sched.queue_len(CoreId(0)), 2);
        assert_eq!(sched.queue_len(CoreId(1)), 1);
    }

    #[test]
    fn test_exactly_one_migration_past_threshold() {
        let sched = RrScheduler::new(2);
        let ctx = TestCtx::new(2);
        fill_core(&sched, &ctx, 0, 3);
        fill_core(&sched, &ctx, 1, 1);

        sched.load_balance(&ctx);
        assert_eq!(sched.queue_len(CoreId(0)), 2);
        assert_eq!(sched.queue_len(CoreId(1)), 2);
        assert_eq!(ctx.irq_depth(), 0);
    }

    #[test]
    fn test_two_passes_migrate_at_most_once() {
        let sched = RrScheduler::new(2);
        let ctx = TestCtx::new(2);
        fill_core(&sched, &ctx, 0, 3);
        fill_core(&sched, &ctx, 1, 1);

        sched.load_balance(&ctx);
        sched.load_balance(&ctx);
        // The second pass sees the balanced state and does nothing.
        assert_eq!(sched.queue_len(CoreId(0)), 2);
        assert_eq!(sched.queue_len(CoreId(1)), 2);
    }

    #[test]
    fn test_single_core_has_nothing_to_balance() {
        let sched = RrScheduler::new(1);
        let ctx = TestCtx::new(1);
        fill_core(&sched, &ctx, 0, 4);

        sched.load_balance(&ctx);
        assert_eq!(sched.queue_len(CoreId(0)), 4);
    }

    #[test]
    fn test_pinned_entities_are_passed_over() {
        let sched = RrScheduler::new(2);
        let ctx = TestCtx::new(2);
        let ents = fill_core(&sched, &ctx, 0, 3);
        // The queue head cannot leave core 0; the balancer takes the next
        // movable entity instead.
        ctx.set_affinity(ents[0].id(), &[CoreId(0)]);

        sched.load_balance(&ctx);
        assert!(ents[0].is_queued());
        assert_eq!(ents[0].assigned_core(), CoreId(0));
        assert_eq!(ents[1].assigned_core(), CoreId(1));
        assert_eq!(sched.queue_len(CoreId(0)), 2);
        assert_eq!(sched.queue_len(CoreId(1)), 1);
    }

    #[test]
    fn test_fully_pinned_source_migrates_nothing() {
        let sched = RrScheduler::new(2);
        let ctx = TestCtx::new(2);
        let ents = fill_core(&sched, &ctx, 0, 3);
        for ent in &ents {
            ctx.set_affinity(ent.id(), &[CoreId(0)]);
        }

        sched.load_balance(&ctx);
        assert_eq!(sched.queue_len(CoreId(0)), 3);
        assert_eq!(sched.queue_len(CoreId(1)), 0);
        assert_eq!(ctx.irq_depth(), 0);
    }

    #[cfg(feature = "groups")]
    #[test]
    fn test_groups_balance_independently() {
        use crate::types::{GroupMask, SchedGroup};

        // Cores 0/1 serve foreground, cores 2/3 background.
        let sched = RrScheduler::with_group_map(&[
            GroupMask::FOREGROUND,
            GroupMask::FOREGROUND,
            GroupMask::BACKGROUND,
            GroupMask::BACKGROUND,
        ]);
        let ctx = TestCtx::new(4);
        let fg = fill_core(&sched, &ctx, 0, 3);
        let bg = fill_core(&sched, &ctx, 2, 3);
        for ent in fg.iter() {
            ctx.set_group(ent.id(), SchedGroup::Foreground);
        }
        for ent in bg.iter() {
            ctx.set_group(ent.id(), SchedGroup::Background);
        }

        sched.load_balance(&ctx);
        // One migration inside each group partition.
        assert_eq!(sched.queue_len(CoreId(0)), 2);
        assert_eq!(sched.queue_len(CoreId(1)), 1);
        assert_eq!(sched.queue_len(CoreId(2)), 2);
        assert_eq!(sched.queue_len(CoreId(3)), 1);
    }
}
