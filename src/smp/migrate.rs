/*
 * Group Migration
 *
 * Moves an entity whose scheduling-group classification changed onto a
 * core serving the new group. Selection runs unlocked, so everything it
 * concluded is rechecked with both queue locks held before any state
 * changes; a failed recheck aborts the whole move with no side effect.
 */

use crate::entity::EntityRef;
use crate::policy::RrScheduler;
use crate::run_queue::{lock_pair, RunQueue};
use crate::smp::can_move;
use crate::traits::KernelCtx;
use crate::types::CoreId;

impl RrScheduler {
    /// Re-home `ent` after a group-classification change.
    pub(crate) fn move_to_group_impl(&self, ctx: &dyn KernelCtx, ent: &EntityRef) {
        let target = self.select_core_impl(ctx, ent);
        let source = ent.state().assigned_core;
        if target == source {
            return;
        }
        self.migrate_entity(ctx, ent, source, target);
    }

    /// Locked half of a migration: `source` is the assignment recorded
    /// before locking, and the move aborts if it went stale meanwhile.
    /// Returns whether the entity moved.
    pub(crate) fn migrate_entity(
        &self,
        ctx: &dyn KernelCtx,
        ent: &EntityRef,
        source: CoreId,
        target: CoreId,
    ) -> bool {
        let irq = ctx.irq_save();
        let moved = {
            let (mut src_rq, mut dst_rq) =
                lock_pair(self.core_queue(source), self.core_queue(target));
            self.try_move_locked(ctx, ent, source, target, &mut src_rq, &mut dst_rq)
        };
        ctx.irq_restore(irq);
        moved
    }

    fn try_move_locked(
        &self,
        ctx: &dyn KernelCtx,
        ent: &EntityRef,
        source: CoreId,
        target: CoreId,
        src_rq: &mut RunQueue,
        dst_rq: &mut RunQueue,
    ) -> bool {
        // Still on the queue we recorded before locking?
        {
            let state = ent.state();
            if state.assigned_core != source || !state.on_queue {
                return false;
            }
        }
        if !can_move(ctx, ent, src_rq, source, target) {
            return false;
        }
        // Blocked entities stay put; the next wakeup re-selects.
        if !ctx.is_runnable(ent.id()) {
            return false;
        }

        self.move_entity_locked(ctx, ent, source, target, src_rq, dst_rq);
        log::debug!(
            "moved entity {:?} from core {} to core {}",
            ent.id(),
            source.0,
            target.0
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{spawn_on, TestCtx};
    use crate::types::{GroupMask, SchedGroup};

    #[test]
    fn test_moves_to_core_serving_new_group() {
        let sched =
            RrScheduler::with_group_map(&[GroupMask::FOREGROUND, GroupMask::BACKGROUND]);
        let ctx = TestCtx::new(2);
        let ent = spawn_on(&sched, &ctx, 1, 0);

        // Reclassified as background: only core 1 serves it now.
        ctx.set_group(ent.id(), SchedGroup::Background);
        sched.move_to_group_impl(&ctx, &ent);

        assert_eq!(ent.assigned_core(), CoreId(1));
        assert!(ent.is_queued());
        assert_eq!(sched.queue_len(CoreId(0)), 0);
        assert_eq!(sched.queue_len(CoreId(1)), 1);
        assert_eq!(ctx.irq_depth(), 0);
    }

    #[test]
    fn test_stale_source_aborts_without_side_effect() {
        let sched =
            RrScheduler::with_group_map(&[GroupMask::all(), GroupMask::all(), GroupMask::all()]);
        let ctx = TestCtx::new(3);
        let ent = spawn_on(&sched, &ctx, 1, 0);

        // Concurrent reassignment happened after the caller recorded
        // core 1 as the source: the entity is actually on core 0.
        assert!(!sched.migrate_entity(&ctx, &ent, CoreId(1), CoreId(2)));

        assert_eq!(ent.assigned_core(), CoreId(0));
        assert!(ent.is_queued());
        assert_eq!(sched.queue_len(CoreId(0)), 1);
        assert_eq!(sched.queue_len(CoreId(2)), 0);
    }

    #[test]
    fn test_blocked_entity_is_not_migrated() {
        let sched = RrScheduler::with_group_map(&[GroupMask::all(), GroupMask::all()]);
        let ctx = TestCtx::new(2);
        let ent = spawn_on(&sched, &ctx, 1, 0);
        ctx.set_blocked(ent.id());

        assert!(!sched.migrate_entity(&ctx, &ent, CoreId(0), CoreId(1)));
        assert_eq!(ent.assigned_core(), CoreId(0));
        assert_eq!(sched.queue_len(CoreId(0)), 1);
    }

    #[test]
    fn test_executing_entity_is_not_migrated() {
        let sched = RrScheduler::with_group_map(&[GroupMask::all(), GroupMask::all()]);
        let ctx = TestCtx::new(2);
        let ent = spawn_on(&sched, &ctx, 1, 0);
        let _curr = crate::traits::SchedPolicy::pick_next_task(&sched, &ctx, CoreId(0));

        assert!(!sched.migrate_entity(&ctx, &ent, CoreId(0), CoreId(1)));
        assert_eq!(ent.assigned_core(), CoreId(0));
    }

    #[test]
    fn test_same_core_selection_is_a_no_op() {
        let sched = RrScheduler::with_group_map(&[GroupMask::all()]);
        let ctx = TestCtx::new(1);
        let ent = spawn_on(&sched, &ctx, 1, 0);

        sched.move_to_group_impl(&ctx, &ent);
        assert_eq!(ent.assigned_core(), CoreId(0));
        assert_eq!(sched.queue_len(CoreId(0)), 1);
    }
}
