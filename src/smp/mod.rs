/*
 * Multi-Core Support
 *
 * Core selection for waking entities, periodic load balancing, and work
 * stealing for idle cores. These are the only paths that touch two run
 * queues at once; they share the movability check and the locked-move
 * helper below, and all follow the same protocol: save local interrupts,
 * lock both queues in ascending core order, revalidate, mutate, unlock,
 * restore.
 */

mod balance;
mod select;
mod steal;

#[cfg(feature = "groups")]
mod migrate;

use crate::entity::EntityRef;
use crate::policy::RrScheduler;
use crate::run_queue::RunQueue;
use crate::traits::KernelCtx;
use crate::types::CoreId;

/// Whether an entity can be moved from `source` to `target`. Both queue
/// locks must be held: the answer is only stable under them.
pub(crate) fn can_move(
    ctx: &dyn KernelCtx,
    ent: &EntityRef,
    src_rq: &RunQueue,
    source: CoreId,
    target: CoreId,
) -> bool {
    if !ctx.core_allowed(ent.id(), target) {
        return false;
    }
    if !ctx.core_online(target) {
        return false;
    }
    if ent.state().assigned_core != source {
        return false;
    }
    // Never move the entity currently executing on the source.
    if src_rq.is_curr(ent) {
        return false;
    }
    true
}

impl RrScheduler {
    /// Move a validated entity between two locked queues:
    /// deactivate, reassign, activate at the target's tail.
    pub(crate) fn move_entity_locked(
        &self,
        ctx: &dyn KernelCtx,
        ent: &EntityRef,
        source: CoreId,
        target: CoreId,
        src_rq: &mut RunQueue,
        dst_rq: &mut RunQueue,
    ) {
        self.deactivate(ctx, source, src_rq, ent);
        ent.state().assigned_core = target;
        self.activate(ctx, target, dst_rq, ent, false);
    }
}
