/*
 * Core Selection
 *
 * Picks the queue with the fewest running entities for an entity
 * becoming runnable. The scan reads the racy length mirrors with no
 * lock held; the result is a placement hint, not a guarantee, and every
 * later move revalidates under the real locks.
 */

use crate::entity::EntityRef;
use crate::policy::RrScheduler;
use crate::traits::KernelCtx;
use crate::types::CoreId;

impl RrScheduler {
    /// Least-loaded eligible core for `ent`.
    ///
    /// A single-member allowed set short-circuits to the entity's
    /// assigned core (the host keeps affinity and assignment in step).
    /// Otherwise the assigned core's count seeds the minimum and every
    /// online, allowed, group-compatible core competes; ties keep the
    /// earliest candidate, including the assigned core itself.
    pub(crate) fn select_core_impl(&self, ctx: &dyn KernelCtx, ent: &EntityRef) -> CoreId {
        let orig = ent.state().assigned_core;
        if ctx.nr_cores_allowed(ent.id()) == 1 {
            return orig;
        }

        let mut best = orig;
        let mut best_nr = self.core_queue(orig).load();

        #[cfg(feature = "groups")]
        let group = self
            .group_scheduling()
            .then(|| ctx.entity_group(ent.id()));

        for cq in self.cores() {
            if !ctx.core_online(cq.core()) {
                continue;
            }
            #[cfg(feature = "groups")]
            if let Some(group) = group {
                if !cq.serves().contains(group.service_mask()) {
                    continue;
                }
            }
            if !ctx.core_allowed(ent.id(), cq.core()) {
                continue;
            }
            let nr = cq.load();
            if nr < best_nr {
                best_nr = nr;
                best = cq.core();
            }
        }
        best
    }
}
