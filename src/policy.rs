/*
 * Round-Robin Policy Engine
 *
 * RrScheduler owns one CoreQueue per processing core and implements the
 * dispatcher contract: strict FIFO rotation with a fixed time slice, no
 * priorities, no early preemption. Execution accounting is charged
 * against the core's current entity on every tick and on every switch;
 * the watchdog flags entities that exceed their runaway-time limit.
 *
 * Per-core operations lock only the local queue. The entity lock nests
 * inside, one entity at a time.
 */

use alloc::vec::Vec;

use crate::entity::EntityRef;
use crate::run_queue::{CoreQueue, RunQueue};
use crate::traits::{KernelCtx, SchedPolicy};
use crate::types::{CoreId, EnqueueFlags, TimeSlice, USEC_PER_TICK};

#[cfg(feature = "groups")]
use crate::types::GroupMask;

/// The round-robin scheduling policy for a fixed set of cores.
pub struct RrScheduler {
    cores: Vec<CoreQueue>,

    #[cfg(feature = "groups")]
    group_scheduling: bool,
}

impl RrScheduler {
    /// Create the policy for `nr_cores` cores, all serving every
    /// scheduling group.
    pub fn new(nr_cores: usize) -> Self {
        assert!(nr_cores > 0, "at least one core required");
        let cores = (0..nr_cores)
            .map(|i| CoreQueue::new(CoreId(i as u32)))
            .collect();
        log::info!("round-robin policy managing {} core(s)", nr_cores);
        Self {
            cores,
            #[cfg(feature = "groups")]
            group_scheduling: false,
        }
    }

    /// Create the policy with group scheduling enabled, one service mask
    /// per core.
    #[cfg(feature = "groups")]
    pub fn with_group_map(serves: &[GroupMask]) -> Self {
        assert!(!serves.is_empty(), "at least one core required");
        let cores = serves
            .iter()
            .enumerate()
            .map(|(i, &mask)| CoreQueue::with_serves(CoreId(i as u32), mask))
            .collect();
        log::info!(
            "round-robin policy managing {} core(s), group scheduling enabled",
            serves.len()
        );
        Self {
            cores,
            group_scheduling: true,
        }
    }

    pub fn nr_cores(&self) -> usize {
        self.cores.len()
    }

    /// Queued-entity count of a core, from the racy mirror.
    pub fn queue_len(&self, core: CoreId) -> usize {
        self.core_queue(core).load()
    }

    pub(crate) fn core_queue(&self, core: CoreId) -> &CoreQueue {
        &self.cores[core.as_usize()]
    }

    pub(crate) fn cores(&self) -> core::slice::Iter<'_, CoreQueue> {
        self.cores.iter()
    }

    #[cfg(feature = "groups")]
    pub(crate) fn group_scheduling(&self) -> bool {
        self.group_scheduling
    }

    /// Link an entity into `core`'s queue and bump the host's ready
    /// count. Queue lock held by the caller.
    pub(crate) fn activate(
        &self,
        ctx: &dyn KernelCtx,
        core: CoreId,
        rq: &mut RunQueue,
        ent: &EntityRef,
        to_head: bool,
    ) {
        {
            let mut state = ent.state();
            debug_assert!(!state.on_queue, "activating a linked entity");
            debug_assert_eq!(state.assigned_core, core, "activating on a foreign core");
            state.on_queue = true;
        }
        self.core_queue(core).enqueue(rq, ent, to_head);
        ctx.inc_nr_running(core);
    }

    /// Unlink an entity from `core`'s queue and drop the host's ready
    /// count. Queue lock held by the caller.
    pub(crate) fn deactivate(
        &self,
        ctx: &dyn KernelCtx,
        core: CoreId,
        rq: &mut RunQueue,
        ent: &EntityRef,
    ) {
        {
            let mut state = ent.state();
            debug_assert!(state.on_queue, "deactivating an unlinked entity");
            state.on_queue = false;
        }
        self.core_queue(core).dequeue(rq, ent);
        ctx.dec_nr_running(core);
    }

    /// Flush execution accounting for `core`'s current entity: fold the
    /// time since `exec_start` into its totals, charge the host, and
    /// restamp. Nothing happens when no entity of this policy is current
    /// or it is not mid-burst.
    pub(crate) fn update_curr(&self, ctx: &dyn KernelCtx, core: CoreId, rq: &RunQueue) {
        let Some(curr) = rq.curr() else {
            return;
        };
        let now = ctx.clock_task(core);
        let delta = {
            let mut state = curr.state();
            let Some(start) = state.exec_start else {
                return;
            };
            let delta = now.saturating_sub(start);
            state.sum_exec_runtime += delta;
            if delta > state.exec_max {
                state.exec_max = delta;
            }
            state.exec_start = Some(now);
            delta
        };
        ctx.account_exec(curr.id(), delta);
    }

    /// Runaway-execution watchdog, run once per tick for the running
    /// entity. Counts ticks while a finite limit is configured and,
    /// past the threshold, reports the entity's runtime deadline as
    /// elapsed. Never dequeues or kills.
    fn watchdog(&self, ctx: &dyn KernelCtx, ent: &EntityRef) {
        let Some((soft, hard)) = ctx.runaway_limit(ent.id()) else {
            return;
        };
        let threshold = soft.min(hard).div_ceil(USEC_PER_TICK);
        let expired_runtime = {
            let mut state = ent.state();
            state.timeout += 1;
            (u64::from(state.timeout) > threshold).then_some(state.sum_exec_runtime)
        };
        if let Some(runtime) = expired_runtime {
            log::debug!("entity {:?} exceeded its runaway limit", ent.id());
            ctx.expire_runtime(ent.id(), runtime);
        }
    }
}

impl SchedPolicy for RrScheduler {
    fn enqueue_task(
        &self,
        ctx: &dyn KernelCtx,
        core: CoreId,
        ent: &EntityRef,
        flags: EnqueueFlags,
    ) {
        let cq = self.core_queue(core);
        let mut rq = cq.lock();
        if flags.contains(EnqueueFlags::WAKEUP) {
            ent.state().timeout = 0;
        }
        self.activate(ctx, core, &mut rq, ent, flags.contains(EnqueueFlags::HEAD));
    }

    fn dequeue_task(&self, ctx: &dyn KernelCtx, core: CoreId, ent: &EntityRef) {
        let cq = self.core_queue(core);
        let mut rq = cq.lock();
        self.update_curr(ctx, core, &rq);
        self.deactivate(ctx, core, &mut rq, ent);
    }

    fn yield_task(&self, _ctx: &dyn KernelCtx, core: CoreId) {
        let cq = self.core_queue(core);
        let mut rq = cq.lock();
        let Some(curr) = rq.curr().cloned() else {
            return;
        };
        cq.requeue(&mut rq, &curr, false);
    }

    fn check_preempt_curr(&self, _ctx: &dyn KernelCtx, _core: CoreId, _ent: &EntityRef) {}

    fn pick_next_task(&self, ctx: &dyn KernelCtx, core: CoreId) -> Option<EntityRef> {
        let cq = self.core_queue(core);
        let mut rq = cq.lock();
        let next = rq.front()?.clone();
        next.state().exec_start = Some(ctx.clock_task(core));
        rq.set_curr(Some(next.clone()));
        Some(next)
    }

    fn put_prev_task(&self, ctx: &dyn KernelCtx, core: CoreId, ent: &EntityRef) {
        let cq = self.core_queue(core);
        let mut rq = cq.lock();
        self.update_curr(ctx, core, &rq);
        // Round-robin: the next burst starts from a fresh stamp.
        ent.state().exec_start = None;
        if rq.is_curr(ent) {
            rq.set_curr(None);
        }
    }

    #[cfg(feature = "smp")]
    fn select_core(&self, ctx: &dyn KernelCtx, ent: &EntityRef) -> CoreId {
        self.select_core_impl(ctx, ent)
    }

    #[cfg(feature = "groups")]
    fn move_to_group(&self, ctx: &dyn KernelCtx, ent: &EntityRef) {
        self.move_to_group_impl(ctx, ent);
    }

    fn set_curr_task(&self, ctx: &dyn KernelCtx, core: CoreId, ent: &EntityRef) {
        let cq = self.core_queue(core);
        let mut rq = cq.lock();
        ent.state().exec_start = Some(ctx.clock_task(core));
        rq.set_curr(Some(ent.clone()));
    }

    fn task_tick(&self, ctx: &dyn KernelCtx, core: CoreId, ent: &EntityRef) {
        let cq = self.core_queue(core);
        let mut rq = cq.lock();

        self.update_curr(ctx, core, &rq);
        self.watchdog(ctx, ent);

        let expired = {
            let mut state = ent.state();
            state.time_slice = state.time_slice.saturating_sub(1);
            if state.time_slice > 0 {
                false
            } else {
                state.time_slice = TimeSlice::DEFAULT.get();
                true
            }
        };

        // Requeue only if we are not the only entity in the queue.
        if expired && rq.len() > 1 {
            cq.requeue(&mut rq, ent, false);
            drop(rq);
            ctx.request_resched(core);
        }
    }

    fn prio_changed(&self, _ctx: &dyn KernelCtx, _ent: &EntityRef, _old_prio: i32) {}

    fn switched_to(&self, ctx: &dyn KernelCtx, core: CoreId, ent: &EntityRef) {
        let cq = self.core_queue(core);
        let resched = {
            let rq = cq.lock();
            let state = ent.state();
            state.on_queue
                && state.assigned_core == core
                && !rq.is_curr(ent)
                && !ctx.curr_is_realtime(core)
        };
        if resched {
            ctx.request_resched(core);
        }
    }

    fn rr_interval(&self) -> TimeSlice {
        TimeSlice::DEFAULT
    }
}
