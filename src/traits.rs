/*
 * Policy and Collaborator Trait Definitions
 *
 * Two traits separate scheduling policy from kernel mechanism:
 *
 * - SchedPolicy: the operation table the external dispatcher drives.
 *   One record of these operations per policy, chosen by the host's
 *   "which policy governs this entity" tag.
 * - KernelCtx: the capability surface the policy consumes from the host
 *   kernel. The policy never touches host structures directly.
 */

use crate::entity::EntityRef;
use crate::types::{CoreId, EnqueueFlags, EntityId, IrqFlags, TimeSlice};

#[cfg(feature = "groups")]
use crate::types::SchedGroup;

/// The dispatcher-facing contract of a scheduling policy.
///
/// The dispatcher serializes per-core calls: operations taking a `core`
/// argument are only invoked by (or on behalf of) that core, with local
/// interrupts already disabled. Cross-queue work (migration, balancing,
/// stealing) is internal to the policy and follows the two-queue locking
/// protocol.
pub trait SchedPolicy: Send + Sync {
    /// Link a runnable entity into its core's queue (tail, or head with
    /// `EnqueueFlags::HEAD`). A wakeup (`EnqueueFlags::WAKEUP`) resets
    /// the watchdog counter.
    fn enqueue_task(&self, ctx: &dyn KernelCtx, core: CoreId, ent: &EntityRef, flags: EnqueueFlags);

    /// Unlink an entity that stopped being runnable. Flushes execution
    /// accounting for the core's current entity first.
    fn dequeue_task(&self, ctx: &dyn KernelCtx, core: CoreId, ent: &EntityRef);

    /// Rotate the core's current entity to the tail of its queue without
    /// touching its time slice.
    fn yield_task(&self, ctx: &dyn KernelCtx, core: CoreId);

    /// Decide whether a newly runnable entity preempts the core's current
    /// one. This policy never preempts ahead of the time slice: no-op.
    fn check_preempt_curr(&self, ctx: &dyn KernelCtx, core: CoreId, ent: &EntityRef);

    /// Head of the core's queue, or None when nothing is runnable here.
    /// The entity stays linked; its execution stamp is set and it becomes
    /// the core's current entity.
    fn pick_next_task(&self, ctx: &dyn KernelCtx, core: CoreId) -> Option<EntityRef>;

    /// The entity is about to be switched out: flush accounting and clear
    /// its execution stamp.
    fn put_prev_task(&self, ctx: &dyn KernelCtx, core: CoreId, ent: &EntityRef);

    /// Select the least-loaded eligible core for an entity becoming
    /// runnable. Unlocked, stale-tolerant, never fails.
    #[cfg(feature = "smp")]
    fn select_core(&self, ctx: &dyn KernelCtx, ent: &EntityRef) -> CoreId;

    /// The entity's scheduling-group classification changed: move it to a
    /// core serving the new group, revalidating under the two-queue lock.
    #[cfg(feature = "groups")]
    fn move_to_group(&self, ctx: &dyn KernelCtx, ent: &EntityRef);

    /// An already-running entity switched into this policy: record it as
    /// the core's current entity and stamp its execution start.
    fn set_curr_task(&self, ctx: &dyn KernelCtx, core: CoreId, ent: &EntityRef);

    /// Periodic tick for the core's running entity: accounting, watchdog,
    /// time-slice countdown and round-robin rotation.
    fn task_tick(&self, ctx: &dyn KernelCtx, core: CoreId, ent: &EntityRef);

    /// Priority is not a concept in this policy: no-op.
    fn prio_changed(&self, ctx: &dyn KernelCtx, ent: &EntityRef, old_prio: i32);

    /// An entity was switched to this policy; nudge the core if the new
    /// arrival is ready to run and the current occupant is not a
    /// higher-class entity.
    fn switched_to(&self, ctx: &dyn KernelCtx, core: CoreId, ent: &EntityRef);

    /// The fixed round-robin interval.
    fn rr_interval(&self) -> TimeSlice;
}

/// Collaborator capabilities the policy consumes from the host kernel.
///
/// Implementations must be callable from any core; the policy calls them
/// both inside and outside its queue locks, but never re-enters the
/// policy from them.
pub trait KernelCtx {
    /// Per-core monotonic accounting clock: cumulative task-execution
    /// time on `core`, in nanoseconds.
    fn clock_task(&self, core: CoreId) -> u64;

    /// Whether `core` is in the entity's allowed-core set.
    fn core_allowed(&self, ent: EntityId, core: CoreId) -> bool;

    /// Number of cores in the entity's allowed-core set.
    fn nr_cores_allowed(&self, ent: EntityId) -> usize;

    /// Whether `core` is online.
    fn core_online(&self, core: CoreId) -> bool;

    /// Disable local interrupts, returning the previous state.
    fn irq_save(&self) -> IrqFlags;

    /// Restore local interrupt state saved by `irq_save`.
    fn irq_restore(&self, flags: IrqFlags);

    /// Host-owned global ready-count bookkeeping, called with the queue
    /// lock held whenever an entity is activated on `core`.
    fn inc_nr_running(&self, core: CoreId);

    /// Counterpart of `inc_nr_running` on deactivation.
    fn dec_nr_running(&self, core: CoreId);

    /// Asynchronous hint: reconsider `core`'s running entity soon.
    fn request_resched(&self, core: CoreId);

    /// Charge `delta` nanoseconds of runtime to the entity's accounting
    /// (group/controller bookkeeping owned by the host).
    fn account_exec(&self, ent: EntityId, delta: u64);

    /// Runaway-execution limits for the entity as (soft, hard)
    /// microseconds, or None when unlimited.
    fn runaway_limit(&self, ent: EntityId) -> Option<(u64, u64)>;

    /// Watchdog expiry sink: the entity's runtime deadline has elapsed at
    /// `runtime` accumulated nanoseconds. Enforcement is the host's call.
    fn expire_runtime(&self, ent: EntityId, runtime: u64);

    /// Whether the entity is in a runnable-and-not-blocked state (running,
    /// waking, or in an active-preemption window).
    fn is_runnable(&self, ent: EntityId) -> bool;

    /// Whether the entity is still governed by this policy.
    fn governs(&self, ent: EntityId) -> bool;

    /// Whether `core`'s present occupant (under any policy) is a
    /// higher-class, real-time entity.
    fn curr_is_realtime(&self, core: CoreId) -> bool;

    /// Scheduling-group classification of the entity.
    #[cfg(feature = "groups")]
    fn entity_group(&self, ent: EntityId) -> SchedGroup;
}
