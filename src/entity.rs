/*
 * Scheduling Entity
 *
 * Per-entity scheduling state, the policy's slice of the host kernel's
 * larger entity record. The host creates one SchedEntity when an entity
 * is admitted to this policy (or switched into it) and drops it when the
 * entity leaves.
 *
 * Entities are shared between queues and the dispatcher as Arc handles;
 * the mutable fields sit behind a spin lock. An entity's fields are only
 * written by its owning core, or under the two-queue lock pair during a
 * migration, and the entity lock always nests inside queue locks.
 */

use alloc::sync::Arc;
use spin::{Mutex, MutexGuard};

use crate::types::{CoreId, EntityId, TimeSlice};

/// Shared handle to a scheduling entity.
pub type EntityRef = Arc<SchedEntity>;

/// The policy-owned state embedded in an entity's record.
pub struct SchedEntity {
    id: EntityId,
    state: Mutex<EntityState>,
}

/// Mutable scheduling fields of an entity.
pub(crate) struct EntityState {
    /// Whether the entity is currently linked into a run queue.
    pub on_queue: bool,

    /// The core owning this entity; changes only under the migration
    /// protocol (both queue locks held).
    pub assigned_core: CoreId,

    /// Remaining ticks before mandatory requeue.
    pub time_slice: u32,

    /// Watchdog tick counter; reset on wakeup.
    pub timeout: u32,

    /// Accounting-clock stamp of the current execution burst, None while
    /// not executing.
    pub exec_start: Option<u64>,

    /// Total accumulated runtime in nanoseconds.
    pub sum_exec_runtime: u64,

    /// Longest single execution delta observed (statistics).
    pub exec_max: u64,
}

impl SchedEntity {
    /// Admit a new entity to the policy: unqueued, full time slice,
    /// assigned to `core`.
    pub fn new(id: EntityId, core: CoreId) -> EntityRef {
        Arc::new(Self {
            id,
            state: Mutex::new(EntityState {
                on_queue: false,
                assigned_core: core,
                time_slice: TimeSlice::DEFAULT.get(),
                timeout: 0,
                exec_start: None,
                sum_exec_runtime: 0,
                exec_max: 0,
            }),
        })
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Lock the mutable scheduling fields. Queue locks, when needed, must
    /// already be held.
    pub(crate) fn state(&self) -> MutexGuard<'_, EntityState> {
        self.state.lock()
    }

    /// Core this entity is currently assigned to.
    pub fn assigned_core(&self) -> CoreId {
        self.state.lock().assigned_core
    }

    /// Whether the entity is linked into a run queue.
    pub fn is_queued(&self) -> bool {
        self.state.lock().on_queue
    }

    /// Remaining ticks in the current slice.
    pub fn time_slice(&self) -> u32 {
        self.state.lock().time_slice
    }

    /// Accumulated runtime in nanoseconds.
    pub fn sum_exec_runtime(&self) -> u64 {
        self.state.lock().sum_exec_runtime
    }

    /// Longest single execution burst observed, in nanoseconds.
    pub fn exec_max(&self) -> u64 {
        self.state.lock().exec_max
    }
}

impl core::fmt::Debug for SchedEntity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SchedEntity")
            .field("id", &self.id)
            .field("on_queue", &state.on_queue)
            .field("assigned_core", &state.assigned_core)
            .field("time_slice", &state.time_slice)
            .finish()
    }
}
