/*
 * Test Support
 *
 * A deterministic mock of the host-kernel capability surface, plus small
 * helpers for populating queues. Every collaborator input (clocks,
 * affinity, online set, limits, classifications) is settable, and every
 * collaborator output (resched hints, expiry signals, accounting
 * charges, ready counts, irq nesting) is recorded for assertions.
 */

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use spin::Mutex;

use crate::entity::{EntityRef, SchedEntity};
use crate::policy::RrScheduler;
use crate::traits::{KernelCtx, SchedPolicy};
use crate::types::{CoreId, EnqueueFlags, EntityId, IrqFlags};

#[cfg(feature = "groups")]
use crate::types::SchedGroup;

pub(crate) struct TestCtx {
    nr_cores: usize,
    clocks: Vec<AtomicU64>,
    ready_counts: Vec<AtomicI64>,
    irq_depth: AtomicI64,
    next_id: AtomicU64,

    offline: Mutex<Vec<CoreId>>,
    affinity: Mutex<BTreeMap<EntityId, Vec<CoreId>>>,
    blocked: Mutex<Vec<EntityId>>,
    foreign: Mutex<Vec<EntityId>>,
    rt_cores: Mutex<Vec<CoreId>>,
    limits: Mutex<BTreeMap<EntityId, (u64, u64)>>,

    resched: Mutex<Vec<CoreId>>,
    expired: Mutex<Vec<(EntityId, u64)>>,
    charges: Mutex<BTreeMap<EntityId, u64>>,

    #[cfg(feature = "groups")]
    groups: Mutex<BTreeMap<EntityId, SchedGroup>>,
}

impl TestCtx {
    pub(crate) fn new(nr_cores: usize) -> Self {
        Self {
            nr_cores,
            clocks: (0..nr_cores).map(|_| AtomicU64::new(0)).collect(),
            ready_counts: (0..nr_cores).map(|_| AtomicI64::new(0)).collect(),
            irq_depth: AtomicI64::new(0),
            next_id: AtomicU64::new(1000),
            offline: Mutex::new(Vec::new()),
            affinity: Mutex::new(BTreeMap::new()),
            blocked: Mutex::new(Vec::new()),
            foreign: Mutex::new(Vec::new()),
            rt_cores: Mutex::new(Vec::new()),
            limits: Mutex::new(BTreeMap::new()),
            resched: Mutex::new(Vec::new()),
            expired: Mutex::new(Vec::new()),
            charges: Mutex::new(BTreeMap::new()),
            #[cfg(feature = "groups")]
            groups: Mutex::new(BTreeMap::new()),
        }
    }

    pub(crate) fn advance_clock(&self, core: CoreId, ns: u64) {
        self.clocks[core.as_usize()].fetch_add(ns, Ordering::Relaxed);
    }

    pub(crate) fn set_offline(&self, core: CoreId) {
        self.offline.lock().push(core);
    }

    pub(crate) fn set_affinity(&self, ent: EntityId, cores: &[CoreId]) {
        self.affinity.lock().insert(ent, cores.into());
    }

    pub(crate) fn set_blocked(&self, ent: EntityId) {
        self.blocked.lock().push(ent);
    }

    pub(crate) fn set_foreign(&self, ent: EntityId) {
        self.foreign.lock().push(ent);
    }

    pub(crate) fn set_curr_realtime(&self, core: CoreId) {
        self.rt_cores.lock().push(core);
    }

    pub(crate) fn set_runaway_limit(&self, ent: EntityId, soft_us: u64, hard_us: u64) {
        self.limits.lock().insert(ent, (soft_us, hard_us));
    }

    #[cfg(feature = "groups")]
    pub(crate) fn set_group(&self, ent: EntityId, group: SchedGroup) {
        self.groups.lock().insert(ent, group);
    }

    /// Drain the recorded reschedule hints.
    pub(crate) fn take_resched(&self) -> Vec<CoreId> {
        core::mem::take(&mut *self.resched.lock())
    }

    pub(crate) fn expired(&self) -> Vec<(EntityId, u64)> {
        self.expired.lock().clone()
    }

    /// Total runtime charged to an entity through `account_exec`.
    pub(crate) fn charged(&self, ent: EntityId) -> u64 {
        self.charges.lock().get(&ent).copied().unwrap_or(0)
    }

    /// The host-side ready count for a core; activations and
    /// deactivations must keep it non-negative and balanced.
    pub(crate) fn ready_count(&self, core: CoreId) -> i64 {
        self.ready_counts[core.as_usize()].load(Ordering::Relaxed)
    }

    /// Current irq_save/irq_restore nesting; zero once every critical
    /// section closed.
    pub(crate) fn irq_depth(&self) -> i64 {
        self.irq_depth.load(Ordering::Relaxed)
    }

    fn alloc_id(&self) -> EntityId {
        EntityId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl KernelCtx for TestCtx {
    fn clock_task(&self, core: CoreId) -> u64 {
        self.clocks[core.as_usize()].load(Ordering::Relaxed)
    }

    fn core_allowed(&self, ent: EntityId, core: CoreId) -> bool {
        self.affinity
            .lock()
            .get(&ent)
            .is_none_or(|cores| cores.contains(&core))
    }

    fn nr_cores_allowed(&self, ent: EntityId) -> usize {
        self.affinity
            .lock()
            .get(&ent)
            .map_or(self.nr_cores, |cores| cores.len())
    }

    fn core_online(&self, core: CoreId) -> bool {
        !self.offline.lock().contains(&core)
    }

    fn irq_save(&self) -> IrqFlags {
        let depth = self.irq_depth.fetch_add(1, Ordering::Relaxed);
        IrqFlags(depth as u64)
    }

    fn irq_restore(&self, _flags: IrqFlags) {
        self.irq_depth.fetch_sub(1, Ordering::Relaxed);
    }

    fn inc_nr_running(&self, core: CoreId) {
        self.ready_counts[core.as_usize()].fetch_add(1, Ordering::Relaxed);
    }

    fn dec_nr_running(&self, core: CoreId) {
        let prev = self.ready_counts[core.as_usize()].fetch_sub(1, Ordering::Relaxed);
        assert!(prev > 0, "ready count went negative on core {}", core.0);
    }

    fn request_resched(&self, core: CoreId) {
        self.resched.lock().push(core);
    }

    fn account_exec(&self, ent: EntityId, delta: u64) {
        *self.charges.lock().entry(ent).or_insert(0) += delta;
    }

    fn runaway_limit(&self, ent: EntityId) -> Option<(u64, u64)> {
        self.limits.lock().get(&ent).copied()
    }

    fn expire_runtime(&self, ent: EntityId, runtime: u64) {
        self.expired.lock().push((ent, runtime));
    }

    fn is_runnable(&self, ent: EntityId) -> bool {
        !self.blocked.lock().contains(&ent)
    }

    fn governs(&self, ent: EntityId) -> bool {
        !self.foreign.lock().contains(&ent)
    }

    fn curr_is_realtime(&self, core: CoreId) -> bool {
        self.rt_cores.lock().contains(&core)
    }

    #[cfg(feature = "groups")]
    fn entity_group(&self, ent: EntityId) -> SchedGroup {
        self.groups
            .lock()
            .get(&ent)
            .copied()
            .unwrap_or(SchedGroup::Foreground)
    }
}

/// Admit an entity on `core` and enqueue it at the tail.
pub(crate) fn spawn_on(sched: &RrScheduler, ctx: &TestCtx, id: u64, core: u32) -> EntityRef {
    let ent = SchedEntity::new(EntityId(id), CoreId(core));
    sched.enqueue_task(ctx, CoreId(core), &ent, EnqueueFlags::empty());
    ent
}

/// Enqueue `n` fresh entities on `core`, returning them in queue order.
pub(crate) fn fill_core(sched: &RrScheduler, ctx: &TestCtx, core: u32, n: usize) -> Vec<EntityRef> {
    (0..n)
        .map(|_| {
            let ent = SchedEntity::new(ctx.alloc_id(), CoreId(core));
            sched.enqueue_task(ctx, CoreId(core), &ent, EnqueueFlags::empty());
            ent
        })
        .collect()
}
