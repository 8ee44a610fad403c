/*
 * Per-Core Run Queue
 *
 * One CoreQueue per processing core: a FIFO of entity handles behind a
 * spin lock, plus an atomic length mirror readable without the lock.
 * The mirror feeds the stale-tolerant heuristics (core selection, the
 * balancer's imbalance scan); every decision taken from it is revalidated
 * after the real locks are acquired.
 *
 * Queue primitives take the held MutexGuard so they cannot be called
 * without the lock. Insertion order is execution order.
 */

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};
use spin::{Mutex, MutexGuard};

use crate::entity::EntityRef;
use crate::types::CoreId;

#[cfg(feature = "groups")]
use crate::types::GroupMask;

/// The locked part of a core's queue state.
pub(crate) struct RunQueue {
    /// Ready entities in execution order. The current entity stays
    /// linked while it runs.
    queue: VecDeque<EntityRef>,

    /// The entity of this policy currently executing on the core, if
    /// any. Accounting is always charged against it.
    curr: Option<EntityRef>,
}

impl RunQueue {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            curr: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn front(&self) -> Option<&EntityRef> {
        self.queue.front()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &EntityRef> {
        self.queue.iter()
    }

    pub(crate) fn curr(&self) -> Option<&EntityRef> {
        self.curr.as_ref()
    }

    pub(crate) fn set_curr(&mut self, ent: Option<EntityRef>) {
        self.curr = ent;
    }

    /// Whether `ent` is the entity currently executing on this core.
    pub(crate) fn is_curr(&self, ent: &EntityRef) -> bool {
        self.curr.as_ref().is_some_and(|c| Arc::ptr_eq(c, ent))
    }

    pub(crate) fn contains(&self, ent: &EntityRef) -> bool {
        self.queue.iter().any(|e| Arc::ptr_eq(e, ent))
    }

    fn insert(&mut self, ent: &EntityRef, to_head: bool) {
        debug_assert!(!self.contains(ent), "entity already linked");
        if to_head {
            self.queue.push_front(ent.clone());
        } else {
            self.queue.push_back(ent.clone());
        }
    }

    fn remove(&mut self, ent: &EntityRef) {
        let pos = self.queue.iter().position(|e| Arc::ptr_eq(e, ent));
        debug_assert!(pos.is_some(), "entity not linked in this queue");
        if let Some(pos) = pos {
            self.queue.remove(pos);
        }
    }
}

/// A core's queue: lock, atomic length mirror, and (with `groups`) the
/// service mask partitioning this core among scheduling groups.
pub(crate) struct CoreQueue {
    core: CoreId,
    rq: Mutex<RunQueue>,

    /// Mirror of the queue length, written only under the lock, read
    /// racily by the load heuristics.
    nr_running: AtomicUsize,

    #[cfg(feature = "groups")]
    serves: GroupMask,
}

impl CoreQueue {
    pub(crate) fn new(core: CoreId) -> Self {
        Self {
            core,
            rq: Mutex::new(RunQueue::new()),
            nr_running: AtomicUsize::new(0),
            #[cfg(feature = "groups")]
            serves: GroupMask::all(),
        }
    }

    #[cfg(feature = "groups")]
    pub(crate) fn with_serves(core: CoreId, serves: GroupMask) -> Self {
        let mut cq = Self::new(core);
        cq.serves = serves;
        cq
    }

    pub(crate) fn core(&self) -> CoreId {
        self.core
    }

    #[cfg(feature = "groups")]
    pub(crate) fn serves(&self) -> GroupMask {
        self.serves
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, RunQueue> {
        self.rq.lock()
    }

    /// Racy length read for heuristic scans; may be stale.
    pub(crate) fn load(&self) -> usize {
        self.nr_running.load(Ordering::Relaxed)
    }

    /// Insert `ent` at head or tail. The entity must not be linked
    /// anywhere.
    pub(crate) fn enqueue(&self, rq: &mut RunQueue, ent: &EntityRef, to_head: bool) {
        rq.insert(ent, to_head);
        self.nr_running.store(rq.len(), Ordering::Relaxed);
    }

    /// Remove `ent`; it becomes re-insertable afterwards. The entity must
    /// be linked in this queue.
    pub(crate) fn dequeue(&self, rq: &mut RunQueue, ent: &EntityRef) {
        rq.remove(ent);
        self.nr_running.store(rq.len(), Ordering::Relaxed);
    }

    /// Move an already-linked entity to head or tail of this queue.
    pub(crate) fn requeue(&self, rq: &mut RunQueue, ent: &EntityRef, to_head: bool) {
        rq.remove(ent);
        rq.insert(ent, to_head);
    }
}

/// Acquire two distinct core queues' locks in ascending core-index order,
/// returning the guards in argument order. Shared by group migration, the
/// load balancer and work stealing.
pub(crate) fn lock_pair<'a>(
    a: &'a CoreQueue,
    b: &'a CoreQueue,
) -> (MutexGuard<'a, RunQueue>, MutexGuard<'a, RunQueue>) {
    assert_ne!(a.core, b.core, "lock_pair needs two distinct queues");
    if a.core < b.core {
        let ga = a.rq.lock();
        let gb = b.rq.lock();
        (ga, gb)
    } else {
        let gb = b.rq.lock();
        let ga = a.rq.lock();
        (ga, gb)
    }
}
