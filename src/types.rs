/*
 * Scheduler Type Definitions
 *
 * Core types shared by the policy, the run queues and the dispatcher
 * contract. All of them are small Copy newtypes or flag words.
 */

use bitflags::bitflags;

/// Timer tick rate the policy accounts in (ticks per second).
pub const TICK_HZ: u64 = 100;

/// Microseconds covered by one timer tick.
pub const USEC_PER_TICK: u64 = 1_000_000 / TICK_HZ;

/// Processing-core identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoreId(pub u32);

impl CoreId {
    /// Core ID as a usize for indexing per-core tables.
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Schedulable-entity identifier, assigned by the host kernel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u64);

/// Time slice in timer ticks.
///
/// Every entity under this policy runs for the same fixed slice before
/// mandatory rotation; there are no priorities and no weighting.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimeSlice(pub u32);

impl TimeSlice {
    /// The policy's fixed slice: 10 ticks (100 ms at 100 Hz).
    pub const DEFAULT: TimeSlice = TimeSlice(10);

    /// Get the value as u32.
    pub fn get(self) -> u32 {
        self.0
    }
}

/// Opaque saved-interrupt state returned by `KernelCtx::irq_save` and
/// handed back to `KernelCtx::irq_restore`.
#[derive(Debug, Copy, Clone)]
pub struct IrqFlags(pub u64);

bitflags! {
    /// Modifiers for `SchedPolicy::enqueue_task`.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct EnqueueFlags: u32 {
        /// The enqueue is caused by a wakeup; resets the watchdog counter.
        const WAKEUP = 1 << 0;
        /// Insert at the head of the queue instead of the tail.
        const HEAD = 1 << 1;
    }
}

/// Scheduling-group classification of an entity, supplied by the host
/// kernel (the classification convention itself is not this policy's
/// concern).
#[cfg(feature = "groups")]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SchedGroup {
    Foreground,
    Background,
}

#[cfg(feature = "groups")]
bitflags! {
    /// Which scheduling groups a core serves.
    ///
    /// Used to partition cores: selection, balancing and stealing only
    /// consider cores whose mask matches the entity's group.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct GroupMask: u8 {
        const FOREGROUND = 1 << 0;
        const BACKGROUND = 1 << 1;
    }
}

#[cfg(feature = "groups")]
impl SchedGroup {
    /// The service-mask bit a core must carry to serve this group.
    pub fn service_mask(self) -> GroupMask {
        match self {
            SchedGroup::Foreground => GroupMask::FOREGROUND,
            SchedGroup::Background => GroupMask::BACKGROUND,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_conversion() {
        assert_eq!(USEC_PER_TICK, 10_000);
    }

    #[test]
    fn test_enqueue_flags_disjoint() {
        assert!(!EnqueueFlags::WAKEUP.intersects(EnqueueFlags::HEAD));
    }

    #[cfg(feature = "groups")]
    #[test]
    fn test_service_masks() {
        assert_eq!(
            SchedGroup::Foreground.service_mask() | SchedGroup::Background.service_mask(),
            GroupMask::all()
        );
    }
}
