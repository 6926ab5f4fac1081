use core::num::NonZeroU32;

/// Thread identifier
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ThreadHandle(NonZeroU32);

impl ThreadHandle {
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    pub fn val(&self) -> u32 {
        self.0.get()
    }
}

/// Index of a wait queue in the scheduler's arena. Queues live for the
/// lifetime of the scheduler; ids are never reused.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct QueueId(pub(crate) u32);

impl QueueId {
    pub fn val(&self) -> u32 {
        self.0
    }
}

/// Scheduling priority. The deterministic policy ranges over 0..=7; the
/// lottery policy counts tickets from 1 up.
pub type Priority = u32;
