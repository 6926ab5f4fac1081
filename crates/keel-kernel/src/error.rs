use thiserror::Error;

/// A violated kernel calling contract.
///
/// These are caller bugs, not runtime conditions: the kernel aborts the
/// offending thread immediately by panicking with the formatted message.
#[derive(Debug, Error)]
pub enum ContractViolation {
    #[error("priority {value} outside valid range {min}..={max}")]
    PriorityOutOfRange { value: u32, min: u32, max: u32 },

    #[error("ticket aggregate overflowed while summing donations")]
    TicketOverflow,

    #[error("thread {thread} released queue {queue} without owning it")]
    NotOwner { queue: u32, thread: u32 },

    #[error("thread {thread} re-acquired mutex queue {queue} it already holds")]
    RecursiveLock { queue: u32, thread: u32 },

    #[error("condition variable used without holding its mutex")]
    MutexNotHeld,

    #[error("kernel primitive used outside a kernel thread")]
    NotAKernelThread,
}

pub(crate) fn fatal(violation: ContractViolation) -> ! {
    panic!("contract violation: {violation}");
}
