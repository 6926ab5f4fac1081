use crate::types::QueueId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    Ready,
    Running,
    Blocked,
    Sleeping,
    Terminated,
}

/// Per-thread bookkeeping for the cooperative executor. The scheduling
/// state proper (priorities, wait/own sets) lives in the scheduler arena.
pub(crate) struct Tcb {
    pub name: String,
    pub status: ThreadStatus,
    /// Transfer-enabled queue joiners sleep on. The thread owns it from
    /// birth to exit, so joiners donate their priority to it.
    pub join_queue: QueueId,
}
