//! Cooperative thread executor. Each kernel thread is backed by a host
//! `std::thread`, but only the one the dispatcher has named current runs.
//! CPU admission goes through a wait queue like any other resource, so
//! the configured policy decides who runs next.

pub mod tcb;

pub use tcb::ThreadStatus;

use std::collections::HashMap;

use log::debug;

use crate::sched::Scheduler;
use crate::types::{Priority, QueueId, ThreadHandle};
use crate::Kernel;

use tcb::Tcb;

pub(crate) struct ThreadManager {
    pub tcbs: HashMap<ThreadHandle, Tcb>,
    pub current: Option<ThreadHandle>,
    /// Non-transfer wait queue gating the CPU itself.
    pub ready_queue: QueueId,
    pub next_handle: u32,
    /// Threads that have not yet terminated.
    pub live: usize,
}

impl ThreadManager {
    pub fn new(sched: &mut Scheduler) -> Self {
        Self {
            tcbs: HashMap::new(),
            current: None,
            ready_queue: sched.new_queue(false),
            next_handle: 1,
            live: 0,
        }
    }

    /// Allocate a handle and attach scheduling state. The thread starts
    /// Ready but is not yet on the ready queue; the caller decides whether
    /// it enters the queue or becomes current directly.
    pub fn register(
        &mut self,
        sched: &mut Scheduler,
        name: &str,
        priority: Option<Priority>,
    ) -> ThreadHandle {
        let handle = ThreadHandle::new(self.next_handle).expect("thread handles start at 1");
        self.next_handle += 1;
        let join_queue = sched.new_queue(true);
        sched.acquire(join_queue, handle);
        if let Some(priority) = priority {
            sched.set_base_priority(handle, priority);
        }
        self.tcbs.insert(
            handle,
            Tcb {
                name: name.to_string(),
                status: ThreadStatus::Ready,
                join_queue,
            },
        );
        self.live += 1;
        debug!("thread {} ({name}) registered", handle.val());
        handle
    }

    /// Move a blocked or sleeping thread back onto the ready queue.
    pub fn make_ready(&mut self, sched: &mut Scheduler, handle: ThreadHandle) {
        let tcb = self.tcbs.get_mut(&handle).expect("unknown thread readied");
        debug_assert!(matches!(
            tcb.status,
            ThreadStatus::Blocked | ThreadStatus::Sleeping
        ));
        tcb.status = ThreadStatus::Ready;
        sched.enqueue(self.ready_queue, handle);
    }

    /// Admit the next thread to the CPU, per policy. The previous holder's
    /// claim on the ready queue is evicted by the acquire.
    pub fn pick_next(&mut self, sched: &mut Scheduler) -> Option<ThreadHandle> {
        sched.select_and_acquire(self.ready_queue)
    }

    pub fn status(&self, handle: ThreadHandle) -> Option<ThreadStatus> {
        self.tcbs.get(&handle).map(|tcb| tcb.status)
    }
}

/// Configuration for a kernel thread prior to spawning.
pub struct ThreadBuilder {
    name: String,
    priority: Option<Priority>,
}

impl ThreadBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            priority: None,
        }
    }

    /// Base priority for the new thread; must be valid for the kernel's
    /// policy. Defaults to the policy default.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Create the thread and put it on the ready queue. It runs when the
    /// dispatcher selects it; the spawner keeps the CPU until it yields or
    /// blocks.
    pub fn spawn<F>(self, kernel: &Kernel, f: F) -> JoinHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = {
            let mut guard = kernel.lock_state();
            let state = &mut *guard;
            let handle = state
                .threads
                .register(&mut state.sched, &self.name, self.priority);
            state.sched.enqueue(state.threads.ready_queue, handle);
            handle
        };
        let worker = kernel.clone();
        std::thread::Builder::new()
            .name(self.name)
            .spawn(move || {
                worker.enter_thread(handle);
                f();
                worker.exit_current();
            })
            .expect("host thread spawn failed");
        JoinHandle {
            kernel: kernel.clone(),
            handle,
        }
    }
}

/// Handle for waiting on a kernel thread's termination. Joining blocks on
/// the target's transfer-enabled join queue, so a high-priority joiner
/// donates to the thread it waits for.
pub struct JoinHandle {
    kernel: Kernel,
    handle: ThreadHandle,
}

impl JoinHandle {
    pub fn handle(&self) -> ThreadHandle {
        self.handle
    }

    /// Block until the target thread terminates. Returns immediately if it
    /// already has.
    pub fn join(self) {
        let me = self.kernel.current();
        let mut guard = self.kernel.lock_state();
        {
            let state = &mut *guard;
            let tcb = match state.threads.tcbs.get(&self.handle) {
                Some(tcb) => tcb,
                None => return,
            };
            if tcb.status == ThreadStatus::Terminated {
                return;
            }
            let join_queue = tcb.join_queue;
            state.sched.enqueue(join_queue, me);
            state
                .threads
                .tcbs
                .get_mut(&me)
                .expect("joiner has no tcb")
                .status = ThreadStatus::Blocked;
        }
        guard = self.kernel.reschedule(guard, me);
        debug_assert_eq!(
            guard.threads.status(self.handle),
            Some(ThreadStatus::Terminated)
        );
        drop(guard);
    }
}
