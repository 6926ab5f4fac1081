//! Concurrency core of the Keel teaching kernel.
//!
//! The [`Kernel`] owns one [`sched::Scheduler`], an alarm, and a
//! cooperative executor. All scheduler, queue, and alarm mutations happen
//! under a single state lock, and CPU hand-offs happen inside that lock,
//! so no two kernel threads ever run scheduler logic at once.
//!
//! ```no_run
//! use keel_kernel::{Kernel, KernelConfig};
//!
//! let kernel = Kernel::new(KernelConfig::default());
//! let k = kernel.clone();
//! kernel.run(move || {
//!     let worker = k.spawn("worker", || {});
//!     worker.join();
//! });
//! ```

mod alarm;
mod comm;
pub mod error;
pub mod sched;
pub mod sync;
pub mod thread;
pub mod types;

pub use comm::Communicator;
pub use error::ContractViolation;
pub use keel_machine::{Instant, Random};
pub use sched::{Policy, Scheduler};
pub use sync::{Condition, Mutex, MutexGuard};
pub use thread::{JoinHandle, ThreadBuilder, ThreadStatus};
pub use types::{Priority, QueueId, ThreadHandle};

use std::cell::Cell;
use std::sync::{Arc, Condvar, Mutex as StateLock, MutexGuard as StateGuard};

use keel_machine::Timer;
use log::{debug, info};

use alarm::Alarm;
use error::fatal;
use thread::ThreadManager;

thread_local! {
    static CURRENT: Cell<Option<ThreadHandle>> = const { Cell::new(None) };
}

/// Kernel construction parameters. Explicit, no ambient defaults beyond
/// [`Default`]: deterministic priority policy, entropy-seeded lottery.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub policy: Policy,
    /// Pin the lottery draw sequence; `None` seeds from entropy.
    pub rng_seed: Option<u64>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            policy: Policy::Priority,
            rng_seed: None,
        }
    }
}

pub(crate) struct KernelState {
    pub sched: Scheduler,
    pub threads: ThreadManager,
    pub timer: Timer,
    pub alarm: Alarm,
}

struct KernelInner {
    state: StateLock<KernelState>,
    /// Signalled whenever the dispatcher names a new current thread.
    scheduled: Condvar,
}

/// Handle to one kernel instance. Cheap to clone; every clone refers to
/// the same scheduler, timer, and threads.
#[derive(Clone)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

impl Kernel {
    pub fn new(config: KernelConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => Random::seeded(seed),
            None => Random::from_entropy(),
        };
        let mut sched = Scheduler::new(config.policy, rng);
        let threads = ThreadManager::new(&mut sched);
        info!("kernel up: {:?} policy", config.policy);
        Self {
            inner: Arc::new(KernelInner {
                state: StateLock::new(KernelState {
                    sched,
                    threads,
                    timer: Timer::new(),
                    alarm: Alarm::new(),
                }),
                scheduled: Condvar::new(),
            }),
        }
    }

    pub(crate) fn lock_state(&self) -> StateGuard<'_, KernelState> {
        self.inner.state.lock().expect("kernel state poisoned")
    }

    /// Handle of the calling kernel thread. Fatal when invoked from a host
    /// thread the kernel does not manage.
    pub fn current(&self) -> ThreadHandle {
        CURRENT
            .with(Cell::get)
            .unwrap_or_else(|| fatal(ContractViolation::NotAKernelThread))
    }

    /// Adopt the calling host thread as the first kernel thread, run `f`
    /// on it, and tear it down when `f` returns. Threads spawned inside
    /// should be joined before returning.
    pub fn run<F>(&self, f: F)
    where
        F: FnOnce(),
    {
        let main = {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            let main = state.threads.register(&mut state.sched, "main", None);
            state
                .threads
                .tcbs
                .get_mut(&main)
                .expect("main tcb missing")
                .status = ThreadStatus::Running;
            state.threads.current = Some(main);
            main
        };
        CURRENT.with(|c| c.set(Some(main)));
        f();
        self.exit_current();
        CURRENT.with(|c| c.set(None));
    }

    /// Spawn a kernel thread at the default priority. See [`ThreadBuilder`]
    /// for named/prioritized spawns.
    pub fn spawn<F>(&self, name: &str, f: F) -> JoinHandle
    where
        F: FnOnce() + Send + 'static,
    {
        ThreadBuilder::new(name).spawn(self, f)
    }

    /// Give up the CPU; the dispatcher re-admits the caller by policy.
    pub fn yield_now(&self) {
        let me = self.current();
        let mut guard = self.lock_state();
        {
            let state = &mut *guard;
            state
                .threads
                .tcbs
                .get_mut(&me)
                .expect("yielding thread has no tcb")
                .status = ThreadStatus::Ready;
            state.sched.enqueue(state.threads.ready_queue, me);
        }
        let guard = self.reschedule(guard, me);
        drop(guard);
    }

    /// Sleep for at least `ticks` timer ticks. A non-positive wait still
    /// parks the caller until the next tick; there is no busy-wait and no
    /// early cancel.
    pub fn wait_until(&self, ticks: i64) {
        let me = self.current();
        let mut guard = self.lock_state();
        {
            let state = &mut *guard;
            let deadline = state.timer.now().offset(ticks.max(0) as u64);
            state.alarm.insert(deadline, me);
            state
                .threads
                .tcbs
                .get_mut(&me)
                .expect("sleeping thread has no tcb")
                .status = ThreadStatus::Sleeping;
        }
        let guard = self.reschedule(guard, me);
        drop(guard);
    }

    /// Current simulated time.
    pub fn now(&self) -> Instant {
        self.lock_state().timer.now()
    }

    pub fn policy(&self) -> Policy {
        self.lock_state().sched.policy()
    }

    pub fn priority(&self, thread: ThreadHandle) -> Priority {
        self.lock_state().sched.base_priority(thread)
    }

    pub fn set_priority(&self, thread: ThreadHandle, priority: Priority) {
        self.lock_state().sched.set_base_priority(thread, priority);
    }

    pub fn effective_priority(&self, thread: ThreadHandle) -> Priority {
        self.lock_state().sched.effective_priority(thread)
    }

    /// First entry of a spawned thread: wait until the dispatcher names it
    /// current, then start running user code.
    pub(crate) fn enter_thread(&self, handle: ThreadHandle) {
        CURRENT.with(|c| c.set(Some(handle)));
        let mut guard = self.lock_state();
        while guard.threads.current != Some(handle) {
            guard = self
                .inner
                .scheduled
                .wait(guard)
                .expect("kernel state poisoned");
        }
        drop(guard);
    }

    /// Terminate the calling thread: wake its joiners, drop its scheduling
    /// state, and hand the CPU to the next thread.
    pub(crate) fn exit_current(&self) {
        let me = self.current();
        let mut guard = self.lock_state();
        {
            let state = &mut *guard;
            let tcb = state
                .threads
                .tcbs
                .get_mut(&me)
                .expect("exiting thread has no tcb");
            debug!("thread {} ({}) exit", me.val(), tcb.name);
            tcb.status = ThreadStatus::Terminated;
            let join_queue = tcb.join_queue;
            state.threads.live -= 1;
            state.sched.release(join_queue, me);
            for joiner in state.sched.drain(join_queue) {
                state.threads.make_ready(&mut state.sched, joiner);
            }
            if state.sched.owner(state.threads.ready_queue) == Some(me) {
                state.sched.release(state.threads.ready_queue, me);
            }
            state.sched.detach(me);
            state.threads.current = None;
        }
        self.dispatch(&mut guard);
        drop(guard);
        CURRENT.with(|c| c.set(None));
    }

    /// Hand the CPU over and block until the dispatcher names the caller
    /// current again. The caller must already have moved itself off
    /// Running (to Ready, Blocked, or Sleeping).
    pub(crate) fn reschedule<'a>(
        &self,
        mut guard: StateGuard<'a, KernelState>,
        me: ThreadHandle,
    ) -> StateGuard<'a, KernelState> {
        guard.threads.current = None;
        self.dispatch(&mut guard);
        while guard.threads.current != Some(me) {
            guard = self
                .inner
                .scheduled
                .wait(guard)
                .expect("kernel state poisoned");
        }
        guard
    }

    /// Pick the next thread to run. Advances the clock one tick per
    /// switch; when nothing is ready the clock jumps to the earliest
    /// pending alarm. With no runnable thread and no alarm left, either
    /// every thread has terminated or the survivors wait on each other,
    /// which is a deadlock and panics.
    fn dispatch(&self, guard: &mut StateGuard<'_, KernelState>) {
        let state = &mut **guard;
        state.timer.advance(1);
        loop {
            let now = state.timer.now();
            for woken in state.alarm.wake_due(now) {
                state.threads.make_ready(&mut state.sched, woken);
            }
            if let Some(next) = state.threads.pick_next(&mut state.sched) {
                state
                    .threads
                    .tcbs
                    .get_mut(&next)
                    .expect("picked thread has no tcb")
                    .status = ThreadStatus::Running;
                state.threads.current = Some(next);
                self.inner.scheduled.notify_all();
                return;
            }
            if let Some(deadline) = state.alarm.next_deadline() {
                state.timer.advance_to(deadline);
                continue;
            }
            if state.threads.live == 0 {
                return;
            }
            panic!("deadlock: no runnable threads and no pending alarms");
        }
    }
}
