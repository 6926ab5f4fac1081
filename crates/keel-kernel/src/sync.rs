//! Sleeping mutex and condition variable, layered above the scheduler.
//! The mutex queue is transfer-enabled, so waiters donate to the holder;
//! condition sleep/wake release and reacquire the mutex around a
//! suspend/resume pair.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};

use crate::error::{fatal, ContractViolation};
use crate::thread::ThreadStatus;
use crate::types::QueueId;
use crate::Kernel;

/// Mutual exclusion for kernel threads, owning the data it protects.
///
/// Unlike a spinlock, a contended `lock` puts the caller to sleep; the
/// holder hands the lock directly to the waiter the policy selects, and
/// while waiters exist their priority is donated to the holder.
pub struct Mutex<T> {
    kernel: Kernel,
    queue: QueueId,
    data: UnsafeCell<T>,
}

// Exclusive access is guaranteed by wait-queue ownership: only the queue
// owner can reach the data, and the queue has at most one owner.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    pub fn new(kernel: &Kernel, data: T) -> Self {
        let queue = kernel.lock_state().sched.new_queue(true);
        Self {
            kernel: kernel.clone(),
            queue,
            data: UnsafeCell::new(data),
        }
    }

    /// Acquire the mutex, sleeping until it is available. Re-acquiring a
    /// mutex the caller already holds is fatal.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        let me = self.kernel.current();
        let mut guard = self.kernel.lock_state();
        match guard.sched.owner(self.queue) {
            None => {
                guard.sched.acquire(self.queue, me);
            }
            Some(holder) if holder == me => {
                fatal(ContractViolation::RecursiveLock {
                    queue: self.queue.val(),
                    thread: me.val(),
                });
            }
            Some(_) => {
                let state = &mut *guard;
                state.sched.enqueue(self.queue, me);
                state
                    .threads
                    .tcbs
                    .get_mut(&me)
                    .expect("locking thread has no tcb")
                    .status = ThreadStatus::Blocked;
                guard = self.kernel.reschedule(guard, me);
                // unlock handed ownership to us before waking us
                debug_assert_eq!(guard.sched.owner(self.queue), Some(me));
            }
        }
        drop(guard);
        MutexGuard {
            mutex: self,
            active: true,
        }
    }

    fn unlock(&self) {
        let me = self.kernel.current();
        let mut guard = self.kernel.lock_state();
        let state = &mut *guard;
        state.sched.release(self.queue, me);
        // direct hand-off: the selected waiter becomes owner while still
        // waking up, so no third thread can barge in between
        if let Some(next) = state.sched.select_and_acquire(self.queue) {
            state.threads.make_ready(&mut state.sched, next);
        }
    }

    pub(crate) fn queue(&self) -> QueueId {
        self.queue
    }

    pub(crate) fn kernel(&self) -> &Kernel {
        &self.kernel
    }
}

/// Scoped access to the data of a locked [`Mutex`]. Unlocks on drop.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
    active: bool,
}

impl<'a, T> MutexGuard<'a, T> {
    /// Forget the lock without releasing it; used by [`Condition::wait`],
    /// which releases under its own critical section.
    fn defuse(mut self) -> &'a Mutex<T> {
        self.active = false;
        self.mutex
    }

    fn rearm(mutex: &'a Mutex<T>) -> Self {
        Self {
            mutex,
            active: true,
        }
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        if self.active {
            self.mutex.unlock();
        }
    }
}

/// Condition variable bound to one [`Mutex`].
///
/// Wake order among several blocked waiters follows the kernel's
/// selection policy, not FIFO.
pub struct Condition {
    kernel: Kernel,
    /// Non-transfer: parked waiters donate to nobody.
    queue: QueueId,
    mutex_queue: QueueId,
}

impl Condition {
    pub fn new<T>(mutex: &Mutex<T>) -> Self {
        let queue = mutex.kernel().lock_state().sched.new_queue(false);
        Self {
            kernel: mutex.kernel().clone(),
            queue,
            mutex_queue: mutex.queue(),
        }
    }

    /// Atomically release the mutex and sleep; reacquire before returning.
    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let mutex = guard.defuse();
        if mutex.queue() != self.mutex_queue {
            fatal(ContractViolation::MutexNotHeld);
        }
        let me = self.kernel.current();
        let mut guard = self.kernel.lock_state();
        {
            let state = &mut *guard;
            if state.sched.owner(self.mutex_queue) != Some(me) {
                fatal(ContractViolation::MutexNotHeld);
            }
            state.sched.release(self.mutex_queue, me);
            if let Some(next) = state.sched.select_and_acquire(self.mutex_queue) {
                state.threads.make_ready(&mut state.sched, next);
            }
            state.sched.enqueue(self.queue, me);
            state
                .threads
                .tcbs
                .get_mut(&me)
                .expect("waiting thread has no tcb")
                .status = ThreadStatus::Blocked;
        }
        guard = self.kernel.reschedule(guard, me);
        // reacquire the monitor; an unlock may have handed it to us already
        loop {
            let state = &mut *guard;
            match state.sched.owner(self.mutex_queue) {
                None => {
                    state.sched.acquire(self.mutex_queue, me);
                    break;
                }
                Some(holder) if holder == me => break,
                Some(_) => {
                    state.sched.enqueue(self.mutex_queue, me);
                    state
                        .threads
                        .tcbs
                        .get_mut(&me)
                        .expect("waiting thread has no tcb")
                        .status = ThreadStatus::Blocked;
                    guard = self.kernel.reschedule(guard, me);
                }
            }
        }
        drop(guard);
        MutexGuard::rearm(mutex)
    }

    /// Wake the waiter the policy selects, if any. The caller must hold
    /// the mutex.
    pub fn notify_one(&self) {
        let me = self.kernel.current();
        let mut guard = self.kernel.lock_state();
        let state = &mut *guard;
        if state.sched.owner(self.mutex_queue) != Some(me) {
            fatal(ContractViolation::MutexNotHeld);
        }
        if let Some(woken) = state.sched.select_and_acquire(self.queue) {
            // ownership of a condition queue is meaningless; drop it so the
            // next notify can select again
            state.sched.release(self.queue, woken);
            state.threads.make_ready(&mut state.sched, woken);
        }
    }

    /// Wake every waiter. The caller must hold the mutex.
    pub fn notify_all(&self) {
        let me = self.kernel.current();
        let mut guard = self.kernel.lock_state();
        let state = &mut *guard;
        if state.sched.owner(self.mutex_queue) != Some(me) {
            fatal(ContractViolation::MutexNotHeld);
        }
        for woken in state.sched.drain(self.queue) {
            state.threads.make_ready(&mut state.sched, woken);
        }
    }
}
