//! Thread-admission scheduler with priority donation.
//!
//! A [`Scheduler`] owns every wait queue and per-thread scheduling state
//! in index-stable arenas referenced by [`QueueId`] and [`ThreadHandle`].
//! Effective priority is base priority combined with the aggregates of
//! owned transfer-enabled queues; both values are cached, mutations
//! invalidate along the thread -> waited-on queue -> owner chain, and
//! reads recompute lazily. The only `&mut Scheduler` reachable at runtime
//! lives behind the kernel state lock.

pub mod policy;

pub use policy::Policy;

use std::collections::HashMap;

use keel_machine::Random;
use log::trace;

use crate::error::{fatal, ContractViolation};
use crate::types::{Priority, QueueId, ThreadHandle};

/// Scheduling state of one thread, attached lazily on first contact and
/// never owning the thread itself.
struct ThreadState {
    /// Base priority, within the policy's valid range.
    base: Priority,
    /// Cached effective priority; meaningful only while `valid`.
    effective: Priority,
    valid: bool,
    /// Queues currently blocking this thread.
    waiting_on: Vec<QueueId>,
    /// Queues this thread currently holds. Disjoint from `waiting_on`.
    owns: Vec<QueueId>,
}

impl ThreadState {
    fn new(base: Priority) -> Self {
        Self {
            base,
            effective: base,
            valid: false,
            waiting_on: Vec::new(),
            owns: Vec::new(),
        }
    }
}

/// One resource's waiting set, in insertion order, plus its single
/// optional owner.
struct WaitQueue {
    /// Whether waiters donate priority to the owner. Fixed at creation.
    transfer: bool,
    waiters: Vec<ThreadHandle>,
    owner: Option<ThreadHandle>,
    /// Cached combined waiter priority; meaningful only while `valid`.
    aggregate: Priority,
    valid: bool,
}

/// The scheduler context. Explicitly constructed and owned by the kernel;
/// there are no ambient statics.
pub struct Scheduler {
    policy: Policy,
    threads: HashMap<ThreadHandle, ThreadState>,
    queues: Vec<WaitQueue>,
    rng: Random,
}

impl Scheduler {
    pub fn new(policy: Policy, rng: Random) -> Self {
        Self {
            policy,
            threads: HashMap::new(),
            queues: Vec::new(),
            rng,
        }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Allocate a wait queue. `transfer` decides whether waiters donate
    /// their priority to the queue's owner.
    pub fn new_queue(&mut self, transfer: bool) -> QueueId {
        let id = QueueId(self.queues.len() as u32);
        self.queues.push(WaitQueue {
            transfer,
            waiters: Vec::new(),
            owner: None,
            aggregate: self.policy.floor(),
            valid: false,
        });
        id
    }

    pub fn owner(&self, queue: QueueId) -> Option<ThreadHandle> {
        self.queues[queue.0 as usize].owner
    }

    pub fn waiter_count(&self, queue: QueueId) -> usize {
        self.queues[queue.0 as usize].waiters.len()
    }

    fn state_mut(&mut self, thread: ThreadHandle) -> &mut ThreadState {
        let default = self.policy.default_priority();
        self.threads
            .entry(thread)
            .or_insert_with(|| ThreadState::new(default))
    }

    pub fn base_priority(&mut self, thread: ThreadHandle) -> Priority {
        self.state_mut(thread).base
    }

    /// Set a thread's base priority. No-op when unchanged; otherwise the
    /// cached value is invalidated and the change propagates through every
    /// queue the thread is waiting on. Panics if `priority` lies outside
    /// the policy's valid range.
    pub fn set_base_priority(&mut self, thread: ThreadHandle, priority: Priority) {
        self.policy.check_range(priority);
        let state = self.state_mut(thread);
        if state.base == priority {
            return;
        }
        state.base = priority;
        self.invalidate_thread(thread);
    }

    /// Effective priority: base combined with the aggregates of every
    /// owned transfer-enabled queue. Recomputed lazily and cached.
    pub fn effective_priority(&mut self, thread: ThreadHandle) -> Priority {
        let state = self.state_mut(thread);
        if state.valid {
            return state.effective;
        }
        // marked valid before recursing: on a cyclic wait graph the walk
        // comes back around, reads the stale value, and stays bounded
        state.valid = true;
        let mut effective = state.base;
        let owns = state.owns.clone();
        for queue in owns {
            let aggregate = self.queue_aggregate(queue);
            effective = self.policy.combine(effective, aggregate);
        }
        self.state_mut(thread).effective = effective;
        effective
    }

    /// Combined priority of a queue's waiting set. Non-transfer queues
    /// never donate and always report the policy floor.
    fn queue_aggregate(&mut self, queue: QueueId) -> Priority {
        let wq = &mut self.queues[queue.0 as usize];
        if !wq.transfer {
            return self.policy.floor();
        }
        if wq.valid {
            return wq.aggregate;
        }
        // same flip-before-recurse rule as effective_priority
        wq.valid = true;
        let waiters = wq.waiters.clone();
        let mut aggregate = self.policy.floor();
        for waiter in waiters {
            let effective = self.effective_priority(waiter);
            aggregate = self.policy.combine(aggregate, effective);
        }
        self.queues[queue.0 as usize].aggregate = aggregate;
        aggregate
    }

    /// Mark a thread's cached priority stale and walk the wait graph:
    /// every queue the thread waits on, then that queue's owner, and so
    /// on. The walk stops at nodes that are already stale, which also
    /// bounds it on cyclic wait graphs.
    fn invalidate_thread(&mut self, thread: ThreadHandle) {
        let state = match self.threads.get_mut(&thread) {
            Some(state) => state,
            None => return,
        };
        if !state.valid {
            return;
        }
        state.valid = false;
        trace!("invalidate thread {}", thread.val());
        for queue in state.waiting_on.clone() {
            self.invalidate_queue(queue);
        }
    }

    fn invalidate_queue(&mut self, queue: QueueId) {
        let wq = &mut self.queues[queue.0 as usize];
        if !wq.valid {
            return;
        }
        wq.valid = false;
        if wq.transfer {
            if let Some(owner) = wq.owner {
                self.invalidate_thread(owner);
            }
        }
    }

    /// Record that `thread` is now waiting on `queue`. The queue must not
    /// be one the thread holds; a queue owner re-joining its own waiting
    /// set gives up ownership first.
    pub fn enqueue(&mut self, queue: QueueId, thread: ThreadHandle) {
        if self.queues[queue.0 as usize].owner == Some(thread) {
            self.release(queue, thread);
        }
        let state = self.state_mut(thread);
        debug_assert!(!state.waiting_on.contains(&queue));
        state.owns.retain(|&q| q != queue);
        state.waiting_on.push(queue);
        self.queues[queue.0 as usize].waiters.push(thread);
        self.invalidate_queue(queue);
    }

    /// Install `thread` as the queue's owner, whether or not it was
    /// waiting. Any current owner is evicted (released) first; the new
    /// owner leaves the waiting set.
    pub fn acquire(&mut self, queue: QueueId, thread: ThreadHandle) {
        if let Some(previous) = self.queues[queue.0 as usize].owner {
            self.release(queue, previous);
        }
        let wq = &mut self.queues[queue.0 as usize];
        let was_waiting = wq.waiters.contains(&thread);
        wq.waiters.retain(|&t| t != thread);
        wq.owner = Some(thread);
        let state = self.state_mut(thread);
        state.waiting_on.retain(|&q| q != queue);
        state.owns.push(queue);
        if was_waiting {
            // the waiting set shrank, so the aggregate is stale
            self.invalidate_queue(queue);
        }
        self.invalidate_thread(thread);
    }

    /// Drop `thread`'s ownership of `queue`. Panics unless `thread` is the
    /// current owner.
    pub fn release(&mut self, queue: QueueId, thread: ThreadHandle) {
        let wq = &mut self.queues[queue.0 as usize];
        if wq.owner != Some(thread) {
            fatal(ContractViolation::NotOwner {
                queue: queue.val(),
                thread: thread.val(),
            });
        }
        wq.owner = None;
        let state = self.state_mut(thread);
        state.owns.retain(|&q| q != queue);
        self.invalidate_thread(thread);
    }

    /// Pick the waiter the policy would admit next, without dequeuing it.
    /// `None` when the waiting set is empty.
    pub fn select(&mut self, queue: QueueId) -> Option<ThreadHandle> {
        let waiters = self.queues[queue.0 as usize].waiters.clone();
        match self.policy {
            Policy::Priority => {
                // strictly-greater scan: earliest enqueued wins ties
                let mut best: Option<(ThreadHandle, Priority)> = None;
                for thread in waiters {
                    let effective = self.effective_priority(thread);
                    match best {
                        Some((_, top)) if effective <= top => {}
                        _ => best = Some((thread, effective)),
                    }
                }
                best.map(|(thread, _)| thread)
            }
            Policy::Lottery => {
                let mut total: Priority = 0;
                for &thread in &waiters {
                    let tickets = self.effective_priority(thread);
                    total = total
                        .checked_add(tickets)
                        .unwrap_or_else(|| fatal(ContractViolation::TicketOverflow));
                }
                if total == 0 {
                    return None;
                }
                let target = 1 + self.rng.below(total);
                let mut acc: Priority = 0;
                for thread in waiters {
                    acc += self.effective_priority(thread);
                    if acc >= target {
                        trace!(
                            "lottery: target {target} of {total} -> thread {}",
                            thread.val()
                        );
                        return Some(thread);
                    }
                }
                None
            }
        }
    }

    /// Select, dequeue, and install as owner in one step. `None` on an
    /// empty queue; that is a normal outcome, not an error.
    pub fn select_and_acquire(&mut self, queue: QueueId) -> Option<ThreadHandle> {
        let next = self.select(queue)?;
        self.acquire(queue, next);
        Some(next)
    }

    /// Remove and return every waiter, oldest first. Used when a resource
    /// ceases to exist (for example a thread's join barrier at exit).
    pub fn drain(&mut self, queue: QueueId) -> Vec<ThreadHandle> {
        let waiters = std::mem::take(&mut self.queues[queue.0 as usize].waiters);
        for &thread in &waiters {
            if let Some(state) = self.threads.get_mut(&thread) {
                state.waiting_on.retain(|&q| q != queue);
            }
        }
        self.invalidate_queue(queue);
        waiters
    }

    /// Discard the scheduling state of a terminated thread.
    pub fn detach(&mut self, thread: ThreadHandle) {
        self.threads.remove(&thread);
    }
}
