//! Deferred-wake queue driven by timer ticks.
//!
//! Threads park here with an absolute deadline; the kernel's dispatch loop
//! feeds the current tick in and readies every thread whose deadline has
//! passed. Independent of the priority queues: sleeping threads neither
//! donate nor receive priority.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use keel_machine::Instant;
use log::trace;

use crate::types::ThreadHandle;

/// (wake tick, insertion order, thread). Derived `Ord` gives wake-tick
/// order with ties broken by insertion.
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd)]
struct AlarmEntry {
    deadline: Instant,
    seq: u64,
    thread: ThreadHandle,
}

#[derive(Default)]
pub(crate) struct Alarm {
    pending: BinaryHeap<Reverse<AlarmEntry>>,
    seq: u64,
}

impl Alarm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, deadline: Instant, thread: ThreadHandle) {
        trace!("alarm: thread {} until tick {}", thread.val(), deadline.ticks());
        self.pending.push(Reverse(AlarmEntry {
            deadline,
            seq: self.seq,
            thread,
        }));
        self.seq += 1;
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.peek().map(|Reverse(entry)| entry.deadline)
    }

    /// Remove every entry due at or before `now` and return its thread, in
    /// deadline order. A no-op with nothing pending.
    pub fn wake_due(&mut self, now: Instant) -> Vec<ThreadHandle> {
        let mut woken = Vec::new();
        while let Some(Reverse(entry)) = self.pending.peek() {
            if entry.deadline > now {
                break;
            }
            let Reverse(entry) = self.pending.pop().expect("peeked entry vanished");
            woken.push(entry.thread);
        }
        woken
    }
}
