use crate::error::{fatal, ContractViolation};
use crate::types::Priority;

/// Resource-selection policy shared by every wait queue of a scheduler.
///
/// The two policies differ only in how donations combine and how a waiter
/// is selected; all enqueue/acquire/invalidate mechanics are common.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Policy {
    /// Deterministic highest-priority-first. Donations take the maximum;
    /// ties resolve to the earliest-enqueued waiter.
    Priority,
    /// Randomized ticket-weighted lottery. Donations pool additively and
    /// selection probability is proportional to ticket share.
    Lottery,
}

impl Policy {
    pub fn min_priority(self) -> Priority {
        match self {
            // A zero-ticket thread could never win a draw.
            Policy::Priority => 0,
            Policy::Lottery => 1,
        }
    }

    pub fn max_priority(self) -> Priority {
        match self {
            Policy::Priority => 7,
            Policy::Lottery => u32::MAX,
        }
    }

    pub fn default_priority(self) -> Priority {
        1
    }

    /// Aggregate of an empty waiting set; identity element of [`combine`].
    ///
    /// [`combine`]: Policy::combine
    pub(crate) fn floor(self) -> Priority {
        0
    }

    /// Fold one more donation into an aggregate.
    pub(crate) fn combine(self, acc: Priority, donation: Priority) -> Priority {
        match self {
            Policy::Priority => acc.max(donation),
            Policy::Lottery => acc
                .checked_add(donation)
                .unwrap_or_else(|| fatal(ContractViolation::TicketOverflow)),
        }
    }

    pub(crate) fn check_range(self, value: Priority) {
        let (min, max) = (self.min_priority(), self.max_priority());
        if value < min || value > max {
            fatal(ContractViolation::PriorityOutOfRange { value, min, max });
        }
    }
}
