use log::trace;

/// Simulated time instant (monotonic), measured in timer ticks.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Instant {
    ticks: u64,
}

impl Instant {
    pub const ZERO: Instant = Instant { ticks: 0 };

    pub fn from_ticks(ticks: u64) -> Self {
        Self { ticks }
    }

    pub fn ticks(self) -> u64 {
        self.ticks
    }

    /// Instant `ticks` ticks after this one, saturating at the end of time.
    pub fn offset(self, ticks: u64) -> Instant {
        Instant {
            ticks: self.ticks.saturating_add(ticks),
        }
    }
}

/// Monotonic tick counter driven by the kernel's dispatch loop.
///
/// Time never moves on its own: the owner advances it, either one tick per
/// context switch or directly to a deadline when the machine is idle.
pub struct Timer {
    now: Instant,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    pub fn new() -> Self {
        Self { now: Instant::ZERO }
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    /// Advance the clock by `ticks` and return the new time.
    pub fn advance(&mut self, ticks: u64) -> Instant {
        self.now = self.now.offset(ticks);
        self.now
    }

    /// Jump the clock forward to `deadline`. A deadline in the past is a
    /// no-op; the clock is monotonic.
    pub fn advance_to(&mut self, deadline: Instant) -> Instant {
        if deadline > self.now {
            trace!("timer: idle jump {} -> {}", self.now.ticks(), deadline.ticks());
            self.now = deadline;
        }
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_is_monotonic() {
        let mut timer = Timer::new();
        assert_eq!(timer.now(), Instant::ZERO);
        assert_eq!(timer.advance(5).ticks(), 5);
        assert_eq!(timer.advance_to(Instant::from_ticks(3)).ticks(), 5);
        assert_eq!(timer.advance_to(Instant::from_ticks(9)).ticks(), 9);
    }

    #[test]
    fn offset_saturates() {
        let t = Instant::from_ticks(u64::MAX - 1);
        assert_eq!(t.offset(10).ticks(), u64::MAX);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn time_never_moves_backwards(
                steps in proptest::collection::vec(0u64..1000, 1..50),
            ) {
                let mut timer = Timer::new();
                let mut last = timer.now();
                for (i, step) in steps.iter().enumerate() {
                    let now = if i % 2 == 0 {
                        timer.advance(*step)
                    } else {
                        timer.advance_to(Instant::from_ticks(*step))
                    };
                    prop_assert!(now >= last);
                    last = now;
                }
            }
        }
    }
}
