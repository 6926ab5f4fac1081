//! Simulated machine layer for Keel OS.
//!
//! The kernel consumes two hardware-ish services from this crate: a
//! monotonic tick counter ([`time::Timer`]) and a uniform random integer
//! source ([`random::Random`]). Both are explicit objects owned by the
//! kernel, never ambient statics, so a test can construct its own machine
//! with a pinned seed and a clock it fully controls.

pub mod random;
pub mod time;

pub use random::Random;
pub use time::{Instant, Timer};
