//! Time source for budgeted work.
//!
//! Background layout and input debouncing read time through [`Clock`] so tests
//! can drive them deterministically with [`ManualClock`].

use std::cell::Cell;
use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Deterministic clock. Every `now` read returns the current instant and then
/// advances it by `step` (zero by default), which lets a test express "each
/// formatted line costs N ms".
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<Instant>,
    step: Duration,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::with_step(Duration::ZERO)
    }

    pub fn with_step(step: Duration) -> Self {
        Self {
            now: Cell::new(Instant::now()),
            step,
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    /// Current instant without auto-advancing.
    pub fn peek(&self) -> Instant {
        self.now.get()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let now = self.now.get();
        self.now.set(now + self.step);
        now
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Point in time after which budgeted work must yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    started: Instant,
    at: Instant,
}

impl Deadline {
    pub fn after(clock: &impl Clock, budget: Duration) -> Self {
        let started = clock.now();
        Self {
            started,
            at: started + budget,
        }
    }

    pub fn expired(&self, clock: &impl Clock) -> bool {
        clock.now() >= self.at
    }

    pub fn started(&self) -> Instant {
        self.started
    }
}
