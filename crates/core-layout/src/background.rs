//! Background layout scheduler.
//!
//! Extends the line table forward past the viewport while the host is idle.
//! Each tick formats lines at the frontier until the document is covered or
//! the time budget (default 200ms) runs out. Ticks are skipped while user
//! input was seen within the debounce window (default 2s) so typing never
//! competes with speculative layout.
//!
//! The scheduler is cooperative and single threaded: the host calls `tick`
//! from its idle hook and re-arms while the result is not `Done`. Pending
//! edits must be applied to the table before ticking; the session does this.

use std::time::{Duration, Instant};

use core_text::LineBreaker;
use tracing::trace;

use crate::clock::{Clock, Deadline};
use crate::error::LayoutError;
use crate::incremental::{IncrementalLayoutEngine, LayoutContext};
use crate::line_metrics::LineMetricsTable;
use crate::metrics::LayoutMetrics;

pub const DEFAULT_BUDGET: Duration = Duration::from_millis(200);
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

/// Outcome of one background tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickResult {
    /// The table covers the whole document.
    Done,
    /// Budget exhausted after appending `lines`; more work remains.
    Yielded { lines: usize },
    /// Recent user input; nothing was done. Retry after `remaining`.
    Throttled { remaining: Duration },
}

impl TickResult {
    pub fn is_done(&self) -> bool {
        matches!(self, TickResult::Done)
    }
}

#[derive(Debug, Clone)]
pub struct BackgroundLayout {
    budget: Duration,
    debounce: Duration,
    last_input: Option<Instant>,
}

impl Default for BackgroundLayout {
    fn default() -> Self {
        Self::new(DEFAULT_BUDGET, DEFAULT_DEBOUNCE)
    }
}

impl BackgroundLayout {
    pub fn new(budget: Duration, debounce: Duration) -> Self {
        Self {
            budget,
            debounce,
            last_input: None,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Record a user input event (keystroke, pointer) seen at `now`.
    pub fn note_user_input(&mut self, now: Instant) {
        self.last_input = Some(now);
    }

    /// Time left before ticks may run again, if input is being debounced.
    pub fn throttled_for(&mut self, clock: &impl Clock) -> Option<Duration> {
        let at = self.last_input?;
        let elapsed = clock.now().saturating_duration_since(at);
        if elapsed >= self.debounce {
            self.last_input = None;
            return None;
        }
        Some(self.debounce - elapsed)
    }

    /// Extend `table` toward the end of `ctx.text` within the budget.
    ///
    /// Always formats at least one line when work remains, so a zero budget
    /// still makes progress.
    pub fn tick<B: LineBreaker + ?Sized>(
        &mut self,
        ctx: &LayoutContext<'_, B>,
        table: &mut LineMetricsTable,
        clock: &impl Clock,
    ) -> Result<TickResult, LayoutError> {
        if let Some(remaining) = self.throttled_for(clock) {
            LayoutMetrics::add(&ctx.metrics.throttled_ticks, 1);
            trace!(
                target: "layout.background",
                remaining_ms = remaining.as_millis() as u64,
                "background_throttled"
            );
            return Ok(TickResult::Throttled { remaining });
        }

        let deadline = Deadline::after(clock, self.budget);
        let mut lines = 0usize;
        let done = loop {
            match IncrementalLayoutEngine::layout_next_line(ctx, table)? {
                None => break true,
                Some(_) => lines += 1,
            }
            if deadline.expired(clock) {
                break table.end_offset() >= ctx.text.len_chars();
            }
        };

        if lines > 0 {
            LayoutMetrics::add(&ctx.metrics.background_ticks, 1);
            LayoutMetrics::add(&ctx.metrics.background_lines, lines as u64);
        }
        let elapsed = clock.now().saturating_duration_since(deadline.started());
        LayoutMetrics::record_ns(&ctx.metrics.last_tick_ns, elapsed.as_nanos());
        trace!(
            target: "layout.background",
            lines,
            done,
            frontier = table.end_offset(),
            elapsed_us = elapsed.as_micros() as u64,
            "background_tick"
        );
        Ok(if done {
            TickResult::Done
        } else {
            TickResult::Yielded { lines }
        })
    }
}
