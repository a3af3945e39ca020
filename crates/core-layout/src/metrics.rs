//! Layout path metrics.
//!
//! Counts what the engine actually did: how many lines were formatted, how
//! often an incremental pass synchronised early, how often invariants forced a
//! full relayout, how well the viewport cache is reused. Snapshots are cheap
//! plain copies suitable for logging and tests.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct LayoutMetrics {
    /// Lines produced by the line breaker (every path).
    pub lines_formatted: AtomicU64,
    /// Content edits processed incrementally.
    pub incremental_passes: AtomicU64,
    /// Incremental passes that stopped at a sync point before the frontier.
    pub sync_early_exits: AtomicU64,
    /// Stored records kept (shifted, not reformatted) after a sync point.
    pub lines_reused: AtomicU64,
    /// Edits starting past the analyzed frontier.
    pub deferred_edits: AtomicU64,
    /// Deferred edits close enough to retract the last record.
    pub frontier_retractions: AtomicU64,
    /// Background ticks that did work.
    pub background_ticks: AtomicU64,
    /// Lines appended by background ticks.
    pub background_lines: AtomicU64,
    /// Ticks skipped while user input was being debounced.
    pub throttled_ticks: AtomicU64,
    /// Table discards (width change, content replacement, invariant fallback).
    pub full_relayouts: AtomicU64,
    /// Sub-count: discards caused by a failed invariant check.
    pub invariant_fallbacks: AtomicU64,
    /// Highlight-only reformat passes.
    pub highlight_passes: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    /// Visuals handed back to the owner for detachment.
    pub cache_discards: AtomicU64,
    /// Duration (ns) of the most recent incremental pass.
    pub last_incremental_ns: AtomicU64,
    /// Duration (ns) of the most recent background tick.
    pub last_tick_ns: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayoutMetricsSnapshot {
    pub lines_formatted: u64,
    pub incremental_passes: u64,
    pub sync_early_exits: u64,
    pub lines_reused: u64,
    pub deferred_edits: u64,
    pub frontier_retractions: u64,
    pub background_ticks: u64,
    pub background_lines: u64,
    pub throttled_ticks: u64,
    pub full_relayouts: u64,
    pub invariant_fallbacks: u64,
    pub highlight_passes: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_discards: u64,
    pub last_incremental_ns: u64,
    pub last_tick_ns: u64,
}

impl LayoutMetrics {
    pub fn snapshot(&self) -> LayoutMetricsSnapshot {
        LayoutMetricsSnapshot {
            lines_formatted: self.lines_formatted.load(Ordering::Relaxed),
            incremental_passes: self.incremental_passes.load(Ordering::Relaxed),
            sync_early_exits: self.sync_early_exits.load(Ordering::Relaxed),
            lines_reused: self.lines_reused.load(Ordering::Relaxed),
            deferred_edits: self.deferred_edits.load(Ordering::Relaxed),
            frontier_retractions: self.frontier_retractions.load(Ordering::Relaxed),
            background_ticks: self.background_ticks.load(Ordering::Relaxed),
            background_lines: self.background_lines.load(Ordering::Relaxed),
            throttled_ticks: self.throttled_ticks.load(Ordering::Relaxed),
            full_relayouts: self.full_relayouts.load(Ordering::Relaxed),
            invariant_fallbacks: self.invariant_fallbacks.load(Ordering::Relaxed),
            highlight_passes: self.highlight_passes.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_discards: self.cache_discards.load(Ordering::Relaxed),
            last_incremental_ns: self.last_incremental_ns.load(Ordering::Relaxed),
            last_tick_ns: self.last_tick_ns.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_ns(slot: &AtomicU64, ns: u128) {
        slot.store(u64::try_from(ns).unwrap_or(u64::MAX), Ordering::Relaxed);
    }
}
