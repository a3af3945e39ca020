//! Layout session: one owner for all incremental layout state.
//!
//! The session ties the pieces together for a single text surface. Hosts
//! notify it about edits, highlight changes and user input; it turns those
//! into layout passes when asked to `measure`, extends layout in
//! `background_tick`, and builds or reuses line visuals in `arrange`.
//!
//! Observable effects are queued as [`LayoutEvent`]s and drained by the host.
//! Internal failures never reach notification callers: they are logged,
//! counted and answered with a full relayout.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use bitflags::bitflags;
use core_text::{Document, LineBreaker, LineProperties, TextAlignment, TextChange, WrapConstraints};
use tracing::{debug, error, info, warn};

use crate::background::{BackgroundLayout, DEFAULT_BUDGET, DEFAULT_DEBOUNCE, TickResult};
use crate::clock::Clock;
use crate::dirty::{ContentEdit, DirtyRangeTracker, HighlightOwner, RenderInvalidation, TextSegment};
use crate::error::LayoutError;
use crate::incremental::{IncrementalLayoutEngine, LayoutContext, LineChanges};
use crate::line_metrics::{LineMetricsTable, LineRecord, Size};
use crate::metrics::{LayoutMetrics, LayoutMetricsSnapshot};
use crate::viewport::{Viewport, ViewportVisualCache};

bitflags! {
    /// Work the host still owes the session.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LayoutFlags: u8 {
        /// Pending edits or a reset; call `measure`.
        const MEASURE_NEEDED = 0b0000_0001;
        /// Line placements or visuals are stale; call `arrange`.
        const ARRANGE_NEEDED = 0b0000_0010;
        /// The line table was discarded and is being rebuilt from scratch.
        const FULL_RELAYOUT  = 0b0000_0100;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayoutEvent {
    LinesChanged(LineChanges),
    ContentSizeChanged(Size),
    /// All line indices are void; drop anything keyed by them.
    LayoutReset,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutSettings {
    pub properties: LineProperties,
    pub background_budget: Duration,
    pub input_debounce: Duration,
    pub cache_visuals: bool,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            properties: LineProperties::default(),
            background_budget: DEFAULT_BUDGET,
            input_debounce: DEFAULT_DEBOUNCE,
            cache_visuals: true,
        }
    }
}

/// Where a visible line goes, in content coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinePlacement {
    pub line: usize,
    pub y: f64,
    pub x: f64,
}

#[derive(Debug)]
pub struct ArrangeOutput<V> {
    pub placements: Vec<LinePlacement>,
    /// Visuals no longer referenced by the session; the host detaches them.
    pub detached: Vec<V>,
}

macro_rules! layout_ctx {
    ($s:ident, $text:expr) => {
        LayoutContext {
            text: $text,
            breaker: &$s.breaker,
            constraints: &$s.constraints,
            props: &$s.settings.properties,
            metrics: &$s.metrics,
        }
    };
}

pub struct LayoutSession<B, V> {
    breaker: B,
    constraints: WrapConstraints,
    settings: LayoutSettings,
    table: LineMetricsTable,
    dirty: DirtyRangeTracker,
    cache: ViewportVisualCache<V>,
    /// Visuals built while caching was off; detached on the next arrange.
    transient: Vec<(usize, V)>,
    background: BackgroundLayout,
    flags: LayoutFlags,
    content_size: Size,
    repaint: BTreeSet<usize>,
    events: Vec<LayoutEvent>,
    metrics: LayoutMetrics,
}

impl<B: LineBreaker, V> LayoutSession<B, V> {
    pub fn new(breaker: B, constraints: WrapConstraints, settings: LayoutSettings) -> Self {
        Self {
            breaker,
            constraints,
            background: BackgroundLayout::new(settings.background_budget, settings.input_debounce),
            settings,
            table: LineMetricsTable::new(),
            dirty: DirtyRangeTracker::new(),
            cache: ViewportVisualCache::new(),
            transient: Vec::new(),
            flags: LayoutFlags::MEASURE_NEEDED | LayoutFlags::FULL_RELAYOUT,
            content_size: Size::default(),
            repaint: BTreeSet::new(),
            events: Vec::new(),
            metrics: LayoutMetrics::default(),
        }
    }

    pub fn table(&self) -> &LineMetricsTable {
        &self.table
    }

    pub fn constraints(&self) -> WrapConstraints {
        self.constraints
    }

    pub fn settings(&self) -> &LayoutSettings {
        &self.settings
    }

    pub fn flags(&self) -> LayoutFlags {
        self.flags
    }

    pub fn content_size(&self) -> Size {
        self.content_size
    }

    pub fn metrics(&self) -> LayoutMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn cache(&self) -> &ViewportVisualCache<V> {
        &self.cache
    }

    /// Lines whose rendering was invalidated since the last arrange.
    pub fn pending_repaint(&self) -> &BTreeSet<usize> {
        &self.repaint
    }

    /// Visual currently held for `line` (cached or transient).
    pub fn visual(&self, line: usize) -> Option<&V> {
        self.cache.get(line).or_else(|| {
            self.transient
                .iter()
                .find(|(l, _)| *l == line)
                .map(|(_, v)| v)
        })
    }

    /// True once the table covers all of `text` and no edits are pending.
    pub fn is_complete(&self, text: &Document) -> bool {
        self.dirty.is_empty() && self.table.end_offset() == text.len_chars()
    }

    // ---- notifications -------------------------------------------------

    /// The document changed: `added` positions now sit at `start` where
    /// `removed` positions used to be.
    pub fn notify_change(&mut self, start: usize, added: usize, removed: usize) {
        let edit = ContentEdit::new(start, added, removed);
        if edit.is_empty() {
            return;
        }
        self.dirty.merge(edit);
        self.flags |= LayoutFlags::MEASURE_NEEDED;
    }

    pub fn notify_text_change(&mut self, change: TextChange) {
        self.notify_change(change.start, change.added, change.removed);
    }

    /// Rendering of `ranges` changed for `owner` (selection, spell check...).
    pub fn notify_highlight_change(&mut self, ranges: &[TextSegment], owner: HighlightOwner) {
        let layers = owner.layer();
        let mut any = false;
        for seg in ranges.iter().filter(|s| s.end > s.start) {
            self.dirty
                .merge(RenderInvalidation::new(seg.start, seg.end - seg.start, layers));
            any = true;
        }
        if any {
            self.flags |= LayoutFlags::MEASURE_NEEDED;
        }
    }

    /// A keystroke or pointer event; background layout backs off.
    pub fn notify_user_input(&mut self, now: Instant) {
        self.background.note_user_input(now);
    }

    // ---- configuration -------------------------------------------------

    pub fn set_constraints(&mut self, constraints: WrapConstraints) {
        if constraints == self.constraints {
            return;
        }
        let width_changed = constraints.wrap_width != self.constraints.wrap_width;
        self.constraints = constraints;
        if width_changed {
            self.invalidate_all("wrap_width_changed");
        } else {
            self.flags |= LayoutFlags::ARRANGE_NEEDED;
        }
    }

    pub fn set_line_properties(&mut self, properties: LineProperties) {
        let old = self.settings.properties;
        if properties == old {
            return;
        }
        self.settings.properties = properties;
        if properties.tab_size != old.tab_size || properties.wrapping != old.wrapping {
            self.invalidate_all("line_properties_changed");
        } else {
            self.flags |= LayoutFlags::ARRANGE_NEEDED;
            self.update_content_size();
        }
    }

    /// The text source was replaced wholesale.
    pub fn reset_content(&mut self) {
        self.invalidate_all("content_replaced");
    }

    // ---- layout passes -------------------------------------------------

    /// Apply pending edits and make sure the viewport is covered by the table.
    /// Degenerate geometry returns the last known size untouched.
    pub fn measure(&mut self, text: &Document, viewport: Viewport) -> Size {
        if self.constraints.is_degenerate() || viewport.is_degenerate() {
            debug!(
                target: "layout.session",
                wrap_width = self.constraints.wrap_width,
                viewport_width = viewport.width,
                viewport_height = viewport.height,
                "measure_degenerate"
            );
            return self.content_size;
        }
        self.flush_dirty(text);
        let needed = viewport.required_lines(self.settings.properties.line_height);
        if let Err(e) = self.extend_to(text, needed) {
            self.fallback(e);
            if let Err(e) = self.extend_to(text, needed) {
                error!(target: "layout.session", error = %e, "measure_failed_after_relayout");
            }
        }
        self.flags.remove(LayoutFlags::MEASURE_NEEDED | LayoutFlags::FULL_RELAYOUT);
        self.update_content_size();
        debug!(
            target: "layout.session",
            lines = self.table.len(),
            frontier = self.table.end_offset(),
            width = self.content_size.width,
            height = self.content_size.height,
            "measure"
        );
        self.content_size
    }

    /// One background slice. Pending edits are applied first.
    pub fn background_tick(&mut self, text: &Document, clock: &impl Clock) -> TickResult {
        self.flush_dirty(text);
        if self.constraints.is_degenerate() {
            return TickResult::Done;
        }
        let before = self.table.len();
        let result = {
            let ctx = layout_ctx!(self, text);
            self.background.tick(&ctx, &mut self.table, clock)
        };
        match result {
            Ok(outcome) => {
                self.publish_appended(before);
                self.update_content_size();
                if outcome.is_done() {
                    self.flags.remove(LayoutFlags::FULL_RELAYOUT);
                }
                outcome
            }
            Err(e) => {
                self.fallback(e);
                TickResult::Yielded { lines: 0 }
            }
        }
    }

    /// Place visible lines and build visuals for the ones not cached.
    pub fn arrange<F>(&mut self, viewport: Viewport, mut make_visual: F) -> ArrangeOutput<V>
    where
        F: FnMut(usize, &LineRecord) -> V,
    {
        let line_height = self.settings.properties.line_height;
        let window = viewport.line_window(line_height, self.table.len());
        let mut detached: Vec<V> = self.transient.drain(..).map(|(_, v)| v).collect();
        let count = if self.settings.cache_visuals {
            window.len()
        } else {
            0
        };
        self.cache.set_window(window.start, count);

        let mut placements = Vec::with_capacity(window.len());
        let mut hits = 0u64;
        let mut misses = 0u64;
        for line in window.clone() {
            let record = self.table.records()[line];
            if self.cache.get(line).is_some() {
                hits += 1;
            } else {
                misses += 1;
                let visual = make_visual(line, &record);
                if let Some(visual) = self.cache.insert(line, visual) {
                    self.transient.push((line, visual));
                }
            }
            placements.push(LinePlacement {
                line,
                y: line as f64 * line_height,
                x: self.alignment_offset(&record, viewport),
            });
        }
        detached.extend(self.cache.drain_discards());

        LayoutMetrics::add(&self.metrics.cache_hits, hits);
        LayoutMetrics::add(&self.metrics.cache_misses, misses);
        LayoutMetrics::add(&self.metrics.cache_discards, detached.len() as u64);
        self.repaint.clear();
        self.flags.remove(LayoutFlags::ARRANGE_NEEDED);
        debug!(
            target: "layout.viewport",
            first = window.start,
            count = window.len(),
            hits,
            misses,
            detached = detached.len(),
            "arrange"
        );
        ArrangeOutput {
            placements,
            detached,
        }
    }

    pub fn drain_events(&mut self) -> Vec<LayoutEvent> {
        std::mem::take(&mut self.events)
    }

    // ---- internals -----------------------------------------------------

    fn alignment_offset(&self, record: &LineRecord, viewport: Viewport) -> f64 {
        let paragraph = if self.constraints.paragraph_width.is_finite()
            && self.constraints.paragraph_width > 0.0
        {
            self.constraints.paragraph_width
        } else {
            viewport.width
        };
        let slack = (paragraph - record.width).max(0.0);
        match self.settings.properties.alignment {
            TextAlignment::Left => 0.0,
            TextAlignment::Center => slack / 2.0,
            TextAlignment::Right => slack,
        }
    }

    fn extend_to(&mut self, text: &Document, needed: usize) -> Result<(), LayoutError> {
        let before = self.table.len();
        let result = {
            let ctx = layout_ctx!(self, text);
            let mut result = Ok(());
            while self.table.len() < needed {
                match IncrementalLayoutEngine::layout_next_line(&ctx, &mut self.table) {
                    Ok(Some(_)) => {}
                    Ok(None) => break,
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                }
            }
            result
        };
        self.publish_appended(before);
        result
    }

    /// Run pending content and render invalidations through the engine.
    fn flush_dirty(&mut self, text: &Document) {
        if self.dirty.is_empty() {
            if self.table.end_offset() > text.len_chars() {
                self.fallback(LayoutError::StaleTable {
                    table_end: self.table.end_offset(),
                    document_len: text.len_chars(),
                });
            }
            return;
        }
        let pending = self.dirty.take();
        if let Some(edit) = pending.edit {
            let result = {
                let ctx = layout_ctx!(self, text);
                IncrementalLayoutEngine::apply_content_edit(&ctx, &mut self.table, edit)
            };
            match result {
                Ok(changes) => self.publish(changes),
                Err(e) => return self.fallback(e),
            }
        }
        for inv in pending.renders {
            let result = {
                let ctx = layout_ctx!(self, text);
                IncrementalLayoutEngine::apply_render_invalidation(&ctx, &mut self.table, inv)
            };
            let pass = match result {
                Ok(pass) => pass,
                Err(e) => return self.fallback(e),
            };
            for line in pass.repaint.clone() {
                self.cache.invalidate(line);
                self.repaint.insert(line);
            }
            if !pass.repaint.is_empty() {
                self.flags |= LayoutFlags::ARRANGE_NEEDED;
            }
            if !pass.changed.is_empty() {
                self.publish(LineChanges {
                    start: pass.repaint.start,
                    removed: 0,
                    inserted: 0,
                    changed: pass.changed,
                });
            }
        }
        self.update_content_size();
    }

    fn publish(&mut self, changes: LineChanges) {
        if changes.is_empty() {
            return;
        }
        self.cache.apply_line_changes(&changes);
        self.flags |= LayoutFlags::ARRANGE_NEEDED;
        self.events.push(LayoutEvent::LinesChanged(changes));
    }

    fn publish_appended(&mut self, before: usize) {
        let after = self.table.len();
        if after > before {
            self.publish(LineChanges::appended(before, after - before));
        }
    }

    fn update_content_size(&mut self) {
        let size = self.table.content_size(self.settings.properties.line_height);
        if size != self.content_size {
            self.content_size = size;
            self.events.push(LayoutEvent::ContentSizeChanged(size));
        }
    }

    fn fallback(&mut self, err: LayoutError) {
        warn!(target: "layout.session", error = %err, "incremental_layout_fallback");
        LayoutMetrics::add(&self.metrics.invariant_fallbacks, 1);
        self.invalidate_all("invariant_violation");
    }

    /// Drop every line record and cached visual; the next measure and
    /// background ticks rebuild from offset 0.
    fn invalidate_all(&mut self, reason: &'static str) {
        let lines = self.table.len();
        self.table.clear();
        self.dirty.clear();
        self.cache.clear();
        self.repaint.clear();
        self.flags |=
            LayoutFlags::MEASURE_NEEDED | LayoutFlags::ARRANGE_NEEDED | LayoutFlags::FULL_RELAYOUT;
        LayoutMetrics::add(&self.metrics.full_relayouts, 1);
        self.events.push(LayoutEvent::LayoutReset);
        self.update_content_size();
        info!(target: "layout.session", reason, dropped_lines = lines, "layout_reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_text::WrapBreaker;

    fn session(width: f64) -> LayoutSession<WrapBreaker, String> {
        let settings = LayoutSettings {
            properties: LineProperties {
                line_height: 10.0,
                ..LineProperties::default()
            },
            ..LayoutSettings::default()
        };
        LayoutSession::new(WrapBreaker::default(), WrapConstraints::uniform(width), settings)
    }

    fn doc(s: &str) -> Document {
        Document::from_str("t", s).unwrap()
    }

    #[test]
    fn measure_covers_viewport_only() {
        let d = doc(&"line\n".repeat(50));
        let mut s = session(20.0);
        let size = s.measure(&d, Viewport::new(0.0, 30.0, 20.0));
        assert_eq!(s.table().len(), 3);
        assert_eq!(size, Size::new(4.0, 30.0));
        assert!(s.flags().contains(LayoutFlags::ARRANGE_NEEDED));
        assert!(!s.flags().contains(LayoutFlags::MEASURE_NEEDED));
    }

    #[test]
    fn degenerate_viewport_returns_cached_size() {
        let d = doc("abc");
        let mut s = session(20.0);
        let size = s.measure(&d, Viewport::new(0.0, 10.0, 20.0));
        s.notify_change(3, 1, 0);
        assert_eq!(s.measure(&d, Viewport::new(0.0, 0.0, 20.0)), size);
        assert!(s.flags().contains(LayoutFlags::MEASURE_NEEDED));
    }

    #[test]
    fn width_change_resets_layout() {
        let d = doc("aaa bbb ccc");
        let mut s = session(20.0);
        s.measure(&d, Viewport::new(0.0, 100.0, 20.0));
        s.drain_events();
        s.set_constraints(WrapConstraints::uniform(4.0));
        assert!(s.table().is_empty());
        assert!(s.flags().contains(LayoutFlags::FULL_RELAYOUT));
        assert!(s.drain_events().contains(&LayoutEvent::LayoutReset));
        s.measure(&d, Viewport::new(0.0, 100.0, 20.0));
        assert_eq!(s.table().len(), 3);
        assert!(!s.flags().contains(LayoutFlags::FULL_RELAYOUT));
    }

    #[test]
    fn arrange_places_and_caches_lines() {
        let d = doc("a\nbb\nccc\n");
        let mut s = session(20.0);
        let vp = Viewport::new(0.0, 30.0, 20.0);
        s.measure(&d, vp);
        let out = s.arrange(vp, |line, _| format!("line{line}"));
        let ys: Vec<f64> = out.placements.iter().map(|p| p.y).collect();
        assert_eq!(ys, vec![0.0, 10.0, 20.0]);
        assert!(out.detached.is_empty());
        let again = s.arrange(vp, |_, _| panic!("cached"));
        assert_eq!(again.placements.len(), 3);
        assert_eq!(s.metrics().cache_hits, 3);
        assert_eq!(s.visual(1).map(String::as_str), Some("line1"));
    }

    #[test]
    fn right_alignment_uses_paragraph_slack() {
        let d = doc("ab\n");
        let mut s = session(10.0);
        s.set_line_properties(LineProperties {
            line_height: 10.0,
            alignment: TextAlignment::Right,
            ..LineProperties::default()
        });
        let vp = Viewport::new(0.0, 10.0, 10.0);
        s.measure(&d, vp);
        let out = s.arrange(vp, |_, _| String::new());
        assert_eq!(out.placements[0].x, 8.0);
    }
}
