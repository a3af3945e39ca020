//! Viewport geometry and the visual cache for visible lines.
//!
//! `ViewportVisualCache<V>` holds one slot per visible line index in
//! `[first_line, first_line + count)`. A slot is empty or holds the render
//! object built for exactly that line. Objects that fall out of the window or
//! belong to a changed line are moved to a discard list; the owner receives
//! them from the arrange pass and detaches them.
//!
//! Invariants:
//! * slot `i` is empty or holds a visual tagged with line `first_line + i`;
//! * the window always equals the last visible range handed to `set_window`;
//! * a window of one line or less disables caching (every slot stays empty).

use std::ops::Range;

use tracing::trace;

use crate::incremental::LineChanges;

/// Visible rectangle in content coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub top: f64,
    pub height: f64,
    pub width: f64,
}

impl Viewport {
    pub fn new(top: f64, height: f64, width: f64) -> Self {
        Self { top, height, width }
    }

    /// Zero (or negative, or NaN) width or height.
    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Number of lines that must exist for the viewport bottom to be covered.
    pub fn required_lines(&self, line_height: f64) -> usize {
        if self.is_degenerate() || !(line_height > 0.0) {
            return 0;
        }
        ((self.top.max(0.0) + self.height) / line_height).ceil() as usize
    }

    /// Line indices intersecting the viewport, clamped to `line_count`.
    pub fn line_window(&self, line_height: f64, line_count: usize) -> Range<usize> {
        if self.is_degenerate() || !(line_height > 0.0) {
            return 0..0;
        }
        let end = self.required_lines(line_height).min(line_count);
        let first = ((self.top.max(0.0) / line_height).floor() as usize).min(end);
        first..end
    }
}

/// A cached render object tagged with its line.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedVisual<V> {
    pub line: usize,
    pub visual: V,
}

#[derive(Debug)]
pub struct ViewportVisualCache<V> {
    first_line: usize,
    slots: Vec<Option<CachedVisual<V>>>,
    discard: Vec<V>,
}

impl<V> Default for ViewportVisualCache<V> {
    fn default() -> Self {
        Self {
            first_line: 0,
            slots: Vec::new(),
            discard: Vec::new(),
        }
    }
}

impl<V> ViewportVisualCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(&self) -> Range<usize> {
        self.first_line..self.first_line + self.slots.len()
    }

    /// Whether visuals are retained at all for the current window.
    pub fn is_caching(&self) -> bool {
        self.slots.len() > 1
    }

    /// Move the window. Entries whose line stays visible are kept in place by
    /// line index; everything else becomes discard-pending.
    pub fn set_window(&mut self, first: usize, count: usize) {
        if first == self.first_line && count == self.slots.len() {
            return;
        }
        let old = std::mem::take(&mut self.slots);
        let old_window = self.first_line..self.first_line + old.len();
        self.first_line = first;
        self.slots = (0..count).map(|_| None).collect();
        let caching = self.is_caching();
        let mut kept = 0usize;
        for entry in old.into_iter().flatten() {
            if caching && self.window().contains(&entry.line) {
                let at = entry.line - first;
                self.slots[at] = Some(entry);
                kept += 1;
            } else {
                self.discard.push(entry.visual);
            }
        }
        trace!(
            target: "layout.viewport",
            old_first = old_window.start,
            old_count = old_window.len(),
            first,
            count,
            kept,
            pending_discards = self.discard.len(),
            "viewport_window_moved"
        );
    }

    pub fn get(&self, line: usize) -> Option<&V> {
        let at = line.checked_sub(self.first_line)?;
        self.slots
            .get(at)?
            .as_ref()
            .filter(|e| e.line == line)
            .map(|e| &e.visual)
    }

    /// Cache `visual` for `line`. Hands the visual back when the line lies
    /// outside the window or caching is disabled. A visual already cached for
    /// the line becomes discard-pending.
    pub fn insert(&mut self, line: usize, visual: V) -> Option<V> {
        if !self.is_caching() || !self.window().contains(&line) {
            return Some(visual);
        }
        let at = line - self.first_line;
        if let Some(old) = self.slots[at].replace(CachedVisual { line, visual }) {
            self.discard.push(old.visual);
        }
        None
    }

    /// Drop the visual for `line`, if cached. Returns whether one was dropped.
    pub fn invalidate(&mut self, line: usize) -> bool {
        let Some(at) = line.checked_sub(self.first_line) else {
            return false;
        };
        match self.slots.get_mut(at).and_then(Option::take) {
            Some(old) => {
                self.discard.push(old.visual);
                true
            }
            None => false,
        }
    }

    /// Re-index slots after a layout pass: entries of replaced or changed
    /// lines are discarded; entries after the replaced span move with their
    /// line. The window itself stays put until the next `set_window`.
    pub fn apply_line_changes(&mut self, changes: &LineChanges) {
        if changes.is_empty() || self.slots.is_empty() {
            return;
        }
        let count = self.slots.len();
        let old = std::mem::replace(&mut self.slots, (0..count).map(|_| None).collect());
        let window = self.window();
        let mut moved = 0usize;
        let mut dropped = 0usize;
        for entry in old.into_iter().flatten() {
            let target = changes
                .map_old_index(entry.line)
                .filter(|line| !changes.changed.contains(line) && window.contains(line));
            match target {
                Some(line) => {
                    if line != entry.line {
                        moved += 1;
                    }
                    self.slots[line - self.first_line] = Some(CachedVisual {
                        line,
                        visual: entry.visual,
                    });
                }
                None => {
                    dropped += 1;
                    self.discard.push(entry.visual);
                }
            }
        }
        trace!(
            target: "layout.viewport",
            start = changes.start,
            removed = changes.removed,
            inserted = changes.inserted,
            moved,
            dropped,
            "viewport_lines_changed"
        );
    }

    /// Discard every cached visual.
    pub fn clear(&mut self) {
        for entry in self.slots.iter_mut().filter_map(Option::take) {
            self.discard.push(entry.visual);
        }
    }

    pub fn pending_discards(&self) -> usize {
        self.discard.len()
    }

    /// Iterate `(line, cached)` over the window.
    pub fn slots(&self) -> impl Iterator<Item = (usize, Option<&CachedVisual<V>>)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, s)| (self.first_line + i, s.as_ref()))
    }

    pub(crate) fn drain_discards(&mut self) -> Vec<V> {
        std::mem::take(&mut self.discard)
    }
}
