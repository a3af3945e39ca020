//! Dirty range tracking.
//!
//! Accumulates edit notifications between layout passes. Two kinds of
//! invalidation are tracked separately because they carry different
//! invariants:
//!
//! * [`ContentEdit`]: the document changed and `added` positions now occupy a
//!   region that used to hold `removed` positions.
//! * [`RenderInvalidation`]: only the rendering of a span changed
//!   (selection, spell check squiggles, IME composition...). Document length
//!   is untouched.
//!
//! Content edits are kept sorted and non-overlapping in *current* document
//! coordinates. Each entry's `added` region is where the edited text now
//! lives; its `removed` count is in original (last laid out) positions.
//! Merging an edit that overlaps or touches existing entries folds them into
//! one entry; untouched text between them is counted into both `added` and
//! `removed` so the net position delta is preserved.
//!
//! Invariants:
//! * Content entries are strictly separated: `e[i].start + e[i].added < e[i+1].start`.
//! * Render ranges are sorted, non-empty and do not touch.
//! * `take` returns everything recorded since the previous `take` and leaves
//!   the tracker empty (one-shot consumption).
//!
//! Not thread-safe; owned by the layout session on the layout thread.

use bitflags::bitflags;
use core_text::TextChange;
use tracing::trace;

/// A document mutation in position units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentEdit {
    pub start: usize,
    pub added: usize,
    pub removed: usize,
}

impl ContentEdit {
    pub fn new(start: usize, added: usize, removed: usize) -> Self {
        Self {
            start,
            added,
            removed,
        }
    }

    pub fn insertion(start: usize, added: usize) -> Self {
        Self::new(start, added, 0)
    }

    pub fn deletion(start: usize, removed: usize) -> Self {
        Self::new(start, 0, removed)
    }

    pub fn delta(&self) -> isize {
        self.added as isize - self.removed as isize
    }

    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0
    }

    /// Net insertion (`added >= removed`), the engine's insertion case.
    pub fn is_insertion(&self) -> bool {
        self.added >= self.removed
    }

    /// Pure insert or pure delete. A replacement shifts length and content in
    /// the same edit, which rules out synchronising on offsets alone.
    pub fn is_pure(&self) -> bool {
        self.added == 0 || self.removed == 0
    }

    /// End of the edited region in post-edit coordinates.
    pub fn new_end(&self) -> usize {
        self.start + self.added
    }

    /// End of the edited region in pre-edit coordinates.
    pub fn old_end(&self) -> usize {
        self.start + self.removed
    }
}

impl From<TextChange> for ContentEdit {
    fn from(c: TextChange) -> Self {
        Self::new(c.start, c.added, c.removed)
    }
}

bitflags! {
    /// Highlight layers contributing to a render-only invalidation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HighlightLayers: u8 {
        const SELECTION   = 0b0000_0001;
        const SPELLING    = 0b0000_0010;
        const COMPOSITION = 0b0000_0100;
        const SEARCH      = 0b0000_1000;
        const OTHER       = 0b0001_0000;
    }
}

/// Owner of a highlight change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighlightOwner {
    Selection,
    SpellCheck,
    Composition,
    Search,
    Other,
}

impl HighlightOwner {
    pub fn layer(self) -> HighlightLayers {
        match self {
            HighlightOwner::Selection => HighlightLayers::SELECTION,
            HighlightOwner::SpellCheck => HighlightLayers::SPELLING,
            HighlightOwner::Composition => HighlightLayers::COMPOSITION,
            HighlightOwner::Search => HighlightLayers::SEARCH,
            HighlightOwner::Other => HighlightLayers::OTHER,
        }
    }
}

/// Half-open position span `[start, end)` reported by a highlight owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSegment {
    pub start: usize,
    pub end: usize,
}

impl TextSegment {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }
}

/// A rendering-only change over `[start, start + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderInvalidation {
    pub start: usize,
    pub length: usize,
    pub layers: HighlightLayers,
}

impl RenderInvalidation {
    pub fn new(start: usize, length: usize, layers: HighlightLayers) -> Self {
        Self {
            start,
            length,
            layers,
        }
    }

    pub fn end(&self) -> usize {
        self.start + self.length
    }
}

/// Either kind of pending invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyRange {
    Content(ContentEdit),
    Render(RenderInvalidation),
}

impl From<ContentEdit> for DirtyRange {
    fn from(e: ContentEdit) -> Self {
        DirtyRange::Content(e)
    }
}

impl From<RenderInvalidation> for DirtyRange {
    fn from(r: RenderInvalidation) -> Self {
        DirtyRange::Render(r)
    }
}

/// Everything a layout pass has to process, as returned by `take`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingDirty {
    /// Single merged content edit (if any), to be applied first.
    pub edit: Option<ContentEdit>,
    /// Render-only spans in post-edit coordinates.
    pub renders: Vec<RenderInvalidation>,
}

#[derive(Debug, Default)]
pub struct DirtyRangeTracker {
    edits: Vec<ContentEdit>,
    renders: Vec<RenderInvalidation>,
}

impl DirtyRangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one invalidation.
    pub fn merge(&mut self, range: impl Into<DirtyRange>) {
        match range.into() {
            DirtyRange::Content(e) => self.merge_edit(e),
            DirtyRange::Render(r) => self.merge_render(r),
        }
    }

    fn merge_edit(&mut self, e: ContentEdit) {
        if e.is_empty() {
            return;
        }
        let lo_e = e.start;
        let hi_e = e.old_end();
        // Entries whose current region overlaps or touches [lo_e, hi_e].
        let first = self.edits.partition_point(|x| x.new_end() < lo_e);
        let mut last = first;
        while last < self.edits.len() && self.edits[last].start <= hi_e {
            last += 1;
        }

        let mut lo = lo_e;
        let mut hi = hi_e;
        let mut sum_added = 0usize;
        let mut sum_removed = 0usize;
        for x in &self.edits[first..last] {
            lo = lo.min(x.start);
            hi = hi.max(x.new_end());
            sum_added += x.added;
            sum_removed += x.removed;
        }
        let span = hi - lo;
        let merged = ContentEdit::new(
            lo,
            span - e.removed + e.added,
            span - sum_added + sum_removed,
        );

        let delta = e.delta();
        for x in &mut self.edits[last..] {
            x.start = x.start.saturating_add_signed(delta);
        }
        // An insertion undone by a deletion leaves nothing to lay out.
        let replacement = (!merged.is_empty()).then_some(merged);
        self.edits.splice(first..last, replacement);

        self.shift_renders(&e);
        trace!(
            target: "layout.dirty",
            start = e.start,
            added = e.added,
            removed = e.removed,
            coalesced = last - first,
            pending = self.edits.len(),
            "dirty_edit_merged"
        );
    }

    fn merge_render(&mut self, r: RenderInvalidation) {
        if r.length == 0 {
            return;
        }
        let at = self.renders.partition_point(|x| x.start < r.start);
        self.renders.insert(at, r);
        self.coalesce_renders();
        trace!(
            target: "layout.dirty",
            start = r.start,
            length = r.length,
            layers = ?r.layers,
            pending = self.renders.len(),
            "dirty_render_merged"
        );
    }

    /// Move or widen pending render spans so they stay in current coordinates.
    fn shift_renders(&mut self, e: &ContentEdit) {
        if self.renders.is_empty() {
            return;
        }
        let delta = e.delta();
        for r in &mut self.renders {
            if r.end() <= e.start {
                continue;
            }
            if r.start >= e.old_end() {
                r.start = r.start.saturating_add_signed(delta);
                continue;
            }
            let start = r.start.min(e.start);
            let end = if r.end() > e.old_end() {
                r.end().saturating_add_signed(delta)
            } else {
                e.new_end()
            };
            r.start = start;
            r.length = end.saturating_sub(start);
        }
        self.renders.retain(|r| r.length > 0);
        self.renders.sort_by_key(|r| r.start);
        self.coalesce_renders();
    }

    fn coalesce_renders(&mut self) {
        let mut out: Vec<RenderInvalidation> = Vec::with_capacity(self.renders.len());
        for r in self.renders.drain(..) {
            match out.last_mut() {
                Some(prev) if r.start <= prev.end() => {
                    let end = prev.end().max(r.end());
                    prev.length = end - prev.start;
                    prev.layers |= r.layers;
                }
                _ => out.push(r),
            }
        }
        self.renders = out;
    }

    /// Collapse all pending content edits into one range spanning from the
    /// first edit's start, accounting for the cumulative position delta.
    pub fn merged_range(&self) -> Option<ContentEdit> {
        let first = self.edits.first()?;
        let last = self.edits.last()?;
        let added = last.new_end() - first.start;
        let delta: isize = self.edits.iter().map(ContentEdit::delta).sum();
        let removed = (added as isize - delta) as usize;
        Some(ContentEdit::new(first.start, added, removed))
    }

    /// Pending per-range content edits (sorted, current coordinates).
    pub fn edits(&self) -> &[ContentEdit] {
        &self.edits
    }

    /// Pending render-only spans (sorted, current coordinates).
    pub fn render_ranges(&self) -> &[RenderInvalidation] {
        &self.renders
    }

    pub fn has_content_edits(&self) -> bool {
        !self.edits.is_empty()
    }

    /// True if nothing has been recorded since the last `take`.
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty() && self.renders.is_empty()
    }

    /// Consume everything pending.
    pub fn take(&mut self) -> PendingDirty {
        let edit = self.merged_range();
        self.edits.clear();
        PendingDirty {
            edit,
            renders: std::mem::take(&mut self.renders),
        }
    }

    /// Drop all pending state without returning it.
    pub fn clear(&mut self) {
        self.edits.clear();
        self.renders.clear();
    }
}
