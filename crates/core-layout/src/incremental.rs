//! Incremental layout engine.
//!
//! Given one merged [`ContentEdit`], recompute only the line records the edit
//! can affect and splice them into the [`LineMetricsTable`] in a single bulk
//! operation.
//!
//! Algorithm:
//! 1. Edits starting past the analyzed frontier are deferred. Trailing records
//!    whose reach (end plus lookahead) touches the edit are retracted so
//!    background layout reformats them.
//! 2. Stored records after the last line touched by the edit are shifted by the
//!    edit delta (the "tail").
//! 3. Formatting restarts at the line preceding the edited one (an edit at the
//!    start of a line can pull text back onto the previous line), or earlier
//!    while a preceding record's reach still touches the edit. A line that is
//!    only hanging whitespace can decide its break by looking past a following
//!    emergency-broken line, so one line back is not always enough. It then
//!    continues until a sync point: the running offset reaches the start of a
//!    tail record past the edited region, and either the fresh line ends a
//!    paragraph or the edit is a pure insertion/deletion. Walking past the
//!    shifted frontier or hitting the document end also stops the pass.
//! 4. `[first, tail)` is replaced by the fresh records.
//!
//! Every breaker result is validated; a violation surfaces as [`LayoutError`]
//! and the session falls back to a full relayout.
//!
//! The backward walk stops at the first record whose reach ends before the
//! edit. That is exact for breakers whose reach never decreases from one line
//! to the next, which holds for [`core_text::WrapBreaker`].

use std::collections::BTreeSet;
use std::ops::Range;
use std::time::Instant;

use core_text::{Document, LineBreaker, LineProperties, WrapConstraints};
use tracing::{debug, trace};

use crate::dirty::{ContentEdit, RenderInvalidation};
use crate::error::LayoutError;
use crate::line_metrics::{LineMetricsTable, LineRecord};
use crate::metrics::LayoutMetrics;

/// What a layout pass did to the table, in line indices.
///
/// Records `[start, start + removed)` of the previous table were replaced by
/// `[start, start + inserted)`; indices at or after `start + removed` moved by
/// `inserted - removed`. `changed` lists new indices whose extent or rendering
/// changed; a replaced index missing from it is identical to the record it
/// replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineChanges {
    pub start: usize,
    pub removed: usize,
    pub inserted: usize,
    pub changed: BTreeSet<usize>,
}

impl LineChanges {
    pub fn none() -> Self {
        Self::default()
    }

    /// `count` new records appended at index `start` (end of the table).
    /// Appended lines are new rather than replaced, so `changed` stays empty.
    pub fn appended(start: usize, count: usize) -> Self {
        Self {
            start,
            removed: 0,
            inserted: count,
            changed: BTreeSet::new(),
        }
    }

    /// Nothing moved and nothing changed.
    pub fn is_empty(&self) -> bool {
        self.removed == self.inserted && self.changed.is_empty()
    }

    pub fn count_delta(&self) -> isize {
        self.inserted as isize - self.removed as isize
    }

    /// Where an old index lives now. `None` if its record was dropped.
    pub fn map_old_index(&self, old: usize) -> Option<usize> {
        if old < self.start {
            return Some(old);
        }
        if old < self.start + self.removed {
            return (old < self.start + self.inserted).then_some(old);
        }
        Some(old - self.removed + self.inserted)
    }
}

/// Lines touched by a render-only pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderPass {
    /// Lines intersecting the invalidated span; their visuals must be rebuilt.
    pub repaint: Range<usize>,
    /// Lines whose width changed (extent unchanged).
    pub changed: BTreeSet<usize>,
}

/// Borrowed inputs every layout routine needs.
pub struct LayoutContext<'a, B: ?Sized> {
    pub text: &'a Document,
    pub breaker: &'a B,
    pub constraints: &'a WrapConstraints,
    pub props: &'a LineProperties,
    pub metrics: &'a LayoutMetrics,
}

/// One validated breaker result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormattedRecord {
    pub record: LineRecord,
    pub end_of_paragraph: bool,
    pub lookahead: usize,
}

impl<B: LineBreaker + ?Sized> LayoutContext<'_, B> {
    /// Format the line starting at `offset` and check the breaker contract.
    pub fn format_at(&self, offset: usize) -> Result<FormattedRecord, LayoutError> {
        let available = self.text.len_chars().saturating_sub(offset);
        let line = self
            .breaker
            .format_line(self.text, offset, self.constraints, self.props);
        LayoutMetrics::add(&self.metrics.lines_formatted, 1);
        if line.length == 0 {
            return Err(LayoutError::BreakerStalled { offset });
        }
        if line.length > available {
            return Err(LayoutError::BreakerOverrun {
                offset,
                length: line.length,
                available,
            });
        }
        if line.content_length > line.length {
            return Err(LayoutError::MalformedLine {
                offset,
                length: line.length,
                content_length: line.content_length,
            });
        }
        Ok(FormattedRecord {
            record: LineRecord::from_formatted(offset, &line),
            end_of_paragraph: line.end_of_paragraph,
            lookahead: line.lookahead,
        })
    }
}

/// Namespace for the layout passes. Stateless; all state lives in the table.
#[derive(Debug, Default, Clone, Copy)]
pub struct IncrementalLayoutEngine;

impl IncrementalLayoutEngine {
    /// Apply one content edit to `table`. `ctx.text` is the post-edit document.
    pub fn apply_content_edit<B: LineBreaker + ?Sized>(
        ctx: &LayoutContext<'_, B>,
        table: &mut LineMetricsTable,
        edit: ContentEdit,
    ) -> Result<LineChanges, LayoutError> {
        if edit.is_empty() {
            return Ok(LineChanges::none());
        }
        let old_end = table.end_offset();
        if table.is_empty() || edit.start > old_end {
            return Ok(Self::defer(ctx, table, edit, old_end));
        }

        let started = Instant::now();
        LayoutMetrics::add(&ctx.metrics.incremental_passes, 1);
        let doc_len = ctx.text.len_chars();
        let len = table.len();
        let line_index = table.line_index_at(edit.start).unwrap_or(len);
        let mut first = line_index.saturating_sub(1);
        while first > 0 && table.reach(first - 1).is_some_and(|r| r >= edit.start) {
            first -= 1;
        }

        // The deletion (or an insertion at the frontier) reaches the end of the
        // analyzed text: nothing after it is trustworthy.
        let reaches_frontier = edit.old_end() >= old_end;
        let (affected_end, frontier) = if reaches_frontier {
            (len, edit.start)
        } else {
            let last_touched = table
                .line_index_at(edit.old_end().saturating_sub(1).max(edit.start))
                .unwrap_or(len - 1);
            (last_touched + 1, old_end.saturating_add_signed(edit.delta()))
        };
        table.shift_from(affected_end, edit.delta());

        let pure = edit.is_pure();
        let dirty_end = edit.new_end();
        let mut offset = table.records()[first].offset;
        let mut tail = affected_end;
        let mut fresh: Vec<(LineRecord, usize)> = Vec::new();
        let mut synced = false;
        while offset < doc_len {
            let f = ctx.format_at(offset)?;
            offset = f.record.end_offset();
            fresh.push((f.record, f.lookahead));
            while tail < len && table.records()[tail].offset < offset {
                tail += 1;
            }
            if offset >= frontier {
                break;
            }
            let at_tail = tail < len && table.records()[tail].offset == offset;
            if at_tail && offset >= dirty_end && (f.end_of_paragraph || pure) {
                synced = true;
                break;
            }
        }
        if !synced {
            // Anything left in the tail lies past the new coverage.
            tail = len;
        }

        let removed = tail - first;
        let changed = Self::changed_lines(table.records(), first, &fresh, edit.start);
        let changes = LineChanges {
            start: first,
            removed,
            inserted: fresh.len(),
            changed,
        };
        table.splice(first..tail, fresh)?;

        let reused = len - tail;
        if synced {
            LayoutMetrics::add(&ctx.metrics.sync_early_exits, 1);
            LayoutMetrics::add(&ctx.metrics.lines_reused, reused as u64);
        }
        LayoutMetrics::record_ns(&ctx.metrics.last_incremental_ns, started.elapsed().as_nanos());
        debug!(
            target: "layout.incremental",
            start = edit.start,
            added = edit.added,
            removed = edit.removed,
            first_line = first,
            replaced = changes.removed,
            inserted = changes.inserted,
            synced,
            reused,
            "incremental_layout"
        );
        Ok(changes)
    }

    fn defer<B: LineBreaker + ?Sized>(
        ctx: &LayoutContext<'_, B>,
        table: &mut LineMetricsTable,
        edit: ContentEdit,
        old_end: usize,
    ) -> LineChanges {
        LayoutMetrics::add(&ctx.metrics.deferred_edits, 1);
        let len = table.len();
        while table
            .len()
            .checked_sub(1)
            .and_then(|last| table.reach(last))
            .is_some_and(|r| edit.start <= r)
        {
            table.retract_frontier();
        }
        let retracted = len - table.len();
        if retracted > 0 {
            LayoutMetrics::add(&ctx.metrics.frontier_retractions, retracted as u64);
            trace!(
                target: "layout.incremental",
                start = edit.start,
                frontier = old_end,
                retracted,
                "edit_past_frontier_retract"
            );
            return LineChanges {
                start: table.len(),
                removed: retracted,
                inserted: 0,
                changed: BTreeSet::new(),
            };
        }
        trace!(
            target: "layout.incremental",
            start = edit.start,
            frontier = old_end,
            "edit_past_frontier_deferred"
        );
        LineChanges::none()
    }

    /// Every fresh index except the leading run identical to the record it
    /// replaces and ending before the edit.
    fn changed_lines(
        old: &[LineRecord],
        first: usize,
        fresh: &[(LineRecord, usize)],
        edit_start: usize,
    ) -> BTreeSet<usize> {
        let unchanged = fresh
            .iter()
            .map(|(record, _)| record)
            .zip(old.iter().skip(first))
            .take_while(|(new, old)| new == old && new.end_offset() <= edit_start)
            .count();
        (first + unchanged..first + fresh.len()).collect()
    }

    /// Reformat the lines under a render-only span without touching their
    /// extents. A change in length is an invariant violation.
    pub fn apply_render_invalidation<B: LineBreaker + ?Sized>(
        ctx: &LayoutContext<'_, B>,
        table: &mut LineMetricsTable,
        inv: RenderInvalidation,
    ) -> Result<RenderPass, LayoutError> {
        let Some(first) = table.line_index_at(inv.start) else {
            // Not laid out yet; background layout will format it fresh.
            return Ok(RenderPass::default());
        };
        LayoutMetrics::add(&ctx.metrics.highlight_passes, 1);
        let end = inv.end();
        let mut pass = RenderPass {
            repaint: first..first,
            changed: BTreeSet::new(),
        };
        let mut index = first;
        while index < table.len() {
            let stored = table.records()[index];
            let f = ctx.format_at(stored.offset)?;
            if f.record.length != stored.length
                || f.record.content_length != stored.content_length
            {
                return Err(LayoutError::HighlightReflow {
                    index,
                    expected: stored.length,
                    found: f.record.length,
                });
            }
            if f.record != stored {
                table.splice(index..index + 1, vec![(f.record, f.lookahead)])?;
                pass.changed.insert(index);
            }
            index += 1;
            pass.repaint.end = index;
            // Extents are unchanged, so nothing past the span can move.
            if stored.end_offset() >= end {
                break;
            }
        }
        trace!(
            target: "layout.incremental",
            start = inv.start,
            length = inv.length,
            layers = ?inv.layers,
            lines = pass.repaint.len(),
            width_changes = pass.changed.len(),
            "highlight_layout"
        );
        Ok(pass)
    }

    /// Format one more line at the frontier. `None` when the table already
    /// covers the whole document.
    pub fn layout_next_line<B: LineBreaker + ?Sized>(
        ctx: &LayoutContext<'_, B>,
        table: &mut LineMetricsTable,
    ) -> Result<Option<LineRecord>, LayoutError> {
        let end = table.end_offset();
        let doc_len = ctx.text.len_chars();
        if end > doc_len {
            return Err(LayoutError::StaleTable {
                table_end: end,
                document_len: doc_len,
            });
        }
        if end == doc_len {
            return Ok(None);
        }
        let f = ctx.format_at(end)?;
        table.push(f.record, f.lookahead)?;
        Ok(Some(f.record))
    }

    /// Discard the table and lay out the whole document.
    pub fn full_relayout<B: LineBreaker + ?Sized>(
        ctx: &LayoutContext<'_, B>,
        table: &mut LineMetricsTable,
    ) -> Result<(), LayoutError> {
        table.clear();
        while Self::layout_next_line(ctx, table)?.is_some() {}
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_text::WrapBreaker;

    struct Fixture {
        doc: Document,
        breaker: WrapBreaker,
        constraints: WrapConstraints,
        props: LineProperties,
        metrics: LayoutMetrics,
    }

    impl Fixture {
        fn new(text: &str, width: f64) -> Self {
            Self {
                doc: Document::from_str("t", text).unwrap(),
                breaker: WrapBreaker::default(),
                constraints: WrapConstraints::uniform(width),
                props: LineProperties::default(),
                metrics: LayoutMetrics::default(),
            }
        }

        fn ctx(&self) -> LayoutContext<'_, WrapBreaker> {
            LayoutContext {
                text: &self.doc,
                breaker: &self.breaker,
                constraints: &self.constraints,
                props: &self.props,
                metrics: &self.metrics,
            }
        }

        fn full(&self) -> LineMetricsTable {
            let mut t = LineMetricsTable::new();
            IncrementalLayoutEngine::full_relayout(&self.ctx(), &mut t).unwrap();
            t
        }
    }

    fn offsets(t: &LineMetricsTable) -> Vec<(usize, usize)> {
        t.records().iter().map(|r| (r.offset, r.length)).collect()
    }

    #[test]
    fn full_relayout_covers_document() {
        let f = Fixture::new("AAAA BBBB CCCC", 9.0);
        let t = f.full();
        assert_eq!(offsets(&t), vec![(0, 10), (10, 4)]);
        assert_eq!(t.end_offset(), 14);
    }

    #[test]
    fn insertion_matches_full_relayout() {
        let mut f = Fixture::new("aaa bbb\nccc ddd eee\nfff", 8.0);
        let mut t = f.full();
        let change = f.doc.insert(9, "xx ");
        let changes =
            IncrementalLayoutEngine::apply_content_edit(&f.ctx(), &mut t, change.into()).unwrap();
        assert_eq!(offsets(&t), offsets(&f.full()));
        assert_eq!(offsets(&t), vec![(0, 8), (8, 7), (15, 8), (23, 3)]);
        // Line 0 is reformatted but identical; line 3 is reused after the sync.
        assert_eq!((changes.start, changes.removed, changes.inserted), (0, 3, 3));
        assert_eq!(changes.changed, BTreeSet::from([1, 2]));
        assert_eq!(f.metrics.snapshot().sync_early_exits, 1);
    }

    #[test]
    fn deletion_pulls_text_back_onto_previous_line() {
        let mut f = Fixture::new("aa bbbbb cc", 6.0);
        let mut t = f.full();
        assert_eq!(offsets(&t), vec![(0, 3), (3, 6), (9, 2)]);
        let change = f.doc.remove(3, 6);
        IncrementalLayoutEngine::apply_content_edit(&f.ctx(), &mut t, change.into()).unwrap();
        assert_eq!(offsets(&t), offsets(&f.full()));
    }

    #[test]
    fn edit_past_frontier_is_deferred() {
        let f = Fixture::new("aaaa bbbb cccc dddd", 5.0);
        let mut t = LineMetricsTable::new();
        IncrementalLayoutEngine::layout_next_line(&f.ctx(), &mut t).unwrap();
        assert_eq!(t.end_offset(), 5);
        let changes = IncrementalLayoutEngine::apply_content_edit(
            &f.ctx(),
            &mut t,
            ContentEdit::insertion(15, 1),
        )
        .unwrap();
        assert!(changes.is_empty());
        assert_eq!(t.len(), 1);
        assert_eq!(f.metrics.snapshot().deferred_edits, 1);
    }

    #[test]
    fn edit_inside_frontier_lookahead_retracts() {
        let f = Fixture::new("ab cdefgh", 5.0);
        let mut t = LineMetricsTable::new();
        IncrementalLayoutEngine::layout_next_line(&f.ctx(), &mut t).unwrap();
        assert_eq!(t.end_offset(), 3);
        assert_eq!(t.frontier_lookahead(), 3);
        let changes = IncrementalLayoutEngine::apply_content_edit(
            &f.ctx(),
            &mut t,
            ContentEdit::insertion(5, 1),
        )
        .unwrap();
        assert_eq!(changes.start, 0);
        assert_eq!(changes.removed, 1);
        assert!(t.is_empty());
    }

    #[test]
    fn deletion_reflows_whitespace_line_two_back() {
        let mut f = Fixture::new(" a漢a漢", 5.0);
        let mut t = f.full();
        // Line 0 is only the space; its decision looked past the
        // emergency-broken line 1 to the final wide cluster.
        assert_eq!(offsets(&t), vec![(0, 1), (1, 3), (4, 1)]);
        assert_eq!(t.reach(0), Some(5));
        let change = f.doc.remove(4, 5);
        let changes =
            IncrementalLayoutEngine::apply_content_edit(&f.ctx(), &mut t, change.into()).unwrap();
        assert_eq!(offsets(&t), vec![(0, 4)]);
        assert_eq!(offsets(&t), offsets(&f.full()));
        assert_eq!((changes.start, changes.removed, changes.inserted), (0, 3, 1));
        assert_eq!(changes.changed, BTreeSet::from([0]));
    }

    #[test]
    fn edit_past_frontier_retracts_every_record_reaching_it() {
        let mut f = Fixture::new(" a漢a漢", 5.0);
        let mut t = LineMetricsTable::new();
        for _ in 0..2 {
            IncrementalLayoutEngine::layout_next_line(&f.ctx(), &mut t).unwrap();
        }
        assert_eq!(offsets(&t), vec![(0, 1), (1, 3)]);
        let change = f.doc.insert(5, "a");
        let changes =
            IncrementalLayoutEngine::apply_content_edit(&f.ctx(), &mut t, change.into()).unwrap();
        assert_eq!((changes.start, changes.removed, changes.inserted), (0, 2, 0));
        assert!(t.is_empty());
        assert_eq!(f.metrics.snapshot().frontier_retractions, 2);
        while IncrementalLayoutEngine::layout_next_line(&f.ctx(), &mut t)
            .unwrap()
            .is_some()
        {}
        assert_eq!(offsets(&t), offsets(&f.full()));
    }

    #[test]
    fn render_invalidation_keeps_extents() {
        let f = Fixture::new("aaa bbb\nccc\nddd", 20.0);
        let mut t = f.full();
        let before = offsets(&t);
        let pass = IncrementalLayoutEngine::apply_render_invalidation(
            &f.ctx(),
            &mut t,
            RenderInvalidation::new(5, 4, crate::dirty::HighlightLayers::SELECTION),
        )
        .unwrap();
        assert_eq!(pass.repaint, 0..2);
        assert!(pass.changed.is_empty());
        assert_eq!(offsets(&t), before);
    }

    #[test]
    fn line_changes_map_indices() {
        let c = LineChanges {
            start: 2,
            removed: 3,
            inserted: 1,
            changed: BTreeSet::from([2]),
        };
        assert_eq!(c.map_old_index(1), Some(1));
        assert_eq!(c.map_old_index(2), Some(2));
        assert_eq!(c.map_old_index(3), None);
        assert_eq!(c.map_old_index(5), Some(3));
        assert_eq!(c.count_delta(), -2);
    }
}
