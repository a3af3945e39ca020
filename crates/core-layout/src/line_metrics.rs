//! Line metrics table.
//!
//! Ordered sequence of [`LineRecord`]s describing how the analyzed prefix of
//! the document is wrapped into visual lines.
//!
//! Invariants:
//! * Contiguous: `records[i].end_offset() == records[i + 1].offset`.
//! * Starts at offset 0 and every record has `length >= 1`, so an empty
//!   document has an empty table.
//! * `max_width` equals the widest record (tracked incrementally; a rescan only
//!   happens when a removed record carried the maximum).
//! * Every record keeps the lookahead its formatting reported. A record's
//!   [`reach`](LineMetricsTable::reach) is the last position its line break
//!   decision depended on; an edit starting at or before it can change the
//!   record.
//!
//! The table only ever covers a prefix of the document. Background layout
//! grows it; the incremental engine patches it in place with `splice`.

use crate::error::LayoutError;
use core_text::FormattedLine;

/// One wrapped visual line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineRecord {
    pub offset: usize,
    pub length: usize,
    pub content_length: usize,
    pub width: f64,
}

impl LineRecord {
    pub fn new(offset: usize, length: usize, content_length: usize, width: f64) -> Self {
        Self {
            offset,
            length,
            content_length,
            width,
        }
    }

    pub fn from_formatted(offset: usize, line: &FormattedLine) -> Self {
        Self::new(offset, line.length, line.content_length, line.width)
    }

    #[inline]
    pub fn end_offset(&self) -> usize {
        self.offset + self.length
    }

    /// True when `[offset, end)` overlaps `[start, end)`.
    pub fn intersects(&self, start: usize, end: usize) -> bool {
        self.offset < end && start < self.end_offset()
    }
}

/// Extent of the laid out content.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LineMetricsTable {
    records: Vec<LineRecord>,
    /// Positions past each record's end its formatting inspected.
    lookaheads: Vec<usize>,
    max_width: f64,
}

impl LineMetricsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&LineRecord> {
        self.records.get(index)
    }

    pub fn records(&self) -> &[LineRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&LineRecord> {
        self.records.last()
    }

    /// First position not covered by the table.
    pub fn end_offset(&self) -> usize {
        self.records.last().map(LineRecord::end_offset).unwrap_or(0)
    }

    /// Lookahead of the last record, 0 for an empty table.
    pub fn frontier_lookahead(&self) -> usize {
        self.lookaheads.last().copied().unwrap_or(0)
    }

    /// End of record `index` plus the positions its formatting inspected.
    pub fn reach(&self, index: usize) -> Option<usize> {
        let record = self.records.get(index)?;
        Some(record.end_offset() + self.lookaheads[index])
    }

    pub fn max_width(&self) -> f64 {
        self.max_width
    }

    /// Width = widest line, height = line count times the uniform line height.
    pub fn content_size(&self, line_height: f64) -> Size {
        Size::new(self.max_width, self.records.len() as f64 * line_height)
    }

    /// Index of the line containing `offset`. Forward biased: an offset on a
    /// boundary belongs to the line that starts there. `None` at or past the
    /// analyzed end.
    pub fn line_index_at(&self, offset: usize) -> Option<usize> {
        let idx = self.records.partition_point(|r| r.end_offset() <= offset);
        (idx < self.records.len()).then_some(idx)
    }

    /// Append one record at the end of the table.
    pub fn push(&mut self, record: LineRecord, lookahead: usize) -> Result<(), LayoutError> {
        let end = self.end_offset();
        if record.offset != end {
            return Err(LayoutError::Discontinuity {
                index: self.records.len().saturating_sub(1),
                end,
                next: record.offset,
            });
        }
        if record.width > self.max_width {
            self.max_width = record.width;
        }
        self.records.push(record);
        self.lookaheads.push(lookahead);
        Ok(())
    }

    /// Add `delta` to the offset of every record from `index` on.
    pub fn shift_from(&mut self, index: usize, delta: isize) {
        if delta == 0 {
            return;
        }
        for r in self.records.iter_mut().skip(index) {
            r.offset = r.offset.saturating_add_signed(delta);
        }
    }

    /// Replace `range` with `fresh` records and their lookaheads in one bulk
    /// operation.
    ///
    /// Splice boundaries are checked for contiguity; on error the table is left
    /// patched but inconsistent and must be discarded by the caller.
    pub fn splice(
        &mut self,
        range: std::ops::Range<usize>,
        fresh: Vec<(LineRecord, usize)>,
    ) -> Result<(), LayoutError> {
        let start = range.start;
        let inserted = fresh.len();
        let fresh_max = fresh.iter().map(|(r, _)| r.width).fold(0.0, f64::max);
        let (records, lookaheads): (Vec<LineRecord>, Vec<usize>) = fresh.into_iter().unzip();
        self.lookaheads.splice(range.clone(), lookaheads);
        let removed: Vec<LineRecord> = self.records.splice(range, records).collect();

        let removed_max = removed.iter().map(|r| r.width).fold(0.0, f64::max);
        if !removed.is_empty() && removed_max >= self.max_width {
            self.rescan_max_width();
        } else if fresh_max > self.max_width {
            self.max_width = fresh_max;
        }

        self.check_boundary(start)?;
        self.check_boundary(start + inserted)
    }

    /// Drop the last record; returns it.
    pub fn retract_frontier(&mut self) -> Option<LineRecord> {
        let popped = self.records.pop()?;
        self.lookaheads.pop();
        if popped.width >= self.max_width {
            self.rescan_max_width();
        }
        Some(popped)
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.lookaheads.clear();
        self.max_width = 0.0;
    }

    /// Full invariant check, O(n).
    pub fn verify(&self) -> Result<(), LayoutError> {
        if let Some(first) = self.records.first() {
            if first.offset != 0 {
                return Err(LayoutError::Discontinuity {
                    index: 0,
                    end: 0,
                    next: first.offset,
                });
            }
        }
        for i in 1..self.records.len() {
            self.check_boundary(i)?;
        }
        Ok(())
    }

    fn rescan_max_width(&mut self) {
        self.max_width = self.records.iter().map(|r| r.width).fold(0.0, f64::max);
    }

    /// Check that record `index - 1` ends where record `index` starts.
    fn check_boundary(&self, index: usize) -> Result<(), LayoutError> {
        if index == 0 || index >= self.records.len() {
            return Ok(());
        }
        let end = self.records[index - 1].end_offset();
        let next = self.records[index].offset;
        if end != next {
            return Err(LayoutError::Discontinuity {
                index: index - 1,
                end,
                next,
            });
        }
        Ok(())
    }
}
