//! Internal layout failures.
//!
//! None of these reach the document-edit caller. `LayoutSession` treats every
//! variant as "incremental state can no longer be trusted": it discards the
//! line table and lays the document out again from scratch.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    /// The breaker returned a zero length line before the document end.
    #[error("line breaker made no progress at offset {offset}")]
    BreakerStalled { offset: usize },

    /// The breaker consumed positions past the end of the document.
    #[error("line at offset {offset} has length {length} but only {available} positions remain")]
    BreakerOverrun {
        offset: usize,
        length: usize,
        available: usize,
    },

    /// Content length larger than the line length.
    #[error("line at offset {offset} reports content length {content_length} > length {length}")]
    MalformedLine {
        offset: usize,
        length: usize,
        content_length: usize,
    },

    /// Two neighbouring records do not touch after a patch.
    #[error("line {index} ends at {end} but the next record starts at {next}")]
    Discontinuity {
        index: usize,
        end: usize,
        next: usize,
    },

    /// A highlight-only reformat changed a line's extent.
    #[error("highlight reformat of line {index} changed its length from {expected} to {found}")]
    HighlightReflow {
        index: usize,
        expected: usize,
        found: usize,
    },

    /// The table covers more text than the document holds.
    #[error("line table ends at {table_end} past document length {document_len}")]
    StaleTable {
        table_end: usize,
        document_len: usize,
    },
}
