//! Rope-based document store plus the line breaking boundary used by layout.
//!
//! Offsets throughout this crate (and the layout engine built on top of it)
//! are *positions*: Unicode scalar value indices into the document, the same
//! unit `ropey` uses for its char APIs. Line breaking never splits a grapheme
//! cluster, so every line boundary produced by a [`LineBreaker`] is also a
//! grapheme boundary.

use anyhow::Result;
use ropey::Rope;

pub mod width;
pub mod wrap;

pub use width::egc_width;
pub use wrap::{
    FormattedLine, LineBreaker, LineProperties, TextAlignment, TextWrapping, WrapBreaker,
    WrapConstraints,
};

/// Description of a single applied mutation in position units.
///
/// `start` is where the change begins, `added` how many positions now occupy
/// the changed region and `removed` how many positions it replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChange {
    pub start: usize,
    pub added: usize,
    pub removed: usize,
}

impl TextChange {
    pub fn new(start: usize, added: usize, removed: usize) -> Self {
        Self {
            start,
            added,
            removed,
        }
    }

    /// Net change in document length.
    pub fn delta(&self) -> isize {
        self.added as isize - self.removed as isize
    }

    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

/// A text document backed by a `ropey::Rope`.
#[derive(Clone)]
pub struct Document {
    rope: Rope,
    pub name: String,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("name", &self.name)
            .field("len_chars", &self.rope.len_chars())
            .finish()
    }
}

impl Document {
    /// Construct a document from an in-memory string slice.
    pub fn from_str(name: impl Into<String>, content: &str) -> Result<Self> {
        Ok(Self {
            rope: Rope::from_str(content),
            name: name.into(),
        })
    }

    /// Read a document from disk.
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let rope = Rope::from_reader(std::io::BufReader::new(file))?;
        Ok(Self {
            rope,
            name: path.display().to_string(),
        })
    }

    /// Total length in positions.
    pub fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    pub fn is_empty(&self) -> bool {
        self.rope.len_chars() == 0
    }

    /// Number of hard (newline separated) lines as ropey counts them.
    pub fn hard_line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Up to `max` positions starting at `start`, and whether the returned
    /// slice reaches the end of the document.
    pub fn window(&self, start: usize, max: usize) -> (String, bool) {
        let len = self.rope.len_chars();
        let s = start.min(len);
        let e = s.saturating_add(max).min(len);
        (self.rope.slice(s..e).to_string(), e == len)
    }

    /// Text in the position range `[start, end)` (clamped).
    pub fn slice(&self, start: usize, end: usize) -> String {
        let len = self.rope.len_chars();
        let s = start.min(len);
        let e = end.min(len);
        if s >= e {
            return String::new();
        }
        self.rope.slice(s..e).to_string()
    }

    /// Full document text.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    /// Insert `text` at `offset` (clamped to the document end).
    pub fn insert(&mut self, offset: usize, text: &str) -> TextChange {
        let at = offset.min(self.rope.len_chars());
        self.rope.insert(at, text);
        TextChange::new(at, text.chars().count(), 0)
    }

    /// Remove the position range `[start, end)` (clamped).
    pub fn remove(&mut self, start: usize, end: usize) -> TextChange {
        let len = self.rope.len_chars();
        let s = start.min(len);
        let e = end.min(len).max(s);
        self.rope.remove(s..e);
        TextChange::new(s, 0, e - s)
    }

    /// Replace `[start, end)` with `text` as one change.
    pub fn replace(&mut self, start: usize, end: usize, text: &str) -> TextChange {
        let removed = self.remove(start, end);
        let at = removed.start;
        self.rope.insert(at, text);
        TextChange::new(at, text.chars().count(), removed.removed)
    }
}
