//! Line breaking boundary consumed by the layout engine.
//!
//! The layout engine never measures text itself. It asks a [`LineBreaker`]
//! for one formatted line at a time: given a start position and width
//! constraints, the breaker reports how many positions the line consumes, how
//! many of those are content (line break characters excluded), the rendered
//! width and whether the line ends a paragraph.
//!
//! Contract for implementors:
//! * Deterministic: identical document text, start and constraints produce an
//!   identical [`FormattedLine`]. Incremental layout relies on this to stop
//!   reformatting once new lines line up with stored ones.
//! * Context free: the result depends only on text at and after `start`.
//! * Progress: for `start < len` the returned `length` is at least 1.
//!
//! [`WrapBreaker`] is the greedy word-wrapping implementation used by the
//! binary and the test suites.

use crate::{Document, egc_width};
use unicode_segmentation::UnicodeSegmentation;

/// Whether lines soft-wrap at the wrap width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextWrapping {
    #[default]
    Wrap,
    NoWrap,
}

/// Horizontal alignment of a line inside the paragraph width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextAlignment {
    #[default]
    Left,
    Center,
    Right,
}

/// Properties shared by every line of a text surface.
///
/// All lines share one `line_height`; it is recomputed from these properties
/// rather than measured per line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineProperties {
    pub line_height: f64,
    pub tab_size: u16,
    pub wrapping: TextWrapping,
    pub alignment: TextAlignment,
}

impl Default for LineProperties {
    fn default() -> Self {
        Self {
            line_height: 16.0,
            tab_size: 4,
            wrapping: TextWrapping::Wrap,
            alignment: TextAlignment::Left,
        }
    }
}

/// Width constraints for formatting.
///
/// `wrap_width` is where soft breaks happen; `paragraph_width` is the width
/// lines are aligned within. `WrapBreaker` only consults `wrap_width`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WrapConstraints {
    pub wrap_width: f64,
    pub paragraph_width: f64,
}

impl WrapConstraints {
    pub fn new(wrap_width: f64, paragraph_width: f64) -> Self {
        Self {
            wrap_width,
            paragraph_width,
        }
    }

    /// Same width for wrapping and alignment.
    pub fn uniform(width: f64) -> Self {
        Self::new(width, width)
    }

    /// Zero, negative or NaN wrap widths cannot be laid out.
    pub fn is_degenerate(&self) -> bool {
        !(self.wrap_width > 0.0)
    }
}

/// Result of formatting one line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormattedLine {
    /// Positions consumed, line break characters included.
    pub length: usize,
    /// Positions consumed excluding trailing line break characters.
    pub content_length: usize,
    pub width: f64,
    /// True for hard breaks and for the final line of the document.
    pub end_of_paragraph: bool,
    /// Positions past the line end the breaker inspected to reach its
    /// decision. An edit inside this window can change the line.
    pub lookahead: usize,
}

/// The line breaking service.
pub trait LineBreaker {
    fn format_line(
        &self,
        text: &Document,
        start: usize,
        constraints: &WrapConstraints,
        props: &LineProperties,
    ) -> FormattedLine;
}

impl<T: LineBreaker + ?Sized> LineBreaker for &T {
    fn format_line(
        &self,
        text: &Document,
        start: usize,
        constraints: &WrapConstraints,
        props: &LineProperties,
    ) -> FormattedLine {
        (**self).format_line(text, start, constraints, props)
    }
}

impl<T: LineBreaker + ?Sized> LineBreaker for Box<T> {
    fn format_line(
        &self,
        text: &Document,
        start: usize,
        constraints: &WrapConstraints,
        props: &LineProperties,
    ) -> FormattedLine {
        (**self).format_line(text, start, constraints, props)
    }
}

/// Positions pulled from the document for the first formatting attempt.
/// Doubled whenever a decision needs more text.
const INITIAL_WINDOW: usize = 256;

/// Greedy word-wrapping line breaker.
///
/// Rules, in order of precedence:
/// * `\n`, `\r\n` and `\r` end the line and the paragraph.
/// * Whitespace hangs: it never causes an overflow and trailing whitespace is
///   not counted in the reported width.
/// * A non-whitespace cluster that would overflow breaks the line at the
///   pending whitespace, else at the last word start, else right before the
///   cluster. A line always takes its first cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WrapBreaker {
    cell_width: f64,
}

impl Default for WrapBreaker {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl WrapBreaker {
    /// `cell_width` is the rendered width of a one-cell cluster.
    pub fn new(cell_width: f64) -> Self {
        Self { cell_width }
    }

    pub fn cell_width(&self) -> f64 {
        self.cell_width
    }

    fn cluster_width(&self, g: &str, props: &LineProperties) -> f64 {
        if g == "\t" {
            return f64::from(props.tab_size) * self.cell_width;
        }
        f64::from(egc_width(g)) * self.cell_width
    }

    /// Attempt a decision within `text`. `None` means the window ran out
    /// before a decision could be made and more text is needed.
    fn scan(
        &self,
        text: &str,
        at_end: bool,
        limit: Option<f64>,
        props: &LineProperties,
    ) -> Option<FormattedLine> {
        let mut consumed = 0usize;
        let mut width = 0.0f64;
        let mut pending_ws = 0.0f64;
        let mut last_break: Option<(usize, f64)> = None;
        let mut graphemes = text.graphemes(true).peekable();
        while let Some(g) = graphemes.next() {
            // The final cluster of a partial window may still grow.
            if graphemes.peek().is_none() && !at_end {
                return None;
            }
            let chars = g.chars().count();
            if is_hard_break(g) {
                return Some(FormattedLine {
                    length: consumed + chars,
                    content_length: consumed,
                    width,
                    end_of_paragraph: true,
                    lookahead: 0,
                });
            }
            if is_breaking_whitespace(g) {
                pending_ws += self.cluster_width(g, props);
                consumed += chars;
                continue;
            }
            let candidate = width + pending_ws + self.cluster_width(g, props);
            let overflows = limit.is_some_and(|l| candidate > l);
            if overflows && consumed > 0 {
                let (end, line_width) = if pending_ws > 0.0 {
                    (consumed, width)
                } else {
                    last_break.unwrap_or((consumed, width))
                };
                return Some(FormattedLine {
                    length: end,
                    content_length: end,
                    width: line_width,
                    end_of_paragraph: false,
                    lookahead: consumed + chars - end,
                });
            }
            if pending_ws > 0.0 {
                last_break = Some((consumed, width));
            }
            width = candidate;
            pending_ws = 0.0;
            consumed += chars;
        }
        if !at_end {
            return None;
        }
        Some(FormattedLine {
            length: consumed,
            content_length: consumed,
            width,
            end_of_paragraph: true,
            lookahead: 0,
        })
    }
}

impl LineBreaker for WrapBreaker {
    fn format_line(
        &self,
        text: &Document,
        start: usize,
        constraints: &WrapConstraints,
        props: &LineProperties,
    ) -> FormattedLine {
        let limit = match props.wrapping {
            TextWrapping::Wrap => Some(constraints.wrap_width),
            TextWrapping::NoWrap => None,
        };
        let mut window = INITIAL_WINDOW;
        loop {
            let (chunk, at_end) = text.window(start, window);
            if let Some(line) = self.scan(&chunk, at_end, limit, props) {
                return line;
            }
            window = window.saturating_mul(2);
        }
    }
}

fn is_hard_break(g: &str) -> bool {
    matches!(g, "\n" | "\r\n" | "\r")
}

// No-break spaces glue words together and never offer a break.
fn is_breaking_whitespace(g: &str) -> bool {
    g.chars()
        .all(|c| c.is_whitespace() && c != '\u{00A0}' && c != '\u{202F}' && c != '\u{2007}')
}
