//! Incremental layout for wrapped, scrollable text.
//!
//! The document is laid out into visual lines described by a
//! [`LineMetricsTable`]. Edits are recorded by a [`DirtyRangeTracker`] and
//! applied by the [`IncrementalLayoutEngine`], which reformats only the lines
//! an edit can affect. [`BackgroundLayout`] extends the table toward the end
//! of the document in budgeted slices, and a [`ViewportVisualCache`] keeps
//! render objects for the visible lines. [`LayoutSession`] owns all of it for
//! one text surface.

pub mod background;
pub mod clock;
pub mod dirty;
pub mod error;
pub mod incremental;
pub mod line_metrics;
pub mod metrics;
pub mod session;
pub mod viewport;

pub use background::{BackgroundLayout, TickResult};
pub use clock::{Clock, Deadline, ManualClock, SystemClock};
pub use dirty::{
    ContentEdit, DirtyRange, DirtyRangeTracker, HighlightLayers, HighlightOwner, PendingDirty,
    RenderInvalidation, TextSegment,
};
pub use error::LayoutError;
pub use incremental::{IncrementalLayoutEngine, LayoutContext, LineChanges, RenderPass};
pub use line_metrics::{LineMetricsTable, LineRecord, Size};
pub use metrics::{LayoutMetrics, LayoutMetricsSnapshot};
pub use session::{
    ArrangeOutput, LayoutEvent, LayoutFlags, LayoutSession, LayoutSettings, LinePlacement,
};
pub use viewport::{CachedVisual, Viewport, ViewportVisualCache};
