//! Document segmentation.
//!
//! - `types`: `Document`, `Segment`, `EnrichedSegment` and the context tag format
//! - `sentences`: sentence-level units
//! - `segmenter`: similarity-driven boundary segmentation
//! - `loader`: plain-text document source

pub mod loader;
pub mod segmenter;
pub mod sentences;
pub mod types;

pub use segmenter::{BoundarySegmenter, SegmenterConfig};
pub use types::{parse_context, strip_context, Document, EnrichedSegment, Segment};
