//! Candidate search locations.
//!
//! Corners come from an external detector; this module only indexes them by
//! row so a search can visit the rows of its bounding box directly.

pub mod corners;

pub use corners::CornerIndex;
