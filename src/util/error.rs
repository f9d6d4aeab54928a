//! Error types for warpmatch.
//!
//! These cover malformed inputs (buffers, configuration, corner lists). Per-point
//! search outcomes such as "no match" are not errors; see
//! [`PatchFailure`](crate::search::PatchFailure).

use thiserror::Error;

/// Result alias for warpmatch operations.
pub type WarpMatchResult<T> = std::result::Result<T, WarpMatchError>;

/// Errors that can occur when constructing warpmatch inputs.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WarpMatchError {
    /// Image width or height is zero or overflows.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// Row stride is smaller than the row width.
    #[error("stride {stride} is smaller than width {width}")]
    InvalidStride { width: usize, stride: usize },
    /// Backing buffer cannot hold the described image.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// Template side length is outside the supported range.
    #[error("invalid patch size {size}: {reason}")]
    InvalidPatchSize { size: usize, reason: &'static str },
    /// A finder configuration value is out of range.
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: &'static str },
    /// Index into a level list or similar container is out of range.
    #[error("{context} index {index} out of bounds (len {len})")]
    IndexOutOfBounds {
        index: usize,
        len: usize,
        context: &'static str,
    },
    /// A candidate corner lies outside its pyramid level.
    #[error("corner ({x}, {y}) outside {width}x{height} level")]
    CornerOutOfBounds {
        x: i32,
        y: i32,
        width: usize,
        height: usize,
    },
    /// Image decoding failed.
    #[cfg(feature = "image-io")]
    #[error("image io failed: {reason}")]
    ImageIo { reason: String },
}
