//! WarpMatch tracks small image patches of known 3D points between frames.
//!
//! For each point the [`PatchFinder`] predicts how the point's source patch
//! is warped in the current view, picks a pyramid level where the warped
//! footprint is about one pixel per pixel, synthesizes a template, searches
//! candidate corners around a predicted position with zero-mean SSD and
//! refines the best match to sub-pixel accuracy with inverse compositional
//! Lucas-Kanade.
//!
//! Optional features: `simd` (8-wide scoring kernel), `rayon` (parallel batch
//! tracking), `image-io` (PNG/JPEG loading) and `tracing` (spans and events).

pub mod candidate;
pub mod frame;
pub mod image;
pub mod kernel;
pub mod lowlevel;
pub mod refine;
pub mod search;
pub mod template;
mod trace;
pub mod util;
pub mod warp;

pub use candidate::CornerIndex;
pub use frame::{Frame, FrameLevel, SearchPyramid};
pub use image::pyramid::ImagePyramid;
pub use image::{ImageView, OwnedImage, Pixel};
pub use search::{
    Convergence, FinderConfig, PatchFailure, PatchFinder, PointObservation, PointQuery,
};
pub use template::PatchTemplate;
pub use util::{WarpMatchError, WarpMatchResult};
pub use warp::{PixelRays, PixelVectors, PlaneObservation, PointId, SourcePatch};

#[cfg(feature = "rayon")]
pub use search::track_points_par;
