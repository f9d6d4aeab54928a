//! Low-level building blocks for custom tracking pipelines.
//!
//! These expose the scoring kernels, warp estimation and level helpers used
//! inside [`PatchFinder`](crate::PatchFinder). Most users should drive the
//! finder instead.

pub use crate::kernel::scalar::ScalarKernel;
#[cfg(feature = "simd")]
pub use crate::kernel::simd::SimdKernel;
pub use crate::kernel::{zmssd_from_sums, Kernel, WindowSums};
pub use crate::refine::GradientTemplate;
pub use crate::util::math::{level_n_pos, level_scale, level_zero_pos};
pub use crate::warp::{
    estimate_warp, select_search_level, PatchWarp, MAX_LEVEL_DET, MIN_LEVEL_DET,
};
