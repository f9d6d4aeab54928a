//! ZM-SSD scoring kernels.
//!
//! A kernel accumulates the raw sums of one candidate window against the
//! template; [`zmssd_from_sums`] turns them into the zero-mean score. Kernels
//! assume the window lies inside the image and return `None` otherwise.

use crate::image::ImageView;
use crate::template::PatchTemplate;

pub mod scalar;

#[cfg(feature = "simd")]
pub mod simd;

/// Raw sums of a candidate window `W` paired with template `T`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WindowSums {
    /// `Σ W_i`
    pub sum: i64,
    /// `Σ W_i²`
    pub sum_sq: i64,
    /// `Σ T_i · W_i`
    pub cross: i64,
}

/// Kernel trait for window accumulation.
pub trait Kernel {
    /// Accumulates the window with top-left `(x, y)` against `template`.
    fn window_sums(
        image: ImageView<'_, u8>,
        template: &PatchTemplate,
        x: usize,
        y: usize,
    ) -> Option<WindowSums>;
}

/// Zero-mean SSD from cached template sums and window sums.
///
/// With `d_i = T_i - W_i` over `n` pixels this is `Σd² - (Σd)² / n`, the
/// quotient truncated toward zero. The result is never negative and is
/// unchanged when a constant is added to every window pixel.
#[inline]
pub fn zmssd_from_sums(template: &PatchTemplate, window: WindowSums) -> i64 {
    let n = template.area() as i64;
    let diff = template.sum() - window.sum;
    template.sum_sq() + window.sum_sq - 2 * window.cross - diff * diff / n
}
