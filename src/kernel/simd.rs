//! SIMD-accelerated kernel using the `wide` crate.
//!
//! Template rows are processed 8 pixels at a time with `f32x8` lanes. Every
//! partial sum is an integer below 2^24 for templates of at most 256 pixels,
//! so the f32 accumulation is exact and matches [`ScalarKernel`] bit for bit.
//! Larger templates, or widths that are not a multiple of 8, use the scalar
//! kernel.

use crate::image::ImageView;
use crate::kernel::scalar::ScalarKernel;
use crate::kernel::{Kernel, WindowSums};
use crate::template::PatchTemplate;
use wide::f32x8;

const LANES: usize = 8;
const MAX_EXACT_AREA: usize = 256;

/// Load 8 u8 values and convert to f32x8.
#[inline]
fn load_u8x8_as_f32x8(slice: &[u8]) -> f32x8 {
    f32x8::from([
        slice[0] as f32,
        slice[1] as f32,
        slice[2] as f32,
        slice[3] as f32,
        slice[4] as f32,
        slice[5] as f32,
        slice[6] as f32,
        slice[7] as f32,
    ])
}

/// Horizontal sum of f32x8.
#[inline]
fn hsum(v: f32x8) -> f32 {
    let arr = v.to_array();
    arr[0] + arr[1] + arr[2] + arr[3] + arr[4] + arr[5] + arr[6] + arr[7]
}

/// SIMD kernel for templates with 8-aligned rows.
pub struct SimdKernel;

impl Kernel for SimdKernel {
    fn window_sums(
        image: ImageView<'_, u8>,
        template: &PatchTemplate,
        x: usize,
        y: usize,
    ) -> Option<WindowSums> {
        let size = template.size();
        if size % LANES != 0 || template.area() > MAX_EXACT_AREA {
            return ScalarKernel::window_sums(image, template, x, y);
        }
        if x + size > image.width() || y + size > image.height() {
            return None;
        }

        let mut sum_vec = f32x8::ZERO;
        let mut sum_sq_vec = f32x8::ZERO;
        let mut cross_vec = f32x8::ZERO;

        for ty in 0..size {
            let img_row = &image.row(y + ty)?[x..x + size];
            let tpl_row = template.row(ty);
            let mut tx = 0;
            while tx < size {
                let w = load_u8x8_as_f32x8(&img_row[tx..]);
                let t = load_u8x8_as_f32x8(&tpl_row[tx..]);
                sum_vec += w;
                sum_sq_vec += w * w;
                cross_vec += w * t;
                tx += LANES;
            }
        }

        Some(WindowSums {
            sum: hsum(sum_vec) as i64,
            sum_sq: hsum(sum_sq_vec) as i64,
            cross: hsum(cross_vec) as i64,
        })
    }
}
