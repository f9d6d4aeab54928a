//! Fixed-size matching templates.
//!
//! A template is an N×N row-major `u8` buffer allocated once per finder. Its
//! pixel sum and sum of squares are cached for ZM-SSD scoring and refreshed by
//! every operation that rewrites the pixels.

use crate::image::{ImageView, Pixel};

mod warp;

/// N×N matching template with cached intensity sums.
#[derive(Clone, Debug)]
pub struct PatchTemplate {
    size: usize,
    data: Vec<u8>,
    // Staging buffer for warped sampling, swapped with `data` on success.
    scratch: Vec<u8>,
    sum: i64,
    sum_sq: i64,
}

impl PatchTemplate {
    /// Allocates a zeroed `size`×`size` template.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            data: vec![0; size * size],
            scratch: vec![0; size * size],
            sum: 0,
            sum_sq: 0,
        }
    }

    /// Builds a template from row-major pixels; `data.len()` must be `size²`.
    pub fn from_pixels(size: usize, data: &[u8]) -> Option<Self> {
        if data.len() != size * size {
            return None;
        }
        let mut tpl = Self::new(size);
        tpl.data.copy_from_slice(data);
        tpl.refresh_sums();
        Some(tpl)
    }

    /// Side length in pixels.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of pixels, `size²`.
    pub fn area(&self) -> usize {
        self.data.len()
    }

    /// Offset of the centre pixel from the top-left corner (`size / 2`).
    pub fn center(&self) -> i32 {
        (self.size / 2) as i32
    }

    /// Row-major pixel data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Pixel row `y`.
    pub fn row(&self, y: usize) -> &[u8] {
        &self.data[y * self.size..(y + 1) * self.size]
    }

    /// Cached pixel sum.
    pub fn sum(&self) -> i64 {
        self.sum
    }

    /// Cached sum of squared pixels.
    pub fn sum_sq(&self) -> i64 {
        self.sum_sq
    }

    /// Copies the block centred on `center` (top-left `center - size/2`).
    ///
    /// Returns false, leaving the template untouched, when the block does not
    /// fit inside `image`. A block touching the image edge is accepted.
    pub fn copy_block(&mut self, image: ImageView<'_, u8>, center: Pixel) -> bool {
        let top_left = Pixel::new(center.x - self.center(), center.y - self.center());
        if !image.contains_block(top_left, self.size) {
            return false;
        }
        let x0 = top_left.x as usize;
        for ty in 0..self.size {
            let Some(src) = image.row(top_left.y as usize + ty) else {
                return false;
            };
            self.data[ty * self.size..(ty + 1) * self.size]
                .copy_from_slice(&src[x0..x0 + self.size]);
        }
        self.refresh_sums();
        true
    }

    fn refresh_sums(&mut self) {
        let (sum, sum_sq) = self.data.iter().fold((0i64, 0i64), |(s, sq), &v| {
            let v = i64::from(v);
            (s + v, sq + v * v)
        });
        self.sum = sum;
        self.sum_sq = sum_sq;
    }
}
