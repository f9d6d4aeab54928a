//! Image pyramid construction for grayscale `u8` images.
//!
//! Downsampling uses a 2x2 box filter with integer rounding:
//! `dst = ((a + b + c + d) + 2) / 4`, so level `n` has half the size of level
//! `n - 1` (odd trailing rows and columns are dropped).

use crate::image::{ImageView, OwnedImage};
use crate::util::{WarpMatchError, WarpMatchResult};

/// Owned image pyramid built from a base level.
#[derive(Clone, Debug)]
pub struct ImagePyramid {
    levels: Vec<OwnedImage>,
}

impl ImagePyramid {
    /// Builds a pyramid from a base grayscale view.
    ///
    /// `max_levels` is clamped to at least 1 so the base level is always
    /// present. Construction stops early once a level would drop below 2×2.
    pub fn build_u8(base: ImageView<'_, u8>, max_levels: usize) -> WarpMatchResult<Self> {
        let max_levels = max_levels.max(1);
        let mut levels = vec![OwnedImage::from_view(base)?];

        while levels.len() < max_levels {
            let Some(prev) = levels.last() else {
                break;
            };
            if prev.width() < 4 || prev.height() < 4 {
                break;
            }
            let next = halve(prev)?;
            levels.push(next);
        }

        Ok(Self { levels })
    }

    /// Returns the number of levels.
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Returns all pyramid levels (level 0 is the base resolution).
    pub fn levels(&self) -> &[OwnedImage] {
        &self.levels
    }

    /// Returns a view for a specific pyramid level.
    pub fn level(&self, index: usize) -> Option<ImageView<'_, u8>> {
        self.levels.get(index).map(OwnedImage::view)
    }

    /// Consumes the pyramid and returns its levels.
    pub fn into_levels(self) -> Vec<OwnedImage> {
        self.levels
    }
}

fn halve(src: &OwnedImage) -> WarpMatchResult<OwnedImage> {
    let dst_width = src.width() / 2;
    let dst_height = src.height() / 2;
    let src_data = src.data();
    let src_width = src.width();
    let len = dst_width
        .checked_mul(dst_height)
        .ok_or(WarpMatchError::InvalidDimensions {
            width: dst_width,
            height: dst_height,
        })?;
    let mut dst = Vec::with_capacity(len);

    for y in 0..dst_height {
        let row0 = &src_data[2 * y * src_width..(2 * y + 1) * src_width];
        let row1 = &src_data[(2 * y + 1) * src_width..(2 * y + 2) * src_width];
        for x in 0..dst_width {
            let sum = u16::from(row0[2 * x])
                + u16::from(row0[2 * x + 1])
                + u16::from(row1[2 * x])
                + u16::from(row1[2 * x + 1]);
            dst.push(((sum + 2) / 4) as u8);
        }
    }

    OwnedImage::new(dst, dst_width, dst_height)
}
