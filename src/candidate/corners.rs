//! Row-indexed corner lists.

use crate::image::Pixel;
use crate::util::{WarpMatchError, WarpMatchResult};

/// Corner locations of one pyramid level, sorted row-major, with a per-row
/// lookup table of start offsets.
///
/// `row_starts[y]` is the index of the first corner with row `>= y`, and
/// `row_starts[height] == corners.len()`.
#[derive(Clone, Debug, Default)]
pub struct CornerIndex {
    corners: Vec<Pixel>,
    row_starts: Vec<usize>,
}

impl CornerIndex {
    /// Indexes `corners` for a level of the given size.
    ///
    /// Duplicates are removed. Every corner must lie inside the level.
    pub fn new(mut corners: Vec<Pixel>, width: usize, height: usize) -> WarpMatchResult<Self> {
        if width == 0 || height == 0 {
            return Err(WarpMatchError::InvalidDimensions { width, height });
        }
        if let Some(c) = corners.iter().find(|c| {
            c.x < 0 || c.y < 0 || c.x as usize >= width || c.y as usize >= height
        }) {
            return Err(WarpMatchError::CornerOutOfBounds {
                x: c.x,
                y: c.y,
                width,
                height,
            });
        }

        corners.sort_unstable_by_key(|c| (c.y, c.x));
        corners.dedup();

        let mut row_starts = Vec::with_capacity(height + 1);
        let mut idx = 0usize;
        for y in 0..=height {
            while idx < corners.len() && (corners[idx].y as usize) < y {
                idx += 1;
            }
            row_starts.push(idx);
        }

        Ok(Self {
            corners,
            row_starts,
        })
    }

    /// Treats every pixel of a `width`×`height` level as a candidate.
    pub fn dense(width: usize, height: usize) -> WarpMatchResult<Self> {
        let corners = (0..height as i32)
            .flat_map(|y| (0..width as i32).map(move |x| Pixel::new(x, y)))
            .collect();
        Self::new(corners, width, height)
    }

    /// Returns the number of indexed corners.
    pub fn len(&self) -> usize {
        self.corners.len()
    }

    /// Returns true when no corners are indexed.
    pub fn is_empty(&self) -> bool {
        self.corners.is_empty()
    }

    /// Returns the level height this index was built for.
    pub fn height(&self) -> usize {
        self.row_starts.len().saturating_sub(1)
    }

    /// Returns all corners in row-major order.
    pub fn as_slice(&self) -> &[Pixel] {
        &self.corners
    }

    /// Returns the corners whose row lies in `top..bottom`.
    ///
    /// Both bounds are clamped to the level height.
    pub fn rows(&self, top: usize, bottom: usize) -> &[Pixel] {
        let height = self.height();
        let top = top.min(height);
        let bottom = bottom.clamp(top, height);
        match (self.row_starts.get(top), self.row_starts.get(bottom)) {
            (Some(&start), Some(&end)) => &self.corners[start..end],
            _ => &[],
        }
    }
}
