//! Coarse ZM-SSD search over candidate corners.
//!
//! The template is scored at every corner of the search level inside a circle
//! around the predicted position. Only corner rows intersecting the circle's
//! bounding box are visited, through the corner index's row table.

use super::{PatchFailure, PatchFinder};
use crate::frame::SearchPyramid;
use crate::image::{ImageView, Pixel};
use crate::kernel::{zmssd_from_sums, Kernel};
use crate::trace::{trace_event, trace_span};
use crate::util::math::{level_scale, level_zero_pos};
use nalgebra::Vector2;

// Kernel type alias - use SIMD when available
#[cfg(not(feature = "simd"))]
use crate::kernel::scalar::ScalarKernel as ActiveKernel;
#[cfg(feature = "simd")]
use crate::kernel::simd::SimdKernel as ActiveKernel;

#[derive(Clone, Copy)]
struct Best {
    score: i64,
    dist_sq: i64,
    pixel: Pixel,
}

impl PatchFinder {
    /// Searches the current frame for the template around `predicted`.
    ///
    /// `predicted` is in level-0 pixels and `range` is the search radius in
    /// level-0 pixels. Both are converted to the search level. Returns true
    /// when a candidate scored below [`max_ssd`](Self::max_ssd); the match is
    /// then available from [`coarse_pos`](Self::coarse_pos) and the sub-pixel
    /// position is seeded with it.
    ///
    /// Requires a usable template; otherwise returns false.
    pub fn find_patch_coarse<P: SearchPyramid + ?Sized>(
        &mut self,
        predicted: Pixel,
        frame: &P,
        range: u32,
    ) -> bool {
        self.found = false;
        self.best_score = None;
        self.last_failure = None;
        self.predicted = predicted;

        let Some(level) = self.search_level else {
            self.fail(PatchFailure::DegenerateWarp);
            return false;
        };
        if self.template_bad {
            self.fail(PatchFailure::TemplateOutOfBounds);
            return false;
        }
        let (Some(image), Some(corners)) = (frame.image(level), frame.corners(level)) else {
            self.fail(PatchFailure::NoMatch);
            return false;
        };

        let scale = level_scale(level);
        let center = Pixel::new(predicted.x.div_euclid(scale), predicted.y.div_euclid(scale));
        let radius = i64::from(range.div_ceil(scale as u32));
        let _span = trace_span!(
            "coarse_search",
            level = level,
            x = center.x,
            y = center.y,
            radius = radius
        )
        .entered();

        let radius_sq = radius * radius;
        let top = (i64::from(center.y) - radius).max(0) as usize;
        let bottom = (i64::from(center.y) + radius + 1).max(0) as usize;

        let mut best: Option<Best> = None;
        let mut visited = 0usize;
        for &corner in corners.rows(top, bottom) {
            let dist_sq = corner.dist_sq(center);
            if dist_sq > radius_sq {
                continue;
            }
            visited += 1;
            let score = self.zmssd_at_point(image, corner);
            if score >= self.max_ssd {
                continue;
            }
            let better = match best {
                Some(b) => (score, dist_sq) < (b.score, b.dist_sq),
                None => true,
            };
            if better {
                best = Some(Best {
                    score,
                    dist_sq,
                    pixel: corner,
                });
            }
        }

        let Some(best) = best else {
            trace_event!("coarse_result", found = false, candidates = visited);
            self.fail(PatchFailure::NoMatch);
            return false;
        };

        self.found = true;
        self.best_score = Some(best.score);
        self.coarse_pixel = best.pixel;
        self.coarse_pos = level_zero_pos(
            Vector2::new(f64::from(best.pixel.x), f64::from(best.pixel.y)),
            level,
        );
        self.subpix_pos = self.coarse_pos;
        self.mean_diff = 0.0;
        trace_event!(
            "coarse_result",
            found = true,
            candidates = visited,
            score = best.score
        );
        true
    }

    /// ZM-SSD of the template centred on `center` of a search-level image.
    ///
    /// Windows not fully inside `image` score `max_ssd + 1`.
    pub fn zmssd_at_point(&self, image: ImageView<'_, u8>, center: Pixel) -> i64 {
        let out_of_bounds = self.max_ssd.saturating_add(1);
        let c = self.template.center();
        let top_left = Pixel::new(center.x - c, center.y - c);
        if !image.contains_block(top_left, self.template.size()) {
            return out_of_bounds;
        }
        ActiveKernel::window_sums(
            image,
            &self.template,
            top_left.x as usize,
            top_left.y as usize,
        )
        .map_or(out_of_bounds, |sums| zmssd_from_sums(&self.template, sums))
    }

    /// Coarse match in level-0 pixels, `(p + 0.5) · scale − 0.5` for search
    /// level pixel `p`.
    pub fn coarse_pos(&self) -> Option<Vector2<f64>> {
        self.found.then_some(self.coarse_pos)
    }

    /// Coarse match as a pixel of the search level.
    pub fn coarse_pixel(&self) -> Option<Pixel> {
        self.found.then_some(self.coarse_pixel)
    }

    /// Score of the coarse match.
    pub fn coarse_score(&self) -> Option<i64> {
        self.best_score
    }

    /// Level-0 position passed to the last coarse search.
    pub fn predicted(&self) -> Pixel {
        self.predicted
    }
}
