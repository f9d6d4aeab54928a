//! Sub-pixel refinement of a coarse match.
//!
//! Inverse compositional Lucas-Kanade over translation plus a constant
//! intensity offset. The template's gradients and inverse normal matrix are
//! fixed; each step resamples the current image at the running estimate.

use super::{Convergence, PatchFailure, PatchFinder};
use crate::frame::SearchPyramid;
use crate::image::Pixel;
use crate::trace::{trace_event, trace_span};
use crate::util::math::{level_n_pos, level_scale};
use nalgebra::{Matrix2, Vector2};

impl PatchFinder {
    /// Prepares the template for refinement and resets the intensity offset.
    ///
    /// Returns false and marks the template bad when it has too little
    /// texture to constrain both translation axes. A template that is already
    /// bad is not prepared; the failure of its build stays in
    /// [`last_failure`](Self::last_failure).
    pub fn make_subpix_template(&mut self) -> bool {
        self.mean_diff = 0.0;
        if self.template_bad {
            self.gradients.invalidate();
            return false;
        }
        if self.gradients.prepare(&self.template) {
            return true;
        }
        self.template_bad = true;
        self.fail(PatchFailure::SingularNormalEquations);
        false
    }

    /// Runs one Gauss-Newton step at the search level.
    ///
    /// Returns the squared length of the update in search-level pixels, or
    /// `None` when the template is not prepared or the rounded position is
    /// not at least `N/2 + 1` pixels inside the image. The sub-pixel position
    /// is left unchanged on failure.
    pub fn iterate_subpix<P: SearchPyramid + ?Sized>(&mut self, frame: &P) -> Option<f64> {
        let Some(level) = self.search_level else {
            self.fail(PatchFailure::DegenerateWarp);
            return None;
        };
        if !self.refinement_ready() {
            self.fail(PatchFailure::NotPrepared);
            return None;
        }
        let Some(image) = frame.image(level) else {
            self.fail(PatchFailure::RefinementOutOfImage);
            return None;
        };

        let center = level_n_pos(self.subpix_pos, level);
        if !center.x.is_finite() || !center.y.is_finite() {
            self.fail(PatchFailure::RefinementOutOfImage);
            return None;
        }
        let half = self.template.center();
        let rounded = Pixel::new(center.x.round() as i32, center.y.round() as i32);
        if !image.contains_with_border(rounded, half + 1) {
            self.fail(PatchFailure::RefinementOutOfImage);
            return None;
        }

        let base = center - Vector2::repeat(f64::from(half));
        let Some(jtr) = self
            .gradients
            .accumulate(image, &self.template, base, self.mean_diff)
        else {
            self.fail(PatchFailure::RefinementOutOfImage);
            return None;
        };

        let update = self.gradients.h_inv() * jtr;
        let step = update.xy();
        self.subpix_pos -= step * f64::from(level_scale(level));
        self.mean_diff -= update.z;
        Some(step.norm_squared())
    }

    /// Iterates until the update drops below the convergence limit.
    ///
    /// At most `max_iterations` steps are taken. On
    /// [`Convergence::OutOfImage`] and [`Convergence::Diverged`] the sub-pixel
    /// position holds the last estimate and should not be used.
    pub fn iterate_subpix_to_convergence<P: SearchPyramid + ?Sized>(
        &mut self,
        frame: &P,
        max_iterations: usize,
    ) -> Convergence {
        let _span = trace_span!("subpix_refine", max_iterations = max_iterations).entered();
        if !self.refinement_ready() {
            self.fail(PatchFailure::NotPrepared);
            return Convergence::NotPrepared;
        }
        let limit_sq = self.cfg.convergence_limit * self.cfg.convergence_limit;
        for iteration in 1..=max_iterations {
            let Some(update_sq) = self.iterate_subpix(frame) else {
                trace_event!("subpix_out_of_image", iteration = iteration);
                return Convergence::OutOfImage { iteration };
            };
            if update_sq < limit_sq {
                trace_event!(
                    "subpix_converged",
                    iterations = iteration,
                    x = self.subpix_pos.x,
                    y = self.subpix_pos.y
                );
                return Convergence::Converged {
                    iterations: iteration,
                };
            }
        }
        self.fail(PatchFailure::Diverged);
        Convergence::Diverged
    }

    fn refinement_ready(&self) -> bool {
        !self.template_bad && self.gradients.is_prepared()
    }

    /// Current sub-pixel estimate in level-0 pixels.
    pub fn subpix_pos(&self) -> Vector2<f64> {
        self.subpix_pos
    }

    /// Seeds refinement with a level-0 position and resets the intensity
    /// offset.
    pub fn set_subpix_pos(&mut self, pos: Vector2<f64>) {
        self.subpix_pos = pos;
        self.mean_diff = 0.0;
    }

    /// Estimated intensity offset between template and image.
    pub fn mean_diff(&self) -> f64 {
        self.mean_diff
    }

    /// Measurement covariance stand-in, `level_scale · I₂`.
    pub fn covariance(&self) -> Option<Matrix2<f64>> {
        self.level_scale()
            .map(|scale| Matrix2::identity() * f64::from(scale))
    }
}
