//! Per-point patch search engine.
//!
//! A [`PatchFinder`] carries one map point through the tracking stages:
//! warp estimation, template synthesis, coarse ZM-SSD search over candidate
//! corners and inverse compositional sub-pixel refinement. Stages are not
//! ordered at runtime; calling one before its inputs exist fails gracefully
//! (`false`, `None` or a bad template) instead of reading stale data.
//!
//! ```text
//! calc_search_level_and_warp ─► make_template_coarse_cont ─► find_patch_coarse
//!                                                                │
//!            iterate_subpix_to_convergence ◄─ make_subpix_template ◄┘
//! ```

mod batch;
mod coarse;
mod refine;

pub use batch::{PointObservation, PointQuery};
#[cfg(feature = "rayon")]
pub use batch::track_points_par;

use crate::image::{ImageView, Pixel};
use crate::refine::GradientTemplate;
use crate::template::PatchTemplate;
use crate::trace::trace_event;
use crate::util::math::level_scale;
use crate::util::{WarpMatchError, WarpMatchResult};
use crate::warp::{estimate_warp, PointId, SourcePatch};
use nalgebra::{Isometry3, Matrix2, Vector2};
use thiserror::Error;

const MIN_PATCH_SIZE: usize = 4;
const MAX_PATCH_SIZE: usize = 64;
const MAX_SEARCH_LEVEL: usize = 16;

/// Configuration for a [`PatchFinder`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FinderConfig {
    /// Template side length N in pixels.
    pub patch_size: usize,
    /// Per-pixel ZM-SSD bound; a match needs a score below `N² · bound`.
    pub max_ssd_per_pixel: i64,
    /// Highest pyramid level the warp estimator may select.
    pub max_level: usize,
    /// Largest movement, in source pixels, of either template warp column
    /// that still reuses the previous template of the same point.
    pub template_refresh_limit: f64,
    /// Enables template reuse across calls for the same point.
    pub memoize_templates: bool,
    /// Refinement stops once the position update is shorter than this.
    pub convergence_limit: f64,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            patch_size: 8,
            max_ssd_per_pixel: 500,
            max_level: 3,
            template_refresh_limit: 0.07,
            memoize_templates: true,
            convergence_limit: 0.03,
        }
    }
}

impl FinderConfig {
    /// Checks that every field is in its supported range.
    pub fn validate(&self) -> WarpMatchResult<()> {
        if self.patch_size < MIN_PATCH_SIZE {
            return Err(WarpMatchError::InvalidPatchSize {
                size: self.patch_size,
                reason: "patch must be at least 4 pixels wide",
            });
        }
        if self.patch_size > MAX_PATCH_SIZE {
            return Err(WarpMatchError::InvalidPatchSize {
                size: self.patch_size,
                reason: "patch must be at most 64 pixels wide",
            });
        }
        if self.max_ssd_per_pixel <= 0 {
            return Err(WarpMatchError::InvalidConfig {
                reason: "max_ssd_per_pixel must be positive",
            });
        }
        if self.max_level > MAX_SEARCH_LEVEL {
            return Err(WarpMatchError::InvalidConfig {
                reason: "max_level must be at most 16",
            });
        }
        if !self.template_refresh_limit.is_finite() || self.template_refresh_limit < 0.0 {
            return Err(WarpMatchError::InvalidConfig {
                reason: "template_refresh_limit must be finite and non-negative",
            });
        }
        if !self.convergence_limit.is_finite() || self.convergence_limit <= 0.0 {
            return Err(WarpMatchError::InvalidConfig {
                reason: "convergence_limit must be finite and positive",
            });
        }
        Ok(())
    }
}

/// Reason a point could not be tracked.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum PatchFailure {
    /// The point is behind a camera or the warp's area scale is out of range.
    #[error("degenerate warp or unusable search level")]
    DegenerateWarp,
    /// The template footprint leaves the source image.
    #[error("template footprint outside the source image")]
    TemplateOutOfBounds,
    /// No candidate scored below the ZM-SSD bound.
    #[error("no candidate below the match threshold")]
    NoMatch,
    /// The refinement footprint left the current image.
    #[error("refinement left the image")]
    RefinementOutOfImage,
    /// The template has too little texture for refinement.
    #[error("singular refinement normal equations")]
    SingularNormalEquations,
    /// Refinement did not converge within the iteration budget.
    #[error("refinement did not converge")]
    Diverged,
    /// Refinement ran without a prepared template.
    #[error("refinement template not prepared")]
    NotPrepared,
}

impl PatchFailure {
    /// Short snake-case name for logs and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchFailure::DegenerateWarp => "degenerate_warp",
            PatchFailure::TemplateOutOfBounds => "template_out_of_bounds",
            PatchFailure::NoMatch => "no_match",
            PatchFailure::RefinementOutOfImage => "refinement_out_of_image",
            PatchFailure::SingularNormalEquations => "singular_normal_equations",
            PatchFailure::Diverged => "diverged",
            PatchFailure::NotPrepared => "not_prepared",
        }
    }
}

/// Outcome of [`PatchFinder::iterate_subpix_to_convergence`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Convergence {
    /// The update fell below the convergence limit after `iterations` steps.
    Converged { iterations: usize },
    /// The iteration budget ran out.
    Diverged,
    /// Iteration `iteration` (1-based) needed pixels outside the image.
    OutOfImage { iteration: usize },
    /// No iteration ran: the template is bad or
    /// [`PatchFinder::make_subpix_template`] has not succeeded since it was
    /// built.
    NotPrepared,
}

impl Convergence {
    /// True for [`Convergence::Converged`].
    pub fn is_converged(&self) -> bool {
        matches!(self, Convergence::Converged { .. })
    }
}

#[derive(Clone, Copy, Debug)]
struct TemplateMemo {
    id: PointId,
    template_warp: Matrix2<f64>,
    bad: bool,
}

/// Caller-owned tracking state for one point at a time.
///
/// All buffers are sized once from the configuration. The finder is `Send`
/// and every stage takes `&mut self`; use one finder per worker.
#[derive(Clone, Debug)]
pub struct PatchFinder {
    cfg: FinderConfig,
    max_ssd: i64,
    template: PatchTemplate,
    gradients: GradientTemplate,
    warp: Matrix2<f64>,
    template_warp: Matrix2<f64>,
    search_level: Option<usize>,
    predicted: Pixel,
    coarse_pixel: Pixel,
    coarse_pos: Vector2<f64>,
    best_score: Option<i64>,
    subpix_pos: Vector2<f64>,
    mean_diff: f64,
    found: bool,
    template_bad: bool,
    last_failure: Option<PatchFailure>,
    memo: Option<TemplateMemo>,
}

impl PatchFinder {
    /// Creates a finder after validating `cfg`.
    pub fn new(cfg: FinderConfig) -> WarpMatchResult<Self> {
        cfg.validate()?;
        Ok(Self::with_valid_config(cfg))
    }

    pub(crate) fn with_valid_config(cfg: FinderConfig) -> Self {
        let area = (cfg.patch_size * cfg.patch_size) as i64;
        Self {
            cfg,
            max_ssd: area.saturating_mul(cfg.max_ssd_per_pixel),
            template: PatchTemplate::new(cfg.patch_size),
            gradients: GradientTemplate::new(cfg.patch_size),
            warp: Matrix2::identity(),
            template_warp: Matrix2::identity(),
            search_level: None,
            predicted: Pixel::default(),
            coarse_pixel: Pixel::default(),
            coarse_pos: Vector2::zeros(),
            best_score: None,
            subpix_pos: Vector2::zeros(),
            mean_diff: 0.0,
            found: false,
            template_bad: true,
            last_failure: None,
            memo: None,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &FinderConfig {
        &self.cfg
    }

    /// Estimates the warp and search level of `patch` in the current view.
    ///
    /// Returns the chosen level, or `None` (recorded as
    /// [`PatchFailure::DegenerateWarp`]) when the point cannot be searched.
    pub fn calc_search_level_and_warp(
        &mut self,
        patch: &SourcePatch<'_>,
        camera_from_world: &Isometry3<f64>,
        cam_derivs: &Matrix2<f64>,
    ) -> Option<usize> {
        let estimate = estimate_warp(camera_from_world, patch, cam_derivs, self.cfg.max_level)
            .and_then(|w| w.template_to_source().map(|inv| (w, inv)));
        match estimate {
            Some((patch_warp, template_warp)) => {
                self.warp = patch_warp.warp;
                self.template_warp = template_warp;
                self.search_level = Some(patch_warp.level);
                Some(patch_warp.level)
            }
            None => {
                self.search_level = None;
                self.fail(PatchFailure::DegenerateWarp);
                None
            }
        }
    }

    /// Builds the warped template from the stored warp and level.
    ///
    /// Requires a preceding successful
    /// [`calc_search_level_and_warp`](Self::calc_search_level_and_warp) for the
    /// same point. Returns false and marks the template bad when the footprint
    /// leaves the source image or no warp is available.
    pub fn make_template_coarse_cont(&mut self, patch: &SourcePatch<'_>) -> bool {
        self.start_template();
        if self.search_level.is_none() {
            self.template_bad = true;
            self.fail(PatchFailure::DegenerateWarp);
            return false;
        }

        if let Some(bad) = self.reusable_template(patch.id) {
            self.template_bad = bad;
        } else {
            self.template_bad =
                !self
                    .template
                    .sample_warped(patch.image, &self.template_warp, patch.center);
            self.memo = Some(TemplateMemo {
                id: patch.id,
                template_warp: self.template_warp,
                bad: self.template_bad,
            });
        }

        if self.template_bad {
            self.fail(PatchFailure::TemplateOutOfBounds);
        }
        !self.template_bad
    }

    /// Estimates the warp and builds the template in one call.
    ///
    /// Returns the search level when a usable template was produced.
    pub fn make_template_coarse(
        &mut self,
        patch: &SourcePatch<'_>,
        camera_from_world: &Isometry3<f64>,
        cam_derivs: &Matrix2<f64>,
    ) -> Option<usize> {
        let Some(level) = self.calc_search_level_and_warp(patch, camera_from_world, cam_derivs)
        else {
            self.found = false;
            self.best_score = None;
            self.template_bad = true;
            self.gradients.invalidate();
            return None;
        };
        if self.make_template_coarse_cont(patch) {
            Some(level)
        } else {
            None
        }
    }

    /// Copies an unwarped template around the patch's source pixel and
    /// searches at the source level.
    pub fn make_template_coarse_no_warp(&mut self, patch: &SourcePatch<'_>) -> bool {
        self.make_template_coarse_no_warp_at(patch.image, patch.level, patch.center)
    }

    /// Copies an unwarped template centred on `pos` of a level image.
    ///
    /// For points without a map entry yet. `image` must be pyramid level
    /// `level`; later searches run at that level. The block may touch the
    /// image edge but not cross it.
    pub fn make_template_coarse_no_warp_at(
        &mut self,
        image: ImageView<'_, u8>,
        level: usize,
        pos: Pixel,
    ) -> bool {
        self.start_template();
        self.memo = None;
        if level > MAX_SEARCH_LEVEL {
            self.search_level = None;
            self.template_bad = true;
            self.fail(PatchFailure::DegenerateWarp);
            return false;
        }
        self.search_level = Some(level);
        self.template_warp = Matrix2::identity();
        self.warp = Matrix2::identity() * f64::from(level_scale(level));
        self.template_bad = !self.template.copy_block(image, pos);
        if self.template_bad {
            self.fail(PatchFailure::TemplateOutOfBounds);
        }
        !self.template_bad
    }

    /// True when the last template build or refinement preparation failed,
    /// or no template has been built yet.
    pub fn template_bad(&self) -> bool {
        self.template_bad
    }

    /// The current template.
    pub fn template(&self) -> &PatchTemplate {
        &self.template
    }

    /// Source pixel → current level-0 pixel warp of the last estimate.
    pub fn warp(&self) -> &Matrix2<f64> {
        &self.warp
    }

    /// Search level of the current template.
    pub fn level(&self) -> Option<usize> {
        self.search_level
    }

    /// Downsampling factor of the search level.
    pub fn level_scale(&self) -> Option<i32> {
        self.search_level.map(level_scale)
    }

    /// Match threshold `N² · max_ssd_per_pixel`.
    pub fn max_ssd(&self) -> i64 {
        self.max_ssd
    }

    /// True after a successful coarse search.
    pub fn found(&self) -> bool {
        self.found
    }

    /// Reason for the most recent failed stage, if any.
    pub fn last_failure(&self) -> Option<PatchFailure> {
        self.last_failure
    }

    fn fail(&mut self, failure: PatchFailure) {
        trace_event!("patch_failure", reason = failure.as_str());
        self.last_failure = Some(failure);
    }

    // Any template rewrite drops the previous search result and gradients.
    fn start_template(&mut self) {
        self.found = false;
        self.best_score = None;
        self.last_failure = None;
        self.gradients.invalidate();
    }

    fn reusable_template(&self, id: PointId) -> Option<bool> {
        if !self.cfg.memoize_templates {
            return None;
        }
        let memo = self.memo.as_ref().filter(|m| m.id == id)?;
        let limit = self.cfg.template_refresh_limit;
        let moved = (0..2).any(|c| {
            (self.template_warp.column(c) - memo.template_warp.column(c)).norm() >= limit
        });
        (!moved).then_some(memo.bad)
    }
}
