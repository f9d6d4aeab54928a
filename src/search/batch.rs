//! Full per-point tracking and batch helpers.

use super::{Convergence, PatchFailure, PatchFinder};
use crate::frame::SearchPyramid;
use crate::image::Pixel;
use crate::trace::{trace_event, trace_span};
use crate::warp::SourcePatch;
use nalgebra::{Isometry3, Matrix2, Vector2};

#[cfg(feature = "rayon")]
use super::FinderConfig;
#[cfg(feature = "rayon")]
use crate::util::WarpMatchResult;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// One point to track in the current frame.
#[derive(Clone, Copy, Debug)]
pub struct PointQuery<'a> {
    pub patch: SourcePatch<'a>,
    /// Level-0 projection derivatives at the predicted position.
    pub cam_derivs: Matrix2<f64>,
    /// Predicted level-0 pixel.
    pub predicted: Pixel,
    /// Search radius in level-0 pixels.
    pub search_radius: u32,
}

/// A tracked point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointObservation {
    pub level: usize,
    /// Coarse match in level-0 pixels.
    pub coarse: Vector2<f64>,
    /// Refined position in level-0 pixels.
    pub position: Vector2<f64>,
    pub score: i64,
    pub iterations: usize,
}

impl PatchFinder {
    /// Runs every stage for one point: warp, template, coarse search and
    /// refinement.
    pub fn track_point<P: SearchPyramid + ?Sized>(
        &mut self,
        query: &PointQuery<'_>,
        camera_from_world: &Isometry3<f64>,
        frame: &P,
        max_iterations: usize,
    ) -> Result<PointObservation, PatchFailure> {
        let Some(level) =
            self.make_template_coarse(&query.patch, camera_from_world, &query.cam_derivs)
        else {
            return Err(self.last_failure.unwrap_or(PatchFailure::DegenerateWarp));
        };
        if !self.find_patch_coarse(query.predicted, frame, query.search_radius) {
            return Err(PatchFailure::NoMatch);
        }
        let coarse = self.coarse_pos;
        let score = self.best_score.unwrap_or(0);
        if !self.make_subpix_template() {
            return Err(PatchFailure::SingularNormalEquations);
        }
        match self.iterate_subpix_to_convergence(frame, max_iterations) {
            Convergence::Converged { iterations } => Ok(PointObservation {
                level,
                coarse,
                position: self.subpix_pos,
                score,
                iterations,
            }),
            Convergence::Diverged => Err(PatchFailure::Diverged),
            Convergence::OutOfImage { .. } => Err(PatchFailure::RefinementOutOfImage),
            Convergence::NotPrepared => Err(PatchFailure::NotPrepared),
        }
    }

    /// Tracks `queries` in order with this finder.
    pub fn track_points<P: SearchPyramid + ?Sized>(
        &mut self,
        queries: &[PointQuery<'_>],
        camera_from_world: &Isometry3<f64>,
        frame: &P,
        max_iterations: usize,
    ) -> Vec<Result<PointObservation, PatchFailure>> {
        let _span = trace_span!("track_points", points = queries.len()).entered();
        let results: Vec<_> = queries
            .iter()
            .map(|q| self.track_point(q, camera_from_world, frame, max_iterations))
            .collect();
        trace_event!(
            "track_points_done",
            tracked = results.iter().filter(|r| r.is_ok()).count()
        );
        results
    }
}

/// Tracks `queries` in parallel with one finder per rayon worker.
///
/// Results are in query order and match [`PatchFinder::track_points`] for
/// queries with distinct point ids.
#[cfg(feature = "rayon")]
pub fn track_points_par<P: SearchPyramid + Sync + ?Sized>(
    cfg: FinderConfig,
    queries: &[PointQuery<'_>],
    camera_from_world: &Isometry3<f64>,
    frame: &P,
    max_iterations: usize,
) -> WarpMatchResult<Vec<Result<PointObservation, PatchFailure>>> {
    cfg.validate()?;
    let _span = trace_span!("track_points_par", points = queries.len()).entered();
    Ok(queries
        .par_iter()
        .map_init(
            || PatchFinder::with_valid_config(cfg),
            |finder, q| finder.track_point(q, camera_from_world, frame, max_iterations),
        )
        .collect())
}
