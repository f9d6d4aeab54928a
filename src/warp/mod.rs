//! Source observations and current-view warp estimation.
//!
//! The warp maps a one-pixel displacement in the source image (at the source
//! pyramid level) to the corresponding displacement in the current view at
//! level 0. Its determinant is the area scale between the two views and
//! drives the choice of search level.

mod plane;

pub use plane::{PixelRays, PixelVectors, PlaneObservation};

use crate::image::{ImageView, Pixel};
use nalgebra::{Isometry3, Matrix2, Point3, Vector2, Vector3};

/// Largest per-level area scale accepted; above it the next level is tried.
pub const MAX_LEVEL_DET: f64 = 3.0;
/// Smallest area scale accepted at the selected level.
pub const MIN_LEVEL_DET: f64 = 0.25;

/// Caller-chosen identity of a map point, used to memoize templates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PointId(pub u64);

/// A map point as seen from its source key-frame.
///
/// The image is one pyramid level of the source frame; `center` is the point's
/// pixel at that level. The pixel vectors must describe one pixel at the same
/// level.
#[derive(Clone, Copy, Debug)]
pub struct SourcePatch<'a> {
    pub id: PointId,
    pub image: ImageView<'a, u8>,
    pub level: usize,
    pub center: Pixel,
    pub world_pos: Vector3<f64>,
    pub pixel: PixelVectors,
}

impl<'a> SourcePatch<'a> {
    /// Builds a patch whose pixel vectors come from a planar observation.
    ///
    /// Returns `None` when the plane geometry is degenerate or the point is
    /// behind the source camera.
    pub fn from_plane(
        id: PointId,
        image: ImageView<'a, u8>,
        level: usize,
        center: Pixel,
        world_pos: Vector3<f64>,
        plane: &PlaneObservation,
    ) -> Option<Self> {
        let pixel = plane.pixel_vectors(&world_pos)?;
        Some(Self {
            id,
            image,
            level,
            center,
            world_pos,
            pixel,
        })
    }
}

/// Warp and search level for one point in the current view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatchWarp {
    /// Source pixel displacement → current level-0 pixel displacement.
    pub warp: Matrix2<f64>,
    /// Pyramid level at which the template footprint is about one pixel.
    pub level: usize,
}

impl PatchWarp {
    /// Maps template pixels at the search level to source pixels.
    pub fn template_to_source(&self) -> Option<Matrix2<f64>> {
        let scale = f64::from(crate::util::math::level_scale(self.level));
        self.warp.try_inverse().map(|inv| inv * scale)
    }
}

/// Estimates the warp of `patch` into the current view.
///
/// `camera_from_world` is the current camera pose and `cam_derivs` the 2×2
/// derivative of the level-0 projection with respect to normalized image
/// coordinates at the point's projection. Returns `None` for points behind
/// either camera and for degenerate or out-of-range warps.
pub fn estimate_warp(
    camera_from_world: &Isometry3<f64>,
    patch: &SourcePatch<'_>,
    cam_derivs: &Matrix2<f64>,
    max_level: usize,
) -> Option<PatchWarp> {
    if patch.pixel.source_depth.is_nan() || patch.pixel.source_depth <= 0.0 {
        return None;
    }
    let cam = camera_from_world.transform_point(&Point3::from(patch.world_pos));
    if cam.z.is_nan() || cam.z <= 0.0 {
        return None;
    }

    let inv_z = 1.0 / cam.z;
    let column = |motion_world: &Vector3<f64>| -> Vector2<f64> {
        let motion = camera_from_world.rotation * motion_world;
        let planar = Vector2::new(
            motion.x - cam.x * motion.z * inv_z,
            motion.y - cam.y * motion.z * inv_z,
        );
        cam_derivs * planar * inv_z
    };
    let warp = Matrix2::from_columns(&[column(&patch.pixel.right), column(&patch.pixel.down)]);

    let level = select_search_level(warp.determinant(), max_level)?;
    Some(PatchWarp { warp, level })
}

/// Chooses the pyramid level for a warp with area scale `det`.
///
/// Each level up divides the area scale by four; the first level at which it
/// drops to [`MAX_LEVEL_DET`] or below is chosen. Returns `None` for
/// non-positive or non-finite scales, or when the scale at the chosen level is
/// outside `[MIN_LEVEL_DET, MAX_LEVEL_DET]`.
pub fn select_search_level(det: f64, max_level: usize) -> Option<usize> {
    if !det.is_finite() || det <= 0.0 {
        return None;
    }
    let mut level = 0;
    let mut det = det;
    while det > MAX_LEVEL_DET && level < max_level {
        level += 1;
        det *= 0.25;
    }
    if (MIN_LEVEL_DET..=MAX_LEVEL_DET).contains(&det) {
        Some(level)
    } else {
        None
    }
}
