//! Plane-induced pixel vectors for a source observation.
//!
//! A map point is treated as lying on a small plane with a known normal. The
//! rays through the source pixel and its right and down neighbours hit that
//! plane at three points; their differences, rotated into the world frame,
//! are the world-space motions of one source pixel. The current-view warp is
//! the projection of these two vectors.

use nalgebra::{Isometry3, Point3, Vector3};

const MIN_RAY_RATE: f64 = 1e-12;

/// Unprojected rays (normalized camera coordinates, any positive scale) of the
/// source pixel centre and of its one-pixel-right and one-pixel-down
/// neighbours, at the source pyramid level.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelRays {
    pub center: Vector3<f64>,
    pub right: Vector3<f64>,
    pub down: Vector3<f64>,
}

/// World-frame displacement of one source pixel to the right and downward,
/// plus the point depth in the source camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelVectors {
    pub right: Vector3<f64>,
    pub down: Vector3<f64>,
    pub source_depth: f64,
}

/// Source camera geometry of an observed planar patch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneObservation {
    /// Source camera pose (world → source camera).
    pub source_from_world: Isometry3<f64>,
    /// Patch normal in source camera coordinates.
    pub normal: Vector3<f64>,
    /// Rays of the source pixel and its neighbours.
    pub rays: PixelRays,
}

impl PlaneObservation {
    /// Computes the world-frame pixel vectors for a point at `world_pos`.
    ///
    /// Returns `None` when the point is not in front of the source camera or a
    /// ray is parallel to the patch plane.
    pub fn pixel_vectors(&self, world_pos: &Vector3<f64>) -> Option<PixelVectors> {
        let on_plane = self
            .source_from_world
            .transform_point(&Point3::from(*world_pos));
        if on_plane.z.is_nan() || on_plane.z <= 0.0 {
            return None;
        }

        let normal = self.normal;
        let cam_height = on_plane.coords.dot(&normal).abs();
        let hit = |ray: &Vector3<f64>| -> Option<Vector3<f64>> {
            let rate = ray.dot(&normal).abs();
            (rate > MIN_RAY_RATE).then(|| ray * (cam_height / rate))
        };

        let center = hit(&self.rays.center)?;
        let right = hit(&self.rays.right)? - center;
        let down = hit(&self.rays.down)? - center;

        let to_world = self.source_from_world.rotation.inverse();
        Some(PixelVectors {
            right: to_world * right,
            down: to_world * down,
            source_depth: on_plane.z,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{PixelRays, PlaneObservation};
    use nalgebra::{Isometry3, Vector3};

    fn fronto_parallel(pose: Isometry3<f64>) -> PlaneObservation {
        let f = 500.0;
        PlaneObservation {
            source_from_world: pose,
            normal: Vector3::new(0.0, 0.0, -1.0),
            rays: PixelRays {
                center: Vector3::new(0.0, 0.0, 1.0),
                right: Vector3::new(1.0 / f, 0.0, 1.0),
                down: Vector3::new(0.0, 1.0 / f, 1.0),
            },
        }
    }

    #[test]
    fn fronto_parallel_plane_scales_with_depth() {
        let obs = fronto_parallel(Isometry3::identity());
        let v = obs.pixel_vectors(&Vector3::new(0.0, 0.0, 5.0)).unwrap();
        assert!((v.right - Vector3::new(0.01, 0.0, 0.0)).norm() < 1e-12);
        assert!((v.down - Vector3::new(0.0, 0.01, 0.0)).norm() < 1e-12);
        assert!((v.source_depth - 5.0).abs() < 1e-12);
    }

    #[test]
    fn rotated_source_camera_maps_vectors_back_to_world() {
        let pose = Isometry3::new(
            Vector3::zeros(),
            Vector3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2),
        );
        let obs = fronto_parallel(pose);
        let v = obs.pixel_vectors(&Vector3::new(0.0, 0.0, 5.0)).unwrap();
        // After a 90° yaw the camera x axis points along world -y.
        assert!((v.right - Vector3::new(0.0, -0.01, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn point_behind_source_camera_is_rejected() {
        let obs = fronto_parallel(Isometry3::identity());
        assert!(obs.pixel_vectors(&Vector3::new(0.0, 0.0, -2.0)).is_none());
    }
}
