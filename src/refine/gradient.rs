//! Template gradients and inverse normal equations.

use crate::image::ImageView;
use crate::template::PatchTemplate;
use nalgebra::{Matrix3, Vector2, Vector3};

// Relative determinant bound below which the normal matrix counts as singular.
const SINGULAR_REL_DET: f64 = 1e-10;

/// Central-difference gradients of the template interior with the inverse of
/// `Σ g gᵀ`, where `g = (∂T/∂x, ∂T/∂y, 1)`.
///
/// The last parameter models a constant intensity offset between the template
/// and the image. Gradients exist only for the `(N-2)²` interior pixels and are
/// stored as `f32` pairs, row-major.
#[derive(Clone, Debug)]
pub struct GradientTemplate {
    inner: usize,
    jacobians: Vec<(f32, f32)>,
    h_inv: Matrix3<f64>,
    prepared: bool,
}

impl GradientTemplate {
    /// Allocates storage for a `patch_size`×`patch_size` template.
    pub fn new(patch_size: usize) -> Self {
        let inner = patch_size.saturating_sub(2);
        Self {
            inner,
            jacobians: vec![(0.0, 0.0); inner * inner],
            h_inv: Matrix3::zeros(),
            prepared: false,
        }
    }

    /// Recomputes gradients and the inverse normal matrix from `template`.
    ///
    /// Returns false when the normal matrix is singular (for example a flat
    /// or planar template); the inverse is then zeroed so later iterations
    /// produce no update.
    pub fn prepare(&mut self, template: &PatchTemplate) -> bool {
        let n = template.size();
        debug_assert_eq!(n.saturating_sub(2), self.inner);
        let mut h = Matrix3::<f64>::zeros();

        for y in 1..n - 1 {
            let above = template.row(y - 1);
            let row = template.row(y);
            let below = template.row(y + 1);
            for x in 1..n - 1 {
                let gx = 0.5 * (f64::from(row[x + 1]) - f64::from(row[x - 1]));
                let gy = 0.5 * (f64::from(below[x]) - f64::from(above[x]));
                self.jacobians[(y - 1) * self.inner + (x - 1)] = (gx as f32, gy as f32);
                let g = Vector3::new(gx, gy, 1.0);
                h += g * g.transpose();
            }
        }

        let scale = h.norm();
        let det = h.determinant();
        let inverse = if det.abs() > SINGULAR_REL_DET * scale * scale * scale {
            h.try_inverse()
        } else {
            None
        };
        match inverse {
            Some(inv) if inv.iter().all(|v| v.is_finite()) => {
                self.h_inv = inv;
                self.prepared = true;
            }
            _ => {
                self.h_inv = Matrix3::zeros();
                self.prepared = false;
            }
        }
        self.prepared
    }

    /// True after a successful [`prepare`](Self::prepare).
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Marks the gradients stale, for example after the template changed.
    pub fn invalidate(&mut self) {
        self.h_inv = Matrix3::zeros();
        self.prepared = false;
    }

    /// Interior gradients `(∂T/∂x, ∂T/∂y)`, `(N-2)²` entries row-major.
    pub fn jacobians(&self) -> &[(f32, f32)] {
        &self.jacobians
    }

    /// Inverse of the 3×3 normal matrix.
    pub fn h_inv(&self) -> &Matrix3<f64> {
        &self.h_inv
    }

    /// Accumulates `Jᵀr` with the template's top-left corner at `base`.
    ///
    /// The residual of interior pixel `t` is
    /// `I(base + t) - T(t) + mean_diff`, with `I` sampled bilinearly. Returns
    /// `None` if any sample needs a pixel outside `image`.
    pub fn accumulate(
        &self,
        image: ImageView<'_, u8>,
        template: &PatchTemplate,
        base: Vector2<f64>,
        mean_diff: f64,
    ) -> Option<Vector3<f64>> {
        if !base.x.is_finite() || !base.y.is_finite() {
            return None;
        }
        let (floor_x, floor_y) = (base.x.floor(), base.y.floor());
        let dx = (base.x - floor_x) as f32;
        let dy = (base.y - floor_y) as f32;
        let mix_tl = (1.0 - dx) * (1.0 - dy);
        let mix_tr = dx * (1.0 - dy);
        let mix_bl = (1.0 - dx) * dy;
        let mix_br = dx * dy;

        // Interior pixels start one pixel in from the top-left corner.
        let x0 = floor_x as i64 + 1;
        let y0 = floor_y as i64 + 1;
        if x0 < 0 || y0 < 0 {
            return None;
        }
        let (x0, y0) = (x0 as usize, y0 as usize);

        let mut acc = Vector3::<f64>::zeros();
        for iy in 0..self.inner {
            let top = image.row(y0 + iy)?;
            let bottom = image.row(y0 + iy + 1)?;
            let tpl_row = template.row(iy + 1);
            let jac_row = &self.jacobians[iy * self.inner..(iy + 1) * self.inner];
            let top = top.get(x0..x0 + self.inner + 1)?;
            let bottom = bottom.get(x0..x0 + self.inner + 1)?;
            for (ix, &(jx, jy)) in jac_row.iter().enumerate() {
                let pixel = mix_tl * f32::from(top[ix])
                    + mix_tr * f32::from(top[ix + 1])
                    + mix_bl * f32::from(bottom[ix])
                    + mix_br * f32::from(bottom[ix + 1]);
                let diff = f64::from(pixel) - f64::from(tpl_row[ix + 1]) + mean_diff;
                acc.x += diff * f64::from(jx);
                acc.y += diff * f64::from(jy);
                acc.z += diff;
            }
        }
        Some(acc)
    }
}
