//! Template synthesis through a 2×2 affine warp.

use super::PatchTemplate;
use crate::image::{ImageView, Pixel};
use nalgebra::{Matrix2, Vector2};

impl PatchTemplate {
    /// Fills the template by bilinear sampling of `source` through `warp`.
    ///
    /// Template pixel `t` is read from `warp * (t - c) + source_center`, where
    /// `c` is the template centre. Samples are rounded to the nearest integer.
    /// Returns false, leaving the template untouched, if any sample falls
    /// outside `[0, w-1] × [0, h-1]` of `source`.
    pub fn sample_warped(
        &mut self,
        source: ImageView<'_, u8>,
        warp: &Matrix2<f64>,
        source_center: Pixel,
    ) -> bool {
        let size = self.size;
        let c = f64::from(self.center());
        let origin = Vector2::new(f64::from(source_center.x), f64::from(source_center.y));
        for ty in 0..size {
            for tx in 0..size {
                let offset = Vector2::new(tx as f64 - c, ty as f64 - c);
                let src = warp * offset + origin;
                let Some(value) = source.sample_bilinear(src.x, src.y) else {
                    return false;
                };
                self.scratch[ty * size + tx] = value.round().clamp(0.0, 255.0) as u8;
            }
        }

        std::mem::swap(&mut self.data, &mut self.scratch);
        self.refresh_sums();
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::image::{OwnedImage, Pixel};
    use crate::template::PatchTemplate;
    use nalgebra::Matrix2;

    #[test]
    fn identity_warp_matches_block_copy() {
        let img = OwnedImage::from_fn(20, 20, |x, y| ((x * 13) ^ (y * 7)) as u8).unwrap();
        let mut warped = PatchTemplate::new(8);
        let mut copied = PatchTemplate::new(8);
        assert!(warped.sample_warped(img.view(), &Matrix2::identity(), Pixel::new(9, 11)));
        assert!(copied.copy_block(img.view(), Pixel::new(9, 11)));
        assert_eq!(warped.data(), copied.data());
        assert_eq!(warped.sum(), copied.sum());
    }

    #[test]
    fn warped_sampling_reuses_template_storage() {
        let img = OwnedImage::from_fn(32, 32, |x, y| ((x * 11) ^ (y * 5)) as u8).unwrap();
        let mut tpl = PatchTemplate::new(8);
        let original = tpl.data().as_ptr();
        let warp = Matrix2::new(1.2, 0.1, -0.1, 0.9);
        assert!(tpl.sample_warped(img.view(), &warp, Pixel::new(16, 16)));
        assert!(tpl.sample_warped(img.view(), &warp, Pixel::new(14, 17)));
        assert_eq!(tpl.data().as_ptr(), original);

        // A failed sample keeps the previous pixels and sums.
        let before = tpl.data().to_vec();
        let sum = tpl.sum();
        assert!(!tpl.sample_warped(img.view(), &warp, Pixel::new(2, 16)));
        assert_eq!(tpl.data(), before.as_slice());
        assert_eq!(tpl.sum(), sum);
        assert_eq!(tpl.data().as_ptr(), original);
    }

    #[test]
    fn scaled_warp_reads_every_other_pixel() {
        let img = OwnedImage::from_fn(32, 32, |x, _| (x * 4) as u8).unwrap();
        let mut tpl = PatchTemplate::new(4);
        let warp = Matrix2::identity() * 2.0;
        assert!(tpl.sample_warped(img.view(), &warp, Pixel::new(16, 16)));
        assert_eq!(tpl.row(0), &[48, 56, 64, 72]);
    }
}
