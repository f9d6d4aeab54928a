//! Scalar reference kernel.

use crate::image::ImageView;
use crate::kernel::{Kernel, WindowSums};
use crate::template::PatchTemplate;

/// Integer scalar kernel; exact for any template size.
pub struct ScalarKernel;

impl Kernel for ScalarKernel {
    fn window_sums(
        image: ImageView<'_, u8>,
        template: &PatchTemplate,
        x: usize,
        y: usize,
    ) -> Option<WindowSums> {
        let size = template.size();
        if x + size > image.width() || y + size > image.height() {
            return None;
        }

        // Per-row sums fit in u32 for any supported patch size.
        let mut out = WindowSums::default();
        for ty in 0..size {
            let img_row = &image.row(y + ty)?[x..x + size];
            let tpl_row = template.row(ty);
            let mut sum = 0u32;
            let mut sum_sq = 0u32;
            let mut cross = 0u32;
            for (&w, &t) in img_row.iter().zip(tpl_row) {
                let (w, t) = (u32::from(w), u32::from(t));
                sum += w;
                sum_sq += w * w;
                cross += w * t;
            }
            out.sum += i64::from(sum);
            out.sum_sq += i64::from(sum_sq);
            out.cross += i64::from(cross);
        }
        Some(out)
    }
}
