//! Convenience helpers for loading images via the `image` crate.
//!
//! Available when the `image-io` feature is enabled.

use crate::image::{ImageView, OwnedImage};
use crate::util::{WarpMatchError, WarpMatchResult};
use std::path::Path;

/// Creates a borrowed view from a grayscale image buffer.
pub fn view_from_gray_image(img: &image::GrayImage) -> WarpMatchResult<ImageView<'_, u8>> {
    ImageView::from_slice(img.as_raw(), img.width() as usize, img.height() as usize)
}

/// Loads an image from disk and converts it to an owned grayscale image.
pub fn load_gray_image<P: AsRef<Path>>(path: P) -> WarpMatchResult<OwnedImage> {
    let img = image::open(path).map_err(|err| WarpMatchError::ImageIo {
        reason: err.to_string(),
    })?;
    let gray = img.to_luma8();
    let (width, height) = (gray.width() as usize, gray.height() as usize);
    OwnedImage::new(gray.into_raw(), width, height)
}
