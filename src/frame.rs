//! Current-frame inputs: pyramid levels paired with their corner lists.

use crate::candidate::CornerIndex;
use crate::image::pyramid::ImagePyramid;
use crate::image::{ImageView, OwnedImage};
use crate::util::{WarpMatchError, WarpMatchResult};

/// Read-only access to a multi-resolution frame.
///
/// Implement this for an existing pyramid type to search it without copying.
/// Level 0 is the full resolution, level `n` is downsampled by `2^n`.
pub trait SearchPyramid {
    /// Number of available levels.
    fn num_levels(&self) -> usize;

    /// Image of a level, or `None` if the level does not exist.
    fn image(&self, level: usize) -> Option<ImageView<'_, u8>>;

    /// Candidate corners of a level, or `None` if the level does not exist.
    fn corners(&self, level: usize) -> Option<&CornerIndex>;
}

/// One pyramid level with its candidate corners.
#[derive(Clone, Debug)]
pub struct FrameLevel {
    image: OwnedImage,
    corners: CornerIndex,
}

impl FrameLevel {
    /// Pairs an image with a corner index built for the same level size.
    pub fn new(image: OwnedImage, corners: CornerIndex) -> WarpMatchResult<Self> {
        if !corners.is_empty() && corners.height() != image.height() {
            return Err(WarpMatchError::InvalidDimensions {
                width: image.width(),
                height: corners.height(),
            });
        }
        Ok(Self { image, corners })
    }

    /// Returns the level image.
    pub fn image(&self) -> ImageView<'_, u8> {
        self.image.view()
    }

    /// Returns the level corners.
    pub fn corners(&self) -> &CornerIndex {
        &self.corners
    }
}

/// Owned frame pyramid with corner lists per level.
#[derive(Clone, Debug)]
pub struct Frame {
    levels: Vec<FrameLevel>,
}

impl Frame {
    /// Creates a frame from explicit levels. At least one level is required.
    pub fn new(levels: Vec<FrameLevel>) -> WarpMatchResult<Self> {
        if levels.is_empty() {
            return Err(WarpMatchError::IndexOutOfBounds {
                index: 0,
                len: 0,
                context: "frame level",
            });
        }
        Ok(Self { levels })
    }

    /// Pairs each pyramid level with the corner index at the same position.
    pub fn from_pyramid(pyramid: ImagePyramid, corners: Vec<CornerIndex>) -> WarpMatchResult<Self> {
        let images = pyramid.into_levels();
        if corners.len() != images.len() {
            return Err(WarpMatchError::IndexOutOfBounds {
                index: corners.len(),
                len: images.len(),
                context: "corner list",
            });
        }
        let levels = images
            .into_iter()
            .zip(corners)
            .map(|(image, corners)| FrameLevel::new(image, corners))
            .collect::<WarpMatchResult<Vec<_>>>()?;
        Self::new(levels)
    }

    /// Uses every pixel of every level as a search candidate.
    pub fn with_dense_corners(pyramid: ImagePyramid) -> WarpMatchResult<Self> {
        let corners = pyramid
            .levels()
            .iter()
            .map(|level| CornerIndex::dense(level.width(), level.height()))
            .collect::<WarpMatchResult<Vec<_>>>()?;
        Self::from_pyramid(pyramid, corners)
    }

    /// Returns a level by index.
    pub fn level(&self, index: usize) -> Option<&FrameLevel> {
        self.levels.get(index)
    }
}

impl SearchPyramid for Frame {
    fn num_levels(&self) -> usize {
        self.levels.len()
    }

    fn image(&self, level: usize) -> Option<ImageView<'_, u8>> {
        self.levels.get(level).map(FrameLevel::image)
    }

    fn corners(&self, level: usize) -> Option<&CornerIndex> {
        self.levels.get(level).map(FrameLevel::corners)
    }
}
