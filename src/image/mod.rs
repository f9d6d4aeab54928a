//! Image views, owned buffers and pyramid utilities.
//!
//! `ImageView` is a borrowed 2D view into a 1D buffer with an explicit stride.
//! The stride counts elements between the starts of consecutive rows, so a
//! stride larger than the width represents padded rows.

use crate::util::{WarpMatchError, WarpMatchResult};

#[cfg(feature = "image-io")]
pub mod io;
pub mod pyramid;

/// Integer pixel location, `x` is the column and `y` the row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Pixel {
    pub x: i32,
    pub y: i32,
}

impl Pixel {
    /// Creates a pixel location.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to `other`.
    #[inline]
    pub fn dist_sq(self, other: Pixel) -> i64 {
        let dx = i64::from(self.x) - i64::from(other.x);
        let dy = i64::from(self.y) - i64::from(other.y);
        dx * dx + dy * dy
    }
}

/// Borrowed 2D image view with an explicit stride.
#[derive(Copy, Clone, Debug)]
pub struct ImageView<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a, T> ImageView<'a, T> {
    /// Creates a contiguous view with `stride == width`.
    pub fn from_slice(data: &'a [T], width: usize, height: usize) -> WarpMatchResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Creates a view with an explicit stride.
    pub fn new(data: &'a [T], width: usize, height: usize, stride: usize) -> WarpMatchResult<Self> {
        let needed = required_len(width, height, stride)?;
        if data.len() < needed {
            return Err(WarpMatchError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the stride in elements between row starts.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the backing slice including any row padding.
    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    /// Returns the element at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&'a T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y * self.stride + x)
    }

    /// Returns a contiguous slice for row `y` with length `width`.
    pub fn row(&self, y: usize) -> Option<&'a [T]> {
        if y >= self.height {
            return None;
        }
        let start = y * self.stride;
        self.data.get(start..start + self.width)
    }

    /// Returns true when `p` lies at least `border` pixels inside every edge.
    pub fn contains_with_border(&self, p: Pixel, border: i32) -> bool {
        let border = i64::from(border);
        let (x, y) = (i64::from(p.x), i64::from(p.y));
        x >= border
            && y >= border
            && x < self.width as i64 - border
            && y < self.height as i64 - border
    }

    /// Returns true when the `size`×`size` block with top-left `top_left`
    /// lies entirely inside the image. The block may touch the edges.
    pub fn contains_block(&self, top_left: Pixel, size: usize) -> bool {
        let (x, y) = (i64::from(top_left.x), i64::from(top_left.y));
        let size = size as i64;
        x >= 0 && y >= 0 && x + size <= self.width as i64 && y + size <= self.height as i64
    }
}

impl ImageView<'_, u8> {
    /// Bilinearly samples the image at a continuous position.
    ///
    /// Returns `None` when the position lies outside `[0, w-1] × [0, h-1]`.
    /// A position exactly on the last row or column uses the edge pixel with
    /// zero weight on its missing neighbour.
    pub fn sample_bilinear(&self, x: f64, y: f64) -> Option<f32> {
        const EPS: f64 = 1e-9;
        let max_x = (self.width - 1) as f64;
        let max_y = (self.height - 1) as f64;
        let inside = (-EPS..=max_x + EPS).contains(&x) && (-EPS..=max_y + EPS).contains(&y);
        if !inside {
            return None;
        }
        let x = x.clamp(0.0, max_x);
        let y = y.clamp(0.0, max_y);
        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = (x - x0 as f64) as f32;
        let fy = (y - y0 as f64) as f32;

        let row0 = self.row(y0)?;
        let row1 = self.row(y1)?;
        let top = f32::from(row0[x0]) * (1.0 - fx) + f32::from(row0[x1]) * fx;
        let bottom = f32::from(row1[x0]) * (1.0 - fx) + f32::from(row1[x1]) * fx;
        Some(top * (1.0 - fy) + bottom * fy)
    }
}

/// Owned contiguous grayscale image buffer.
#[derive(Clone, Debug)]
pub struct OwnedImage {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl OwnedImage {
    /// Wraps a contiguous row-major buffer of exactly `width * height` bytes.
    pub fn new(data: Vec<u8>, width: usize, height: usize) -> WarpMatchResult<Self> {
        let needed = required_len(width, height, width)?;
        if data.len() < needed {
            return Err(WarpMatchError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        if data.len() > needed {
            return Err(WarpMatchError::InvalidDimensions { width, height });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Builds an image by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(
        width: usize,
        height: usize,
        mut f: impl FnMut(usize, usize) -> u8,
    ) -> WarpMatchResult<Self> {
        required_len(width, height, width)?;
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self::new(data, width, height)
    }

    /// Copies a (possibly strided) view into a contiguous buffer.
    pub fn from_view(view: ImageView<'_, u8>) -> WarpMatchResult<Self> {
        let mut data = Vec::with_capacity(view.width() * view.height());
        for y in 0..view.height() {
            let row = view.row(y).ok_or(WarpMatchError::BufferTooSmall {
                needed: (y + 1) * view.stride(),
                got: view.as_slice().len(),
            })?;
            data.extend_from_slice(row);
        }
        Self::new(data, view.width(), view.height())
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the raw row-major pixel data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns a borrowed view of the image.
    pub fn view(&self) -> ImageView<'_, u8> {
        ImageView {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.width,
        }
    }
}

fn required_len(width: usize, height: usize, stride: usize) -> WarpMatchResult<usize> {
    if width == 0 || height == 0 {
        return Err(WarpMatchError::InvalidDimensions { width, height });
    }
    if stride < width {
        return Err(WarpMatchError::InvalidStride { width, stride });
    }
    (height - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(width))
        .ok_or(WarpMatchError::InvalidDimensions { width, height })
}
