//! Pyramid level coordinate helpers.
//!
//! Level `n` is downsampled by `2^n` relative to level 0. Conversions use the
//! pixel-centre convention: the centre of level-`n` pixel `p` sits at
//! `(p + 0.5) * 2^n - 0.5` in level-0 coordinates.

use nalgebra::Vector2;

/// Returns the downsampling factor of a pyramid level.
#[inline]
pub fn level_scale(level: usize) -> i32 {
    1i32 << level
}

/// Converts a level-`level` position to level-0 coordinates.
#[inline]
pub fn level_zero_pos(pos: Vector2<f64>, level: usize) -> Vector2<f64> {
    let scale = f64::from(level_scale(level));
    pos.map(|v| (v + 0.5) * scale - 0.5)
}

/// Converts a level-0 position to level-`level` coordinates.
#[inline]
pub fn level_n_pos(pos: Vector2<f64>, level: usize) -> Vector2<f64> {
    let scale = f64::from(level_scale(level));
    pos.map(|v| (v + 0.5) / scale - 0.5)
}
