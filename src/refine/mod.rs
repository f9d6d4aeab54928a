//! Inverse compositional refinement assets.
//!
//! The template gradients and the inverse Gauss-Newton matrix are computed
//! once per template. Each iteration then only resamples the current image
//! and accumulates `Jᵀr` over the template interior.

mod gradient;

pub use gradient::GradientTemplate;
