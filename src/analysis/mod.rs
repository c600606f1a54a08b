//! Temporal analysis of recognized text
//!
//! Stabilizes noisy per-frame readings across consecutive passes.

pub mod smoothing;

pub use smoothing::SmoothingFilter;
