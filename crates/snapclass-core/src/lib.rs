//! SnapClass Core
//!
//! Core types and utilities shared across SnapClass components.
//!
//! This crate provides:
//! - The shared error type and result alias
//! - Prediction and image input types passed across the inference boundary
//! - Label normalization for dataset-style class names
//! - Display-side rendering of ranked predictions

pub mod error;
pub mod labels;
pub mod render;
pub mod types;

pub use error::{Error, Result};
pub use labels::LabelNormalizer;
pub use render::{render_results, ConfidenceBand, PredictionRow, ResultsView};
pub use types::{ImageInput, Prediction};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::labels::LabelNormalizer;
    pub use crate::types::{ImageInput, Prediction};
}
