//! Inference boundary traits and common types

use async_trait::async_trait;
use snapclass_core::{ImageInput, Prediction, Result};
use std::fmt;
use std::sync::Arc;

/// Default number of predictions requested from a pipeline
pub const DEFAULT_TOP_K: usize = 10;

/// Inference task a pipeline is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    ImageClassification,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImageClassification => "image-classification",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options passed with every inference call
#[derive(Debug, Clone, Copy)]
pub struct ClassifyOptions {
    /// Maximum number of predictions to return
    pub top_k: usize,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// A ready-to-use classification handle
///
/// Implementations return predictions ranked by descending score; callers
/// keep that order as-is.
#[async_trait]
pub trait ImagePipeline: Send + Sync {
    /// Run the model on one image
    async fn invoke(&self, image: &ImageInput, options: ClassifyOptions) -> Result<Vec<Prediction>>;

    /// Identifier of the model backing this pipeline
    fn model_id(&self) -> &str;
}

/// Builds pipelines for a task and model identifier.
///
/// This is the only seam between SnapClass and an inference library;
/// swapping libraries means providing another factory.
#[async_trait]
pub trait PipelineFactory: Send + Sync {
    /// Load (download and initialize) a pipeline
    async fn load(&self, task: Task, model_id: &str) -> Result<Arc<dyn ImagePipeline>>;
}
