//! SnapClass Classifiers
//!
//! Model access for the image classifier:
//! - [`ClassifierService`]: lazy, single-flight loading with one fallback model
//! - [`ImagePipeline`] / [`PipelineFactory`]: the inference boundary
//! - `CandlePipelineFactory` (feature `ml-models`): MobileNetV4 from the Hugging Face Hub

pub mod class_labels;
pub mod classifier;
pub mod config;
#[cfg(feature = "ml-models")]
pub mod model_loader;
#[cfg(feature = "ml-models")]
pub mod preprocess;
pub mod service;

pub use class_labels::ClassLabels;
pub use classifier::{ClassifyOptions, ImagePipeline, PipelineFactory, Task, DEFAULT_TOP_K};
pub use config::{
    ClassifierConfig, DeviceSpec, DeviceType, DEFAULT_FALLBACK_MODEL, DEFAULT_PRIMARY_MODEL,
};
#[cfg(feature = "ml-models")]
pub use model_loader::{CandleImagePipeline, CandlePipelineFactory};
pub use service::{
    model_short_name, ClassifierService, LoadPhase, ModelEvent, ModelStatus, WeakClassifierService,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::{ClassifyOptions, ImagePipeline, PipelineFactory, Task};
    pub use crate::config::ClassifierConfig;
    pub use crate::service::{ClassifierService, ModelEvent, ModelStatus};
    pub use snapclass_core::{ImageInput, Prediction};
}
