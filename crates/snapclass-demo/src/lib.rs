//! SnapClass demo server and CLI
//!
//! Serves a single-page image classifier backed by [`ClassifierService`],
//! with a small JSON API, a WebSocket event stream and Prometheus metrics.

pub mod acquisition;
pub mod cli;
pub mod config;
pub mod history;
pub mod models;
pub mod server;
pub mod state;

pub use cli::*;
pub use config::*;
pub use models::*;
pub use server::*;
pub use state::*;

use snapclass_classifiers::{ClassifierConfig, ClassifierService, PipelineFactory};
use std::sync::Arc;

/// The pipeline factory used by the binaries
#[cfg(feature = "ml-models")]
pub fn default_factory(config: &ClassifierConfig) -> anyhow::Result<Arc<dyn PipelineFactory>> {
    let factory = snapclass_classifiers::CandlePipelineFactory::from_config(config);
    tracing::debug!("Model cache: {}", factory.cache_dir().display());
    Ok(Arc::new(factory))
}

/// The pipeline factory used by the binaries
#[cfg(not(feature = "ml-models"))]
pub fn default_factory(_config: &ClassifierConfig) -> anyhow::Result<Arc<dyn PipelineFactory>> {
    anyhow::bail!("snapclass was built without the `ml-models` feature; no inference backend available")
}

/// Build a classifier service with the default factory
pub fn build_service(config: ClassifierConfig) -> anyhow::Result<ClassifierService> {
    let factory = default_factory(&config)?;
    Ok(ClassifierService::new(config, factory)?)
}
