//! Demo server configuration

use crate::cli::StartArgs;
use serde::{Deserialize, Serialize};
use snapclass_classifiers::ClassifierConfig;
use std::path::Path;

/// Number of recent images kept in the gallery
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// Demo server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Model loading and inference settings
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Recent images kept for re-classification
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Largest accepted upload in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Start loading the model at startup
    #[serde(default)]
    pub eager_load: bool,

    /// Allow cross-origin requests from anywhere
    #[serde(default)]
    pub allow_any_origin: bool,
}

impl DemoConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: &str, args: &StartArgs) -> anyhow::Result<Self> {
        let mut config = Self::load_file(config_path)?;

        if let Some(model) = &args.model {
            config.classifier.primary_model = model.clone();
        }

        if let Some(fallback) = &args.fallback_model {
            config.classifier.fallback_model = parse_fallback(fallback);
        }

        if args.eager {
            config.eager_load = true;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from file, or use defaults if it does not exist
    pub fn load_file(config_path: &str) -> anyhow::Result<Self> {
        if Path::new(config_path).exists() {
            tracing::info!("Loading configuration from {}", config_path);
            let content = std::fs::read_to_string(config_path)?;
            Ok(serde_yaml::from_str(&content)?)
        } else {
            tracing::debug!("No configuration at {}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.classifier.validate()?;
        if self.history_capacity == 0 {
            anyhow::bail!("history_capacity must be at least 1");
        }
        if self.max_upload_bytes == 0 {
            anyhow::bail!("max_upload_bytes must be at least 1");
        }
        Ok(())
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            history_capacity: default_history_capacity(),
            max_upload_bytes: default_max_upload_bytes(),
            eager_load: false,
            allow_any_origin: false,
        }
    }
}

/// `none` (any case) or an empty value disables the fallback
pub fn parse_fallback(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(value.to_string())
    }
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}
