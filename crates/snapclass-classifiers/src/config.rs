//! Configuration for the classifier service and model loading

use serde::{Deserialize, Serialize};
use snapclass_core::{Error, Result};
use std::path::{Path, PathBuf};

/// Primary hosted model
pub const DEFAULT_PRIMARY_MODEL: &str = "timm/mobilenetv4_conv_small.e2400_r224_in1k";

/// Alternate model tried once when the primary fails to load
pub const DEFAULT_FALLBACK_MODEL: &str = "timm/mobilenetv4_conv_medium.e500_r256_in1k";

/// Configuration for the classifier service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Model identifier loaded first
    #[serde(default = "default_primary_model")]
    pub primary_model: String,

    /// Model identifier tried once if the primary fails; `null` disables
    #[serde(default = "default_fallback_model")]
    pub fallback_model: Option<String>,

    /// Number of predictions returned per image
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Device to run inference on
    #[serde(default)]
    pub device: DeviceSpec,

    /// Hub revision used for both models
    #[serde(default = "default_revision")]
    pub revision: String,

    /// Download cache; defaults to the platform cache directory
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

/// Device specification (for config files)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSpec {
    #[default]
    Cpu,
    Cuda { index: Option<usize> },
    Metal { index: Option<usize> },
}

/// Device type for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    /// CPU inference (always available)
    Cpu,
    /// CUDA GPU inference (if available)
    Cuda(usize),
    /// Metal (Apple Silicon)
    Metal(usize),
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            primary_model: default_primary_model(),
            fallback_model: default_fallback_model(),
            top_k: default_top_k(),
            device: DeviceSpec::Cpu,
            revision: default_revision(),
            cache_dir: None,
        }
    }
}

impl ClassifierConfig {
    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Invalid classifier config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Load from file if it exists, otherwise use defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            tracing::info!("Loading classifier config from {}", path.display());
            Self::from_file(path)
        } else {
            tracing::debug!("No classifier config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Set the primary model identifier
    pub fn with_primary_model(mut self, model_id: impl Into<String>) -> Self {
        self.primary_model = model_id.into();
        self
    }

    /// Set (or clear) the fallback model identifier
    pub fn with_fallback_model(mut self, model_id: Option<String>) -> Self {
        self.fallback_model = model_id;
        self
    }

    /// Set the number of returned predictions
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.primary_model.trim().is_empty() {
            return Err(Error::config("primary_model must not be empty"));
        }
        if matches!(&self.fallback_model, Some(id) if id.trim().is_empty()) {
            return Err(Error::config("fallback_model must not be empty; use null to disable"));
        }
        if self.top_k == 0 {
            return Err(Error::config("top_k must be at least 1"));
        }
        Ok(())
    }
}

impl DeviceSpec {
    /// Convert to DeviceType
    pub fn to_device_type(&self) -> DeviceType {
        match self {
            DeviceSpec::Cpu => DeviceType::Cpu,
            DeviceSpec::Cuda { index } => DeviceType::Cuda(index.unwrap_or(0)),
            DeviceSpec::Metal { index } => DeviceType::Metal(index.unwrap_or(0)),
        }
    }
}

fn default_primary_model() -> String {
    DEFAULT_PRIMARY_MODEL.to_string()
}

fn default_fallback_model() -> Option<String> {
    Some(DEFAULT_FALLBACK_MODEL.to_string())
}

fn default_top_k() -> usize {
    crate::classifier::DEFAULT_TOP_K
}

fn default_revision() -> String {
    "main".to_string()
}
