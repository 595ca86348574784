//! Error types for SnapClass

/// Result type alias using SnapClass's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for SnapClass operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A model (primary or fallback) failed to initialize
    #[error("failed to load model '{model_id}': {reason}")]
    ModelLoad { model_id: String, reason: String },

    /// Inference failed on an otherwise ready model
    #[error("classification error: {0}")]
    Classification(String),

    /// Input could not be used as an image
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new model load error
    pub fn model_load(model_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ModelLoad {
            model_id: model_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a new classification error
    pub fn classification(msg: impl Into<String>) -> Self {
        Self::Classification(msg.into())
    }

    /// Create a new invalid image error
    pub fn invalid_image(msg: impl Into<String>) -> Self {
        Self::InvalidImage(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short machine-readable kind, used in API bodies and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ModelLoad { .. } => "model_load",
            Self::Classification(_) => "classification",
            Self::InvalidImage(_) => "invalid_image",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }
}
