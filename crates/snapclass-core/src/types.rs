//! Core types for SnapClass

use crate::error::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A single ranked label produced by an image classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Class label, possibly still carrying dataset artifacts
    pub label: String,

    /// Confidence score (0.0-1.0)
    pub score: f32,
}

impl Prediction {
    /// Create a new prediction
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// An encoded image handed to the classifier
///
/// The bytes are reference counted, so clones share one buffer and the
/// buffer is released when the last owner drops it.
#[derive(Debug, Clone)]
pub struct ImageInput {
    bytes: Bytes,
    media_type: String,
    file_name: Option<String>,
}

impl ImageInput {
    /// Create an image input, rejecting anything that is not `image/*`
    pub fn new(bytes: impl Into<Bytes>, media_type: impl Into<String>) -> Result<Self> {
        let media_type = media_type.into();
        if !is_image_media_type(&media_type) {
            return Err(Error::invalid_image(format!(
                "unsupported media type '{}'",
                media_type
            )));
        }

        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(Error::invalid_image("empty image body"));
        }

        Ok(Self {
            bytes,
            media_type,
            file_name: None,
        })
    }

    /// Accept the input only if it is a non-empty image; anything else is
    /// dropped without an error
    pub fn accept(bytes: impl Into<Bytes>, media_type: &str) -> Option<Self> {
        match Self::new(bytes, media_type) {
            Ok(image) => Some(image),
            Err(e) => {
                tracing::debug!("Ignoring input: {}", e);
                None
            }
        }
    }

    /// Attach the original file name
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Encoded image bytes
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Media type, e.g. `image/jpeg`
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Whether a media type names an image (`image/png`, `image/jpeg; q=1`, ...)
pub fn is_image_media_type(media_type: &str) -> bool {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.split_once('/') {
        Some((kind, subtype)) => kind == "image" && !subtype.is_empty(),
        None => false,
    }
}
