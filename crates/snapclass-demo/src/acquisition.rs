//! Turning uploads and files into [`ImageInput`]s
//!
//! Accepts `multipart/form-data` (first part with an `image/*` type) or a raw
//! body with an `image/*` `Content-Type`. Anything else is rejected before
//! it reaches the classifier.

use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header;
use snapclass_core::types::is_image_media_type;
use snapclass_core::ImageInput;
use std::path::Path;

/// Why an upload could not be turned into an image
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("malformed upload: {0}")]
    Malformed(String),

    #[error("upload exceeds {0} bytes")]
    TooLarge(usize),
}

/// Read the image carried by an HTTP request
pub async fn image_from_request(request: Request, limit: usize) -> Result<ImageInput, AcquireError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if content_type.to_ascii_lowercase().starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| AcquireError::Malformed(e.body_text()))?;
        return image_from_multipart(multipart).await;
    }

    if !is_image_media_type(&content_type) {
        let shown = if content_type.is_empty() { "none" } else { content_type.as_str() };
        return Err(AcquireError::UnsupportedMediaType(shown.to_string()));
    }

    let bytes = axum::body::to_bytes(request.into_body(), limit)
        .await
        .map_err(|_| AcquireError::TooLarge(limit))?;

    image_from_bytes(bytes, &content_type, None)
}

async fn image_from_multipart(mut multipart: Multipart) -> Result<ImageInput, AcquireError> {
    let mut skipped = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AcquireError::Malformed(e.body_text()))?
    {
        let file_name = field.file_name().map(str::to_string);
        let media_type = field
            .content_type()
            .filter(|ct| *ct != "application/octet-stream")
            .map(str::to_string)
            .or_else(|| file_name.as_deref().and_then(guess_media_type))
            .unwrap_or_default();

        if !is_image_media_type(&media_type) {
            tracing::debug!(
                "Skipping multipart field {:?} with type '{}'",
                field.name(),
                media_type
            );
            skipped.push(media_type);
            continue;
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| AcquireError::Malformed(e.body_text()))?;
        return image_from_bytes(bytes, &media_type, file_name);
    }

    Err(AcquireError::UnsupportedMediaType(if skipped.is_empty() {
        "no image part in form".to_string()
    } else {
        skipped.join(", ")
    }))
}

fn image_from_bytes(
    bytes: bytes::Bytes,
    media_type: &str,
    file_name: Option<String>,
) -> Result<ImageInput, AcquireError> {
    if bytes.is_empty() {
        return Err(AcquireError::Malformed("empty image body".to_string()));
    }

    let image = ImageInput::new(bytes, media_type)
        .map_err(|e| AcquireError::UnsupportedMediaType(e.to_string()))?;

    Ok(match file_name {
        Some(name) => image.with_file_name(name),
        None => image,
    })
}

/// Media type of a file guessed from its extension
pub fn guess_media_type(path: &str) -> Option<String> {
    mime_guess::from_path(path)
        .first()
        .map(|mime| mime.essence_str().to_string())
}

/// Read an image file from disk
///
/// Returns `Ok(None)` for files that are not images, which callers skip.
pub async fn image_from_file(path: &Path) -> anyhow::Result<Option<ImageInput>> {
    let shown = path.display().to_string();
    let media_type = match guess_media_type(&shown) {
        Some(media_type) if is_image_media_type(&media_type) => media_type,
        other => {
            tracing::warn!(
                "Skipping {}: not an image ({})",
                shown,
                other.as_deref().unwrap_or("unknown type")
            );
            return Ok(None);
        }
    };

    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or(shown);

    Ok(ImageInput::accept(bytes, &media_type).map(|image| image.with_file_name(file_name)))
}
