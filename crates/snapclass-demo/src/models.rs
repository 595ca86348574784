//! API and event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snapclass_classifiers::ModelStatus;
use snapclass_core::{Prediction, ResultsView};

/// Events pushed to WebSocket clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DemoEvent {
    /// Model load lifecycle changed
    ModelStatusChanged(ModelStatus),
    /// An image was classified
    ClassificationCompleted(ClassificationResponse),
    /// Recent images changed (new entry or cleared)
    HistoryChanged(Vec<HistoryEntry>),
}

/// Result of classifying one image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResponse {
    /// History entry id of the classified image
    pub id: String,
    /// Short name of the model that produced the predictions
    pub model: String,
    pub predictions: Vec<Prediction>,
    /// Display rows for the results panel
    pub view: ResultsView,
    pub latency_ms: f64,
}

/// Metadata of a recent image, without its bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub file_name: Option<String>,
    pub media_type: String,
    pub size_bytes: usize,
    pub model: String,
    pub top_label: Option<String>,
    pub top_score: Option<f32>,
    pub classified_at: DateTime<Utc>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model: ModelStatus,
}
