//! Display model for ranked predictions
//!
//! Pure functions only: the web page and the CLI both render from
//! [`ResultsView`].

use crate::labels::title_case;
use crate::types::Prediction;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of skeleton rows shown while an image is being analyzed
pub const LOADING_PLACEHOLDERS: usize = 5;

/// What the results panel should show
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "rows", rename_all = "snake_case")]
pub enum ResultsView {
    /// Analysis in progress, show this many placeholders
    Loading(usize),
    /// Nothing to show
    Empty,
    /// Ranked predictions in the order received
    Ranked(Vec<PredictionRow>),
}

/// One formatted prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    /// 1-based rank
    pub rank: usize,
    /// Display label
    pub label: String,
    pub score: f32,
    /// Score as a percentage with one decimal, e.g. `"87.3%"`
    pub percent: String,
    pub band: ConfidenceBand,
}

/// Coarse confidence bucket used for bar colouring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
    VeryLow,
}

impl ConfidenceBand {
    pub fn from_score(score: f32) -> Self {
        if score > 0.7 {
            Self::High
        } else if score > 0.4 {
            Self::Medium
        } else if score > 0.2 {
            Self::Low
        } else {
            Self::VeryLow
        }
    }
}

/// Build the results view for a prediction list and loading flag
pub fn render_results(predictions: &[Prediction], is_loading: bool) -> ResultsView {
    if is_loading {
        return ResultsView::Loading(LOADING_PLACEHOLDERS);
    }

    if predictions.is_empty() {
        return ResultsView::Empty;
    }

    let rows = predictions
        .iter()
        .enumerate()
        .map(|(index, prediction)| PredictionRow {
            rank: index + 1,
            label: display_label(&prediction.label),
            score: prediction.score,
            percent: format_percent(prediction.score),
            band: ConfidenceBand::from_score(prediction.score),
        })
        .collect();

    ResultsView::Ranked(rows)
}

/// Drop anything after the first comma and capitalize each word
pub fn display_label(label: &str) -> String {
    let primary = label.split(',').next().unwrap_or(label);
    title_case(primary.trim())
}

/// Format a 0..1 score as a percentage with one decimal
pub fn format_percent(score: f32) -> String {
    format!("{:.1}%", score * 100.0)
}

impl fmt::Display for ResultsView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading(_) => writeln!(f, "Analyzing image..."),
            Self::Empty => writeln!(f, "No predictions"),
            Self::Ranked(rows) => {
                let width = rows.iter().map(|r| r.label.len()).max().unwrap_or(0);
                for row in rows {
                    let bar = "#".repeat((row.score.clamp(0.0, 1.0) * 20.0).round() as usize);
                    writeln!(
                        f,
                        "{:>2}. {:<width$}  {:>6}  {}",
                        row.rank,
                        row.label,
                        row.percent,
                        bar,
                        width = width
                    )?;
                }
                Ok(())
            }
        }
    }
}
