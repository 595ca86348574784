//! Class label tables and probability ranking
//!
//! Hub model configs name their classes in one of two ways:
//! - timm: `label_names` (often synset ids) plus optional `label_descriptions`
//! - transformers: `id2label` mapping stringified indices to names

use serde_json::Value;
use snapclass_core::Prediction;
use std::cmp::Ordering;

/// Ordered class names for a model's output layer
#[derive(Debug, Clone, PartialEq)]
pub struct ClassLabels {
    labels: Vec<String>,
}

impl ClassLabels {
    /// Generic `LABEL_<n>` names for models without a label table
    pub fn generic(num_classes: usize) -> Self {
        Self {
            labels: (0..num_classes).map(|i| format!("LABEL_{}", i)).collect(),
        }
    }

    pub fn from_vec(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Read labels from a model `config.json`
    ///
    /// Returns `None` if the config carries no usable table.
    pub fn from_model_config(config: &Value) -> Option<Self> {
        if let Some(names) = config.get("label_names").and_then(Value::as_array) {
            let descriptions = config.get("label_descriptions");
            let labels = names
                .iter()
                .filter_map(Value::as_str)
                .map(|name| {
                    match descriptions
                        .and_then(|d| d.get(name))
                        .and_then(Value::as_str)
                    {
                        Some(description) => format!("{} {}", name, description),
                        None => name.to_string(),
                    }
                })
                .collect::<Vec<_>>();

            if !labels.is_empty() {
                return Some(Self { labels });
            }
        }

        let id2label = config.get("id2label").and_then(Value::as_object)?;
        let mut indexed: Vec<(usize, String)> = id2label
            .iter()
            .filter_map(|(index, label)| {
                Some((index.parse().ok()?, label.as_str()?.to_string()))
            })
            .collect();
        if indexed.is_empty() {
            return None;
        }
        indexed.sort_by_key(|(index, _)| *index);

        let len = indexed.last().map(|(index, _)| index + 1).unwrap_or(0);
        let mut labels = ClassLabels::generic(len).labels;
        for (index, label) in indexed {
            labels[index] = label;
        }

        Some(Self { labels })
    }

    /// Number of classes declared in a model `config.json`
    pub fn num_classes_in(config: &Value) -> Option<usize> {
        config
            .get("num_classes")
            .or_else(|| config.get("num_labels"))
            .and_then(Value::as_u64)
            .map(|n| n as usize)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Turn a probability vector into the `k` best predictions, highest first
    pub fn rank(&self, probabilities: &[f32], k: usize) -> Vec<Prediction> {
        let mut indices: Vec<usize> = (0..probabilities.len()).collect();
        indices.sort_by(|&a, &b| {
            probabilities[b]
                .partial_cmp(&probabilities[a])
                .unwrap_or(Ordering::Equal)
        });

        indices
            .into_iter()
            .take(k)
            .map(|index| {
                let label = match self.get(index) {
                    Some(label) => label.to_string(),
                    None => format!("LABEL_{}", index),
                };
                Prediction::new(label, probabilities[index])
            })
            .collect()
    }
}
