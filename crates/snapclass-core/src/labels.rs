//! Label cleanup for dataset-style class names
//!
//! ImageNet-derived models report labels such as
//! `"n01234567 tiger, Panthera tigris"`: a synset code, the common name and a
//! list of synonyms. Only the common name is shown to users.

use crate::error::{Error, Result};
use regex::Regex;

/// Leading dataset code: an optional letter followed by at least four digits
/// (`n01440764`, `0042`), then whitespace or a `:` separator.
const DATASET_CODE_PATTERN: &str = r"^\s*[A-Za-z]?\d{4,}(?:\s*:\s*|\s+)";

/// Strips dataset codes and synonym lists from raw class labels
#[derive(Debug, Clone)]
pub struct LabelNormalizer {
    code_prefix: Regex,
}

impl LabelNormalizer {
    /// Create a new label normalizer
    pub fn new() -> Result<Self> {
        let code_prefix = Regex::new(DATASET_CODE_PATTERN)
            .map_err(|e| Error::internal(format!("Failed to build label pattern: {}", e)))?;
        Ok(Self { code_prefix })
    }

    /// Normalize a raw label
    ///
    /// Removes a leading dataset code, then truncates at the first comma.
    /// A label that is only a code is returned unchanged rather than emptied.
    pub fn normalize(&self, label: &str) -> String {
        let without_code = match self.code_prefix.find(label) {
            Some(m) if m.end() < label.len() => &label[m.end()..],
            _ => label,
        };

        let primary = without_code
            .split(',')
            .next()
            .unwrap_or(without_code)
            .trim();

        if primary.is_empty() {
            label.trim().to_string()
        } else {
            primary.to_string()
        }
    }
}

/// Capitalize the first letter of each space-separated word
pub fn title_case(label: &str) -> String {
    label
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
