//! Recently classified images
//!
//! Entries own their image bytes. Evicting or clearing an entry drops its
//! reference, so memory is released once no request still holds the image.

use crate::models::HistoryEntry;
use chrono::Utc;
use parking_lot::RwLock;
use snapclass_core::{ImageInput, Prediction};
use std::collections::VecDeque;
use uuid::Uuid;

struct StoredImage {
    entry: HistoryEntry,
    image: ImageInput,
}

/// Bounded, newest-first list of classified images
pub struct RecentImages {
    capacity: usize,
    entries: RwLock<VecDeque<StoredImage>>,
}

impl RecentImages {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    /// Record a classified image, evicting the oldest entry when full
    pub fn push(&self, image: ImageInput, model: &str, predictions: &[Prediction]) -> HistoryEntry {
        let top = predictions.first();
        let entry = HistoryEntry {
            id: Uuid::new_v4().to_string(),
            file_name: image.file_name().map(str::to_string),
            media_type: image.media_type().to_string(),
            size_bytes: image.len(),
            model: model.to_string(),
            top_label: top.map(|p| p.label.clone()),
            top_score: top.map(|p| p.score),
            classified_at: Utc::now(),
        };

        let mut entries = self.entries.write();
        entries.push_front(StoredImage {
            entry: entry.clone(),
            image,
        });
        while entries.len() > self.capacity {
            if let Some(evicted) = entries.pop_back() {
                tracing::debug!("Evicted history entry {}", evicted.entry.id);
            }
        }

        entry
    }

    /// Entry metadata, newest first
    pub fn list(&self) -> Vec<HistoryEntry> {
        self.entries.read().iter().map(|s| s.entry.clone()).collect()
    }

    pub fn get(&self, id: &str) -> Option<HistoryEntry> {
        self.entries
            .read()
            .iter()
            .find(|s| s.entry.id == id)
            .map(|s| s.entry.clone())
    }

    /// The stored image of an entry
    pub fn image(&self, id: &str) -> Option<ImageInput> {
        self.entries
            .read()
            .iter()
            .find(|s| s.entry.id == id)
            .map(|s| s.image.clone())
    }

    /// Drop every entry, returning how many were removed
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(tag: u8) -> ImageInput {
        ImageInput::new(vec![tag; 16], "image/jpeg")
            .unwrap()
            .with_file_name(format!("photo-{}.jpg", tag))
    }

    #[test]
    fn test_newest_first() {
        let history = RecentImages::new(10);
        history.push(image(1), "m", &[Prediction::new("cat", 0.9)]);
        history.push(image(2), "m", &[Prediction::new("dog", 0.8)]);

        let entries = history.list();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].file_name.as_deref(), Some("photo-2.jpg"));
        assert_eq!(entries[0].top_label.as_deref(), Some("dog"));
        assert_eq!(entries[1].file_name.as_deref(), Some("photo-1.jpg"));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let history = RecentImages::new(10);
        let first = history.push(image(0), "m", &[]);
        for i in 1..=10 {
            history.push(image(i), "m", &[]);
        }

        assert_eq!(history.len(), 10);
        assert!(history.get(&first.id).is_none());
        assert!(history.image(&first.id).is_none());
        assert_eq!(history.list()[0].file_name.as_deref(), Some("photo-10.jpg"));
        assert_eq!(history.list()[9].file_name.as_deref(), Some("photo-1.jpg"));
    }

    #[test]
    fn test_eviction_releases_bytes() {
        let history = RecentImages::new(1);
        let img = image(7);
        let probe = img.bytes().clone();
        history.push(img, "m", &[]);
        assert!(!probe.is_unique());

        history.push(image(8), "m", &[]);
        assert!(probe.is_unique());
    }

    #[test]
    fn test_image_lookup_and_clear() {
        let history = RecentImages::new(3);
        let entry = history.push(image(3), "mobilenet", &[Prediction::new("cat", 0.5)]);

        let stored = history.image(&entry.id).unwrap();
        assert_eq!(stored.bytes().as_ref(), &[3u8; 16]);
        assert_eq!(history.get(&entry.id).unwrap().model, "mobilenet");
        assert_eq!(entry.size_bytes, 16);

        assert_eq!(history.clear(), 1);
        assert!(history.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        assert_eq!(RecentImages::new(0).capacity(), 1);
    }
}
