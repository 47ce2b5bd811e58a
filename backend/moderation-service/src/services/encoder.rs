//! Feature extraction and bucketized state encoding.

use crate::models::{ContentRecord, ContentType, Metadata, StateKey};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};

/// Highest bucket index for every feature.
const MAX_BUCKET: u8 = 5;
/// Bytes per length bucket.
const LENGTH_BUCKET_SPAN: usize = 2000;
/// Authenticity assumed when metadata does not carry one.
pub const DEFAULT_AUTHENTICITY: f64 = 0.5;

/// Quantize a normalized value into `0..=5`. NaN maps to bucket 0.
pub fn bucket(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    (value * 5.0).floor().clamp(0.0, MAX_BUCKET as f64) as u8
}

pub fn length_bucket(length: usize) -> u8 {
    (length / LENGTH_BUCKET_SPAN).min(MAX_BUCKET as usize) as u8
}

/// Features that determine a state key
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContentFeatures {
    pub content_type: ContentType,
    pub length: usize,
    pub toxicity_score: f64,
    pub authenticity_score: f64,
}

impl From<&ContentRecord> for ContentFeatures {
    fn from(record: &ContentRecord) -> Self {
        Self {
            content_type: record.content_type,
            length: record.length,
            toxicity_score: record.toxicity_score,
            authenticity_score: record.authenticity_score,
        }
    }
}

/// Pure mapping from features to `type_{t}_len_{l}_tox_{x}_auth_{a}`.
pub fn encode_features(features: &ContentFeatures) -> StateKey {
    StateKey::new(format!(
        "type_{}_len_{}_tox_{}_auth_{}",
        features.content_type.index(),
        length_bucket(features.length),
        bucket(features.toxicity_score),
        bucket(features.authenticity_score),
    ))
}

/// Build a record from caller metadata.
///
/// `length`, `toxicity_score` and `authenticity_score` are read from metadata
/// when present and well-formed; otherwise `fallback_length`,
/// `fallback_toxicity` and [`DEFAULT_AUTHENTICITY`] are used.
pub fn record_from_metadata(
    content_id: &str,
    content_type: ContentType,
    metadata: &Metadata,
    fallback_length: usize,
    fallback_toxicity: f64,
) -> ContentRecord {
    let length = metadata
        .get_f64("length")
        .filter(|len| *len >= 0.0)
        .map(|len| len as usize)
        .unwrap_or(fallback_length);

    ContentRecord {
        content_id: content_id.to_string(),
        content_type,
        length,
        toxicity_score: metadata
            .get_unit("toxicity_score")
            .unwrap_or_else(|| fallback_toxicity.clamp(0.0, 1.0)),
        authenticity_score: metadata
            .get_unit("authenticity_score")
            .unwrap_or(DEFAULT_AUTHENTICITY),
        tags: metadata.get_str_list("tags").into_iter().collect(),
        registered_at: Utc::now(),
    }
}

/// Bounded store of registered content; the oldest record is evicted first.
#[derive(Debug)]
pub struct ContentRegistry {
    records: HashMap<String, ContentRecord>,
    order: VecDeque<String>,
    capacity: usize,
}

impl ContentRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Store `record` unless its id is already registered. Records are never
    /// overwritten. Returns the key of whichever record is stored for the id.
    pub fn register(&mut self, record: ContentRecord) -> StateKey {
        if let Some(existing) = self.records.get(&record.content_id) {
            tracing::debug!(content_id = %record.content_id, "Content already registered");
            return encode_features(&existing.into());
        }

        while self.records.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.records.remove(&oldest);
        }

        let key = encode_features(&(&record).into());
        self.order.push_back(record.content_id.clone());
        self.records.insert(record.content_id.clone(), record);
        key
    }

    pub fn get(&self, content_id: &str) -> Option<&ContentRecord> {
        self.records.get(content_id)
    }

    /// Total over all ids: unregistered ids map to the sentinel key.
    pub fn encode(&self, content_id: &str) -> StateKey {
        self.records
            .get(content_id)
            .map(|record| encode_features(&record.into()))
            .unwrap_or_else(StateKey::unknown)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn features(length: usize, toxicity: f64, authenticity: f64) -> ContentFeatures {
        ContentFeatures {
            content_type: ContentType::Text,
            length,
            toxicity_score: toxicity,
            authenticity_score: authenticity,
        }
    }

    #[test]
    fn test_bucket_edges() {
        assert_eq!(bucket(0.0), 0);
        assert_eq!(bucket(0.19), 0);
        assert_eq!(bucket(0.2), 1);
        assert_eq!(bucket(0.99), 4);
        assert_eq!(bucket(1.0), 5);
        assert_eq!(bucket(7.0), 5);
        assert_eq!(bucket(-1.0), 0);
        assert_eq!(bucket(f64::NAN), 0);
    }

    #[test]
    fn test_length_bucket() {
        assert_eq!(length_bucket(0), 0);
        assert_eq!(length_bucket(1999), 0);
        assert_eq!(length_bucket(2000), 1);
        assert_eq!(length_bucket(1_000_000), 5);
    }

    #[test]
    fn test_equal_buckets_share_a_key() {
        let a = encode_features(&features(10, 0.41, 0.5));
        let b = encode_features(&features(1500, 0.59, 0.55));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "type_0_len_0_tox_2_auth_2");

        let c = encode_features(&features(10, 0.61, 0.5));
        assert_ne!(a, c);
    }

    #[test]
    fn test_record_from_metadata_defaults() {
        let metadata = Metadata::from_value(json!({
            "toxicity_score": "bad",
            "authenticity_score": 3.0,
            "tags": ["news", "news", "sports"]
        }));
        let record = record_from_metadata("c1", ContentType::Image, &metadata, 4096, 0.7);

        assert_eq!(record.length, 4096);
        assert_eq!(record.toxicity_score, 0.7);
        assert_eq!(record.authenticity_score, 1.0);
        assert_eq!(record.tags.len(), 2);
    }

    #[test]
    fn test_registry_is_write_once() {
        let mut registry = ContentRegistry::new(10);
        let first = record_from_metadata("c1", ContentType::Text, &Metadata::new(), 10, 0.9);
        let second = record_from_metadata("c1", ContentType::Text, &Metadata::new(), 10, 0.0);

        let key = registry.register(first);
        assert_eq!(registry.register(second), key);
        assert_eq!(registry.get("c1").map(|r| r.toxicity_score), Some(0.9));
    }

    #[test]
    fn test_registry_evicts_oldest() {
        let mut registry = ContentRegistry::new(2);
        for id in ["a", "b", "c"] {
            registry.register(record_from_metadata(id, ContentType::Code, &Metadata::new(), 1, 0.0));
        }
        assert_eq!(registry.len(), 2);
        assert!(registry.get("a").is_none());
        assert!(registry.encode("a").is_unknown());
        assert!(!registry.encode("c").is_unknown());
    }
}
