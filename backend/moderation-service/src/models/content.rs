use crate::error::ModerationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Content type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Image,
    Audio,
    Video,
    Code,
}

impl ContentType {
    pub const ALL: [ContentType; 5] = [
        ContentType::Text,
        ContentType::Image,
        ContentType::Audio,
        ContentType::Video,
        ContentType::Code,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Image => "image",
            ContentType::Audio => "audio",
            ContentType::Video => "video",
            ContentType::Code => "code",
        }
    }

    /// Ordinal used in state keys.
    pub fn index(&self) -> usize {
        match self {
            ContentType::Text => 0,
            ContentType::Image => 1,
            ContentType::Audio => 2,
            ContentType::Video => 3,
            ContentType::Code => 4,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = ModerationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(ContentType::Text),
            "image" => Ok(ContentType::Image),
            "audio" => Ok(ContentType::Audio),
            "video" => Ok(ContentType::Video),
            "code" => Ok(ContentType::Code),
            _ => Err(ModerationError::UnsupportedContentType(value.to_string())),
        }
    }
}

/// Raw content submitted for moderation
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(String),
    Bytes(Vec<u8>),
}

impl Content {
    /// Length in bytes
    pub fn len(&self) -> usize {
        match self {
            Content::Text(text) => text.len(),
            Content::Bytes(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Textual view; binary payloads are decoded lossily.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Content::Text(text) => Cow::Borrowed(text.as_str()),
            Content::Bytes(bytes) => String::from_utf8_lossy(bytes),
        }
    }

    pub fn size_mb(&self) -> f64 {
        self.len() as f64 / (1024.0 * 1024.0)
    }
}

impl From<&str> for Content {
    fn from(value: &str) -> Self {
        Content::Text(value.to_string())
    }
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Content::Text(value)
    }
}

impl From<Vec<u8>> for Content {
    fn from(value: Vec<u8>) -> Self {
        Content::Bytes(value)
    }
}

impl From<&[u8]> for Content {
    fn from(value: &[u8]) -> Self {
        Content::Bytes(value.to_vec())
    }
}

/// Caller-supplied metadata.
///
/// Every getter is lenient: a field that is missing, of the wrong JSON type,
/// or not a finite number reads as `None` so callers can substitute a default
/// instead of failing the whole request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from any JSON value. Non-object values yield empty metadata.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            Value::Null => Self::default(),
            other => {
                tracing::warn!(kind = %json_kind(&other), "Ignoring non-object metadata");
                Self::default()
            }
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0
            .get(key)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
    }

    /// Numeric field clamped into `[0, 1]`.
    pub fn get_unit(&self, key: &str) -> Option<f64> {
        self.get_f64(key).map(|v| v.clamp(0.0, 1.0))
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Numeric array; non-numeric elements are skipped.
    pub fn get_f64_list(&self, key: &str) -> Option<Vec<f64>> {
        self.0.get(key).and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(Value::as_f64)
                .filter(|v| v.is_finite())
                .collect()
        })
    }

    pub fn get_str_list(&self, key: &str) -> Vec<String> {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Nested object. Present-but-not-an-object reads as `None`.
    pub fn nested(&self, key: &str) -> Option<Metadata> {
        match self.0.get(key) {
            Some(Value::Object(map)) => Some(Metadata(map.clone())),
            _ => None,
        }
    }
}

impl From<Value> for Metadata {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Registered content features; immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub content_id: String,
    pub content_type: ContentType,
    pub length: usize,
    pub toxicity_score: f64,
    pub authenticity_score: f64,
    pub tags: BTreeSet<String>,
    pub registered_at: DateTime<Utc>,
}
