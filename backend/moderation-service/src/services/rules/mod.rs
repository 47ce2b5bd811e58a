pub mod audio;
pub mod code;
pub mod image;
pub mod lexicon;
pub mod text;
pub mod video;
pub mod weighting;

pub use audio::AudioModerator;
pub use code::CodeModerator;
pub use image::ImageModerator;
pub use lexicon::{FlaggedTerms, LexiconMatch, Severity};
pub use text::TextModerator;
pub use video::VideoModerator;
pub use weighting::apply_mcp_weighting;

use crate::error::{ModerationError, Result};
use crate::models::{Content, ContentType, Metadata, RuleOutcome};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// A side-effect-free scorer for one content type.
#[async_trait]
pub trait RuleEngine: Send + Sync {
    fn content_type(&self) -> ContentType;

    async fn evaluate(&self, content: &Content, metadata: &Metadata) -> Result<RuleOutcome>;
}

/// Content-type dispatch over the registered engines
#[derive(Clone)]
pub struct RuleSet {
    engines: HashMap<ContentType, Arc<dyn RuleEngine>>,
}

impl RuleSet {
    /// All five built-in engines; audio and video share `text` for
    /// transcripts and summaries.
    pub fn new(text: Arc<TextModerator>) -> Self {
        let mut set = Self::empty();
        set.register(text.clone());
        set.register(Arc::new(ImageModerator::new()));
        set.register(Arc::new(AudioModerator::new(text.clone())));
        set.register(Arc::new(VideoModerator::new(text)));
        set.register(Arc::new(CodeModerator::new()));
        set
    }

    pub fn empty() -> Self {
        Self {
            engines: HashMap::new(),
        }
    }

    /// Replaces any engine already registered for the same content type.
    pub fn register(&mut self, engine: Arc<dyn RuleEngine>) {
        self.engines.insert(engine.content_type(), engine);
    }

    pub fn supports(&self, content_type: ContentType) -> bool {
        self.engines.contains_key(&content_type)
    }

    pub async fn evaluate(
        &self,
        content_type: ContentType,
        content: &Content,
        metadata: &Metadata,
    ) -> Result<RuleOutcome> {
        let engine = self.engines.get(&content_type).ok_or_else(|| {
            ModerationError::UnsupportedContentType(content_type.as_str().to_string())
        })?;
        engine.evaluate(content, metadata).await
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new(Arc::new(TextModerator::new()))
    }
}

const DANGEROUS_EXTENSIONS: &[&str] = &[".exe", ".bat", ".cmd", ".scr", ".pif", ".com"];

/// Upload filename checks shared by the media engines.
/// Returns the added penalty and pushes one reason per finding.
pub(crate) fn filename_penalty(metadata: &Metadata, kind: &str, reasons: &mut Vec<String>) -> f64 {
    let Some(filename) = metadata.get_str("filename") else {
        return 0.0;
    };
    let filename = filename.to_lowercase();
    let mut penalty = 0.0;

    if DANGEROUS_EXTENSIONS.iter().any(|ext| filename.ends_with(ext)) {
        penalty += 1.0;
        reasons.push(format!(
            "Dangerous file extension disguised as {} - potential malware",
            kind
        ));
    }

    if filename.matches('.').count() > 1 {
        penalty += 0.7;
        reasons.push(
            "Multiple file extensions detected - potential security bypass attempt".to_string(),
        );
    }

    penalty
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct AlwaysFails;

    #[async_trait]
    impl RuleEngine for AlwaysFails {
        fn content_type(&self) -> ContentType {
            ContentType::Text
        }

        async fn evaluate(&self, _: &Content, _: &Metadata) -> Result<RuleOutcome> {
            Err(ModerationError::Internal("engine exploded".into()))
        }
    }

    #[tokio::test]
    async fn test_default_set_supports_all_types() {
        let rules = RuleSet::default();
        for content_type in ContentType::ALL {
            assert!(rules.supports(content_type));
        }
    }

    #[tokio::test]
    async fn test_missing_engine_is_validation_error() {
        let rules = RuleSet::empty();
        let err = rules
            .evaluate(ContentType::Image, &Content::from("x"), &Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::UnsupportedContentType(_)));
    }

    #[tokio::test]
    async fn test_engine_errors_propagate() {
        let mut rules = RuleSet::default();
        rules.register(Arc::new(AlwaysFails));
        let err = rules
            .evaluate(ContentType::Text, &Content::from("hi"), &Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::Internal(_)));
    }

    #[test]
    fn test_filename_penalty() {
        let mut reasons = Vec::new();
        let metadata = Metadata::from_value(json!({"filename": "Photo.JPG.exe"}));
        let penalty = filename_penalty(&metadata, "image", &mut reasons);
        assert!((penalty - 1.7).abs() < 1e-9);
        assert_eq!(reasons.len(), 2);

        let mut reasons = Vec::new();
        let metadata = Metadata::from_value(json!({"filename": "holiday.png"}));
        assert_eq!(filename_penalty(&metadata, "image", &mut reasons), 0.0);
        assert!(reasons.is_empty());
    }
}
