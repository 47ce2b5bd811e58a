use super::text::TextModerator;
use super::RuleEngine;
use crate::error::Result;
use crate::models::{Content, ContentType, Metadata, RuleOutcome};
use async_trait::async_trait;
use std::sync::Arc;

/// Audio moderator; transcripts are scored by the text engine
#[derive(Clone)]
pub struct AudioModerator {
    text: Arc<TextModerator>,
}

impl AudioModerator {
    pub fn new(text: Arc<TextModerator>) -> Self {
        Self { text }
    }

    pub fn check(&self, metadata: &Metadata) -> RuleOutcome {
        let mut score: f64 = 0.0;
        let mut reasons = Vec::new();

        if let Some(duration) = metadata.get_f64("duration") {
            if duration > 600.0 {
                score += 0.2;
                reasons.push(format!("Long audio: {}s", duration));
            }
        }

        if let Some(transcription) = transcription_of(metadata) {
            let text_result = self.text.check(&transcription);
            score = score.max(text_result.score);
            reasons.extend(text_result.reasons);
        }

        RuleOutcome::new(score, 0.65, reasons, "Audio appears clean")
    }
}

/// `mcp_metadata.transcription`, falling back to a top-level `transcription`.
fn transcription_of(metadata: &Metadata) -> Option<String> {
    metadata
        .nested("mcp_metadata")
        .and_then(|mcp| mcp.get_str("transcription").map(str::to_string))
        .or_else(|| metadata.get_str("transcription").map(str::to_string))
}

#[async_trait]
impl RuleEngine for AudioModerator {
    fn content_type(&self) -> ContentType {
        ContentType::Audio
    }

    async fn evaluate(&self, _content: &Content, metadata: &Metadata) -> Result<RuleOutcome> {
        Ok(self.check(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn moderator() -> AudioModerator {
        AudioModerator::new(Arc::new(TextModerator::new()))
    }

    #[test]
    fn test_clean_audio() {
        let result = moderator().check(&Metadata::from_value(json!({"duration": 30})));
        assert_eq!(result.score, 0.0);
        assert_eq!(result.confidence, 0.65);
        assert_eq!(result.reasons, vec!["Audio appears clean".to_string()]);
    }

    #[test]
    fn test_long_audio() {
        let result = moderator().check(&Metadata::from_value(json!({"duration": 900})));
        assert!((result.score - 0.2).abs() < 1e-9);
        assert_eq!(result.reasons, vec!["Long audio: 900s".to_string()]);
    }

    #[test]
    fn test_transcription_takes_max_score() {
        let metadata = Metadata::from_value(json!({
            "duration": 900,
            "mcp_metadata": {"transcription": "I will murder you"}
        }));
        let result = moderator().check(&metadata);

        assert_eq!(result.score, 1.0);
        assert_eq!(result.reasons[0], "Long audio: 900s");
        assert!(result.reasons[1].contains("murder"));
    }

    #[test]
    fn test_clean_transcription_keeps_text_reason() {
        let metadata = Metadata::from_value(json!({"transcription": "hello there"}));
        let result = moderator().check(&metadata);
        assert_eq!(result.reasons, vec!["Clean content".to_string()]);
    }
}
