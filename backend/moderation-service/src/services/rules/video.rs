use super::text::TextModerator;
use super::{filename_penalty, RuleEngine};
use crate::error::Result;
use crate::models::{Content, ContentType, Metadata, RuleOutcome};
use async_trait::async_trait;
use std::sync::Arc;

/// Weight applied to the text engine's score for summaries and transcripts.
const SUMMARY_WEIGHT: f64 = 0.9;

/// Video moderator over upload properties and per-signal analysis scores
#[derive(Clone)]
pub struct VideoModerator {
    text: Arc<TextModerator>,
}

impl VideoModerator {
    pub fn new(text: Arc<TextModerator>) -> Self {
        Self { text }
    }

    pub fn check(&self, content: &Content, metadata: &Metadata) -> RuleOutcome {
        let mut score: f64 = 0.0;
        let mut reasons = Vec::new();

        let size_mb = content.size_mb();
        if size_mb > 1024.0 {
            score += 0.4;
            reasons.push(format!("Extremely large video: {:.2}MB", size_mb));
        } else if size_mb > 500.0 {
            score += 0.2;
            reasons.push(format!("Very large video: {:.2}MB", size_mb));
        }

        if let Some(duration) = metadata.get_f64("duration") {
            if duration > 3600.0 {
                score += 0.3;
                reasons.push(format!("Very long video: {}s", duration));
            } else if duration > 1800.0 {
                score += 0.1;
                reasons.push(format!("Long video: {}s", duration));
            }
        }

        score += filename_penalty(metadata, "video", &mut reasons);

        let analysis = metadata.nested("mcp_metadata");
        if let Some(mcp) = &analysis {
            let summary = mcp
                .get_str("summary")
                .or_else(|| mcp.get_str("transcript"));
            if let Some(summary) = summary {
                let text_result = self.text.check(summary);
                score = score.max(text_result.score * SUMMARY_WEIGHT);
                reasons.extend(
                    text_result
                        .reasons
                        .into_iter()
                        .map(|reason| format!("Summary: {}", reason)),
                );
            }

            score += signal_penalty(mcp, &mut reasons);
        }

        let confidence = if analysis.is_some() { 0.75 } else { 0.6 };
        tracing::debug!(score, confidence, size_mb, "Video rules evaluated");
        RuleOutcome::new(score, confidence, reasons, "Video appears clean")
    }
}

/// Frame, scene, audio-track and motion signals, each with its own threshold.
fn signal_penalty(mcp: &Metadata, reasons: &mut Vec<String>) -> f64 {
    let mut penalty = 0.0;

    if let Some(frames) = mcp.get_f64_list("frame_scores").filter(|f| !f.is_empty()) {
        let max = frames.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = mean(&frames);
        if max > 0.9 {
            penalty += 0.5;
            reasons.push(format!("Severe content in at least one frame (max {:.2})", max));
        } else if avg > 0.7 {
            penalty += 0.4;
            reasons.push("Flagged content in frames".to_string());
        }
    }

    if let Some(scenes) = mcp.get_f64_list("scene_scores").filter(|s| !s.is_empty()) {
        let avg = mean(&scenes);
        if avg > 0.6 {
            penalty += 0.3;
            reasons.push(format!("Flagged scenes (average {:.2})", avg));
        }
    }

    if let Some(audio) = mcp.get_f64("audio_score") {
        if audio > 0.7 {
            penalty += 0.3;
            reasons.push(format!("Flagged audio track ({:.2})", audio));
        }
    }

    if let Some(motion) = mcp.get_f64("motion_score") {
        if !(0.02..=0.98).contains(&motion) {
            penalty += 0.1;
            reasons.push(format!("Unusual motion profile ({:.2})", motion));
        }
    }

    penalty
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[async_trait]
impl RuleEngine for VideoModerator {
    fn content_type(&self) -> ContentType {
        ContentType::Video
    }

    async fn evaluate(&self, content: &Content, metadata: &Metadata) -> Result<RuleOutcome> {
        Ok(self.check(content, metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn moderator() -> VideoModerator {
        VideoModerator::new(Arc::new(TextModerator::new()))
    }

    fn clip() -> Content {
        Content::from(vec![0u8; 1024])
    }

    #[test]
    fn test_clean_video() {
        let result = moderator().check(&clip(), &Metadata::from_value(json!({"duration": 60})));
        assert_eq!(result.score, 0.0);
        assert_eq!(result.confidence, 0.6);
        assert_eq!(result.reasons, vec!["Video appears clean".to_string()]);
    }

    #[test]
    fn test_summary_is_weighted() {
        let metadata = Metadata::from_value(json!({
            "mcp_metadata": {"summary": "a man tries to murder his neighbour"}
        }));
        let result = moderator().check(&clip(), &metadata);

        assert!((result.score - 0.9).abs() < 1e-9);
        assert_eq!(result.confidence, 0.75);
        assert!(result.reasons[0].starts_with("Summary: Contains 1 flagged words"));
    }

    #[test]
    fn test_frame_max_and_average() {
        let spike = Metadata::from_value(json!({"mcp_metadata": {"frame_scores": [0.1, 0.95]}}));
        assert!((moderator().check(&clip(), &spike).score - 0.5).abs() < 1e-9);

        let steady = Metadata::from_value(json!({"mcp_metadata": {"frame_scores": [0.8, 0.75]}}));
        let result = moderator().check(&clip(), &steady);
        assert!((result.score - 0.4).abs() < 1e-9);
        assert_eq!(result.reasons, vec!["Flagged content in frames".to_string()]);
    }

    #[test]
    fn test_scene_audio_and_motion_signals() {
        let metadata = Metadata::from_value(json!({
            "duration": 4000,
            "mcp_metadata": {
                "scene_scores": [0.7, 0.9],
                "audio_score": 0.8,
                "motion_score": 0.01
            }
        }));
        let result = moderator().check(&clip(), &metadata);
        // duration 0.3 + scenes 0.3 + audio 0.3 + motion 0.1
        assert_eq!(result.score, 1.0);
        assert_eq!(result.reasons.len(), 4);
    }

    #[test]
    fn test_empty_frame_list_is_ignored() {
        let metadata = Metadata::from_value(json!({"mcp_metadata": {"frame_scores": []}}));
        assert_eq!(moderator().check(&clip(), &metadata).score, 0.0);
    }
}
