use super::{filename_penalty, RuleEngine};
use crate::error::Result;
use crate::models::{Content, ContentType, Metadata, RuleOutcome};
use async_trait::async_trait;

/// Image moderator over upload properties and upstream classifier scores.
///
/// Pixel data is never decoded; risk comes from file size, filename,
/// declared dimensions and the optional `mcp_metadata` object carrying
/// `nsfw_score`, `violence_score`, `hate_score`, `spam_score` and
/// `quality_score`.
#[derive(Debug, Default, Clone)]
pub struct ImageModerator;

impl ImageModerator {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, content: &Content, metadata: &Metadata) -> RuleOutcome {
        let mut score = 0.0;
        let mut reasons = Vec::new();
        let mut approvals = Vec::new();

        let size_mb = content.size_mb();
        if size_mb > 100.0 {
            score += 0.8;
            reasons.push(format!(
                "Extremely large file size ({:.2}MB) - potential abuse or bandwidth waste",
                size_mb
            ));
        } else if size_mb > 50.0 {
            score += 0.5;
            reasons.push(format!(
                "Very large file size ({:.2}MB) - may cause performance issues",
                size_mb
            ));
        } else if size_mb > 20.0 {
            score += 0.2;
            reasons.push(format!(
                "Large file size ({:.2}MB) - consider optimization",
                size_mb
            ));
        } else {
            approvals.push(format!("Appropriate file size ({:.2}MB)", size_mb));
        }

        score += filename_penalty(metadata, "image", &mut reasons);
        score += self.dimension_penalty(metadata, &mut reasons);

        let classifier = metadata.nested("mcp_metadata");
        if let Some(mcp) = &classifier {
            score += self.classifier_penalty(mcp, &mut reasons, &mut approvals);
        }

        let reasons = if score == 0.0 { approvals } else { reasons };
        let confidence = if classifier.is_some() {
            0.85
        } else if size_mb > 0.0 {
            0.75
        } else {
            0.6
        };

        tracing::debug!(score, confidence, size_mb, "Image rules evaluated");
        RuleOutcome::new(
            score,
            confidence,
            reasons,
            "Image appears clean and appropriate",
        )
    }

    fn dimension_penalty(&self, metadata: &Metadata, reasons: &mut Vec<String>) -> f64 {
        let (Some(width), Some(height)) = (metadata.get_f64("width"), metadata.get_f64("height"))
        else {
            return 0.0;
        };
        let mut penalty = 0.0;

        if width > 10000.0 || height > 10000.0 {
            penalty += 0.6;
            reasons.push(format!(
                "Unusually large image dimensions ({}x{}) - potential abuse",
                width, height
            ));
        }

        if width < 10.0 || height < 10.0 {
            penalty += 0.4;
            reasons.push(format!(
                "Suspiciously small image dimensions ({}x{}) - may be corrupted or malicious",
                width, height
            ));
        }

        if width > 0.0 && height > 0.0 {
            let aspect_ratio = width.max(height) / width.min(height);
            if aspect_ratio > 50.0 {
                penalty += 0.3;
                reasons.push(format!(
                    "Extreme aspect ratio ({:.1}:1) - unusual image format",
                    aspect_ratio
                ));
            }
        }

        penalty
    }

    fn classifier_penalty(
        &self,
        mcp: &Metadata,
        reasons: &mut Vec<String>,
        approvals: &mut Vec<String>,
    ) -> f64 {
        let mut penalty = 0.0;

        if let Some(nsfw) = mcp.get_f64("nsfw_score") {
            if nsfw > 0.9 {
                penalty += 0.9;
                reasons.push(format!(
                    "High NSFW content detected (confidence: {:.2}) - explicit material",
                    nsfw
                ));
            } else if nsfw > 0.7 {
                penalty += 0.6;
                reasons.push(format!(
                    "Moderate NSFW content detected (confidence: {:.2}) - adult content",
                    nsfw
                ));
            } else if nsfw > 0.5 {
                penalty += 0.3;
                reasons.push(format!(
                    "Low NSFW content detected (confidence: {:.2}) - borderline content",
                    nsfw
                ));
            } else {
                approvals.push("No NSFW content detected".to_string());
            }
        }

        if let Some(violence) = mcp.get_f64("violence_score") {
            if violence > 0.8 {
                penalty += 0.8;
                reasons.push(format!(
                    "High violence content detected (confidence: {:.2}) - graphic violence",
                    violence
                ));
            } else if violence > 0.5 {
                penalty += 0.5;
                reasons.push(format!(
                    "Moderate violence content detected (confidence: {:.2}) - violent themes",
                    violence
                ));
            } else {
                approvals.push("No violence detected".to_string());
            }
        }

        if let Some(hate) = mcp.get_f64("hate_score") {
            if hate > 0.7 {
                penalty += 0.7;
                reasons.push(format!(
                    "Hate speech detected (confidence: {:.2}) - discriminatory content",
                    hate
                ));
            } else if hate > 0.4 {
                penalty += 0.4;
                reasons.push(format!(
                    "Potentially hateful content detected (confidence: {:.2})",
                    hate
                ));
            }
        }

        if let Some(spam) = mcp.get_f64("spam_score") {
            if spam > 0.8 {
                penalty += 0.6;
                reasons.push(format!(
                    "High spam content detected (confidence: {:.2}) - promotional material",
                    spam
                ));
            } else if spam > 0.5 {
                penalty += 0.3;
                reasons.push(format!(
                    "Moderate spam content detected (confidence: {:.2})",
                    spam
                ));
            }
        }

        if let Some(quality) = mcp.get_f64("quality_score") {
            if quality < 0.2 {
                penalty += 0.2;
                reasons.push(format!(
                    "Very low quality image (score: {:.2}) - potentially corrupted",
                    quality
                ));
            } else if quality > 0.8 {
                approvals.push("High quality image content".to_string());
            }
        }

        penalty
    }
}

#[async_trait]
impl RuleEngine for ImageModerator {
    fn content_type(&self) -> ContentType {
        ContentType::Image
    }

    async fn evaluate(&self, content: &Content, metadata: &Metadata) -> Result<RuleOutcome> {
        Ok(self.check(content, metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn small_image() -> Content {
        Content::from(vec![0u8; 2048])
    }

    #[test]
    fn test_clean_image_lists_approvals() {
        let metadata = Metadata::from_value(json!({
            "filename": "cat.png",
            "width": 800,
            "height": 600,
            "mcp_metadata": {"nsfw_score": 0.1, "violence_score": 0.0, "quality_score": 0.95}
        }));
        let result = ImageModerator::new().check(&small_image(), &metadata);

        assert_eq!(result.score, 0.0);
        assert_eq!(result.confidence, 0.85);
        assert!(result.reasons[0].starts_with("Appropriate file size"));
        assert!(result.reasons.contains(&"No NSFW content detected".to_string()));
        assert!(result.reasons.contains(&"High quality image content".to_string()));
    }

    #[test]
    fn test_nsfw_and_violence_bands() {
        let metadata = Metadata::from_value(json!({
            "mcp_metadata": {"nsfw_score": 0.95, "violence_score": 0.6}
        }));
        let result = ImageModerator::new().check(&small_image(), &metadata);

        assert_eq!(result.score, 1.0);
        assert_eq!(result.reasons.len(), 2);
        assert!(result.reasons[0].starts_with("High NSFW content detected (confidence: 0.95)"));
        assert!(result.reasons[1].starts_with("Moderate violence content detected"));
    }

    #[test]
    fn test_dimension_checks() {
        let metadata = Metadata::from_value(json!({"width": 6000, "height": 5}));
        let result = ImageModerator::new().check(&small_image(), &metadata);

        // small dimension (0.4) + aspect ratio 1200:1 (0.3)
        assert!((result.score - 0.7).abs() < 1e-9);
        assert!(result.reasons[0].starts_with("Suspiciously small image dimensions (6000x5)"));
        assert!(result.reasons[1].starts_with("Extreme aspect ratio (1200.0:1)"));
    }

    #[test]
    fn test_malformed_classifier_fields_are_ignored() {
        let metadata = Metadata::from_value(json!({
            "width": "wide",
            "mcp_metadata": {"nsfw_score": "very", "hate_score": null}
        }));
        let result = ImageModerator::new().check(&small_image(), &metadata);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.reasons.len(), 1);
    }

    #[test]
    fn test_empty_image_has_low_confidence() {
        let result = ImageModerator::new().check(&Content::from(Vec::new()), &Metadata::new());
        assert_eq!(result.confidence, 0.6);
        assert_eq!(result.reasons, vec!["Appropriate file size (0.00MB)".to_string()]);
    }
}
