use super::lexicon::FlaggedTerms;
use super::RuleEngine;
use crate::error::Result;
use crate::models::{Content, ContentType, Metadata, RuleOutcome};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+").expect("URL regex pattern is valid"));

static DANGEROUS_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(
                r"\b(?:kill|murder|rape|assault|hate|violent)\b.*\b(?:kill|murder|rape|assault|hate|violent)\b",
            )
            .expect("Violent co-occurrence regex pattern is valid"),
            "Multiple violent terms detected",
        ),
        (
            Regex::new(r"\b(?:spam|scam|fraud|fake)\b.*\b(?:spam|scam|fraud|fake)\b")
                .expect("Suspicious co-occurrence regex pattern is valid"),
            "Multiple suspicious terms detected",
        ),
        (
            Regex::new(r"\b(?:fuck|shit|cunt|motherfucker)\b")
                .expect("Profanity regex pattern is valid"),
            "Strong profanity detected",
        ),
    ]
});

/// Text moderator with flagged terms and pattern detection
pub struct TextModerator {
    terms: FlaggedTerms,
}

impl Default for TextModerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TextModerator {
    /// Create text moderator with the built-in lexicon
    pub fn new() -> Self {
        Self {
            terms: FlaggedTerms::builtin(),
        }
    }

    /// Built-in lexicon extended with a sensitive words file
    pub fn with_terms_file(words_file: impl AsRef<Path>) -> Result<Self> {
        let mut terms = FlaggedTerms::builtin();
        let extra = FlaggedTerms::load_file(words_file)?;
        tracing::info!(extra_terms = extra.len(), "Loaded additional flagged terms");
        terms.extend(extra);
        Ok(Self { terms })
    }

    pub fn terms(&self) -> &FlaggedTerms {
        &self.terms
    }

    /// Check text for violations
    pub fn check(&self, text: &str) -> RuleOutcome {
        let normalized = text.to_lowercase();
        let mut score = 0.0;
        let mut reasons = Vec::new();

        // Check 1: flagged terms
        let lexicon = self.terms.scan(text);
        if lexicon.flagged {
            score += lexicon.score;
            reasons.extend(lexicon.reason());
        }

        // Check 2: excessive capitalization
        if self.has_excessive_caps(text) {
            score += 0.2;
            reasons.push("Excessive capitalization".to_string());
        }

        // Check 3: URL spam
        let url_count = URL_PATTERN.find_iter(&normalized).count();
        if url_count > 1 {
            score += 0.4;
            reasons.push(format!(
                "Multiple URLs detected ({}) - potential spam or phishing",
                url_count
            ));
        }

        // Check 4: repetition
        if self.has_low_uniqueness(&normalized) {
            score += 0.3;
            reasons.push("High repetition detected - potential spam content".to_string());
        }

        // Check 5: dangerous co-occurrences
        for (pattern, reason) in DANGEROUS_PATTERNS.iter() {
            if pattern.is_match(&normalized) {
                tracing::debug!(pattern = %pattern.as_str(), "Dangerous text pattern matched");
                score += 0.3;
                reasons.push(reason.to_string());
            }
        }

        let confidence = if lexicon.flagged {
            0.95
        } else if !reasons.is_empty() {
            0.8
        } else {
            0.7
        };

        RuleOutcome::new(score, confidence, reasons, "Clean content")
    }

    /// More than half of all characters uppercase, for text longer than 10 chars
    fn has_excessive_caps(&self, text: &str) -> bool {
        let total = text.chars().count();
        if total <= 10 {
            return false;
        }

        let caps = text.chars().filter(|c| c.is_uppercase()).count();
        caps as f64 / total as f64 > 0.5
    }

    /// Fewer than 60% distinct words among at least four
    fn has_low_uniqueness(&self, normalized: &str) -> bool {
        let words: Vec<&str> = normalized.split_whitespace().collect();
        if words.len() <= 3 {
            return false;
        }

        let unique: HashSet<&str> = words.iter().copied().collect();
        (unique.len() as f64 / words.len() as f64) < 0.6
    }
}

#[async_trait]
impl RuleEngine for TextModerator {
    fn content_type(&self) -> ContentType {
        ContentType::Text
    }

    async fn evaluate(&self, content: &Content, _metadata: &Metadata) -> Result<RuleOutcome> {
        Ok(self.check(&content.as_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_check_clean_text() {
        let moderator = TextModerator::new();
        let result = moderator.check("This is a wonderful day!");
        assert!(result.score < 0.4);
        assert_eq!(result.reasons, vec!["Clean content".to_string()]);
        assert_eq!(result.confidence, 0.7);
    }

    #[test]
    fn test_check_toxic_text() {
        let moderator = TextModerator::new();
        let result = moderator.check("FUCK YOU KILL KILL SPAM SPAM");
        assert!(result.score >= 0.6);
        assert_eq!(result.confidence, 0.95);
        assert!(result.reasons.iter().any(|r| r.starts_with("Contains 3 flagged words")));
        assert!(result.reasons.contains(&"Excessive capitalization".to_string()));
        assert!(result.reasons.contains(&"Multiple violent terms detected".to_string()));
        assert!(result.reasons.contains(&"Strong profanity detected".to_string()));
    }

    #[test]
    fn test_multiple_urls() {
        let moderator = TextModerator::new();
        let result = moderator.check("see http://a.example and https://b.example");
        assert!((result.score - 0.4).abs() < 1e-9);
        assert_eq!(
            result.reasons,
            vec!["Multiple URLs detected (2) - potential spam or phishing".to_string()]
        );
    }

    #[test]
    fn test_repetition() {
        let moderator = TextModerator::new();
        let result = moderator.check("buy buy buy buy now");
        assert!(result
            .reasons
            .contains(&"High repetition detected - potential spam content".to_string()));
    }

    #[test]
    fn test_short_caps_not_penalized() {
        let moderator = TextModerator::new();
        let result = moderator.check("OK THANKS");
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_extra_terms_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "badword,critical").unwrap();
        let moderator = TextModerator::with_terms_file(file.path()).unwrap();

        let result = moderator.check("this has a badword in it");
        assert!(result.score >= 0.6);
        assert!(result.reasons[0].contains("badword"));
    }

    #[test]
    fn test_missing_terms_file() {
        assert!(TextModerator::with_terms_file("/nonexistent/words.txt").is_err());
    }

    #[tokio::test]
    async fn test_evaluate_reads_bytes() {
        let moderator = TextModerator::new();
        let content = Content::from(b"murder".to_vec());
        let result = moderator.evaluate(&content, &Metadata::new()).await.unwrap();
        assert_eq!(result.score, 1.0);
    }
}
