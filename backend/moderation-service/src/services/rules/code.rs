use super::RuleEngine;
use crate::error::Result;
use crate::models::{Content, ContentType, Metadata, RuleOutcome};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

static DANGEROUS_CONSTRUCTS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"eval\s*\(", "Use of eval()"),
        (r"exec\s*\(", "Use of exec()"),
        (r"__import__", "Dynamic imports"),
        (r"rm\s+-rf", "Destructive commands"),
        (r"drop\s+table", "SQL drop commands"),
        (r"delete\s+from", "SQL delete commands"),
        (r"system\s*\(", "System calls"),
        (r"subprocess", "Subprocess execution"),
    ]
    .into_iter()
    .map(|(pattern, reason)| {
        (
            Regex::new(pattern).expect("Dangerous construct regex pattern is valid"),
            reason,
        )
    })
    .collect()
});

static READABLE_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\w{3,}\b").expect("Readable word regex pattern is valid"));

/// Code moderator for malicious constructs and obfuscation
#[derive(Debug, Default, Clone)]
pub struct CodeModerator;

impl CodeModerator {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, source: &str) -> RuleOutcome {
        let code = source.to_lowercase();
        let mut score = 0.0;
        let mut reasons = Vec::new();

        for (pattern, reason) in DANGEROUS_CONSTRUCTS.iter() {
            if pattern.is_match(&code) {
                score += 0.3;
                reasons.push(reason.to_string());
            }
        }

        if code.len() > 100 {
            let tokens = code.split_whitespace().count();
            if tokens > 0 {
                let readable = READABLE_WORD.find_iter(&code).count();
                if (readable as f64 / tokens as f64) < 0.3 {
                    score += 0.2;
                    reasons.push("Highly obfuscated code".to_string());
                }
            }
        }

        RuleOutcome::new(score, 0.75, reasons, "Code appears safe")
    }
}

#[async_trait]
impl RuleEngine for CodeModerator {
    fn content_type(&self) -> ContentType {
        ContentType::Code
    }

    async fn evaluate(&self, content: &Content, _metadata: &Metadata) -> Result<RuleOutcome> {
        Ok(self.check(&content.as_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_and_exec() {
        let result = CodeModerator::new().check("eval(x); exec(y)");
        assert!((result.score - 0.6).abs() < 1e-9);
        assert_eq!(
            result.reasons,
            vec!["Use of eval()".to_string(), "Use of exec()".to_string()]
        );
    }

    #[test]
    fn test_safe_code() {
        let result = CodeModerator::new().check("fn add(a: i32, b: i32) -> i32 { a + b }");
        assert_eq!(result.score, 0.0);
        assert_eq!(result.confidence, 0.75);
        assert_eq!(result.reasons, vec!["Code appears safe".to_string()]);
    }

    #[test]
    fn test_case_insensitive_sql() {
        let result = CodeModerator::new().check("DROP TABLE users; DELETE FROM logs;");
        assert!(result.reasons.contains(&"SQL drop commands".to_string()));
        assert!(result.reasons.contains(&"SQL delete commands".to_string()));
    }

    #[test]
    fn test_obfuscation() {
        let obfuscated = "a b c d e f g h i j k l m n o p q r s t u v w x y z ".repeat(5);
        let result = CodeModerator::new().check(&obfuscated);
        assert_eq!(result.reasons, vec!["Highly obfuscated code".to_string()]);
        assert!((result.score - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_long_whitespace_free_code_is_not_obfuscated() {
        // a single token made of readable words
        let source = "x".repeat(50) + "." + &"y".repeat(60);
        let result = CodeModerator::new().check(&source);
        assert_eq!(result.score, 0.0);
    }
}
