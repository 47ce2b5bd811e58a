use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of a single content-type rule engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub score: f64,
    pub confidence: f64,
    pub reasons: Vec<String>,
}

impl RuleOutcome {
    /// Clamps score and confidence into `[0, 1]`; an empty reason list is
    /// replaced by `fallback`.
    pub fn new(score: f64, confidence: f64, reasons: Vec<String>, fallback: &str) -> Self {
        let reasons = if reasons.is_empty() {
            vec![fallback.to_string()]
        } else {
            reasons
        };

        Self {
            score: clamp_unit(score),
            confidence: clamp_unit(confidence),
            reasons,
        }
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Policy action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Approve,
    Flag,
    Review,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Approve, Action::Flag, Action::Review];

    pub fn index(&self) -> usize {
        match self {
            Action::Approve => 0,
            Action::Flag => 1,
            Action::Review => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Approve => "approve",
            Action::Flag => "flag",
            Action::Review => "review",
        }
    }

    /// Score-threshold fallback used when a state carries no learned values.
    pub fn from_score(score: f64) -> Self {
        if score > 0.6 {
            Action::Flag
        } else if score > 0.3 {
            Action::Review
        } else {
            Action::Approve
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Moderation decision returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationOutcome {
    pub content_id: String,
    pub flagged: bool,
    pub score: f64,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub action: Action,
    /// Present when cross-service confidence weighting was applied.
    pub mcp_weighted_score: Option<f64>,
    pub state_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_outcome_clamps_and_fills_reasons() {
        let outcome = RuleOutcome::new(1.7, -0.2, Vec::new(), "Clean content");
        assert_eq!(outcome.score, 1.0);
        assert_eq!(outcome.confidence, 0.0);
        assert_eq!(outcome.reasons, vec!["Clean content".to_string()]);

        let outcome = RuleOutcome::new(f64::NAN, 0.5, vec!["x".into()], "unused");
        assert_eq!(outcome.score, 0.0);
        assert_eq!(outcome.reasons, vec!["x".to_string()]);
    }

    #[test]
    fn test_action_from_score() {
        assert_eq!(Action::from_score(0.9), Action::Flag);
        assert_eq!(Action::from_score(0.6), Action::Review);
        assert_eq!(Action::from_score(0.31), Action::Review);
        assert_eq!(Action::from_score(0.3), Action::Approve);
    }

    #[test]
    fn test_action_index_round_trip() {
        for action in Action::ALL {
            assert_eq!(Action::from_index(action.index()), Some(action));
        }
        assert_eq!(Action::from_index(3), None);
        assert_eq!(serde_json::to_string(&Action::Review).unwrap(), "\"review\"");
    }
}
