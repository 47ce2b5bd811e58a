use super::{Action, ContentType};
use crate::error::ModerationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Q-values are kept within this magnitude.
pub const Q_VALUE_BOUND: f64 = 100.0;
/// Rewards are clamped to this magnitude before any update.
pub const REWARD_BOUND: f64 = 2.0;

/// Discrete state used to index the policy table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateKey(String);

impl StateKey {
    pub const UNKNOWN: &'static str = "unknown_0_0_0";

    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key returned for content that was never registered.
    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-state action values, serialized as `{"0": .., "1": .., "2": ..}`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyEntry {
    #[serde(rename = "0", default)]
    pub approve: f64,
    #[serde(rename = "1", default)]
    pub flag: f64,
    #[serde(rename = "2", default)]
    pub review: f64,
}

impl PolicyEntry {
    pub fn from_values(values: [f64; 3]) -> Self {
        Self {
            approve: values[0],
            flag: values[1],
            review: values[2],
        }
    }

    pub fn values(&self) -> [f64; 3] {
        [self.approve, self.flag, self.review]
    }

    pub fn get(&self, action: Action) -> f64 {
        self.values()[action.index()]
    }

    pub fn set(&mut self, action: Action, value: f64) {
        match action {
            Action::Approve => self.approve = value,
            Action::Flag => self.flag = value,
            Action::Review => self.review = value,
        }
    }

    pub fn max_value(&self) -> f64 {
        self.values().into_iter().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Highest-valued action; ties go to the lowest action index.
    pub fn best_action(&self) -> Action {
        let values = self.values();
        let mut best = 0;
        for (idx, value) in values.iter().enumerate().skip(1) {
            if *value > values[best] {
                best = idx;
            }
        }
        Action::ALL[best]
    }

    /// True when every value lies within `tolerance` of zero.
    pub fn is_uninformative(&self, tolerance: f64) -> bool {
        self.values().iter().all(|v| v.abs() <= tolerance)
    }

    /// Clamp every value into `[-Q_VALUE_BOUND, Q_VALUE_BOUND]`; NaN becomes 0.
    pub fn clamped(self) -> Self {
        let clamp = |v: f64| {
            if v.is_nan() {
                0.0
            } else {
                v.clamp(-Q_VALUE_BOUND, Q_VALUE_BOUND)
            }
        };
        Self {
            approve: clamp(self.approve),
            flag: clamp(self.flag),
            review: clamp(self.review),
        }
    }
}

/// One record per `moderate()` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub content_id: String,
    pub state_key: StateKey,
    pub action: Action,
    pub score: f64,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Replayable (state, action, reward, next state) tuple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub state_key: StateKey,
    pub action: Action,
    pub reward: f64,
    pub next_state_key: StateKey,
}

/// Persisted agent snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    #[serde(default)]
    pub q_table: BTreeMap<StateKey, PolicyEntry>,
    pub epsilon: f64,
    #[serde(default)]
    pub recent_rewards: Vec<f64>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl AgentState {
    pub fn empty(epsilon: f64) -> Self {
        Self {
            q_table: BTreeMap::new(),
            epsilon,
            recent_rewards: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

/// User feedback kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    ThumbsUp,
    ThumbsDown,
}

impl FeedbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackType::ThumbsUp => "thumbs_up",
            FeedbackType::ThumbsDown => "thumbs_down",
        }
    }
}

impl FromStr for FeedbackType {
    type Err = ModerationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "thumbs_up" => Ok(FeedbackType::ThumbsUp),
            "thumbs_down" => Ok(FeedbackType::ThumbsDown),
            other => Err(ModerationError::InvalidFeedback(format!(
                "feedback_type must be 'thumbs_up' or 'thumbs_down', got '{}'",
                other
            ))),
        }
    }
}

/// Labelled example used to seed the policy table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PretrainExample {
    pub content_type: ContentType,
    pub score: f64,
    pub reward: f64,
    #[serde(default)]
    pub length: Option<usize>,
    #[serde(default)]
    pub toxicity_score: Option<f64>,
    #[serde(default)]
    pub authenticity_score: Option<f64>,
    #[serde(default)]
    pub action: Option<Action>,
}

/// Agent statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatistics {
    pub total_moderations: u64,
    pub history_size: usize,
    pub q_table_size: usize,
    pub epsilon: f64,
    pub learning_rate: f64,
    pub discount_factor: f64,
    pub replay_buffer_size: usize,
    pub registered_contents: usize,
    pub avg_recent_reward: f64,
}
