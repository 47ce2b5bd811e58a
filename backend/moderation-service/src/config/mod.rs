use crate::error::{ModerationError, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Persistence
    #[serde(default = "default_state_path")]
    pub state_path: String,
    /// When set, `state_path` is resolved under this directory and may not escape it.
    #[serde(default)]
    pub state_dir: Option<String>,

    // Learning parameters
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_discount_factor")]
    pub discount_factor: f64,

    // Decision surface
    #[serde(default = "default_flag_threshold")]
    pub flag_threshold: f64,
    #[serde(default)]
    pub action_gates_flag: bool,

    // Memory bounds
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default = "default_feedback_window")]
    pub feedback_window: usize,
    #[serde(default = "default_max_replay")]
    pub max_replay: usize,
    #[serde(default = "default_max_q_table_size")]
    pub max_q_table_size: usize,
    #[serde(default = "default_max_registered_contents")]
    pub max_registered_contents: usize,
    #[serde(default = "default_recent_rewards_kept")]
    pub recent_rewards_kept: usize,

    // Background training / persistence
    #[serde(default = "default_replay_batch_size")]
    pub replay_batch_size: usize,
    #[serde(default = "default_replay_probability")]
    pub replay_probability: f64,
    #[serde(default = "default_save_probability")]
    pub save_probability: f64,

    /// Seeds the policy RNG; unset means entropy.
    #[serde(default)]
    pub rng_seed: Option<u64>,

    // Optional data files
    #[serde(default)]
    pub sensitive_words_path: Option<String>,
    #[serde(default)]
    pub pretrain_examples_path: Option<String>,

    // Service configuration
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_state_path() -> String {
    "data/agent_state.json".to_string()
}
fn default_epsilon() -> f64 {
    0.1
}
fn default_learning_rate() -> f64 {
    0.01
}
fn default_discount_factor() -> f64 {
    0.99
}
fn default_flag_threshold() -> f64 {
    0.4
}
fn default_max_history() -> usize {
    1000
}
fn default_feedback_window() -> usize {
    200
}
fn default_max_replay() -> usize {
    10_000
}
fn default_max_q_table_size() -> usize {
    10_000
}
fn default_max_registered_contents() -> usize {
    10_000
}
fn default_recent_rewards_kept() -> usize {
    100
}
fn default_replay_batch_size() -> usize {
    32
}
fn default_replay_probability() -> f64 {
    0.3
}
fn default_save_probability() -> f64 {
    0.1
}
fn default_service_name() -> String {
    "moderation-service".to_string()
}
fn default_environment() -> String {
    "development".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            state_dir: None,
            epsilon: default_epsilon(),
            learning_rate: default_learning_rate(),
            discount_factor: default_discount_factor(),
            flag_threshold: default_flag_threshold(),
            action_gates_flag: false,
            max_history: default_max_history(),
            feedback_window: default_feedback_window(),
            max_replay: default_max_replay(),
            max_q_table_size: default_max_q_table_size(),
            max_registered_contents: default_max_registered_contents(),
            recent_rewards_kept: default_recent_rewards_kept(),
            replay_batch_size: default_replay_batch_size(),
            replay_probability: default_replay_probability(),
            save_probability: default_save_probability(),
            rng_seed: None,
            sensitive_words_path: None,
            pretrain_examples_path: None,
            service_name: default_service_name(),
            environment: default_environment(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config: Config = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let probabilities = [
            ("EPSILON", self.epsilon),
            ("DISCOUNT_FACTOR", self.discount_factor),
            ("FLAG_THRESHOLD", self.flag_threshold),
            ("REPLAY_PROBABILITY", self.replay_probability),
            ("SAVE_PROBABILITY", self.save_probability),
        ];
        for (name, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(ModerationError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(ModerationError::Config(format!(
                "LEARNING_RATE must be within (0, 1], got {}",
                self.learning_rate
            )));
        }

        let capacities = [
            ("MAX_HISTORY", self.max_history),
            ("FEEDBACK_WINDOW", self.feedback_window),
            ("MAX_REPLAY", self.max_replay),
            ("MAX_Q_TABLE_SIZE", self.max_q_table_size),
            ("MAX_REGISTERED_CONTENTS", self.max_registered_contents),
            ("RECENT_REWARDS_KEPT", self.recent_rewards_kept),
            ("REPLAY_BATCH_SIZE", self.replay_batch_size),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(ModerationError::Config(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if self.state_path.trim().is_empty() {
            return Err(ModerationError::Config("STATE_PATH is required".to_string()));
        }

        Ok(())
    }
}
