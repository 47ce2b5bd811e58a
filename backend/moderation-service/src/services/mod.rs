pub mod agent;
pub mod encoder;
pub mod feedback;
pub mod governor;
pub mod learner;
pub mod policy;
pub mod rules;
pub mod state_store;

pub use agent::ModerationAgent;
pub use encoder::{bucket, encode_features, length_bucket, ContentFeatures, ContentRegistry};
pub use feedback::normalize_feedback;
pub use governor::TableGovernor;
pub use learner::{clamp_reward, QLearner, ReplayBuffer};
pub use policy::{DecisionPolicy, QTable};
pub use rules::{RuleEngine, RuleSet, TextModerator};
pub use state_store::{FileStateStore, MemoryStateStore, StateStore};
