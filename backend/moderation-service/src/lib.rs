pub mod config;
pub mod error;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::Config;
pub use error::{ModerationError, Result};
pub use models::{
    Action, AgentState, AgentStatistics, Content, ContentType, FeedbackType, Metadata,
    ModerationOutcome, PretrainExample, StateKey,
};
pub use services::{FileStateStore, MemoryStateStore, ModerationAgent, RuleSet, StateStore};
