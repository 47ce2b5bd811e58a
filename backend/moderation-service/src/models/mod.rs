pub mod content;
pub mod learning;
pub mod moderation;

pub use content::*;
pub use learning::*;
pub use moderation::*;
