mod accumulator;
mod config;
pub mod conversation;
pub mod error;
pub mod usage;

pub use accumulator::AccumulatedMessage;
pub use config::{Config, Tool, ToolConfig, ToolsConfig};
pub use conversation::ChatSession;
pub use error::ChatError;
pub use usage::UsageTracker;
