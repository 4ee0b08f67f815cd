pub mod cli;
pub mod core;
pub mod eventsource;
pub mod providers;

pub use crate::core::{AccumulatedMessage, ChatError, ChatSession, Config, Tool};
pub use providers::{ChatBackend, FunctionClient, Message};
