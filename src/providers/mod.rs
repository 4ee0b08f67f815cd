pub mod function;
pub mod llm;
pub mod types;

pub use function::FunctionClient;
pub use llm::{BoxStream, ChatBackend};
pub use types::messages::Message;
