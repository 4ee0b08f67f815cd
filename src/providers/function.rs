mod client;
pub mod stream;
pub mod types;

pub use client::FunctionClient;
pub use stream::{delta_stream, fragments, with_idle_timeout};
pub use types::{ChatRequest, DeltaPayload};
