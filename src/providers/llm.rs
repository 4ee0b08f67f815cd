use crate::core::ChatError;
use crate::providers::Message;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Ordered text fragments of one streamed reply.
pub type BoxStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send + 'static>>;

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send the whole conversation and stream the reply back as text deltas.
    ///
    /// Failing to open the stream is reported here. Once the stream is
    /// returned, only transport failures surface as items.
    async fn query_streaming(&self, messages: &[Message]) -> Result<BoxStream, ChatError>;
}
