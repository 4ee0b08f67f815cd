use std::io::Write;

use crate::core::{AccumulatedMessage, ChatError};
use crate::providers::llm::{BoxStream, ChatBackend};
use crate::providers::Message;
use futures::StreamExt;
use log::debug;
use tokio_util::sync::CancellationToken;

/// A conversation with one chat function.
///
/// Each call to [`ChatSession::send`] posts the entire history, so a failed
/// exchange can be retried simply by sending again.
pub struct ChatSession {
    client: Box<dyn ChatBackend>,
    history: Vec<Message>,
}

impl ChatSession {
    pub fn new(client: Box<dyn ChatBackend>) -> Self {
        Self {
            client,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Sends `content` as the next user turn and streams the reply into `writer`.
    ///
    /// Every fragment is written and flushed as soon as it arrives. The user
    /// turn and whatever text was received are committed to the history as a
    /// pair, even when the stream fails or is cancelled part way, because the
    /// user has already seen that text. An exchange that produced no text
    /// leaves the history untouched, so sending again retries it cleanly.
    pub async fn send<W: Write + Send>(
        &mut self,
        content: impl Into<String>,
        writer: &mut W,
        cancel: &CancellationToken,
    ) -> Result<AccumulatedMessage, ChatError> {
        self.history.push(Message::user(content));
        debug!("[Conversation] sending {} messages", self.history.len());

        let mut message = AccumulatedMessage::new();
        let outcome = self.stream_reply(&mut message, writer, cancel).await;

        if message.is_empty() {
            self.history.pop();
        } else {
            self.history.push(Message::assistant(message.as_str()));
        }
        debug!(
            "[Conversation] received {} fragments, {} bytes",
            message.fragment_count(),
            message.len()
        );

        outcome.map(|()| message)
    }

    async fn stream_reply<W: Write + Send>(
        &self,
        message: &mut AccumulatedMessage,
        writer: &mut W,
        cancel: &CancellationToken,
    ) -> Result<(), ChatError> {
        let stream = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ChatError::Cancelled),
            stream = self.client.query_streaming(&self.history) => stream?,
        };

        Self::write_response(stream, message, writer, cancel).await
    }

    /// Drains the reply into `message` and `writer` until it ends, fails, or
    /// is cancelled. The stream is dropped on return, closing the connection.
    async fn write_response<W: Write + Send>(
        mut stream: BoxStream,
        message: &mut AccumulatedMessage,
        writer: &mut W,
        cancel: &CancellationToken,
    ) -> Result<(), ChatError> {
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ChatError::Cancelled),
                next = stream.next() => next,
            };

            let Some(fragment) = next else {
                return Ok(());
            };
            let fragment = fragment?;
            message.push(&fragment);
            writer.write_all(fragment.as_bytes())?;
            writer.flush()?;
        }
    }
}
