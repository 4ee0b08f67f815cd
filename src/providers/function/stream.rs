use crate::core::ChatError;
use crate::eventsource::{EventSourceExt, Frame};
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use log::debug;
use std::time::Duration;

use super::types::DeltaPayload;

/// Turns SSE frames into the text deltas they carry.
///
/// Frames whose payload is not valid JSON, or that carry no text, are
/// skipped. Only errors coming from the frame stream itself end the output
/// early.
pub fn delta_stream<S>(frames: S) -> impl Stream<Item = Result<String, ChatError>> + Send + 'static
where
    S: Stream<Item = Result<Frame, ChatError>> + Send + 'static,
{
    try_stream! {
        let mut frames = Box::pin(frames);
        while let Some(frame) = frames.next().await {
            match frame? {
                Frame::Data(data) => match DeltaPayload::parse(&data) {
                    Ok(payload) => {
                        if let Some(content) = payload.into_content() {
                            yield content;
                        }
                    }
                    Err(e) => debug!("skipping malformed data frame: {e}"),
                },
                Frame::Done => break,
                _ => {}
            }
        }
    }
}

/// Full pipeline from a chunked response body to text deltas.
pub fn fragments<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, ChatError>> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ChatError> + Send + 'static,
{
    delta_stream(bytes.frames().map(|frame| frame.map_err(Into::<ChatError>::into)))
}

/// Ends the stream with [`ChatError::Timeout`] when no chunk arrives within
/// `idle` of the previous one.
pub fn with_idle_timeout<S, B, E>(
    stream: S,
    idle: Duration,
) -> impl Stream<Item = Result<B, ChatError>> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: Send + 'static,
    E: Into<ChatError> + Send + 'static,
{
    try_stream! {
        let mut stream = Box::pin(stream);
        loop {
            let next = tokio::time::timeout(idle, stream.next())
                .await
                .map_err(|_| ChatError::Timeout(idle))?;
            match next {
                Some(chunk) => {
                    let chunk = chunk.map_err(Into::<ChatError>::into)?;
                    yield chunk;
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn data(payload: &str) -> Result<Frame, ChatError> {
        Ok(Frame::Data(payload.to_string()))
    }

    #[tokio::test]
    async fn test_delta_stream_skips_bad_frames() {
        let frames = stream::iter(vec![
            data(r#"{"choices":[{"delta":{"content":"a"}}]}"#),
            data("{not json"),
            data(r#"{"choices":[{"delta":{}}]}"#),
            data(r#"{"choices":[{"delta":{"content":"b"}}]}"#),
        ]);
        let deltas: Vec<String> = delta_stream(frames)
            .map(|delta| delta.unwrap())
            .collect()
            .await;
        assert_eq!(deltas, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_delta_stream_stops_at_done() {
        let frames = stream::iter(vec![
            data(r#"{"choices":[{"delta":{"content":"a"}}]}"#),
            Ok(Frame::Done),
            data(r#"{"choices":[{"delta":{"content":"b"}}]}"#),
        ]);
        let deltas: Vec<String> = delta_stream(frames)
            .map(|delta| delta.unwrap())
            .collect()
            .await;
        assert_eq!(deltas, vec!["a"]);
    }

    #[tokio::test]
    async fn test_delta_stream_ends_on_error() {
        let frames = stream::iter(vec![
            data(r#"{"choices":[{"delta":{"content":"a"}}]}"#),
            Err(ChatError::StreamError("reset".to_string())),
            data(r#"{"choices":[{"delta":{"content":"b"}}]}"#),
        ]);
        let items: Vec<_> = delta_stream(frames).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "a");
        assert!(matches!(items[1], Err(ChatError::StreamError(_))));
    }

    #[tokio::test]
    async fn test_idle_timeout_fires_between_chunks() {
        let chunks = stream::iter(vec![Ok::<_, ChatError>("first")])
            .chain(stream::pending());
        let idle = Duration::from_millis(50);
        let items: Vec<_> = with_idle_timeout(chunks, idle).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(*items[0].as_ref().unwrap(), "first");
        assert!(matches!(items[1], Err(ChatError::Timeout(d)) if d == idle));
    }

    #[tokio::test]
    async fn test_idle_timeout_passes_through_finished_stream() {
        let chunks = stream::iter(vec![Ok::<_, ChatError>("a"), Ok("b")]);
        let items: Vec<_> = with_idle_timeout(chunks, Duration::from_secs(1))
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(items, vec!["a", "b"]);
    }
}
