use async_stream::try_stream;
use futures::{Stream, StreamExt};
use log::{debug, trace};
use std::fmt::{self, Display, Formatter};
use std::pin::Pin;

const LINE_DELIMITER: u8 = b'\n';
const CARRIAGE_RETURN: u8 = b'\r';
const COMMENT_PREFIX: char = ':';
const DATA_PREFIX: &str = "data: ";

/// Payload of the data frame that marks the logical end of a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// A single line of a Server-Sent Events feed, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Blank line
    KeepAlive,
    /// Line starting with `:`
    Comment(String),
    /// `data: ` line, payload trimmed
    Data(String),
    /// `data: [DONE]`
    Done,
    /// Any other line
    Unknown(String),
}

impl Display for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeepAlive => write!(f, "keep-alive"),
            Self::Comment(text) => write!(f, "comment {text:?}"),
            Self::Data(data) => write!(f, "data {data}"),
            Self::Done => write!(f, "done"),
            Self::Unknown(line) => write!(f, "unknown {line:?}"),
        }
    }
}

impl Frame {
    /// Classifies one line. The line must already have its terminator removed.
    pub fn parse(line: &str) -> Self {
        if line.is_empty() {
            return Self::KeepAlive;
        }
        if let Some(comment) = line.strip_prefix(COMMENT_PREFIX) {
            return Self::Comment(comment.to_string());
        }
        match line.strip_prefix(DATA_PREFIX) {
            Some(data) => {
                let data = data.trim();
                if data == DONE_SENTINEL {
                    Self::Done
                } else {
                    Self::Data(data.to_string())
                }
            }
            None => Self::Unknown(line.to_string()),
        }
    }

    /// Whether the frame carries anything a consumer should look at.
    pub const fn is_discarded(&self) -> bool {
        matches!(self, Self::KeepAlive | Self::Comment(_) | Self::Unknown(_))
    }
}

/// Splits an incoming byte stream into complete lines.
///
/// Bytes are held until a `\n` arrives, so a multi-byte UTF-8 sequence split
/// across two chunks is only decoded once both halves are present. A `\n`
/// byte never occurs inside a multi-byte sequence, which makes splitting at
/// the byte level safe.
///
/// Consumed lines are only skipped over; the buffer is compacted once per
/// [`LineDecoder::push`], and a partial line is never rescanned from its start.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    /// Start of the first unconsumed line.
    start: usize,
    /// Everything before this offset is known to hold no `\n`.
    scanned: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(1024),
            start: 0,
            scanned: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        if self.start > 0 {
            self.buffer.drain(..self.start);
            self.scanned -= self.start;
            self.start = 0;
        }
        self.buffer.extend_from_slice(chunk);
    }

    /// Returns the next complete line, without its `\n` or `\r\n`.
    pub fn next_line(&mut self) -> Option<String> {
        let from = self.scanned.max(self.start);
        let Some(offset) = self.buffer[from..].iter().position(|&b| b == LINE_DELIMITER) else {
            self.scanned = self.buffer.len();
            return None;
        };
        let end = from + offset;

        let mut line = &self.buffer[self.start..end];
        if line.last() == Some(&CARRIAGE_RETURN) {
            line = &line[..line.len() - 1];
        }
        let line = String::from_utf8_lossy(line).into_owned();

        self.start = end + 1;
        self.scanned = self.start;
        Some(line)
    }

    /// Bytes received that do not yet form a complete line.
    pub fn pending(&self) -> usize {
        self.buffer.len() - self.start
    }
}

pub type FrameStream<E> = Pin<Box<dyn Stream<Item = Result<Frame, E>> + Send>>;

/// Extension trait for turning a byte stream into a stream of SSE frames.
///
/// The returned stream only yields [`Frame::Data`] and [`Frame::Done`].
/// Blank lines, comments and unrecognized lines are dropped, and the stream
/// ends right after `Done`, releasing the underlying transport even if more
/// bytes were on the way. A trailing line without a terminator is discarded
/// when the transport closes.
pub trait EventSourceExt {
    type Error;

    fn frames(self) -> FrameStream<Self::Error>;
}

impl<S, B, E> EventSourceExt for S
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Send + 'static,
{
    type Error = E;

    fn frames(self) -> FrameStream<E> {
        Box::pin(try_stream! {
            let mut stream = Box::pin(self);
            let mut decoder = LineDecoder::new();

            'read: while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                decoder.push(chunk.as_ref());

                while let Some(line) = decoder.next_line() {
                    let frame = Frame::parse(&line);
                    if frame.is_discarded() {
                        trace!("skipping {frame}");
                        continue;
                    }
                    let done = frame == Frame::Done;
                    yield frame;
                    if done {
                        break 'read;
                    }
                }
            }

            if decoder.pending() > 0 {
                debug!("discarding {} bytes of incomplete line", decoder.pending());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    async fn collect_frames(chunks: Vec<&'static str>) -> Vec<Frame> {
        let input = stream::iter(chunks.into_iter().map(Ok::<_, ()>));
        input
            .frames()
            .map(|frame| frame.unwrap())
            .collect()
            .await
    }

    #[test]
    fn test_frame_parse_keep_alive() {
        assert_eq!(Frame::parse(""), Frame::KeepAlive);
    }

    #[test]
    fn test_frame_parse_comment() {
        assert_eq!(
            Frame::parse(": keep-alive"),
            Frame::Comment(" keep-alive".to_string())
        );
    }

    #[test]
    fn test_frame_parse_data_trims_payload() {
        assert_eq!(
            Frame::parse("data:   {\"a\":1}  "),
            Frame::Data("{\"a\":1}".to_string())
        );
    }

    #[test]
    fn test_frame_parse_done() {
        assert_eq!(Frame::parse("data: [DONE]"), Frame::Done);
        assert_eq!(Frame::parse("data: [DONE]   "), Frame::Done);
    }

    #[test]
    fn test_frame_parse_requires_space_after_colon() {
        assert_eq!(
            Frame::parse("data:{}"),
            Frame::Unknown("data:{}".to_string())
        );
        assert_eq!(
            Frame::parse("event: update"),
            Frame::Unknown("event: update".to_string())
        );
    }

    #[test]
    fn test_line_decoder_waits_for_newline() {
        let mut decoder = LineDecoder::new();
        decoder.push(b"data: par");
        assert_eq!(decoder.next_line(), None);
        decoder.push(b"tial\nnext");
        assert_eq!(decoder.next_line(), Some("data: partial".to_string()));
        assert_eq!(decoder.next_line(), None);
        assert_eq!(decoder.pending(), 4);
    }

    #[test]
    fn test_line_decoder_strips_crlf() {
        let mut decoder = LineDecoder::new();
        decoder.push(b"one\r\ntwo\n\r\n");
        assert_eq!(decoder.next_line(), Some("one".to_string()));
        assert_eq!(decoder.next_line(), Some("two".to_string()));
        assert_eq!(decoder.next_line(), Some(String::new()));
        assert_eq!(decoder.next_line(), None);
    }

    #[test]
    fn test_line_decoder_joins_split_codepoint() {
        let bytes = "é€\n".as_bytes();
        let mut decoder = LineDecoder::new();
        // split inside the three-byte euro sign
        decoder.push(&bytes[..3]);
        assert_eq!(decoder.next_line(), None);
        decoder.push(&bytes[3..]);
        assert_eq!(decoder.next_line(), Some("é€".to_string()));
    }

    #[test]
    fn test_line_decoder_many_lines_in_one_chunk() {
        let chunk: String = (0..500).map(|n| format!("data: {n}\n")).collect();
        let mut decoder = LineDecoder::new();
        decoder.push(chunk.as_bytes());

        let lines: Vec<String> = std::iter::from_fn(|| decoder.next_line()).collect();
        assert_eq!(lines.len(), 500);
        assert_eq!(lines[499], "data: 499");
        assert_eq!(decoder.pending(), 0);

        // consumed lines are released on the next push
        decoder.push(b"tail");
        assert_eq!(decoder.buffer, b"tail");
        assert_eq!(decoder.pending(), 4);
    }

    #[test]
    fn test_line_decoder_resumes_scan_of_partial_line() {
        let mut decoder = LineDecoder::new();
        decoder.push(b"done\ndata: long");
        assert_eq!(decoder.next_line(), Some("done".to_string()));
        assert_eq!(decoder.next_line(), None);
        assert_eq!(decoder.scanned, decoder.buffer.len());

        decoder.push(b" payload");
        // only the new bytes are left to search
        assert_eq!(decoder.scanned, "data: long".len());
        assert_eq!(decoder.next_line(), None);

        decoder.push(b"\n");
        assert_eq!(decoder.next_line(), Some("data: long payload".to_string()));
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_line_decoder_replaces_invalid_utf8() {
        let mut decoder = LineDecoder::new();
        decoder.push(b"ok \xff\n");
        assert_eq!(decoder.next_line(), Some("ok \u{fffd}".to_string()));
    }

    #[tokio::test]
    async fn test_frames_skip_noise() {
        let frames = collect_frames(vec![
            ": ping\n",
            "\n",
            "event: message\n",
            "data: {\"x\":1}\n",
        ])
        .await;
        assert_eq!(frames, vec![Frame::Data("{\"x\":1}".to_string())]);
    }

    #[tokio::test]
    async fn test_frames_stop_after_done() {
        let frames = collect_frames(vec!["data: a\ndata: [DONE]\ndata: b\n", "data: c\n"]).await;
        assert_eq!(frames, vec![Frame::Data("a".to_string()), Frame::Done]);
    }

    #[tokio::test]
    async fn test_frames_drop_trailing_partial_line() {
        let frames = collect_frames(vec!["data: a\n", "data: b"]).await;
        assert_eq!(frames, vec![Frame::Data("a".to_string())]);
    }

    #[tokio::test]
    async fn test_frames_propagate_transport_error() {
        let input = stream::iter(vec![Ok("data: a\n"), Err("reset")]);
        let frames: Vec<_> = input.frames().collect().await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], Ok(Frame::Data("a".to_string())));
        assert_eq!(frames[1], Err("reset"));
    }
}
