use std::fmt;

/// The text of one streamed reply, built up fragment by fragment.
///
/// Content is only ever appended, so the buffer never shrinks while a reply
/// is streaming.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AccumulatedMessage {
    text: String,
    fragments: usize,
}

impl AccumulatedMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) {
        self.text.push_str(fragment);
        self.fragments += 1;
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Number of fragments appended so far.
    pub const fn fragment_count(&self) -> usize {
        self.fragments
    }
}

impl fmt::Display for AccumulatedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_after_every_push() {
        let fragments = ["Hel", "lo", ", ", "wörld"];
        let mut message = AccumulatedMessage::new();
        let mut previous_len = 0;

        for (n, fragment) in fragments.iter().enumerate() {
            message.push(fragment);
            assert_eq!(message.as_str(), fragments[..=n].concat());
            assert_eq!(message.fragment_count(), n + 1);
            assert!(message.len() >= previous_len);
            previous_len = message.len();
        }
        assert_eq!(message.to_string(), "Hello, wörld");
    }

    #[test]
    fn test_new_is_empty() {
        let message = AccumulatedMessage::new();
        assert!(message.is_empty());
        assert_eq!(message.fragment_count(), 0);
        assert_eq!(message.to_string(), "");
    }
}
