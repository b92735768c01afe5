//! Bounded capture and truncation of the child's output streams.

use tokio::io::{AsyncRead, AsyncReadExt};

/// The marker appended to a stream that exceeded its byte ceiling.
pub fn truncation_marker(max_bytes: usize) -> String {
    format!("\n... (output truncated at {max_bytes} bytes)")
}

/// Return `text` unchanged if it fits in `max_bytes`, otherwise its first
/// `max_bytes` bytes followed by [`truncation_marker`].
///
/// The cut never splits a UTF-8 character, so the kept prefix may be up to
/// three bytes shorter than the ceiling.
pub fn truncate_output(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    with_marker(text, max_bytes)
}

fn with_marker(text: &str, max_bytes: usize) -> String {
    let mut cut = max_bytes.min(text.len());
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut governed = String::with_capacity(cut + 48);
    governed.push_str(&text[..cut]);
    governed.push_str(&truncation_marker(max_bytes));
    governed
}

/// A byte sink that keeps at most `limit` bytes and counts the rest.
#[derive(Debug, Clone)]
pub struct BoundedCapture {
    buffer: Vec<u8>,
    limit: usize,
    total: usize,
}

impl BoundedCapture {
    /// Create a capture retaining at most `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(limit.min(64 * 1024)),
            limit,
            total: 0,
        }
    }

    /// Append a chunk, dropping whatever exceeds the limit.
    pub fn push(&mut self, chunk: &[u8]) {
        self.total += chunk.len();
        let room = self.limit.saturating_sub(self.buffer.len());
        self.buffer.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    /// Number of bytes seen so far, retained or not.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Drain `reader` to EOF into this capture.
    ///
    /// Reading continues past the limit so the child never blocks on a full
    /// pipe; the surplus is only counted.
    pub async fn drain<R>(mut self, mut reader: R) -> std::io::Result<Captured>
    where
        R: AsyncRead + Unpin,
    {
        let mut chunk = [0u8; 8 * 1024];
        loop {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            self.push(&chunk[..n]);
        }
        Ok(self.finish())
    }

    /// Stop capturing.
    pub fn finish(self) -> Captured {
        Captured {
            overflowed: self.total > self.buffer.len(),
            bytes: self.buffer,
        }
    }
}

/// Raw bytes captured from one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    /// The retained prefix of the stream.
    pub bytes: Vec<u8>,
    /// Whether bytes beyond the retained prefix were dropped.
    pub overflowed: bool,
}

impl Captured {
    /// Decode the stream and apply the output ceiling.
    ///
    /// Returns the governed text and whether it was truncated.
    pub fn govern(&self, max_bytes: usize) -> (String, bool) {
        let text = String::from_utf8_lossy(&self.bytes);
        if self.overflowed || text.len() > max_bytes {
            (with_marker(&text, max_bytes), true)
        } else {
            (text.into_owned(), false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_budget_is_unchanged() {
        assert_eq!(truncate_output("hello\n", 10), "hello\n");
        assert_eq!(truncate_output("", 0), "");
        assert_eq!(truncate_output("exact", 5), "exact");
    }

    #[test]
    fn test_over_budget_is_cut_and_marked() {
        let governed = truncate_output(&"x".repeat(50), 10);
        assert_eq!(governed, format!("{}{}", "x".repeat(10), truncation_marker(10)));
    }

    #[test]
    fn test_cut_respects_char_boundary() {
        // 'é' is two bytes; a cut at 3 would split the second one.
        let governed = truncate_output("éééé", 3);
        assert_eq!(governed, format!("é{}", truncation_marker(3)));
    }

    #[test]
    fn test_bounded_capture_keeps_prefix() {
        let mut capture = BoundedCapture::new(4);
        capture.push(b"ab");
        capture.push(b"cdef");
        capture.push(b"gh");
        assert_eq!(capture.total(), 8);

        let captured = capture.finish();
        assert_eq!(captured.bytes, b"abcd");
        assert!(captured.overflowed);

        let (text, truncated) = captured.govern(4);
        assert!(truncated);
        assert_eq!(text, format!("abcd{}", truncation_marker(4)));
    }

    #[test]
    fn test_exact_fit_is_not_truncated() {
        let mut capture = BoundedCapture::new(5);
        capture.push(b"hello");
        let (text, truncated) = capture.finish().govern(5);
        assert_eq!(text, "hello");
        assert!(!truncated);
    }

    #[tokio::test]
    async fn test_drain_reader() {
        let data = vec![b'y'; 20_000];
        let captured = BoundedCapture::new(1_000).drain(&data[..]).await.unwrap();
        assert_eq!(captured.bytes.len(), 1_000);
        assert!(captured.overflowed);
    }
}
