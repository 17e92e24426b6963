//! Incremental SSE frame parser for the backend event stream.
//!
//! Feed it raw byte chunks arriving on arbitrary boundaries; it yields the
//! `data:` payloads of completed frames. Event-name lines are ignored: the
//! backend repeats the event type inside the JSON payload's `type` field.

use bytes::BytesMut;
use memchr::memmem;

#[derive(Debug, Default)]
pub struct SseFrameParser {
    buffer: BytesMut,
}

impl SseFrameParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and push the `data:` payload of every frame it
    /// completes onto `out`.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<String>) {
        self.buffer.extend_from_slice(chunk);

        loop {
            let Some(boundary) = find_frame_boundary(&self.buffer) else {
                return;
            };
            let frame = self.buffer.split_to(boundary.frame_end);
            let _ = self.buffer.split_to(boundary.delimiter_len);
            if let Some(data) = extract_data(&frame) {
                out.push(data);
            }
        }
    }
}

struct FrameBoundary {
    frame_end: usize,
    delimiter_len: usize,
}

fn find_frame_boundary(buffer: &[u8]) -> Option<FrameBoundary> {
    let lf = memmem::find(buffer, b"\n\n");
    let crlf = memmem::find(buffer, b"\r\n\r\n");
    match (lf, crlf) {
        (Some(l), Some(c)) if c < l => Some(FrameBoundary {
            frame_end: c,
            delimiter_len: 4,
        }),
        (Some(l), _) => Some(FrameBoundary {
            frame_end: l,
            delimiter_len: 2,
        }),
        (None, Some(c)) => Some(FrameBoundary {
            frame_end: c,
            delimiter_len: 4,
        }),
        (None, None) => None,
    }
}

/// Concatenate the frame's `data:` lines, newline-separated as SSE framing
/// requires. Returns `None` for frames with no data lines (comments, bare
/// `event:` lines).
fn extract_data(frame: &[u8]) -> Option<String> {
    let mut data: Option<String> = None;
    for line in frame.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let Some(rest) = line.strip_prefix(b"data:") else {
            continue;
        };
        let rest = rest.strip_prefix(b" ").unwrap_or(rest);
        let text = String::from_utf8_lossy(rest);
        match data.as_mut() {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(&text);
            }
            None => data = Some(text.into_owned()),
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut SseFrameParser, input: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        parser.feed(input, &mut out);
        out
    }

    #[test]
    fn test_single_frame_with_event_name() {
        let mut parser = SseFrameParser::new();
        let out = feed_all(
            &mut parser,
            b"event: message_start\ndata: {\"type\":\"message_start\"}\n\n",
        );
        assert_eq!(out, vec!["{\"type\":\"message_start\"}"]);
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut parser = SseFrameParser::new();
        let mut out = Vec::new();
        parser.feed(b"data: {\"type\":", &mut out);
        assert!(out.is_empty());
        parser.feed(b"\"ping\"}\n\n", &mut out);
        assert_eq!(out, vec!["{\"type\":\"ping\"}"]);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut parser = SseFrameParser::new();
        let out = feed_all(&mut parser, b"data: a\n\ndata: b\n\ndata: c");
        assert_eq!(out, vec!["a", "b"]);
        // The trailing partial frame stays buffered.
        let out2 = feed_all(&mut parser, b"\n\n");
        assert_eq!(out2, vec!["c"]);
    }

    #[test]
    fn test_crlf_delimited_frames() {
        let mut parser = SseFrameParser::new();
        let out = feed_all(&mut parser, b"data: x\r\n\r\ndata: y\r\n\r\n");
        assert_eq!(out, vec!["x", "y"]);
    }

    #[test]
    fn test_comment_only_frame_yields_nothing() {
        let mut parser = SseFrameParser::new();
        let out = feed_all(&mut parser, b": keep-alive\n\n");
        assert!(out.is_empty());
    }

    #[test]
    fn test_multi_line_data_joined_with_newline() {
        let mut parser = SseFrameParser::new();
        let out = feed_all(&mut parser, b"data: one\ndata: two\n\n");
        assert_eq!(out, vec!["one\ntwo"]);
    }
}
