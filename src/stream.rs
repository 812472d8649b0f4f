//! Stream decoding
//!
//! Turns the backend's byte stream into events. The body is newline-delimited
//! JSON; chunks may split lines and multi-byte characters anywhere. Lines that
//! are not JSON are skipped, and a trailing line without a newline is dropped.

use std::collections::VecDeque;

use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;

/// One decoded line of the event stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Fragment of assistant text
    Token(String),
    /// Structured payload, carried verbatim from the line's `data` field
    UiItems(Value),
}

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Incremental UTF-8 decoder.
///
/// Incomplete sequences at the end of a chunk are held back until the next
/// chunk arrives; invalid sequences become U+FFFD. A byte order mark at the
/// very start of the input is dropped.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
    bom_checked: bool,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, chunk: &[u8], out: &mut String) {
        self.pending.extend_from_slice(chunk);
        if !self.bom_checked {
            if self.pending.len() < BOM.len() && BOM.starts_with(&self.pending) {
                return;
            }
            if self.pending.starts_with(BOM) {
                self.pending.drain(..BOM.len());
            }
            self.bom_checked = true;
        }
        let mut consumed = 0;

        loop {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    consumed = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid_end = consumed + e.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&self.pending[consumed..valid_end]) {
                        out.push_str(valid);
                    }
                    consumed = valid_end;
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            consumed += len;
                        }
                        // Truncated sequence: wait for more bytes
                        None => break,
                    }
                }
            }
        }

        self.pending.drain(..consumed);
    }

    /// Bytes held back waiting for the rest of a character
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Synchronous line decoder: feed chunks, get back the events of every completed line.
#[derive(Debug, Default)]
pub struct LineDecoder {
    utf8: Utf8Decoder,
    buffer: String,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.utf8.decode(chunk, &mut self.buffer);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(event) = parse_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// End of input. Whatever is left without a trailing newline is discarded.
    pub fn finish(&mut self) {
        if !self.buffer.trim().is_empty() || self.utf8.pending_len() > 0 {
            tracing::debug!(
                leftover_chars = self.buffer.len(),
                "Discarding unterminated final line"
            );
        }
        self.buffer.clear();
        self.utf8 = Utf8Decoder::new();
    }
}

/// Parse one complete line. `None` for malformed JSON or event types we don't consume.
pub fn parse_line(line: &str) -> Option<StreamEvent> {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping malformed stream line");
            return None;
        }
    };

    match value.get("type").and_then(Value::as_str) {
        Some("token") => Some(StreamEvent::Token(coerce_text(value.get("data")))),
        Some("ui_items") => Some(StreamEvent::UiItems(
            value.get("data").cloned().unwrap_or(Value::Null),
        )),
        other => {
            tracing::debug!(kind = ?other, "Ignoring stream event of unrecognized type");
            None
        }
    }
}

/// Token payloads are coerced to text; missing and falsy values become empty.
fn coerce_text(data: Option<&Value>) -> String {
    match data {
        None | Some(Value::Null) | Some(Value::Bool(false)) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(true)) => "true".to_string(),
        Some(Value::Number(n)) if n.as_f64() == Some(0.0) => String::new(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Decode an asynchronous chunk stream into events, lazily and in arrival order.
///
/// A transport error is yielded once and ends the stream.
pub fn decode_stream<S, B, E>(chunks: S) -> impl Stream<Item = Result<StreamEvent, E>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    let state = (chunks, LineDecoder::new(), VecDeque::<StreamEvent>::new(), false);

    stream::unfold(
        state,
        |(mut chunks, mut decoder, mut ready, mut done)| async move {
            loop {
                if let Some(event) = ready.pop_front() {
                    return Some((Ok(event), (chunks, decoder, ready, done)));
                }
                if done {
                    return None;
                }
                match chunks.next().await {
                    Some(Ok(chunk)) => ready.extend(decoder.push(chunk.as_ref())),
                    Some(Err(e)) => {
                        done = true;
                        return Some((Err(e), (chunks, decoder, ready, done)));
                    }
                    None => {
                        decoder.finish();
                        done = true;
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BODY: &str = concat!(
        "{\"type\":\"token\",\"data\":\"Caf\u{e9} \"}\n",
        "not json\n",
        "\n",
        "{\"type\":\"token\",\"data\":\"\u{1F680} ok\"}\r\n",
        "{\"type\":\"ui_items\",\"data\":{\"type\":\"summary\",\"data\":{\"title\":\"T\"}}}\n",
        "{\"type\":\"token\",\"data\":\"\u{65e5}\u{672c}\"}\n",
    );

    fn decode_chunks(chunks: &[&[u8]]) -> Vec<StreamEvent> {
        let mut decoder = LineDecoder::new();
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(decoder.push(chunk));
        }
        decoder.finish();
        events
    }

    fn expected() -> Vec<StreamEvent> {
        vec![
            StreamEvent::Token("Caf\u{e9} ".into()),
            StreamEvent::Token("\u{1F680} ok".into()),
            StreamEvent::UiItems(json!({"type": "summary", "data": {"title": "T"}})),
            StreamEvent::Token("\u{65e5}\u{672c}".into()),
        ]
    }

    #[test]
    fn test_single_chunk() {
        assert_eq!(decode_chunks(&[BODY.as_bytes()]), expected());
    }

    #[test]
    fn test_byte_by_byte() {
        let bytes = BODY.as_bytes();
        let chunks: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(decode_chunks(&chunks), expected());
    }

    #[test]
    fn test_every_split_point() {
        let bytes = BODY.as_bytes();
        for split in 0..=bytes.len() {
            let (a, b) = bytes.split_at(split);
            assert_eq!(decode_chunks(&[a, b]), expected(), "split at {}", split);
        }
    }

    #[test]
    fn test_split_inside_multibyte_char() {
        let line = "{\"type\":\"token\",\"data\":\"\u{1F680}\"}\n".as_bytes();
        let rocket = line.iter().position(|b| *b == 0xF0).unwrap();
        let chunks = [&line[..rocket + 1], &line[rocket + 1..rocket + 3], &line[rocket + 3..]];
        assert_eq!(
            decode_chunks(&chunks),
            vec![StreamEvent::Token("\u{1F680}".into())]
        );
    }

    #[test]
    fn test_utf8_decoder_holds_partial_sequence() {
        let mut decoder = Utf8Decoder::new();
        let mut out = String::new();
        let euro = "\u{20ac}".as_bytes();
        decoder.decode(&euro[..2], &mut out);
        assert_eq!(out, "");
        assert_eq!(decoder.pending_len(), 2);
        decoder.decode(&euro[2..], &mut out);
        assert_eq!(out, "\u{20ac}");
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_utf8_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::new();
        let mut out = String::new();
        decoder.decode(b"a\xffb", &mut out);
        assert_eq!(out, "a\u{fffd}b");
    }

    #[test]
    fn test_leading_bom_is_stripped() {
        let mut body = b"\xEF\xBB\xBF".to_vec();
        body.extend_from_slice(b"{\"type\":\"token\",\"data\":\"Hi\"}\n");

        for split in 0..=4 {
            let (a, b) = body.split_at(split);
            assert_eq!(
                decode_chunks(&[a, b]),
                vec![StreamEvent::Token("Hi".into())],
                "split at {}",
                split
            );
        }
        let chunks: Vec<&[u8]> = body.chunks(1).collect();
        assert_eq!(decode_chunks(&chunks), vec![StreamEvent::Token("Hi".into())]);
    }

    #[test]
    fn test_bom_only_stripped_at_start() {
        let mut decoder = Utf8Decoder::new();
        let mut out = String::new();
        decoder.decode(b"a", &mut out);
        decoder.decode(b"\xEF\xBB\xBFb", &mut out);
        assert_eq!(out, "a\u{feff}b");

        let mut decoder = Utf8Decoder::new();
        let mut out = String::new();
        decoder.decode(b"\xEF\xBB", &mut out);
        assert_eq!(decoder.pending_len(), 2);
        decoder.decode(b"x", &mut out);
        assert_eq!(out, "\u{fffd}x");
    }

    #[test]
    fn test_token_concatenation() {
        let events = decode_chunks(&[
            &b"{\"type\":\"token\",\"data\":\"Hel\"}\n"[..],
            &b"{\"type\":\"token\",\"data\":\"lo\"}\n"[..],
        ]);
        let text: String = events
            .into_iter()
            .map(|e| match e {
                StreamEvent::Token(t) => t,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(text, "Hello");
    }

    #[test]
    fn test_malformed_line_does_not_stop_stream() {
        let events = decode_chunks(&[&b"not json\n{\"type\":\"token\",\"data\":\"x\"}\n"[..]]);
        assert_eq!(events, vec![StreamEvent::Token("x".into())]);
    }

    #[test]
    fn test_unterminated_final_line_is_dropped() {
        let events = decode_chunks(&[
            &b"{\"type\":\"token\",\"data\":\"a\"}\n{\"type\":\"token\",\"data\":\"b\"}"[..],
        ]);
        assert_eq!(events, vec![StreamEvent::Token("a".into())]);
    }

    #[test]
    fn test_token_data_coercion() {
        assert_eq!(
            parse_line(r#"{"type":"token"}"#),
            Some(StreamEvent::Token(String::new()))
        );
        assert_eq!(
            parse_line(r#"{"type":"token","data":null}"#),
            Some(StreamEvent::Token(String::new()))
        );
        assert_eq!(
            parse_line(r#"{"type":"token","data":42}"#),
            Some(StreamEvent::Token("42".into()))
        );
    }

    #[test]
    fn test_unrecognized_shapes_are_skipped() {
        assert_eq!(parse_line(r#"{"type":"ping"}"#), None);
        assert_eq!(parse_line(r#"{"data":"x"}"#), None);
        assert_eq!(parse_line(r#"["token"]"#), None);
        assert_eq!(parse_line(r#""not json""#), None);
    }

    #[test]
    fn test_ui_items_without_data() {
        assert_eq!(
            parse_line(r#"{"type":"ui_items"}"#),
            Some(StreamEvent::UiItems(Value::Null))
        );
    }

    #[tokio::test]
    async fn test_decode_stream_matches_line_decoder() {
        let chunks: Vec<Result<Vec<u8>, String>> = BODY
            .as_bytes()
            .chunks(3)
            .map(|c| Ok(c.to_vec()))
            .collect();
        let events: Vec<_> = decode_stream(stream::iter(chunks)).collect().await;
        let events: Vec<StreamEvent> = events.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(events, expected());
    }

    #[tokio::test]
    async fn test_decode_stream_yields_transport_error_once() {
        let chunks: Vec<Result<&[u8], String>> = vec![
            Ok(&b"{\"type\":\"token\",\"data\":\"a\"}\n"[..]),
            Err("connection reset".to_string()),
            Ok(&b"{\"type\":\"token\",\"data\":\"b\"}\n"[..]),
        ];
        let events: Vec<_> = decode_stream(stream::iter(chunks)).collect().await;
        assert_eq!(
            events,
            vec![
                Ok(StreamEvent::Token("a".into())),
                Err("connection reset".to_string()),
            ]
        );
    }
}
