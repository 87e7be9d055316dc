//! Decoding of the `/generate` response body.
//!
//! The body is a sequence of `data: <payload>` frames separated by a blank
//! line. Network reads do not respect frame boundaries, so [`FrameDecoder`]
//! keeps the unfinished tail of the previous read and only hands out whole
//! frames. [`records`] layers JSON decoding on top and stops after the first
//! terminal record.

use crate::protocol::{FramePayload, StreamFailure, StreamRecord};
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use tracing::{debug, trace, warn};

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    // Bytes of `buffer` already searched for a delimiter.
    scanned: usize,
}

impl FrameDecoder {
    /// Appends a network chunk and returns every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some((idx, delimiter_len)) = find_frame_delimiter(&self.buffer, self.scanned) {
            let raw: Vec<u8> = self.buffer.drain(..idx + delimiter_len).take(idx).collect();
            frames.push(String::from_utf8_lossy(&raw).into_owned());
            self.scanned = 0;
        }
        // A delimiter can straddle reads; its first three bytes are searched again.
        self.scanned = self.buffer.len().saturating_sub(3);
        frames
    }

    /// Returns whatever is left once the body has closed.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        let rest = String::from_utf8_lossy(&rest);
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest.into_owned())
        }
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

fn find_frame_delimiter(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if i + 3 < buf.len() && &buf[i..i + 4] == b"\r\n\r\n" {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}

fn extract_data(raw: &str) -> Option<String> {
    let mut data_lines = Vec::new();
    for line in raw.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(data) = line.strip_prefix("data:") {
            data_lines.push(data.strip_prefix(' ').unwrap_or(data).to_string());
        }
    }

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

/// Decodes one frame. Frames that carry nothing the client acts on yield `None`.
pub fn parse_frame(raw: &str) -> Option<StreamRecord> {
    let data = extract_data(raw)?;
    let data = data.trim();
    if data.is_empty() {
        return None;
    }
    if data == DONE_SENTINEL {
        return Some(StreamRecord::Done);
    }

    let value: serde_json::Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "frame payload is not valid JSON");
            return Some(StreamRecord::Error(StreamFailure::Protocol(format!(
                "invalid JSON frame: {err}"
            ))));
        }
    };

    let Some(object) = value.as_object() else {
        return Some(StreamRecord::Error(StreamFailure::Protocol(format!(
            "expected a JSON object, got `{data}`"
        ))));
    };

    // The backend terminates with `{"event":"[DONE]"}`.
    if object.get("event").and_then(|v| v.as_str()) == Some(DONE_SENTINEL) {
        return Some(StreamRecord::Done);
    }

    let payload: FramePayload = match serde_json::from_value(value.clone()) {
        Ok(payload) => payload,
        Err(err) => {
            return Some(StreamRecord::Error(StreamFailure::Protocol(format!(
                "unexpected frame shape: {err}"
            ))));
        }
    };

    let present = |field: Option<String>| field.filter(|s| !s.is_empty());
    if let Some(message) = present(payload.error) {
        return Some(StreamRecord::Error(StreamFailure::Server(message)));
    }
    if let Some(line) = present(payload.log) {
        return Some(StreamRecord::Log(line));
    }
    if let Some(status) = present(payload.status) {
        return Some(StreamRecord::Status(status));
    }
    if let Some(token) = present(payload.token) {
        return Some(StreamRecord::Token(token));
    }

    debug!(keys = ?object.keys().collect::<Vec<_>>(), "ignoring frame without a known field");
    None
}

struct ConsumerState<S> {
    bytes: Pin<Box<S>>,
    decoder: FrameDecoder,
    ready: VecDeque<StreamRecord>,
    finished: bool,
}

impl<S> ConsumerState<S> {
    fn enqueue(&mut self, frame: &str) {
        if let Some(record) = parse_frame(frame) {
            trace!(?record, "decoded frame");
            self.ready.push_back(record);
        }
    }
}

/// Turns a chunked response body into an ordered stream of records.
///
/// The stream ends after the first `Done` or `Error` record, or when the body
/// closes. A read error becomes a `Transport` failure record.
pub fn records<S, B, E>(bytes: S) -> impl Stream<Item = StreamRecord> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    let state = ConsumerState {
        bytes: Box::pin(bytes),
        decoder: FrameDecoder::default(),
        ready: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(record) = state.ready.pop_front() {
                if record.is_terminal() {
                    state.finished = true;
                    state.ready.clear();
                }
                return Some((record, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let frames = state.decoder.push(chunk.as_ref());
                    for frame in &frames {
                        state.enqueue(frame);
                    }
                }
                Some(Err(err)) => {
                    state
                        .ready
                        .push_back(StreamRecord::Error(StreamFailure::Transport(err.to_string())));
                }
                None => {
                    if let Some(rest) = state.decoder.finish() {
                        state.enqueue(&rest);
                    }
                    if !state.ready.back().is_some_and(StreamRecord::is_terminal) {
                        debug!("response body closed without a terminal frame");
                    }
                    state.finished = true;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(chunks: &[&str]) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + use<> {
        let chunks: Vec<_> = chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
        futures::stream::iter(chunks)
    }

    async fn collect(chunks: &[&str]) -> Vec<StreamRecord> {
        records(body(chunks)).collect().await
    }

    #[test]
    fn decoder_keeps_partial_frame_until_delimiter_arrives() {
        let mut decoder = FrameDecoder::default();
        assert!(decoder.push(b"data: {\"token\":\"he").is_empty());
        assert!(decoder.pending_len() > 0);

        let frames = decoder.push(b"llo\"}\n\ndata: {\"log\":\"x\"}\n");
        assert_eq!(frames, vec!["data: {\"token\":\"hello\"}".to_string()]);

        let frames = decoder.push(b"\n");
        assert_eq!(frames, vec!["data: {\"log\":\"x\"}".to_string()]);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn decoder_finds_crlf_delimiter_split_over_three_reads() {
        let mut decoder = FrameDecoder::default();
        assert!(decoder.push(b"data: {\"log\":\"a\"}\r").is_empty());
        assert!(decoder.push(b"\n\r").is_empty());
        let frames = decoder.push(b"\ndata: [DONE]\n\n");
        assert_eq!(
            frames,
            vec!["data: {\"log\":\"a\"}".to_string(), "data: [DONE]".to_string()]
        );
    }

    #[test]
    fn decoder_reassembles_a_large_frame_from_many_reads() {
        let token = "x".repeat(4096);
        let frame = format!("data: {{\"token\":\"{token}\"}}\n\n");
        let mut decoder = FrameDecoder::default();
        let mut frames = Vec::new();
        for piece in frame.as_bytes().chunks(7) {
            frames.extend(decoder.push(piece));
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(parse_frame(&frames[0]), Some(StreamRecord::Token(token)));
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn decoder_accepts_crlf_delimiters() {
        let mut decoder = FrameDecoder::default();
        let frames = decoder.push(b"data: [DONE]\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(parse_frame(&frames[0]), Some(StreamRecord::Done));
    }

    #[test]
    fn decoder_does_not_corrupt_split_multibyte_characters() {
        let frame = "data: {\"status\":\"正在生成HTML...\"}\n\n".as_bytes();
        let split = frame.iter().position(|b| *b >= 0x80).unwrap() + 1;
        let mut decoder = FrameDecoder::default();
        assert!(decoder.push(&frame[..split]).is_empty());
        let frames = decoder.push(&frame[split..]);
        assert_eq!(
            parse_frame(&frames[0]),
            Some(StreamRecord::Status("正在生成HTML...".to_string()))
        );
    }

    #[test]
    fn parse_frame_maps_known_fields() {
        assert_eq!(
            parse_frame("data: {\"log\":\"step 1\"}"),
            Some(StreamRecord::Log("step 1".to_string()))
        );
        assert_eq!(
            parse_frame("data: {\"token\":\"<h1>\"}"),
            Some(StreamRecord::Token("<h1>".to_string()))
        );
        assert_eq!(
            parse_frame("data: {\"error\":\"x\"}"),
            Some(StreamRecord::Error(StreamFailure::Server("x".to_string())))
        );
        assert_eq!(parse_frame("data: {\"event\":\"[DONE]\"}"), Some(StreamRecord::Done));
    }

    #[test]
    fn parse_frame_skips_comments_and_unknown_objects() {
        assert_eq!(parse_frame(": keep-alive"), None);
        assert_eq!(parse_frame("data: {\"step1_complete\":true}"), None);
        assert_eq!(parse_frame("data: {\"token\":\"\"}"), None);
    }

    #[test]
    fn token_mentioning_the_sentinel_is_not_a_terminator() {
        assert_eq!(
            parse_frame("data: {\"token\":\"see [DONE] marker\"}"),
            Some(StreamRecord::Token("see [DONE] marker".to_string()))
        );
    }

    #[test]
    fn parse_frame_rejects_malformed_payloads() {
        assert!(matches!(
            parse_frame("data: {\"token\":"),
            Some(StreamRecord::Error(StreamFailure::Protocol(_)))
        ));
        assert!(matches!(
            parse_frame("data: [1,2]"),
            Some(StreamRecord::Error(StreamFailure::Protocol(_)))
        ));
        assert!(matches!(
            parse_frame("data: {\"token\":5}"),
            Some(StreamRecord::Error(StreamFailure::Protocol(_)))
        ));
    }

    #[tokio::test]
    async fn frame_split_across_reads_yields_one_record() {
        let records = collect(&["data: {\"tok", "en\":\"abc\"}\n", "\ndata: [DONE]\n\n"]).await;
        assert_eq!(
            records,
            vec![StreamRecord::Token("abc".to_string()), StreamRecord::Done]
        );
    }

    #[tokio::test]
    async fn server_error_stops_the_stream() {
        let records = collect(&[
            "data: {\"status\":\"working\"}\n\ndata: {\"error\":\"x\"}\n\n",
            "data: {\"token\":\"never\"}\n\ndata: [DONE]\n\n",
        ])
        .await;
        assert_eq!(
            records,
            vec![
                StreamRecord::Status("working".to_string()),
                StreamRecord::Error(StreamFailure::Server("x".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn nothing_is_read_after_done() {
        let records = collect(&["data: [DONE]\n\ndata: {\"token\":\"late\"}\n\n"]).await;
        assert_eq!(records, vec![StreamRecord::Done]);
    }

    #[tokio::test]
    async fn read_error_becomes_transport_failure() {
        let chunks = vec![
            Ok(b"data: {\"log\":\"a\"}\n\n".to_vec()),
            Err(std::io::Error::other("connection reset")),
            Ok(b"data: [DONE]\n\n".to_vec()),
        ];
        let records: Vec<_> = records(futures::stream::iter(chunks)).collect().await;
        assert_eq!(records.len(), 2);
        assert!(matches!(
            &records[1],
            StreamRecord::Error(StreamFailure::Transport(message)) if message.contains("connection reset")
        ));
    }

    #[tokio::test]
    async fn unterminated_final_frame_is_flushed_on_close() {
        let records = collect(&["data: {\"token\":\"a\"}\n\ndata: [DONE]"]).await;
        assert_eq!(
            records,
            vec![StreamRecord::Token("a".to_string()), StreamRecord::Done]
        );
    }
}
