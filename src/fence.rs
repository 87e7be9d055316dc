//! Extraction of the fenced payload from the token stream.
//!
//! The model narrates before and after the generated document and wraps the
//! document itself in a code fence. [`ParseState`] classifies every token
//! chunk as narration or payload and accumulates the payload.

use tracing::warn;

const FENCE: &str = "```";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FenceState {
    #[default]
    Narrating,
    InPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FenceEvent {
    Opened,
    Payload(String),
    Closed,
}

/// Per-request parser state. Consumed by [`ParseState::finish`].
#[derive(Debug, Default)]
pub struct ParseState {
    state: FenceState,
    // Text between an open fence and the first newline, while it still looks like a language tag.
    tag_line: Option<String>,
    // Trailing backticks that may be the start of a delimiter continued by the next chunk.
    held: String,
    accumulated: String,
}

impl ParseState {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn state(&self) -> FenceState {
        self.state
    }

    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// Feeds one token chunk. Any number of fence transitions inside the
    /// chunk are applied in order.
    pub fn feed(&mut self, chunk: &str) -> Vec<FenceEvent> {
        let mut text = std::mem::take(&mut self.held);
        text.push_str(chunk);

        let hold = trailing_backticks(&text) % FENCE.len();
        self.held = text.split_off(text.len() - hold);

        let mut events = Vec::new();
        let mut rest = text.as_str();
        loop {
            match self.state {
                FenceState::Narrating => match rest.find(FENCE) {
                    Some(idx) => {
                        rest = &rest[idx + FENCE.len()..];
                        self.state = FenceState::InPayload;
                        self.tag_line = Some(String::new());
                        events.push(FenceEvent::Opened);
                    }
                    None => break,
                },
                FenceState::InPayload => {
                    if let Some(mut tag) = self.tag_line.take() {
                        // A tag ending in `\r` is complete and only waits for its `\n`.
                        if !tag.ends_with('\r') {
                            let end = rest.find(|c: char| !is_tag_char(c)).unwrap_or(rest.len());
                            tag.push_str(&rest[..end]);
                            rest = &rest[end..];
                            if let Some(after) = rest.strip_prefix('\r') {
                                tag.push('\r');
                                rest = after;
                            }
                        }
                        if rest.is_empty() {
                            self.tag_line = Some(tag);
                            break;
                        }
                        match rest.strip_prefix('\n') {
                            Some(body) => rest = body,
                            None => self.append(&tag, &mut events),
                        }
                    }

                    match rest.find(FENCE) {
                        Some(idx) => {
                            self.append(&rest[..idx], &mut events);
                            rest = &rest[idx + FENCE.len()..];
                            self.state = FenceState::Narrating;
                            events.push(FenceEvent::Closed);
                        }
                        None => {
                            self.append(rest, &mut events);
                            break;
                        }
                    }
                }
            }
        }
        events
    }

    /// Seals the accumulated payload. Returns `None` when no payload was seen.
    pub fn finish(mut self) -> Option<Artifact> {
        if self.state == FenceState::InPayload {
            if let Some(tag) = self.tag_line.take() {
                self.accumulated.push_str(&tag);
            }
            self.accumulated.push_str(&self.held);
        }

        if self.accumulated.is_empty() {
            warn!("generation finished without a fenced payload");
            return None;
        }
        Some(Artifact {
            html: self.accumulated,
        })
    }

    fn append(&mut self, text: &str, events: &mut Vec<FenceEvent>) {
        if text.is_empty() {
            return;
        }
        self.accumulated.push_str(text);
        events.push(FenceEvent::Payload(text.to_string()));
    }
}

fn trailing_backticks(text: &str) -> usize {
    text.bytes().rev().take_while(|b| *b == b'`').count()
}

fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+' | '.')
}

/// Finished generated document, ready to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    html: String,
}

impl Artifact {
    pub fn as_str(&self) -> &str {
        &self.html
    }

    pub fn len(&self) -> usize {
        self.html.len()
    }

    /// File name used when saving the artifact for `topic`.
    pub fn file_name(topic: &str) -> String {
        let stem: String = topic
            .trim()
            .chars()
            .map(|c| {
                if c.is_whitespace() || matches!(c, '/' | '\\') {
                    '_'
                } else {
                    c
                }
            })
            .collect();
        if stem.is_empty() {
            "presentation.html".to_string()
        } else {
            format!("{stem}.html")
        }
    }
}
