//! Chat transcript as the user sees it, rebuilt from generation events.

use crate::error::{ClientError, SessionError};
use crate::i18n::{Key, Lang, tr};
use crate::session::{GenerationEvent, GenerationOutcome};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use std::path::PathBuf;

const CODE_TAIL_LINES: usize = 8;
const CODE_PREVIEW_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEntry {
    User(String),
    Thinking {
        status: Option<String>,
        logs: Vec<String>,
        complete: bool,
    },
    Code {
        text: String,
        complete: bool,
    },
    Saved {
        path: PathBuf,
        bytes: usize,
    },
    NoArtifact,
    Notice(String),
    Error(String),
}

#[derive(Debug, Clone)]
pub struct LineSpec {
    pub text: String,
    pub style: Style,
}

impl LineSpec {
    fn new(text: impl Into<String>, style: Style) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

impl ChatEntry {
    fn is_settled(&self) -> bool {
        match self {
            ChatEntry::Thinking { complete, .. } | ChatEntry::Code { complete, .. } => *complete,
            _ => true,
        }
    }

    pub fn line_specs(&self, lang: Lang) -> Vec<LineSpec> {
        match self {
            ChatEntry::User(msg) => {
                let header_style = Style::default()
                    .fg(Color::Blue)
                    .add_modifier(Modifier::BOLD);
                let body_style = Style::default().fg(Color::Blue);
                let header = match lang {
                    Lang::Zh => "你:",
                    Lang::En => "You:",
                };
                let mut lines = vec![LineSpec::new(header, header_style)];
                for line in msg.lines() {
                    lines.push(LineSpec::new(format!("  {line}"), body_style));
                }
                lines
            }
            ChatEntry::Thinking {
                status,
                logs,
                complete,
            } => {
                let header_style = Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD);
                let body_style = Style::default().fg(Color::Gray);
                let headline = if *complete {
                    tr(Key::PlanningComplete, lang)
                } else {
                    status.as_deref().unwrap_or(tr(Key::AgentThinking, lang))
                };
                let mut lines = vec![LineSpec::new(headline, header_style)];
                for log in logs {
                    lines.push(LineSpec::new(format!("  · {log}"), body_style));
                }
                lines
            }
            ChatEntry::Code { text, complete } => {
                let header_style = Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD);
                let body_style = Style::default().fg(Color::Green);
                if *complete {
                    let mut lines = vec![LineSpec::new(
                        format!(
                            "{} ({} lines, {} bytes)",
                            tr(Key::CodeComplete, lang),
                            text.lines().count(),
                            text.len()
                        ),
                        header_style,
                    )];
                    let preview = truncate(text, CODE_PREVIEW_CHARS, "\n...");
                    for line in preview.lines() {
                        lines.push(LineSpec::new(format!("  {line}"), body_style));
                    }
                    lines
                } else {
                    let mut lines = vec![LineSpec::new(tr(Key::GeneratingCode, lang), header_style)];
                    let tail: Vec<&str> = text.lines().collect();
                    let start = tail.len().saturating_sub(CODE_TAIL_LINES);
                    for line in &tail[start..] {
                        lines.push(LineSpec::new(format!("  {line}"), body_style));
                    }
                    lines
                }
            }
            ChatEntry::Saved { path, bytes } => vec![LineSpec::new(
                format!("✔ {} {} ({bytes} bytes)", tr(Key::SavedTo, lang), path.display()),
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )],
            ChatEntry::NoArtifact => vec![LineSpec::new(
                format!("ℹ {}", tr(Key::NoArtifact, lang)),
                Style::default()
                    .fg(Color::Gray)
                    .add_modifier(Modifier::ITALIC),
            )],
            ChatEntry::Notice(msg) => vec![LineSpec::new(
                format!("⚠ {msg}"),
                Style::default().fg(Color::Yellow),
            )],
            ChatEntry::Error(msg) => vec![LineSpec::new(
                format!("✖ {msg}"),
                Style::default().fg(Color::Red),
            )],
        }
    }

    pub fn to_text(&self, lang: Lang) -> Text<'static> {
        let lines = self
            .line_specs(lang)
            .into_iter()
            .map(|spec| Line::from(Span::styled(spec.text, spec.style)))
            .collect::<Vec<_>>();
        Text::from(lines)
    }

    pub fn plain_lines(&self, lang: Lang) -> Vec<String> {
        self.line_specs(lang)
            .into_iter()
            .map(|spec| spec.text)
            .collect()
    }

    pub fn rendered_height(&self, width: u16, lang: Lang) -> u16 {
        let width = width.max(1) as usize;
        let mut total = 0usize;
        for line in self.plain_lines(lang) {
            let cells = Line::from(line).width().max(1);
            total += cells.div_ceil(width);
        }
        total.min(u16::MAX as usize) as u16
    }
}

/// Ordered chat entries plus how many have been handed out as settled.
#[derive(Debug, Default)]
pub struct ChatView {
    entries: Vec<ChatEntry>,
    taken: usize,
}

impl ChatView {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    /// Starts a turn: the user's topic followed by a live thinking block.
    pub fn begin(&mut self, topic: &str) {
        self.entries.push(ChatEntry::User(topic.to_string()));
        self.entries.push(ChatEntry::Thinking {
            status: None,
            logs: Vec::new(),
            complete: false,
        });
    }

    pub fn apply(&mut self, event: GenerationEvent) {
        match event {
            GenerationEvent::Log(line) => {
                if let Some(ChatEntry::Thinking { logs, .. }) = self.live_mut() {
                    logs.push(line);
                }
            }
            GenerationEvent::Status(text) => {
                if let Some(ChatEntry::Thinking { status, .. }) = self.live_mut() {
                    *status = Some(text);
                }
            }
            GenerationEvent::CodeStarted => {
                self.settle_live();
                self.entries.push(ChatEntry::Code {
                    text: String::new(),
                    complete: false,
                });
            }
            GenerationEvent::CodeDelta(delta) => match self.live_mut() {
                Some(ChatEntry::Code { text, .. }) => text.push_str(&delta),
                _ => self.entries.push(ChatEntry::Code {
                    text: delta,
                    complete: false,
                }),
            },
            GenerationEvent::CodeClosed => self.settle_live(),
        }
    }

    /// Closes the turn with its final result line.
    pub fn finish(&mut self, outcome: &GenerationOutcome, saved: Option<PathBuf>, lang: Lang) {
        self.settle_live();
        match outcome {
            Ok(Some(artifact)) => match saved {
                Some(path) => self.entries.push(ChatEntry::Saved {
                    path,
                    bytes: artifact.len(),
                }),
                None => self.entries.push(ChatEntry::Error(tr(Key::ErrorMessage, lang).to_string())),
            },
            Ok(None) => self.entries.push(ChatEntry::NoArtifact),
            Err(err) => self.push_client_error(err, lang),
        }
    }

    pub fn push_client_error(&mut self, err: &ClientError, lang: Lang) {
        match err {
            ClientError::RateLimited | ClientError::Unauthenticated => {
                self.entries.push(ChatEntry::Notice(err.notice(lang).to_string()));
            }
            _ => {
                self.entries.push(ChatEntry::Error(tr(Key::ErrorMessage, lang).to_string()));
                self.entries.push(ChatEntry::Notice(err.notice(lang).to_string()));
            }
        }
    }

    pub fn push_refusal(&mut self, err: SessionError, lang: Lang) {
        self.entries.push(ChatEntry::Notice(err.notice(lang).to_string()));
    }

    pub fn push_notice(&mut self, msg: impl Into<String>) {
        self.entries.push(ChatEntry::Notice(msg.into()));
    }

    /// Entries that will not change anymore and have not been taken yet.
    pub fn take_settled(&mut self) -> Vec<ChatEntry> {
        let end = self.entries[self.taken..]
            .iter()
            .position(|entry| !entry.is_settled())
            .map_or(self.entries.len(), |offset| self.taken + offset);
        let settled = self.entries[self.taken..end].to_vec();
        self.taken = end;
        settled
    }

    /// The entry still being streamed into, if any.
    pub fn live(&self) -> Option<&ChatEntry> {
        self.entries.last().filter(|entry| !entry.is_settled())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.taken = 0;
    }

    fn live_mut(&mut self) -> Option<&mut ChatEntry> {
        self.entries.last_mut().filter(|entry| !entry.is_settled())
    }

    fn settle_live(&mut self) {
        if let Some(ChatEntry::Thinking { complete, .. } | ChatEntry::Code { complete, .. }) =
            self.live_mut()
        {
            *complete = true;
        }
    }
}

fn truncate(value: &str, max: usize, suffix: &str) -> String {
    match value.char_indices().nth(max) {
        Some((end, _)) => format!("{}{}", &value[..end], suffix),
        None => value.to_string(),
    }
}
