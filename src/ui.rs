use crate::client::ApiClient;
use crate::i18n::{Key, Lang, placeholders, tr};
use crate::session::{ChatSession, GenerationEvent, GenerationOutcome, run_request, save_artifact};
use crate::view::{ChatEntry, ChatView};
use crossterm::cursor::MoveTo;
use crossterm::event::{self, Event, KeyCode, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, size};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Widget, Wrap};
use ratatui::{Frame, Terminal, TerminalOptions, Viewport};
use std::io;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::warn;

type TuiTerminal = Terminal<CrosstermBackend<io::Stdout>>;

const INPUT_HEIGHT: u16 = 6;
const LIVE_HEIGHT: u16 = 10;
const PLACEHOLDER_INTERVAL: Duration = Duration::from_secs(4);

// Restores terminal settings even if the loop exits early.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Self {
        Self
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = io::stdout().flush();
    }
}

#[derive(Debug)]
pub enum UiEvent {
    Generation(GenerationEvent),
    Finished {
        outcome: GenerationOutcome,
        saved: Option<PathBuf>,
    },
}

struct InputBuffer {
    lines: Vec<String>,
    cursor_x: usize,
    cursor_y: usize,
}

// Byte offset of the `index`-th char, or the line length past the end.
fn byte_offset(line: &str, index: usize) -> usize {
    line.char_indices()
        .nth(index)
        .map_or(line.len(), |(offset, _)| offset)
}

impl InputBuffer {
    fn new() -> Self {
        Self {
            lines: vec![String::new()],
            cursor_x: 0,
            cursor_y: 0,
        }
    }

    fn clear(&mut self) {
        self.lines = vec![String::new()];
        self.cursor_x = 0;
        self.cursor_y = 0;
    }

    fn line_len(&self, y: usize) -> usize {
        self.lines[y].chars().count()
    }

    fn insert_char(&mut self, c: char) {
        let line = &mut self.lines[self.cursor_y];
        let offset = byte_offset(line, self.cursor_x);
        line.insert(offset, c);
        self.cursor_x += 1;
    }

    fn delete_char(&mut self) {
        if self.cursor_x > 0 {
            let line = &mut self.lines[self.cursor_y];
            let offset = byte_offset(line, self.cursor_x - 1);
            line.remove(offset);
            self.cursor_x -= 1;
        } else if self.cursor_y > 0 {
            let prev_line = self.lines.remove(self.cursor_y);
            self.cursor_y -= 1;
            self.cursor_x = self.line_len(self.cursor_y);
            self.lines[self.cursor_y].push_str(&prev_line);
        }
    }

    fn new_line(&mut self) {
        let line = &self.lines[self.cursor_y];
        let remaining: String = line.chars().skip(self.cursor_x).collect();
        self.lines[self.cursor_y] = line.chars().take(self.cursor_x).collect();
        self.lines.insert(self.cursor_y + 1, remaining);
        self.cursor_y += 1;
        self.cursor_x = 0;
    }

    fn move_left(&mut self) {
        if self.cursor_x > 0 {
            self.cursor_x -= 1;
        } else if self.cursor_y > 0 {
            self.cursor_y -= 1;
            self.cursor_x = self.line_len(self.cursor_y);
        }
    }

    fn move_right(&mut self) {
        if self.cursor_x < self.line_len(self.cursor_y) {
            self.cursor_x += 1;
        } else if self.cursor_y < self.lines.len() - 1 {
            self.cursor_y += 1;
            self.cursor_x = 0;
        }
    }

    fn move_up(&mut self) {
        if self.cursor_y > 0 {
            self.cursor_y -= 1;
            self.cursor_x = self.cursor_x.min(self.line_len(self.cursor_y));
        }
    }

    fn move_down(&mut self) {
        if self.cursor_y < self.lines.len() - 1 {
            self.cursor_y += 1;
            self.cursor_x = self.cursor_x.min(self.line_len(self.cursor_y));
        }
    }

    /// Display column of the cursor; wide characters take two cells.
    fn cursor_column(&self) -> usize {
        let line = &self.lines[self.cursor_y];
        Line::from(&line[..byte_offset(line, self.cursor_x)]).width()
    }

    fn to_string(&self) -> String {
        self.lines.join("\n")
    }

    fn is_empty(&self) -> bool {
        self.lines.iter().all(|l| l.is_empty())
    }

    fn render(&self, placeholder: &str) -> Text<'static> {
        if self.is_empty() {
            return Text::from(Span::styled(
                placeholder.to_string(),
                Style::default().fg(Color::DarkGray),
            ));
        }
        Text::from(
            self.lines
                .iter()
                .map(|l| Line::from(l.clone()))
                .collect::<Vec<_>>(),
        )
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

pub struct App {
    view: ChatView,
    session: ChatSession,
    input: InputBuffer,
    should_quit: bool,
    sender: mpsc::Sender<UiEvent>,
    receiver: mpsc::Receiver<UiEvent>,
    client: ApiClient,
    lang: Lang,
    out_dir: PathBuf,
    placeholder_index: usize,
    placeholder_since: Instant,
}

impl App {
    pub fn new(client: ApiClient, lang: Lang, out_dir: PathBuf) -> Self {
        let (sender, receiver) = mpsc::channel(100);

        Self {
            view: ChatView::new(),
            session: ChatSession::new(),
            input: InputBuffer::new(),
            should_quit: false,
            sender,
            receiver,
            client,
            lang,
            out_dir,
            placeholder_index: 0,
            placeholder_since: Instant::now(),
        }
    }

    fn placeholder(&self) -> &'static str {
        if !self.session.history().is_empty() {
            return tr(Key::ChatPlaceholder, self.lang);
        }
        let topics = placeholders(self.lang);
        topics[self.placeholder_index % topics.len()]
    }

    fn rotate_placeholder(&mut self) {
        if self.placeholder_since.elapsed() >= PLACEHOLDER_INTERVAL {
            self.placeholder_index = self.placeholder_index.wrapping_add(1);
            self.placeholder_since = Instant::now();
        }
    }

    fn draw(&mut self, f: &mut Frame) {
        let [live_area, input_area] =
            Layout::vertical([Constraint::Length(LIVE_HEIGHT), Constraint::Length(INPUT_HEIGHT)])
                .areas(f.area());

        if let Some(entry) = self.view.live() {
            let text = entry.to_text(self.lang);
            let overflow = text.lines.len().saturating_sub(LIVE_HEIGHT as usize);
            let live = Paragraph::new(text).scroll((overflow.min(u16::MAX as usize) as u16, 0));
            f.render_widget(live, live_area);
        }

        let mut title = format!(
            " {} · Ctrl+N {} · Esc ",
            tr(Key::HeroTitle, self.lang),
            tr(Key::NewChat, self.lang)
        );
        if self.session.is_busy() {
            title.push_str(&format!("[{}] ", tr(Key::Busy, self.lang)));
        }

        let input_paragraph = Paragraph::new(self.input.render(self.placeholder()))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(title)
                    .border_style(Style::default().fg(Color::DarkGray)),
            )
            .wrap(Wrap { trim: false });

        f.render_widget(input_paragraph, input_area);

        let cursor_x = (self.input.cursor_column() + 1) as u16;
        let cursor_y = self.input.cursor_y as u16;
        let x = (input_area.x + cursor_x).min(input_area.x + input_area.width - 2);
        let y = (input_area.y + 1 + cursor_y).min(input_area.y + input_area.height - 2);
        f.set_cursor_position((x, y));
    }

    fn append_entry(
        &self,
        terminal: &mut TuiTerminal,
        entry: &ChatEntry,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let width = terminal.size()?.width;
        let height = entry.rendered_height(width, self.lang).saturating_add(1);
        let mut text = entry.to_text(self.lang);
        text.extend(Text::raw("\n"));
        // Insert above the inline viewport so the log stays in scrollback.
        terminal.insert_before(height, |buf| {
            let paragraph = Paragraph::new(text).wrap(Wrap { trim: false });
            paragraph.render(buf.area, buf);
        })?;
        Ok(())
    }

    fn flush_settled(
        &mut self,
        terminal: &mut TuiTerminal,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        for entry in self.view.take_settled() {
            self.append_entry(terminal, &entry)?;
        }
        Ok(())
    }

    fn submit(&mut self) {
        let topic = self.input.to_string();
        let request = match self.session.submit(&topic) {
            Ok(request) => request,
            Err(err) => {
                self.view.push_refusal(err, self.lang);
                return;
            }
        };
        self.input.clear();
        self.view.begin(&request.topic);

        let client = self.client.clone();
        let sender = self.sender.clone();
        let out_dir = self.out_dir.clone();
        tokio::spawn(async move {
            let events = sender.clone();
            let outcome = run_request(&client, &request, move |event| {
                let events = events.clone();
                async move {
                    let _ = events.send(UiEvent::Generation(event)).await;
                }
            })
            .await;

            let saved = match &outcome {
                Ok(Some(artifact)) => match save_artifact(&out_dir, &request.topic, artifact).await {
                    Ok(path) => Some(path),
                    Err(err) => {
                        warn!(error = %err, "could not save artifact");
                        None
                    }
                },
                _ => None,
            };
            // Always delivered so the session is released.
            let _ = sender.send(UiEvent::Finished { outcome, saved }).await;
        });
    }

    fn new_chat(&mut self) {
        match self.session.reset() {
            Ok(()) => {
                self.view.clear();
                self.input.clear();
                self.view.push_notice(tr(Key::NewChat, self.lang));
            }
            Err(err) => self.view.push_refusal(err, self.lang),
        }
    }

    fn handle_events(
        &mut self,
        terminal: &mut TuiTerminal,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        while let Ok(event) = self.receiver.try_recv() {
            match event {
                UiEvent::Generation(event) => self.view.apply(event),
                UiEvent::Finished { outcome, saved } => {
                    self.session.complete(&outcome);
                    self.view.finish(&outcome, saved, self.lang);
                }
            }
        }

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.modifiers.contains(KeyModifiers::CONTROL) {
                    match key.code {
                        KeyCode::Char('c') => {
                            self.should_quit = true;
                            return Ok(false);
                        }
                        KeyCode::Char('n') => {
                            self.new_chat();
                            self.flush_settled(terminal)?;
                            return Ok(true);
                        }
                        _ => {}
                    }
                }

                match key.code {
                    KeyCode::Esc => {
                        self.should_quit = true;
                        return Ok(false);
                    }
                    KeyCode::Enter => {
                        if key.modifiers.contains(KeyModifiers::SHIFT) {
                            self.input.new_line();
                        } else if !self.input.is_empty() {
                            self.submit();
                        }
                    }
                    KeyCode::Char(c) => {
                        self.input.insert_char(c);
                    }
                    KeyCode::Backspace => {
                        self.input.delete_char();
                    }
                    KeyCode::Left => {
                        self.input.move_left();
                    }
                    KeyCode::Right => {
                        self.input.move_right();
                    }
                    KeyCode::Up => {
                        self.input.move_up();
                    }
                    KeyCode::Down => {
                        self.input.move_down();
                    }
                    KeyCode::Home => {
                        self.input.cursor_x = 0;
                    }
                    KeyCode::End => {
                        self.input.cursor_x = self.input.line_len(self.input.cursor_y);
                    }
                    _ => {}
                }
            }
        }

        self.flush_settled(terminal)?;
        self.rotate_placeholder();
        Ok(true)
    }
}

pub fn run_tui(
    client: ApiClient,
    lang: Lang,
    out_dir: PathBuf,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    let (_, rows) = size()?;
    if rows > 0 {
        // Push existing screen content into scrollback without clearing it.
        for _ in 0..rows {
            writeln!(stdout)?;
        }
        stdout.flush()?;
    }
    execute!(stdout, MoveTo(0, 0))?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::with_options(
        backend,
        TerminalOptions {
            viewport: Viewport::Inline(LIVE_HEIGHT + INPUT_HEIGHT),
        },
    )?;

    let mut app = App::new(client, lang, out_dir);

    let _guard = TerminalGuard::new();

    terminal.draw(|f| app.draw(f))?;

    while !app.should_quit {
        if !app.handle_events(&mut terminal)? {
            break;
        }

        terminal.draw(|f| app.draw(f))?;

        std::thread::sleep(Duration::from_millis(10));
    }

    disable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::InputBuffer;

    #[test]
    fn input_buffer_shift_enter_inserts_new_line() {
        let mut buffer = InputBuffer::new();
        for ch in "hello".chars() {
            buffer.insert_char(ch);
        }
        buffer.new_line();
        for ch in "world".chars() {
            buffer.insert_char(ch);
        }

        assert_eq!(buffer.to_string(), "hello\nworld");
        assert_eq!(buffer.lines.len(), 2);
        assert_eq!(buffer.cursor_y, 1);
    }

    #[test]
    fn input_buffer_edits_wide_characters() {
        let mut buffer = InputBuffer::new();
        for ch in "百年孤独".chars() {
            buffer.insert_char(ch);
        }
        buffer.move_left();
        buffer.move_left();
        buffer.delete_char();
        buffer.insert_char('的');

        assert_eq!(buffer.to_string(), "百的孤独");
        assert_eq!(buffer.cursor_x, 2);
        assert_eq!(buffer.cursor_column(), 4);
    }
}
