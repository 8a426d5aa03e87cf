use crate::history::History;
use crossterm::{
    cursor::MoveToColumn,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    queue,
    style::Print,
    terminal::{self, Clear, ClearType},
};
use std::io::{self, Write};
use tracing::debug;

/// How a call to [`LineEditor::read_line`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLine {
    Line(String),
    /// Ctrl-C: the line was thrown away.
    Interrupted,
    /// Ctrl-D on an empty line.
    Eof,
}

/// Raw mode for as long as this lives.
pub struct RawMode;

impl RawMode {
    pub fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(RawMode)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            debug!("failed to leave raw mode: {}", e);
        }
    }
}

#[derive(Debug, Default)]
pub struct LineEditor {
    buffer: Vec<char>,
    cursor: usize,
    history_index: Option<usize>,
    draft: String,
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&self) -> String {
        self.buffer.iter().collect()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
        self.history_index = None;
        self.draft.clear();
    }

    fn set_line(&mut self, line: &str) {
        self.buffer = line.chars().collect();
        self.cursor = self.buffer.len();
    }

    fn history_prev(&mut self, history: &History) {
        let index = match self.history_index {
            None if history.is_empty() => return,
            None => {
                self.draft = self.line();
                history.len() - 1
            }
            Some(0) => 0,
            Some(i) => i - 1,
        };
        self.history_index = Some(index);
        if let Some(entry) = history.get(index) {
            self.set_line(entry);
        }
    }

    fn history_next(&mut self, history: &History) {
        let Some(i) = self.history_index else {
            return;
        };
        if i + 1 < history.len() {
            self.history_index = Some(i + 1);
            if let Some(entry) = history.get(i + 1) {
                self.set_line(entry);
            }
        } else {
            self.history_index = None;
            let draft = std::mem::take(&mut self.draft);
            self.set_line(&draft);
        }
    }

    /// Applies one key. Returns `Some` once the line is finished.
    pub fn handle_key(&mut self, key: KeyEvent, history: &History) -> Option<ReadLine> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') if ctrl => {
                self.reset();
                return Some(ReadLine::Interrupted);
            }
            KeyCode::Char('d') if ctrl => {
                if self.buffer.is_empty() {
                    return Some(ReadLine::Eof);
                }
                if self.cursor < self.buffer.len() {
                    self.buffer.remove(self.cursor);
                }
            }
            KeyCode::Char('a') if ctrl => self.cursor = 0,
            KeyCode::Char('e') if ctrl => self.cursor = self.buffer.len(),
            KeyCode::Char(c) if !ctrl => {
                self.buffer.insert(self.cursor, c);
                self.cursor += 1;
            }
            KeyCode::Enter => {
                let line = self.line();
                self.reset();
                return Some(ReadLine::Line(line));
            }
            KeyCode::Backspace if self.cursor > 0 => {
                self.cursor -= 1;
                self.buffer.remove(self.cursor);
            }
            KeyCode::Delete if self.cursor < self.buffer.len() => {
                self.buffer.remove(self.cursor);
            }
            KeyCode::Left => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Right => self.cursor = (self.cursor + 1).min(self.buffer.len()),
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = self.buffer.len(),
            KeyCode::Up => self.history_prev(history),
            KeyCode::Down => self.history_next(history),
            _ => {}
        }
        None
    }

    fn redraw(&self, out: &mut impl Write, prompt: &str) -> io::Result<()> {
        let prompt_width = console::measure_text_width(prompt);
        let before_cursor: String = self.buffer[..self.cursor].iter().collect();
        let column = prompt_width + console::measure_text_width(&before_cursor);
        queue!(
            out,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(prompt),
            Print(self.line()),
            MoveToColumn(u16::try_from(column).unwrap_or(u16::MAX)),
        )?;
        out.flush()
    }

    /// Reads one line from the terminal in raw mode. Raw mode is left again
    /// before returning, so commands run with the terminal in its usual state.
    pub fn read_line(&mut self, prompt: &str, history: &History) -> io::Result<ReadLine> {
        let mut out = io::stdout();
        let _raw = RawMode::enable()?;
        self.reset();
        self.redraw(&mut out, prompt)?;

        loop {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            let done = self.handle_key(key, history);
            match done {
                Some(ReadLine::Interrupted) => {
                    queue!(out, Print("^C\r\n"))?;
                    out.flush()?;
                    return Ok(ReadLine::Interrupted);
                }
                Some(result) => {
                    queue!(out, Print("\r\n"))?;
                    out.flush()?;
                    return Ok(result);
                }
                None => self.redraw(&mut out, prompt)?,
            }
        }
    }
}
