//! Console sink writing to stdout, colored with crossterm when attached to a
//! terminal.

use std::io::{self, IsTerminal, Write};

use crossterm::{
    queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
};

use super::ConsoleSink;

/// Which console channel a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Normal,
    Info,
    Warning,
    Error,
}

impl Channel {
    fn color(self) -> Option<Color> {
        match self {
            Channel::Normal => None,
            Channel::Info => Some(Color::DarkGrey),
            Channel::Warning => Some(Color::DarkYellow),
            Channel::Error => Some(Color::Red),
        }
    }

    /// Prefix used when color is unavailable.
    fn prefix(self) -> &'static str {
        match self {
            Channel::Normal => "",
            Channel::Info => "Info: ",
            Channel::Warning => "Warning: ",
            Channel::Error => "Error: ",
        }
    }
}

/// Stdout sink.  Colors are used only when enabled *and* stdout is a TTY.
#[derive(Debug)]
pub struct TerminalSink {
    color: bool,
}

impl TerminalSink {
    pub fn new(color: bool) -> Self {
        TerminalSink {
            color: color && io::stdout().is_terminal(),
        }
    }

    fn emit(&mut self, channel: Channel, text: &str) {
        let mut out = io::stdout().lock();
        if let Err(e) = write_line(&mut out, channel, text, self.color) {
            tracing::warn!("console write failed: {e}");
        }
    }
}

/// Render one line; split out so tests can target a buffer.
pub fn write_line(out: &mut impl Write, channel: Channel, text: &str, color: bool) -> io::Result<()> {
    match channel.color() {
        Some(c) if color => {
            queue!(out, SetForegroundColor(c), Print(text), ResetColor, Print("\n"))?;
        }
        _ => {
            queue!(out, Print(channel.prefix()), Print(text), Print("\n"))?;
        }
    }
    out.flush()
}

impl ConsoleSink for TerminalSink {
    fn print(&mut self, text: &str) {
        self.emit(Channel::Normal, text);
    }
    fn print_info(&mut self, text: &str) {
        self.emit(Channel::Info, text);
    }
    fn print_warning(&mut self, text: &str) {
        self.emit(Channel::Warning, text);
    }
    fn print_error(&mut self, text: &str) {
        self.emit(Channel::Error, text);
    }
}
