//! Color output support for terminal formatting
//!
//! Colors are applied with `nu_ansi_term` styles and can be switched off as a
//! whole (`--no-color`, or output that is not a terminal).

use nu_ansi_term::{Color, Style};

use crate::export::{MessageLevel, UserMessage};

/// Color scheme for output highlighting
pub struct Colorizer {
    /// Enable colors
    enabled: bool,
}

impl Colorizer {
    /// Create a new colorizer
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    fn paint(&self, style: Style, text: &str) -> String {
        if self.enabled {
            style.paint(text).to_string()
        } else {
            text.to_string()
        }
    }

    /// Colorize text as success (green)
    pub fn success(&self, text: &str) -> String {
        self.paint(Color::Green.normal(), text)
    }

    /// Colorize text as warning (yellow)
    pub fn warning(&self, text: &str) -> String {
        self.paint(Color::Yellow.normal(), text)
    }

    /// Colorize text as error (red, prefixed)
    pub fn error(&self, text: &str) -> String {
        self.paint(Color::Red.normal(), &format!("Error: {text}"))
    }

    /// Dim secondary text
    pub fn dim(&self, text: &str) -> String {
        self.paint(Style::new().dimmed(), text)
    }

    /// Bold labels
    pub fn bold(&self, text: &str) -> String {
        self.paint(Style::new().bold(), text)
    }

    /// Colorize a user message according to its level
    pub fn message(&self, message: &UserMessage) -> String {
        match message.level {
            MessageLevel::Info => self.success(&message.text),
            MessageLevel::Warning => self.warning(&message.text),
            MessageLevel::Error => self.error(&message.text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_is_plain() {
        let c = Colorizer::new(false);
        assert_eq!(c.success("ok"), "ok");
        assert_eq!(c.error("bad"), "Error: bad");
        assert_eq!(c.message(&UserMessage::warning("careful")), "careful");
    }

    #[test]
    fn test_enabled_adds_escape_codes() {
        let c = Colorizer::new(true);
        let out = c.message(&UserMessage::error("bad"));
        assert!(out.contains("\x1b["));
        assert!(out.contains("Error: bad"));
    }
}
