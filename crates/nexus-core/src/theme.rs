//! Terminal styling, owned per host instance

use crossterm::style::{style, Color, Stylize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Plain,
    Success,
    Error,
    Info,
    Warn,
    Title,
    Muted,
}

impl Tone {
    /// Color names scripts may pass to `println`
    pub fn from_name(name: &str) -> Option<Tone> {
        match name.to_ascii_lowercase().as_str() {
            "green" | "success" => Some(Tone::Success),
            "red" | "error" => Some(Tone::Error),
            "blue" | "info" => Some(Tone::Info),
            "yellow" | "warn" | "warning" => Some(Tone::Warn),
            "purple" | "magenta" | "title" => Some(Tone::Title),
            "gray" | "grey" | "muted" => Some(Tone::Muted),
            "" | "plain" | "default" => Some(Tone::Plain),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Theme {
    pub color: bool,
    pub success: Color,
    pub error: Color,
    pub info: Color,
    pub warn: Color,
    pub title: Color,
    pub muted: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            color: true,
            success: Color::Green,
            error: Color::Red,
            info: Color::Blue,
            warn: Color::Yellow,
            title: Color::Magenta,
            muted: Color::DarkGrey,
        }
    }
}

impl Theme {
    /// No escape codes at all
    pub fn plain() -> Self {
        Self {
            color: false,
            ..Self::default()
        }
    }

    pub fn paint(&self, text: &str, tone: Tone) -> String {
        let color = match tone {
            Tone::Plain => return text.to_string(),
            Tone::Success => self.success,
            Tone::Error => self.error,
            Tone::Info => self.info,
            Tone::Warn => self.warn,
            Tone::Title => self.title,
            Tone::Muted => self.muted,
        };
        if !self.color {
            return text.to_string();
        }
        style(text).with(color).to_string()
    }

    pub fn bold(&self, text: &str, tone: Tone) -> String {
        if !self.color {
            return text.to_string();
        }
        match tone {
            Tone::Plain => style(text).bold().to_string(),
            _ => style(self.paint(text, tone)).bold().to_string(),
        }
    }
}
