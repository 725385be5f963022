//! Messages from the CLI itself (not from scripts), in the selected format

use nexus_core::{OutputFormat, Theme, Tone};
use serde_json::{json, Value};

pub struct Printer {
    format: OutputFormat,
    theme: Theme,
}

impl Printer {
    pub fn new(format: OutputFormat, theme: Theme) -> Self {
        Self { format, theme }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    pub fn success(&self, message: &str) {
        if self.is_json() {
            self.json(&json!({ "success": message }));
        } else {
            println!("{}", self.theme.paint(&format!("✓ {}", message), Tone::Success));
        }
    }

    pub fn error(&self, message: &str) {
        match self.format {
            OutputFormat::Json => eprintln!("{}", pretty(&json!({ "error": message }))),
            OutputFormat::Markdown => eprintln!("## ❌ Error\n\n{}", message),
            OutputFormat::Tui => {
                eprintln!("{}", self.theme.paint(&format!("✗ {}", message), Tone::Error))
            }
        }
    }

    /// Progress chatter, TUI only
    pub fn info(&self, message: &str) {
        if self.format == OutputFormat::Tui {
            println!("{}", self.theme.paint(message, Tone::Info));
        }
    }

    pub fn muted(&self, message: &str) {
        if self.format == OutputFormat::Tui {
            println!("{}", self.theme.paint(message, Tone::Muted));
        }
    }

    pub fn json(&self, value: &Value) {
        println!("{}", pretty(value));
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
