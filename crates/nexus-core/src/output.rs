//! Output multiplexer
//!
//! A run ends in exactly one report. The shape depends on the active
//! [`OutputFormat`]; successes go to the output sink, failures to the
//! error sink.

use crate::error::RunError;
use crate::namespace::display_value;
use crate::theme::{Theme, Tone};
use serde_json::{json, Value};
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Shared, thread-safe writer
pub type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

pub fn sink(writer: impl Write + Send + 'static) -> Sink {
    Arc::new(Mutex::new(Box::new(writer)))
}

pub fn stdout_sink() -> Sink {
    sink(io::stdout())
}

pub fn stderr_sink() -> Sink {
    sink(io::stderr())
}

/// Write `text` plus a newline. A closed pipe is not worth failing a run over.
pub fn write_line(sink: &Sink, text: &str) {
    let mut out = sink.lock().unwrap_or_else(PoisonError::into_inner);
    let _ = writeln!(out, "{}", text);
    let _ = out.flush();
}

/// In-memory writer whose contents stay readable after it is boxed into a sink
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> Sink {
        sink(self.clone())
    }

    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Tui,
    Json,
    Markdown,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Tui => "tui",
            OutputFormat::Json => "json",
            OutputFormat::Markdown => "md",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tui" | "text" => Ok(OutputFormat::Tui),
            "json" => Ok(OutputFormat::Json),
            "md" | "markdown" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format '{}' (tui, json, md)", other)),
        }
    }
}

/// `12ms`, `1.234s`
pub fn format_elapsed(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        format!("{:.3}s", elapsed.as_secs_f64())
    }
}

pub struct Reporter {
    format: OutputFormat,
    theme: Theme,
    out: Sink,
    err: Sink,
}

impl Reporter {
    pub fn new(format: OutputFormat, theme: Theme, out: Sink, err: Sink) -> Self {
        Self {
            format,
            theme,
            out,
            err,
        }
    }

    /// Report a completed run. `show_value` is set for inline runs.
    pub fn success(&self, value: &Value, elapsed: Duration, show_value: bool) {
        match self.format {
            OutputFormat::Tui => {
                if show_value && !value.is_null() {
                    write_line(&self.out, &display_value(value));
                }
                let done = format!("✓ Completed in {}", format_elapsed(elapsed));
                write_line(&self.out, &self.theme.paint(&done, Tone::Success));
            }
            OutputFormat::Json => {
                let report = json!({
                    "result": value,
                    "elapsedMilliseconds": elapsed.as_millis() as u64,
                });
                write_line(&self.out, &pretty(&report));
            }
            OutputFormat::Markdown => {
                let mut text = String::new();
                if show_value && !value.is_null() {
                    text.push_str("**Result:**\n\n```json\n");
                    text.push_str(&pretty(value));
                    text.push_str("\n```\n\n");
                }
                text.push_str(&format!("_Completed in {}_", format_elapsed(elapsed)));
                write_line(&self.out, &text);
            }
        }
    }

    pub fn failure(&self, error: &RunError) {
        let title = error.title();
        let message = error.report_message();
        match self.format {
            OutputFormat::Tui => {
                let heading = self.theme.bold(&format!("❌ {}", title), Tone::Error);
                let body = self.theme.paint(&message, Tone::Error);
                write_line(&self.err, &format!("\n{}\n{}\n", heading, body));
            }
            OutputFormat::Json => {
                let report = json!({
                    "errorTitle": title,
                    "message": message,
                });
                write_line(&self.err, &pretty(&report));
            }
            OutputFormat::Markdown => {
                write_line(
                    &self.err,
                    &format!("## ❌ {}\n\n```\n{}\n```", title, message),
                );
            }
        }
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
