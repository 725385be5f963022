//! `nexus::tui` - terminal output and prompts
//!
//! Everything is line based and written to the host's output sink with the
//! host's [`Theme`]. Prompts read lines from the console input; a masked
//! prompt on a real terminal goes through `dialoguer` so the secret is not
//! echoed.

use crate::error::CapabilityError;
use crate::namespace::{display_value, Args, Namespace};
use crate::output::{write_line, Sink};
use crate::registry::{Capability, ModuleKind};
use crate::theme::{Theme, Tone};
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// Where presentation output goes and where prompts read from
pub struct Console {
    out: Sink,
    input: Mutex<Box<dyn BufRead + Send>>,
    interactive: bool,
    theme: Theme,
}

impl Console {
    pub fn new(out: Sink, input: Box<dyn BufRead + Send>, interactive: bool, theme: Theme) -> Self {
        Self {
            out,
            input: Mutex::new(input),
            interactive,
            theme,
        }
    }

    pub fn line(&self, text: &str) {
        write_line(&self.out, text);
    }

    fn prompt(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = write!(out, "{}", text);
        let _ = out.flush();
    }

    /// One line without its terminator; `None` at end of input
    fn read_line(&self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let read = self
            .input
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .read_line(&mut line)?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn ask(&self, prompt: &str) -> io::Result<String> {
        if !prompt.is_empty() {
            self.prompt(&format!("{} ", self.theme.paint(prompt, Tone::Info)));
        }
        Ok(self.read_line()?.unwrap_or_default())
    }

    fn ask_secret(&self, prompt: &str) -> io::Result<String> {
        if !self.interactive {
            return self.ask(prompt);
        }
        dialoguer::Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }
}

pub struct PresentationCapability {
    console: Arc<Console>,
}

impl PresentationCapability {
    pub fn new(console: Arc<Console>) -> Self {
        Self { console }
    }
}

impl Capability for PresentationCapability {
    fn key(&self) -> &str {
        ModuleKind::Presentation.key()
    }

    fn register(&self, namespace: &mut Namespace) {
        let module = namespace.module(self.key());

        // `print` is a reserved function name in the engine
        let c = self.console.clone();
        module.function("println", 0..=2, move |args| {
            let tone = match args.opt_string(1)? {
                Some(name) => Tone::from_name(&name).unwrap_or(Tone::Plain),
                None => Tone::Plain,
            };
            c.line(&c.theme.paint(&args.display(0), tone));
            Ok(Value::Null)
        });

        let c = self.console.clone();
        module.function("title", 1..=1, move |args| {
            let text = args.display(0);
            let rule = "─".repeat(text.chars().count().max(3));
            c.line(&c.theme.bold(&text, Tone::Title));
            c.line(&c.theme.paint(&rule, Tone::Muted));
            Ok(Value::Null)
        });

        let c = self.console.clone();
        module.function("header", 1..=1, move |args| {
            c.line(&c.theme.bold(&format!("▌ {}", args.display(0)), Tone::Info));
            Ok(Value::Null)
        });

        for (name, icon, tone) in [
            ("success", "✓", Tone::Success),
            ("error", "✗", Tone::Error),
            ("info", "ℹ", Tone::Info),
            ("warn", "⚠", Tone::Warn),
        ] {
            let c = self.console.clone();
            module.function(name, 1..=1, move |args| {
                c.line(&c.theme.paint(&format!("{} {}", icon, args.display(0)), tone));
                Ok(Value::Null)
            });
        }

        let c = self.console.clone();
        module.function("box", 1..=2, move |args| {
            let (title, body) = if args.len() == 2 {
                (Some(args.display(0)), args.display(1))
            } else {
                (None, args.display(0))
            };
            c.line(&render_box(title.as_deref(), &body));
            Ok(Value::Null)
        });

        let c = self.console.clone();
        module.function("table", 1..=2, move |args| {
            let (headers, rows) = if args.len() == 2 {
                (Some(args.value(0)), args.value(1))
            } else {
                (None, args.value(0))
            };
            c.line(&render_table(&c.theme, headers, rows, args)?);
            Ok(Value::Null)
        });

        let c = self.console.clone();
        module.function("markdown", 1..=1, move |args| {
            c.line(&render_markdown(&c.theme, &args.display(0)));
            Ok(Value::Null)
        });

        let c = self.console.clone();
        module.function("input", 0..=2, move |args| {
            let prompt = args.opt_string(0)?.unwrap_or_default();
            let masked = match args.value(1) {
                Value::Bool(b) => *b,
                Value::Object(opts) => opts.get("mask").and_then(Value::as_bool).unwrap_or(false),
                _ => false,
            };
            let answer = if masked {
                c.ask_secret(&prompt)?
            } else {
                c.ask(&prompt)?
            };
            Ok(json!(answer))
        });

        let c = self.console.clone();
        module.function("list", 1..=2, move |args| {
            let (prompt, items) = if args.len() == 2 {
                (args.display(0), args.value(1))
            } else {
                ("Choose an option:".to_string(), args.value(0))
            };
            let items = items
                .as_array()
                .ok_or_else(|| args.invalid("items must be an array"))?;

            c.line(&c.theme.bold(&prompt, Tone::Info));
            for (i, item) in items.iter().enumerate() {
                c.line(&format!("  {}. {}", i + 1, display_value(item)));
            }
            let answer = c.ask(">")?;
            Ok(answer
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| items.get(i))
                .cloned()
                .unwrap_or(Value::Null))
        });

        let c = self.console.clone();
        module.function("confirm", 1..=1, move |args| {
            let answer = c.ask(&format!("{} [y/N]", args.display(0)))?;
            Ok(json!(is_yes(&answer)))
        });
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes" | "s" | "sim"
    )
}

fn width(text: &str) -> usize {
    text.chars().count()
}

fn pad(text: &str, to: usize) -> String {
    format!("{}{}", text, " ".repeat(to.saturating_sub(width(text))))
}

pub fn render_box(title: Option<&str>, body: &str) -> String {
    let lines: Vec<&str> = body.lines().collect();
    let inner = lines
        .iter()
        .map(|l| width(l))
        .chain(title.map(|t| width(t) + 2))
        .max()
        .unwrap_or(0);

    let top = match title {
        Some(t) => format!("┌─ {} {}┐", t, "─".repeat(inner - width(t) - 1)),
        None => format!("┌{}┐", "─".repeat(inner + 2)),
    };
    let mut out = vec![top];
    for line in &lines {
        out.push(format!("│ {} │", pad(line, inner)));
    }
    out.push(format!("└{}┘", "─".repeat(inner + 2)));
    out.join("\n")
}

/// Rows are arrays (positional) or maps (keyed by header)
pub fn render_table(
    theme: &Theme,
    headers: Option<&Value>,
    rows: &Value,
    args: &Args<'_>,
) -> Result<String, CapabilityError> {
    let rows = rows
        .as_array()
        .ok_or_else(|| args.invalid("rows must be an array"))?;

    let headers: Vec<String> = match headers {
        Some(Value::Array(h)) => h.iter().map(display_value).collect(),
        Some(_) => return Err(args.invalid("headers must be an array")),
        None => match rows.first() {
            Some(Value::Object(first)) => first.keys().cloned().collect(),
            _ => Vec::new(),
        },
    };

    let mut grid: Vec<Vec<String>> = Vec::with_capacity(rows.len());
    for row in rows {
        let cells = match row {
            Value::Array(cells) => cells.iter().map(display_value).collect(),
            Value::Object(map) => headers
                .iter()
                .map(|h| map.get(h).map(display_value).unwrap_or_default())
                .collect(),
            other => vec![display_value(other)],
        };
        grid.push(cells);
    }

    let columns = grid
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(headers.len()))
        .max()
        .unwrap_or(0);
    let mut widths = vec![0; columns];
    for row in grid.iter().chain(std::iter::once(&headers)) {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(width(cell));
        }
    }

    let render_row = |cells: &[String]| -> String {
        (0..columns)
            .map(|i| pad(cells.get(i).map(String::as_str).unwrap_or(""), widths[i]))
            .collect::<Vec<_>>()
            .join(" │ ")
            .trim_end()
            .to_string()
    };

    let mut out = Vec::new();
    if !headers.is_empty() {
        out.push(theme.bold(&render_row(&headers), Tone::Plain));
        let rule = widths
            .iter()
            .map(|w| "─".repeat(*w))
            .collect::<Vec<_>>()
            .join("─┼─");
        out.push(theme.paint(&rule, Tone::Muted));
    }
    for row in &grid {
        out.push(render_row(row));
    }
    Ok(out.join("\n"))
}

/// Line-oriented markdown: headings, lists, quotes, fences, rules, inline bold/code
pub fn render_markdown(theme: &Theme, text: &str) -> String {
    let mut out = Vec::new();
    let mut in_code = false;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            in_code = !in_code;
            continue;
        }
        if in_code {
            out.push(theme.paint(&format!("    {}", line), Tone::Muted));
            continue;
        }

        let rendered = if let Some(h) = trimmed.strip_prefix("### ") {
            theme.bold(&inline(theme, h), Tone::Plain)
        } else if let Some(h) = trimmed.strip_prefix("## ") {
            theme.bold(&inline(theme, h), Tone::Info)
        } else if let Some(h) = trimmed.strip_prefix("# ") {
            theme.bold(&inline(theme, h), Tone::Title)
        } else if let Some(item) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
        {
            format!("  • {}", inline(theme, item))
        } else if let Some(quote) = trimmed.strip_prefix("> ") {
            theme.paint(&format!("│ {}", inline(theme, quote)), Tone::Muted)
        } else if matches!(trimmed, "---" | "***" | "___") {
            theme.paint(&"─".repeat(40), Tone::Muted)
        } else {
            inline(theme, line)
        };
        out.push(rendered);
    }
    out.join("\n")
}

/// `**bold**` and `` `code` ``; unmatched markers are left alone
fn inline(theme: &Theme, text: &str) -> String {
    let mut out = String::new();
    let mut rest = text;
    loop {
        let bold = rest.find("**");
        let code = rest.find('`');
        let (start, marker, tone) = match (bold, code) {
            (Some(b), Some(c)) if c < b => (c, "`", Tone::Info),
            (Some(b), _) => (b, "**", Tone::Plain),
            (None, Some(c)) => (c, "`", Tone::Info),
            (None, None) => break,
        };
        let after = &rest[start + marker.len()..];
        let Some(end) = after.find(marker) else {
            break;
        };
        out.push_str(&rest[..start]);
        let inner = &after[..end];
        out.push_str(&match marker {
            "**" => theme.bold(inner, tone),
            _ => theme.paint(inner, tone),
        });
        rest = &after[end + marker.len()..];
    }
    out.push_str(rest);
    out
}
