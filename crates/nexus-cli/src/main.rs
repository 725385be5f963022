//! Nexus CLI - The terminal script runtime
//!
//! Usage:
//!   nexus run <file|-> [args]    - Run a script
//!   nexus exec <code>            - Run inline code
//!   nexus @entity [cmd] [args]   - Run an installed entity
//!   nexus install|add|remove|list - Manage installed entities
//!   nexus fetch <url>            - Fetch a URL through the retrying client
//!   nexus vault                  - Manage secrets

mod entities;
mod printer;
mod registry;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crossterm::tty::IsTty;
use entities::{entity_name, EntityStore};
use nexus_core::{HostConfig, OutputFormat, Runtime, Theme};
use nexus_crypto::SecureVault;
use nexus_net::HttpClient;
use printer::Printer;
use registry::{read_source, RegistryClient, DEFAULT_REGISTRY_URL};
use secrecy::ExposeSecret;
use serde_json::json;
use std::io::{self, BufRead, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "nexus")]
#[command(version)]
#[command(about = "The terminal script runtime", long_about = None)]
struct Cli {
    /// Home directory for the vault, sandbox and installed scripts [default: ~/.nexus]
    #[arg(long, global = true, env = "NEXUS_HOME")]
    home: Option<PathBuf>,

    /// Output format: tui, json or md
    #[arg(long, global = true, default_value = "tui", value_parser = parse_format)]
    format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    json: bool,

    /// Shorthand for --format md
    #[arg(long, global = true, visible_alias = "markdown")]
    md: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Registry index used by `install`
    #[arg(long, global = true, env = "NEXUS_REGISTRY", default_value = DEFAULT_REGISTRY_URL)]
    registry: String,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else if self.md {
            OutputFormat::Markdown
        } else {
            self.format
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script file (`-` reads the script from stdin)
    Run {
        file: String,

        /// Exposed to the script as ARGS
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Run inline code
    Exec {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        code: Vec<String>,
    },

    /// Run an installed entity (same as `nexus @entity ...`)
    Call {
        entity: String,

        /// Command name followed by its arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Install an entity from the registry
    Install { entity: String },

    /// Install an entity from a URL or a local file
    Add { entity: String, source: String },

    /// Remove an installed entity
    Remove { entity: String },

    /// List installed entities
    List,

    /// Fetch a URL and print the body
    Fetch { url: String },

    /// Manage the secrets vault
    Vault {
        #[command(subcommand)]
        action: VaultAction,
    },

    #[command(external_subcommand)]
    External(Vec<String>),
}

#[derive(Subcommand)]
enum VaultAction {
    /// Store a secret (prompts when no value is given)
    Set {
        /// Name of the secret
        key: String,
        value: Option<String>,
    },

    /// Print a secret
    Get {
        /// Name of the secret
        key: String,
    },

    /// List all stored secrets
    List,

    /// Delete a secret
    Delete {
        /// Name of the secret
        key: String,
    },
}

enum Job {
    File {
        path: PathBuf,
        command: String,
        args: Vec<String>,
    },
    Inline(String),
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout carries reports
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse_from(hoist_format_flags(std::env::args()));
    let format = cli.output_format();
    let color = !cli.no_color && format == OutputFormat::Tui && io::stdout().is_tty();
    let theme = if color { Theme::default() } else { Theme::plain() };
    let printer = Printer::new(format, theme);

    // The HTTP transport is blocking, so every command runs off the async workers
    let task = tokio::task::spawn_blocking(move || match dispatch(cli, color, &printer) {
        Ok(code) => code,
        Err(e) => {
            printer.error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    });

    tokio::select! {
        joined = task => joined.unwrap_or_else(|e| {
            eprintln!("nexus: {}", e);
            ExitCode::FAILURE
        }),
        Ok(()) = tokio::signal::ctrl_c() => {
            // A running script cannot be cancelled; leave without waiting for it
            eprintln!();
            std::process::exit(INTERRUPTED)
        }
    }
}

fn dispatch(cli: Cli, color: bool, printer: &Printer) -> Result<ExitCode> {
    let home = resolve_home(cli.home.clone())?;
    let config = HostConfig::new(&home)
        .with_format(printer.format())
        .with_color(color);

    match cli.command {
        Commands::Run { file, args } => {
            let job = if file == "-" {
                let mut code = String::new();
                io::stdin()
                    .read_to_string(&mut code)
                    .context("reading script from stdin")?;
                Job::Inline(code)
            } else {
                Job::File {
                    path: PathBuf::from(&file),
                    command: file,
                    args,
                }
            };
            run_script(config, job)
        }

        Commands::Exec { code } => run_script(config, Job::Inline(code.join(" "))),

        Commands::Call { entity, args } => call_entity(config, &entity, args),

        Commands::External(words) => match words.split_first() {
            Some((first, rest)) if first.starts_with('@') => {
                call_entity(config, first, rest.to_vec())
            }
            Some((first, _)) => bail!("unknown command '{}' (see `nexus --help`)", first),
            None => bail!("no command given (see `nexus --help`)"),
        },

        Commands::Install { entity } => {
            let name = entity_name(&entity)?;
            printer.info(&format!("Installing @{}...", name));
            let http = HttpClient::new(config.http)?;
            let entry = RegistryClient::new(&http, &cli.registry).resolve(name)?;
            printer.muted(&format!("Resolved to: {}", entry.url));
            install(&home, &http, name, &entry.url, printer)
        }

        Commands::Add { entity, source } => {
            let name = entity_name(&entity)?;
            printer.info(&format!("Installing @{}...", name));
            let http = HttpClient::new(config.http)?;
            install(&home, &http, name, &source, printer)
        }

        Commands::Remove { entity } => {
            let name = entity_name(&entity)?;
            if EntityStore::open(&home)?.remove(name)? {
                printer.success(&format!("Entity @{} removed", name));
                Ok(ExitCode::SUCCESS)
            } else {
                printer.error(&format!("Entity @{} is not installed", name));
                Ok(ExitCode::FAILURE)
            }
        }

        Commands::List => {
            list_entities(&EntityStore::open(&home)?, printer);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Fetch { url } => {
            let http = HttpClient::new(config.http)?;
            let response = http.get(&url)?;
            if printer.is_json() {
                printer.json(&json!({ "status": response.status, "body": response.body }));
            } else {
                println!("{}", response.body);
            }
            Ok(if (200..300).contains(&response.status) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Vault { action } => vault(&home, action, printer),
    }
}

fn parse_format(raw: &str) -> Result<OutputFormat, String> {
    raw.parse()
}

/// `--json` / `--md` are honored anywhere on the line, even after script
/// arguments. Anything after `--` is left alone.
fn hoist_format_flags(args: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut args = args.into_iter();
    let mut hoisted: Vec<String> = args.next().into_iter().collect();
    let mut rest = Vec::new();
    let mut passthrough = false;

    for arg in args {
        if !passthrough && matches!(arg.as_str(), "--json" | "--md" | "--markdown") {
            hoisted.push(arg);
            continue;
        }
        if arg == "--" {
            passthrough = true;
        }
        rest.push(arg);
    }

    hoisted.extend(rest);
    hoisted
}

fn resolve_home(flag: Option<PathBuf>) -> Result<PathBuf> {
    match flag {
        Some(home) => Ok(home),
        None => dirs::home_dir()
            .map(|home| home.join(".nexus"))
            .context("cannot determine the home directory; pass --home or set NEXUS_HOME"),
    }
}

/// The runtime reports the outcome itself; only the exit status is left
fn run_script(config: HostConfig, job: Job) -> Result<ExitCode> {
    let mut runtime = Runtime::new(config).context("starting the script host")?;
    let outcome = match job {
        Job::File {
            path,
            command,
            args,
        } => runtime.run_with_args(&path, &command, &args),
        Job::Inline(code) => runtime.run_inline(&code),
    };
    Ok(if outcome.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn call_entity(config: HostConfig, entity: &str, args: Vec<String>) -> Result<ExitCode> {
    let name = entity_name(entity)?;
    let store = EntityStore::open(&config.home)?;
    let Some(path) = store.script_path(name) else {
        bail!("entity @{} is not installed (try `nexus install @{}`)", name, name);
    };

    let mut args = args.into_iter();
    let command = args.next().unwrap_or_default();
    run_script(
        config,
        Job::File {
            path,
            command,
            args: args.collect(),
        },
    )
}

fn install(
    home: &Path,
    http: &HttpClient,
    name: &str,
    source: &str,
    printer: &Printer,
) -> Result<ExitCode> {
    let content = read_source(http, source)?;
    let mut store = EntityStore::open(home)?;
    let path = store.install(name, &content)?;
    printer.success(&format!("Entity @{} installed ({})", name, path.display()));
    Ok(ExitCode::SUCCESS)
}

fn list_entities(store: &EntityStore, printer: &Printer) {
    match printer.format() {
        OutputFormat::Json => printer.json(&json!(store.entities())),
        OutputFormat::Markdown => {
            println!("## Installed entities\n");
            for (name, file) in store.entities() {
                println!("- `@{}` -> {}", name, file);
            }
        }
        OutputFormat::Tui => {
            if store.entities().is_empty() {
                printer.muted("No entities installed.");
                printer.info("Use 'nexus install @name' or 'nexus add @name <url|file>' to install one.");
                return;
            }
            printer.info("Installed entities:");
            for (name, file) in store.entities() {
                println!("  @{} -> {}", name, file);
            }
        }
    }
}

fn vault(home: &Path, action: VaultAction, printer: &Printer) -> Result<ExitCode> {
    let vault = SecureVault::new(home);

    match action {
        VaultAction::Set { key, value } => {
            let secret = match value {
                Some(value) => value,
                None => read_secret(&key)?,
            };
            vault.store(&key, &secret)?;
            printer.success(&format!("Stored secret '{}'", key));
        }

        VaultAction::Get { key } => match vault.reveal(&key) {
            Ok(Some(secret)) => {
                if printer.is_json() {
                    printer.json(&json!({ "key": key, "value": secret.expose_secret() }));
                } else {
                    println!("{}", secret.expose_secret());
                }
            }
            Ok(None) => {
                printer.error(&format!("Secret '{}' not found", key));
                return Ok(ExitCode::FAILURE);
            }
            Err(e) => {
                printer.error(&format!("Secret '{}' could not be decrypted: {}", key, e));
                return Ok(ExitCode::FAILURE);
            }
        },

        VaultAction::List => {
            let keys = vault.list_keys()?;
            if printer.is_json() {
                printer.json(&json!(keys));
            } else if keys.is_empty() {
                printer.muted("Vault is empty.");
            } else {
                for key in keys {
                    println!("  {}", key);
                }
            }
        }

        VaultAction::Delete { key } => {
            if !vault.delete(&key)? {
                printer.error(&format!("Secret '{}' not found", key));
                return Ok(ExitCode::FAILURE);
            }
            printer.success(&format!("Deleted secret '{}'", key));
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Hidden prompt on a terminal, otherwise one line from stdin
fn read_secret(key: &str) -> Result<String> {
    if io::stdin().is_tty() {
        return dialoguer::Password::new()
            .with_prompt(format!("Secret for '{}'", key))
            .interact()
            .context("reading secret");
    }
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading secret from stdin")?;
    Ok(line.trim_end_matches(|c| c == '\n' || c == '\r').to_string())
}
