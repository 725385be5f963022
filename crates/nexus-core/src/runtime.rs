//! Execution lifecycle manager
//!
//! One call to `run`, `run_inline` or `run_with_args` walks
//! Idle -> Loading -> Executing -> Completed | Failed -> Reported and emits
//! exactly one report. Nothing a script does can take the host down:
//! capability faults and panics inside the engine are caught here and
//! reported as Runtime Panic.

use crate::capabilities::{
    Console, FilesystemCapability, MarkupCapability, NetworkCapability, PresentationCapability,
    VaultCapability,
};
use crate::config::HostConfig;
use crate::context::{ExecutionContext, Phase};
use crate::engine::{Bindings, EngineFault, Interpreter, RhaiInterpreter};
use crate::error::{CapabilityError, ErrorKind, RunError};
use crate::output::{stderr_sink, stdout_sink, Reporter, Sink};
use crate::registry::{Capability, Registry};
use crate::theme::Theme;
use crossterm::tty::IsTty;
use nexus_crypto::SecureVault;
use nexus_net::HttpClient;
use nexus_sandbox::SandboxedFs;
use serde_json::Value;
use std::any::Any;
use std::fs;
use std::io::{self, BufRead, BufReader, ErrorKind as IoErrorKind};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info_span, warn};

/// Name used for inline code in reports and traces
pub const INLINE_SOURCE: &str = "inline";

/// A run that completed
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub value: Value,
    pub elapsed: Duration,
}

pub type RunResult = Result<Completion, RunError>;

pub struct Runtime {
    config: HostConfig,
    interpreter: Box<dyn Interpreter>,
    reporter: Reporter,
}

impl Runtime {
    /// Host on process stdio with the built-in capabilities
    pub fn new(config: HostConfig) -> Result<Self, CapabilityError> {
        RuntimeBuilder::new(config).build()
    }

    pub fn builder(config: HostConfig) -> RuntimeBuilder {
        RuntimeBuilder::new(config)
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Read the script at `path` and execute it
    pub fn run(&mut self, path: impl AsRef<Path>) -> RunResult {
        let path = path.as_ref();
        let ctx = ExecutionContext::new(path.display().to_string(), self.config.format);
        self.run_file(ctx, path)
    }

    /// Execute `code`; the final expression's value is part of the report
    pub fn run_inline(&mut self, code: &str) -> RunResult {
        let ctx = ExecutionContext::new(INLINE_SOURCE, self.config.format);
        self.drive(ctx, |ctx| {
            ctx.enter(Phase::Loading);
            Ok(code.to_string())
        }, true)
    }

    /// Execute the script at `path` with `COMMAND` and `ARGS` bound
    pub fn run_with_args(
        &mut self,
        path: impl AsRef<Path>,
        command: &str,
        args: &[String],
    ) -> RunResult {
        let path = path.as_ref();
        let ctx = ExecutionContext::new(path.display().to_string(), self.config.format)
            .with_args(command, args.to_vec());
        self.run_file(ctx, path)
    }

    fn run_file(&mut self, ctx: ExecutionContext, path: &Path) -> RunResult {
        self.drive(ctx, |ctx| {
            ctx.enter(Phase::Loading);
            fs::read_to_string(path).map_err(|source| RunError::File {
                path: path.display().to_string(),
                source,
            })
        }, false)
    }

    fn drive(
        &mut self,
        mut ctx: ExecutionContext,
        load: impl FnOnce(&mut ExecutionContext) -> Result<String, RunError>,
        inline: bool,
    ) -> RunResult {
        let span = info_span!(
            "run",
            run_id = %ctx.run_id,
            source = %ctx.source_name,
            started_at = %ctx.started_at.to_rfc3339(),
        );
        let _enter = span.enter();

        let outcome = load(&mut ctx).and_then(|source| {
            ctx.enter(Phase::Executing);
            self.execute(&ctx, &source)
        });

        let result = match outcome {
            Ok(value) => {
                ctx.enter(Phase::Completed);
                let elapsed = ctx.elapsed();
                self.reporter.success(&value, elapsed, inline);
                Ok(Completion { value, elapsed })
            }
            Err(err) => {
                ctx.enter(Phase::Failed);
                if err.kind() == ErrorKind::RuntimePanic {
                    warn!(cause = %err.cause(), error = %err, "recovered fault");
                } else {
                    debug!(kind = %err.kind(), error = %err, "run failed");
                }
                self.reporter.failure(&err);
                Err(err)
            }
        };
        ctx.enter(Phase::Reported);
        result
    }

    fn execute(&mut self, ctx: &ExecutionContext, source: &str) -> Result<Value, RunError> {
        let bindings = Bindings {
            command: &ctx.command,
            args: &ctx.args,
        };
        let interpreter = &mut self.interpreter;
        let name = ctx.source_name.as_str();

        match panic::catch_unwind(AssertUnwindSafe(|| {
            interpreter.execute(name, source, &bindings)
        })) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(EngineFault::Exception { message, stack })) => {
                Err(RunError::Script { message, stack })
            }
            Ok(Err(EngineFault::Capability(err))) => Err(err.into()),
            Err(payload) => Err(RunError::Panic {
                cause: ErrorKind::RuntimePanic,
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic inside the engine boundary".to_string()
    }
}

/// Assembles a [`Runtime`]: sinks, console input, HTTP client, extra capabilities
pub struct RuntimeBuilder {
    config: HostConfig,
    out: Option<Sink>,
    err: Option<Sink>,
    input: Option<(Box<dyn BufRead + Send>, bool)>,
    http: Option<Arc<HttpClient>>,
    extra: Vec<Box<dyn Capability>>,
}

impl RuntimeBuilder {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            out: None,
            err: None,
            input: None,
            http: None,
            extra: Vec::new(),
        }
    }

    pub fn output(mut self, out: Sink, err: Sink) -> Self {
        self.out = Some(out);
        self.err = Some(err);
        self
    }

    /// Prompt input; `interactive` enables hidden entry for masked prompts
    pub fn input(mut self, input: Box<dyn BufRead + Send>, interactive: bool) -> Self {
        self.input = Some((input, interactive));
        self
    }

    pub fn http_client(mut self, client: Arc<HttpClient>) -> Self {
        self.http = Some(client);
        self
    }

    /// Attach one more capability next to the built-in ones
    pub fn capability(mut self, capability: Box<dyn Capability>) -> Self {
        self.extra.push(capability);
        self
    }

    pub fn build(self) -> Result<Runtime, CapabilityError> {
        let config = self.config;
        let theme = if config.color {
            Theme::default()
        } else {
            Theme::plain()
        };
        let out = self.out.unwrap_or_else(stdout_sink);
        let err = self.err.unwrap_or_else(stderr_sink);
        let (input, interactive) = self.input.unwrap_or_else(|| {
            let interactive = io::stdin().is_tty();
            let stdin: Box<dyn BufRead + Send> = Box::new(BufReader::new(io::stdin()));
            (stdin, interactive)
        });

        let http = match self.http {
            Some(client) => client,
            None => Arc::new(HttpClient::new(config.http)?),
        };
        let vault = Arc::new(SecureVault::new(config.vault_dir()));
        let fs = Arc::new(SandboxedFs::new(config.sandbox_dir(), http.clone()));
        let console = Arc::new(Console::new(out.clone(), input, interactive, theme.clone()));

        let mut registry = Registry::new();
        registry
            .add(Box::new(NetworkCapability::new(http)))
            .add(Box::new(MarkupCapability))
            .add(Box::new(FilesystemCapability::new(fs)))
            .add(Box::new(PresentationCapability::new(console)))
            .add(Box::new(VaultCapability::new(vault)));
        for capability in self.extra {
            registry.add(capability);
        }

        let mut interpreter = RhaiInterpreter::new(&registry.build(), out.clone());
        load_prelude(&mut interpreter, &config.prelude_path());

        let reporter = Reporter::new(config.format, theme, out, err);
        Ok(Runtime {
            config,
            interpreter: Box::new(interpreter),
            reporter,
        })
    }
}

/// A missing prelude is normal; a broken one is logged and skipped
fn load_prelude(interpreter: &mut dyn Interpreter, path: &Path) {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) if e.kind() == IoErrorKind::NotFound => return,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "prelude unreadable");
            return;
        }
    };
    match interpreter.load_prelude(&path.display().to_string(), &source) {
        Ok(count) => debug!(path = %path.display(), functions = count, "prelude loaded"),
        Err(EngineFault::Exception { message, .. }) => {
            warn!(path = %path.display(), error = %message, "prelude ignored")
        }
        Err(EngineFault::Capability(e)) => {
            warn!(path = %path.display(), error = %e, "prelude ignored")
        }
    }
}
