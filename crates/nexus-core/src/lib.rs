//! Nexus Core - Script host, capability namespace and execution lifecycle
//!
//! This crate provides:
//! - The `nexus::*` capability namespace (http, dom, sys, tui, secure)
//! - A Rhai-backed interpreter behind the `Interpreter` seam
//! - `Runtime`, which runs one script per call and reports the outcome
//!   in TUI, JSON or Markdown form

pub mod capabilities;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod namespace;
pub mod output;
pub mod registry;
pub mod runtime;
pub mod theme;

pub use capabilities::{
    Console, FilesystemCapability, MarkupCapability, NetworkCapability, PresentationCapability,
    VaultCapability,
};
pub use config::{HostConfig, DATA_DIR, PRELUDE_FILE, SCRIPTS_DIR};
pub use context::{ExecutionContext, Phase};
pub use engine::{Bindings, EngineFault, Interpreter, RhaiInterpreter};
pub use error::{CapabilityError, ErrorKind, RunError};
pub use namespace::{Args, CapabilityModule, HostFunction, Namespace, ROOT};
pub use output::{MemorySink, OutputFormat, Reporter, Sink};
pub use registry::{Capability, ModuleKind, Registry};
pub use runtime::{Completion, RunResult, Runtime, RuntimeBuilder, INLINE_SOURCE};
pub use theme::{Theme, Tone};
