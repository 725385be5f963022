//! `nexus::sys` - sandboxed files, downloads and a few process helpers

use crate::namespace::Namespace;
use crate::registry::{Capability, ModuleKind};
use nexus_sandbox::SandboxedFs;
use serde_json::{json, Value};
use std::io;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Hands a URL or path to whatever launches it on this desktop.
pub type Opener = Arc<dyn Fn(&str) -> io::Result<()> + Send + Sync>;

pub struct FilesystemCapability {
    fs: Arc<SandboxedFs>,
    opener: Opener,
}

impl FilesystemCapability {
    pub fn new(fs: Arc<SandboxedFs>) -> Self {
        Self::with_opener(fs, Arc::new(platform_open))
    }

    pub fn with_opener(fs: Arc<SandboxedFs>, opener: Opener) -> Self {
        Self { fs, opener }
    }
}

/// Start the platform opener and return without waiting for it.
fn platform_open(target: &str) -> io::Result<()> {
    let mut command = if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", ""]);
        c
    } else if cfg!(target_os = "macos") {
        Command::new("open")
    } else {
        Command::new("xdg-open")
    };
    let mut child = command
        .arg(target)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    // reap in the background so the opener never blocks the script
    std::thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(())
}

impl Capability for FilesystemCapability {
    fn key(&self) -> &str {
        ModuleKind::Filesystem.key()
    }

    fn register(&self, namespace: &mut Namespace) {
        let module = namespace.module(self.key());

        let fs = self.fs.clone();
        module.function("save", 2..=2, move |args| {
            fs.save(&args.string(0)?, &args.display(1))?;
            Ok(json!(true))
        });

        let fs = self.fs.clone();
        module.function("load", 1..=1, move |args| {
            Ok(fs.load(&args.string(0)?)?.map(Value::String).unwrap_or(Value::Null))
        });

        let fs = self.fs.clone();
        module.function("exists", 1..=1, move |args| {
            Ok(json!(fs.exists(&args.string(0)?)?))
        });

        let fs = self.fs.clone();
        module.function("listDir", 0..=1, move |args| {
            let dir = args.opt_string(0)?.unwrap_or_default();
            let entries = fs.list_dir(&dir)?;
            serde_json::to_value(entries).map_err(|e| args.invalid(e.to_string()))
        });

        let fs = self.fs.clone();
        module.function("mkdir", 1..=1, move |args| {
            fs.mkdir(&args.string(0)?)?;
            Ok(json!(true))
        });

        let fs = self.fs.clone();
        module.function("remove", 1..=1, move |args| {
            Ok(json!(fs.remove(&args.string(0)?)?))
        });

        let fs = self.fs.clone();
        module.function("download", 2..=2, move |args| {
            Ok(json!(fs.download(&args.string(0)?, &args.string(1)?)?))
        });

        let opener = self.opener.clone();
        module.function("open", 1..=1, move |args| {
            let target = args.string(0)?;
            if target.trim().is_empty() {
                return Err(args.invalid("expected a URL or path"));
            }
            match opener(&target) {
                Ok(()) => {
                    debug!(target = %target, "opened");
                    Ok(json!(true))
                }
                Err(e) => {
                    warn!(target = %target, error = %e, "could not launch opener");
                    Ok(json!(false))
                }
            }
        });

        module.function("env", 1..=1, |args| {
            Ok(json!(std::env::var(args.string(0)?).unwrap_or_default()))
        });

        module.function("wait", 1..=1, |args| {
            std::thread::sleep(Duration::from_millis(args.u64(0)?));
            Ok(Value::Null)
        });
    }
}
