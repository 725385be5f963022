//! Error taxonomy
//!
//! Every failure a run can produce maps onto one [`ErrorKind`]. Capability
//! faults are carried as [`CapabilityError`] up to the lifecycle manager,
//! which turns whatever it receives into exactly one [`RunError`].

use nexus_crypto::VaultError;
use nexus_net::NetError;
use nexus_sandbox::SandboxError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    FileError,
    ScriptException,
    RuntimePanic,
    NetworkError,
    EncryptError,
    DecryptError,
    SandboxViolation,
}

impl ErrorKind {
    /// Heading used in reports
    pub fn title(&self) -> &'static str {
        match self {
            ErrorKind::FileError => "File Error",
            ErrorKind::ScriptException => "Script Error",
            ErrorKind::RuntimePanic => "Runtime Panic",
            ErrorKind::NetworkError => "Network Error",
            ErrorKind::EncryptError => "Encryption Error",
            ErrorKind::DecryptError => "Decryption Error",
            ErrorKind::SandboxViolation => "Sandbox Violation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A fault raised by a host function while a script is calling it
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("{function}: {message}")]
    InvalidArgument { function: String, message: String },

    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CapabilityError {
    pub fn invalid(function: impl Into<String>, message: impl Into<String>) -> Self {
        CapabilityError::InvalidArgument {
            function: function.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CapabilityError::InvalidArgument { .. } | CapabilityError::Io(_) => {
                ErrorKind::RuntimePanic
            }
            CapabilityError::Net(_) => ErrorKind::NetworkError,
            CapabilityError::Sandbox(SandboxError::Violation(_)) => ErrorKind::SandboxViolation,
            CapabilityError::Sandbox(SandboxError::Net(_)) => ErrorKind::NetworkError,
            CapabilityError::Sandbox(SandboxError::Io(_)) => ErrorKind::RuntimePanic,
            CapabilityError::Vault(VaultError::Encrypt(_)) => ErrorKind::EncryptError,
            CapabilityError::Vault(VaultError::Decrypt(_)) => ErrorKind::DecryptError,
            CapabilityError::Vault(_) => ErrorKind::RuntimePanic,
        }
    }
}

/// The single failure reported for a run
#[derive(Error, Debug)]
pub enum RunError {
    /// Source could not be read; nothing was executed
    #[error("Could not read '{path}': {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The script threw, failed to parse, or misused the language
    #[error("{message}")]
    Script { message: String, stack: Vec<String> },

    /// Fault inside a capability call or the engine boundary
    #[error("[{cause}] {message}")]
    Panic { cause: ErrorKind, message: String },
}

impl RunError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RunError::File { .. } => ErrorKind::FileError,
            RunError::Script { .. } => ErrorKind::ScriptException,
            RunError::Panic { .. } => ErrorKind::RuntimePanic,
        }
    }

    /// Underlying kind; differs from `kind()` only for panics
    pub fn cause(&self) -> ErrorKind {
        match self {
            RunError::Panic { cause, .. } => *cause,
            other => other.kind(),
        }
    }

    pub fn title(&self) -> &'static str {
        self.kind().title()
    }

    /// Message body for reports, stack frames appended one per line
    pub fn report_message(&self) -> String {
        match self {
            RunError::Script { message, stack } if !stack.is_empty() => {
                let mut text = message.clone();
                for frame in stack {
                    text.push_str("\n    ");
                    text.push_str(frame);
                }
                text
            }
            other => other.to_string(),
        }
    }
}

impl From<CapabilityError> for RunError {
    fn from(err: CapabilityError) -> Self {
        RunError::Panic {
            cause: err.kind(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_crypto::CipherError;

    #[test]
    fn test_capability_kinds() {
        let violation = CapabilityError::from(SandboxError::Violation("../x".into()));
        assert_eq!(violation.kind(), ErrorKind::SandboxViolation);

        let decrypt = CapabilityError::from(VaultError::Decrypt(CipherError::DecryptionFailed));
        assert_eq!(decrypt.kind(), ErrorKind::DecryptError);

        let net = CapabilityError::from(NetError::InvalidRequest("bad".into()));
        assert_eq!(net.kind(), ErrorKind::NetworkError);

        let arg = CapabilityError::invalid("nexus::http::request", "missing url");
        assert_eq!(arg.kind(), ErrorKind::RuntimePanic);
    }

    #[test]
    fn test_capability_faults_become_panics() {
        let err = RunError::from(CapabilityError::from(SandboxError::Violation(
            "'../etc' climbs above the sandbox".into(),
        )));
        assert_eq!(err.kind(), ErrorKind::RuntimePanic);
        assert_eq!(err.cause(), ErrorKind::SandboxViolation);
        assert_eq!(err.title(), "Runtime Panic");
        assert!(err.to_string().starts_with("[SandboxViolation]"));
    }

    #[test]
    fn test_script_stack_in_report() {
        let err = RunError::Script {
            message: "boom".into(),
            stack: vec!["at helper (line 2, position 5)".into()],
        };
        assert_eq!(err.report_message(), "boom\n    at helper (line 2, position 5)");
        assert_eq!(err.title(), "Script Error");
    }
}
