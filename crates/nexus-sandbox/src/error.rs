use nexus_net::NetError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("sandbox violation: {0}")]
    Violation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Net(#[from] NetError),
}
