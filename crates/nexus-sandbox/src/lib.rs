//! Nexus Sandbox - confined filesystem access
//!
//! Scripts name files relative to one base directory. Every name is
//! resolved by [`PathJail`] before it reaches the filesystem; anything that
//! would land outside the base is refused with [`SandboxError::Violation`].

pub mod error;
pub mod fs;
pub mod jail;

pub use error::SandboxError;
pub use fs::{DirEntry, SandboxedFs, DOWNLOADS_DIR};
pub use jail::PathJail;
