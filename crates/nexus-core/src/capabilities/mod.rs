//! Built-in capability modules
//!
//! | key      | capability   |
//! |----------|--------------|
//! | `http`   | network      |
//! | `dom`    | markup       |
//! | `sys`    | filesystem   |
//! | `tui`    | presentation |
//! | `secure` | vault        |

pub mod filesystem;
pub mod markup;
pub mod network;
pub mod presentation;
pub mod vault;

pub use filesystem::FilesystemCapability;
pub use markup::MarkupCapability;
pub use network::NetworkCapability;
pub use presentation::{Console, PresentationCapability};
pub use vault::VaultCapability;
