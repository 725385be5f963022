//! Host instance configuration

use crate::output::OutputFormat;
use nexus_net::ClientSettings;
use std::path::{Path, PathBuf};

/// Sandbox base under the home directory. Kept apart from the vault files.
pub const DATA_DIR: &str = "data";
/// Installed entity scripts
pub const SCRIPTS_DIR: &str = "scripts";
/// Helper prelude, relative to home
pub const PRELUDE_FILE: &str = "lib/prelude.rhai";

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub home: PathBuf,
    pub format: OutputFormat,
    pub http: ClientSettings,
    pub color: bool,
}

impl HostConfig {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            format: OutputFormat::default(),
            http: ClientSettings::default(),
            color: true,
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Holds `vault.key` and `vault.enc`
    pub fn vault_dir(&self) -> &Path {
        &self.home
    }

    pub fn sandbox_dir(&self) -> PathBuf {
        self.home.join(DATA_DIR)
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.home.join(SCRIPTS_DIR)
    }

    pub fn prelude_path(&self) -> PathBuf {
        self.home.join(PRELUDE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = HostConfig::new("/tmp/nexus-home");
        assert_eq!(config.format, OutputFormat::Tui);
        assert_eq!(config.http.timeout, Duration::from_secs(30));
        assert_eq!(config.http.retry.retries, 3);
        assert_eq!(config.http.retry.base_delay, Duration::from_millis(500));
        assert!(config.color);
    }

    #[test]
    fn test_layout() {
        let config = HostConfig::new("/tmp/nexus-home");
        assert_eq!(config.vault_dir(), Path::new("/tmp/nexus-home"));
        assert_eq!(config.sandbox_dir(), Path::new("/tmp/nexus-home/data"));
        assert_eq!(config.prelude_path(), Path::new("/tmp/nexus-home/lib/prelude.rhai"));
        assert_eq!(config.scripts_dir(), Path::new("/tmp/nexus-home/scripts"));
    }
}
