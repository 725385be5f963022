//! Installed entities: `<home>/config.json` maps entity name -> script file
//! under `<home>/scripts/`.

use anyhow::{bail, Context, Result};
use nexus_core::SCRIPTS_DIR;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{info, warn};

pub const CONFIG_FILE: &str = "config.json";
pub const SCRIPT_EXTENSION: &str = "rhai";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    #[serde(default)]
    pub entities: BTreeMap<String, String>,
}

pub struct EntityStore {
    home: PathBuf,
    config: EntityConfig,
}

impl EntityStore {
    /// Open the store under `home`, creating the scripts directory.
    /// An unreadable config is logged and treated as empty.
    pub fn open(home: impl Into<PathBuf>) -> Result<Self> {
        let home = home.into();
        let scripts = home.join(SCRIPTS_DIR);
        fs::create_dir_all(&scripts)
            .with_context(|| format!("creating {}", scripts.display()))?;

        let path = home.join(CONFIG_FILE);
        let config = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "ignoring malformed entity config");
                EntityConfig::default()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => EntityConfig::default(),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };

        Ok(Self { home, config })
    }

    pub fn entities(&self) -> &BTreeMap<String, String> {
        &self.config.entities
    }

    pub fn script_path(&self, name: &str) -> Option<PathBuf> {
        self.config
            .entities
            .get(name)
            .map(|file| self.home.join(SCRIPTS_DIR).join(file))
    }

    /// Write `content` as the script for `name` and record the mapping
    pub fn install(&mut self, name: &str, content: &str) -> Result<PathBuf> {
        let file = format!("{}.{}", name, SCRIPT_EXTENSION);
        let path = self.home.join(SCRIPTS_DIR).join(&file);
        fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;

        self.config.entities.insert(name.to_string(), file);
        self.save()?;
        info!(entity = name, path = %path.display(), "installed entity");
        Ok(path)
    }

    /// Forget `name` and delete its script. Returns whether it was installed.
    pub fn remove(&mut self, name: &str) -> Result<bool> {
        let Some(path) = self.script_path(name) else {
            return Ok(false);
        };
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("removing {}", path.display())),
        }

        self.config.entities.remove(name);
        self.save()?;
        info!(entity = name, "removed entity");
        Ok(true)
    }

    fn save(&self) -> Result<()> {
        let path = self.home.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(&self.config)?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))
    }
}

/// Accept `name` or `@name`; names become file names so they stay simple
pub fn entity_name(raw: &str) -> Result<&str> {
    let name = raw.strip_prefix('@').unwrap_or(raw);
    if name.is_empty() {
        bail!("entity name is empty");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        bail!("invalid entity name '{}': use letters, digits, '-' or '_'", name);
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_resolve_remove() {
        let home = tempfile::tempdir().unwrap();
        let mut store = EntityStore::open(home.path()).unwrap();
        assert!(store.entities().is_empty());

        let path = store.install("weather", "print(1);").unwrap();
        assert_eq!(path, home.path().join("scripts/weather.rhai"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "print(1);");
        assert_eq!(store.script_path("weather"), Some(path.clone()));

        let reopened = EntityStore::open(home.path()).unwrap();
        assert_eq!(reopened.entities().get("weather").unwrap(), "weather.rhai");

        assert!(store.remove("weather").unwrap());
        assert!(!path.exists());
        assert!(!store.remove("weather").unwrap());
        assert_eq!(store.script_path("weather"), None);
    }

    #[test]
    fn test_config_file_shape() {
        let home = tempfile::tempdir().unwrap();
        let mut store = EntityStore::open(home.path()).unwrap();
        store.install("ip", "1").unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(home.path().join(CONFIG_FILE)).unwrap())
                .unwrap();
        assert_eq!(raw, serde_json::json!({ "entities": { "ip": "ip.rhai" } }));
    }

    #[test]
    fn test_malformed_config_is_empty() {
        let home = tempfile::tempdir().unwrap();
        fs::write(home.path().join(CONFIG_FILE), "{ not json").unwrap();
        let store = EntityStore::open(home.path()).unwrap();
        assert!(store.entities().is_empty());
    }

    #[test]
    fn test_reinstall_overwrites() {
        let home = tempfile::tempdir().unwrap();
        let mut store = EntityStore::open(home.path()).unwrap();
        store.install("news", "old").unwrap();
        let path = store.install("news", "new").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "new");
        assert_eq!(store.entities().len(), 1);
    }

    #[test]
    fn test_entity_name() {
        assert_eq!(entity_name("@google").unwrap(), "google");
        assert_eq!(entity_name("hacker_news-2").unwrap(), "hacker_news-2");
        assert!(entity_name("@").is_err());
        assert!(entity_name("../etc").is_err());
        assert!(entity_name("a/b").is_err());
    }
}
