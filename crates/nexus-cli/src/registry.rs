//! Remote entity registry: a JSON index `{name: {url, description}}`

use anyhow::{anyhow, bail, Context, Result};
use nexus_net::HttpClient;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use tracing::debug;

pub const DEFAULT_REGISTRY_URL: &str =
    "https://raw.githubusercontent.com/MrJc01/nexus-scripts/main/registry.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub url: String,
    #[serde(default)]
    pub description: String,
}

pub type RegistryIndex = BTreeMap<String, RegistryEntry>;

pub struct RegistryClient<'a> {
    http: &'a HttpClient,
    url: String,
}

impl<'a> RegistryClient<'a> {
    pub fn new(http: &'a HttpClient, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    pub fn fetch_index(&self) -> Result<RegistryIndex> {
        let response = self
            .http
            .get(&self.url)
            .with_context(|| format!("fetching registry {}", self.url))?;
        if response.status != 200 {
            bail!("registry returned status {}", response.status);
        }
        serde_json::from_str(&response.body).context("parsing registry index")
    }

    pub fn resolve(&self, name: &str) -> Result<RegistryEntry> {
        let mut index = self.fetch_index()?;
        debug!(registry = %self.url, entries = index.len(), "registry fetched");
        index
            .remove(name)
            .ok_or_else(|| anyhow!("entity @{} not found in registry", name))
    }
}

/// Script text from an `http(s)://` URL or a local file
pub fn read_source(http: &HttpClient, source: &str) -> Result<String> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let response = http
            .get(source)
            .with_context(|| format!("downloading {}", source))?;
        if !(200..300).contains(&response.status) {
            bail!("{} returned status {}", source, response.status);
        }
        Ok(response.body)
    } else {
        fs::read_to_string(source).with_context(|| format!("reading {}", source))
    }
}
