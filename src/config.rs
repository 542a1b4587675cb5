//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/pcode.sqlite"
//!
//! [ingest]
//! timeout_secs = 120
//!
//! [search]
//! default_limit = 50
//!
//! [server]
//! bind = "127.0.0.1:8000"
//!
//! [models]
//! vendor_prefixes = ["Konica Minolta", "KonicaMinolta"]
//!
//! [models.aliases]
//! C6085 = "C6100"
//! C4070 = "C4080"
//! ```
//!
//! Only `[db]` is required. The alias table is validated here by building
//! the [`ModelResolver`] once, so a bad table fails at startup rather than
//! on the first import.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use printcode_core::resolver::ModelResolver;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub models: ModelsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Upper bound for one import transaction. An import that runs longer
    /// is cancelled and rolled back.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
        }
    }
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    #[serde(default = "default_vendor_prefixes")]
    pub vendor_prefixes: Vec<String>,
    /// Alias model name → canonical model name.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            vendor_prefixes: default_vendor_prefixes(),
            aliases: BTreeMap::new(),
        }
    }
}

fn default_vendor_prefixes() -> Vec<String> {
    vec!["Konica Minolta".to_string(), "KonicaMinolta".to_string()]
}

impl Config {
    /// Build the model resolver described by `[models]`.
    pub fn resolver(&self) -> Result<ModelResolver> {
        ModelResolver::new(
            self.models.aliases.iter(),
            self.models.vendor_prefixes.clone(),
        )
        .context("Invalid [models.aliases] table")
    }

    pub fn ingest_timeout(&self) -> Duration {
        Duration::from_secs(self.ingest.timeout_secs)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.ingest.timeout_secs == 0 {
        anyhow::bail!("ingest.timeout_secs must be > 0");
    }

    if config.search.default_limit < 1 {
        anyhow::bail!("search.default_limit must be >= 1");
    }

    config.resolver()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(body: &str) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pcode.toml");
        std::fs::write(&path, body).unwrap();
        (tmp, path)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let (_tmp, path) = write_config("[db]\npath = \"data/pcode.sqlite\"\n");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.ingest.timeout_secs, 120);
        assert_eq!(cfg.search.default_limit, 50);
        assert_eq!(cfg.server.bind, "127.0.0.1:8000");
        assert!(cfg.models.aliases.is_empty());
    }

    #[test]
    fn test_aliases_build_resolver() {
        let (_tmp, path) = write_config(
            "[db]\npath = \"x.sqlite\"\n\n[models.aliases]\nC6085 = \"C6100\"\n",
        );
        let cfg = load_config(&path).unwrap();
        let resolver = cfg.resolver().unwrap();
        assert_eq!(resolver.resolve("Konica Minolta C6085"), "C6100");
    }

    #[test]
    fn test_chained_aliases_rejected() {
        let (_tmp, path) = write_config(
            "[db]\npath = \"x.sqlite\"\n\n[models.aliases]\nA = \"B\"\nB = \"C\"\n",
        );
        let err = load_config(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("itself an alias"));
    }

    #[test]
    fn test_example_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/pcode.example.toml");
        let cfg = load_config(&path).unwrap();
        let resolver = cfg.resolver().unwrap();
        assert_eq!(resolver.resolve("KonicaMinolta C4065"), "C4080");
        assert_eq!(resolver.aliases_of("C6100"), vec!["C6080", "C6085"]);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let (_tmp, path) = write_config("[db]\npath = \"x.sqlite\"\n\n[ingest]\ntimeout_secs = 0\n");
        assert!(load_config(&path).is_err());
    }
}
