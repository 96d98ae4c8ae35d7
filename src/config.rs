//! Engine configuration.
//!
//! Loaded with precedence: Env vars > Config file > Defaults
//!
//! # Example config file (roadtwin.toml)
//! ```toml
//! catalog_path = "data/catalog.csv"
//! journal_dir = "data/shadows"
//! cache_match = "natural-key"
//!
//! [store]
//! kind = "http"
//! base_url = "http://localhost:1026"
//! tenant = "bologna"
//! timeout_ms = 3000
//!
//! [timestamp]
//! max_jitter_minutes = 10
//! ```
//!
//! Environment variables use the `ROADTWIN_` prefix and `__` between
//! sections: `ROADTWIN_STORE__BASE_URL=http://broker:1026`.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::shadow::CacheMatch;
use crate::storage::{StoreConfig, StoreKind};
use crate::{Error, Result};

pub const ENV_PREFIX: &str = "ROADTWIN_";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwinConfig {
    /// Lane-level catalog file (`;`-separated).
    pub catalog_path: PathBuf,
    /// Shadow journal directory. Journaling is off when unset.
    pub journal_dir: Option<PathBuf>,
    pub cache_match: CacheMatch,
    /// Also resolve (and journal) a loop shadow for every measurement.
    pub resolve_loop_shadows: bool,
    /// Seed the id counters from the store at startup.
    pub recover_counters: bool,
    pub store: StoreConfig,
    pub timestamp: TimestampConfig,
}

impl Default for TwinConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("catalog.csv"),
            journal_dir: None,
            cache_match: CacheMatch::NaturalKey,
            resolve_loop_shadows: false,
            recover_counters: true,
            store: StoreConfig::default(),
            timestamp: TimestampConfig::default(),
        }
    }
}

/// Observation timestamp settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimestampConfig {
    /// Upper bound of the random minutes added to the end of a slot.
    pub max_jitter_minutes: u32,
    /// Fixed RNG seed, for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for TimestampConfig {
    fn default() -> Self {
        Self { max_jitter_minutes: 10, seed: None }
    }
}

impl TwinConfig {
    /// Defaults, then the TOML file (if any), then `ROADTWIN_*` variables.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(TwinConfig::default()));
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: TwinConfig = figment.extract().map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.store.timeout_ms == 0 {
            return Err(Error::Config("store.timeout_ms must be positive".into()));
        }
        if self.store.kind == StoreKind::Http
            && self.store.base_url.as_deref().is_none_or(|u| u.trim().is_empty())
        {
            return Err(Error::Config("store.base_url is required when store.kind = \"http\"".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_are_valid() {
        let config = TwinConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timestamp.max_jitter_minutes, 10);
        assert_eq!(config.cache_match, CacheMatch::NaturalKey);
    }

    #[test]
    fn test_file_then_env_precedence() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "roadtwin.toml",
                r#"
                catalog_path = "data/catalog.csv"
                cache_match = "last-value"

                [store]
                kind = "http"
                base_url = "http://localhost:1026"
                timeout_ms = 3000
                "#,
            )?;
            jail.set_env("ROADTWIN_STORE__TIMEOUT_MS", "250");
            jail.set_env("ROADTWIN_TIMESTAMP__MAX_JITTER_MINUTES", "0");

            let config = TwinConfig::load(Some(Path::new("roadtwin.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.catalog_path, PathBuf::from("data/catalog.csv"));
            assert_eq!(config.cache_match, CacheMatch::LastValue);
            assert_eq!(config.store.kind, StoreKind::Http);
            assert_eq!(config.store.timeout_ms, 250);
            assert_eq!(config.timestamp.max_jitter_minutes, 0);
            Ok(())
        });
    }

    #[test]
    fn test_http_store_requires_base_url() {
        let mut config = TwinConfig::default();
        config.store.kind = StoreKind::Http;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        config.store.base_url = Some("http://localhost:1026".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = TwinConfig::default();
        config.store.timeout_ms = 0;
        assert!(config.validate().is_err());
    }
}
