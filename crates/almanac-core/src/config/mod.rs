//! Client configuration: Supabase project, data directory, and sync timing.
//!
//! Values come from a JSON file and can be overridden by environment
//! variables. The anon key is a publishable key; secrets never belong here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::resolve_optional_supabase_config;
use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

pub const ENV_SUPABASE_URL: &str = "ALMANAC_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "ALMANAC_SUPABASE_ANON_KEY";
pub const ENV_DATA_DIR: &str = "ALMANAC_DATA_DIR";

const DATABASE_FILE_NAME: &str = "almanac.db";

/// Sync scheduler timing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    /// Quiet period after the last mutation before a sync starts
    pub debounce_ms: u64,
    /// Periodic sync interval while signed in and online
    pub interval_secs: u64,
    /// How long `success` stays visible before reverting to `idle`
    pub success_display_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 2_000,
            interval_secs: 60,
            success_display_ms: 3_000,
        }
    }
}

impl SyncSettings {
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub const fn success_display(&self) -> Duration {
        Duration::from_millis(self.success_display_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(Error::InvalidInput(
                "sync.interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AlmanacConfig {
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
    /// Where the local database lives; the caller's platform default when unset
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub sync: SyncSettings,
}

impl AlmanacConfig {
    /// Read a config file; a missing file yields the defaults
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&raw)?;
        config.normalize();
        config.sync.validate()?;
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut normalized = self.clone();
        normalized.normalize();
        std::fs::write(path, serde_json::to_string_pretty(&normalized)?)?;
        Ok(())
    }

    /// Apply `ALMANAC_*` overrides from the process environment
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `ALMANAC_*` overrides read through `lookup`
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = normalize_text_option(lookup(ENV_SUPABASE_URL)) {
            self.supabase_url = Some(url);
        }
        if let Some(key) = normalize_text_option(lookup(ENV_SUPABASE_ANON_KEY)) {
            self.supabase_anon_key = Some(key);
        }
        if let Some(dir) = normalize_text_option(lookup(ENV_DATA_DIR)) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        self
    }

    /// `(url, anon_key)` when both are set; an error when only one is
    pub fn supabase(&self) -> Result<Option<(String, String)>> {
        let resolved = resolve_optional_supabase_config(
            self.supabase_url.clone(),
            self.supabase_anon_key.clone(),
        )
        .map_err(|error| Error::InvalidInput(error.to_string()))?;
        if let Some((url, _)) = &resolved {
            if !is_http_url(url) {
                return Err(Error::InvalidInput(
                    "supabase_url must include http:// or https://".to_string(),
                ));
            }
        }
        Ok(resolved)
    }

    /// Database file inside the configured data dir, or inside `fallback_dir`
    pub fn database_path(&self, fallback_dir: &Path) -> PathBuf {
        self.data_dir
            .as_deref()
            .unwrap_or(fallback_dir)
            .join(DATABASE_FILE_NAME)
    }

    fn normalize(&mut self) {
        self.supabase_url = normalize_text_option(self.supabase_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
        self.supabase_anon_key = normalize_text_option(self.supabase_anon_key.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AlmanacConfig::load_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, AlmanacConfig::default());
        assert_eq!(config.sync.debounce(), Duration::from_secs(2));
        assert_eq!(config.sync.interval(), Duration::from_secs(60));
    }

    #[test]
    fn config_roundtrip_normalizes_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = AlmanacConfig {
            supabase_url: Some(" https://project.supabase.co/ ".to_string()),
            supabase_anon_key: Some(" anon-key ".to_string()),
            data_dir: None,
            sync: SyncSettings {
                debounce_ms: 500,
                ..SyncSettings::default()
            },
        };

        config.save_to_path(&path).unwrap();
        let loaded = AlmanacConfig::load_from_path(&path).unwrap();
        assert_eq!(
            loaded.supabase_url.as_deref(),
            Some("https://project.supabase.co")
        );
        assert_eq!(loaded.supabase_anon_key.as_deref(), Some("anon-key"));
        assert_eq!(loaded.sync.debounce(), Duration::from_millis(500));
    }

    #[test]
    fn partial_sync_section_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "sync": { "interval_secs": 15 } }"#).unwrap();

        let loaded = AlmanacConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.sync.interval_secs, 15);
        assert_eq!(loaded.sync.debounce_ms, 2_000);

        std::fs::write(&path, r#"{ "sync": { "interval_secs": 0 } }"#).unwrap();
        assert!(AlmanacConfig::load_from_path(&path).is_err());
    }

    #[test]
    fn environment_overrides_file_values() {
        let config = AlmanacConfig {
            supabase_url: Some("https://file.supabase.co".to_string()),
            ..AlmanacConfig::default()
        }
        .with_overrides(|key| match key {
            ENV_SUPABASE_URL => Some("https://env.supabase.co".to_string()),
            ENV_SUPABASE_ANON_KEY => Some("env-key".to_string()),
            ENV_DATA_DIR => Some("  ".to_string()),
            _ => None,
        });

        assert_eq!(
            config.supabase().unwrap(),
            Some((
                "https://env.supabase.co".to_string(),
                "env-key".to_string()
            ))
        );
        assert_eq!(config.data_dir, None);
    }

    #[test]
    fn half_configured_supabase_is_an_error() {
        let config = AlmanacConfig {
            supabase_url: Some("https://only-url.supabase.co".to_string()),
            ..AlmanacConfig::default()
        };
        assert!(config.supabase().is_err());
        assert_eq!(AlmanacConfig::default().supabase().unwrap(), None);
    }

    #[test]
    fn database_path_prefers_configured_dir() {
        let fallback = Path::new("/tmp/fallback");
        assert_eq!(
            AlmanacConfig::default().database_path(fallback),
            fallback.join("almanac.db")
        );
        let configured = AlmanacConfig {
            data_dir: Some(PathBuf::from("/data")),
            ..AlmanacConfig::default()
        };
        assert_eq!(configured.database_path(fallback), Path::new("/data/almanac.db"));
    }
}
