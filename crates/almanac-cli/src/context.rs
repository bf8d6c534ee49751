//! Resolved config plus the wiring that opens an [`Almanac`] for one command.

use std::path::PathBuf;
use std::sync::Arc;

use almanac_core::config::AlmanacConfig;
use almanac_core::remote::{PostgrestClient, RemoteError, RowClient};
use almanac_core::session::Principal;
use almanac_core::{Almanac, SessionContext};
use async_trait::async_trait;
use serde_json::Value;

use crate::auth::{self, CliAuthClient};
use crate::cli::GlobalArgs;
use crate::error::CliError;

const CONFIG_FILE_NAME: &str = "config.json";

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("almanac")
        .join(CONFIG_FILE_NAME)
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("almanac")
}

/// Stand-in backend when no Supabase project is configured.
///
/// The session never signs in without a project, so sync never reaches it.
struct Unconfigured;

#[async_trait]
impl RowClient for Unconfigured {
    async fn fetch_rows(&self, _: &Principal, _: &str) -> Result<Vec<Value>, RemoteError> {
        Err(RemoteError::Unauthenticated)
    }

    async fn upsert_rows(&self, _: &Principal, _: &str, _: Vec<Value>) -> Result<(), RemoteError> {
        Err(RemoteError::Unauthenticated)
    }

    async fn delete_row(&self, _: &Principal, _: &str, _: &str) -> Result<(), RemoteError> {
        Err(RemoteError::Unauthenticated)
    }
}

pub struct CliContext {
    pub config: AlmanacConfig,
    pub config_path: PathBuf,
    pub database_path: PathBuf,
    pub offline: bool,
}

impl CliContext {
    /// Config file, then `ALMANAC_*` variables, then command-line flags
    pub fn resolve(global: &GlobalArgs) -> Result<Self, CliError> {
        let config_path = global.config.clone().unwrap_or_else(default_config_path);
        let config = AlmanacConfig::load_from_path(&config_path)?.with_env_overrides();
        Ok(Self::from_parts(config, config_path, global))
    }

    pub fn from_parts(mut config: AlmanacConfig, config_path: PathBuf, global: &GlobalArgs) -> Self {
        if let Some(dir) = &global.data_dir {
            config.data_dir = Some(dir.clone());
        }
        let database_path = config.database_path(&default_data_dir());
        Self {
            config,
            config_path,
            database_path,
            offline: global.offline,
        }
    }

    pub fn auth_client(&self) -> Result<CliAuthClient, CliError> {
        let (url, anon_key) = self.config.supabase()?.ok_or(CliError::SyncNotConfigured)?;
        Ok(auth::auth_client(&url, &anon_key)?)
    }

    /// Open the local store and sign in from the keychain when a project is configured.
    ///
    /// Lists are loaded but no background scheduling starts; each command
    /// decides whether to flush or run a cycle.
    pub async fn open(&self) -> Result<Almanac, CliError> {
        let online = !self.offline;
        let (client, session): (Arc<dyn RowClient>, SessionContext) =
            if let Some((url, anon_key)) = self.config.supabase()? {
                let auth_service = auth::auth_client(&url, &anon_key)?;
                let restored = if online {
                    match auth_service.restore_session().await {
                        Ok(stored) => stored,
                        Err(error) => {
                            tracing::warn!("Could not restore session: {}", error);
                            None
                        }
                    }
                } else {
                    None
                };
                let session = SessionContext::with_auth(online, auth_service);
                match restored {
                    Some(stored) => session.sign_in(Principal::from(&stored)),
                    None => tracing::debug!("No stored session for {}", url),
                }
                let client: Arc<dyn RowClient> = Arc::new(PostgrestClient::new(url, anon_key)?);
                (client, session)
            } else {
                let client: Arc<dyn RowClient> = Arc::new(Unconfigured);
                (client, SessionContext::new(online))
            };

        let almanac =
            Almanac::open_path(&self.database_path, client, session, self.config.sync).await;
        if !almanac.is_persistent() {
            tracing::warn!(
                "Changes will not survive this run: {} could not be opened",
                self.database_path.display()
            );
        }
        almanac.load().await;
        Ok(almanac)
    }
}
