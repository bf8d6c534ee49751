//! Supabase session handling for the CLI with keychain persistence.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(not(test))]
use keyring::Entry;

use almanac_core::auth::{AuthResult, SessionPersistence, SupabaseAuthClient};
pub use almanac_core::auth::{AuthError, AuthSession};

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "almanac-cli";

/// Keychain slot for one Supabase project's session
#[derive(Clone)]
pub struct KeychainSessionStore {
    username: String,
}

impl KeychainSessionStore {
    pub fn for_project(supabase_url: &str) -> Self {
        Self {
            username: format!("supabase_session:{}", supabase_url.trim_end_matches('/')),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> AuthResult<Entry> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username)
            .map_err(|error| AuthError::Storage(error.to_string()))
    }
}

impl SessionPersistence for KeychainSessionStore {
    #[cfg(not(test))]
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        match self.entry()?.get_password() {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(AuthError::Storage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        let guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::Storage(error.to_string()))?;
        guard
            .get(&self.username)
            .map(|raw| serde_json::from_str(raw))
            .transpose()
            .map_err(AuthError::from)
    }

    #[cfg(not(test))]
    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        let raw = serde_json::to_string(session)?;
        self.entry()?
            .set_password(&raw)
            .map_err(|error| AuthError::Storage(error.to_string()))
    }

    #[cfg(test)]
    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        let raw = serde_json::to_string(session)?;
        Self::test_store()
            .lock()
            .map_err(|error| AuthError::Storage(error.to_string()))?
            .insert(self.username.clone(), raw);
        Ok(())
    }

    #[cfg(not(test))]
    fn clear_session(&self) -> AuthResult<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(AuthError::Storage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn clear_session(&self) -> AuthResult<()> {
        Self::test_store()
            .lock()
            .map_err(|error| AuthError::Storage(error.to_string()))?
            .remove(&self.username);
        Ok(())
    }
}

/// Auth client bound to one project and its keychain slot
pub type CliAuthClient = SupabaseAuthClient<KeychainSessionStore>;

pub fn auth_client(supabase_url: &str, anon_key: &str) -> AuthResult<CliAuthClient> {
    SupabaseAuthClient::new(
        supabase_url,
        anon_key,
        KeychainSessionStore::for_project(supabase_url),
    )
}

#[cfg(test)]
mod tests {
    use almanac_core::auth::AuthUser;
    use pretty_assertions::assert_eq;

    use super::*;

    fn session(user_id: &str) -> AuthSession {
        AuthSession {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: 4_102_444_800,
            user: AuthUser {
                id: user_id.to_string(),
                email: Some(format!("{user_id}@example.com")),
            },
        }
    }

    #[test]
    fn sessions_are_kept_per_project() {
        let first = KeychainSessionStore::for_project("https://first.supabase.co/");
        let second = KeychainSessionStore::for_project("https://second.supabase.co");

        first.save_session(&session("ada")).unwrap();
        assert_eq!(first.load_session().unwrap(), Some(session("ada")));
        assert_eq!(second.load_session().unwrap(), None);

        first.clear_session().unwrap();
        assert_eq!(first.load_session().unwrap(), None);
        // Clearing an empty slot is fine
        first.clear_session().unwrap();
    }

    #[test]
    fn trailing_slash_maps_to_the_same_slot() {
        let with_slash = KeychainSessionStore::for_project("https://slash.supabase.co/");
        let without = KeychainSessionStore::for_project("https://slash.supabase.co");
        with_slash.save_session(&session("grace")).unwrap();
        assert_eq!(without.load_session().unwrap(), Some(session("grace")));
        without.clear_session().unwrap();
    }

    #[test]
    fn auth_client_rejects_blank_anon_key() {
        assert!(matches!(
            auth_client("https://demo.supabase.co", "  "),
            Err(AuthError::InvalidConfiguration(_))
        ));
    }
}
