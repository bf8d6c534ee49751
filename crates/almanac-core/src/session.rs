//! Explicit session context: who is signed in and whether the network is reachable.
//!
//! Created on session start and torn down on sign-out; the scheduler and the
//! remote adapter receive it at construction instead of reading ambient state.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::{broadcast, watch, Mutex};

use crate::auth::{AuthResult, AuthSession, SessionPersistence, SupabaseAuthClient};

/// The authenticated user as seen by the remote backend
#[derive(Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub access_token: String,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
        }
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Principal")
            .field("user_id", &self.user_id)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl From<&AuthSession> for Principal {
    fn from(session: &AuthSession) -> Self {
        Self::new(session.user.id.clone(), session.access_token.clone())
    }
}

/// The two signals that gate synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Connectivity {
    pub authenticated: bool,
    pub online: bool,
}

impl Connectivity {
    /// The sync precondition: authenticated and online
    #[must_use]
    pub const fn can_sync(self) -> bool {
        self.authenticated && self.online
    }
}

/// Session lifecycle notifications for the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { user_id: String },
    SignedOut,
    /// The backend reported the identity as invalid; the UI should send the user to sign-in
    ForcedSignOut { reason: String },
}

/// Exchanges the persisted refresh token for a new access token
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh_principal(&self) -> AuthResult<Principal>;
}

type ClearSession = Box<dyn Fn() -> Result<(), String> + Send + Sync>;

struct SessionInner {
    principal: RwLock<Option<Principal>>,
    connectivity: watch::Sender<Connectivity>,
    events: broadcast::Sender<SessionEvent>,
    clear_persisted: Option<ClearSession>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    refreshing: Mutex<()>,
}

/// Shared handle to the current session state
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<SessionInner>,
}

impl SessionContext {
    /// Start a signed-out context
    pub fn new(online: bool) -> Self {
        Self::build(online, None, None)
    }

    /// Start a signed-out context whose forced sign-out also clears `store`
    pub fn with_persistence<S: SessionPersistence>(online: bool, store: S) -> Self {
        Self::build(online, Some(clear_with(store)), None)
    }

    /// Like [`with_persistence`](Self::with_persistence), and expired access
    /// tokens are renewed through `auth`
    pub fn with_auth<S: SessionPersistence>(online: bool, auth: SupabaseAuthClient<S>) -> Self {
        let clear = clear_with(auth.store().clone());
        Self::build(online, Some(clear), Some(Arc::new(auth)))
    }

    /// Start a signed-out context that renews expired tokens through `refresher`
    pub fn with_refresher(online: bool, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self::build(online, None, Some(refresher))
    }

    fn build(
        online: bool,
        clear_persisted: Option<ClearSession>,
        refresher: Option<Arc<dyn TokenRefresher>>,
    ) -> Self {
        let (connectivity, _) = watch::channel(Connectivity {
            authenticated: false,
            online,
        });
        let (events, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(SessionInner {
                principal: RwLock::new(None),
                connectivity,
                events,
                clear_persisted,
                refresher,
                refreshing: Mutex::new(()),
            }),
        }
    }

    pub fn sign_in(&self, principal: Principal) {
        let user_id = principal.user_id.clone();
        *self
            .inner
            .principal
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(principal);
        self.update(|state| state.authenticated = true);
        tracing::info!("Session started for user {}", user_id);
        let _ = self.inner.events.send(SessionEvent::SignedIn { user_id });
    }

    /// Replace the access token after a refresh without signalling a new session
    pub fn refresh(&self, principal: Principal) {
        let mut current = self
            .inner
            .principal
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if current.is_some() {
            *current = Some(principal);
        }
    }

    /// Renew the access token after the backend reported `stale` as expired.
    ///
    /// Concurrent callers share one refresh. `true` when a newer token is in
    /// place; a failed refresh leaves the session signed in.
    pub async fn refresh_access_token(&self, stale: &Principal) -> bool {
        let Some(refresher) = &self.inner.refresher else {
            return false;
        };
        let _refreshing = self.inner.refreshing.lock().await;
        match self.principal() {
            None => return false,
            Some(current) if current.access_token != stale.access_token => return true,
            Some(_) => {}
        }

        match refresher.refresh_principal().await {
            Ok(principal) if principal.user_id == stale.user_id => {
                self.refresh(principal);
                tracing::debug!("Access token refreshed for user {}", stale.user_id);
                self.principal().is_some()
            }
            Ok(principal) => {
                tracing::warn!(
                    "Refreshed session belongs to {}, not {}; keeping the old token",
                    principal.user_id,
                    stale.user_id
                );
                false
            }
            Err(error) => {
                tracing::warn!("Failed to refresh access token: {}", error);
                false
            }
        }
    }

    pub fn sign_out(&self) {
        if self.clear_principal() {
            tracing::info!("Session ended");
            let _ = self.inner.events.send(SessionEvent::SignedOut);
        }
    }

    /// Forced de-authentication after the backend rejected the identity.
    pub fn invalidate_identity(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if let Some(clear) = &self.inner.clear_persisted {
            if let Err(error) = clear() {
                tracing::warn!("Failed to clear persisted session: {}", error);
            }
        }
        if self.clear_principal() {
            tracing::warn!("Signed out: identity rejected by backend ({})", reason);
            let _ = self
                .inner
                .events
                .send(SessionEvent::ForcedSignOut { reason });
        }
    }

    pub fn set_online(&self, online: bool) {
        self.update(|state| state.online = online);
    }

    pub fn principal(&self) -> Option<Principal> {
        self.inner
            .principal
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn connectivity(&self) -> Connectivity {
        *self.inner.connectivity.borrow()
    }

    pub fn can_sync(&self) -> bool {
        self.connectivity().can_sync()
    }

    /// Watch authenticated/online transitions
    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.inner.connectivity.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// End of session lifecycle
    pub fn teardown(&self) {
        self.sign_out();
    }

    fn clear_principal(&self) -> bool {
        let previous = self
            .inner
            .principal
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.update(|state| state.authenticated = false);
        previous.is_some()
    }

    fn update(&self, modify: impl FnOnce(&mut Connectivity)) {
        self.inner.connectivity.send_if_modified(|state| {
            let before = *state;
            modify(state);
            before != *state
        });
    }
}

fn clear_with<S: SessionPersistence>(store: S) -> ClearSession {
    Box::new(move || store.clear_session().map_err(|error| error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct FlagStore {
        cleared: Arc<AtomicBool>,
    }

    impl SessionPersistence for FlagStore {
        fn load_session(&self) -> AuthResult<Option<AuthSession>> {
            Ok(None)
        }

        fn save_session(&self, _session: &AuthSession) -> AuthResult<()> {
            Ok(())
        }

        fn clear_session(&self) -> AuthResult<()> {
            self.cleared.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn precondition_requires_both_signals() {
        let session = SessionContext::new(false);
        assert!(!session.can_sync());

        session.sign_in(Principal::new("user", "token"));
        assert!(!session.can_sync());

        session.set_online(true);
        assert!(session.can_sync());

        session.sign_out();
        assert!(!session.can_sync());
        assert!(session.principal().is_none());
    }

    #[tokio::test]
    async fn invalidate_identity_clears_persisted_session_and_notifies() {
        let store = FlagStore::default();
        let session = SessionContext::with_persistence(true, store.clone());
        let mut events = session.events();
        session.sign_in(Principal::new("user", "token"));

        session.invalidate_identity("user_not_found");

        assert!(store.cleared.load(Ordering::SeqCst));
        assert!(!session.connectivity().authenticated);
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::SignedIn {
                user_id: "user".to_string()
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::ForcedSignOut {
                reason: "user_not_found".to_string()
            }
        );
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let session = SessionContext::new(false);
        let mut rx = session.subscribe();

        session.set_online(true);
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().online);

        // No-op updates do not wake subscribers
        session.set_online(true);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn principal_debug_redacts_token() {
        let rendered = format!("{:?}", Principal::new("user", "secret-token"));
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("[REDACTED]"));
    }

    struct CountingRefresher {
        calls: AtomicUsize,
        user_id: &'static str,
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh_principal(&self) -> AuthResult<Principal> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Principal::new(self.user_id, format!("fresh-{call}")))
        }
    }

    struct RevokedRefresher;

    #[async_trait]
    impl TokenRefresher for RevokedRefresher {
        async fn refresh_principal(&self) -> AuthResult<Principal> {
            Err(AuthError::Api("Invalid Refresh Token (400)".to_string()))
        }
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_once_for_concurrent_callers() {
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicUsize::new(0),
            user_id: "user",
        });
        let session = SessionContext::with_refresher(true, refresher.clone());
        session.sign_in(Principal::new("user", "expired"));
        let stale = session.principal().unwrap();

        let (first, second) = tokio::join!(
            session.refresh_access_token(&stale),
            session.refresh_access_token(&stale)
        );

        assert!(first && second);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.principal().unwrap().access_token, "fresh-1");
        assert!(session.can_sync());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_the_session() {
        let session = SessionContext::with_refresher(true, Arc::new(RevokedRefresher));
        session.sign_in(Principal::new("user", "expired"));
        let stale = session.principal().unwrap();

        assert!(!session.refresh_access_token(&stale).await);
        assert_eq!(session.principal(), Some(stale));

        let without_refresher = SessionContext::new(true);
        without_refresher.sign_in(Principal::new("user", "expired"));
        assert!(
            !without_refresher
                .refresh_access_token(&Principal::new("user", "expired"))
                .await
        );
    }
}
