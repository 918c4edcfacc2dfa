//! Session lifecycle management
//!
//! Owns the bearer-credential pair and the signed-in user, and coordinates
//! credential renewal so concurrent requests never race or duplicate a
//! refresh. State machine:
//!
//! ```text
//! Anonymous -> Authenticating -> Authenticated <-> Refreshing -> Expired (-> Anonymous)
//! ```
//!
//! The refresh path is single-flight: a tokio mutex gates the renewal and a
//! generation counter lets callers that queued behind an in-flight refresh
//! share its outcome instead of issuing their own.

pub mod store;
pub mod token;

use std::sync::{Arc, RwLock};

use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::transport::{ApiRequest, Transport};
use crate::api::types::{LoginResponse, RegisterRequest, TokenPair, User};
use crate::api::ApiError;

use store::{PersistedSession, SessionStore};

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticating,
    Authenticated,
    Refreshing,
    Expired,
}

/// Published view of the session for UI subscribers
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub user: Option<User>,
    pub is_authenticated: bool,
}

struct Inner {
    state: SessionState,
    user: Option<User>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    /// Bumped on every successful credential installation (login, refresh,
    /// rehydration). Lets queued refresh callers detect that another caller
    /// already renewed the pair.
    generation: u64,
}

/// Owns the credential pair and serializes every write to it
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    inner: RwLock<Inner>,
    refresh_gate: tokio::sync::Mutex<()>,
    store: Option<SessionStore>,
    watch_tx: watch::Sender<SessionSnapshot>,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn Transport>, store: Option<SessionStore>) -> Self {
        let (watch_tx, _) = watch::channel(SessionSnapshot {
            state: SessionState::Anonymous,
            user: None,
            is_authenticated: false,
        });
        Self {
            transport,
            inner: RwLock::new(Inner {
                state: SessionState::Anonymous,
                user: None,
                access_token: None,
                refresh_token: None,
                generation: 0,
            }),
            refresh_gate: tokio::sync::Mutex::new(()),
            store,
            watch_tx,
        }
    }

    /// Subscribe to session changes. The receiver holds the current snapshot
    /// immediately; every state change publishes a new one.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.watch_tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.inner.read().unwrap().state
    }

    pub fn user(&self) -> Option<User> {
        self.inner.read().unwrap().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.read().unwrap().state == SessionState::Authenticated
    }

    /// Current access token, if any
    pub fn access_token(&self) -> Option<String> {
        self.inner.read().unwrap().access_token.clone()
    }

    /// Credential generation at this instant; pass to [`Self::refresh_from`]
    /// to coalesce with a refresh triggered by the same stale credential.
    pub(crate) fn generation(&self) -> u64 {
        self.inner.read().unwrap().generation
    }

    pub fn is_access_expired(&self) -> bool {
        match self.access_token() {
            Some(token) => token::is_expired(&token),
            None => true,
        }
    }

    pub fn is_refresh_expired(&self) -> bool {
        match self.inner.read().unwrap().refresh_token.clone() {
            Some(token) => token::is_expired(&token),
            None => true,
        }
    }

    /// Sign in with an identifier/secret pair
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<User, ApiError> {
        self.set_state(SessionState::Authenticating);
        info!(identifier = identifier, "Signing in");

        let request = ApiRequest::post("/auth/login/").json(json!({
            "identifier": identifier,
            "password": secret,
        }));

        let response = match self.transport.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                self.clear_credentials();
                return Err(e);
            }
        };

        if !response.is_success() {
            self.clear_credentials();
            let err = ApiError::from_status(response.status, &response.body_text());
            warn!(status = response.status, "Sign-in rejected");
            // Bad credentials are an auth failure regardless of the exact status
            return Err(match err {
                ApiError::Auth(_) => err,
                other => ApiError::Auth(other.to_string()),
            });
        }

        let login: LoginResponse = match response.json() {
            Ok(login) => login,
            Err(e) => {
                // Unreadable success body: treat as a failed sign-in
                self.clear_credentials();
                warn!(error = %e, "Sign-in response unreadable");
                return Err(ApiError::Auth(e.to_string()));
            }
        };
        let user = login.user.clone();
        {
            let mut inner = self.inner.write().unwrap();
            inner.state = SessionState::Authenticated;
            inner.user = Some(login.user);
            inner.access_token = Some(login.access);
            inner.refresh_token = Some(login.refresh);
            inner.generation += 1;
        }
        self.persist();
        self.publish();
        info!(user = %user.id, "Signed in");
        Ok(user)
    }

    /// Create an account. Registration does not sign the user in; they log
    /// in with the new credentials afterwards.
    pub async fn register(&self, profile: RegisterRequest) -> Result<User, ApiError> {
        let request = ApiRequest::post("/auth/register/").json(serde_json::to_value(&profile)?);
        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            return Err(ApiError::from_status(response.status, &response.body_text()));
        }
        response.json()
    }

    /// Renew the credential pair. Single-flight: concurrent callers all
    /// await the same renewal and share its outcome.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let observed = self.generation();
        self.refresh_from(observed).await
    }

    /// Renew the credential pair, unless it already changed since
    /// `observed_generation` (someone else refreshed first).
    pub(crate) async fn refresh_from(&self, observed_generation: u64) -> Result<(), ApiError> {
        // FIFO mutex: queued callers are admitted in submission order
        let _gate = self.refresh_gate.lock().await;

        let refresh_token = {
            let inner = self.inner.read().unwrap();
            if inner.generation != observed_generation {
                // A refresh completed while we waited; share its outcome.
                return if inner.state == SessionState::Authenticated {
                    Ok(())
                } else {
                    Err(ApiError::Auth("session expired".into()))
                };
            }
            match &inner.refresh_token {
                Some(token) => token.clone(),
                None => return Err(ApiError::Auth("no refresh credential".into())),
            }
        };

        self.set_state(SessionState::Refreshing);
        debug!("Refreshing credential pair");

        let request = ApiRequest::post("/auth/refresh/").json(json!({ "refresh": refresh_token }));
        let failure = match self.transport.execute(request).await {
            // An unreadable 200 body is a failed refresh like any other
            Ok(response) if response.is_success() => match response.json::<TokenPair>() {
                Ok(pair) => {
                    {
                        let mut inner = self.inner.write().unwrap();
                        inner.state = SessionState::Authenticated;
                        inner.access_token = Some(pair.access);
                        inner.refresh_token = Some(pair.refresh);
                        inner.generation += 1;
                    }
                    self.persist();
                    self.publish();
                    info!("Credential pair refreshed");
                    return Ok(());
                }
                Err(e) => e,
            },
            Ok(response) => ApiError::from_status(response.status, &response.body_text()),
            Err(e) => e,
        };

        // Refresh rejected: the pair is unusable, force sign-out.
        warn!(error = %failure, "Credential refresh failed, signing out");
        self.set_state(SessionState::Expired);
        self.logout();
        Err(match failure {
            ApiError::Auth(_) => failure,
            other => ApiError::Auth(other.to_string()),
        })
    }

    /// Sign out. Idempotent: clears credentials, user and the persisted
    /// snapshot regardless of current state.
    pub fn logout(&self) {
        {
            let mut inner = self.inner.write().unwrap();
            inner.state = SessionState::Anonymous;
            inner.user = None;
            inner.access_token = None;
            inner.refresh_token = None;
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                warn!(error = %e, "Failed to clear session snapshot");
            }
        }
        self.publish();
        info!("Signed out");
    }

    /// Restore a persisted session at startup.
    ///
    /// Valid access token: confirmed with a profile fetch (failure signs
    /// out). Expired access but valid refresh: renews the pair. Both
    /// expired: signs out. Returns the resulting state.
    pub async fn rehydrate(&self) -> Result<SessionState, ApiError> {
        let Some(store) = &self.store else {
            return Ok(self.state());
        };
        let Some(snapshot) = store.load()? else {
            debug!("No session snapshot to restore");
            return Ok(SessionState::Anonymous);
        };

        let (Some(access), Some(refresh)) = (
            snapshot.access_token.clone(),
            snapshot.refresh_token.clone(),
        ) else {
            self.logout();
            return Ok(SessionState::Anonymous);
        };
        if !snapshot.is_authenticated {
            self.logout();
            return Ok(SessionState::Anonymous);
        }

        {
            let mut inner = self.inner.write().unwrap();
            inner.state = SessionState::Authenticated;
            inner.user = snapshot.user;
            inner.access_token = Some(access.clone());
            inner.refresh_token = Some(refresh.clone());
            inner.generation += 1;
        }
        self.publish();

        if !token::is_expired(&access) {
            // Snapshot looks current; confirm the credential still works
            match self.fetch_profile(&access).await {
                Ok(user) => {
                    self.set_user(user);
                    info!("Session restored from snapshot");
                }
                Err(e) => {
                    warn!(error = %e, "Restored credential rejected, signing out");
                    self.logout();
                }
            }
        } else if !token::is_expired(&refresh) {
            debug!("Restored access token expired, refreshing");
            if let Err(e) = self.refresh().await {
                warn!(error = %e, "Refresh of restored session failed");
            }
        } else {
            info!("Persisted credentials expired, signing out");
            self.logout();
        }

        Ok(self.state())
    }

    /// Replace the signed-in user (profile fetch/update result)
    pub(crate) fn set_user(&self, user: User) {
        self.inner.write().unwrap().user = Some(user);
        self.publish();
    }

    async fn fetch_profile(&self, access: &str) -> Result<User, ApiError> {
        let request = ApiRequest::get("/auth/profile/").bearer(Some(access.to_string()));
        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            return Err(ApiError::from_status(response.status, &response.body_text()));
        }
        response.json()
    }

    fn set_state(&self, state: SessionState) {
        self.inner.write().unwrap().state = state;
        self.publish();
    }

    fn clear_credentials(&self) {
        {
            let mut inner = self.inner.write().unwrap();
            inner.state = SessionState::Anonymous;
            inner.user = None;
            inner.access_token = None;
            inner.refresh_token = None;
        }
        self.publish();
    }

    fn persist(&self) {
        let Some(store) = &self.store else { return };
        let snapshot = {
            let inner = self.inner.read().unwrap();
            PersistedSession {
                user: inner.user.clone(),
                access_token: inner.access_token.clone(),
                refresh_token: inner.refresh_token.clone(),
                is_authenticated: inner.state == SessionState::Authenticated,
            }
        };
        // Snapshot loss degrades to a fresh sign-in, not a hard failure
        if let Err(e) = store.save(&snapshot) {
            warn!(error = %e, "Failed to persist session snapshot");
        }
    }

    fn publish(&self) {
        let snapshot = {
            let inner = self.inner.read().unwrap();
            SessionSnapshot {
                state: inner.state,
                user: inner.user.clone(),
                is_authenticated: inner.state == SessionState::Authenticated,
            }
        };
        self.watch_tx.send_replace(snapshot);
    }
}
