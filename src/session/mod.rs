//! Client-side session lifecycle.
//!
//! `SessionManager` owns the current user record and credential, keeps the
//! persisted copy consistent with memory, and proactively invalidates the
//! session once the credential's claimed expiry passes. Expiry inspection is
//! local and unsigned, a UX signal only; the gateway re-resolves every
//! credential with the backend, which stays the authority.
//!
//! State changes that invalidate the session are announced to subscribers
//! registered via [`SessionManager::subscribe`]; a panicking subscriber is
//! contained and never aborts the operation that triggered it.

mod client;
mod store;

pub use client::{ClientError, GatewayClient};
pub use store::{PersistedSession, SessionStore};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::backend::{AuthResponse, AuthUser};
use crate::gateway::Action;
use crate::token;

/// Default period of the background expiry watcher.
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(60);

/// The user as held by the client: the backend's view plus the display name
/// enriched from the profile lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub email_confirmed_at: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<AuthUser> for UserRecord {
    fn from(user: AuthUser) -> Self {
        Self {
            id: user.id,
            email: user.email,
            email_confirmed_at: user.email_confirmed_at,
            display_name: None,
            extra: user.extra,
        }
    }
}

/// Session state changes delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session was cleared because the credential expired or failed
    /// validation.
    Invalidated,
    /// The user signed out; the application should tear down any view state
    /// derived from the session.
    SignedOut,
}

/// Errors surfaced by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The gateway or backend rejected the operation (wrong credentials,
    /// backend-reported failures); the message is user-facing.
    #[error("{0}")]
    Gateway(String),
    /// The gateway answered without the expected user/session payload.
    #[error("invalid response from server")]
    MalformedResponse,
    /// The account exists but its email has not been confirmed.
    #[error("please verify your email before signing in")]
    EmailNotConfirmed,
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("failed to persist session: {0}")]
    Store(#[from] std::io::Error),
}

impl From<ClientError> for SessionError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Gateway { message, .. } => Self::Gateway(message),
            ClientError::Transport(e) => Self::Transport(e),
            ClientError::Malformed => Self::MalformedResponse,
        }
    }
}

/// Session manager configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The gateway endpoint URL.
    pub gateway: Url,
    /// Directory holding the persisted session document.
    pub store_dir: PathBuf,
    /// Period of the background expiry watcher.
    pub watch_interval: Duration,
    /// Redirect target forwarded with sign-up confirmations; the gateway
    /// falls back to its configured site URL when absent.
    pub signup_redirect: Option<String>,
}

impl SessionConfig {
    pub fn new(gateway: Url, store_dir: impl Into<PathBuf>) -> Self {
        Self {
            gateway,
            store_dir: store_dir.into(),
            watch_interval: DEFAULT_WATCH_INTERVAL,
            signup_redirect: None,
        }
    }
}

type Listener = Box<dyn Fn(SessionEvent) + Send + Sync>;

#[derive(Default)]
struct AuthState {
    user: Option<UserRecord>,
    credential: Option<String>,
}

struct Inner {
    client: GatewayClient,
    store: SessionStore,
    watch_interval: Duration,
    signup_redirect: Option<String>,
    auth: Mutex<AuthState>,
    watcher: Mutex<Option<JoinHandle<()>>>,
    listeners: Mutex<Vec<Listener>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    /// Wipe memory and store, cancel the watcher. Idempotent.
    fn clear(&self) {
        {
            let mut auth = lock(&self.auth);
            auth.user = None;
            auth.credential = None;
        }
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to clear session store");
        }
        if let Some(handle) = lock(&self.watcher).take() {
            handle.abort();
        }
    }

    /// Deliver an event to every subscriber. A panicking subscriber is
    /// logged and skipped; it never aborts the caller.
    fn notify(&self, event: SessionEvent) {
        let listeners = lock(&self.listeners);
        for listener in listeners.iter() {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                warn!("session listener panicked");
            }
        }
    }
}

/// The session lifecycle manager. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                client: GatewayClient::new(config.gateway),
                store: SessionStore::new(&config.store_dir),
                watch_interval: config.watch_interval,
                signup_redirect: config.signup_redirect,
                auth: Mutex::new(AuthState::default()),
                watcher: Mutex::new(None),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Restore the persisted session on startup.
    ///
    /// No persisted credential leaves the manager anonymous. A credential
    /// that fails local validation clears all state and notifies
    /// subscribers. A valid one gets a best-effort display-name refresh and
    /// starts the expiry watcher.
    pub async fn init(&self) {
        let persisted = self.inner.store.load();
        let credential = {
            let mut auth = lock(&self.inner.auth);
            auth.user = persisted.user;
            auth.credential = persisted.credential;
            auth.credential.clone()
        };
        let Some(credential) = credential else { return };

        if !self.validate_session() {
            self.clear_auth();
            self.inner.notify(SessionEvent::Invalidated);
            return;
        }

        if let Some(name) = self.fetch_display_name(&credential).await {
            self.apply_display_name(name);
        }
        self.start_watcher();
    }

    /// Local-only credential check: three segments and an unexpired `exp`.
    /// A UX heuristic, not authoritative security enforcement.
    pub fn validate_session(&self) -> bool {
        lock(&self.inner.auth)
            .credential
            .as_deref()
            .is_some_and(token::validate)
    }

    /// Exchange email and password for a session via the gateway.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserRecord, SessionError> {
        let data = self
            .inner
            .client
            .call(
                Action::SignIn,
                json!({ "email": email, "password": password }),
                None,
            )
            .await
            .map_err(SessionError::from)?;

        let response: AuthResponse =
            serde_json::from_value(data).map_err(|_| SessionError::MalformedResponse)?;
        let (Some(user), Some(session)) = (response.user, response.session) else {
            return Err(SessionError::MalformedResponse);
        };

        // The backend issues a session regardless; unconfirmed accounts are
        // still turned away here.
        if !user
            .email_confirmed_at
            .as_deref()
            .is_some_and(|at| !at.is_empty())
        {
            return Err(SessionError::EmailNotConfirmed);
        }

        let credential = session.access_token;
        let mut record = UserRecord::from(user);
        if let Some(name) = self.fetch_display_name(&credential).await {
            record.display_name = Some(name);
        }

        {
            let mut auth = lock(&self.inner.auth);
            auth.user = Some(record.clone());
            auth.credential = Some(credential.clone());
        }
        self.inner.store.save(&record, &credential)?;
        self.start_watcher();

        Ok(record)
    }

    /// Create a pending account. No session is stored; the confirmation
    /// step happens out of band. The gateway's response is returned
    /// verbatim.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Value, SessionError> {
        let mut payload = json!({
            "email": email,
            "password": password,
            "display_name": display_name,
        });
        if let Some(redirect) = &self.inner.signup_redirect {
            payload["redirectTo"] = json!(redirect);
        }
        Ok(self.inner.client.call(Action::SignUp, payload, None).await?)
    }

    /// Notify the backend (best-effort) and unconditionally clear local
    /// state. Subscribers receive `SignedOut` so the application can perform
    /// its hard reset.
    pub async fn sign_out(&self) {
        let bearer = lock(&self.inner.auth).credential.clone();
        if let Err(e) = self
            .inner
            .client
            .call(Action::SignOut, json!({}), bearer.as_deref())
            .await
        {
            debug!(error = %e, "sign-out notification failed, clearing anyway");
        }
        self.clear_auth();
        self.inner.notify(SessionEvent::SignedOut);
    }

    /// Synchronously wipe in-memory and persisted state and stop the expiry
    /// watcher. Idempotent; never fails.
    pub fn clear_auth(&self) {
        self.inner.clear();
    }

    /// True iff a user and a credential are both present and the credential
    /// is not locally expired.
    pub fn is_authenticated(&self) -> bool {
        let auth = lock(&self.inner.auth);
        auth.user.is_some()
            && auth
                .credential
                .as_deref()
                .is_some_and(|c| !token::expired(c))
    }

    /// Read the credential, checking expiry first. An expired credential
    /// clears the whole session and yields `None`, so callers get either a
    /// live token or a guaranteed-cleared session.
    pub fn token(&self) -> Option<String> {
        let credential = lock(&self.inner.auth).credential.clone()?;
        if token::expired(&credential) {
            self.clear_auth();
            self.inner.notify(SessionEvent::Invalidated);
            return None;
        }
        Some(credential)
    }

    /// The current user record, if any.
    pub fn current_user(&self) -> Option<UserRecord> {
        lock(&self.inner.auth).user.clone()
    }

    /// Register a session-event listener.
    pub fn subscribe(&self, listener: impl Fn(SessionEvent) + Send + Sync + 'static) {
        lock(&self.inner.listeners).push(Box::new(listener));
    }

    /// Best-effort display-name lookup; failures are logged, never surfaced.
    async fn fetch_display_name(&self, credential: &str) -> Option<String> {
        match self
            .inner
            .client
            .call(Action::GetProfile, json!({}), Some(credential))
            .await
        {
            Ok(data) => data
                .get("display_name")
                .and_then(Value::as_str)
                .map(str::to_string),
            Err(e) => {
                debug!(error = %e, "profile fetch failed, continuing without display name");
                None
            }
        }
    }

    /// Apply an enriched display name to memory and the persisted copy.
    fn apply_display_name(&self, name: String) {
        let snapshot = {
            let mut auth = lock(&self.inner.auth);
            let Some(user) = auth.user.as_mut() else { return };
            user.display_name = Some(name);
            match (&auth.user, &auth.credential) {
                (Some(user), Some(credential)) => Some((user.clone(), credential.clone())),
                _ => None,
            }
        };
        if let Some((user, credential)) = snapshot {
            if let Err(e) = self.inner.store.save(&user, &credential) {
                warn!(error = %e, "failed to persist enriched session");
            }
        }
    }

    /// Start the recurring expiry watcher unless one is already running.
    ///
    /// The task holds only a weak reference, so dropping the manager ends
    /// the watcher; detecting expiry clears all state, notifies
    /// subscribers, and stops the task.
    fn start_watcher(&self) {
        let mut watcher = lock(&self.inner.watcher);
        if watcher.is_some() {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.watch_interval;
        *watcher = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately; the check starts one
            // period out.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                let expired = lock(&inner.auth)
                    .credential
                    .as_deref()
                    .is_some_and(token::expired);
                if expired {
                    warn!("session credential expired, clearing auth");
                    inner.clear();
                    inner.notify(SessionEvent::Invalidated);
                    break;
                }
            }
        }));
    }
}
