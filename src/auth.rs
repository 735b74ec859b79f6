//! Session Management
//!
//! Owns the token lifecycle: restore at startup, login, logout. Every token
//! change advances the session epoch and rebuilds the API client before any
//! observer can see the new state.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::client::{ApiClient, ApiError};
use crate::storage::{StorageError, TokenStore};

/// Where the session machine currently is.
///
/// `Restoring` is entered exactly once, at construction; after the restore
/// completes the machine cycles between `LoggedOut` and `LoggedIn` for the
/// life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Restoring,
    LoggedOut,
    LoggedIn,
}

/// Observable session state.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub phase: SessionPhase,
    pub token: Option<String>,
    /// Bumped on every token change; consumers tag work with the epoch it
    /// was issued under and discard results that arrive late.
    pub epoch: u64,
}

impl Session {
    pub fn is_logged(&self) -> bool {
        self.phase == SessionPhase::LoggedIn
    }

    /// True only during the startup restore window.
    pub fn loading(&self) -> bool {
        self.phase == SessionPhase::Restoring
    }
}

struct SessionInner {
    phase: SessionPhase,
    token: Option<String>,
    epoch: u64,
    client: Arc<ApiClient>,
}

/// Manages the session state machine and the client derived from it.
pub struct SessionManager {
    store: TokenStore,
    base_url: String,
    http: reqwest::Client,
    inner: Mutex<SessionInner>,
}

impl SessionManager {
    /// Create a manager in the `Restoring` phase with no token.
    pub fn new(base_url: &str, store: TokenStore) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let http = ApiClient::build_http();
        let client = Arc::new(ApiClient::new(&base_url, None, http.clone()));

        Self {
            store,
            base_url,
            http,
            inner: Mutex::new(SessionInner {
                phase: SessionPhase::Restoring,
                token: None,
                epoch: 0,
                client,
            }),
        }
    }

    /// Read the persisted token and leave the restore window. Call once at
    /// startup; a failed or empty read means starting logged out, never a
    /// crash.
    pub fn restore(&self) -> Session {
        if !self.loading() {
            warn!("restore() called after the restore window; ignoring");
            return self.snapshot();
        }

        let token = match self.store.get() {
            Ok(Some(stored)) => {
                info!("Session restored (token saved {})", stored.saved_at);
                Some(stored.token)
            }
            Ok(None) => {
                info!("No stored session");
                None
            }
            Err(e) => {
                warn!("Token restore failed, starting logged out: {e}");
                None
            }
        };

        match token {
            Some(token) => self.apply(SessionPhase::LoggedIn, Some(token)),
            None => self.apply(SessionPhase::LoggedOut, None),
        }
    }

    /// Open a session with a freshly issued token.
    ///
    /// The token is persisted first; if the write fails the in-memory state
    /// is left untouched, so `is_logged` never claims a session the store
    /// does not hold.
    pub fn login(&self, token: &str) -> Result<Session, StorageError> {
        self.store.set(token)?;
        let session = self.apply(SessionPhase::LoggedIn, Some(token.to_string()));
        info!("Logged in");
        Ok(session)
    }

    /// Close the session. The store clear is best-effort: a failure is
    /// reported in the log but the in-memory session always ends.
    pub fn logout(&self) -> Session {
        if let Err(e) = self.store.clear() {
            warn!("Failed to clear stored token: {e}");
        }
        self.apply(SessionPhase::LoggedOut, None)
    }

    /// Current state, read atomically.
    pub fn snapshot(&self) -> Session {
        let inner = self.lock();
        Session {
            phase: inner.phase,
            token: inner.token.clone(),
            epoch: inner.epoch,
        }
    }

    pub fn is_logged(&self) -> bool {
        self.lock().phase == SessionPhase::LoggedIn
    }

    pub fn loading(&self) -> bool {
        self.lock().phase == SessionPhase::Restoring
    }

    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Client snapshot for the current token. Header values are fixed at
    /// issue time; a token change later never alters requests made with
    /// this snapshot.
    pub fn client(&self) -> Arc<ApiClient> {
        self.lock().client.clone()
    }

    /// Client plus the epoch it belongs to, only while logged in. The pair
    /// is read under one lock so the two can never disagree.
    pub fn authed_client(&self) -> Option<(Arc<ApiClient>, u64)> {
        let inner = self.lock();
        if inner.phase == SessionPhase::LoggedIn {
            Some((inner.client.clone(), inner.epoch))
        } else {
            None
        }
    }

    /// Flip phase and token, bump the epoch, rebuild the client, all under
    /// one lock so no observer sees a partial transition.
    fn apply(&self, phase: SessionPhase, token: Option<String>) -> Session {
        let mut inner = self.lock();
        inner.phase = phase;
        inner.epoch += 1;
        inner.client = Arc::new(ApiClient::new(
            &self.base_url,
            token.clone(),
            self.http.clone(),
        ));
        inner.token = token;
        Session {
            phase: inner.phase,
            token: inner.token.clone(),
            epoch: inner.epoch,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        // State is plain data; a poisoned lock still holds a usable value
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Errors crossing the session orchestration surface.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Api(#[from] ApiError),
}
