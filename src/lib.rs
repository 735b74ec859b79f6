//! TourFleet Mobile Client Core
//!
//! Session and data-synchronization layer shared by every screen: token
//! lifecycle, authenticated HTTP client, profile cache, and cross-screen
//! hand-off. Screens depend on `ScreenContext` and nothing else.

pub mod auth;
pub mod client;
pub mod config;
pub mod handoff;
pub mod logging;
pub mod profile;
pub mod storage;

#[cfg(test)]
mod testutil;

use std::sync::Arc;

use tracing::{info, warn};

use auth::{SessionError, SessionManager};
use client::{ApiClient, ApiError, LoginIdentity};
use config::AppConfig;
use handoff::Handoff;
use profile::{ProfileCache, UserProfile};
use storage::TokenStore;

/// Capability bundle shared across screens: session, client, profile cache,
/// and hand-off state behind one access point.
pub struct ScreenContext {
    pub session: SessionManager,
    pub profile: ProfileCache,
    pub handoff: Handoff,
}

impl ScreenContext {
    pub fn new(config: &AppConfig) -> Self {
        let store = TokenStore::new(&config.data_dir);
        Self {
            session: SessionManager::new(&config.api_base_url, store),
            profile: ProfileCache::new(),
            handoff: Handoff::new(),
        }
    }

    /// Restore the persisted session and warm the profile cache. Call once
    /// at startup.
    pub async fn start(&self) {
        let session = self.session.restore();
        if session.is_logged() {
            if let Err(e) = self.refresh_profile().await {
                warn!("Profile not loaded at startup: {e}");
            }
        }
    }

    /// Current client snapshot. Headers are fixed at issue time: hold the
    /// snapshot for one request, not for the life of a screen.
    pub fn client(&self) -> Arc<ApiClient> {
        self.session.client()
    }

    /// Authenticate against the remote API and open a session.
    pub async fn login(
        &self,
        identity: LoginIdentity,
        password: &str,
    ) -> Result<(), SessionError> {
        let token = self.client().login(identity, password).await?;
        self.session.login(&token)?;

        match self.refresh_profile().await {
            Ok(_) => {}
            // The freshly issued token was rejected; the session is already
            // terminated, surface that to the login screen.
            Err(e) if e.is_auth() => return Err(e.into()),
            // Transient failure; the session stays open and screens retry.
            Err(e) => warn!("Profile fetch after login failed: {e}"),
        }
        Ok(())
    }

    /// Close the session and drop everything derived from it.
    pub fn logout(&self) {
        self.session.logout();
        self.profile.clear();
        info!("Logged out");
    }

    /// Profile for the current token, fetching if the cache is invalid. An
    /// auth rejection terminates the session so the stale token is never
    /// reused.
    pub async fn refresh_profile(&self) -> Result<Option<UserProfile>, ApiError> {
        match self.profile.ensure_loaded(&self.session).await {
            Err(e) if e.is_auth() => {
                warn!("Profile fetch rejected; forcing logout");
                self.logout();
                Err(e)
            }
            other => other,
        }
    }

    /// Route an API error a screen received through session policy: auth
    /// rejections force a logout. Returns true when the session ended and
    /// the caller should hand control back to the login flow; any other
    /// error stays the screen's to handle.
    pub fn handle_api_error(&self, error: &ApiError) -> bool {
        if error.is_auth() && self.session.is_logged() {
            warn!("Auth rejection reported by a screen; forcing logout");
            self.logout();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::auth::SessionPhase;
    use crate::client::AUTH_HEADER;
    use crate::testutil::spawn_server;

    fn context(base_url: &str, data_dir: &std::path::Path) -> ScreenContext {
        ScreenContext::new(&AppConfig {
            api_base_url: base_url.to_string(),
            data_dir: data_dir.to_path_buf(),
        })
    }

    #[tokio::test]
    async fn start_with_empty_storage_ends_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context("http://localhost:9", dir.path());

        ctx.start().await;

        let session = ctx.session.snapshot();
        assert_eq!(session.phase, SessionPhase::LoggedOut);
        assert!(!session.loading());
        assert_eq!(session.token, None);
    }

    #[tokio::test]
    async fn login_opens_session_and_fetches_profile_once() {
        let profile_fetches = Arc::new(AtomicUsize::new(0));
        let counter = profile_fetches.clone();
        let base_url = spawn_server(move |req| match req.path.as_str() {
            "/api/user/login" => (200, r#"{"authToken":"abc"}"#.to_string()),
            "/api/user/" => {
                counter.fetch_add(1, Ordering::SeqCst);
                assert_eq!(req.header(AUTH_HEADER).as_deref(), Some("abc"));
                (200, r#"{"userName":"amara","email":"amara@tf.example"}"#.to_string())
            }
            _ => (404, String::new()),
        })
        .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&base_url, dir.path());
        ctx.start().await;

        ctx.login(LoginIdentity::UserName("amara".into()), "pw")
            .await
            .unwrap();

        let session = ctx.session.snapshot();
        assert!(session.is_logged());
        assert_eq!(session.token.as_deref(), Some("abc"));
        assert_eq!(profile_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(
            ctx.profile.cached().unwrap().user_name.as_deref(),
            Some("amara")
        );

        // Cache is valid for this token: another refresh does not re-fetch
        ctx.refresh_profile().await.unwrap();
        assert_eq!(profile_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_stored_token_forces_full_logout() {
        let base_url = spawn_server(|req| match req.path.as_str() {
            "/api/user/" => (401, r#"{"message":"token expired"}"#.to_string()),
            _ => (404, String::new()),
        })
        .await;

        let dir = tempfile::tempdir().unwrap();
        TokenStore::new(dir.path()).set("expired-1").unwrap();
        let ctx = context(&base_url, dir.path());

        ctx.start().await;

        // Session terminated, stored token gone, cache empty
        assert!(!ctx.session.is_logged());
        assert!(TokenStore::new(dir.path()).get().unwrap().is_none());
        assert_eq!(ctx.profile.cached(), None);
    }

    #[tokio::test]
    async fn transient_profile_failure_keeps_session_and_cache() {
        let fail = Arc::new(AtomicUsize::new(1));
        let mode = fail.clone();
        let base_url = spawn_server(move |req| match req.path.as_str() {
            "/api/user/login" => (200, r#"{"authToken":"abc"}"#.to_string()),
            "/api/user/" if mode.load(Ordering::SeqCst) == 0 => {
                (200, r#"{"userName":"amara"}"#.to_string())
            }
            "/api/user/" => (500, String::new()),
            _ => (404, String::new()),
        })
        .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&base_url, dir.path());
        ctx.start().await;

        fail.store(0, Ordering::SeqCst);
        ctx.login(LoginIdentity::UserName("amara".into()), "pw")
            .await
            .unwrap();
        assert!(ctx.profile.cached().is_some());

        // A later refresh hits a 500 once the token epoch moves on; the
        // session and the stale profile survive it
        fail.store(1, Ordering::SeqCst);
        ctx.session.login("abc2").unwrap();
        let err = ctx.refresh_profile().await.unwrap_err();
        assert!(err.is_retryable());
        assert!(ctx.session.is_logged());
        assert!(ctx.profile.cached().is_some());
    }

    #[tokio::test]
    async fn handle_api_error_terminates_session_only_on_auth() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context("http://localhost:9", dir.path());
        ctx.start().await;
        ctx.session.login("abc").unwrap();

        let network = ApiError::Network("timed out".into());
        assert!(!ctx.handle_api_error(&network));
        assert!(ctx.session.is_logged());

        let auth = ApiError::Auth {
            status: 401,
            message: "expired".into(),
        };
        assert!(ctx.handle_api_error(&auth));
        assert!(!ctx.session.is_logged());

        // Already logged out: nothing further to terminate
        assert!(!ctx.handle_api_error(&auth));
    }

    #[tokio::test]
    async fn token_change_is_visible_to_next_client_snapshot_only() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context("http://localhost:9", dir.path());
        ctx.start().await;
        ctx.session.login("first").unwrap();

        let pending = ctx.client();
        ctx.session.login("second").unwrap();

        // A request still pending under the old snapshot keeps its header;
        // anything issued now carries the new token
        assert_eq!(pending.token(), Some("first"));
        assert_eq!(ctx.client().token(), Some("second"));
    }
}
