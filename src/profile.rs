//! User Profile Cache
//!
//! Holds the profile of the currently authenticated user. A cached value is
//! tied to the session epoch that produced it: any token change invalidates
//! it, and a fetch that completes after the token moved on is discarded.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::SessionManager;
use crate::client::ApiError;

/// Profile as returned by `GET /api/user/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub user_name: Option<String>,
    pub mobile_number: Option<String>,
    pub email: Option<String>,
}

/// Cache for the current user's profile.
#[derive(Default)]
pub struct ProfileCache {
    slot: Mutex<Slot>,
}

#[derive(Default)]
struct Slot {
    profile: Option<UserProfile>,
    epoch: u64,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached profile for the current token, fetching if needed.
    ///
    /// On fetch failure the previous value stays in place (a transient
    /// network error must not erase the user's cached identity) and the
    /// error is returned for the caller to decide. Auth policy lives in
    /// `ScreenContext`, not here.
    pub async fn ensure_loaded(
        &self,
        session: &SessionManager,
    ) -> Result<Option<UserProfile>, ApiError> {
        let Some((client, issued_epoch)) = session.authed_client() else {
            debug!("No active session; profile not fetched");
            return Ok(None);
        };

        if let Some(profile) = self.get_if_current(issued_epoch) {
            return Ok(Some(profile));
        }

        match client.fetch_profile().await {
            Ok(profile) => Ok(self.store_if_current(profile, issued_epoch, session.epoch())),
            Err(e) => {
                warn!("Profile fetch failed, keeping cached value: {e}");
                Err(e)
            }
        }
    }

    /// Cached profile if it belongs to the given session epoch.
    pub fn get_if_current(&self, epoch: u64) -> Option<UserProfile> {
        self.slot
            .lock()
            .map(|slot| {
                if slot.epoch == epoch {
                    slot.profile.clone()
                } else {
                    None
                }
            })
            .unwrap_or(None)
    }

    /// Last known profile regardless of epoch (stale-but-available).
    pub fn cached(&self) -> Option<UserProfile> {
        self.slot
            .lock()
            .map(|slot| slot.profile.clone())
            .unwrap_or(None)
    }

    /// Drop the cached profile. Called on explicit logout only.
    pub fn clear(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.profile = None;
            slot.epoch = 0;
        }
    }

    /// Apply a fetched profile only if the epoch it was issued under is
    /// still the session's; a response to an earlier token is dropped on
    /// arrival. Returns what the cache holds afterwards.
    fn store_if_current(
        &self,
        profile: UserProfile,
        issued_epoch: u64,
        current_epoch: u64,
    ) -> Option<UserProfile> {
        if issued_epoch != current_epoch {
            debug!(
                "Discarding profile response from epoch {} (session at {})",
                issued_epoch, current_epoch
            );
            return self.cached();
        }

        if let Ok(mut slot) = self.slot.lock() {
            slot.profile = Some(profile.clone());
            slot.epoch = issued_epoch;
        }
        Some(profile)
    }
}
