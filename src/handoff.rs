//! Cross-Screen Handoff
//!
//! Two small pieces of process-wide state tying otherwise unrelated screens
//! together: the entity a list screen hands to an edit screen, and the
//! refresh generation mutating screens bump to tell list screens to
//! re-fetch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// The entity currently being edited. The record is the raw server object;
/// the edit screen pre-populates its form from it and never writes it back
/// through this slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "camelCase")]
pub enum EditTarget {
    Route(Value),
    Tour(Value),
    Vehicle(Value),
}

/// Shared hand-off state. One slot, one counter; all mutation goes through
/// the named operations below.
#[derive(Default)]
pub struct Handoff {
    edit_target: Mutex<Option<EditTarget>>,
    refresh_generation: AtomicU64,
}

impl Handoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place the entity the next edit screen should load. Always overwrites;
    /// concurrent writers are not arbitrated.
    pub fn set_edit_target(&self, target: EditTarget) {
        if let Ok(mut slot) = self.edit_target.lock() {
            *slot = Some(target);
        }
    }

    /// Read the pending edit target. Reading does not clear the slot: edit
    /// screens re-render and need the value again before the user saves.
    /// Arriving at an edit screen without a prior `set_edit_target` is a
    /// programming error in the navigation flow, not a runtime state.
    pub fn edit_target(&self) -> Option<EditTarget> {
        self.edit_target
            .lock()
            .map(|slot| slot.clone())
            .unwrap_or(None)
    }

    /// Announce "something changed, re-fetch your lists". Returns the new
    /// generation.
    pub fn signal_refresh(&self) -> u64 {
        let generation = self.refresh_generation.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Refresh signaled, generation {generation}");
        generation
    }

    /// Current refresh generation. An observer that last saw N and now sees
    /// M > N re-fetches exactly once, however many signals M - N covers.
    pub fn refresh_generation(&self) -> u64 {
        self.refresh_generation.load(Ordering::Relaxed)
    }
}
