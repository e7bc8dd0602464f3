//! Append-only revocation ledger and the derived revoked-provider set.
//!
//! The ledger is the source of truth for "is this provider release
//! currently untrusted". It only grows: a `restore` event cancels an
//! earlier `revoke` for the same provider@version instead of deleting it,
//! and `replay_key` makes re-delivered events idempotent. The revoked set
//! is never stored — it is always derived by folding the ledger in
//! chronological order.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::host_api::SemVer;
use crate::manifest::ProviderRef;

/// What a ledger event does to a provider release.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RevocationAction {
    Revoke,
    Restore,
}

impl RevocationAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Revoke => "revoke",
            Self::Restore => "restore",
        }
    }
}

impl fmt::Display for RevocationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One delivered revocation event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationEvent {
    pub action: RevocationAction,
    pub provider_id: String,
    pub provider_version: SemVer,
    pub reason: String,
    /// Delivery-level idempotency key.
    pub replay_key: String,
    pub occurred_at: DateTime<Utc>,
}

impl RevocationEvent {
    pub fn provider_ref(&self) -> ProviderRef {
        ProviderRef::new(self.provider_id.clone(), self.provider_version)
    }
}

/// Append-only event log. Soft-deletes via `restore`, never removal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationLedger {
    events: Vec<RevocationEvent>,
}

impl RevocationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event. Returns `false` (and leaves the ledger unchanged)
    /// when an event with the same `replay_key` is already recorded.
    pub fn append(&mut self, event: RevocationEvent) -> bool {
        if self.events.iter().any(|e| e.replay_key == event.replay_key) {
            return false;
        }
        self.events.push(event);
        true
    }

    pub fn events(&self) -> &[RevocationEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Fold the ledger into the current revoked-provider set.
///
/// Events are applied in `occurred_at` order (arrival order breaks ties);
/// duplicate `replay_key`s are applied once, keeping the first occurrence.
pub fn derive_revoked_provider_refs(ledger: &RevocationLedger) -> BTreeSet<ProviderRef> {
    let mut order: Vec<usize> = (0..ledger.events.len()).collect();
    order.sort_by_key(|&index| (ledger.events[index].occurred_at, index));

    let mut seen_replay_keys = BTreeSet::new();
    let mut revoked = BTreeSet::new();
    for index in order {
        let event = &ledger.events[index];
        if !seen_replay_keys.insert(event.replay_key.clone()) {
            continue;
        }
        match event.action {
            RevocationAction::Revoke => {
                revoked.insert(event.provider_ref());
            }
            RevocationAction::Restore => {
                revoked.remove(&event.provider_ref());
            }
        }
    }
    revoked
}
