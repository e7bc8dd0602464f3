//! Marketplace listings and their status lifecycle.
//!
//! A listing is the catalog-facing record of one provider release:
//! `draft → active → deprecated → delisted` (delisting is also allowed
//! straight from `active`). Certification can only be started against an
//! `active` listing. Every transition is recorded in the listing's audit
//! log.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;
use crate::host_api::SemVer;
use crate::manifest::ProviderRef;

// ---------------------------------------------------------------------------
// Status & transitions
// ---------------------------------------------------------------------------

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Draft,
    Active,
    Deprecated,
    Delisted,
}

impl ListingStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Deprecated => "deprecated",
            Self::Delisted => "delisted",
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ListingTransition {
    Activate,
    Deprecate,
    Delist,
}

impl ListingTransition {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Activate => "activate",
            Self::Deprecate => "deprecate",
            Self::Delist => "delist",
        }
    }
}

impl fmt::Display for ListingTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transitions allowed from a given status.
pub fn allowed_listing_transitions(status: ListingStatus) -> &'static [ListingTransition] {
    match status {
        ListingStatus::Draft => &[ListingTransition::Activate],
        ListingStatus::Active => &[ListingTransition::Deprecate, ListingTransition::Delist],
        ListingStatus::Deprecated => &[ListingTransition::Delist],
        ListingStatus::Delisted => &[],
    }
}

fn transition_target(transition: ListingTransition) -> ListingStatus {
    match transition {
        ListingTransition::Activate => ListingStatus::Active,
        ListingTransition::Deprecate => ListingStatus::Deprecated,
        ListingTransition::Delist => ListingStatus::Delisted,
    }
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Release information attached to a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRelease {
    /// Digest of the release artifact (same value trust verification
    /// checks signatures and attestations against).
    pub artifact_hash: ContentHash,
    pub released_at: DateTime<Utc>,
}

/// One audit entry per applied transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingAuditEntry {
    pub actor_id: String,
    pub occurred_at: DateTime<Utc>,
    pub transition: ListingTransition,
    pub from: ListingStatus,
    pub to: ListingStatus,
}

/// Catalog entry for one provider release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub provider_namespace: String,
    pub provider_id: String,
    pub provider_version: SemVer,
    pub status: ListingStatus,
    pub metadata: BTreeMap<String, String>,
    pub release: ListingRelease,
    pub audit: Vec<ListingAuditEntry>,
}

impl Listing {
    /// Create a new listing in `draft`.
    pub fn submit(
        provider_namespace: impl Into<String>,
        provider_id: impl Into<String>,
        provider_version: SemVer,
        metadata: BTreeMap<String, String>,
        release: ListingRelease,
    ) -> Self {
        Self {
            provider_namespace: provider_namespace.into(),
            provider_id: provider_id.into(),
            provider_version,
            status: ListingStatus::Draft,
            metadata,
            release,
            audit: Vec::new(),
        }
    }

    pub fn provider_ref(&self) -> ProviderRef {
        ProviderRef::new(self.provider_id.clone(), self.provider_version)
    }

    /// Apply a transition, returning the updated listing.
    ///
    /// Pure: the input listing is untouched on failure.
    pub fn apply(
        &self,
        transition: ListingTransition,
        actor_id: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<Listing, ListingError> {
        if !allowed_listing_transitions(self.status).contains(&transition) {
            return Err(ListingError::InvalidTransition {
                from: self.status,
                transition,
            });
        }
        let mut next = self.clone();
        let target = transition_target(transition);
        next.audit.push(ListingAuditEntry {
            actor_id: actor_id.to_string(),
            occurred_at,
            transition,
            from: self.status,
            to: target,
        });
        next.status = target;
        Ok(next)
    }
}

/// Errors from listing transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingError {
    InvalidTransition {
        from: ListingStatus,
        transition: ListingTransition,
    },
}

impl fmt::Display for ListingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTransition { from, transition } => {
                write!(f, "transition `{transition}` is not valid from `{from}`")
            }
        }
    }
}

impl std::error::Error for ListingError {}
