//! Discovery: build a catalog of candidate providers for one capability
//! port.
//!
//! Candidates come from the deployment lockfile's pinned providers. Each
//! catalog entry is annotated with compatibility, trust, and reachability
//! information; nothing is silently dropped. Entries that cannot satisfy
//! the query (wrong contract hash, incompatible host API, below the
//! requested trust tier) are listed with reasons so downstream stages can
//! filter with full context.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::binding::CapabilityResolution;
use crate::hash::ContentHash;
use crate::host_api::{HostApiRange, SemVer};
use crate::lockfile::DeploymentLockfile;
use crate::manifest::{ProviderManifest, ProviderRef};

// ---------------------------------------------------------------------------
// Reason codes
// ---------------------------------------------------------------------------

pub const REASON_CONTRACT_MISMATCH: &str = "capability_contract_mismatch";
pub const REASON_CAPABILITY_NOT_LOCKED: &str = "capability_not_locked";
pub const REASON_MANIFEST_UNAVAILABLE: &str = "manifest_unavailable";
pub const REASON_MANIFEST_CAPABILITY_MISSING: &str = "manifest_capability_missing";
pub const REASON_HOST_API_INCOMPATIBLE: &str = "host_api_incompatible";
pub const REASON_HOST_API_RANGE_MALFORMED: &str = "host_api_range_malformed";
pub const REASON_BELOW_MIN_TRUST_TIER: &str = "below_min_trust_tier";
pub const REASON_TRUST_UNKNOWN: &str = "trust_unknown";
pub const REASON_UNREACHABLE: &str = "unreachable";

// ---------------------------------------------------------------------------
// Trust tiers & indexes
// ---------------------------------------------------------------------------

/// Coarse trust classification of a provider release, ascending.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TrustTier {
    Untrusted,
    Review,
    Trusted,
    Certified,
}

impl TrustTier {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Untrusted => "untrusted",
            Self::Review => "review",
            Self::Trusted => "trusted",
            Self::Certified => "certified",
        }
    }
}

impl fmt::Display for TrustTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trust annotation attached to a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustAnnotation {
    pub tier: TrustTier,
    pub certifications: std::collections::BTreeSet<String>,
}

impl Default for TrustAnnotation {
    fn default() -> Self {
        Self {
            tier: TrustTier::Untrusted,
            certifications: std::collections::BTreeSet::new(),
        }
    }
}

/// Point-in-time trust view keyed by provider release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustIndex {
    entries: BTreeMap<ProviderRef, TrustAnnotation>,
}

impl TrustIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, provider_ref: ProviderRef, annotation: TrustAnnotation) {
        self.entries.insert(provider_ref, annotation);
    }

    pub fn get(&self, provider_ref: &ProviderRef) -> Option<&TrustAnnotation> {
        self.entries.get(provider_ref)
    }
}

/// Point-in-time reachability view keyed by provider id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReachabilityIndex {
    entries: BTreeMap<String, CapabilityResolution>,
}

impl ReachabilityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, provider_id: impl Into<String>, resolution: CapabilityResolution) {
        self.entries.insert(provider_id.into(), resolution);
    }

    pub fn get(&self, provider_id: &str) -> Option<&CapabilityResolution> {
        self.entries.get(provider_id)
    }
}

// ---------------------------------------------------------------------------
// Query & catalog
// ---------------------------------------------------------------------------

/// What the caller is looking for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryQuery {
    pub port_id: String,
    pub port_version: SemVer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_hash: Option<ContentHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_trust_tier: Option<TrustTier>,
}

/// Compatibility annotation for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityAnnotation {
    pub host_api_compatible: bool,
    pub capability_compatible: bool,
    pub contract_hash_compatible: bool,
}

/// Free-form downstream-filtering hints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionAnnotation {
    pub reasons: Vec<String>,
}

/// One annotated candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub provider_id: String,
    pub provider_version: SemVer,
    pub compatibility: CompatibilityAnnotation,
    pub trust: TrustAnnotation,
    pub reachability: CapabilityResolution,
    pub selection: SelectionAnnotation,
}

impl CatalogEntry {
    pub fn provider_ref(&self) -> ProviderRef {
        ProviderRef::new(self.provider_id.clone(), self.provider_version)
    }
}

/// The discovery result: every candidate, annotated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryCatalog {
    pub query: DiscoveryQuery,
    pub entries: Vec<CatalogEntry>,
}

// ---------------------------------------------------------------------------
// discover
// ---------------------------------------------------------------------------

/// Build the candidate catalog for a query.
///
/// `manifests` supplies each pinned provider's release manifest (keyed by
/// provider id) so host-API compatibility can be evaluated; a missing
/// manifest marks the entry incompatible rather than dropping it.
/// Entries are emitted in provider-id order for deterministic output.
pub fn discover(
    lockfile: &DeploymentLockfile,
    manifests: &BTreeMap<String, ProviderManifest>,
    query: &DiscoveryQuery,
    trust_index: &TrustIndex,
    reachability_index: &ReachabilityIndex,
) -> DiscoveryCatalog {
    let mut entries: Vec<CatalogEntry> = Vec::with_capacity(lockfile.providers.len());

    for locked in &lockfile.providers {
        let mut reasons = Vec::new();
        let provider_ref = locked.provider_ref();

        let locked_capability = locked.capability(&query.port_id, query.port_version);
        let manifest = manifests.get(&locked.provider_id);

        // Capability: the lockfile must pin the port, and — when a
        // manifest is available — the manifest must declare it too.
        let mut capability_compatible = locked_capability.is_some();
        if locked_capability.is_none() {
            reasons.push(REASON_CAPABILITY_NOT_LOCKED.to_string());
        }
        if let Some(manifest) = manifest {
            if manifest
                .capability(&query.port_id, query.port_version)
                .is_none()
            {
                capability_compatible = false;
                reasons.push(REASON_MANIFEST_CAPABILITY_MISSING.to_string());
            }
        }

        let contract_hash_compatible = match (query.contract_hash, locked_capability) {
            (Some(expected), Some(capability)) => {
                let matches = capability.contract_hash == expected;
                if !matches {
                    reasons.push(REASON_CONTRACT_MISMATCH.to_string());
                }
                matches
            }
            (Some(_), None) => false,
            (None, _) => true,
        };

        let host_api_compatible = match manifest {
            Some(manifest) => match HostApiRange::parse(&manifest.host_api_range) {
                Ok(range) => {
                    let compatible = range.matches(lockfile.host_api_version);
                    if !compatible {
                        reasons.push(REASON_HOST_API_INCOMPATIBLE.to_string());
                    }
                    compatible
                }
                Err(_) => {
                    reasons.push(REASON_HOST_API_RANGE_MALFORMED.to_string());
                    false
                }
            },
            None => {
                reasons.push(REASON_MANIFEST_UNAVAILABLE.to_string());
                false
            }
        };

        let trust = match trust_index.get(&provider_ref) {
            Some(annotation) => annotation.clone(),
            None => {
                reasons.push(REASON_TRUST_UNKNOWN.to_string());
                TrustAnnotation::default()
            }
        };
        if let Some(min_tier) = query.min_trust_tier {
            if trust.tier < min_tier {
                reasons.push(REASON_BELOW_MIN_TRUST_TIER.to_string());
            }
        }

        let reachability = match reachability_index.get(&locked.provider_id) {
            Some(resolution) => resolution.clone(),
            None => {
                reasons.push(REASON_UNREACHABLE.to_string());
                CapabilityResolution::Unreachable { reason: None }
            }
        };

        entries.push(CatalogEntry {
            provider_id: locked.provider_id.clone(),
            provider_version: locked.provider_version,
            compatibility: CompatibilityAnnotation {
                host_api_compatible,
                capability_compatible,
                contract_hash_compatible,
            },
            trust,
            reachability,
            selection: SelectionAnnotation { reasons },
        });
    }

    entries.sort_by(|a, b| {
        (&a.provider_id, a.provider_version).cmp(&(&b.provider_id, b.provider_version))
    });

    DiscoveryCatalog {
        query: query.clone(),
        entries,
    }
}
