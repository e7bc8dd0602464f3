//! Provider manifests: what a plugin build claims to fulfill.
//!
//! A manifest is produced once per provider release and is immutable. It
//! names the host-API range the build supports and the capability ports it
//! implements, each pinned to the contract hash the build was compiled
//! against. The `host_api_range` field is carried as the raw grammar
//! string; the provider runtime parses it at activation time so that a
//! malformed range surfaces in the compatibility error category.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::hash::ContentHash;
use crate::host_api::SemVer;

// ---------------------------------------------------------------------------
// ProviderRef
// ---------------------------------------------------------------------------

/// `provider_id@provider_version` reference used across the pipeline
/// (revocation ledger entries, trust subjects, diagnostics).
///
/// Serialized as the `id@X.Y.Z` string form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProviderRef {
    pub provider_id: String,
    pub provider_version: SemVer,
}

impl ProviderRef {
    pub fn new(provider_id: impl Into<String>, provider_version: SemVer) -> Self {
        Self {
            provider_id: provider_id.into(),
            provider_version,
        }
    }

    pub fn parse(input: &str) -> Result<Self, ProviderRefParseError> {
        let (id, version) = input.rsplit_once('@').ok_or_else(|| ProviderRefParseError {
            input: input.to_string(),
        })?;
        if id.is_empty() {
            return Err(ProviderRefParseError {
                input: input.to_string(),
            });
        }
        let provider_version = SemVer::parse(version).map_err(|_| ProviderRefParseError {
            input: input.to_string(),
        })?;
        Ok(Self {
            provider_id: id.to_string(),
            provider_version,
        })
    }
}

impl fmt::Display for ProviderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.provider_id, self.provider_version)
    }
}

impl FromStr for ProviderRef {
    type Err = ProviderRefParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ProviderRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ProviderRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(D::Error::custom)
    }
}

/// Error from parsing a `provider_id@version` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRefParseError {
    pub input: String,
}

impl fmt::Display for ProviderRefParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "malformed provider ref `{}` (expected id@MAJOR.MINOR.PATCH)",
            self.input
        )
    }
}

impl std::error::Error for ProviderRefParseError {}

// ---------------------------------------------------------------------------
// ProviderManifest
// ---------------------------------------------------------------------------

/// One capability port fulfilled by a provider build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestCapability {
    pub port_id: String,
    pub port_version: SemVer,
    pub contract_hash: ContentHash,
}

impl ManifestCapability {
    pub fn port_ref(&self) -> String {
        format!("{}@{}", self.port_id, self.port_version)
    }
}

/// Declares what a provider build fulfills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderManifest {
    pub provider_id: String,
    pub provider_version: SemVer,
    pub host_api_range: String,
    pub capabilities: Vec<ManifestCapability>,
}

impl ProviderManifest {
    /// Structural validation. Host-API range *syntax* is deliberately not
    /// checked here; see the module docs.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.provider_id.trim().is_empty() {
            return Err(ManifestError::EmptyProviderId);
        }
        if self.host_api_range.trim().is_empty() {
            return Err(ManifestError::EmptyHostApiRange);
        }
        if self.capabilities.is_empty() {
            return Err(ManifestError::NoCapabilities);
        }
        let mut seen = std::collections::BTreeSet::new();
        for (index, capability) in self.capabilities.iter().enumerate() {
            if capability.port_id.trim().is_empty() {
                return Err(ManifestError::EmptyPortId { index });
            }
            if !seen.insert((capability.port_id.clone(), capability.port_version)) {
                return Err(ManifestError::DuplicateCapability {
                    port_ref: capability.port_ref(),
                });
            }
        }
        Ok(())
    }

    /// Look up the declared capability for a port, if any.
    pub fn capability(&self, port_id: &str, port_version: SemVer) -> Option<&ManifestCapability> {
        self.capabilities
            .iter()
            .find(|c| c.port_id == port_id && c.port_version == port_version)
    }

    pub fn provider_ref(&self) -> ProviderRef {
        ProviderRef::new(self.provider_id.clone(), self.provider_version)
    }

    /// Decode and structurally validate a manifest from JSON text.
    pub fn from_json_str(input: &str) -> Result<Self, ManifestError> {
        let manifest: Self =
            serde_json::from_str(input).map_err(|e| ManifestError::Json(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }
}

/// Errors from decoding or validating a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManifestError {
    EmptyProviderId,
    EmptyHostApiRange,
    NoCapabilities,
    EmptyPortId { index: usize },
    DuplicateCapability { port_ref: String },
    Json(String),
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyProviderId => f.write_str("provider_id must not be empty"),
            Self::EmptyHostApiRange => f.write_str("host_api_range must not be empty"),
            Self::NoCapabilities => f.write_str("manifest must declare at least one capability"),
            Self::EmptyPortId { index } => {
                write!(f, "capability at index {index} has an empty port_id")
            }
            Self::DuplicateCapability { port_ref } => {
                write!(f, "duplicate capability declaration for {port_ref}")
            }
            Self::Json(detail) => write!(f, "manifest decode failed: {detail}"),
        }
    }
}

impl std::error::Error for ManifestError {}
