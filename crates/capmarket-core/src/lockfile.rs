//! Deployment lockfiles: the pinned record of what is actually deployed.
//!
//! Each locked provider carries an integrity digest of its build artifact
//! and the exact contract hash of every capability it was locked against.
//! The lockfile is the third leg of the activation-time hash equality
//! check (contract, manifest, lockfile).

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;
use crate::host_api::SemVer;
use crate::manifest::ProviderRef;

/// One capability pinned in the lockfile for a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedCapability {
    pub port_id: String,
    pub port_version: SemVer,
    pub contract_hash: ContentHash,
}

/// One deployed provider build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedProvider {
    pub provider_id: String,
    pub provider_version: SemVer,
    pub integrity: ContentHash,
    pub capabilities: Vec<LockedCapability>,
}

impl LockedProvider {
    pub fn capability(&self, port_id: &str, port_version: SemVer) -> Option<&LockedCapability> {
        self.capabilities
            .iter()
            .find(|c| c.port_id == port_id && c.port_version == port_version)
    }

    pub fn provider_ref(&self) -> ProviderRef {
        ProviderRef::new(self.provider_id.clone(), self.provider_version)
    }
}

/// Pinned record of exactly which provider builds are deployed for an
/// app/environment pair. Replaced wholesale on redeploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentLockfile {
    pub app_id: String,
    pub environment: String,
    pub host_api_version: SemVer,
    pub providers: Vec<LockedProvider>,
}

impl DeploymentLockfile {
    pub fn provider(&self, provider_id: &str) -> Option<&LockedProvider> {
        self.providers.iter().find(|p| p.provider_id == provider_id)
    }

    /// Structural validation: non-empty keys, no duplicate provider ids.
    pub fn validate(&self) -> Result<(), LockfileError> {
        if self.app_id.trim().is_empty() {
            return Err(LockfileError::EmptyAppId);
        }
        if self.environment.trim().is_empty() {
            return Err(LockfileError::EmptyEnvironment);
        }
        let mut seen = BTreeSet::new();
        for provider in &self.providers {
            if provider.provider_id.trim().is_empty() {
                return Err(LockfileError::EmptyProviderId);
            }
            if !seen.insert(provider.provider_id.clone()) {
                return Err(LockfileError::DuplicateProvider {
                    provider_id: provider.provider_id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Decode and structurally validate a lockfile from JSON text.
    pub fn from_json_str(input: &str) -> Result<Self, LockfileError> {
        let lockfile: Self =
            serde_json::from_str(input).map_err(|e| LockfileError::Json(e.to_string()))?;
        lockfile.validate()?;
        Ok(lockfile)
    }

    /// Canonical JSON text (sorted keys via `serde_json`).
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).expect("lockfile serialization is infallible")
    }
}

/// Errors from decoding or validating a lockfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockfileError {
    EmptyAppId,
    EmptyEnvironment,
    EmptyProviderId,
    DuplicateProvider { provider_id: String },
    Json(String),
}

impl fmt::Display for LockfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyAppId => f.write_str("app_id must not be empty"),
            Self::EmptyEnvironment => f.write_str("environment must not be empty"),
            Self::EmptyProviderId => f.write_str("provider_id must not be empty"),
            Self::DuplicateProvider { provider_id } => {
                write!(f, "duplicate locked provider `{provider_id}`")
            }
            Self::Json(detail) => write!(f, "lockfile decode failed: {detail}"),
        }
    }
}

impl std::error::Error for LockfileError {}
