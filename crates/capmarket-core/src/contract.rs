//! Capability port contracts and their deterministic content hashes.
//!
//! A contract is the immutable definition of one capability port: schema
//! triplet (input/output/error), the effects an implementation is allowed
//! to produce, and a content hash sealing all of it. The same
//! `contract_hash` must later appear in the provider manifest and the
//! deployment lockfile before the runtime will activate a provider for
//! this port.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::hash::ContentHash;
use crate::host_api::SemVer;
use crate::schema::ValueSchema;

/// Domain separator for contract-hash preimages.
const CONTRACT_HASH_DOMAIN: &[u8] = b"capmarket.contract.v1\x00";

// ---------------------------------------------------------------------------
// EffectKind
// ---------------------------------------------------------------------------

/// The closed set of effects a capability invocation may produce.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Compute,
    Read,
    Write,
    Network,
    Emit,
    Session,
}

impl EffectKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Compute => "compute",
            Self::Read => "read",
            Self::Write => "write",
            Self::Network => "network",
            Self::Emit => "emit",
            Self::Session => "session",
        }
    }

    pub const ALL: [EffectKind; 6] = [
        Self::Compute,
        Self::Read,
        Self::Write,
        Self::Network,
        Self::Emit,
        Self::Session,
    ];
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Contract pieces
// ---------------------------------------------------------------------------

/// The schema triplet governing one port's payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSchemas {
    pub input: ValueSchema,
    pub output: ValueSchema,
    pub error: ValueSchema,
}

/// Hashes derived from the contract definition. `contract_hash` seals the
/// identity fields and the three schema hashes together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractArtifacts {
    pub input_hash: ContentHash,
    pub output_hash: ContentHash,
    pub error_hash: ContentHash,
    pub contract_hash: ContentHash,
}

/// An immutable capability port contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityPortContract {
    pub id: String,
    pub version: SemVer,
    pub declared_effects: BTreeSet<EffectKind>,
    pub schemas: ContractSchemas,
    pub artifacts: ContractArtifacts,
}

impl CapabilityPortContract {
    /// Build and seal a contract, computing all artifact hashes.
    pub fn seal(
        id: impl Into<String>,
        version: SemVer,
        declared_effects: BTreeSet<EffectKind>,
        schemas: ContractSchemas,
    ) -> Result<Self, ContractError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ContractError::EmptyId);
        }
        let input_hash = schemas.input.canonical_hash();
        let output_hash = schemas.output.canonical_hash();
        let error_hash = schemas.error.canonical_hash();
        let contract_hash = compute_contract_hash(
            &id,
            version,
            &declared_effects,
            input_hash,
            output_hash,
            error_hash,
        );
        Ok(Self {
            id,
            version,
            declared_effects,
            schemas,
            artifacts: ContractArtifacts {
                input_hash,
                output_hash,
                error_hash,
                contract_hash,
            },
        })
    }

    /// Recompute every artifact hash and compare against the sealed values.
    pub fn verify_integrity(&self) -> Result<(), ContractError> {
        let input_hash = self.schemas.input.canonical_hash();
        let output_hash = self.schemas.output.canonical_hash();
        let error_hash = self.schemas.error.canonical_hash();
        let expected = compute_contract_hash(
            &self.id,
            self.version,
            &self.declared_effects,
            input_hash,
            output_hash,
            error_hash,
        );
        if input_hash != self.artifacts.input_hash
            || output_hash != self.artifacts.output_hash
            || error_hash != self.artifacts.error_hash
            || expected != self.artifacts.contract_hash
        {
            return Err(ContractError::HashMismatch {
                expected,
                sealed: self.artifacts.contract_hash,
            });
        }
        Ok(())
    }

    /// `id@version` reference form.
    pub fn port_ref(&self) -> String {
        format!("{}@{}", self.id, self.version)
    }
}

/// Deterministic contract hash over identity, effects, and schema hashes.
///
/// The preimage is a domain tag plus canonical JSON bytes; `serde_json`
/// sorts object keys, and the effect set iterates in `BTreeSet` order.
pub fn compute_contract_hash(
    id: &str,
    version: SemVer,
    declared_effects: &BTreeSet<EffectKind>,
    input_hash: ContentHash,
    output_hash: ContentHash,
    error_hash: ContentHash,
) -> ContentHash {
    let effects: Vec<&str> = declared_effects.iter().map(|e| e.as_str()).collect();
    let preimage_value = json!({
        "declared_effects": effects,
        "error_schema_hash": error_hash.to_hex(),
        "id": id,
        "input_schema_hash": input_hash.to_hex(),
        "output_schema_hash": output_hash.to_hex(),
        "version": version.to_string(),
    });
    let body = serde_json::to_vec(&preimage_value).expect("preimage serialization is infallible");
    let mut preimage = Vec::with_capacity(CONTRACT_HASH_DOMAIN.len() + body.len());
    preimage.extend_from_slice(CONTRACT_HASH_DOMAIN);
    preimage.extend_from_slice(&body);
    ContentHash::compute(&preimage)
}

// ---------------------------------------------------------------------------
// ContractError
// ---------------------------------------------------------------------------

/// Errors from building or checking a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractError {
    EmptyId,
    HashMismatch {
        expected: ContentHash,
        sealed: ContentHash,
    },
}

impl fmt::Display for ContractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyId => f.write_str("contract id must not be empty"),
            Self::HashMismatch { expected, sealed } => {
                write!(f, "contract hash mismatch: expected {expected}, sealed {sealed}")
            }
        }
    }
}

impl std::error::Error for ContractError {}
