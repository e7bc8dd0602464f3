#![forbid(unsafe_code)]

//! Provider capability runtime: the enforcement half of the marketplace.
//!
//! Activation gates provider code behind a fail-closed check sequence:
//! manifest validation, host-API compatibility, binding-plan/lockfile
//! pairing and alignment, and — for every required capability port —
//! three-way `contract_hash` equality between the contract, the manifest
//! declaration, and the lockfile entry. Only after all checks pass is the
//! provider's own `activate` awaited.
//!
//! Invocation validates input against the contract's input schema, checks
//! that every observed effect was declared (before interpreting the
//! response at all), and validates output or error payloads against their
//! schemas. Provider faults never propagate raw; every failure is mapped
//! into the typed taxonomy.
//!
//! This crate deliberately does not load plugins (dynamic library,
//! subprocess, WASM — the embedder's choice) and has no internal timeout:
//! callers wrap `invoke` with their own cancellation and map it to
//! [`HostError::timeout`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use capmarket_core::binding::{check_alignment, BindingPlan};
use capmarket_core::contract::{CapabilityPortContract, EffectKind};
use capmarket_core::error_code::ErrorCategory;
use capmarket_core::hash::ContentHash;
use capmarket_core::host_api::{HostApiRange, SemVer};
use capmarket_core::lockfile::DeploymentLockfile;
use capmarket_core::manifest::{ManifestError, ProviderManifest};
use capmarket_core::schema::SchemaIssue;

use chrono::{DateTime, Utc};

const COMPONENT: &str = "provider_capability_runtime";

// ---------------------------------------------------------------------------
// Port keys
// ---------------------------------------------------------------------------

/// `port_id@port_version` key for contract registration and lookup.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortKey {
    pub port_id: String,
    pub port_version: SemVer,
}

impl PortKey {
    pub fn new(port_id: impl Into<String>, port_version: SemVer) -> Self {
        Self {
            port_id: port_id.into(),
            port_version,
        }
    }
}

impl fmt::Display for PortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.port_id, self.port_version)
    }
}

// ---------------------------------------------------------------------------
// Provider-facing contract
// ---------------------------------------------------------------------------

/// Failure reported by provider code itself. Always wrapped into the typed
/// taxonomy before reaching a caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("provider fault: {message}")]
pub struct ProviderFault {
    pub message: String,
}

impl ProviderFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Context handed to a provider's `activate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationContext {
    pub host_api_version: SemVer,
    pub activated_at: DateTime<Utc>,
}

/// One capability invocation as seen by provider code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityCall {
    pub port_id: String,
    pub port_version: SemVer,
    pub input: Value,
}

/// Raw response envelope returned by provider code, prior to any host
/// validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationEnvelope {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(default)]
    pub observed_effects: BTreeSet<EffectKind>,
}

/// A provider implementation, as loaded by the embedder.
///
/// How the implementation gets into the process (dynamic library,
/// subprocess RPC, WASM) is outside this crate; the runtime only needs
/// this activation contract.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    async fn activate(
        &self,
        context: ActivationContext,
    ) -> Result<Box<dyn ProviderInstance>, ProviderFault>;
}

/// An activated provider instance.
#[async_trait]
pub trait ProviderInstance: Send + Sync {
    async fn invoke(&self, call: CapabilityCall) -> Result<InvocationEnvelope, ProviderFault>;

    async fn deactivate(&self) -> Result<(), ProviderFault>;
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Typed runtime errors surfaced at the host boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("activation failed: {detail}")]
    Activation { detail: String },

    #[error("validation failed ({} issue(s))", issues.len())]
    Validation { issues: Vec<SchemaIssue> },

    #[error("host api incompatibility: {detail}")]
    Compatibility { detail: String },

    #[error("invocation failed: {detail}")]
    Invocation { detail: String },

    #[error("operation timed out")]
    Timeout,

    #[error("undeclared effect(s) observed: {}", format_effects(undeclared))]
    EffectViolation { undeclared: BTreeSet<EffectKind> },
}

fn format_effects(effects: &BTreeSet<EffectKind>) -> String {
    effects
        .iter()
        .map(|e| e.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl HostError {
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Activation { .. } => ErrorCategory::ActivationError,
            Self::Validation { .. } => ErrorCategory::ValidationError,
            Self::Compatibility { .. } => ErrorCategory::CompatibilityError,
            Self::Invocation { .. } => ErrorCategory::InvocationError,
            Self::Timeout => ErrorCategory::TimeoutError,
            Self::EffectViolation { .. } => ErrorCategory::EffectViolationError,
        }
    }

    /// The runtime never constructs this itself; embedders map their own
    /// cancellation of `invoke` into the taxonomy with it.
    pub const fn timeout() -> Self {
        Self::Timeout
    }

    fn activation(detail: impl Into<String>) -> Self {
        Self::Activation {
            detail: detail.into(),
        }
    }

    fn invocation(detail: impl Into<String>) -> Self {
        Self::Invocation {
            detail: detail.into(),
        }
    }
}

fn manifest_issues(error: &ManifestError) -> Vec<SchemaIssue> {
    let path = match error {
        ManifestError::EmptyProviderId => "$.provider_id",
        ManifestError::EmptyHostApiRange => "$.host_api_range",
        ManifestError::NoCapabilities | ManifestError::EmptyPortId { .. }
        | ManifestError::DuplicateCapability { .. } => "$.capabilities",
        ManifestError::Json(_) => "$",
    };
    vec![SchemaIssue::new(path, error.to_string())]
}

// ---------------------------------------------------------------------------
// Manifest check events
// ---------------------------------------------------------------------------

/// Correlation ids for a manifest check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestCheckContext<'a> {
    pub trace_id: &'a str,
    pub decision_id: &'a str,
    pub policy_id: &'a str,
}

/// Deterministic structured event emitted for every manifest check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestCheckEvent {
    pub trace_id: String,
    pub decision_id: String,
    pub policy_id: String,
    pub component: String,
    pub provider_ref: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

/// Manifest check outcome: structured event plus the typed error, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestCheckReport {
    pub event: ManifestCheckEvent,
    pub error: Option<ManifestError>,
}

impl ManifestCheckReport {
    pub fn into_result(self) -> Result<(), ManifestError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Validate a manifest, emitting a deterministic structured event either
/// way.
pub fn check_manifest_with_context(
    manifest: &ProviderManifest,
    context: &ManifestCheckContext<'_>,
) -> ManifestCheckReport {
    let error = manifest.validate().err();
    let event = ManifestCheckEvent {
        trace_id: context.trace_id.to_string(),
        decision_id: context.decision_id.to_string(),
        policy_id: context.policy_id.to_string(),
        component: COMPONENT.to_string(),
        provider_ref: format!("{}@{}", manifest.provider_id, manifest.provider_version),
        outcome: if error.is_none() { "pass" } else { "fail" }.to_string(),
        error_code: error
            .as_ref()
            .map(|_| ErrorCategory::ValidationError.stable_code()),
    };
    ManifestCheckReport { event, error }
}

// ---------------------------------------------------------------------------
// Invocation outcome
// ---------------------------------------------------------------------------

/// A fully validated invocation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvocationOutcome {
    /// Provider reported success; `output` conforms to the output schema.
    Completed {
        output: Value,
        observed_effects: BTreeSet<EffectKind>,
    },
    /// Provider reported a domain failure; `error` conforms to the error
    /// schema.
    Failed {
        error: Value,
        observed_effects: BTreeSet<EffectKind>,
    },
}

// ---------------------------------------------------------------------------
// ProviderHost
// ---------------------------------------------------------------------------

/// An activated provider, ready for invocation.
pub struct ActiveProvider {
    instance: Box<dyn ProviderInstance>,
    pub provider_id: String,
    pub provider_version: SemVer,
    pub activated_at: DateTime<Utc>,
}

impl fmt::Debug for ActiveProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveProvider")
            .field("provider_id", &self.provider_id)
            .field("provider_version", &self.provider_version)
            .field("activated_at", &self.activated_at)
            .finish_non_exhaustive()
    }
}

/// The capability runtime for one host-API version.
///
/// Holds the registered capability contracts and nothing else; no state is
/// shared across activations. Callers needing at-most-one activation per
/// provider version coordinate that themselves.
#[derive(Debug)]
pub struct ProviderHost {
    host_api_version: SemVer,
    contracts: BTreeMap<PortKey, CapabilityPortContract>,
}

impl ProviderHost {
    pub fn new(host_api_version: SemVer) -> Self {
        Self {
            host_api_version,
            contracts: BTreeMap::new(),
        }
    }

    pub fn host_api_version(&self) -> SemVer {
        self.host_api_version
    }

    /// Register a contract. Replaces any prior registration for the same
    /// port.
    pub fn register_contract(&mut self, contract: CapabilityPortContract) {
        let key = PortKey::new(contract.id.clone(), contract.version);
        self.contracts.insert(key, contract);
    }

    pub fn contract(&self, key: &PortKey) -> Option<&CapabilityPortContract> {
        self.contracts.get(key)
    }

    /// Run the full activation check sequence, then hand control to the
    /// provider.
    ///
    /// `plan` and `lockfile` must be supplied together or not at all; when
    /// present, every required port is held to three-way `contract_hash`
    /// equality across contract, manifest, and lockfile.
    pub async fn activate(
        &self,
        manifest: &ProviderManifest,
        provider: &dyn CapabilityProvider,
        plan: Option<&BindingPlan>,
        lockfile: Option<&DeploymentLockfile>,
        required_ports: &[PortKey],
        activated_at: DateTime<Utc>,
    ) -> Result<ActiveProvider, HostError> {
        // 1. Manifest structure.
        if let Err(error) = manifest.validate() {
            warn!(component = COMPONENT, %error, "manifest rejected");
            return Err(HostError::Validation {
                issues: manifest_issues(&error),
            });
        }

        // 2. Host-API compatibility (malformed range included).
        let range = HostApiRange::parse(&manifest.host_api_range).map_err(|error| {
            HostError::Compatibility {
                detail: error.to_string(),
            }
        })?;
        if !range.matches(self.host_api_version) {
            return Err(HostError::Compatibility {
                detail: format!(
                    "provider requires host api `{}`, runtime is {}",
                    manifest.host_api_range, self.host_api_version
                ),
            });
        }

        // 3. Plan/lockfile pairing and alignment.
        let pair = match (plan, lockfile) {
            (Some(plan), Some(lockfile)) => Some((plan, lockfile)),
            (None, None) => None,
            _ => {
                return Err(HostError::activation(
                    "binding plan and lockfile must be supplied together or not at all",
                ));
            }
        };
        if let Some((plan, lockfile)) = pair {
            check_alignment(plan, lockfile)
                .map_err(|error| HostError::activation(error.to_string()))?;
            if plan.host_api_version != self.host_api_version {
                return Err(HostError::activation(format!(
                    "plan targets host api {}, runtime is {}",
                    plan.host_api_version, self.host_api_version
                )));
            }
        }

        // 4. Per-port enforcement.
        for key in required_ports {
            let contract = self.contracts.get(key).ok_or_else(|| {
                HostError::activation(format!("no contract registered for {key}"))
            })?;
            let expected = contract.artifacts.contract_hash;

            let declared = manifest
                .capability(&key.port_id, key.port_version)
                .ok_or_else(|| {
                    HostError::activation(format!(
                        "manifest does not declare capability {key}"
                    ))
                })?;
            if declared.contract_hash != expected {
                return Err(HostError::activation(hash_mismatch_detail(
                    key,
                    "manifest",
                    expected,
                    declared.contract_hash,
                )));
            }

            if let Some((plan, lockfile)) = pair {
                let binding = plan.binding_for(&key.port_id, key.port_version).ok_or_else(
                    || HostError::activation(format!("binding plan does not bind {key}")),
                )?;
                if binding.resolution.provider_id() != Some(manifest.provider_id.as_str()) {
                    return Err(HostError::activation(format!(
                        "binding plan resolves {key} to a different provider"
                    )));
                }

                let locked = lockfile.provider(&manifest.provider_id).ok_or_else(|| {
                    HostError::activation(format!(
                        "lockfile has no entry for provider `{}`",
                        manifest.provider_id
                    ))
                })?;
                if locked.provider_version != manifest.provider_version {
                    return Err(HostError::activation(format!(
                        "lockfile pins `{}` at {}, manifest is {}",
                        manifest.provider_id, locked.provider_version, manifest.provider_version
                    )));
                }
                let locked_capability = locked
                    .capability(&key.port_id, key.port_version)
                    .ok_or_else(|| {
                        HostError::activation(format!("lockfile does not pin capability {key}"))
                    })?;
                if locked_capability.contract_hash != expected {
                    return Err(HostError::activation(hash_mismatch_detail(
                        key,
                        "lockfile",
                        expected,
                        locked_capability.contract_hash,
                    )));
                }
            }
        }

        // 5. Hand control to provider code; faults become activation
        // errors, never raw propagation.
        debug!(
            component = COMPONENT,
            provider_id = %manifest.provider_id,
            provider_version = %manifest.provider_version,
            "activation checks passed"
        );
        let instance = provider
            .activate(ActivationContext {
                host_api_version: self.host_api_version,
                activated_at,
            })
            .await
            .map_err(|fault| HostError::activation(fault.to_string()))?;

        Ok(ActiveProvider {
            instance,
            provider_id: manifest.provider_id.clone(),
            provider_version: manifest.provider_version,
            activated_at,
        })
    }

    /// Invoke one capability on an activated provider.
    pub async fn invoke(
        &self,
        active: &ActiveProvider,
        key: &PortKey,
        input: Value,
    ) -> Result<InvocationOutcome, HostError> {
        let contract = self
            .contracts
            .get(key)
            .ok_or_else(|| HostError::invocation(format!("no contract registered for {key}")))?;

        contract
            .schemas
            .input
            .check(&input)
            .map_err(|issues| HostError::Validation { issues })?;

        let envelope = active
            .instance
            .invoke(CapabilityCall {
                port_id: key.port_id.clone(),
                port_version: key.port_version,
                input,
            })
            .await
            .map_err(|fault| HostError::invocation(fault.to_string()))?;

        // Envelope structure before anything else.
        if envelope.ok && envelope.output.is_none() {
            return Err(HostError::invocation(
                "envelope reports ok without an output payload",
            ));
        }
        if !envelope.ok && envelope.error.is_none() {
            return Err(HostError::invocation(
                "envelope reports failure without an error payload",
            ));
        }

        // Effect containment is checked before `ok` is interpreted: a
        // provider cannot launder undeclared effects through a failure
        // response.
        let undeclared: BTreeSet<EffectKind> = envelope
            .observed_effects
            .difference(&contract.declared_effects)
            .copied()
            .collect();
        if !undeclared.is_empty() {
            warn!(
                component = COMPONENT,
                port = %key,
                undeclared = %format_effects(&undeclared),
                "effect containment violated"
            );
            return Err(HostError::EffectViolation { undeclared });
        }

        let InvocationEnvelope {
            ok,
            output,
            error,
            observed_effects,
        } = envelope;
        match (ok, output, error) {
            (true, Some(output), _) => {
                contract
                    .schemas
                    .output
                    .check(&output)
                    .map_err(|issues| HostError::Validation { issues })?;
                Ok(InvocationOutcome::Completed {
                    output,
                    observed_effects,
                })
            }
            (false, _, Some(error)) => {
                contract
                    .schemas
                    .error
                    .check(&error)
                    .map_err(|issues| HostError::Validation { issues })?;
                Ok(InvocationOutcome::Failed {
                    error,
                    observed_effects,
                })
            }
            // Unreachable after the structural checks above.
            _ => Err(HostError::invocation("envelope structure invalid")),
        }
    }

    /// Deactivate an activated provider. A provider fault is wrapped, not
    /// propagated.
    pub async fn deactivate(&self, active: ActiveProvider) -> Result<(), HostError> {
        active
            .instance
            .deactivate()
            .await
            .map_err(|fault| HostError::activation(fault.to_string()))
    }
}

fn hash_mismatch_detail(
    key: &PortKey,
    artifact: &str,
    expected: ContentHash,
    actual: ContentHash,
) -> String {
    format!("{artifact} contract hash for {key} is {actual}, contract requires {expected}")
}
