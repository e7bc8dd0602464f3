//! Activation edge cases: manifest gates, host-API compatibility, plan and
//! lockfile pairing, and the three-way contract-hash equality check.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use capmarket_core::binding::{BindingPlan, CapabilityBinding, CapabilityResolution};
use capmarket_core::contract::{CapabilityPortContract, ContractSchemas, EffectKind};
use capmarket_core::error_code::ErrorCategory;
use capmarket_core::hash::ContentHash;
use capmarket_core::host_api::SemVer;
use capmarket_core::lockfile::{DeploymentLockfile, LockedCapability, LockedProvider};
use capmarket_core::manifest::{ManifestCapability, ProviderManifest};
use capmarket_core::schema::ValueSchema;
use capmarket_provider_host::{
    ActivationContext, CapabilityCall, CapabilityProvider, HostError, InvocationEnvelope,
    PortKey, ProviderFault, ProviderHost, ProviderInstance,
};

// ---------------------------------------------------------------------------
// Test provider
// ---------------------------------------------------------------------------

struct EchoInstance;

#[async_trait]
impl ProviderInstance for EchoInstance {
    async fn invoke(&self, call: CapabilityCall) -> Result<InvocationEnvelope, ProviderFault> {
        Ok(InvocationEnvelope {
            ok: true,
            output: Some(call.input),
            error: None,
            observed_effects: BTreeSet::new(),
        })
    }

    async fn deactivate(&self) -> Result<(), ProviderFault> {
        Ok(())
    }
}

struct EchoProvider {
    fail_activation: bool,
}

#[async_trait]
impl CapabilityProvider for EchoProvider {
    async fn activate(
        &self,
        _context: ActivationContext,
    ) -> Result<Box<dyn ProviderInstance>, ProviderFault> {
        if self.fail_activation {
            Err(ProviderFault::new("init crashed"))
        } else {
            Ok(Box::new(EchoInstance))
        }
    }
}

struct FailingDeactivation;

#[async_trait]
impl ProviderInstance for FailingDeactivation {
    async fn invoke(&self, _call: CapabilityCall) -> Result<InvocationEnvelope, ProviderFault> {
        Err(ProviderFault::new("not implemented"))
    }

    async fn deactivate(&self) -> Result<(), ProviderFault> {
        Err(ProviderFault::new("cleanup failed"))
    }
}

struct FailingDeactivationProvider;

#[async_trait]
impl CapabilityProvider for FailingDeactivationProvider {
    async fn activate(
        &self,
        _context: ActivationContext,
    ) -> Result<Box<dyn ProviderInstance>, ProviderFault> {
        Ok(Box::new(FailingDeactivation))
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

const PORT_ID: &str = "notifications.send";
const PROVIDER_ID: &str = "acme.notifier";

fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).unwrap()
}

fn contract() -> CapabilityPortContract {
    CapabilityPortContract::seal(
        PORT_ID,
        SemVer::new(1, 0, 0),
        BTreeSet::from([EffectKind::Network]),
        ContractSchemas {
            input: ValueSchema::Any,
            output: ValueSchema::Any,
            error: ValueSchema::Any,
        },
    )
    .unwrap()
}

fn port_key() -> PortKey {
    PortKey::new(PORT_ID, SemVer::new(1, 0, 0))
}

fn host() -> ProviderHost {
    let mut host = ProviderHost::new(SemVer::new(1, 2, 0));
    host.register_contract(contract());
    host
}

fn manifest() -> ProviderManifest {
    ProviderManifest {
        provider_id: PROVIDER_ID.to_string(),
        provider_version: SemVer::new(2, 0, 0),
        host_api_range: "^1.0.0".to_string(),
        capabilities: vec![ManifestCapability {
            port_id: PORT_ID.to_string(),
            port_version: SemVer::new(1, 0, 0),
            contract_hash: contract().artifacts.contract_hash,
        }],
    }
}

fn plan() -> BindingPlan {
    BindingPlan {
        app_id: "crm".to_string(),
        environment: "production".to_string(),
        host_api_version: SemVer::new(1, 2, 0),
        capability_bindings: vec![CapabilityBinding {
            port_id: PORT_ID.to_string(),
            port_version: SemVer::new(1, 0, 0),
            resolution: CapabilityResolution::Local {
                target_host: "host-a".to_string(),
                provider_id: PROVIDER_ID.to_string(),
            },
        }],
    }
}

fn lockfile() -> DeploymentLockfile {
    DeploymentLockfile {
        app_id: "crm".to_string(),
        environment: "production".to_string(),
        host_api_version: SemVer::new(1, 2, 0),
        providers: vec![LockedProvider {
            provider_id: PROVIDER_ID.to_string(),
            provider_version: SemVer::new(2, 0, 0),
            integrity: ContentHash::compute(b"build-artifact"),
            capabilities: vec![LockedCapability {
                port_id: PORT_ID.to_string(),
                port_version: SemVer::new(1, 0, 0),
                contract_hash: contract().artifacts.contract_hash,
            }],
        }],
    }
}

// ---------------------------------------------------------------------------
// Happy paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn activates_with_aligned_plan_and_lockfile() {
    let host = host();
    let active = host
        .activate(
            &manifest(),
            &EchoProvider {
                fail_activation: false,
            },
            Some(&plan()),
            Some(&lockfile()),
            &[port_key()],
            at(1_000),
        )
        .await
        .unwrap();
    assert_eq!(active.provider_id, PROVIDER_ID);
    assert_eq!(active.provider_version, SemVer::new(2, 0, 0));
    assert_eq!(active.activated_at, at(1_000));
}

#[tokio::test]
async fn activates_without_deployment_artifacts() {
    // Neither plan nor lockfile: manifest-vs-contract equality still holds.
    let host = host();
    let result = host
        .activate(
            &manifest(),
            &EchoProvider {
                fail_activation: false,
            },
            None,
            None,
            &[port_key()],
            at(1_000),
        )
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn deactivation_fault_is_wrapped_as_activation_error() {
    let host = host();
    let active = host
        .activate(
            &manifest(),
            &FailingDeactivationProvider,
            None,
            None,
            &[port_key()],
            at(1_000),
        )
        .await
        .unwrap();
    let err = host.deactivate(active).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ActivationError);
    assert!(err.to_string().contains("cleanup failed"));
}

// ---------------------------------------------------------------------------
// Manifest and compatibility gates
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_manifest_is_a_validation_error() {
    let host = host();
    let mut bad = manifest();
    bad.capabilities.clear();
    let err = host
        .activate(
            &bad,
            &EchoProvider {
                fail_activation: false,
            },
            None,
            None,
            &[port_key()],
            at(1_000),
        )
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ValidationError);
}

#[tokio::test]
async fn malformed_host_api_range_is_a_compatibility_error() {
    let host = host();
    let mut bad = manifest();
    bad.host_api_range = "~1.0.0".to_string();
    let err = host
        .activate(
            &bad,
            &EchoProvider {
                fail_activation: false,
            },
            None,
            None,
            &[port_key()],
            at(1_000),
        )
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::CompatibilityError);
}

#[tokio::test]
async fn incompatible_host_api_is_a_compatibility_error() {
    // Runtime is 1.2.0; provider demands major 2.
    let host = host();
    let mut bad = manifest();
    bad.host_api_range = "^2.0.0".to_string();
    let err = host
        .activate(
            &bad,
            &EchoProvider {
                fail_activation: false,
            },
            None,
            None,
            &[port_key()],
            at(1_000),
        )
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::CompatibilityError);
}

#[tokio::test]
async fn wildcard_range_activates_on_any_runtime() {
    let mut host = ProviderHost::new(SemVer::new(9, 9, 9));
    host.register_contract(contract());
    let mut wildcard = manifest();
    wildcard.host_api_range = "*".to_string();
    let result = host
        .activate(
            &wildcard,
            &EchoProvider {
                fail_activation: false,
            },
            None,
            None,
            &[port_key()],
            at(1_000),
        )
        .await;
    assert!(result.is_ok());
}

// ---------------------------------------------------------------------------
// Plan/lockfile pairing and alignment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn plan_without_lockfile_is_an_activation_error() {
    let host = host();
    let err = host
        .activate(
            &manifest(),
            &EchoProvider {
                fail_activation: false,
            },
            Some(&plan()),
            None,
            &[port_key()],
            at(1_000),
        )
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ActivationError);
    assert!(err.to_string().contains("together"));
}

#[tokio::test]
async fn lockfile_without_plan_is_an_activation_error() {
    let host = host();
    let err = host
        .activate(
            &manifest(),
            &EchoProvider {
                fail_activation: false,
            },
            None,
            Some(&lockfile()),
            &[port_key()],
            at(1_000),
        )
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ActivationError);
}

#[tokio::test]
async fn misaligned_environment_is_an_activation_error() {
    let host = host();
    let mut staging_lockfile = lockfile();
    staging_lockfile.environment = "staging".to_string();
    let err = host
        .activate(
            &manifest(),
            &EchoProvider {
                fail_activation: false,
            },
            Some(&plan()),
            Some(&staging_lockfile),
            &[port_key()],
            at(1_000),
        )
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ActivationError);
    assert!(err.to_string().contains("environment"));
}

#[tokio::test]
async fn plan_for_other_runtime_version_is_an_activation_error() {
    let host = host();
    let mut old_plan = plan();
    old_plan.host_api_version = SemVer::new(1, 1, 0);
    let mut old_lockfile = lockfile();
    old_lockfile.host_api_version = SemVer::new(1, 1, 0);
    // Plan and lockfile agree with each other but not with the runtime.
    let err = host
        .activate(
            &manifest(),
            &EchoProvider {
                fail_activation: false,
            },
            Some(&old_plan),
            Some(&old_lockfile),
            &[port_key()],
            at(1_000),
        )
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ActivationError);
}

// ---------------------------------------------------------------------------
// Three-way contract-hash enforcement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn manifest_hash_divergence_fails_activation() {
    let host = host();
    let mut tampered = manifest();
    tampered.capabilities[0].contract_hash = ContentHash::compute(b"stale-contract");
    let err = host
        .activate(
            &tampered,
            &EchoProvider {
                fail_activation: false,
            },
            Some(&plan()),
            Some(&lockfile()),
            &[port_key()],
            at(1_000),
        )
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ActivationError);
    assert!(err.to_string().contains("manifest contract hash"));
}

#[tokio::test]
async fn lockfile_hash_divergence_fails_activation() {
    let host = host();
    let mut tampered = lockfile();
    tampered.providers[0].capabilities[0].contract_hash = ContentHash::compute(b"stale-contract");
    let err = host
        .activate(
            &manifest(),
            &EchoProvider {
                fail_activation: false,
            },
            Some(&plan()),
            Some(&tampered),
            &[port_key()],
            at(1_000),
        )
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ActivationError);
    assert!(err.to_string().contains("lockfile contract hash"));
}

#[tokio::test]
async fn plan_bound_to_other_provider_fails_activation() {
    let host = host();
    let mut foreign_plan = plan();
    foreign_plan.capability_bindings[0].resolution = CapabilityResolution::Local {
        target_host: "host-a".to_string(),
        provider_id: "rival.notifier".to_string(),
    };
    let err = host
        .activate(
            &manifest(),
            &EchoProvider {
                fail_activation: false,
            },
            Some(&foreign_plan),
            Some(&lockfile()),
            &[port_key()],
            at(1_000),
        )
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ActivationError);
    assert!(err.to_string().contains("different provider"));
}

#[tokio::test]
async fn lockfile_pinning_other_version_fails_activation() {
    let host = host();
    let mut stale = lockfile();
    stale.providers[0].provider_version = SemVer::new(1, 9, 0);
    let err = host
        .activate(
            &manifest(),
            &EchoProvider {
                fail_activation: false,
            },
            Some(&plan()),
            Some(&stale),
            &[port_key()],
            at(1_000),
        )
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ActivationError);
}

#[tokio::test]
async fn lockfile_missing_provider_fails_activation() {
    let host = host();
    let mut empty = lockfile();
    empty.providers.clear();
    let err = host
        .activate(
            &manifest(),
            &EchoProvider {
                fail_activation: false,
            },
            Some(&plan()),
            Some(&empty),
            &[port_key()],
            at(1_000),
        )
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ActivationError);
}

#[tokio::test]
async fn unregistered_contract_fails_activation() {
    let bare_host = ProviderHost::new(SemVer::new(1, 2, 0));
    let err = bare_host
        .activate(
            &manifest(),
            &EchoProvider {
                fail_activation: false,
            },
            Some(&plan()),
            Some(&lockfile()),
            &[port_key()],
            at(1_000),
        )
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ActivationError);
    assert!(err.to_string().contains("no contract registered"));
}

// ---------------------------------------------------------------------------
// Provider faults
// ---------------------------------------------------------------------------

#[tokio::test]
async fn provider_activation_fault_is_wrapped() {
    let host = host();
    let err = host
        .activate(
            &manifest(),
            &EchoProvider {
                fail_activation: true,
            },
            Some(&plan()),
            Some(&lockfile()),
            &[port_key()],
            at(1_000),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HostError::Activation { .. }));
    assert!(err.to_string().contains("init crashed"));
}

#[tokio::test]
async fn activated_provider_echoes_input() {
    let host = host();
    let active = host
        .activate(
            &manifest(),
            &EchoProvider {
                fail_activation: false,
            },
            Some(&plan()),
            Some(&lockfile()),
            &[port_key()],
            at(1_000),
        )
        .await
        .unwrap();
    let outcome = host
        .invoke(&active, &port_key(), json!({"message": "hello"}))
        .await
        .unwrap();
    match outcome {
        capmarket_provider_host::InvocationOutcome::Completed { output, .. } => {
            assert_eq!(output, json!({"message": "hello"}));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}
