//! Invocation edge cases: schema validation, envelope structure, and
//! effect containment.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use capmarket_core::contract::{CapabilityPortContract, ContractSchemas, EffectKind};
use capmarket_core::error_code::ErrorCategory;
use capmarket_core::host_api::SemVer;
use capmarket_core::manifest::{ManifestCapability, ProviderManifest};
use capmarket_core::schema::ValueSchema;
use capmarket_provider_host::{
    ActivationContext, CapabilityCall, CapabilityProvider, HostError, InvocationEnvelope,
    InvocationOutcome, PortKey, ProviderFault, ProviderHost, ProviderInstance,
};

// ---------------------------------------------------------------------------
// Scripted provider
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum Script {
    Respond(InvocationEnvelope),
    Fault(String),
    Hang,
}

struct ScriptedInstance {
    script: Script,
}

#[async_trait]
impl ProviderInstance for ScriptedInstance {
    async fn invoke(&self, _call: CapabilityCall) -> Result<InvocationEnvelope, ProviderFault> {
        match &self.script {
            Script::Respond(envelope) => Ok(envelope.clone()),
            Script::Fault(message) => Err(ProviderFault::new(message.clone())),
            Script::Hang => std::future::pending().await,
        }
    }

    async fn deactivate(&self) -> Result<(), ProviderFault> {
        Ok(())
    }
}

struct ScriptedProvider {
    script: Script,
}

#[async_trait]
impl CapabilityProvider for ScriptedProvider {
    async fn activate(
        &self,
        _context: ActivationContext,
    ) -> Result<Box<dyn ProviderInstance>, ProviderFault> {
        Ok(Box::new(ScriptedInstance {
            script: self.script.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

const PORT_ID: &str = "notifications.send";

fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).unwrap()
}

/// Contract with real schemas: input `{message}`, output `{delivered}`,
/// error `{code}`; only `network` and `emit` effects declared.
fn contract() -> CapabilityPortContract {
    CapabilityPortContract::seal(
        PORT_ID,
        SemVer::new(1, 0, 0),
        BTreeSet::from([EffectKind::Network, EffectKind::Emit]),
        ContractSchemas {
            input: ValueSchema::object(BTreeMap::from([(
                "message".to_string(),
                ValueSchema::String,
            )])),
            output: ValueSchema::object(BTreeMap::from([(
                "delivered".to_string(),
                ValueSchema::Bool,
            )])),
            error: ValueSchema::object(BTreeMap::from([(
                "code".to_string(),
                ValueSchema::String,
            )])),
        },
    )
    .unwrap()
}

fn port_key() -> PortKey {
    PortKey::new(PORT_ID, SemVer::new(1, 0, 0))
}

fn manifest() -> ProviderManifest {
    ProviderManifest {
        provider_id: "acme.notifier".to_string(),
        provider_version: SemVer::new(2, 0, 0),
        host_api_range: "*".to_string(),
        capabilities: vec![ManifestCapability {
            port_id: PORT_ID.to_string(),
            port_version: SemVer::new(1, 0, 0),
            contract_hash: contract().artifacts.contract_hash,
        }],
    }
}

async fn activated_with(script: Script) -> (ProviderHost, capmarket_provider_host::ActiveProvider) {
    let mut host = ProviderHost::new(SemVer::new(1, 0, 0));
    host.register_contract(contract());
    let provider = ScriptedProvider { script };
    let active = host
        .activate(&manifest(), &provider, None, None, &[port_key()], at(1_000))
        .await
        .unwrap();
    (host, active)
}

fn ok_envelope() -> InvocationEnvelope {
    InvocationEnvelope {
        ok: true,
        output: Some(json!({"delivered": true})),
        error: None,
        observed_effects: BTreeSet::from([EffectKind::Network]),
    }
}

// ---------------------------------------------------------------------------
// Happy paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn valid_invocation_completes() {
    let (host, active) = activated_with(Script::Respond(ok_envelope())).await;
    let outcome = host
        .invoke(&active, &port_key(), json!({"message": "hi"}))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        InvocationOutcome::Completed {
            output: json!({"delivered": true}),
            observed_effects: BTreeSet::from([EffectKind::Network]),
        }
    );
}

#[tokio::test]
async fn domain_failure_with_valid_error_payload() {
    let (host, active) = activated_with(Script::Respond(InvocationEnvelope {
        ok: false,
        output: None,
        error: Some(json!({"code": "recipient_unknown"})),
        observed_effects: BTreeSet::from([EffectKind::Network]),
    }))
    .await;
    let outcome = host
        .invoke(&active, &port_key(), json!({"message": "hi"}))
        .await
        .unwrap();
    assert!(matches!(outcome, InvocationOutcome::Failed { .. }));
}

// ---------------------------------------------------------------------------
// Contract lookup & input validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_port_is_an_invocation_error() {
    let (host, active) = activated_with(Script::Respond(ok_envelope())).await;
    let err = host
        .invoke(
            &active,
            &PortKey::new("payments.charge", SemVer::new(1, 0, 0)),
            json!({}),
        )
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvocationError);
}

#[tokio::test]
async fn invalid_input_is_rejected_before_the_provider_runs() {
    let (host, active) = activated_with(Script::Fault("must never be reached".to_string())).await;
    let err = host
        .invoke(&active, &port_key(), json!({"message": 42}))
        .await
        .unwrap_err();
    let HostError::Validation { issues } = &err else {
        panic!("expected validation error, got {err:?}");
    };
    assert_eq!(issues[0].path, "$.message");
}

#[tokio::test]
async fn provider_fault_is_an_invocation_error() {
    let (host, active) = activated_with(Script::Fault("connection reset".to_string())).await;
    let err = host
        .invoke(&active, &port_key(), json!({"message": "hi"}))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvocationError);
    assert!(err.to_string().contains("connection reset"));
}

// ---------------------------------------------------------------------------
// Envelope structure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ok_without_output_is_an_invocation_error() {
    let (host, active) = activated_with(Script::Respond(InvocationEnvelope {
        ok: true,
        output: None,
        error: None,
        observed_effects: BTreeSet::new(),
    }))
    .await;
    let err = host
        .invoke(&active, &port_key(), json!({"message": "hi"}))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvocationError);
}

#[tokio::test]
async fn failure_without_error_payload_is_an_invocation_error() {
    let (host, active) = activated_with(Script::Respond(InvocationEnvelope {
        ok: false,
        output: None,
        error: None,
        observed_effects: BTreeSet::new(),
    }))
    .await;
    let err = host
        .invoke(&active, &port_key(), json!({"message": "hi"}))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvocationError);
}

// ---------------------------------------------------------------------------
// Effect containment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn undeclared_effect_fails_even_on_success() {
    let (host, active) = activated_with(Script::Respond(InvocationEnvelope {
        ok: true,
        output: Some(json!({"delivered": true})),
        error: None,
        observed_effects: BTreeSet::from([EffectKind::Network, EffectKind::Write]),
    }))
    .await;
    let err = host
        .invoke(&active, &port_key(), json!({"message": "hi"}))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        HostError::EffectViolation {
            undeclared: BTreeSet::from([EffectKind::Write]),
        }
    );
}

#[tokio::test]
async fn undeclared_effect_fails_even_on_reported_failure() {
    // A failing response cannot launder an undeclared effect.
    let (host, active) = activated_with(Script::Respond(InvocationEnvelope {
        ok: false,
        output: None,
        error: Some(json!({"code": "oops"})),
        observed_effects: BTreeSet::from([EffectKind::Session]),
    }))
    .await;
    let err = host
        .invoke(&active, &port_key(), json!({"message": "hi"}))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::EffectViolationError);
}

#[tokio::test]
async fn effect_check_precedes_output_validation() {
    // Both violations present: the effect violation must win.
    let (host, active) = activated_with(Script::Respond(InvocationEnvelope {
        ok: true,
        output: Some(json!({"delivered": "not-a-bool"})),
        error: None,
        observed_effects: BTreeSet::from([EffectKind::Write]),
    }))
    .await;
    let err = host
        .invoke(&active, &port_key(), json!({"message": "hi"}))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::EffectViolationError);
}

// ---------------------------------------------------------------------------
// Output/error schema validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn nonconforming_output_is_a_validation_error() {
    let (host, active) = activated_with(Script::Respond(InvocationEnvelope {
        ok: true,
        output: Some(json!({"delivered": "yes"})),
        error: None,
        observed_effects: BTreeSet::from([EffectKind::Network]),
    }))
    .await;
    let err = host
        .invoke(&active, &port_key(), json!({"message": "hi"}))
        .await
        .unwrap_err();
    let HostError::Validation { issues } = &err else {
        panic!("expected validation error, got {err:?}");
    };
    assert_eq!(issues[0].path, "$.delivered");
}

#[tokio::test]
async fn nonconforming_error_payload_is_a_validation_error() {
    let (host, active) = activated_with(Script::Respond(InvocationEnvelope {
        ok: false,
        output: None,
        error: Some(json!({"code": 500})),
        observed_effects: BTreeSet::new(),
    }))
    .await;
    let err = host
        .invoke(&active, &port_key(), json!({"message": "hi"}))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ValidationError);
}

// ---------------------------------------------------------------------------
// Timeout mapping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn caller_side_cancellation_maps_to_timeout_category() {
    // The runtime has no internal timer; embedders race `invoke` against
    // their own deadline and map the elapsed case themselves.
    let (host, active) = activated_with(Script::Hang).await;
    let raced = tokio::time::timeout(
        std::time::Duration::from_millis(10),
        host.invoke(&active, &port_key(), json!({"message": "hi"})),
    )
    .await;
    let err = match raced {
        Err(_elapsed) => HostError::timeout(),
        Ok(result) => result.expect_err("hanging provider cannot respond"),
    };
    assert_eq!(err.category(), ErrorCategory::TimeoutError);
}
