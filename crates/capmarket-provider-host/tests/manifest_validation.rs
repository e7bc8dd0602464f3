//! Manifest validation: structured check events and the JSON decode path.

use capmarket_core::hash::ContentHash;
use capmarket_core::host_api::SemVer;
use capmarket_core::manifest::{ManifestCapability, ManifestError, ProviderManifest};
use capmarket_provider_host::{check_manifest_with_context, ManifestCheckContext};

fn context() -> ManifestCheckContext<'static> {
    ManifestCheckContext {
        trace_id: "trace-42",
        decision_id: "decision-42",
        policy_id: "policy-baseline",
    }
}

fn good_manifest() -> ProviderManifest {
    ProviderManifest {
        provider_id: "acme.notifier".to_string(),
        provider_version: SemVer::new(2, 0, 0),
        host_api_range: "^1.0.0".to_string(),
        capabilities: vec![ManifestCapability {
            port_id: "notifications.send".to_string(),
            port_version: SemVer::new(1, 0, 0),
            contract_hash: ContentHash::compute(b"contract"),
        }],
    }
}

#[test]
fn passing_manifest_emits_pass_event() {
    let report = check_manifest_with_context(&good_manifest(), &context());
    assert_eq!(report.event.outcome, "pass");
    assert_eq!(report.event.trace_id, "trace-42");
    assert_eq!(report.event.provider_ref, "acme.notifier@2.0.0");
    assert_eq!(report.event.component, "provider_capability_runtime");
    assert!(report.event.error_code.is_none());
    assert!(report.into_result().is_ok());
}

#[test]
fn failing_manifest_emits_fail_event_with_stable_code() {
    let mut manifest = good_manifest();
    manifest.provider_id = String::new();
    let report = check_manifest_with_context(&manifest, &context());
    assert_eq!(report.event.outcome, "fail");
    assert_eq!(report.event.error_code.as_deref(), Some("CM-4001"));
    assert_eq!(report.into_result().unwrap_err(), ManifestError::EmptyProviderId);
}

#[test]
fn check_events_are_deterministic() {
    let first = check_manifest_with_context(&good_manifest(), &context());
    let second = check_manifest_with_context(&good_manifest(), &context());
    assert_eq!(
        serde_json::to_vec(&first.event).unwrap(),
        serde_json::to_vec(&second.event).unwrap()
    );
}

#[test]
fn json_decode_path_rejects_duplicates() {
    let mut manifest = good_manifest();
    manifest.capabilities.push(manifest.capabilities[0].clone());
    let text = serde_json::to_string(&manifest).unwrap();
    let err = ProviderManifest::from_json_str(&text).unwrap_err();
    assert!(matches!(err, ManifestError::DuplicateCapability { .. }));
}

#[test]
fn json_decode_path_round_trips_valid_manifests() {
    let text = serde_json::to_string(&good_manifest()).unwrap();
    let decoded = ProviderManifest::from_json_str(&text).unwrap();
    assert_eq!(decoded, good_manifest());
}
