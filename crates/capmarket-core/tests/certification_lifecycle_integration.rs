//! Integration tests for the certification lifecycle against listings and
//! trust decisions.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeZone, Utc};

use capmarket_core::certification::{
    CertificationError, CertificationEvidence, CertificationOutcome, CertificationPolicy,
    CertificationRegistry, CertificationReport, CertificationStatus, TrustGate,
};
use capmarket_core::hash::ContentHash;
use capmarket_core::host_api::SemVer;
use capmarket_core::listing::{Listing, ListingRelease, ListingTransition};
use capmarket_core::manifest::ProviderRef;
use capmarket_core::trust::{
    verify_trust, TrustPolicy, TrustSubject, TrustVerificationRequest, TrustVerdict,
    VerificationMode,
};

fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).unwrap()
}

fn release() -> ProviderRef {
    ProviderRef::new("acme.notifier", SemVer::new(2, 1, 0))
}

fn active_listing() -> Listing {
    Listing::submit(
        "acme",
        "acme.notifier",
        SemVer::new(2, 1, 0),
        BTreeMap::new(),
        ListingRelease {
            artifact_hash: ContentHash::compute(b"release-artifact"),
            released_at: at(100),
        },
    )
    .apply(ListingTransition::Activate, "release-bot", at(200))
    .unwrap()
}

fn policy_with_trust_gate() -> CertificationPolicy {
    CertificationPolicy {
        profile_id: "soc2".to_string(),
        required_evidence_kinds: BTreeSet::from(["soc2_report".to_string()]),
        trust: TrustGate {
            required: true,
            required_verdict: TrustVerdict::Trusted,
        },
    }
}

fn evidence() -> Vec<CertificationEvidence> {
    vec![CertificationEvidence {
        kind: "soc2_report".to_string(),
        reference: "audits/2026/acme-soc2.pdf".to_string(),
    }]
}

fn trusted_decision() -> capmarket_core::trust::TrustDecisionReport {
    let artifact = ContentHash::compute(b"release-artifact");
    verify_trust(
        &TrustVerificationRequest {
            subject: TrustSubject {
                provider_id: "acme.notifier".to_string(),
                provider_version: SemVer::new(2, 1, 0),
                namespace: "acme".to_string(),
            },
            artifact_hash: artifact,
            signatures: vec![capmarket_core::trust::ArtifactSignature {
                subject_id: "acme-signing-key".to_string(),
                signed_artifact_hash: artifact,
            }],
            attestations: vec![],
            certification_status: CertificationStatus::Pending,
            revoked: false,
            mode: VerificationMode::Staging,
            policy: TrustPolicy {
                required_subject_ids: BTreeSet::from(["acme-signing-key".to_string()]),
                required_builder_ids: BTreeSet::new(),
                require_artifact_signature: true,
                require_provenance_attestation: false,
                fail_closed_modes: BTreeSet::new(),
                require_certified_status_in_fail_closed_modes: false,
            },
        },
        at(900),
    )
    .unwrap()
}

#[test]
fn full_certification_round_trip() {
    let mut registry = CertificationRegistry::new();
    let listing = active_listing();

    registry
        .start(Some(&listing), &release(), "soc2", "auditor", at(1_000))
        .unwrap();
    assert_eq!(registry.status(&release()), CertificationStatus::Pending);

    let decision = trusted_decision();
    let record = registry
        .complete(
            &release(),
            &policy_with_trust_gate(),
            evidence(),
            Some(&decision),
            CertificationReport {
                outcome: CertificationOutcome::Pass,
                summary: "controls effective".to_string(),
            },
            "auditor",
            at(2_000),
        )
        .unwrap();
    assert_eq!(record.status, CertificationStatus::Certified);
    assert_eq!(record.audit.len(), 2);

    let record = registry.revoke(&release(), "security-team", at(3_000)).unwrap();
    assert_eq!(record.status, CertificationStatus::Revoked);
    assert_eq!(record.audit.len(), 3);
    assert_eq!(record.audit[2].actor_id, "security-team");
}

#[test]
fn complete_without_start_is_rejected() {
    let mut registry = CertificationRegistry::new();
    let err = registry
        .complete(
            &release(),
            &policy_with_trust_gate(),
            evidence(),
            Some(&trusted_decision()),
            CertificationReport {
                outcome: CertificationOutcome::Pass,
                summary: "never started".to_string(),
            },
            "auditor",
            at(1_000),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        CertificationError::InvalidTransition {
            from: CertificationStatus::None,
            ..
        }
    ));
}

#[test]
fn untrusted_decision_blocks_certification_with_failures() {
    let mut registry = CertificationRegistry::new();
    registry
        .start(Some(&active_listing()), &release(), "soc2", "auditor", at(1_000))
        .unwrap();

    let mut decision = trusted_decision();
    decision.verdict = TrustVerdict::Untrusted;

    let err = registry
        .complete(
            &release(),
            &policy_with_trust_gate(),
            evidence(),
            Some(&decision),
            CertificationReport {
                outcome: CertificationOutcome::Pass,
                summary: "evaluator said pass".to_string(),
            },
            "auditor",
            at(2_000),
        )
        .unwrap_err();
    let CertificationError::RequirementFailed { failures } = err else {
        panic!("expected requirement failure");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].gate, "trust");
    // The record is untouched by the failed transition.
    assert_eq!(registry.status(&release()), CertificationStatus::Pending);
}

#[test]
fn fail_outcome_yields_rejected_and_allows_new_round() {
    let mut registry = CertificationRegistry::new();
    let listing = active_listing();
    registry
        .start(Some(&listing), &release(), "soc2", "auditor", at(1_000))
        .unwrap();
    registry
        .complete(
            &release(),
            &policy_with_trust_gate(),
            evidence(),
            Some(&trusted_decision()),
            CertificationReport {
                outcome: CertificationOutcome::Fail,
                summary: "control gaps in change management".to_string(),
            },
            "auditor",
            at(2_000),
        )
        .unwrap();
    assert_eq!(registry.status(&release()), CertificationStatus::Rejected);

    // Rejected is terminal; a fresh round may supersede it.
    registry
        .start(Some(&listing), &release(), "soc2", "auditor", at(3_000))
        .unwrap();
    assert_eq!(registry.status(&release()), CertificationStatus::Pending);
}

#[test]
fn deprecated_listing_cannot_start_certification() {
    let deprecated = active_listing()
        .apply(ListingTransition::Deprecate, "ops", at(500))
        .unwrap();
    let mut registry = CertificationRegistry::new();
    let err = registry
        .start(Some(&deprecated), &release(), "soc2", "auditor", at(1_000))
        .unwrap_err();
    assert!(matches!(err, CertificationError::ListingNotActive { .. }));
}

#[test]
fn certification_revocation_is_independent_of_ledger() {
    // Revoking a certification does not require (or produce) a
    // provider-wide revocation ledger event; it is a record-local
    // transition.
    let mut registry = CertificationRegistry::new();
    registry
        .start(Some(&active_listing()), &release(), "soc2", "auditor", at(1_000))
        .unwrap();
    registry
        .complete(
            &release(),
            &policy_with_trust_gate(),
            evidence(),
            Some(&trusted_decision()),
            CertificationReport {
                outcome: CertificationOutcome::Pass,
                summary: "pass".to_string(),
            },
            "auditor",
            at(2_000),
        )
        .unwrap();
    registry.revoke(&release(), "security-team", at(3_000)).unwrap();
    assert_eq!(registry.status(&release()), CertificationStatus::Revoked);
}
