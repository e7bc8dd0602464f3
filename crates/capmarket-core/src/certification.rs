//! Certification lifecycle for provider releases.
//!
//! A certification record tracks one evaluation of a provider release
//! against a named policy profile:
//! `none → pending → {certified | rejected} → revoked` (revoke only from
//! certified). Transitions are pure functions over `(record, input)`;
//! every applied transition appends `{actor_id, occurred_at}` to the
//! record's audit log. Certification revocation is independent of the
//! provider-wide revocation ledger.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error_code::ErrorCategory;
use crate::host_api::SemVer;
use crate::listing::{Listing, ListingStatus};
use crate::manifest::ProviderRef;
use crate::trust::{TrustDecisionReport, TrustVerdict};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Certification status of a provider release.
///
/// `None` means no record exists; stored records never carry it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CertificationStatus {
    None,
    Pending,
    Certified,
    Rejected,
    Revoked,
}

impl CertificationStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Certified => "certified",
            Self::Rejected => "rejected",
            Self::Revoked => "revoked",
        }
    }

    /// Terminal states allow a fresh certification round to supersede them.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Certified | Self::Rejected | Self::Revoked)
    }
}

impl fmt::Display for CertificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Record pieces
// ---------------------------------------------------------------------------

/// A piece of evidence supplied for certification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationEvidence {
    /// Evidence kind, e.g. `soc2_report` or `pen_test`.
    pub kind: String,
    /// Where the evidence lives (document id, audit reference).
    pub reference: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificationOutcome {
    Pass,
    Fail,
}

/// Evaluator's report for a completed certification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationReport {
    pub outcome: CertificationOutcome,
    pub summary: String,
}

/// Trust gate inside a certification policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustGate {
    pub required: bool,
    pub required_verdict: TrustVerdict,
}

/// Named certification policy profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationPolicy {
    pub profile_id: String,
    pub required_evidence_kinds: BTreeSet<String>,
    pub trust: TrustGate,
}

/// One audit entry per applied transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationAuditEntry {
    pub actor_id: String,
    pub occurred_at: DateTime<Utc>,
    pub from: CertificationStatus,
    pub to: CertificationStatus,
}

/// Certification record for one provider release under one profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationRecord {
    pub provider_id: String,
    pub provider_version: SemVer,
    pub profile_id: String,
    pub status: CertificationStatus,
    pub evidence: Vec<CertificationEvidence>,
    pub report: Option<CertificationReport>,
    pub audit: Vec<CertificationAuditEntry>,
}

impl CertificationRecord {
    pub fn provider_ref(&self) -> ProviderRef {
        ProviderRef::new(self.provider_id.clone(), self.provider_version)
    }
}

/// One failed certification gate, for operator remediation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateFailure {
    pub gate: String,
    pub detail: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertificationError {
    /// `start` requires a listing for the target release.
    ListingNotFound { provider_ref: String },
    /// `start` requires the listing to be active.
    ListingNotActive {
        provider_ref: String,
        status: ListingStatus,
    },
    /// A non-terminal record already exists for this release.
    AlreadyInProgress {
        provider_ref: String,
        status: CertificationStatus,
    },
    /// One or more certification gates failed.
    RequirementFailed { failures: Vec<GateFailure> },
    /// The transition is not valid from the record's current status.
    InvalidTransition {
        from: CertificationStatus,
        attempted: String,
    },
}

impl CertificationError {
    pub const fn category(&self) -> ErrorCategory {
        ErrorCategory::CertificationRequirementError
    }
}

impl fmt::Display for CertificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ListingNotFound { provider_ref } => {
                write!(f, "no listing for {provider_ref}")
            }
            Self::ListingNotActive {
                provider_ref,
                status,
            } => write!(f, "listing for {provider_ref} is `{status}`, not active"),
            Self::AlreadyInProgress {
                provider_ref,
                status,
            } => write!(
                f,
                "a non-terminal certification record ({status}) already exists for {provider_ref}"
            ),
            Self::RequirementFailed { failures } => {
                write!(f, "certification requirements failed ({} gate(s))", failures.len())
            }
            Self::InvalidTransition { from, attempted } => {
                write!(f, "`{attempted}` is not valid from `{from}`")
            }
        }
    }
}

impl std::error::Error for CertificationError {}

// ---------------------------------------------------------------------------
// Transitions (pure)
// ---------------------------------------------------------------------------

/// Begin certification of a listed, active release.
pub fn start_certification(
    listing: Option<&Listing>,
    existing: Option<&CertificationRecord>,
    provider_ref: &ProviderRef,
    profile_id: &str,
    actor_id: &str,
    occurred_at: DateTime<Utc>,
) -> Result<CertificationRecord, CertificationError> {
    let listing = listing.ok_or_else(|| CertificationError::ListingNotFound {
        provider_ref: provider_ref.to_string(),
    })?;
    if listing.status != ListingStatus::Active {
        return Err(CertificationError::ListingNotActive {
            provider_ref: provider_ref.to_string(),
            status: listing.status,
        });
    }
    if let Some(record) = existing {
        if !record.status.is_terminal() {
            return Err(CertificationError::AlreadyInProgress {
                provider_ref: provider_ref.to_string(),
                status: record.status,
            });
        }
    }
    Ok(CertificationRecord {
        provider_id: provider_ref.provider_id.clone(),
        provider_version: provider_ref.provider_version,
        profile_id: profile_id.to_string(),
        status: CertificationStatus::Pending,
        evidence: Vec::new(),
        report: None,
        audit: vec![CertificationAuditEntry {
            actor_id: actor_id.to_string(),
            occurred_at,
            from: CertificationStatus::None,
            to: CertificationStatus::Pending,
        }],
    })
}

/// Complete a pending certification run.
///
/// Gates: every required evidence kind present (set-subset), and — when
/// the policy's trust gate is on — a trust decision with the required
/// verdict. Gate failures are collected, not fail-fast.
pub fn complete_certification(
    record: &CertificationRecord,
    policy: &CertificationPolicy,
    evidence: Vec<CertificationEvidence>,
    trust_decision: Option<&TrustDecisionReport>,
    report: CertificationReport,
    actor_id: &str,
    occurred_at: DateTime<Utc>,
) -> Result<CertificationRecord, CertificationError> {
    if record.status != CertificationStatus::Pending {
        return Err(CertificationError::InvalidTransition {
            from: record.status,
            attempted: "complete".to_string(),
        });
    }

    let mut failures = Vec::new();

    let supplied_kinds: BTreeSet<&str> = evidence.iter().map(|e| e.kind.as_str()).collect();
    for kind in &policy.required_evidence_kinds {
        if !supplied_kinds.contains(kind.as_str()) {
            failures.push(GateFailure {
                gate: "evidence".to_string(),
                detail: format!("missing required evidence kind `{kind}`"),
            });
        }
    }

    if policy.trust.required {
        match trust_decision {
            Some(decision) if decision.verdict == policy.trust.required_verdict => {}
            Some(decision) => failures.push(GateFailure {
                gate: "trust".to_string(),
                detail: format!(
                    "trust verdict is `{}`, profile requires `{}`",
                    decision.verdict, policy.trust.required_verdict
                ),
            }),
            None => failures.push(GateFailure {
                gate: "trust".to_string(),
                detail: "no trust decision supplied".to_string(),
            }),
        }
    }

    if !failures.is_empty() {
        return Err(CertificationError::RequirementFailed { failures });
    }

    let target = match report.outcome {
        CertificationOutcome::Pass => CertificationStatus::Certified,
        CertificationOutcome::Fail => CertificationStatus::Rejected,
    };
    let mut next = record.clone();
    next.evidence = evidence;
    next.report = Some(report);
    next.audit.push(CertificationAuditEntry {
        actor_id: actor_id.to_string(),
        occurred_at,
        from: record.status,
        to: target,
    });
    next.status = target;
    Ok(next)
}

/// Revoke a certified release's certification.
pub fn revoke_certification(
    record: &CertificationRecord,
    actor_id: &str,
    occurred_at: DateTime<Utc>,
) -> Result<CertificationRecord, CertificationError> {
    if record.status != CertificationStatus::Certified {
        return Err(CertificationError::InvalidTransition {
            from: record.status,
            attempted: "revoke".to_string(),
        });
    }
    let mut next = record.clone();
    next.audit.push(CertificationAuditEntry {
        actor_id: actor_id.to_string(),
        occurred_at,
        from: record.status,
        to: CertificationStatus::Revoked,
    });
    next.status = CertificationStatus::Revoked;
    Ok(next)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Keyed store of certification records, one per provider release.
///
/// A thin stateful wrapper over the pure transition functions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationRegistry {
    records: BTreeMap<ProviderRef, CertificationRecord>,
}

impl CertificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, provider_ref: &ProviderRef) -> Option<&CertificationRecord> {
        self.records.get(provider_ref)
    }

    /// Status for a release; `None` when no record exists.
    pub fn status(&self, provider_ref: &ProviderRef) -> CertificationStatus {
        self.records
            .get(provider_ref)
            .map_or(CertificationStatus::None, |r| r.status)
    }

    pub fn start(
        &mut self,
        listing: Option<&Listing>,
        provider_ref: &ProviderRef,
        profile_id: &str,
        actor_id: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<&CertificationRecord, CertificationError> {
        let record = start_certification(
            listing,
            self.records.get(provider_ref),
            provider_ref,
            profile_id,
            actor_id,
            occurred_at,
        )?;
        self.records.insert(provider_ref.clone(), record);
        Ok(&self.records[provider_ref])
    }

    pub fn complete(
        &mut self,
        provider_ref: &ProviderRef,
        policy: &CertificationPolicy,
        evidence: Vec<CertificationEvidence>,
        trust_decision: Option<&TrustDecisionReport>,
        report: CertificationReport,
        actor_id: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<&CertificationRecord, CertificationError> {
        let record =
            self.records
                .get(provider_ref)
                .ok_or_else(|| CertificationError::InvalidTransition {
                    from: CertificationStatus::None,
                    attempted: "complete".to_string(),
                })?;
        let next = complete_certification(
            record,
            policy,
            evidence,
            trust_decision,
            report,
            actor_id,
            occurred_at,
        )?;
        self.records.insert(provider_ref.clone(), next);
        Ok(&self.records[provider_ref])
    }

    pub fn revoke(
        &mut self,
        provider_ref: &ProviderRef,
        actor_id: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<&CertificationRecord, CertificationError> {
        let record =
            self.records
                .get(provider_ref)
                .ok_or_else(|| CertificationError::InvalidTransition {
                    from: CertificationStatus::None,
                    attempted: "revoke".to_string(),
                })?;
        let next = revoke_certification(record, actor_id, occurred_at)?;
        self.records.insert(provider_ref.clone(), next);
        Ok(&self.records[provider_ref])
    }
}
