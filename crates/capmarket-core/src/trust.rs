//! Claim-by-claim trust verification for provider releases.
//!
//! Verification evaluates signatures, provenance attestations,
//! certification status, and revocation into a single verdict. Revocation
//! dominates: a revoked release is `trust_revoked_error` no matter how
//! good its other claims look. Each required claim is verified
//! independently and reported in the decision for audit.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::certification::CertificationStatus;
use crate::error_code::ErrorCategory;
use crate::hash::ContentHash;
use crate::host_api::SemVer;
use crate::manifest::ProviderRef;

// ---------------------------------------------------------------------------
// Subjects and claims
// ---------------------------------------------------------------------------

/// Release identity being verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustSubject {
    pub provider_id: String,
    pub provider_version: SemVer,
    pub namespace: String,
}

impl TrustSubject {
    pub fn provider_ref(&self) -> ProviderRef {
        ProviderRef::new(self.provider_id.clone(), self.provider_version)
    }
}

/// A detached signature over a release artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSignature {
    /// Identity of the signing subject (publisher key id).
    pub subject_id: String,
    /// The artifact hash the signature covers.
    pub signed_artifact_hash: ContentHash,
}

/// A build-provenance attestation for a release artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceAttestation {
    /// Identity of the builder that produced the artifact.
    pub builder_id: String,
    /// The artifact hash the attestation covers.
    pub subject_artifact_hash: ContentHash,
}

/// Verification mode the caller is operating in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
    Development,
    Staging,
    Production,
    Certified,
}

impl fmt::Display for VerificationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
            Self::Certified => "certified",
        };
        f.write_str(name)
    }
}

/// Policy knobs for a verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustPolicy {
    /// Signer identities accepted for this namespace. Empty means the
    /// subject-identity claim is not required.
    pub required_subject_ids: BTreeSet<String>,
    /// Builder identities accepted for provenance. Empty means the
    /// builder-identity claim is not required.
    pub required_builder_ids: BTreeSet<String>,
    pub require_artifact_signature: bool,
    pub require_provenance_attestation: bool,
    /// Modes in which certification is load-bearing.
    pub fail_closed_modes: BTreeSet<VerificationMode>,
    pub require_certified_status_in_fail_closed_modes: bool,
}

/// The kinds of claims a verification run can check.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    ArtifactSignature,
    ProvenanceAttestation,
    SubjectIdentity,
    BuilderIdentity,
    CertifiedStatus,
}

impl ClaimKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ArtifactSignature => "artifact_signature",
            Self::ProvenanceAttestation => "provenance_attestation",
            Self::SubjectIdentity => "subject_identity",
            Self::BuilderIdentity => "builder_identity",
            Self::CertifiedStatus => "certified_status",
        }
    }
}

impl fmt::Display for ClaimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One claim's verification outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedClaim {
    pub kind: ClaimKind,
    pub verified: bool,
    pub detail: String,
}

// ---------------------------------------------------------------------------
// Decision report
// ---------------------------------------------------------------------------

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TrustVerdict {
    Trusted,
    Untrusted,
}

impl fmt::Display for TrustVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trusted => f.write_str("trusted"),
            Self::Untrusted => f.write_str("untrusted"),
        }
    }
}

/// The auditable outcome of one verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustDecisionReport {
    pub subject: TrustSubject,
    pub verdict: TrustVerdict,
    pub verified_claims: Vec<VerifiedClaim>,
    pub evaluated_at: DateTime<Utc>,
}

/// Input to one verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustVerificationRequest {
    pub subject: TrustSubject,
    pub artifact_hash: ContentHash,
    pub signatures: Vec<ArtifactSignature>,
    pub attestations: Vec<ProvenanceAttestation>,
    pub certification_status: CertificationStatus,
    pub revoked: bool,
    pub mode: VerificationMode,
    pub policy: TrustPolicy,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Terminal trust failures. Everything else is an `untrusted` verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustError {
    /// The release is revoked; no other claim can rescue it.
    Revoked { subject_ref: String },
    /// Certification is required in the current mode and is not present.
    CertificationMissing {
        subject_ref: String,
        status: CertificationStatus,
        mode: VerificationMode,
    },
}

impl TrustError {
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Revoked { .. } => ErrorCategory::TrustRevokedError,
            Self::CertificationMissing { .. } => ErrorCategory::TrustCertificationMissingError,
        }
    }
}

impl fmt::Display for TrustError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Revoked { subject_ref } => {
                write!(f, "provider release {subject_ref} is revoked")
            }
            Self::CertificationMissing {
                subject_ref,
                status,
                mode,
            } => write!(
                f,
                "provider release {subject_ref} requires certified status in {mode} mode (current: {status})"
            ),
        }
    }
}

impl std::error::Error for TrustError {}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Evaluate every required claim and produce a decision report.
///
/// Revocation is checked first and dominates. The certification gate in a
/// fail-closed mode is a typed error rather than a mere `untrusted`
/// verdict, so callers cannot mistake it for a recoverable condition.
pub fn verify_trust(
    request: &TrustVerificationRequest,
    evaluated_at: DateTime<Utc>,
) -> Result<TrustDecisionReport, TrustError> {
    let subject_ref = request.subject.provider_ref().to_string();

    if request.revoked {
        return Err(TrustError::Revoked { subject_ref });
    }

    let fail_closed = request.policy.fail_closed_modes.contains(&request.mode);
    if fail_closed
        && request.policy.require_certified_status_in_fail_closed_modes
        && request.certification_status != CertificationStatus::Certified
    {
        return Err(TrustError::CertificationMissing {
            subject_ref,
            status: request.certification_status,
            mode: request.mode,
        });
    }

    let mut claims = Vec::new();

    if request.policy.require_artifact_signature {
        let matching = request
            .signatures
            .iter()
            .any(|s| s.signed_artifact_hash == request.artifact_hash);
        claims.push(VerifiedClaim {
            kind: ClaimKind::ArtifactSignature,
            verified: matching,
            detail: if matching {
                format!("signature covers artifact {}", request.artifact_hash)
            } else {
                "no signature covers the release artifact".to_string()
            },
        });
    }

    if request.policy.require_provenance_attestation {
        let all_cover_artifact = request
            .attestations
            .iter()
            .all(|a| a.subject_artifact_hash == request.artifact_hash);
        let verified = !request.attestations.is_empty() && all_cover_artifact;
        claims.push(VerifiedClaim {
            kind: ClaimKind::ProvenanceAttestation,
            verified,
            detail: if request.attestations.is_empty() {
                "no provenance attestation supplied".to_string()
            } else if !all_cover_artifact {
                "an attestation covers a different artifact".to_string()
            } else {
                format!(
                    "{} attestation(s) cover artifact {}",
                    request.attestations.len(),
                    request.artifact_hash
                )
            },
        });
    }

    if !request.policy.required_subject_ids.is_empty() {
        let matching = request
            .signatures
            .iter()
            .find(|s| request.policy.required_subject_ids.contains(&s.subject_id));
        claims.push(VerifiedClaim {
            kind: ClaimKind::SubjectIdentity,
            verified: matching.is_some(),
            detail: match matching {
                Some(signature) => format!("signed by accepted subject `{}`", signature.subject_id),
                None => "no signature from an accepted subject".to_string(),
            },
        });
    }

    if !request.policy.required_builder_ids.is_empty() {
        let matching = request
            .attestations
            .iter()
            .find(|a| request.policy.required_builder_ids.contains(&a.builder_id));
        claims.push(VerifiedClaim {
            kind: ClaimKind::BuilderIdentity,
            verified: matching.is_some(),
            detail: match matching {
                Some(attestation) => {
                    format!("attested by accepted builder `{}`", attestation.builder_id)
                }
                None => "no attestation from an accepted builder".to_string(),
            },
        });
    }

    if fail_closed && request.policy.require_certified_status_in_fail_closed_modes {
        // Reached only when the gate above passed.
        claims.push(VerifiedClaim {
            kind: ClaimKind::CertifiedStatus,
            verified: true,
            detail: format!("certified status present in {} mode", request.mode),
        });
    }

    let verdict = if claims.iter().all(|c| c.verified) {
        TrustVerdict::Trusted
    } else {
        TrustVerdict::Untrusted
    };

    Ok(TrustDecisionReport {
        subject: request.subject.clone(),
        verdict,
        verified_claims: claims,
        evaluated_at,
    })
}
