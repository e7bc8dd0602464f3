//! Stable error-code registry for the marketplace boundary.
//!
//! Every error category surfaced to callers has a permanent numeric code
//! partitioned by subsystem. The registry is append-only: assigned codes
//! are never reused and may only be marked deprecated.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const ERROR_CODE_REGISTRY_VERSION: u32 = 1;
pub const ERROR_CODE_COMPATIBILITY_POLICY: &str =
    "append-only: assigned codes are permanent, never reused, and may only be marked deprecated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Critical,
    Error,
    Warning,
}

/// Subsystems own non-overlapping numeric ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSubsystem {
    Resolution,
    Trust,
    Certification,
    Runtime,
}

impl ErrorSubsystem {
    pub const fn range(self) -> (u16, u16) {
        match self {
            Self::Resolution => (1000, 1999),
            Self::Trust => (2000, 2999),
            Self::Certification => (3000, 3999),
            Self::Runtime => (4000, 4999),
        }
    }

    pub const fn includes(self, numeric: u16) -> bool {
        let (start, end) = self.range();
        numeric >= start && numeric <= end
    }
}

/// The boundary error taxonomy.
///
/// `as_str` values are the wire-visible category names; they are part of
/// the external interface and never change.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    ResolverRequestSchemaError = 1000,
    ResolverPolicyRejectionError = 1001,
    ResolverScoringProfileError = 1002,
    ResolverDelegationUnavailableError = 1003,
    /// Diagnostic code recorded when a revoked provider is dropped during
    /// resolution; not a terminal error by itself.
    ResolverEligibilityRevoked = 1004,

    TrustRevokedError = 2000,
    TrustCertificationMissingError = 2001,

    CertificationRequirementError = 3000,

    ActivationError = 4000,
    ValidationError = 4001,
    CompatibilityError = 4002,
    InvocationError = 4003,
    TimeoutError = 4004,
    EffectViolationError = 4005,
}

pub const ALL_ERROR_CATEGORIES: &[ErrorCategory] = &[
    ErrorCategory::ResolverRequestSchemaError,
    ErrorCategory::ResolverPolicyRejectionError,
    ErrorCategory::ResolverScoringProfileError,
    ErrorCategory::ResolverDelegationUnavailableError,
    ErrorCategory::ResolverEligibilityRevoked,
    ErrorCategory::TrustRevokedError,
    ErrorCategory::TrustCertificationMissingError,
    ErrorCategory::CertificationRequirementError,
    ErrorCategory::ActivationError,
    ErrorCategory::ValidationError,
    ErrorCategory::CompatibilityError,
    ErrorCategory::InvocationError,
    ErrorCategory::TimeoutError,
    ErrorCategory::EffectViolationError,
];

impl ErrorCategory {
    pub const fn numeric(self) -> u16 {
        self as u16
    }

    /// Stable code string, e.g. `CM-1000`.
    pub fn stable_code(self) -> String {
        format!("CM-{:04}", self.numeric())
    }

    /// Wire-visible category name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ResolverRequestSchemaError => "resolver_request_schema_error",
            Self::ResolverPolicyRejectionError => "resolver_policy_rejection_error",
            Self::ResolverScoringProfileError => "resolver_scoring_profile_error",
            Self::ResolverDelegationUnavailableError => "resolver_delegation_unavailable_error",
            Self::ResolverEligibilityRevoked => "resolver_eligibility_revoked",
            Self::TrustRevokedError => "trust_revoked_error",
            Self::TrustCertificationMissingError => "trust_certification_missing_error",
            Self::CertificationRequirementError => "certification_requirement_error",
            Self::ActivationError => "activation_error",
            Self::ValidationError => "validation_error",
            Self::CompatibilityError => "compatibility_error",
            Self::InvocationError => "invocation_error",
            Self::TimeoutError => "timeout_error",
            Self::EffectViolationError => "effect_violation_error",
        }
    }

    pub const fn subsystem(self) -> ErrorSubsystem {
        match self.numeric() {
            1000..=1999 => ErrorSubsystem::Resolution,
            2000..=2999 => ErrorSubsystem::Trust,
            3000..=3999 => ErrorSubsystem::Certification,
            _ => ErrorSubsystem::Runtime,
        }
    }

    pub const fn severity(self) -> ErrorSeverity {
        match self {
            // Fail-closed safety gates.
            Self::TrustRevokedError | Self::ActivationError | Self::EffectViolationError => {
                ErrorSeverity::Critical
            }
            // Recorded diagnostic, not a terminal failure.
            Self::ResolverEligibilityRevoked => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
