//! Resolution: pick bound providers from an eligibility report under
//! policy, scoring, and revocation constraints — and explain the decision.
//!
//! Resolution fails closed. Stale revocation data rejects the whole
//! request rather than resolving against a possibly-outdated revoked set;
//! a scoring-profile mismatch is an error, never a silent fallback; a
//! selected delegated binding without complete route metadata is an error
//! rather than a broken binding.
//!
//! `resolve` is deterministic: identical input produces byte-identical
//! serialized output. Callers with untyped input use `resolve_value`,
//! which validates the request shape first — schema problems surface
//! before any policy logic runs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::binding::ReachabilityMode;
use crate::discovery::{CatalogEntry, TrustTier};
use crate::eligibility::{EligibilityReport, EligibilityStatus, ProviderEligibility};
use crate::error_code::ErrorCategory;
use crate::manifest::ProviderRef;
use crate::schema::{SchemaIssue, ValueSchema};
use crate::scoring::{LexicalScoring, ScoringStrategy};

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Trust/certification constraints applied during resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_trust_tier: Option<TrustTier>,
    #[serde(default)]
    pub required_certifications: BTreeSet<String>,
}

/// Names the scoring profile the caller expects to be in effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringProfileRef {
    pub profile_id: String,
}

/// How much of the decision trace the caller wants back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplainabilityMode {
    #[default]
    Summary,
    Diagnostics,
}

/// Point-in-time revocation view supplied with the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationSnapshot {
    pub last_synced_at: DateTime<Utc>,
    pub evaluated_at: DateTime<Utc>,
    pub max_staleness_seconds: i64,
    pub revoked_provider_refs: BTreeSet<ProviderRef>,
}

/// A full resolution request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRequest {
    pub report: EligibilityReport,
    pub max_results: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<ResolutionPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring_profile: Option<ScoringProfileRef>,
    #[serde(default)]
    pub explainability_mode: ExplainabilityMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation: Option<RevocationSnapshot>,
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// One recorded eligibility decision, for the diagnostics trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityDiagnostic {
    pub provider_ref: String,
    pub code: String,
    pub detail: String,
}

/// Decision explanation. The diagnostics trace is present only in
/// `diagnostics` mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explainability {
    pub mode: ExplainabilityMode,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Vec<EligibilityDiagnostic>>,
}

/// The resolution outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionDecision {
    pub selected: Vec<CatalogEntry>,
    pub explainability: Explainability,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionError {
    /// The request is structurally invalid; checked before any policy
    /// logic runs.
    RequestSchema { issues: Vec<SchemaIssue> },
    /// Policy (or revocation staleness) rejected the request.
    PolicyRejection { detail: String },
    /// The named scoring profile is not the configured one.
    ScoringProfile {
        requested: String,
        configured: String,
    },
    /// A selected delegated binding is missing route metadata.
    DelegationUnavailable { provider_ref: String },
}

impl ResolutionError {
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::RequestSchema { .. } => ErrorCategory::ResolverRequestSchemaError,
            Self::PolicyRejection { .. } => ErrorCategory::ResolverPolicyRejectionError,
            Self::ScoringProfile { .. } => ErrorCategory::ResolverScoringProfileError,
            Self::DelegationUnavailable { .. } => {
                ErrorCategory::ResolverDelegationUnavailableError
            }
        }
    }
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestSchema { issues } => {
                write!(f, "request schema invalid ({} issue(s))", issues.len())
            }
            Self::PolicyRejection { detail } => write!(f, "policy rejection: {detail}"),
            Self::ScoringProfile {
                requested,
                configured,
            } => write!(
                f,
                "scoring profile `{requested}` does not match configured `{configured}`"
            ),
            Self::DelegationUnavailable { provider_ref } => {
                write!(f, "delegate route metadata incomplete for {provider_ref}")
            }
        }
    }
}

impl std::error::Error for ResolutionError {}

// ---------------------------------------------------------------------------
// Request schema
// ---------------------------------------------------------------------------

/// Structural schema of the JSON request shape accepted by
/// `Resolver::resolve_value`.
pub fn request_schema() -> ValueSchema {
    let string_array = || ValueSchema::Array {
        items: Box::new(ValueSchema::String),
    };

    let report_schema = ValueSchema::Object {
        required: BTreeMap::from([
            ("port_id".to_string(), ValueSchema::String),
            ("port_version".to_string(), ValueSchema::String),
            ("required_certifications".to_string(), string_array()),
            (
                "providers".to_string(),
                ValueSchema::Array {
                    items: Box::new(ValueSchema::Any),
                },
            ),
        ]),
        optional: BTreeMap::new(),
        allow_additional: false,
    };

    let policy_schema = ValueSchema::Object {
        required: BTreeMap::new(),
        optional: BTreeMap::from([
            ("min_trust_tier".to_string(), ValueSchema::String),
            ("required_certifications".to_string(), string_array()),
        ]),
        allow_additional: false,
    };

    let scoring_profile_schema = ValueSchema::object(BTreeMap::from([(
        "profile_id".to_string(),
        ValueSchema::String,
    )]));

    let revocation_schema = ValueSchema::object(BTreeMap::from([
        ("last_synced_at".to_string(), ValueSchema::String),
        ("evaluated_at".to_string(), ValueSchema::String),
        ("max_staleness_seconds".to_string(), ValueSchema::Integer),
        ("revoked_provider_refs".to_string(), string_array()),
    ]));

    ValueSchema::Object {
        required: BTreeMap::from([
            ("report".to_string(), report_schema),
            ("max_results".to_string(), ValueSchema::Integer),
        ]),
        optional: BTreeMap::from([
            ("policy".to_string(), policy_schema),
            ("scoring_profile".to_string(), scoring_profile_schema),
            ("explainability_mode".to_string(), ValueSchema::String),
            ("revocation".to_string(), revocation_schema),
        ]),
        allow_additional: false,
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// The resolution engine, configured with one scoring strategy.
pub struct Resolver {
    strategy: Box<dyn ScoringStrategy>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    /// Resolver with the default `lexical.v1` strategy.
    pub fn new() -> Self {
        Self {
            strategy: Box::new(LexicalScoring),
        }
    }

    pub fn with_strategy(strategy: Box<dyn ScoringStrategy>) -> Self {
        Self { strategy }
    }

    pub fn configured_profile_id(&self) -> &str {
        self.strategy.profile_id()
    }

    /// Validate an untyped request and resolve it.
    pub fn resolve_value(&self, value: &Value) -> Result<ResolutionDecision, ResolutionError> {
        let issues = request_schema().validate(value);
        if !issues.is_empty() {
            return Err(ResolutionError::RequestSchema { issues });
        }
        let request: ResolutionRequest = serde_json::from_value(value.clone()).map_err(|e| {
            ResolutionError::RequestSchema {
                issues: vec![SchemaIssue::new("$", e.to_string())],
            }
        })?;
        self.resolve(&request)
    }

    /// Resolve a typed request.
    pub fn resolve(&self, request: &ResolutionRequest) -> Result<ResolutionDecision, ResolutionError> {
        // Structural checks the type system cannot express; still ahead of
        // all policy logic.
        let mut issues = Vec::new();
        if request.max_results == 0 {
            issues.push(SchemaIssue::new("$.max_results", "must be at least 1"));
        }
        if let Some(revocation) = &request.revocation {
            if revocation.max_staleness_seconds < 0 {
                issues.push(SchemaIssue::new(
                    "$.revocation.max_staleness_seconds",
                    "must not be negative",
                ));
            }
        }
        if !issues.is_empty() {
            return Err(ResolutionError::RequestSchema { issues });
        }

        // Revocation staleness: fail closed instead of resolving against
        // possibly-outdated data.
        if let Some(revocation) = &request.revocation {
            let staleness = (revocation.evaluated_at - revocation.last_synced_at).num_seconds();
            if staleness > revocation.max_staleness_seconds {
                return Err(ResolutionError::PolicyRejection {
                    detail: format!(
                        "revocation snapshot is stale: {staleness}s since last sync exceeds the {}s bound",
                        revocation.max_staleness_seconds
                    ),
                });
            }
        }

        let mut diagnostics = Vec::new();
        let total = request.report.providers.len();

        // Start from the report's eligible providers, recording why the
        // rest are out.
        let mut candidates: Vec<&ProviderEligibility> = Vec::new();
        for provider in &request.report.providers {
            if provider.status == EligibilityStatus::Ineligible {
                diagnostics.push(EligibilityDiagnostic {
                    provider_ref: provider.entry.provider_ref().to_string(),
                    code: "eligibility_ineligible".to_string(),
                    detail: provider.reasons.join("; "),
                });
                continue;
            }
            candidates.push(provider);
        }

        // Drop revoked providers.
        if let Some(revocation) = &request.revocation {
            candidates.retain(|provider| {
                let provider_ref = provider.entry.provider_ref();
                if revocation.revoked_provider_refs.contains(&provider_ref) {
                    diagnostics.push(EligibilityDiagnostic {
                        provider_ref: provider_ref.to_string(),
                        code: ErrorCategory::ResolverEligibilityRevoked.as_str().to_string(),
                        detail: "provider release is revoked in the supplied snapshot".to_string(),
                    });
                    false
                } else {
                    true
                }
            });
        }

        // Apply the resolution policy.
        if let Some(policy) = &request.policy {
            candidates.retain(|provider| {
                if let Some(min_tier) = policy.min_trust_tier {
                    if provider.entry.trust.tier < min_tier {
                        diagnostics.push(EligibilityDiagnostic {
                            provider_ref: provider.entry.provider_ref().to_string(),
                            code: "policy_min_trust_tier".to_string(),
                            detail: format!(
                                "trust tier `{}` is below required `{min_tier}`",
                                provider.entry.trust.tier
                            ),
                        });
                        return false;
                    }
                }
                let missing: Vec<&String> = policy
                    .required_certifications
                    .difference(&provider.entry.trust.certifications)
                    .collect();
                if !missing.is_empty() {
                    diagnostics.push(EligibilityDiagnostic {
                        provider_ref: provider.entry.provider_ref().to_string(),
                        code: "policy_missing_certification".to_string(),
                        detail: format!(
                            "missing certification(s): {}",
                            missing
                                .iter()
                                .map(|s| s.as_str())
                                .collect::<Vec<_>>()
                                .join(", ")
                        ),
                    });
                    return false;
                }
                true
            });
            if candidates.is_empty() {
                return Err(ResolutionError::PolicyRejection {
                    detail: "no provider satisfies the resolution policy".to_string(),
                });
            }
        }

        // Scoring profile must match the configured strategy exactly.
        if let Some(profile) = &request.scoring_profile {
            if profile.profile_id != self.strategy.profile_id() {
                return Err(ResolutionError::ScoringProfile {
                    requested: profile.profile_id.clone(),
                    configured: self.strategy.profile_id().to_string(),
                });
            }
        }

        // Rank and cut.
        candidates.sort_by(|a, b| self.strategy.compare(&a.entry, &b.entry));
        let selected: Vec<CatalogEntry> = candidates
            .iter()
            .take(request.max_results as usize)
            .map(|provider| provider.entry.clone())
            .collect();

        // Selected delegated bindings must carry complete route metadata.
        for entry in &selected {
            if entry.reachability.mode() == ReachabilityMode::Delegated
                && !entry.reachability.delegate_route_complete()
            {
                return Err(ResolutionError::DelegationUnavailable {
                    provider_ref: entry.provider_ref().to_string(),
                });
            }
        }

        let summary = format!(
            "selected {} of {} candidate(s) for {}@{} using profile {}",
            selected.len(),
            total,
            request.report.port_id,
            request.report.port_version,
            self.strategy.profile_id()
        );

        Ok(ResolutionDecision {
            selected,
            explainability: Explainability {
                mode: request.explainability_mode,
                summary,
                diagnostics: match request.explainability_mode {
                    ExplainabilityMode::Summary => None,
                    ExplainabilityMode::Diagnostics => Some(diagnostics),
                },
            },
        })
    }
}
