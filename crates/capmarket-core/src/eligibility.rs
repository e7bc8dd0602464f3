//! Eligibility: classify discovered candidates against certification
//! requirements.
//!
//! Pure classification — no selection, no ranking. Each provider is marked
//! eligible or ineligible with the missing certifications and the reasons
//! spelled out; resolution decides what to do with them.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::binding::ReachabilityMode;
use crate::discovery::{CatalogEntry, DiscoveryCatalog};
use crate::host_api::SemVer;

/// Classification outcome for one provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityStatus {
    Eligible,
    Ineligible,
}

impl fmt::Display for EligibilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eligible => f.write_str("eligible"),
            Self::Ineligible => f.write_str("ineligible"),
        }
    }
}

/// One classified provider, carrying its catalog entry forward so later
/// stages can rank without re-running discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEligibility {
    pub entry: CatalogEntry,
    pub status: EligibilityStatus,
    pub missing_certifications: BTreeSet<String>,
    pub reasons: Vec<String>,
}

/// The eligibility report for one capability port query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityReport {
    pub port_id: String,
    pub port_version: SemVer,
    pub required_certifications: BTreeSet<String>,
    pub providers: Vec<ProviderEligibility>,
}

/// Classify every catalog entry against the required certifications.
pub fn classify(
    catalog: &DiscoveryCatalog,
    required_certifications: &BTreeSet<String>,
) -> EligibilityReport {
    let providers = catalog
        .entries
        .iter()
        .map(|entry| classify_entry(entry, required_certifications))
        .collect();

    EligibilityReport {
        port_id: catalog.query.port_id.clone(),
        port_version: catalog.query.port_version,
        required_certifications: required_certifications.clone(),
        providers,
    }
}

fn classify_entry(
    entry: &CatalogEntry,
    required_certifications: &BTreeSet<String>,
) -> ProviderEligibility {
    let mut reasons = Vec::new();

    if !entry.compatibility.host_api_compatible {
        reasons.push("host api incompatible with deployment".to_string());
    }
    if !entry.compatibility.capability_compatible {
        reasons.push("capability not fulfilled by this provider".to_string());
    }
    if !entry.compatibility.contract_hash_compatible {
        reasons.push("contract hash differs from the requested contract".to_string());
    }
    if entry.reachability.mode() == ReachabilityMode::Unreachable {
        reasons.push("no route to provider".to_string());
    }

    let missing_certifications: BTreeSet<String> = required_certifications
        .difference(&entry.trust.certifications)
        .cloned()
        .collect();
    if !missing_certifications.is_empty() {
        reasons.push(format!(
            "missing required certification(s): {}",
            missing_certifications
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }

    let status = if reasons.is_empty() {
        EligibilityStatus::Eligible
    } else {
        EligibilityStatus::Ineligible
    };

    ProviderEligibility {
        entry: entry.clone(),
        status,
        missing_certifications,
        reasons,
    }
}
