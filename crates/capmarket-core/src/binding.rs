//! Binding plans: the deployment-time decision of which provider fulfills
//! which capability port, and how it is reached.
//!
//! A plan is produced per deployment and replaced wholesale on redeploy.
//! Before the provider runtime may consult a plan together with a
//! lockfile, the pair must be *aligned*: identical `app_id`,
//! `environment`, and `host_api_version`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::host_api::SemVer;
use crate::lockfile::DeploymentLockfile;

// ---------------------------------------------------------------------------
// Reachability
// ---------------------------------------------------------------------------

/// How a bound capability is reached at runtime.
///
/// The ordering is the ranking order used by resolution: `local` sorts
/// before `delegated`, and `unreachable` last.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ReachabilityMode {
    Local,
    Delegated,
    Unreachable,
}

impl ReachabilityMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Delegated => "delegated",
            Self::Unreachable => "unreachable",
        }
    }
}

impl fmt::Display for ReachabilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete resolution of one capability binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CapabilityResolution {
    /// Fulfilled in-process on `target_host`.
    Local {
        target_host: String,
        provider_id: String,
    },
    /// Routed to another execution host. `delegate_route_id` must be
    /// present and non-empty before the binding is usable.
    Delegated {
        target_host: String,
        provider_id: String,
        delegate_route_id: Option<String>,
    },
    /// No route to any provider.
    Unreachable { reason: Option<String> },
}

impl CapabilityResolution {
    pub fn mode(&self) -> ReachabilityMode {
        match self {
            Self::Local { .. } => ReachabilityMode::Local,
            Self::Delegated { .. } => ReachabilityMode::Delegated,
            Self::Unreachable { .. } => ReachabilityMode::Unreachable,
        }
    }

    pub fn provider_id(&self) -> Option<&str> {
        match self {
            Self::Local { provider_id, .. } | Self::Delegated { provider_id, .. } => {
                Some(provider_id)
            }
            Self::Unreachable { .. } => None,
        }
    }

    /// Whether delegate-route metadata is complete for this resolution.
    /// Always true for non-delegated modes.
    pub fn delegate_route_complete(&self) -> bool {
        match self {
            Self::Delegated {
                delegate_route_id, ..
            } => delegate_route_id
                .as_deref()
                .is_some_and(|route| !route.trim().is_empty()),
            _ => true,
        }
    }
}

// ---------------------------------------------------------------------------
// BindingPlan
// ---------------------------------------------------------------------------

/// One capability port bound to its resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityBinding {
    pub port_id: String,
    pub port_version: SemVer,
    pub resolution: CapabilityResolution,
}

/// Per-deployment record of every capability binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingPlan {
    pub app_id: String,
    pub environment: String,
    pub host_api_version: SemVer,
    pub capability_bindings: Vec<CapabilityBinding>,
}

impl BindingPlan {
    pub fn binding_for(&self, port_id: &str, port_version: SemVer) -> Option<&CapabilityBinding> {
        self.capability_bindings
            .iter()
            .find(|b| b.port_id == port_id && b.port_version == port_version)
    }
}

/// Check that a plan and a lockfile describe the same deployment.
pub fn check_alignment(
    plan: &BindingPlan,
    lockfile: &DeploymentLockfile,
) -> Result<(), AlignmentError> {
    if plan.app_id != lockfile.app_id {
        return Err(AlignmentError {
            field: "app_id",
            plan_value: plan.app_id.clone(),
            lockfile_value: lockfile.app_id.clone(),
        });
    }
    if plan.environment != lockfile.environment {
        return Err(AlignmentError {
            field: "environment",
            plan_value: plan.environment.clone(),
            lockfile_value: lockfile.environment.clone(),
        });
    }
    if plan.host_api_version != lockfile.host_api_version {
        return Err(AlignmentError {
            field: "host_api_version",
            plan_value: plan.host_api_version.to_string(),
            lockfile_value: lockfile.host_api_version.to_string(),
        });
    }
    Ok(())
}

/// A plan/lockfile pair that does not describe the same deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentError {
    pub field: &'static str,
    pub plan_value: String,
    pub lockfile_value: String,
}

impl fmt::Display for AlignmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "plan/lockfile misaligned on {}: plan has `{}`, lockfile has `{}`",
            self.field, self.plan_value, self.lockfile_value
        )
    }
}

impl std::error::Error for AlignmentError {}
