//! Versioned, pluggable scoring strategies for resolution ranking.
//!
//! The ranking contract is deliberately small: local reachability before
//! delegated, higher trust tier first, then a deterministic lexical
//! tie-break on provider id. A strategy is identified by its profile id;
//! a resolution request naming a different profile than the resolver's
//! configured strategy is rejected, never silently reinterpreted.

use std::cmp::Ordering;

use crate::discovery::CatalogEntry;

/// Profile id of the default strategy.
pub const DEFAULT_SCORING_PROFILE_ID: &str = "lexical.v1";

/// A total order over catalog entries, identified by a stable profile id.
pub trait ScoringStrategy: Send + Sync {
    fn profile_id(&self) -> &str;

    /// Compare two candidates; `Less` ranks first.
    fn compare(&self, a: &CatalogEntry, b: &CatalogEntry) -> Ordering;
}

/// The documented ranking order: reachability mode ascending (`local`
/// before `delegated`), trust tier descending, provider id ascending.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalScoring;

impl ScoringStrategy for LexicalScoring {
    fn profile_id(&self) -> &str {
        DEFAULT_SCORING_PROFILE_ID
    }

    fn compare(&self, a: &CatalogEntry, b: &CatalogEntry) -> Ordering {
        a.reachability
            .mode()
            .cmp(&b.reachability.mode())
            .then_with(|| b.trust.tier.cmp(&a.trust.tier))
            .then_with(|| a.provider_id.cmp(&b.provider_id))
            .then_with(|| a.provider_version.cmp(&b.provider_version))
    }
}
