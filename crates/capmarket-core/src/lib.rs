#![forbid(unsafe_code)]

//! Capability marketplace trust & resolution core.
//!
//! Binds abstract capability ports (e.g. `notifications.send@1.0.0`) to
//! third-party provider releases: discovery of candidates, eligibility
//! classification, policy- and scoring-driven resolution, claim-by-claim
//! trust verification, a certification lifecycle, and an append-only
//! revocation ledger.
//!
//! Every pipeline stage here is a pure, synchronous function over immutable
//! inputs; identical input produces byte-identical serialized output. The
//! asynchronous enforcement half (activation, invocation) lives in the
//! `capmarket-provider-host` crate and consumes this crate's artifacts.
//!
//! Default posture is fail-closed: stale revocation data, mismatched
//! artifacts, or missing certifications produce typed errors instead of
//! optimistic fallthrough.

pub mod binding;
pub mod certification;
pub mod contract;
pub mod discovery;
pub mod eligibility;
pub mod error_code;
pub mod hash;
pub mod host_api;
pub mod listing;
pub mod lockfile;
pub mod manifest;
pub mod resolution;
pub mod revocation;
pub mod schema;
pub mod scoring;
pub mod trust;
