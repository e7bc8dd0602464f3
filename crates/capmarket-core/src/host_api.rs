//! Host-API versions and the compatibility range grammar.
//!
//! Versions are strict `MAJOR.MINOR.PATCH` with no pre-release or build
//! metadata. Ranges come in four shapes:
//! - `*` — always compatible;
//! - exact `X.Y.Z` — equal only;
//! - `^X.Y.Z` — same major, and the runtime version is at least `X.Y.Z`;
//! - a space-separated comparator chain `(>=|<=|>|<|=)?X.Y.Z …`, evaluated
//!   as a conjunction (every comparator must hold).
//!
//! Malformed versions or comparators are typed parse errors; the provider
//! runtime surfaces them in its compatibility error category rather than
//! guessing.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// SemVer
// ---------------------------------------------------------------------------

/// Strict `MAJOR.MINOR.PATCH` version.
///
/// Serialized as the dotted string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemVer {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a strict `X.Y.Z` version. Each part must be pure ASCII digits.
    pub fn parse(input: &str) -> Result<Self, HostApiRangeError> {
        let malformed = || HostApiRangeError::MalformedVersion {
            input: input.to_string(),
        };
        let mut parts = input.split('.');
        let major = parse_numeric_part(parts.next().ok_or_else(malformed)?).ok_or_else(malformed)?;
        let minor = parse_numeric_part(parts.next().ok_or_else(malformed)?).ok_or_else(malformed)?;
        let patch = parse_numeric_part(parts.next().ok_or_else(malformed)?).ok_or_else(malformed)?;
        if parts.next().is_some() {
            return Err(malformed());
        }
        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

fn parse_numeric_part(part: &str) -> Option<u64> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemVer {
    type Err = HostApiRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SemVer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SemVer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(D::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Comparators
// ---------------------------------------------------------------------------

/// Comparator operator in a range term. A bare version term means equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparatorOp {
    Ge,
    Le,
    Gt,
    Lt,
    Eq,
}

impl ComparatorOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Eq => "=",
        }
    }
}

/// A single comparator term, e.g. `>=1.2.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparator {
    pub op: ComparatorOp,
    pub version: SemVer,
}

impl Comparator {
    fn parse(term: &str) -> Result<Self, HostApiRangeError> {
        let (op, rest) = if let Some(rest) = term.strip_prefix(">=") {
            (ComparatorOp::Ge, rest)
        } else if let Some(rest) = term.strip_prefix("<=") {
            (ComparatorOp::Le, rest)
        } else if let Some(rest) = term.strip_prefix('>') {
            (ComparatorOp::Gt, rest)
        } else if let Some(rest) = term.strip_prefix('<') {
            (ComparatorOp::Lt, rest)
        } else if let Some(rest) = term.strip_prefix('=') {
            (ComparatorOp::Eq, rest)
        } else {
            (ComparatorOp::Eq, term)
        };
        let version = SemVer::parse(rest).map_err(|_| HostApiRangeError::MalformedComparator {
            term: term.to_string(),
        })?;
        Ok(Self { op, version })
    }

    pub fn matches(&self, version: SemVer) -> bool {
        match self.op {
            ComparatorOp::Ge => version >= self.version,
            ComparatorOp::Le => version <= self.version,
            ComparatorOp::Gt => version > self.version,
            ComparatorOp::Lt => version < self.version,
            ComparatorOp::Eq => version == self.version,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `=` is printed explicitly: a bare version term would reparse as
        // an `Exact` range instead of a one-element chain.
        write!(f, "{}{}", self.op.as_str(), self.version)
    }
}

// ---------------------------------------------------------------------------
// HostApiRange
// ---------------------------------------------------------------------------

/// A parsed host-API compatibility range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostApiRange {
    /// `*` — compatible with any runtime version.
    Any,
    /// Exact `X.Y.Z` — equal only.
    Exact(SemVer),
    /// `^X.Y.Z` — same major, runtime version at least the base.
    Caret(SemVer),
    /// Conjunctive comparator chain; every comparator must hold.
    Comparators(Vec<Comparator>),
}

impl HostApiRange {
    /// Parse the range grammar. Whitespace separates comparator terms.
    pub fn parse(input: &str) -> Result<Self, HostApiRangeError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(HostApiRangeError::Empty);
        }
        if trimmed == "*" {
            return Ok(Self::Any);
        }
        if let Some(rest) = trimmed.strip_prefix('^') {
            return Ok(Self::Caret(SemVer::parse(rest)?));
        }
        let terms: Vec<&str> = trimmed.split_whitespace().collect();
        if terms.len() == 1 && !starts_with_operator(terms[0]) {
            return Ok(Self::Exact(SemVer::parse(terms[0])?));
        }
        let comparators = terms
            .into_iter()
            .map(Comparator::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::Comparators(comparators))
    }

    /// Whether a runtime version satisfies this range.
    pub fn matches(&self, version: SemVer) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(exact) => version == *exact,
            Self::Caret(base) => version.major == base.major && version >= *base,
            Self::Comparators(comparators) => comparators.iter().all(|c| c.matches(version)),
        }
    }
}

fn starts_with_operator(term: &str) -> bool {
    term.starts_with('>') || term.starts_with('<') || term.starts_with('=')
}

impl fmt::Display for HostApiRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Exact(version) => write!(f, "{version}"),
            Self::Caret(base) => write!(f, "^{base}"),
            Self::Comparators(comparators) => {
                for (index, comparator) in comparators.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{comparator}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for HostApiRange {
    type Err = HostApiRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// HostApiRangeError
// ---------------------------------------------------------------------------

/// Errors from parsing a version or range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostApiRangeError {
    Empty,
    MalformedVersion { input: String },
    MalformedComparator { term: String },
}

impl fmt::Display for HostApiRangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("host api range is empty"),
            Self::MalformedVersion { input } => {
                write!(f, "malformed semver `{input}` (expected MAJOR.MINOR.PATCH)")
            }
            Self::MalformedComparator { term } => {
                write!(f, "malformed comparator term `{term}`")
            }
        }
    }
}

impl std::error::Error for HostApiRangeError {}
