//! Block versions and version selection.
//!
//! Stored catalog versions are always *specific* (`major.minor.patch`).
//! Constraints written by users may also be *partial* (`2` or `2.1`), which
//! selects the highest specific version sharing that prefix.

use crate::catalog::{Catalog, Tier, TierSet};
use crate::ident::{BlockIdentifier, IdentError};
use crate::resolve::ResolveError;
use semver::{Comparator, Op, Prerelease, VersionReq};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// A specific or partial block version.
#[derive(Debug, Clone)]
pub enum Version {
    /// All three components present.
    Specific(semver::Version),
    /// Only `major` or `major.minor` present.
    Partial { major: u64, minor: Option<u64> },
}

impl Version {
    /// Create a specific version.
    #[must_use]
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self::Specific(semver::Version::new(major, minor, patch))
    }

    /// Parse a version string.
    ///
    /// Accepts an optional leading `v`, `_` in place of `.` and a trailing
    /// dot, as found in release tags (`v1_2_0`, `1.2.`).
    ///
    /// # Errors
    ///
    /// Returns [`IdentError::MalformedVersion`] if the text has zero or more
    /// than three components, or a component is not a decimal number.
    pub fn parse(text: &str) -> Result<Self, IdentError> {
        let malformed = |reason: &str| IdentError::MalformedVersion {
            text: text.to_string(),
            reason: reason.to_string(),
        };

        let normalized = text.trim().replace('_', ".");
        let normalized = normalized
            .strip_prefix(['v', 'V'])
            .unwrap_or(&normalized);
        let normalized = normalized.strip_suffix('.').unwrap_or(normalized);
        if normalized.is_empty() {
            return Err(malformed("version is empty"));
        }

        let mut parts = Vec::with_capacity(3);
        for part in normalized.split('.') {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed("components must be decimal numbers"));
            }
            let value = part
                .parse::<u64>()
                .map_err(|_| malformed("component out of range"))?;
            parts.push(value);
        }

        match parts[..] {
            [major] => Ok(Self::Partial { major, minor: None }),
            [major, minor] => Ok(Self::Partial {
                major,
                minor: Some(minor),
            }),
            [major, minor, patch] => Ok(Self::new(major, minor, patch)),
            _ => Err(malformed("expected at most 3 components")),
        }
    }

    /// Returns true if all three components are present.
    #[must_use]
    pub fn is_specific(&self) -> bool {
        matches!(self, Self::Specific(_))
    }

    /// The major component.
    #[must_use]
    pub fn major(&self) -> u64 {
        match self {
            Self::Specific(v) => v.major,
            Self::Partial { major, .. } => *major,
        }
    }

    /// The minor component, if present.
    #[must_use]
    pub fn minor(&self) -> Option<u64> {
        match self {
            Self::Specific(v) => Some(v.minor),
            Self::Partial { minor, .. } => *minor,
        }
    }

    /// The patch component, if present.
    #[must_use]
    pub fn patch(&self) -> Option<u64> {
        match self {
            Self::Specific(v) => Some(v.patch),
            Self::Partial { .. } => None,
        }
    }

    fn key(&self) -> (u64, Option<u64>, Option<u64>) {
        (self.major(), self.minor(), self.patch())
    }

    /// The semver requirement this version denotes when used as a constraint.
    ///
    /// An exact comparator with missing components matches every version
    /// sharing the present prefix, so `=2` accepts `2.x.y`.
    #[must_use]
    pub fn requirement(&self) -> VersionReq {
        VersionReq {
            comparators: vec![Comparator {
                op: Op::Exact,
                major: self.major(),
                minor: self.minor(),
                patch: self.patch(),
                pre: Prerelease::EMPTY,
            }],
        }
    }

    /// Check whether a specific version satisfies this constraint.
    #[must_use]
    pub fn accepts(&self, candidate: &Version) -> bool {
        match candidate {
            Self::Specific(v) => self.requirement().matches(v),
            Self::Partial { .. } => false,
        }
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Specific(v) => write!(f, "{}.{}.{}", v.major, v.minor, v.patch),
            Self::Partial { major, minor: None } => write!(f, "{major}"),
            Self::Partial {
                major,
                minor: Some(minor),
            } => write!(f, "{major}.{minor}"),
        }
    }
}

impl std::str::FromStr for Version {
    type Err = IdentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Errors from matching a constraint against a set of versions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectError {
    /// No recorded version satisfies the constraint.
    #[error("no version matches '{constraint}'")]
    VersionNotFound { constraint: Version },

    /// Only partial versions were recorded, which never happens for
    /// well-formed catalog entries.
    #[error("no specific version recorded")]
    NoSpecificVersion,
}

/// Select a version from a set of known versions.
///
/// - No constraint: the highest specific version.
/// - Specific constraint: that exact version.
/// - Partial constraint: the highest version sharing its prefix.
///
/// # Errors
///
/// Returns [`SelectError::VersionNotFound`] if nothing matches the
/// constraint and [`SelectError::NoSpecificVersion`] if no constraint was
/// given and the set holds no specific version.
pub fn select_version(
    versions: &BTreeSet<Version>,
    constraint: Option<&Version>,
) -> Result<Version, SelectError> {
    match constraint {
        None => versions
            .iter()
            .rev()
            .find(|v| v.is_specific())
            .cloned()
            .ok_or(SelectError::NoSpecificVersion),
        Some(wanted) => versions
            .iter()
            .rev()
            .find(|v| wanted.accepts(v))
            .cloned()
            .ok_or_else(|| SelectError::VersionNotFound {
                constraint: wanted.clone(),
            }),
    }
}

/// Which tier's copy wins when one version occupies several tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPrecedence([Tier; 3]);

impl Default for TierPrecedence {
    fn default() -> Self {
        Self([Tier::Downloaded, Tier::Installed, Tier::Available])
    }
}

impl TierPrecedence {
    /// Build a precedence from a preferred ordering.
    ///
    /// Tiers missing from `order` keep their default relative order after
    /// the listed ones; repeated tiers are ignored.
    #[must_use]
    pub fn from_order(order: &[Tier]) -> Self {
        let mut tiers = Vec::with_capacity(3);
        for tier in order.iter().chain(Self::default().0.iter()) {
            if !tiers.contains(tier) {
                tiers.push(*tier);
            }
        }
        Self([tiers[0], tiers[1], tiers[2]])
    }

    /// The precedence implied by the multi-develop policy.
    ///
    /// With multi-develop enabled in-development (downloaded) copies shadow
    /// installed ones; otherwise stable installs win.
    #[must_use]
    pub fn for_multi_develop(enabled: bool) -> Self {
        if enabled {
            Self::default()
        } else {
            Self([Tier::Installed, Tier::Downloaded, Tier::Available])
        }
    }

    /// The most preferred tier within `tiers`.
    #[must_use]
    pub fn pick(&self, tiers: TierSet) -> Option<Tier> {
        self.0.iter().copied().find(|t| tiers.contains(*t))
    }

    /// Tiers from most to least preferred.
    #[must_use]
    pub fn order(&self) -> &[Tier; 3] {
        &self.0
    }
}

/// The outcome of selecting a version of a catalog block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Fully qualified block identifier.
    pub id: BlockIdentifier,
    /// Selected specific version.
    pub version: Version,
    /// Tier whose copy is used.
    pub tier: Tier,
    /// Source location of that copy, if the catalog knows it.
    pub location: Option<PathBuf>,
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.id, self.version, self.tier)
    }
}

/// Picks a concrete version and tier for a resolved block.
#[derive(Debug, Clone, Copy)]
pub struct VersionSelector<'c> {
    catalog: &'c Catalog,
    precedence: TierPrecedence,
    eligible: TierSet,
}

impl<'c> VersionSelector<'c> {
    /// Selector over buildable tiers with the default precedence.
    #[must_use]
    pub fn new(catalog: &'c Catalog) -> Self {
        Self {
            catalog,
            precedence: TierPrecedence::default(),
            eligible: TierSet::BUILDABLE,
        }
    }

    /// Use a different tier precedence.
    #[must_use]
    pub fn with_precedence(mut self, precedence: TierPrecedence) -> Self {
        self.precedence = precedence;
        self
    }

    /// Restrict selection to copies in these tiers.
    #[must_use]
    pub fn with_eligible(mut self, eligible: TierSet) -> Self {
        self.eligible = eligible;
        self
    }

    /// Select a version of a fully qualified block.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NotFound`] if the catalog has no such block,
    /// [`ResolveError::NotBuildable`] if it only exists in ineligible tiers,
    /// and [`ResolveError::VersionNotFound`] if the constraint matches
    /// nothing.
    pub fn select(
        &self,
        id: &BlockIdentifier,
        constraint: Option<&Version>,
    ) -> Result<Selection, ResolveError> {
        let mut known = false;
        let mut versions = BTreeSet::new();
        for entry in self.catalog.entries_of(id) {
            known = true;
            if entry.tiers().intersects(self.eligible) {
                versions.insert(entry.version.clone());
            }
        }

        if !known {
            return Err(ResolveError::NotFound {
                pattern: id.to_string(),
            });
        }
        if versions.is_empty() {
            return Err(ResolveError::NotBuildable {
                pattern: id.to_string(),
                candidates: vec![id.to_string()],
            });
        }

        let version = select_version(&versions, constraint).map_err(|e| match e {
            SelectError::VersionNotFound { constraint } => ResolveError::VersionNotFound {
                block: id.to_string(),
                constraint: constraint.to_string(),
                available: versions.iter().map(ToString::to_string).collect(),
            },
            SelectError::NoSpecificVersion => ResolveError::NoSpecificVersion {
                block: id.to_string(),
            },
        })?;

        let entry = self
            .catalog
            .entry(id, &version)
            .ok_or_else(|| ResolveError::NotFound {
                pattern: format!("{id}@{version}"),
            })?;
        let tier = self
            .precedence
            .pick(entry.tiers() & self.eligible)
            .ok_or_else(|| ResolveError::NotBuildable {
                pattern: id.to_string(),
                candidates: vec![format!("{id}@{version}")],
            })?;

        debug!(block = %entry.id, %version, %tier, "selected version");

        Ok(Selection {
            id: entry.id.clone(),
            version,
            tier,
            location: entry.location(tier).map(PathBuf::from),
        })
    }
}
