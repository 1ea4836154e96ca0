//! Identifier shortcutting.
//!
//! Users rarely type `vendor.library.name`. This module deduces the missing
//! segments of a partial identifier from the catalog:
//! - Zero matching blocks is [`ResolveError::NotFound`]
//! - Exactly one matching block resolves to its fully qualified identifier
//! - Several matching blocks is [`ResolveError::AmbiguousIdentifier`],
//!   listing every candidate with its tiers
//!
//! Blocks only visible at the available tier cannot take part in a build and
//! are filtered out unless the caller asks for [`Eligibility::Any`].

use crate::catalog::{Catalog, TierSet};
use crate::ident::{BlockIdentifier, BlockReference, IdentError};
use crate::version::{Selection, TierPrecedence, VersionSelector};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while resolving a block.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No catalog block matches the identifier.
    #[error("no block matches '{pattern}'")]
    NotFound { pattern: String },

    /// More than one catalog block matches the identifier.
    #[error("'{pattern}' is ambiguous, candidates:\n  {}", format_candidates(.candidates))]
    AmbiguousIdentifier {
        pattern: String,
        candidates: Vec<Candidate>,
    },

    /// Matching blocks exist but none has a copy on disk.
    #[error("'{pattern}' is only available remotely ({}); download or install it first", .candidates.join(", "))]
    NotBuildable {
        pattern: String,
        candidates: Vec<String>,
    },

    /// No version satisfies the constraint.
    #[error("no version of '{block}' matches '{constraint}' (known: {})", format_versions(.available))]
    VersionNotFound {
        block: String,
        constraint: String,
        available: Vec<String>,
    },

    /// The catalog lists the block without any specific version.
    #[error("catalog lists no specific version of '{block}'")]
    NoSpecificVersion { block: String },

    #[error(transparent)]
    Ident(#[from] IdentError),
}

fn format_candidates(candidates: &[Candidate]) -> String {
    candidates
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n  ")
}

fn format_versions(versions: &[String]) -> String {
    if versions.is_empty() {
        "none".to_string()
    } else {
        versions.join(", ")
    }
}

/// A block matching a partial identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Fully qualified identifier.
    pub id: BlockIdentifier,
    /// Union of the tiers of every version of the block.
    pub tiers: TierSet,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.id, self.tiers)
    }
}

/// Which catalog blocks may satisfy a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Eligibility {
    /// Only blocks with an installed or downloaded copy.
    #[default]
    Buildable,
    /// Any block, including those only available remotely.
    Any,
}

impl Eligibility {
    /// The tiers a block must occupy to be eligible.
    #[must_use]
    pub fn tiers(self) -> TierSet {
        match self {
            Self::Buildable => TierSet::BUILDABLE,
            Self::Any => TierSet::ALL,
        }
    }
}

/// Deduces fully qualified identifiers from partial ones.
#[derive(Debug, Clone, Copy)]
pub struct ShortcutResolver<'c> {
    catalog: &'c Catalog,
    eligibility: Eligibility,
}

impl<'c> ShortcutResolver<'c> {
    /// Create a resolver over buildable blocks.
    #[must_use]
    pub fn new(catalog: &'c Catalog) -> Self {
        Self {
            catalog,
            eligibility: Eligibility::default(),
        }
    }

    /// Change which blocks are eligible.
    #[must_use]
    pub fn with_eligibility(mut self, eligibility: Eligibility) -> Self {
        self.eligibility = eligibility;
        self
    }

    /// Every catalog block matching `pattern`, regardless of eligibility.
    #[must_use]
    pub fn search(&self, pattern: &BlockIdentifier) -> Vec<Candidate> {
        self.catalog
            .blocks()
            .filter(|id| id.matches(pattern))
            .map(|id| Candidate {
                id: id.clone(),
                tiers: self.catalog.block_tiers(id),
            })
            .collect()
    }

    /// Resolve a partial identifier to exactly one catalog block.
    ///
    /// A fully qualified identifier present in the catalog resolves to
    /// itself.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No block matches
    /// - Only remote-only blocks match and the resolver is restricted to
    ///   buildable ones
    /// - More than one eligible block matches
    pub fn resolve(&self, pattern: &BlockIdentifier) -> Result<BlockIdentifier, ResolveError> {
        let matches = self.search(pattern);
        if matches.is_empty() {
            return Err(ResolveError::NotFound {
                pattern: pattern.to_string(),
            });
        }

        let eligible_tiers = self.eligibility.tiers();
        let (mut eligible, excluded): (Vec<_>, Vec<_>) = matches
            .into_iter()
            .partition(|c| c.tiers.intersects(eligible_tiers));

        if eligible.is_empty() {
            return Err(ResolveError::NotBuildable {
                pattern: pattern.to_string(),
                candidates: excluded.iter().map(|c| c.id.to_string()).collect(),
            });
        }
        if eligible.len() > 1 {
            return Err(ResolveError::AmbiguousIdentifier {
                pattern: pattern.to_string(),
                candidates: eligible,
            });
        }

        let resolved = eligible.remove(0).id;
        debug!(%pattern, %resolved, "resolved identifier");
        Ok(resolved)
    }

    /// Resolve a reference and select the version and tier copy to use.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier cannot be resolved or no version
    /// satisfies the reference's constraint.
    pub fn select(
        &self,
        reference: &BlockReference,
        precedence: TierPrecedence,
    ) -> Result<Selection, ResolveError> {
        let id = self.resolve(&reference.id)?;
        VersionSelector::new(self.catalog)
            .with_precedence(precedence)
            .with_eligible(self.eligibility.tiers())
            .select(&id, reference.version.as_ref())
    }
}
