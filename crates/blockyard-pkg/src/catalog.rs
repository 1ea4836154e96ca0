//! The three-tier block catalog.
//!
//! Every `(block, version)` pair visible to a workspace is one
//! [`CatalogEntry`]. A version may be *available* (listed by a vendor
//! index), *installed* (present in the install cache) and *downloaded*
//! (checked out for development) at the same time, so tiers are kept as a
//! set rather than a single status.
//!
//! The catalog is an immutable snapshot during resolution. It can be built
//! in memory with [`Catalog::insert`] or loaded from a TOML snapshot:
//!
//! ```toml
//! [[block]]
//! vendor = "acme"
//! library = "math"
//! name = "adder"
//! version = "1.2.0"
//! tiers = ["installed", "downloaded"]
//! path = "blocks/adder"
//! ```

use crate::ident::{BlockIdentifier, IdentError, Name};
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while building or loading a catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read catalog snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog snapshot: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Ident(#[from] IdentError),

    #[error("catalog entries must be fully qualified, got '{0}'")]
    NotFullyQualified(String),

    #[error("catalog entry '{block}' must carry a specific version, got '{version}'")]
    NotSpecific { block: String, version: String },

    #[error("catalog entry '{0}' lists no tiers")]
    NoTiers(String),
}

/// A visibility tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Listed by a vendor index; not on disk.
    Available,
    /// Present in the install cache.
    Installed,
    /// Checked out locally for development.
    Downloaded,
}

impl Tier {
    /// All tiers, lowest visibility first.
    pub const ALL: [Tier; 3] = [Tier::Available, Tier::Installed, Tier::Downloaded];

    /// Returns the tier as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Installed => "installed",
            Self::Downloaded => "downloaded",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Self::Available => 0b001,
            Self::Installed => 0b010,
            Self::Downloaded => 0b100,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "available" => Ok(Self::Available),
            "installed" => Ok(Self::Installed),
            "downloaded" => Ok(Self::Downloaded),
            _ => Err(format!(
                "unknown tier '{s}', expected one of: available, installed, downloaded"
            )),
        }
    }
}

/// A set of tiers stored as a bit set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TierSet(u8);

impl TierSet {
    /// No tiers.
    pub const EMPTY: TierSet = TierSet(0);
    /// Every tier.
    pub const ALL: TierSet = TierSet(0b111);
    /// Tiers whose copies exist on disk and can take part in a build.
    pub const BUILDABLE: TierSet = TierSet(0b110);

    /// A set holding one tier.
    #[must_use]
    pub fn single(tier: Tier) -> Self {
        Self(tier.bit())
    }

    /// A set holding the given tiers.
    #[must_use]
    pub fn from_tiers(tiers: &[Tier]) -> Self {
        tiers.iter().fold(Self::EMPTY, |set, t| set.with(*t))
    }

    /// This set plus `tier`.
    #[must_use]
    pub fn with(self, tier: Tier) -> Self {
        Self(self.0 | tier.bit())
    }

    /// Add a tier in place.
    pub fn insert(&mut self, tier: Tier) {
        self.0 |= tier.bit();
    }

    #[must_use]
    pub fn contains(&self, tier: Tier) -> bool {
        self.0 & tier.bit() != 0
    }

    #[must_use]
    pub fn intersects(&self, other: TierSet) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the only tier present is [`Tier::Available`].
    #[must_use]
    pub fn is_available_only(&self) -> bool {
        *self == Self::single(Tier::Available)
    }

    /// Iterate the tiers in the set, lowest visibility first.
    pub fn iter(&self) -> impl Iterator<Item = Tier> + '_ {
        Tier::ALL.into_iter().filter(|t| self.contains(*t))
    }
}

impl BitOr for TierSet {
    type Output = TierSet;

    fn bitor(self, rhs: TierSet) -> TierSet {
        TierSet(self.0 | rhs.0)
    }
}

impl BitAnd for TierSet {
    type Output = TierSet;

    fn bitand(self, rhs: TierSet) -> TierSet {
        TierSet(self.0 & rhs.0)
    }
}

impl fmt::Display for TierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|t| t.as_str()).collect();
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

impl fmt::Debug for TierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TierSet({self})")
    }
}

/// One `(block, version)` pair known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Fully qualified identifier.
    pub id: BlockIdentifier,
    /// Specific version.
    pub version: Version,
    tiers: TierSet,
    locations: BTreeMap<Tier, PathBuf>,
}

impl CatalogEntry {
    /// Tiers this version occupies.
    #[must_use]
    pub fn tiers(&self) -> TierSet {
        self.tiers
    }

    /// Source location of the copy in `tier`, if known.
    #[must_use]
    pub fn location(&self, tier: Tier) -> Option<&Path> {
        self.locations.get(&tier).map(PathBuf::as_path)
    }
}

/// An immutable-by-convention registry of blocks across the three tiers.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    blocks: BTreeMap<BlockIdentifier, BTreeMap<Version, CatalogEntry>>,
}

impl Catalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `version` of `id` occupies `tier`.
    ///
    /// Inserting an existing `(id, version)` merges the tier into its set.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not fully qualified or `version` is
    /// partial.
    pub fn insert(
        &mut self,
        id: BlockIdentifier,
        version: Version,
        tier: Tier,
        location: Option<PathBuf>,
    ) -> Result<&CatalogEntry, CatalogError> {
        if !id.is_fully_qualified() {
            return Err(CatalogError::NotFullyQualified(id.to_string()));
        }
        if !version.is_specific() {
            return Err(CatalogError::NotSpecific {
                block: id.to_string(),
                version: version.to_string(),
            });
        }

        let entry = self
            .blocks
            .entry(id.clone())
            .or_default()
            .entry(version.clone())
            .or_insert_with(|| CatalogEntry {
                id,
                version,
                tiers: TierSet::EMPTY,
                locations: BTreeMap::new(),
            });
        entry.tiers.insert(tier);
        if let Some(location) = location {
            entry.locations.insert(tier, location);
        }
        Ok(entry)
    }

    /// All entries whose identifier matches `pattern`.
    ///
    /// Specified segments must match case-insensitively; unspecified ones
    /// act as wildcards. Results are ordered by identifier, then version.
    #[must_use]
    pub fn lookup(&self, pattern: &BlockIdentifier) -> Vec<&CatalogEntry> {
        self.blocks
            .iter()
            .filter(|(id, _)| id.matches(pattern))
            .flat_map(|(_, versions)| versions.values())
            .collect()
    }

    /// All entries of one fully qualified block, lowest version first.
    pub fn entries_of(&self, id: &BlockIdentifier) -> impl Iterator<Item = &CatalogEntry> {
        self.blocks.get(id).into_iter().flat_map(|v| v.values())
    }

    /// A single entry.
    #[must_use]
    pub fn entry(&self, id: &BlockIdentifier, version: &Version) -> Option<&CatalogEntry> {
        self.blocks.get(id).and_then(|v| v.get(version))
    }

    /// Tiers occupied by an entry.
    #[must_use]
    pub fn tiers_of(&self, entry: &CatalogEntry) -> TierSet {
        entry.tiers()
    }

    /// Known versions of a block, in ascending order.
    #[must_use]
    pub fn versions_of(&self, id: &BlockIdentifier) -> BTreeSet<Version> {
        self.entries_of(id).map(|e| e.version.clone()).collect()
    }

    /// Union of the tiers of every version of a block.
    #[must_use]
    pub fn block_tiers(&self, id: &BlockIdentifier) -> TierSet {
        self.entries_of(id)
            .fold(TierSet::EMPTY, |acc, e| acc | e.tiers())
    }

    /// Distinct block identifiers, in case-insensitive order.
    pub fn blocks(&self) -> impl Iterator<Item = &BlockIdentifier> {
        self.blocks.keys()
    }

    /// Distinct blocks belonging to `library`.
    pub fn blocks_in_library<'a>(
        &'a self,
        library: &'a Name,
    ) -> impl Iterator<Item = &'a BlockIdentifier> + 'a {
        self.blocks
            .keys()
            .filter(move |id| id.library.as_ref() == Some(library))
    }

    /// Number of `(block, version)` entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Load a catalog snapshot from a TOML file.
    ///
    /// Relative `path` values are resolved against the snapshot's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or an entry is invalid.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::parse_with_base(&content, Some(base))
    }

    /// Parse a catalog snapshot from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or an entry is invalid.
    pub fn parse(content: &str) -> Result<Self, CatalogError> {
        Self::parse_with_base(content, None)
    }

    fn parse_with_base(content: &str, base: Option<&Path>) -> Result<Self, CatalogError> {
        let snapshot: Snapshot = toml::from_str(content)?;
        let mut catalog = Self::new();

        for block in snapshot.blocks {
            let id = BlockIdentifier {
                vendor: Some(Name::parse(&block.vendor)?),
                library: Some(Name::parse(&block.library)?),
                name: Name::parse(&block.name)?,
            };
            let version = Version::parse(&block.version)?;
            if block.tiers.is_empty() {
                return Err(CatalogError::NoTiers(format!("{id}@{version}")));
            }

            let location = block.path.map(|p| match base {
                Some(base) if p.is_relative() => base.join(p),
                _ => p,
            });
            for tier in block.tiers {
                // Available copies live on a remote; a path only makes sense on disk.
                let location = (tier != Tier::Available).then(|| location.clone()).flatten();
                catalog.insert(id.clone(), version.clone(), tier, location)?;
            }
        }

        Ok(catalog)
    }
}

/// On-disk snapshot layout.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Snapshot {
    #[serde(default, rename = "block")]
    blocks: Vec<SnapshotBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SnapshotBlock {
    vendor: String,
    library: String,
    name: String,
    version: String,
    tiers: Vec<Tier>,
    #[serde(default)]
    path: Option<PathBuf>,
}
