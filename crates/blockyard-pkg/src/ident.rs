//! Block identifiers and references.
//!
//! A block is named `vendor.library.name`. Users may leave out leading
//! segments (`library.name`, `name`) or mark them unspecified with an empty
//! segment (`.library.name`); the catalog fills in the rest. All comparison
//! is ASCII case-insensitive while the original spelling is kept for display.
//!
//! A [`BlockReference`] extends an identifier with an optional version
//! constraint and an optional design-unit selector:
//!
//! ```text
//! acme.math.adder          fully qualified
//! math.adder@1.2           partial version constraint
//! adder(v2.0.0)            specific version, tag syntax
//! math.adder:adder_tb      names a design unit inside the block
//! ```

use crate::version::Version;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Separator between identifier segments.
pub const SEGMENT_DELIM: char = '.';

/// Separator between an identifier and a design-unit name.
pub const UNIT_DELIM: char = ':';

/// Separator between an identifier and a version constraint.
pub const VERSION_DELIM: char = '@';

/// Errors produced while parsing identifiers and versions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentError {
    /// The identifier text does not describe a block.
    #[error("malformed identifier '{text}': {reason}")]
    MalformedIdentifier { text: String, reason: String },

    /// The version text is not `major`, `major.minor` or `major.minor.patch`.
    #[error("invalid version '{text}': {reason}")]
    MalformedVersion { text: String, reason: String },
}

impl IdentError {
    fn malformed(text: &str, reason: impl Into<String>) -> Self {
        Self::MalformedIdentifier {
            text: text.to_string(),
            reason: reason.into(),
        }
    }
}

/// A case-insensitive name segment.
#[derive(Clone)]
pub struct Name(String);

impl Name {
    /// Wrap a string without validation.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Parse and validate a single segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment is empty or contains characters other
    /// than ASCII letters, digits, `_` and `-`.
    pub fn parse(text: &str) -> Result<Self, IdentError> {
        if text.is_empty() {
            return Err(IdentError::malformed(text, "segment cannot be empty"));
        }
        if let Some(c) = text
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '_' && *c != '-')
        {
            return Err(IdentError::malformed(
                text,
                format!("unexpected character '{c}'"),
            ));
        }
        Ok(Self(text.to_string()))
    }

    /// The name as originally written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The lowercase form used for comparison.
    #[must_use]
    pub fn folded(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    /// Case-insensitive comparison against a plain string.
    #[must_use]
    pub fn eq_str(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }

    fn folded_bytes(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.bytes().map(|b| b.to_ascii_lowercase())
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.folded_bytes() {
            state.write_u8(b);
        }
        state.write_u8(0xff);
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        self.folded_bytes().cmp(other.folded_bytes())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl From<&str> for Name {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// A possibly partial `vendor.library.name` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockIdentifier {
    /// Vendor segment, if specified.
    pub vendor: Option<Name>,
    /// Library segment, if specified.
    pub library: Option<Name>,
    /// Block name (always present).
    pub name: Name,
}

impl BlockIdentifier {
    /// Build an identifier from already validated parts.
    #[must_use]
    pub fn new(vendor: Option<&str>, library: Option<&str>, name: &str) -> Self {
        Self {
            vendor: vendor.filter(|v| !v.is_empty()).map(Name::new),
            library: library.filter(|l| !l.is_empty()).map(Name::new),
            name: Name::new(name),
        }
    }

    /// Shorthand for a fully qualified identifier.
    #[must_use]
    pub fn qualified(vendor: &str, library: &str, name: &str) -> Self {
        Self::new(Some(vendor), Some(library), name)
    }

    /// Parse `vendor.library.name`, `library.name` or `name`.
    ///
    /// Empty segments are treated as unspecified, so `.mylib.adder` leaves the
    /// vendor open and names library `mylib`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentError::MalformedIdentifier`] for more than three
    /// segments, an empty name, or invalid characters.
    pub fn parse(text: &str) -> Result<Self, IdentError> {
        let trimmed = text.trim();
        let segments: Vec<&str> = trimmed.split(SEGMENT_DELIM).collect();
        if segments.len() > 3 {
            return Err(IdentError::malformed(
                text,
                "expected at most 3 dot-separated segments",
            ));
        }

        let (name, rest) = segments
            .split_last()
            .ok_or_else(|| IdentError::malformed(text, "identifier is empty"))?;
        if name.is_empty() {
            return Err(IdentError::malformed(text, "block name cannot be empty"));
        }

        let segment = |s: &str| -> Result<Option<Name>, IdentError> {
            if s.is_empty() {
                Ok(None)
            } else {
                Name::parse(s)
                    .map(Some)
                    .map_err(|_| IdentError::malformed(text, format!("invalid segment '{s}'")))
            }
        };

        let (vendor, library) = match rest {
            [] => (None, None),
            [library] => (None, segment(library)?),
            [vendor, library] => (segment(vendor)?, segment(library)?),
            _ => unreachable!("segment count checked above"),
        };

        let name = Name::parse(name)
            .map_err(|_| IdentError::malformed(text, format!("invalid block name '{name}'")))?;

        Ok(Self {
            vendor,
            library,
            name,
        })
    }

    /// Returns true if vendor, library and name are all present.
    #[must_use]
    pub fn is_fully_qualified(&self) -> bool {
        self.vendor.is_some() && self.library.is_some()
    }

    /// Check whether this identifier satisfies a wildcard pattern.
    ///
    /// Every segment the pattern specifies must be equal; unspecified
    /// segments match anything.
    #[must_use]
    pub fn matches(&self, pattern: &BlockIdentifier) -> bool {
        fn segment(own: Option<&Name>, wanted: Option<&Name>) -> bool {
            match wanted {
                None => true,
                Some(w) => own == Some(w),
            }
        }

        self.name == pattern.name
            && segment(self.library.as_ref(), pattern.library.as_ref())
            && segment(self.vendor.as_ref(), pattern.vendor.as_ref())
    }

    /// Library name, or an empty string when unspecified.
    #[must_use]
    pub fn library_str(&self) -> &str {
        self.library.as_ref().map_or("", Name::as_str)
    }

    /// Vendor name, or an empty string when unspecified.
    #[must_use]
    pub fn vendor_str(&self) -> &str {
        self.vendor.as_ref().map_or("", Name::as_str)
    }
}

impl fmt::Display for BlockIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.vendor, &self.library) {
            (None, None) => write!(f, "{}", self.name),
            (None, Some(l)) => write!(f, "{l}.{}", self.name),
            (Some(v), l) => write!(
                f,
                "{v}.{}.{}",
                l.as_ref().map_or("", Name::as_str),
                self.name
            ),
        }
    }
}

impl std::str::FromStr for BlockIdentifier {
    type Err = IdentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A block identifier with optional version constraint and unit selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockReference {
    /// The (possibly partial) block identifier.
    pub id: BlockIdentifier,
    /// Version constraint, specific or partial.
    pub version: Option<Version>,
    /// Design unit inside the block.
    pub unit: Option<Name>,
}

impl BlockReference {
    /// Reference a block with no version constraint.
    #[must_use]
    pub fn new(id: BlockIdentifier) -> Self {
        Self {
            id,
            version: None,
            unit: None,
        }
    }

    /// Attach a version constraint.
    #[must_use]
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Parse a reference such as `acme.math.adder@1.2` or `adder(v1.0.0):adder_tb`.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier, the version or the unit name is
    /// malformed.
    pub fn parse(text: &str) -> Result<Self, IdentError> {
        let mut rest = text.trim();

        // Tag syntax: `name(v1.2.3)`, optionally followed by `:unit`.
        if let (Some(open), Some(close)) = (rest.rfind('('), rest.rfind(')')) {
            if open < close {
                let version = Version::parse(&rest[open + 1..close])?;
                let tail = &rest[close + 1..];
                let unit = match tail.strip_prefix(UNIT_DELIM) {
                    Some(unit) => Some(unit),
                    None if tail.is_empty() => None,
                    None => {
                        return Err(IdentError::malformed(
                            text,
                            "unexpected text after version tag",
                        ))
                    }
                };
                if rest[..open].contains(VERSION_DELIM) {
                    return Err(IdentError::malformed(text, "version given twice"));
                }
                return Self::parse_unit_and_id(text, &rest[..open], unit, Some(version));
            }
        }

        let mut version = None;
        if let Some(at) = rest.rfind(VERSION_DELIM) {
            let tag = &rest[at + 1..];
            if tag.is_empty() {
                return Err(IdentError::malformed(
                    text,
                    "version after '@' cannot be empty",
                ));
            }
            version = Some(Version::parse(tag)?);
            rest = &rest[..at];
        }

        match rest.split_once(UNIT_DELIM) {
            Some((id, unit)) => Self::parse_unit_and_id(text, id, Some(unit), version),
            None => Self::parse_unit_and_id(text, rest, None, version),
        }
    }

    fn parse_unit_and_id(
        text: &str,
        id: &str,
        unit: Option<&str>,
        version: Option<Version>,
    ) -> Result<Self, IdentError> {
        let unit = match unit {
            Some(u) => Some(
                Name::parse(u)
                    .map_err(|_| IdentError::malformed(text, format!("invalid unit name '{u}'")))?,
            ),
            None => None,
        };
        Ok(Self {
            id: BlockIdentifier::parse(id)?,
            version,
            unit,
        })
    }
}

impl fmt::Display for BlockReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)?;
        if let Some(unit) = &self.unit {
            write!(f, "{UNIT_DELIM}{unit}")?;
        }
        if let Some(version) = &self.version {
            write!(f, "{VERSION_DELIM}{version}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for BlockReference {
    type Err = IdentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fully_qualified() {
        let id = BlockIdentifier::parse("Acme.Math.Adder").unwrap();
        assert_eq!(id.vendor.as_ref().unwrap().as_str(), "Acme");
        assert_eq!(id.library.as_ref().unwrap().as_str(), "Math");
        assert_eq!(id.name.as_str(), "Adder");
        assert!(id.is_fully_qualified());
        assert_eq!(id.to_string(), "Acme.Math.Adder");
    }

    #[test]
    fn parse_partial_forms() {
        let id = BlockIdentifier::parse("math.adder").unwrap();
        assert!(id.vendor.is_none());
        assert_eq!(id.library_str(), "math");

        let id = BlockIdentifier::parse("adder").unwrap();
        assert!(id.vendor.is_none());
        assert!(id.library.is_none());
        assert!(!id.is_fully_qualified());
    }

    #[test]
    fn empty_segments_are_unspecified() {
        let id = BlockIdentifier::parse(".mylib.name").unwrap();
        assert!(id.vendor.is_none());
        assert_eq!(id.library_str(), "mylib");
        assert_eq!(id.name.as_str(), "name");

        let id = BlockIdentifier::parse("acme..name").unwrap();
        assert_eq!(id.vendor_str(), "acme");
        assert!(id.library.is_none());
    }

    #[test]
    fn too_many_segments() {
        let err = BlockIdentifier::parse("a.b.c.d").unwrap_err();
        assert!(matches!(err, IdentError::MalformedIdentifier { .. }));
    }

    #[test]
    fn empty_name_rejected() {
        assert!(BlockIdentifier::parse("acme.math.").is_err());
        assert!(BlockIdentifier::parse("").is_err());
        assert!(BlockIdentifier::parse("acme.ma th.adder").is_err());
    }

    #[test]
    fn case_insensitive_equality_and_hash() {
        use std::collections::HashSet;

        let a = BlockIdentifier::parse("ACME.math.Adder").unwrap();
        let b = BlockIdentifier::parse("acme.MATH.adder").unwrap();
        assert_eq!(a, b);

        let set: HashSet<_> = [a.clone(), b].into_iter().collect();
        assert_eq!(set.len(), 1);
        // display keeps the original casing
        assert_eq!(a.to_string(), "ACME.math.Adder");
    }

    #[test]
    fn wildcard_matching() {
        let full = BlockIdentifier::qualified("acme", "math", "adder");
        assert!(full.matches(&BlockIdentifier::parse("adder").unwrap()));
        assert!(full.matches(&BlockIdentifier::parse("MATH.adder").unwrap()));
        assert!(full.matches(&BlockIdentifier::parse("acme..adder").unwrap()));
        assert!(!full.matches(&BlockIdentifier::parse("util.adder").unwrap()));
        assert!(!full.matches(&BlockIdentifier::parse("subtractor").unwrap()));
    }

    #[test]
    fn reference_with_at_version() {
        let r = BlockReference::parse("math.adder@1.2").unwrap();
        assert_eq!(r.id.name.as_str(), "adder");
        assert_eq!(r.version, Some(Version::parse("1.2").unwrap()));
        assert!(r.unit.is_none());
    }

    #[test]
    fn reference_with_tag_version_and_unit() {
        let r = BlockReference::parse("acme.math.adder(v1.0.0):adder_tb").unwrap();
        assert_eq!(r.version, Some(Version::parse("1.0.0").unwrap()));
        assert_eq!(r.unit.as_ref().unwrap().as_str(), "adder_tb");
        assert!(r.id.is_fully_qualified());
    }

    #[test]
    fn reference_with_unit_only() {
        let r = BlockReference::parse("math.adder:add4").unwrap();
        assert_eq!(r.unit.unwrap().as_str(), "add4");
        assert!(r.version.is_none());
    }

    #[test]
    fn reference_rejects_double_version() {
        assert!(BlockReference::parse("adder(v1.0.0)@2").is_err());
        assert!(BlockReference::parse("adder@").is_err());
        assert!(BlockReference::parse("adder@one").is_err());
    }

    #[test]
    fn reference_display_round_trips_text() {
        let r = BlockReference::parse("acme.math.adder:top@2").unwrap();
        assert_eq!(r.to_string(), "acme.math.adder:top@2");
    }
}
