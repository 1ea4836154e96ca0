//! Block manifest (`Block.toml`) parsing and validation.

use crate::ident::{BlockIdentifier, BlockReference, IdentError, Name};
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur when working with manifests.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {field} '{value}': {reason}")]
    InvalidName {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("invalid version '{0}': a block version must be major.minor.patch")]
    InvalidVersion(String),

    #[error("invalid requirement '{text}': {source}")]
    InvalidRequirement {
        text: String,
        #[source]
        source: IdentError,
    },
}

/// The complete Block.toml manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub block: BlockSection,
}

/// The `[block]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockSection {
    pub name: String,

    pub library: String,

    #[serde(default)]
    pub vendor: Option<String>,

    /// Released version; unreleased blocks may omit it.
    #[serde(default)]
    pub version: Option<String>,

    /// Top-level design unit.
    #[serde(default)]
    pub top: Option<String>,

    /// Testbench of the top-level unit.
    #[serde(default)]
    pub bench: Option<String>,

    /// Blocks this block depends on, as block references.
    #[serde(default)]
    pub requires: Vec<String>,
}

impl Manifest {
    /// Load a manifest from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a manifest from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a field fails validation.
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let manifest: Self = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), ManifestError> {
        validate_name("name", &self.block.name)?;
        validate_name("library", &self.block.library)?;
        if let Some(vendor) = &self.block.vendor {
            validate_name("vendor", vendor)?;
        }
        self.version()?;
        self.requires()?;
        Ok(())
    }

    /// The block's identifier.
    #[must_use]
    pub fn identifier(&self) -> BlockIdentifier {
        BlockIdentifier::new(
            self.block.vendor.as_deref().filter(|v| !v.is_empty()),
            Some(self.block.library.as_str()),
            &self.block.name,
        )
    }

    /// The block's released version, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the version is present but not specific.
    pub fn version(&self) -> Result<Option<Version>, ManifestError> {
        let Some(text) = &self.block.version else {
            return Ok(None);
        };
        match Version::parse(text) {
            Ok(version) if version.is_specific() => Ok(Some(version)),
            _ => Err(ManifestError::InvalidVersion(text.clone())),
        }
    }

    /// Parsed `requires` entries.
    ///
    /// # Errors
    ///
    /// Returns an error for the first entry that is not a block reference.
    pub fn requires(&self) -> Result<Vec<BlockReference>, ManifestError> {
        self.block
            .requires
            .iter()
            .map(|text| {
                BlockReference::parse(text).map_err(|source| ManifestError::InvalidRequirement {
                    text: text.clone(),
                    source,
                })
            })
            .collect()
    }

    /// Declared top-level unit.
    #[must_use]
    pub fn top(&self) -> Option<Name> {
        self.block.top.as_deref().filter(|t| !t.is_empty()).map(Name::new)
    }

    /// Declared testbench.
    #[must_use]
    pub fn bench(&self) -> Option<Name> {
        self.block.bench.as_deref().filter(|b| !b.is_empty()).map(Name::new)
    }

    /// Serialize the manifest to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn validate_name(field: &'static str, value: &str) -> Result<(), ManifestError> {
    let invalid = |reason| ManifestError::InvalidName {
        field,
        value: value.to_string(),
        reason,
    };

    if value.is_empty() {
        return Err(invalid("cannot be empty"));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(invalid(
            "can only contain letters, numbers, hyphens, and underscores",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_manifest() {
        let toml = r#"
[block]
name = "adder"
library = "math"
"#;
        let manifest = Manifest::parse(toml).unwrap();
        assert_eq!(manifest.block.name, "adder");
        assert_eq!(manifest.identifier().to_string(), "math.adder");
        assert_eq!(manifest.version().unwrap(), None);
        assert!(manifest.requires().unwrap().is_empty());
        assert!(manifest.top().is_none());
    }

    #[test]
    fn test_parse_full_manifest() {
        let toml = r#"
[block]
name = "adder"
library = "math"
vendor = "acme"
version = "1.2.0"
top = "adder"
bench = "adder_tb"
requires = ["acme.math.counter@1", "util.fifo"]
"#;
        let manifest = Manifest::parse(toml).unwrap();
        assert_eq!(manifest.identifier(), BlockIdentifier::qualified("acme", "math", "adder"));
        assert_eq!(manifest.version().unwrap(), Some(Version::new(1, 2, 0)));
        assert_eq!(manifest.top(), Some(Name::new("adder")));
        assert_eq!(manifest.bench(), Some(Name::new("adder_tb")));

        let requires = manifest.requires().unwrap();
        assert_eq!(requires.len(), 2);
        assert_eq!(requires[0].to_string(), "acme.math.counter@1");
        assert!(requires[1].version.is_none());
    }

    #[test]
    fn test_invalid_library_name() {
        let toml = r#"
[block]
name = "adder"
library = "my lib"
"#;
        let err = Manifest::parse(toml).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidName { field: "library", .. }));
    }

    #[test]
    fn test_empty_name() {
        let toml = r#"
[block]
name = ""
library = "math"
"#;
        let err = Manifest::parse(toml).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidName { field: "name", .. }));
    }

    #[test]
    fn test_partial_version_rejected() {
        let toml = r#"
[block]
name = "adder"
library = "math"
version = "1.2"
"#;
        let err = Manifest::parse(toml).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidVersion(..)));
    }

    #[test]
    fn test_invalid_requirement() {
        let toml = r#"
[block]
name = "adder"
library = "math"
requires = ["a.b.c.d"]
"#;
        let err = Manifest::parse(toml).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidRequirement { .. }));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let toml = r#"
[block]
name = "adder"
library = "math"
edition = "2025"
"#;
        let err = Manifest::parse(toml).unwrap_err();
        assert!(matches!(err, ManifestError::Parse(..)));
    }
}
