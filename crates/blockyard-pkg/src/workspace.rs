//! Workspace settings (`workspace.toml`).
//!
//! ```toml
//! [workspace]
//! catalog = "catalog.toml"
//! multi-develop = false
//! tier-precedence = ["downloaded", "installed", "available"]
//! ignored-libraries = ["ieee", "std"]
//!
//! [label.recursive]
//! XDC = "*.xdc"
//!
//! [label.shallow]
//! DO = "*.do"
//! ```
//!
//! Recursive labels apply to the files of every block in a build, shallow
//! labels only to the block being built.

use crate::block::absolute;
use crate::blueprint::{LabelScope, SupplementalLabel};
use crate::catalog::Tier;
use crate::graph::DEFAULT_IGNORED_LIBRARIES;
use crate::version::TierPrecedence;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The settings filename.
pub const SETTINGS_FILE: &str = "workspace.toml";

/// Errors that can occur when loading workspace settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid label name '{0}': labels use uppercase letters, digits, '-' and '_'")]
    InvalidLabel(String),

    #[error("invalid glob '{pattern}' for label '{label}': {source}")]
    InvalidPattern {
        label: String,
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    #[serde(default)]
    workspace: WorkspaceSection,

    #[serde(default)]
    label: LabelSection,
}

/// The `[workspace]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceSection {
    /// Catalog snapshot, relative to the settings file.
    #[serde(default)]
    pub catalog: Option<PathBuf>,

    /// Let downloaded copies of dependencies shadow installed ones.
    #[serde(default, rename = "multi-develop")]
    pub multi_develop: bool,

    /// Explicit tier precedence, most preferred first.
    #[serde(default, rename = "tier-precedence")]
    pub tier_precedence: Option<Vec<Tier>>,

    /// Libraries provided by the toolchain.
    #[serde(default = "default_ignored", rename = "ignored-libraries")]
    pub ignored_libraries: Vec<String>,
}

impl Default for WorkspaceSection {
    fn default() -> Self {
        Self {
            catalog: None,
            multi_develop: false,
            tier_precedence: None,
            ignored_libraries: default_ignored(),
        }
    }
}

fn default_ignored() -> Vec<String> {
    DEFAULT_IGNORED_LIBRARIES.iter().map(ToString::to_string).collect()
}

/// The `[label.*]` tables, label name to glob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelSection {
    #[serde(default)]
    pub recursive: BTreeMap<String, String>,

    #[serde(default)]
    pub shallow: BTreeMap<String, String>,
}

/// Loaded workspace settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding the settings file.
    pub root: PathBuf,

    pub workspace: WorkspaceSection,

    pub label: LabelSection,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            workspace: WorkspaceSection::default(),
            label: LabelSection::default(),
        }
    }
}

impl Settings {
    /// Load settings from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let root = path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self::parse(&content, root)
    }

    /// Parse settings, resolving relative paths against `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a label fails validation.
    pub fn parse(content: &str, root: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let file: SettingsFile = toml::from_str(content)?;
        let settings = Self {
            root: root.into(),
            workspace: file.workspace,
            label: file.label,
        };
        settings.labels()?;
        Ok(settings)
    }

    /// Find settings by searching upward from a directory.
    ///
    /// Returns `None` when no settings file exists up to the filesystem root.
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file is found but invalid.
    pub fn find(start: impl AsRef<Path>) -> Result<Option<Self>, SettingsError> {
        let mut current = absolute(start.as_ref())?;

        loop {
            let candidate = current.join(SETTINGS_FILE);
            if candidate.exists() {
                return Self::load(candidate).map(Some);
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok(None),
            }
        }
    }

    /// Override the multi-develop policy.
    #[must_use]
    pub fn with_multi_develop(mut self, enabled: bool) -> Self {
        self.workspace.multi_develop = enabled;
        self
    }

    /// Override the catalog snapshot location.
    #[must_use]
    pub fn with_catalog(mut self, path: impl Into<PathBuf>) -> Self {
        self.workspace.catalog = Some(path.into());
        self
    }

    /// Catalog snapshot path, resolved against the settings directory.
    #[must_use]
    pub fn catalog_path(&self) -> Option<PathBuf> {
        self.workspace.catalog.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                self.root.join(p)
            }
        })
    }

    /// Tier precedence for dependency selection.
    ///
    /// An explicit `tier-precedence` wins over the multi-develop policy.
    #[must_use]
    pub fn precedence(&self) -> TierPrecedence {
        self.precedence_for(None)
    }

    /// Tier precedence with the multi-develop policy optionally overridden.
    ///
    /// The override replaces the `multi-develop` setting only; an explicit
    /// `tier-precedence` still wins.
    #[must_use]
    pub fn precedence_for(&self, multi_develop: Option<bool>) -> TierPrecedence {
        match &self.workspace.tier_precedence {
            Some(order) => TierPrecedence::from_order(order),
            None => TierPrecedence::for_multi_develop(multi_develop.unwrap_or(self.workspace.multi_develop)),
        }
    }

    #[must_use]
    pub fn ignored_libraries(&self) -> &[String] {
        &self.workspace.ignored_libraries
    }

    /// Supplemental labels, recursive ones first, each group in name order.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed label name or glob.
    pub fn labels(&self) -> Result<Vec<SupplementalLabel>, SettingsError> {
        let recursive = self.label.recursive.iter().map(|l| (l, LabelScope::Recursive));
        let shallow = self.label.shallow.iter().map(|l| (l, LabelScope::Shallow));

        recursive
            .chain(shallow)
            .map(|((name, pattern), scope)| {
                let valid = !name.is_empty()
                    && name
                        .chars()
                        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_');
                if !valid {
                    return Err(SettingsError::InvalidLabel(name.clone()));
                }
                let glob = glob::Pattern::new(pattern).map_err(|source| SettingsError::InvalidPattern {
                    label: name.clone(),
                    pattern: pattern.clone(),
                    source,
                })?;
                Ok(SupplementalLabel::new(name.clone(), glob, scope))
            })
            .collect()
    }
}
