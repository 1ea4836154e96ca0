//! Blueprint assembly.
//!
//! A blueprint is the ordered, labeled file list handed to build plugins.
//! Each line of `build/blueprint` reads `@LABEL path`:
//!
//! ```text
//! @VHDL-LIB /blocks/util/fifo/fifo.vhd
//! @VHDL-SRC adder.vhd
//! @VHDL-SRC-TOP top_level.vhd
//! @XDC pins.xdc
//! ```
//!
//! Unit files come first in dependency order; supplemental labels from the
//! workspace settings follow.

use crate::block::BUILD_DIR;
use crate::graph::{DependencyGraph, LoadedBlock, UnitKey};
use crate::unit::Language;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Blueprint filename inside the build directory.
pub const BLUEPRINT_FILE: &str = "blueprint";

/// Errors that can occur while assembling or writing a blueprint.
#[derive(Error, Debug)]
pub enum BlueprintError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("glob pattern error: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("top unit {0} is not part of the dependency graph")]
    UnknownTop(String),
}

/// Non-fatal findings reported beside a blueprint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    #[error("multiple top units labeled {label}: {}", .units.join(", "))]
    MultipleTopUnits { label: String, units: Vec<String> },
}

/// What a unit's file is to the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// Design source of the block being built.
    Src,
    /// Testbench of the block being built.
    Sim,
    /// Source of a dependency block.
    Lib,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Src => "SRC",
            Self::Sim => "SIM",
            Self::Lib => "LIB",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A blueprint label, written with a leading `@`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Label {
    /// `VHDL-SRC`, `VLOG-SIM-TOP` and so on.
    Unit {
        language: Language,
        role: Role,
        top: bool,
    },
    /// A label from the workspace settings.
    Supplemental(String),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit {
                language,
                role,
                top,
            } => {
                write!(f, "{}-{role}", language.label())?;
                if *top {
                    write!(f, "-TOP")?;
                }
                Ok(())
            }
            Self::Supplemental(name) => write!(f, "{name}"),
        }
    }
}

/// Which blocks a supplemental label searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelScope {
    /// Every block in the build.
    Recursive,
    /// Only the block being built.
    Shallow,
}

/// A user-defined label attached to files matching a glob.
#[derive(Debug, Clone)]
pub struct SupplementalLabel {
    name: String,
    pattern: glob::Pattern,
    scope: LabelScope,
}

impl SupplementalLabel {
    #[must_use]
    pub fn new(name: impl Into<String>, pattern: glob::Pattern, scope: LabelScope) -> Self {
        Self {
            name: name.into(),
            pattern,
            scope,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn scope(&self) -> LabelScope {
        self.scope
    }

    /// Files below `root` matching the pattern, `build/` excluded.
    fn files(&self, root: &Path) -> Result<Vec<PathBuf>, BlueprintError> {
        let base = glob::Pattern::escape(&root.to_string_lossy());
        let query = format!("{base}/**/{}", self.pattern.as_str());
        let build = root.join(BUILD_DIR);

        let mut files = Vec::new();
        for entry in glob::glob(&query)? {
            let path = entry.map_err(glob::GlobError::into_error)?;
            if path.is_file() && !path.starts_with(&build) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// One blueprint line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub label: Label,
    pub path: String,
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{} {}", self.label, self.path)
    }
}

/// The ordered, labeled file list of one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blueprint {
    entries: Vec<Entry>,
}

impl Blueprint {
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if the blueprint has a `@label path` line.
    #[must_use]
    pub fn contains(&self, label: &str, path: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.path == path && e.label.to_string() == label)
    }

    /// Position of the first line for `path`.
    #[must_use]
    pub fn position(&self, path: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.path == path)
    }

    /// Write `build/blueprint` below `block_root`, returning its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the build directory or file cannot be written.
    pub fn write(&self, block_root: impl AsRef<Path>) -> Result<PathBuf, BlueprintError> {
        let dir = block_root.as_ref().join(BUILD_DIR);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(BLUEPRINT_FILE);
        std::fs::write(&path, self.to_string())?;
        info!(path = %path.display(), entries = self.entries.len(), "wrote blueprint");
        Ok(path)
    }

    fn push(&mut self, seen: &mut HashSet<(Label, String)>, label: Label, path: String) {
        if seen.insert((label.clone(), path.clone())) {
            self.entries.push(Entry { label, path });
        }
    }
}

impl fmt::Display for Blueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

/// Turns a dependency graph into a blueprint.
pub struct Assembler<'g> {
    graph: &'g DependencyGraph,
    labels: Vec<SupplementalLabel>,
}

impl<'g> Assembler<'g> {
    #[must_use]
    pub fn new(graph: &'g DependencyGraph) -> Self {
        Self {
            graph,
            labels: Vec::new(),
        }
    }

    /// Append files matching these labels after the unit files.
    #[must_use]
    pub fn with_labels(mut self, labels: Vec<SupplementalLabel>) -> Self {
        self.labels = labels;
        self
    }

    /// Assemble the blueprint for a build whose designated top is `top`.
    ///
    /// # Errors
    ///
    /// Returns an error if `top` is not in the graph or a supplemental glob
    /// cannot be evaluated.
    pub fn assemble(&self, top: &UnitKey) -> Result<(Blueprint, Vec<Warning>), BlueprintError> {
        let graph = self.graph;
        if !graph.contains(top) {
            return Err(BlueprintError::UnknownTop(top.to_string()));
        }

        let mut tops: BTreeSet<&UnitKey> = graph
            .unconsumed()
            .into_iter()
            .filter(|k| graph.in_root_block(k))
            .collect();
        tops.insert(top);

        let mut blueprint = Blueprint::default();
        let mut seen = HashSet::new();
        let mut top_units: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for key in graph.order() {
            let (Some(unit), Some(block)) = (graph.unit(key), graph.block_of(key)) else {
                continue;
            };
            let in_root = graph.in_root_block(key);
            let role = if !in_root {
                Role::Lib
            } else if unit.testbench {
                Role::Sim
            } else {
                Role::Src
            };
            let is_top = tops.contains(key);
            let label = Label::Unit {
                language: unit.language,
                role,
                top: is_top,
            };
            if is_top {
                top_units
                    .entry(label.to_string())
                    .or_default()
                    .push(unit.name.to_string());
            }

            for file in unit.files() {
                blueprint.push(&mut seen, label.clone(), entry_path(file, block, in_root));
            }
        }

        let root_id = &graph.root_block().id;
        for block in graph.block_order() {
            let in_root = block.id == *root_id;
            for label in &self.labels {
                if label.scope == LabelScope::Shallow && !in_root {
                    continue;
                }
                for file in label.files(&block.root)? {
                    let path = entry_path(&file, block, in_root);
                    blueprint.push(&mut seen, Label::Supplemental(label.name.clone()), path);
                }
            }
        }

        let warnings: Vec<Warning> = top_units
            .into_iter()
            .filter(|(_, units)| units.len() > 1)
            .map(|(label, units)| Warning::MultipleTopUnits { label, units })
            .collect();
        for warning in &warnings {
            warn!("{warning}");
        }

        debug!(entries = blueprint.len(), "assembled blueprint");
        Ok((blueprint, warnings))
    }
}

/// Root-block paths are relative to the block root; other blocks' paths are
/// absolute. Separators are always `/`.
fn entry_path(file: &Path, block: &LoadedBlock, in_root: bool) -> String {
    let path = if in_root {
        file.strip_prefix(&block.root).unwrap_or(file).to_path_buf()
    } else if file.is_relative() {
        block.root.join(file)
    } else {
        file.to_path_buf()
    };
    path.to_string_lossy().replace('\\', "/")
}
