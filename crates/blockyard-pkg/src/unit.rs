//! Design units and unit extraction.
//!
//! A block's source tree is scanned file by file for primary units
//! (entities, packages, modules). Secondary units such as architectures and
//! package bodies contribute their references to the primary unit they
//! implement, even when they live in another file.

use crate::ident::{BlockIdentifier, Name};
use crate::lexer::{Scanned, Scanner};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// File extensions recognized as VHDL.
pub const VHDL_EXTENSIONS: &[&str] = &["vhd", "vhdl"];

/// File extensions recognized as Verilog or SystemVerilog.
pub const VERILOG_EXTENSIONS: &[&str] = &["v", "sv"];

/// Errors that can occur during unit extraction.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{}' is not a recognized HDL source file", .0.display())]
    UnsupportedFile(PathBuf),

    /// Two files declare a unit with the same name.
    #[error("unit '{name}' is declared in both '{}' and '{}'", .first.display(), .second.display())]
    DuplicateUnit {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
}

/// HDL language family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    Vhdl,
    Verilog,
}

impl Language {
    /// Detect the language from a file extension (case-insensitive).
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if VHDL_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Vhdl)
        } else if VERILOG_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Verilog)
        } else {
            None
        }
    }

    /// The language part of a blueprint label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Vhdl => "VHDL",
            Self::Verilog => "VLOG",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vhdl => write!(f, "vhdl"),
            Self::Verilog => write!(f, "verilog"),
        }
    }
}

/// Kind of primary design unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    Entity,
    Package,
    Module,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity => write!(f, "entity"),
            Self::Package => write!(f, "package"),
            Self::Module => write!(f, "module"),
        }
    }
}

/// How a unit refers to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// Component, entity or module instantiation.
    Instance,
    /// `use library.package` clause.
    PackageUse,
}

/// A name referenced by a unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitReference {
    /// Library qualifier, if the source gave one (`work.adder`).
    pub library: Option<Name>,
    /// Referenced unit name.
    pub name: Name,
    pub kind: ReferenceKind,
}

impl UnitReference {
    /// An instantiation of `name`.
    #[must_use]
    pub fn instance(library: Option<&str>, name: &str) -> Self {
        Self {
            library: library.map(Name::new),
            name: Name::new(name),
            kind: ReferenceKind::Instance,
        }
    }

    /// A use clause naming package `name`.
    #[must_use]
    pub fn package(library: Option<&str>, name: &str) -> Self {
        Self {
            library: library.map(Name::new),
            name: Name::new(name),
            kind: ReferenceKind::PackageUse,
        }
    }
}

impl fmt::Display for UnitReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.library {
            Some(library) => write!(f, "{library}.{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A primary design unit declared in a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub name: Name,
    pub kind: UnitKind,
    pub language: Language,
    /// Block that declares the unit.
    pub block: BlockIdentifier,
    /// Library namespace the unit is compiled into.
    pub library: Name,
    /// File holding the declaration.
    pub file: PathBuf,
    /// Other files contributing secondary units (architectures, package bodies).
    pub extra_files: Vec<PathBuf>,
    /// Entity without ports or module without ports.
    pub testbench: bool,
    pub references: Vec<UnitReference>,
}

impl Unit {
    /// Returns true for VHDL packages.
    #[must_use]
    pub fn is_package(&self) -> bool {
        self.kind == UnitKind::Package
    }

    /// Every file belonging to the unit, declaration first.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.file.as_path()).chain(self.extra_files.iter().map(PathBuf::as_path))
    }
}

/// The units of one block, ordered by file then declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitSet {
    units: Vec<Unit>,
    by_name: HashMap<Name, usize>,
}

impl UnitSet {
    /// Look up a unit by name (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &Name) -> Option<&Unit> {
        self.by_name.get(name).map(|&i| &self.units[i])
    }

    /// Returns true if a unit named `name` exists.
    #[must_use]
    pub fn contains(&self, name: &Name) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Unit> {
        self.units.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    fn push(&mut self, unit: Unit) -> Result<(), ExtractError> {
        if let Some(&existing) = self.by_name.get(&unit.name) {
            let first = self.units[existing].file.clone();
            return Err(ExtractError::DuplicateUnit {
                name: unit.name.to_string(),
                first,
                second: unit.file,
            });
        }
        self.by_name.insert(unit.name.clone(), self.units.len());
        self.units.push(unit);
        Ok(())
    }
}

impl<'a> IntoIterator for &'a UnitSet {
    type Item = &'a Unit;
    type IntoIter = std::slice::Iter<'a, Unit>;

    fn into_iter(self) -> Self::IntoIter {
        self.units.iter()
    }
}

/// Scans the source files of one block for design units.
#[derive(Debug, Clone)]
pub struct Extractor {
    block: BlockIdentifier,
    library: Name,
}

impl Extractor {
    /// Create an extractor for units of `block`.
    ///
    /// Units are placed in the block's library; a block without a library
    /// compiles into `work`.
    #[must_use]
    pub fn new(block: BlockIdentifier) -> Self {
        let library = block.library.clone().unwrap_or_else(|| Name::new("work"));
        Self { block, library }
    }

    /// Read and scan files in parallel.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read, has an unknown extension,
    /// or two files declare the same unit.
    pub fn extract(&self, files: &[PathBuf]) -> Result<UnitSet, ExtractError> {
        let scanned = files
            .par_iter()
            .map(|path| -> Result<_, ExtractError> {
                let language = Language::from_path(path)
                    .ok_or_else(|| ExtractError::UnsupportedFile(path.clone()))?;
                let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
                    path: path.clone(),
                    source,
                })?;
                let source = String::from_utf8_lossy(&bytes);
                Ok((path.clone(), language, Scanner::for_language(language).scan(&source)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.merge(scanned)
    }

    /// Scan in-memory sources, keyed by path.
    ///
    /// # Errors
    ///
    /// Returns an error if a path has an unknown extension or two sources
    /// declare the same unit.
    pub fn extract_sources(&self, sources: &[(PathBuf, String)]) -> Result<UnitSet, ExtractError> {
        let scanned = sources
            .par_iter()
            .map(|(path, text)| -> Result<_, ExtractError> {
                let language = Language::from_path(path)
                    .ok_or_else(|| ExtractError::UnsupportedFile(path.clone()))?;
                Ok((path.clone(), language, Scanner::for_language(language).scan(text)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.merge(scanned)
    }

    /// Combine per-file results in path order so that errors do not depend
    /// on scan order.
    fn merge(&self, mut scanned: Vec<(PathBuf, Language, Scanned)>) -> Result<UnitSet, ExtractError> {
        scanned.sort_by(|a, b| a.0.cmp(&b.0));

        let mut set = UnitSet::default();
        for (path, language, file) in &scanned {
            debug!(
                block = %self.block,
                file = %path.display(),
                units = file.units.len(),
                "scanned file"
            );
            for declaration in &file.units {
                set.push(Unit {
                    name: declaration.name.clone(),
                    kind: declaration.kind,
                    language: *language,
                    block: self.block.clone(),
                    library: self.library.clone(),
                    file: path.clone(),
                    extra_files: Vec::new(),
                    testbench: declaration.testbench,
                    references: declaration.references.clone(),
                })?;
            }
        }

        for (path, _, file) in scanned {
            for body in file.bodies {
                let Some(&index) = set.by_name.get(&body.owner) else {
                    warn!(
                        block = %self.block,
                        file = %path.display(),
                        owner = %body.owner,
                        "secondary unit has no primary unit in this block"
                    );
                    continue;
                };
                let unit = &mut set.units[index];
                if unit.file != path && !unit.extra_files.contains(&path) {
                    unit.extra_files.push(path.clone());
                }
                for reference in body.references {
                    if !unit.references.contains(&reference) {
                        unit.references.push(reference);
                    }
                }
            }
        }

        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn util_block() -> BlockIdentifier {
        BlockIdentifier::qualified("acme", "util", "counters")
    }

    fn source(path: &str, text: &str) -> (PathBuf, String) {
        (PathBuf::from(path), text.to_string())
    }

    #[test]
    fn test_language_from_extension() {
        assert_eq!(Language::from_path(Path::new("a.vhd")), Some(Language::Vhdl));
        assert_eq!(Language::from_path(Path::new("a.VHDL")), Some(Language::Vhdl));
        assert_eq!(Language::from_path(Path::new("a.v")), Some(Language::Verilog));
        assert_eq!(Language::from_path(Path::new("a.SV")), Some(Language::Verilog));
        assert_eq!(Language::from_path(Path::new("a.xdc")), None);
        assert_eq!(Language::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_extract_units_and_bodies() {
        let sources = vec![
            source("rtl/adder.vhd", "entity adder is port (a : in bit); end entity;"),
            source(
                "rtl/adder_rtl.vhd",
                "library util; use util.types.all;\narchitecture rtl of adder is begin end rtl;",
            ),
            source("rtl/types.vhd", "package types is end package;"),
        ];
        let set = Extractor::new(util_block()).extract_sources(&sources).unwrap();
        assert_eq!(set.len(), 2);

        let adder = set.get(&Name::new("ADDER")).unwrap();
        assert_eq!(adder.library.as_str(), "util");
        assert_eq!(adder.language, Language::Vhdl);
        assert_eq!(adder.extra_files, vec![PathBuf::from("rtl/adder_rtl.vhd")]);
        assert_eq!(adder.references, vec![UnitReference::package(Some("util"), "types")]);
        assert_eq!(adder.files().count(), 2);

        assert!(set.get(&Name::new("types")).unwrap().is_package());
    }

    #[test]
    fn test_duplicate_unit_in_library() {
        let sources = vec![
            source("b/counter.vhd", "entity counter is port (clk : in bit); end;"),
            source("a/counter.v", "module counter(input clk); endmodule"),
        ];
        let err = Extractor::new(util_block()).extract_sources(&sources).unwrap_err();
        match err {
            ExtractError::DuplicateUnit { name, first, second } => {
                assert_eq!(name, "counter");
                assert_eq!(first, PathBuf::from("a/counter.v"));
                assert_eq!(second, PathBuf::from("b/counter.vhd"));
            }
            other => panic!("expected duplicate, got {other:?}"),
        }
    }

    #[test]
    fn test_extraction_is_order_independent() {
        let mut sources = vec![
            source("x/top.vhd", "entity top is port (a : in bit); end;\narchitecture s of top is begin u : adder port map (a); end s;"),
            source("x/adder.v", "module adder(input a); endmodule"),
            source("x/top_tb.vhd", "entity top_tb is end;"),
            source("x/pkg.vhd", "package pkg is end;"),
        ];
        let extractor = Extractor::new(util_block());
        let expected = extractor.extract_sources(&sources).unwrap();

        sources.reverse();
        assert_eq!(extractor.extract_sources(&sources).unwrap(), expected);
        sources.swap(0, 2);
        assert_eq!(extractor.extract_sources(&sources).unwrap(), expected);

        let names: Vec<&str> = expected.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["adder", "pkg", "top", "top_tb"]);
    }

    #[test]
    fn test_unsupported_file() {
        let sources = vec![source("constraints.xdc", "set_property")];
        assert!(matches!(
            Extractor::new(util_block()).extract_sources(&sources),
            Err(ExtractError::UnsupportedFile(_))
        ));
    }

    #[test]
    fn test_extract_from_disk() {
        let tmp = TempDir::new().unwrap();
        let adder = tmp.path().join("adder.vhd");
        let tb = tmp.path().join("adder_tb.sv");
        std::fs::write(&adder, "entity adder is port (a : in bit); end;").unwrap();
        std::fs::write(&tb, "module adder_tb; adder dut (.a(1'b0)); endmodule").unwrap();

        let set = Extractor::new(util_block()).extract(&[tb, adder]).unwrap();
        let tb = set.get(&Name::new("adder_tb")).unwrap();
        assert!(tb.testbench);
        assert_eq!(tb.references, vec![UnitReference::instance(None, "adder")]);
        assert!(!set.get(&Name::new("adder")).unwrap().testbench);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let err = Extractor::new(util_block())
            .extract(&[tmp.path().join("gone.vhd")])
            .unwrap_err();
        assert!(matches!(err, ExtractError::Io { .. }));
    }
}
