//! Package management core for HDL blocks.
//!
//! This crate provides:
//! - Block identifiers with shortcut resolution against a tiered catalog
//! - Semantic version selection across the available, installed and
//!   downloaded tiers
//! - Design unit extraction from VHDL and Verilog sources
//! - Unit dependency graphs spanning several blocks
//! - Blueprint assembly for downstream build plugins
//! - Parsing of `Block.toml` manifests and `workspace.toml` settings

mod block;
mod blueprint;
mod build;
mod catalog;
mod graph;
mod ident;
mod lexer;
mod manifest;
mod resolve;
mod unit;
mod version;
mod workspace;

pub use block::{Block, BlockError, BlockLayout, FsLoader, BUILD_DIR, MANIFEST_FILE};
pub use blueprint::{
    Assembler, Blueprint, BlueprintError, Entry, Label, LabelScope, Role, SupplementalLabel,
    Warning, BLUEPRINT_FILE,
};
pub use build::{BuildError, BuildRequest, Plan, Planner};
pub use catalog::{Catalog, CatalogEntry, CatalogError, Tier, TierSet};
pub use graph::{
    BlockLoader, DependencyGraph, GraphBuilder, GraphError, LoadedBlock, UnitKey,
    DEFAULT_IGNORED_LIBRARIES,
};
pub use ident::{
    BlockIdentifier, BlockReference, IdentError, Name, SEGMENT_DELIM, UNIT_DELIM, VERSION_DELIM,
};
pub use lexer::{Body, Declaration, Scanned, Scanner};
pub use manifest::{BlockSection, Manifest, ManifestError};
pub use resolve::{Candidate, Eligibility, ResolveError, ShortcutResolver};
pub use unit::{
    ExtractError, Extractor, Language, ReferenceKind, Unit, UnitKind, UnitReference, UnitSet,
    VERILOG_EXTENSIONS, VHDL_EXTENSIONS,
};
pub use version::{
    select_version, SelectError, Selection, TierPrecedence, Version, VersionSelector,
};
pub use workspace::{LabelSection, Settings, SettingsError, WorkspaceSection, SETTINGS_FILE};
