//! Build planning.
//!
//! A plan ties the pipeline together for one block: pick the top unit (and
//! optionally its testbench), build the dependency graph from it, and
//! assemble the blueprint.

use crate::blueprint::{Assembler, Blueprint, BlueprintError, Warning};
use crate::catalog::Catalog;
use crate::graph::{BlockLoader, DependencyGraph, GraphBuilder, GraphError, LoadedBlock, UnitKey};
use crate::ident::Name;
use crate::manifest::Manifest;
use crate::version::TierPrecedence;
use crate::workspace::{Settings, SettingsError};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur while planning a build.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("block '{0}' has no top-level unit")]
    NoTopUnit(String),

    #[error("cannot choose a {role} for block '{block}' among: {}", .candidates.join(", "))]
    AmbiguousTop {
        block: String,
        role: &'static str,
        candidates: Vec<String>,
    },

    #[error("block '{block}' has no unit named '{unit}'")]
    UnknownUnit { block: String, unit: String },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Blueprint(#[from] BlueprintError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// What to build.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    /// Top-level unit; detected when absent.
    pub top: Option<String>,
    /// Testbench; detected when absent and `include_bench` is set.
    pub bench: Option<String>,
    /// Root the build at the testbench of the top unit.
    pub include_bench: bool,
    /// Overrides the workspace multi-develop policy; an explicit
    /// `tier-precedence` setting still wins.
    pub multi_develop: Option<bool>,
    /// Overrides every other precedence source.
    pub precedence: Option<TierPrecedence>,
}

impl BuildRequest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_top(mut self, top: impl Into<String>) -> Self {
        self.top = Some(top.into());
        self
    }

    #[must_use]
    pub fn with_bench(mut self, bench: impl Into<String>) -> Self {
        self.bench = Some(bench.into());
        self.include_bench = true;
        self
    }

    #[must_use]
    pub fn include_bench(mut self, include: bool) -> Self {
        self.include_bench = include;
        self
    }

    #[must_use]
    pub fn with_multi_develop(mut self, enabled: bool) -> Self {
        self.multi_develop = Some(enabled);
        self
    }

    #[must_use]
    pub fn with_precedence(mut self, precedence: TierPrecedence) -> Self {
        self.precedence = Some(precedence);
        self
    }

    /// Fill the top and bench from a manifest where not given explicitly.
    #[must_use]
    pub fn with_manifest_defaults(mut self, manifest: &Manifest) -> Self {
        if self.top.is_none() {
            self.top = manifest.top().map(|t| t.to_string());
        }
        if self.bench.is_none() && self.include_bench {
            self.bench = manifest.bench().map(|b| b.to_string());
        }
        self
    }
}

/// The outcome of planning one build.
#[derive(Debug, Clone)]
pub struct Plan {
    pub graph: DependencyGraph,
    pub blueprint: Blueprint,
    pub warnings: Vec<Warning>,
    pub top: UnitKey,
    pub bench: Option<UnitKey>,
}

/// Plans builds against one catalog snapshot and workspace settings.
pub struct Planner<'c, L> {
    catalog: &'c Catalog,
    loader: &'c L,
    settings: &'c Settings,
}

impl<'c, L: BlockLoader> Planner<'c, L> {
    #[must_use]
    pub fn new(catalog: &'c Catalog, loader: &'c L, settings: &'c Settings) -> Self {
        Self {
            catalog,
            loader,
            settings,
        }
    }

    fn precedence(&self, request: &BuildRequest) -> TierPrecedence {
        request
            .precedence
            .unwrap_or_else(|| self.settings.precedence_for(request.multi_develop))
    }

    /// Build the graph and blueprint for `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the top or bench cannot be determined, the graph
    /// cannot be built, or the blueprint cannot be assembled.
    pub fn plan(&self, root: LoadedBlock, request: &BuildRequest) -> Result<Plan, BuildError> {
        let top = detect_top(&root, request)?;
        let bench = if request.include_bench {
            detect_bench(&root, request, &top)?
        } else {
            None
        };
        debug!(block = %root.id, top = %top, bench = ?bench.as_ref().map(ToString::to_string), "planning build");

        let start = bench.clone().unwrap_or_else(|| top.clone());
        let graph = GraphBuilder::new(self.catalog, self.loader)
            .with_precedence(self.precedence(request))
            .with_ignored_libraries(self.settings.ignored_libraries())
            .build(root, &[start])?;

        let find = |name: &Name| {
            graph
                .order()
                .iter()
                .find(|k| graph.in_root_block(k) && k.unit == *name)
                .cloned()
        };
        let top_key = find(&top).ok_or_else(|| BuildError::UnknownUnit {
            block: graph.root_block().id.to_string(),
            unit: top.to_string(),
        })?;
        let bench_key = bench.as_ref().and_then(|b| find(b));

        let (blueprint, warnings) = Assembler::new(&graph)
            .with_labels(self.settings.labels()?)
            .assemble(&top_key)?;

        Ok(Plan {
            graph,
            blueprint,
            warnings,
            top: top_key,
            bench: bench_key,
        })
    }

    /// Plan the build and write `build/blueprint` into the block.
    ///
    /// # Errors
    ///
    /// Returns an error if planning fails or the blueprint cannot be written.
    pub fn export(&self, root: LoadedBlock, request: &BuildRequest) -> Result<(Plan, PathBuf), BuildError> {
        let block_root = root.root.clone();
        let plan = self.plan(root, request)?;
        let path = plan.blueprint.write(&block_root)?;
        info!(top = %plan.top, files = plan.blueprint.len(), "exported build");
        Ok((plan, path))
    }
}

fn unknown(root: &LoadedBlock, unit: &str) -> BuildError {
    BuildError::UnknownUnit {
        block: root.id.to_string(),
        unit: unit.to_string(),
    }
}

/// Returns true if `referrer` names `unit` of the same block.
fn references(root: &LoadedBlock, referrer: &crate::unit::Unit, unit: &Name) -> bool {
    let library = root.library();
    referrer.references.iter().any(|r| {
        r.name == *unit
            && r.library
                .as_ref()
                .map_or(true, |l| l.eq_str("work") || *l == library)
    })
}

/// The explicit top, or the single design unit no other design unit uses.
fn detect_top(root: &LoadedBlock, request: &BuildRequest) -> Result<Name, BuildError> {
    if let Some(top) = &request.top {
        let unit = root.units.get(&Name::new(top.as_str())).ok_or_else(|| unknown(root, top))?;
        return Ok(unit.name.clone());
    }

    let designs: Vec<_> = root
        .units
        .iter()
        .filter(|u| !u.testbench && !u.is_package())
        .collect();
    let candidates: Vec<&Name> = designs
        .iter()
        .filter(|u| {
            !designs
                .iter()
                .any(|other| other.name != u.name && references(root, other, &u.name))
        })
        .map(|u| &u.name)
        .collect();

    match candidates.as_slice() {
        [] => Err(BuildError::NoTopUnit(root.id.to_string())),
        [only] => Ok((*only).clone()),
        many => Err(BuildError::AmbiguousTop {
            block: root.id.to_string(),
            role: "top unit",
            candidates: many.iter().map(ToString::to_string).collect(),
        }),
    }
}

/// The explicit bench, or the single testbench that uses `top`.
fn detect_bench(root: &LoadedBlock, request: &BuildRequest, top: &Name) -> Result<Option<Name>, BuildError> {
    if let Some(bench) = &request.bench {
        let unit = root
            .units
            .get(&Name::new(bench.as_str()))
            .ok_or_else(|| unknown(root, bench))?;
        return Ok(Some(unit.name.clone()));
    }

    let candidates: Vec<&Name> = root
        .units
        .iter()
        .filter(|u| u.testbench && references(root, u, top))
        .map(|u| &u.name)
        .collect();

    match candidates.as_slice() {
        [] => {
            warn!(block = %root.id, top = %top, "no testbench found for top unit");
            Ok(None)
        }
        [only] => Ok(Some((*only).clone())),
        many => Err(BuildError::AmbiguousTop {
            block: root.id.to_string(),
            role: "testbench",
            candidates: many.iter().map(ToString::to_string).collect(),
        }),
    }
}
