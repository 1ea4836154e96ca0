//! Unit dependency graph.
//!
//! Starting from one or more units of the block being built, every
//! reference is resolved to exactly one producing unit:
//! 1. a unit of the same block
//! 2. a unit of a block the consumer's block lists in `requires`
//! 3. a unit of a buildable catalog block in the referenced library
//!
//! References into ignored libraries (`ieee` and `std` by default) are
//! provided by the toolchain and never enter the graph. The finished graph
//! is ordered with Kahn's algorithm so producers always precede consumers.

use crate::block::BlockError;
use crate::catalog::{Catalog, TierSet};
use crate::ident::{BlockIdentifier, BlockReference, Name};
use crate::resolve::{Candidate, ResolveError, ShortcutResolver};
use crate::unit::{Unit, UnitReference, UnitSet};
use crate::version::{Selection, TierPrecedence, Version, VersionSelector};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

/// Libraries supplied by every simulator and synthesizer.
pub const DEFAULT_IGNORED_LIBRARIES: &[&str] = &["ieee", "std"];

/// Errors that can occur while building a dependency graph.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("block '{block}' has no unit named '{unit}'")]
    UnknownUnit { block: String, unit: String },

    #[error("'{unit}' references '{name}', which no reachable block provides")]
    UnresolvedDependency { unit: String, name: String },

    #[error("dependency cycle: {}", .path.join(" -> "))]
    CyclicDependency { path: Vec<String> },

    #[error("unit '{unit}' of library '{library}' is provided by both '{first}' and '{second}'")]
    DuplicateUnit {
        library: String,
        unit: String,
        first: String,
        second: String,
    },

    #[error("block '{block}' is needed at both {first} and {second}")]
    ConflictingVersions {
        block: String,
        first: String,
        second: String,
    },

    #[error("block '{block}' requires '{requirement}': {source}")]
    Requirement {
        block: String,
        requirement: String,
        #[source]
        source: ResolveError,
    },

    #[error("failed to load block {block}: {source}")]
    Load {
        block: String,
        #[source]
        source: BlockError,
    },

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Identifies one unit in the graph.
///
/// Ordering is `(library, block, unit)`, which breaks ties between units
/// that become ready at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitKey {
    pub library: Name,
    pub block: BlockIdentifier,
    pub unit: Name,
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block, self.unit)
    }
}

/// A block whose units are known.
#[derive(Debug, Clone)]
pub struct LoadedBlock {
    pub id: BlockIdentifier,
    /// Selected version; the block being built may be unversioned.
    pub version: Option<Version>,
    /// Directory holding the block's manifest.
    pub root: PathBuf,
    /// Blocks this block declares it depends on.
    pub requires: Vec<BlockReference>,
    pub units: UnitSet,
}

impl LoadedBlock {
    #[must_use]
    pub fn new(id: BlockIdentifier, root: impl Into<PathBuf>, units: UnitSet) -> Self {
        Self {
            id,
            version: None,
            root: root.into(),
            requires: Vec::new(),
            units,
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    #[must_use]
    pub fn with_requires(mut self, requires: Vec<BlockReference>) -> Self {
        self.requires = requires;
        self
    }

    /// Library the block's units compile into.
    #[must_use]
    pub fn library(&self) -> Name {
        self.id.library.clone().unwrap_or_else(|| Name::new("work"))
    }
}

impl fmt::Display for LoadedBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{version}", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Loads the units of a selected catalog block.
pub trait BlockLoader {
    /// Load the block copy described by `selection`.
    ///
    /// # Errors
    ///
    /// Returns an error if the copy cannot be found or its sources cannot
    /// be scanned.
    fn load(&self, selection: &Selection) -> Result<LoadedBlock, BlockError>;
}

#[derive(Debug, Clone)]
struct Node {
    block: usize,
    deps: BTreeSet<UnitKey>,
}

/// A resolved, acyclic unit graph rooted in one block.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    blocks: Vec<LoadedBlock>,
    nodes: BTreeMap<UnitKey, Node>,
    order: Vec<UnitKey>,
    roots: Vec<UnitKey>,
}

impl DependencyGraph {
    /// Units in dependency order, producers first.
    #[must_use]
    pub fn order(&self) -> &[UnitKey] {
        &self.order
    }

    /// The units the graph was built from.
    #[must_use]
    pub fn roots(&self) -> &[UnitKey] {
        &self.roots
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &UnitKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// The unit behind a key.
    #[must_use]
    pub fn unit(&self, key: &UnitKey) -> Option<&Unit> {
        let node = self.nodes.get(key)?;
        self.blocks[node.block].units.get(&key.unit)
    }

    /// The block that provides a unit.
    #[must_use]
    pub fn block_of(&self, key: &UnitKey) -> Option<&LoadedBlock> {
        self.nodes.get(key).map(|n| &self.blocks[n.block])
    }

    /// The block being built.
    #[must_use]
    pub fn root_block(&self) -> &LoadedBlock {
        &self.blocks[0]
    }

    /// Returns true if the unit belongs to the block being built.
    #[must_use]
    pub fn in_root_block(&self, key: &UnitKey) -> bool {
        self.nodes.get(key).is_some_and(|n| n.block == 0)
    }

    /// Units `key` depends on directly.
    pub fn dependencies(&self, key: &UnitKey) -> impl Iterator<Item = &UnitKey> {
        self.nodes.get(key).into_iter().flat_map(|n| n.deps.iter())
    }

    /// Units that depend on `key` directly.
    #[must_use]
    pub fn consumers(&self, key: &UnitKey) -> Vec<&UnitKey> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.deps.contains(key))
            .map(|(k, _)| k)
            .collect()
    }

    /// Units nothing else in the graph depends on.
    #[must_use]
    pub fn unconsumed(&self) -> Vec<&UnitKey> {
        let consumed: HashSet<&UnitKey> = self.nodes.values().flat_map(|n| n.deps.iter()).collect();
        self.order.iter().filter(|k| !consumed.contains(k)).collect()
    }

    /// Blocks taking part in the build, producers first and the block being
    /// built last.
    #[must_use]
    pub fn block_order(&self) -> Vec<&LoadedBlock> {
        let mut seen = vec![false; self.blocks.len()];
        let mut order = Vec::with_capacity(self.blocks.len());
        for key in &self.order {
            let block = self.nodes[key].block;
            if block != 0 && !seen[block] {
                seen[block] = true;
                order.push(&self.blocks[block]);
            }
        }
        order.push(&self.blocks[0]);
        order
    }

    /// Render the dependency tree below `top`, packages omitted.
    ///
    /// ```text
    /// \- math.top_level
    ///    +- math.adder
    ///    \- util.fifo
    ///       \- util.ram
    /// ```
    #[must_use]
    pub fn render_tree(&self, top: &UnitKey) -> String {
        let mut out = String::new();
        if self.contains(top) {
            self.render_node(top, "", true, true, &mut out);
        }
        out
    }

    fn render_node(&self, key: &UnitKey, prefix: &str, last: bool, top: bool, out: &mut String) {
        let branch = if last { "\\-" } else { "+-" };
        if top {
            out.push_str(&format!("{branch} {}.{}\n", key.library, key.unit));
        } else {
            out.push_str(&format!("{prefix}{branch} {}.{}\n", key.library, key.unit));
        }

        let children: Vec<&UnitKey> = self
            .dependencies(key)
            .filter(|k| self.unit(k).is_some_and(|u| !u.is_package()))
            .collect();
        let child_prefix = if top {
            "   ".to_string()
        } else if last {
            format!("{prefix}   ")
        } else {
            format!("{prefix}|  ")
        };
        for (i, child) in children.iter().enumerate() {
            self.render_node(child, &child_prefix, i + 1 == children.len(), false, out);
        }
    }
}

/// Builds a [`DependencyGraph`] against a catalog snapshot.
pub struct GraphBuilder<'c, L> {
    catalog: &'c Catalog,
    loader: &'c L,
    precedence: TierPrecedence,
    ignored: Vec<Name>,
}

impl<'c, L: BlockLoader> GraphBuilder<'c, L> {
    /// Create a builder with the default tier precedence and ignored libraries.
    #[must_use]
    pub fn new(catalog: &'c Catalog, loader: &'c L) -> Self {
        Self {
            catalog,
            loader,
            precedence: TierPrecedence::default(),
            ignored: DEFAULT_IGNORED_LIBRARIES.iter().map(|l| Name::new(*l)).collect(),
        }
    }

    /// Use a different tier precedence when selecting dependency copies.
    #[must_use]
    pub fn with_precedence(mut self, precedence: TierPrecedence) -> Self {
        self.precedence = precedence;
        self
    }

    /// Replace the set of libraries whose units are never looked up.
    #[must_use]
    pub fn with_ignored_libraries<I, S>(mut self, libraries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ignored = libraries.into_iter().map(|l| Name::new(l.as_ref())).collect();
        self
    }

    fn is_ignored(&self, library: &Name) -> bool {
        self.ignored.contains(library)
    }

    /// Build the graph reachable from `units` of `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A root unit does not exist in `root`
    /// - A reference cannot be resolved, or resolves ambiguously
    /// - Two blocks contribute the same unit to one library
    /// - The references form a cycle
    pub fn build(&self, root: LoadedBlock, units: &[Name]) -> Result<DependencyGraph, GraphError> {
        let mut roots = Vec::with_capacity(units.len());
        for name in units {
            let unit = root.units.get(name).ok_or_else(|| GraphError::UnknownUnit {
                block: root.id.to_string(),
                unit: name.to_string(),
            })?;
            roots.push(UnitKey {
                library: root.library(),
                block: root.id.clone(),
                unit: unit.name.clone(),
            });
        }

        let mut walk = Walk {
            builder: self,
            blocks: vec![root],
            index: HashMap::new(),
            requires: HashMap::new(),
            searched: HashSet::new(),
            nodes: BTreeMap::new(),
            providers: HashMap::new(),
        };
        walk.run(&roots)?;

        let order = topological_order(&walk.nodes)
            .map_err(|_| GraphError::CyclicDependency {
                path: find_cycle(&walk.nodes, &roots),
            })?;

        debug!(units = order.len(), blocks = walk.blocks.len(), "built dependency graph");

        Ok(DependencyGraph {
            blocks: walk.blocks,
            nodes: walk.nodes,
            order,
            roots,
        })
    }
}

/// Mutable state of one graph build.
struct Walk<'b, 'c, L> {
    builder: &'b GraphBuilder<'c, L>,
    /// Loaded blocks; index 0 is the block being built.
    blocks: Vec<LoadedBlock>,
    index: HashMap<BlockIdentifier, usize>,
    /// Resolved `requires` lists, by block index.
    requires: HashMap<usize, Vec<usize>>,
    /// Libraries whose catalog blocks have all been loaded.
    searched: HashSet<Name>,
    nodes: BTreeMap<UnitKey, Node>,
    /// Which block contributed each `(library, unit)`.
    providers: HashMap<(Name, Name), usize>,
}

impl<L: BlockLoader> Walk<'_, '_, L> {
    fn run(&mut self, roots: &[UnitKey]) -> Result<(), GraphError> {
        let mut pending: VecDeque<(UnitKey, usize)> = roots.iter().map(|k| (k.clone(), 0)).collect();

        while let Some((key, block)) = pending.pop_front() {
            if self.nodes.contains_key(&key) {
                continue;
            }
            self.claim(&key, block)?;

            let (library, references) = match self.blocks[block].units.get(&key.unit) {
                Some(unit) => (unit.library.clone(), unit.references.clone()),
                None => {
                    return Err(GraphError::UnknownUnit {
                        block: self.blocks[block].id.to_string(),
                        unit: key.unit.to_string(),
                    })
                }
            };

            let mut deps = BTreeSet::new();
            for reference in &references {
                if let Some((dep, dep_block)) = self.resolve(block, &key, &library, reference)? {
                    // recursive instantiation is legal VHDL
                    if dep != key {
                        deps.insert(dep.clone());
                        pending.push_back((dep, dep_block));
                    }
                }
            }
            self.nodes.insert(key, Node { block, deps });
        }
        Ok(())
    }

    /// Record that `block` provides `key`, rejecting a second provider.
    fn claim(&mut self, key: &UnitKey, block: usize) -> Result<(), GraphError> {
        let slot = (key.library.clone(), key.unit.clone());
        match self.providers.get(&slot) {
            Some(&existing) if existing != block => {
                let mut ids = [
                    self.blocks[existing].id.to_string(),
                    self.blocks[block].id.to_string(),
                ];
                ids.sort();
                let [first, second] = ids;
                Err(GraphError::DuplicateUnit {
                    library: key.library.to_string(),
                    unit: key.unit.to_string(),
                    first,
                    second,
                })
            }
            _ => {
                self.providers.insert(slot, block);
                Ok(())
            }
        }
    }

    fn key(&self, block: usize, name: &Name) -> Option<(UnitKey, usize)> {
        let loaded = &self.blocks[block];
        loaded.units.get(name).map(|unit| {
            (
                UnitKey {
                    library: loaded.library(),
                    block: loaded.id.clone(),
                    unit: unit.name.clone(),
                },
                block,
            )
        })
    }

    fn resolve(
        &mut self,
        block: usize,
        consumer: &UnitKey,
        library: &Name,
        reference: &UnitReference,
    ) -> Result<Option<(UnitKey, usize)>, GraphError> {
        let qualifier = match &reference.library {
            Some(l) if self.builder.is_ignored(l) => return Ok(None),
            Some(l) if l.eq_str("work") => None,
            Some(l) => Some(l.clone()),
            None => None,
        };
        let wanted = qualifier.clone().unwrap_or_else(|| library.clone());

        if self.blocks[block].library() == wanted {
            if let Some(found) = self.key(block, &reference.name) {
                return Ok(Some(found));
            }
        }

        let required: Vec<usize> = self
            .required(block)?
            .into_iter()
            .filter(|&r| qualifier.as_ref().map_or(true, |q| self.blocks[r].library() == *q))
            .filter(|&r| self.blocks[r].units.contains(&reference.name))
            .collect();
        if let Some(found) = self.pick(&required, consumer, reference)? {
            return Ok(Some(found));
        }

        let providers = self.library_providers(&wanted, &reference.name)?;
        match self.pick(&providers, consumer, reference)? {
            Some(found) => Ok(Some(found)),
            None => Err(GraphError::UnresolvedDependency {
                unit: consumer.to_string(),
                name: reference.to_string(),
            }),
        }
    }

    /// Choose the single provider among `blocks`, if any.
    fn pick(
        &self,
        blocks: &[usize],
        consumer: &UnitKey,
        reference: &UnitReference,
    ) -> Result<Option<(UnitKey, usize)>, GraphError> {
        match blocks {
            [] => Ok(None),
            [only] => Ok(self.key(*only, &reference.name)),
            many => Err(ResolveError::AmbiguousIdentifier {
                pattern: format!("{} (from {consumer})", reference),
                candidates: many
                    .iter()
                    .map(|&b| Candidate {
                        id: self.blocks[b].id.clone(),
                        tiers: self.builder.catalog.block_tiers(&self.blocks[b].id),
                    })
                    .collect(),
            }
            .into()),
        }
    }

    /// Indices of the blocks `block` requires, loading them on first use.
    fn required(&mut self, block: usize) -> Result<Vec<usize>, GraphError> {
        if let Some(required) = self.requires.get(&block) {
            return Ok(required.clone());
        }

        let references = self.blocks[block].requires.clone();
        let resolver = ShortcutResolver::new(self.builder.catalog);
        let mut required = Vec::with_capacity(references.len());
        for reference in references {
            let selection = resolver
                .select(&reference, self.builder.precedence)
                .map_err(|source| GraphError::Requirement {
                    block: self.blocks[block].id.to_string(),
                    requirement: reference.to_string(),
                    source,
                })?;
            required.push(self.load(&selection)?);
        }

        self.requires.insert(block, required.clone());
        Ok(required)
    }

    /// Loaded blocks of `library` that declare `name`, after loading every
    /// buildable catalog block of that library.
    fn library_providers(&mut self, library: &Name, name: &Name) -> Result<Vec<usize>, GraphError> {
        if self.searched.insert(library.clone()) {
            let catalog = self.builder.catalog;
            let ids: Vec<BlockIdentifier> = catalog
                .blocks_in_library(library)
                .filter(|id| catalog.block_tiers(id).intersects(TierSet::BUILDABLE))
                .cloned()
                .collect();
            for id in ids {
                if self.index.contains_key(&id) || id.matches(&self.blocks[0].id) {
                    continue;
                }
                // a block that cannot be loaded provides nothing; the
                // reference fails later only if no other block provides it
                let selection = match VersionSelector::new(catalog)
                    .with_precedence(self.builder.precedence)
                    .select(&id, None)
                {
                    Ok(selection) => selection,
                    Err(err) => {
                        warn!(block = %id, error = %err, "skipping library candidate");
                        continue;
                    }
                };
                if let Err(err) = self.load(&selection) {
                    warn!(block = %selection, error = %err, "skipping library candidate");
                }
            }
        }

        Ok((0..self.blocks.len())
            .filter(|&b| self.blocks[b].library() == *library && self.blocks[b].units.contains(name))
            .collect())
    }

    /// Load a selected block, reusing an already loaded copy.
    fn load(&mut self, selection: &Selection) -> Result<usize, GraphError> {
        // the block being built always wins over catalog copies of itself
        if selection.id.matches(&self.blocks[0].id) {
            return Ok(0);
        }
        if let Some(&existing) = self.index.get(&selection.id) {
            if let Some(version) = &self.blocks[existing].version {
                if *version != selection.version {
                    return Err(GraphError::ConflictingVersions {
                        block: selection.id.to_string(),
                        first: version.to_string(),
                        second: selection.version.to_string(),
                    });
                }
            }
            return Ok(existing);
        }

        let mut block = self
            .builder
            .loader
            .load(selection)
            .map_err(|source| GraphError::Load {
                block: selection.to_string(),
                source,
            })?;
        block.id = selection.id.clone();
        block.version = Some(selection.version.clone());
        debug!(block = %block, units = block.units.len(), "loaded dependency");

        let index = self.blocks.len();
        self.index.insert(selection.id.clone(), index);
        self.blocks.push(block);
        Ok(index)
    }
}

/// Kahn's algorithm with ready units taken in key order.
///
/// Returns the units left over when a cycle prevents completion.
fn topological_order(nodes: &BTreeMap<UnitKey, Node>) -> Result<Vec<UnitKey>, usize> {
    let mut waiting: HashMap<&UnitKey, usize> = HashMap::with_capacity(nodes.len());
    let mut consumers: HashMap<&UnitKey, Vec<&UnitKey>> = HashMap::new();
    let mut ready = BTreeSet::new();

    for (key, node) in nodes {
        waiting.insert(key, node.deps.len());
        if node.deps.is_empty() {
            ready.insert(key);
        }
        for dep in &node.deps {
            consumers.entry(dep).or_default().push(key);
        }
    }

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(key) = ready.pop_first() {
        order.push(key.clone());
        for consumer in consumers.get(key).into_iter().flatten() {
            if let Some(count) = waiting.get_mut(consumer) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*consumer);
                }
            }
        }
    }

    if order.len() == nodes.len() {
        Ok(order)
    } else {
        Err(nodes.len() - order.len())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Active,
    Done,
}

/// Find one cycle, searching from the roots first.
fn find_cycle(nodes: &BTreeMap<UnitKey, Node>, roots: &[UnitKey]) -> Vec<String> {
    fn visit<'a>(
        nodes: &'a BTreeMap<UnitKey, Node>,
        key: &'a UnitKey,
        marks: &mut HashMap<&'a UnitKey, Mark>,
        stack: &mut Vec<&'a UnitKey>,
    ) -> Option<Vec<String>> {
        match marks.get(key) {
            Some(Mark::Done) => return None,
            Some(Mark::Active) => {
                let start = stack.iter().position(|k| *k == key)?;
                let mut path: Vec<String> = stack[start..].iter().map(ToString::to_string).collect();
                path.push(key.to_string());
                return Some(path);
            }
            None => {}
        }

        marks.insert(key, Mark::Active);
        stack.push(key);
        if let Some(node) = nodes.get(key) {
            for dep in &node.deps {
                if let Some(path) = visit(nodes, dep, marks, stack) {
                    return Some(path);
                }
            }
        }
        stack.pop();
        marks.insert(key, Mark::Done);
        None
    }

    let mut marks = HashMap::new();
    let mut stack = Vec::new();
    roots
        .iter()
        .chain(nodes.keys())
        .find_map(|start| visit(nodes, start, &mut marks, &mut stack))
        .unwrap_or_default()
}
