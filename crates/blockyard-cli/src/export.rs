//! Implementation of the block commands: `units`, `graph` and `export`.

use crate::context::Context;
use anyhow::{Context as _, Result};
use blockyard_pkg::{
    Block, BuildRequest, FsLoader, LoadedBlock, Plan, Planner, Tier, TierPrecedence, UnitSet,
};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Options shared by the commands that plan a build.
#[derive(Debug, Default, Clone)]
pub struct BuildOptions {
    /// Directory inside the block to build.
    pub path: PathBuf,
    /// Top-level unit.
    pub top: Option<String>,
    /// Testbench unit; implies `include_bench`.
    pub bench: Option<String>,
    /// Root the build at the top unit's testbench.
    pub include_bench: bool,
    /// Explicit tier precedence, most preferred first.
    pub precedence: Vec<Tier>,
}

impl BuildOptions {
    fn request(&self, block: &Block) -> BuildRequest {
        let mut request = BuildRequest::new().include_bench(self.include_bench);
        if let Some(top) = &self.top {
            request = request.with_top(top.clone());
        }
        if let Some(bench) = &self.bench {
            request = request.with_bench(bench.clone());
        }
        if !self.precedence.is_empty() {
            request = request.with_precedence(TierPrecedence::from_order(&self.precedence));
        }
        request.with_manifest_defaults(&block.manifest)
    }
}

fn find_block(path: &Path) -> Result<Block> {
    Block::find(path).with_context(|| format!("no block found at '{}'", path.display()))
}

/// Scan the block containing `path`.
pub fn scan_units(path: &Path) -> Result<LoadedBlock> {
    let block = find_block(path)?;
    Ok(block.to_loaded()?)
}

/// Print one line per unit: name, kind, language, file and flags.
pub fn print_units(units: &UnitSet, root: &Path) {
    for unit in units {
        let file = unit.file.strip_prefix(root).unwrap_or(&unit.file);
        let flag = if unit.testbench { " (testbench)" } else { "" };
        println!(
            "{:<24} {:<8} {:<5} {}{flag}",
            unit.name.as_str(),
            unit.kind.to_string(),
            unit.language.label(),
            file.display()
        );
    }
}

/// Plan a build of the block containing `options.path`.
pub fn plan(ctx: &Context, options: &BuildOptions) -> Result<(Block, Plan)> {
    let block = find_block(&options.path)?;
    let request = options.request(&block);
    let root = block.to_loaded()?;

    let plan = Planner::new(&ctx.catalog, &FsLoader, &ctx.settings).plan(root, &request)?;
    for warning in &plan.warnings {
        warn!("{warning}");
    }
    Ok((block, plan))
}

/// Render the dependency tree of the planned build.
pub fn render_graph(ctx: &Context, options: &BuildOptions) -> Result<String> {
    let (_, plan) = plan(ctx, options)?;
    let start = plan.bench.as_ref().unwrap_or(&plan.top);
    Ok(format!("--- DEPENDENCY TREE ---\n{}", plan.graph.render_tree(start)))
}

/// Plan the build and write `build/blueprint`.
pub fn export_blueprint(ctx: &Context, options: &BuildOptions) -> Result<(Plan, PathBuf)> {
    let block = find_block(&options.path)?;
    let request = options.request(&block);
    let root = block.to_loaded()?;

    let (plan, path) = Planner::new(&ctx.catalog, &FsLoader, &ctx.settings)
        .export(root, &request)
        .with_context(|| format!("failed to export block '{}'", block.identifier()))?;
    Ok((plan, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockyard_pkg::{Catalog, Settings};
    use std::fs;
    use tempfile::TempDir;

    fn create_block(dir: &Path) {
        fs::write(
            dir.join("Block.toml"),
            "[block]\nname = \"top\"\nlibrary = \"math\"\nvendor = \"acme\"\n",
        )
        .unwrap();
        fs::write(dir.join("adder.vhd"), "entity adder is port (a : in bit); end entity;").unwrap();
        fs::write(
            dir.join("top_level.vhd"),
            "entity top_level is port (a : in bit); end entity;\narchitecture rtl of top_level is begin\n u0 : adder port map (a);\nend architecture;",
        )
        .unwrap();
    }

    fn context() -> Context {
        Context {
            settings: Settings::default(),
            catalog: Catalog::new(),
        }
    }

    #[test]
    fn test_scan_units() {
        let tmp = TempDir::new().unwrap();
        create_block(tmp.path());
        let block = scan_units(&tmp.path().join("build")).unwrap();
        assert_eq!(block.root, tmp.path());
        assert_eq!(block.units.len(), 2);
    }

    #[test]
    fn test_render_graph() {
        let tmp = TempDir::new().unwrap();
        create_block(tmp.path());
        let options = BuildOptions {
            path: tmp.path().to_path_buf(),
            ..BuildOptions::default()
        };
        let tree = render_graph(&context(), &options).unwrap();
        assert_eq!(
            tree,
            "--- DEPENDENCY TREE ---\n\\- math.top_level\n   \\- math.adder\n"
        );
    }

    #[test]
    fn test_export_writes_blueprint() {
        let tmp = TempDir::new().unwrap();
        create_block(tmp.path());
        let options = BuildOptions {
            path: tmp.path().to_path_buf(),
            ..BuildOptions::default()
        };
        let (plan, path) = export_blueprint(&context(), &options).unwrap();
        assert_eq!(path, tmp.path().join("build/blueprint"));
        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "@VHDL-SRC adder.vhd\n@VHDL-SRC-TOP top_level.vhd\n"
        );
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_missing_block() {
        let tmp = TempDir::new().unwrap();
        let options = BuildOptions {
            path: tmp.path().to_path_buf(),
            ..BuildOptions::default()
        };
        assert!(export_blueprint(&context(), &options).is_err());
    }
}
