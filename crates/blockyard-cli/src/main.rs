//! Blockyard CLI - command-line interface for the HDL block manager

use anyhow::Result;
use blockyard_pkg::Tier;
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod context;
mod export;
mod query;

use context::{Context, GlobalOptions};
use export::BuildOptions;

#[derive(Parser)]
#[command(name = "blockyard")]
#[command(version)]
#[command(about = "Package manager for HDL blocks", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Catalog snapshot to use instead of the workspace setting
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Let downloaded blocks shadow installed ones for dependencies
    #[arg(long, global = true)]
    multi_develop: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Arguments shared by the commands that build a block.
#[derive(clap::Args, Debug)]
struct BlockArgs {
    /// Directory inside the block
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Top-level unit (detected when omitted)
    #[arg(long)]
    top: Option<String>,

    /// Testbench unit
    #[arg(long)]
    bench: Option<String>,

    /// Include the top unit's testbench
    #[arg(long)]
    include_bench: bool,

    /// Tier precedence, most preferred first (e.g. "installed,downloaded")
    #[arg(long, value_delimiter = ',')]
    precedence: Vec<Tier>,
}

impl BlockArgs {
    /// Build options with the block path resolved against `cwd`.
    fn into_options(self, cwd: &Path) -> BuildOptions {
        BuildOptions {
            path: cwd.join(self.path),
            top: self.top,
            bench: self.bench,
            include_bench: self.include_bench,
            precedence: self.precedence,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a block reference to a catalog block and version
    Resolve {
        /// Block reference, e.g. "adder", "math.adder@1" or "acme.math.adder(v1.2.0)"
        reference: String,

        /// Also accept blocks that are only available remotely
        #[arg(long)]
        any_tier: bool,
    },

    /// List catalog blocks matching a partial identifier
    Search {
        /// Partial identifier (lists every block when omitted)
        pattern: Option<String>,
    },

    /// List the design units of a block
    Units {
        /// Directory inside the block
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Print the dependency tree of a block's top unit
    Graph {
        #[command(flatten)]
        block: BlockArgs,
    },

    /// Write the blueprint of a block to build/blueprint
    Export {
        #[command(flatten)]
        block: BlockArgs,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let options = GlobalOptions {
        catalog: cli.catalog,
        multi_develop: cli.multi_develop,
    };
    let cwd = std::env::current_dir()?;

    match cli.command {
        Commands::Resolve {
            reference,
            any_tier,
        } => {
            let ctx = Context::load(&cwd, &options)?;
            let options = query::ResolveOptions {
                reference,
                any_tier,
            };
            let selection = query::resolve_reference(&ctx, &options)?;
            query::print_selection(&selection);
        }

        Commands::Search { pattern } => {
            let ctx = Context::load(&cwd, &options)?;
            let candidates = query::search(&ctx, pattern.as_deref())?;
            if candidates.is_empty() {
                println!("No blocks found.");
            }
            for candidate in candidates {
                println!("{candidate}");
            }
        }

        Commands::Units { path } => {
            let block = export::scan_units(&cwd.join(path))?;
            export::print_units(&block.units, &block.root);
        }

        Commands::Graph { block } => {
            let build = block.into_options(&cwd);
            let ctx = Context::load(&build.path, &options)?;
            let tree = export::render_graph(&ctx, &build)?;
            print!("{tree}");
        }

        Commands::Export { block } => {
            let build = block.into_options(&cwd);
            let ctx = Context::load(&build.path, &options)?;
            let (plan, path) = export::export_blueprint(&ctx, &build)?;
            println!(
                "Wrote {} ({} files, top {})",
                path.display(),
                plan.blueprint.len(),
                plan.top
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_resolve_command() {
        let cli = Cli::try_parse_from(["blockyard", "resolve", "math.adder@1", "--any-tier"]).unwrap();
        match cli.command {
            Commands::Resolve {
                reference,
                any_tier,
            } => {
                assert_eq!(reference, "math.adder@1");
                assert!(any_tier);
            }
            _ => panic!("Expected Resolve command"),
        }
    }

    #[test]
    fn test_search_without_pattern() {
        let cli = Cli::try_parse_from(["blockyard", "search"]).unwrap();
        match cli.command {
            Commands::Search { pattern } => assert!(pattern.is_none()),
            _ => panic!("Expected Search command"),
        }
    }

    #[test]
    fn test_units_default_path() {
        let cli = Cli::try_parse_from(["blockyard", "units"]).unwrap();
        match cli.command {
            Commands::Units { path } => assert_eq!(path, PathBuf::from(".")),
            _ => panic!("Expected Units command"),
        }
    }

    #[test]
    fn test_export_flags() {
        let cli = Cli::try_parse_from([
            "blockyard",
            "export",
            "blocks/top",
            "--top",
            "top_level",
            "--include-bench",
            "--precedence",
            "installed,downloaded",
        ])
        .unwrap();
        match cli.command {
            Commands::Export { block } => {
                assert_eq!(block.path, PathBuf::from("blocks/top"));
                assert_eq!(block.top.as_deref(), Some("top_level"));
                assert!(block.include_bench);
                assert_eq!(block.precedence, vec![Tier::Installed, Tier::Downloaded]);
            }
            _ => panic!("Expected Export command"),
        }
    }

    #[test]
    fn test_block_path_resolved_against_cwd() {
        let cli = Cli::try_parse_from(["blockyard", "export"]).unwrap();
        let cwd = Path::new("/work/blocks/top");
        match cli.command {
            Commands::Export { block } => {
                let build = block.into_options(cwd);
                assert!(build.path.is_absolute());
                assert!(build.path.starts_with(cwd));
            }
            _ => panic!("Expected Export command"),
        }

        let cli = Cli::try_parse_from(["blockyard", "graph", "/abs/block"]).unwrap();
        match cli.command {
            Commands::Graph { block } => {
                assert_eq!(block.into_options(cwd).path, PathBuf::from("/abs/block"));
            }
            _ => panic!("Expected Graph command"),
        }
    }

    #[test]
    fn test_invalid_tier_rejected() {
        let result = Cli::try_parse_from(["blockyard", "graph", "--precedence", "cloud"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from([
            "blockyard",
            "graph",
            "-vv",
            "--multi-develop",
            "--catalog",
            "catalog.toml",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.multi_develop);
        assert_eq!(cli.catalog, Some(PathBuf::from("catalog.toml")));
    }
}
