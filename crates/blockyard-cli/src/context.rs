//! Workspace settings and catalog shared by all commands.

use anyhow::{Context as _, Result};
use blockyard_pkg::{Catalog, Settings};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Options that apply to every command.
#[derive(Debug, Default, Clone)]
pub struct GlobalOptions {
    /// Catalog snapshot overriding the workspace setting.
    pub catalog: Option<PathBuf>,
    /// Let downloaded copies shadow installed ones.
    pub multi_develop: bool,
}

/// Loaded settings and catalog snapshot.
#[derive(Debug)]
pub struct Context {
    pub settings: Settings,
    pub catalog: Catalog,
}

impl Context {
    /// Load the workspace around `start`, applying command-line overrides.
    pub fn load(start: &Path, options: &GlobalOptions) -> Result<Self> {
        let mut settings = Settings::find(start)
            .context("failed to load workspace settings")?
            .unwrap_or_default();

        if let Some(catalog) = &options.catalog {
            let catalog = if catalog.is_relative() {
                std::env::current_dir()?.join(catalog)
            } else {
                catalog.clone()
            };
            settings = settings.with_catalog(catalog);
        }
        if options.multi_develop {
            settings = settings.with_multi_develop(true);
        }

        let catalog = match settings.catalog_path() {
            Some(path) => Catalog::from_path(&path)
                .with_context(|| format!("failed to load catalog '{}'", path.display()))?,
            None => {
                warn!("no catalog configured, only the current block is visible");
                Catalog::new()
            }
        };
        debug!(entries = catalog.len(), root = %settings.root.display(), "loaded workspace");

        Ok(Self { settings, catalog })
    }
}
