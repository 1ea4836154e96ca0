//! Block structure discovery and loading.
//!
//! A block is a directory holding a manifest and HDL sources in any layout:
//! ```text
//! adder/
//! ├── Block.toml            # Block manifest
//! ├── rtl/
//! │   └── adder.vhd
//! ├── sim/
//! │   └── adder_tb.vhd
//! └── build/                # Generated, never scanned
//!     └── blueprint
//! ```

use crate::graph::{BlockLoader, LoadedBlock};
use crate::ident::BlockIdentifier;
use crate::manifest::{Manifest, ManifestError};
use crate::unit::{ExtractError, Extractor, Language};
use crate::version::Selection;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// The manifest filename.
pub const MANIFEST_FILE: &str = "Block.toml";

/// Directory for generated build files, skipped when scanning sources.
pub const BUILD_DIR: &str = "build";

/// Errors that can occur when working with block structure.
#[derive(Error, Debug)]
pub enum BlockError {
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("block directory not found: {0}")]
    NotFound(PathBuf),

    #[error("manifest not found at: {0}")]
    ManifestNotFound(PathBuf),

    #[error("block {0} has no source location in the catalog")]
    NoLocation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// Discovered layout of a block.
#[derive(Debug, Clone)]
pub struct BlockLayout {
    /// Root directory of the block.
    pub root: PathBuf,

    /// Path to the manifest file.
    pub manifest_path: PathBuf,
}

impl BlockLayout {
    /// Discover the block layout of a directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory doesn't exist or doesn't contain a manifest.
    pub fn discover(root: impl AsRef<Path>) -> Result<Self, BlockError> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            return Err(BlockError::NotFound(root));
        }

        let manifest_path = root.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(BlockError::ManifestNotFound(manifest_path));
        }

        Ok(Self {
            manifest_path,
            root,
        })
    }

    /// Find a block by searching upward from a directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no manifest is found in the directory tree.
    pub fn find_root(start: impl AsRef<Path>) -> Result<Self, BlockError> {
        let mut current = absolute(start.as_ref())?;

        loop {
            let manifest = current.join(MANIFEST_FILE);
            if manifest.exists() {
                return Self::discover(&current);
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Err(BlockError::ManifestNotFound(start.as_ref().to_path_buf())),
            }
        }
    }

    /// All recognized HDL files below the root, sorted by path.
    ///
    /// The top-level `build/` directory and hidden directories are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be read.
    pub fn source_files(&self) -> Result<Vec<PathBuf>, BlockError> {
        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                let hidden = entry.file_name().to_string_lossy().starts_with('.');

                if entry.file_type()?.is_dir() {
                    let generated = dir == self.root && entry.file_name() == BUILD_DIR;
                    if !hidden && !generated {
                        pending.push(path);
                    }
                } else if Language::from_path(&path).is_some() {
                    files.push(path);
                }
            }
        }

        files.sort();
        Ok(files)
    }
}

/// `path` resolved against the current directory, without `.` components.
///
/// Upward searches need this: the parent of `.` is the empty path, which
/// has no parent of its own.
pub(crate) fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(joined
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect())
}

/// A block with its parsed manifest.
#[derive(Debug, Clone)]
pub struct Block {
    /// The parsed manifest.
    pub manifest: Manifest,

    /// The discovered layout.
    pub layout: BlockLayout,
}

impl Block {
    /// Load a block from its root directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the block cannot be discovered or its manifest is invalid.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, BlockError> {
        let layout = BlockLayout::discover(root)?;
        let manifest = Manifest::from_path(&layout.manifest_path)?;
        Ok(Self { manifest, layout })
    }

    /// Find and load a block by searching upward from a directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no block is found.
    pub fn find(start: impl AsRef<Path>) -> Result<Self, BlockError> {
        let layout = BlockLayout::find_root(start)?;
        let manifest = Manifest::from_path(&layout.manifest_path)?;
        Ok(Self { manifest, layout })
    }

    #[must_use]
    pub fn identifier(&self) -> BlockIdentifier {
        self.manifest.identifier()
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.layout.root
    }

    /// Scan the block's sources, attributing units to `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sources cannot be listed or scanned, or the
    /// manifest's requirements are malformed.
    pub fn load_units(&self, id: BlockIdentifier) -> Result<LoadedBlock, BlockError> {
        let files = self.layout.source_files()?;
        let units = Extractor::new(id.clone()).extract(&files)?;
        debug!(block = %id, files = files.len(), units = units.len(), "scanned block");

        let mut loaded = LoadedBlock::new(id, self.layout.root.clone(), units)
            .with_requires(self.manifest.requires()?);
        if let Some(version) = self.manifest.version()? {
            loaded = loaded.with_version(version);
        }
        Ok(loaded)
    }

    /// Scan the block under its own identifier.
    ///
    /// # Errors
    ///
    /// See [`Block::load_units`].
    pub fn to_loaded(&self) -> Result<LoadedBlock, BlockError> {
        self.load_units(self.identifier())
    }
}

/// Loads catalog blocks from the source location of the selected copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLoader;

impl BlockLoader for FsLoader {
    fn load(&self, selection: &Selection) -> Result<LoadedBlock, BlockError> {
        let location = selection
            .location
            .as_ref()
            .ok_or_else(|| BlockError::NoLocation(selection.to_string()))?;
        Block::load(location)?.load_units(selection.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Tier;
    use crate::version::Version;
    use std::fs;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
[block]
name = "adder"
library = "math"
vendor = "acme"
version = "1.2.0"
"#;

    fn create_test_block(dir: &Path, manifest: &str) {
        fs::create_dir_all(dir.join("rtl")).unwrap();
        fs::write(dir.join(MANIFEST_FILE), manifest).unwrap();
    }

    #[test]
    fn test_discover_missing_manifest() {
        let tmp = TempDir::new().unwrap();
        let err = BlockLayout::discover(tmp.path()).unwrap_err();
        assert!(matches!(err, BlockError::ManifestNotFound(_)));

        let err = BlockLayout::discover(tmp.path().join("nope")).unwrap_err();
        assert!(matches!(err, BlockError::NotFound(_)));
    }

    #[test]
    fn test_find_root_from_subdirectory() {
        let tmp = TempDir::new().unwrap();
        create_test_block(tmp.path(), MANIFEST);

        let layout = BlockLayout::find_root(tmp.path().join("rtl")).unwrap();
        assert_eq!(layout.root, tmp.path());
    }

    #[test]
    fn test_absolute_resolves_against_current_dir() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(absolute(Path::new(".")).unwrap(), cwd);
        assert_eq!(absolute(Path::new("./rtl")).unwrap(), cwd.join("rtl"));

        let tmp = TempDir::new().unwrap();
        assert_eq!(absolute(tmp.path()).unwrap(), tmp.path());
        assert!(absolute(Path::new(".")).unwrap().parent().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_find_root_from_relative_path() {
        let tmp = TempDir::new().unwrap();
        create_test_block(tmp.path(), MANIFEST);

        let cwd = std::env::current_dir().unwrap();
        let up = "../".repeat(cwd.components().count() - 1);
        let relative = PathBuf::from(up)
            .join(tmp.path().strip_prefix("/").unwrap())
            .join("rtl");

        let layout = BlockLayout::find_root(&relative).unwrap();
        assert!(layout.root.is_absolute());
        assert!(layout.manifest_path.exists());
    }

    #[test]
    fn test_source_files_skip_build_dir() {
        let tmp = TempDir::new().unwrap();
        create_test_block(tmp.path(), MANIFEST);
        fs::create_dir_all(tmp.path().join("build")).unwrap();
        fs::create_dir_all(tmp.path().join("sim")).unwrap();
        fs::write(tmp.path().join("rtl/adder.vhd"), "entity adder is end;").unwrap();
        fs::write(tmp.path().join("sim/adder_tb.SV"), "module adder_tb; endmodule").unwrap();
        fs::write(tmp.path().join("build/copy.vhd"), "entity copy is end;").unwrap();
        fs::write(tmp.path().join("README.md"), "# adder").unwrap();

        let layout = BlockLayout::discover(tmp.path()).unwrap();
        let files = layout.source_files().unwrap();
        assert_eq!(
            files,
            vec![tmp.path().join("rtl/adder.vhd"), tmp.path().join("sim/adder_tb.SV")]
        );
    }

    #[test]
    fn test_load_units() {
        let tmp = TempDir::new().unwrap();
        create_test_block(tmp.path(), MANIFEST);
        fs::write(
            tmp.path().join("rtl/adder.vhd"),
            "entity adder is port (a : in bit); end entity;",
        )
        .unwrap();

        let block = Block::load(tmp.path()).unwrap();
        let loaded = block.to_loaded().unwrap();
        assert_eq!(loaded.id, BlockIdentifier::qualified("acme", "math", "adder"));
        assert_eq!(loaded.version, Some(Version::new(1, 2, 0)));
        assert_eq!(loaded.units.len(), 1);
    }

    #[test]
    fn test_fs_loader_uses_selection() {
        let tmp = TempDir::new().unwrap();
        create_test_block(tmp.path(), MANIFEST);
        fs::write(tmp.path().join("rtl/adder.v"), "module adder(input a); endmodule").unwrap();

        let selection = Selection {
            id: BlockIdentifier::qualified("acme", "math", "adder"),
            version: Version::new(1, 2, 0),
            tier: Tier::Installed,
            location: Some(tmp.path().to_path_buf()),
        };
        let loaded = FsLoader.load(&selection).unwrap();
        assert_eq!(loaded.root, tmp.path());
        assert!(loaded.units.contains(&"adder".into()));

        let missing = Selection {
            location: None,
            ..selection
        };
        assert!(matches!(FsLoader.load(&missing), Err(BlockError::NoLocation(_))));
    }
}
