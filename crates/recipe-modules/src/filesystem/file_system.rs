use anyhow::{Context, Result};
use recipe_sdk::IOUtil;
use std::path::{Path, PathBuf};

/// The filesystem primitives the filesystem module delegates to.
pub trait FileSystem: Send + Sync {
    fn copy(&self, from: &Path, to: &Path) -> Result<()>;

    fn mkdir(&self, dir: &Path, mode: u32) -> Result<()>;

    fn mirror(&self, from: &Path, to: &Path) -> Result<()>;

    fn dump_file(&self, filename: &Path, content: &[u8]) -> Result<()>;

    fn read_to_string(&self, filename: &Path) -> Result<String>;

    /// Remove every path in order, stopping at the first failure.
    fn remove(&self, paths: &[PathBuf]) -> Result<()>;
}

/// [`FileSystem`] backed by the local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        IOUtil::copy_file(from, to)
    }

    fn mkdir(&self, dir: &Path, mode: u32) -> Result<()> {
        IOUtil::create_directory(dir, mode)
    }

    fn mirror(&self, from: &Path, to: &Path) -> Result<()> {
        IOUtil::mirror_directory(from, to)
    }

    fn dump_file(&self, filename: &Path, content: &[u8]) -> Result<()> {
        IOUtil::write_atomic(filename, content)
    }

    fn read_to_string(&self, filename: &Path) -> Result<String> {
        std::fs::read_to_string(filename)
            .with_context(|| format!("Failed to read '{}'", filename.display()))
    }

    fn remove(&self, paths: &[PathBuf]) -> Result<()> {
        paths.iter().try_for_each(|path| IOUtil::remove_path(path))
    }
}
