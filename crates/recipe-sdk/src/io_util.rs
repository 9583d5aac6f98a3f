use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::{fs, thread, time::Duration};
use walkdir::WalkDir;

/// Permission bits used for directories when the caller does not pass a mode.
pub const DEFAULT_DIRECTORY_MODE: u32 = 0o777;

/// Filesystem helpers backing the filesystem module's primitives.
pub struct IOUtil;

impl IOUtil {
    /// Copy a single file, creating the target's parent directories and
    /// overwriting any existing target.
    pub fn copy_file(from: &Path, to: &Path) -> Result<()> {
        if !from.is_file() {
            anyhow::bail!("Source file '{}' does not exist", from.display());
        }
        Self::ensure_parent(to)?;
        fs::copy(from, to).with_context(|| {
            format!("Failed to copy '{}' to '{}'", from.display(), to.display())
        })?;
        Ok(())
    }

    /// Create a directory and all of its missing parents with `mode`.
    ///
    /// Succeeds when the directory already exists. On non-Unix platforms the
    /// mode is ignored.
    pub fn create_directory(path: &Path, mode: u32) -> Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        builder
            .create(path)
            .with_context(|| format!("Failed to create directory '{}'", path.display()))
    }

    /// Recursively copy the contents of `from` into `to`.
    ///
    /// Directories are created as needed, files are overwritten, and on Unix
    /// symlinks are recreated as links rather than followed.
    pub fn mirror_directory(from: &Path, to: &Path) -> Result<()> {
        if !from.is_dir() {
            anyhow::bail!("Source directory '{}' does not exist", from.display());
        }
        fs::create_dir_all(to)
            .with_context(|| format!("Failed to create directory '{}'", to.display()))?;

        for entry in WalkDir::new(from).min_depth(1) {
            let entry = entry
                .with_context(|| format!("Failed to walk directory '{}'", from.display()))?;
            let relative = entry
                .path()
                .strip_prefix(from)
                .context("Walked entry outside of the source directory")?;
            let target = to.join(relative);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                fs::create_dir_all(&target).with_context(|| {
                    format!("Failed to create directory '{}'", target.display())
                })?;
            } else if file_type.is_symlink() {
                Self::copy_symlink(entry.path(), &target)?;
            } else {
                fs::copy(entry.path(), &target).with_context(|| {
                    format!(
                        "Failed to copy '{}' to '{}'",
                        entry.path().display(),
                        target.display()
                    )
                })?;
            }
        }
        Ok(())
    }

    /// Write `content` to `path` atomically: the bytes go to a temporary file
    /// in the same directory which is then renamed over the target.
    pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
        let parent = Self::ensure_parent(path)?;
        let mut temp = tempfile::NamedTempFile::new_in(parent).with_context(|| {
            format!("Failed to create a temporary file in '{}'", parent.display())
        })?;
        temp.write_all(content)
            .and_then(|_| temp.flush())
            .with_context(|| format!("Failed to write '{}'", path.display()))?;
        temp.persist(path)
            .with_context(|| format!("Failed to move data into '{}'", path.display()))?;
        Ok(())
    }

    /// Remove a file, a symlink (not its target) or a directory tree.
    /// Paths that do not exist are ignored.
    pub fn remove_path(path: &Path) -> Result<()> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to inspect '{}'", path.display()))
            }
        };

        if meta.is_dir() {
            Self::delete_directory(path)
        } else {
            Self::delete_file(path)
        }
    }

    /// Recursively delete a directory with retry logic.
    ///
    /// If the initial removal fails (e.g. due to transient locks), the function
    /// retries up to 3 times with a small delay between attempts.
    pub fn delete_directory(path: &Path) -> Result<()> {
        if fs::symlink_metadata(path).is_err() {
            return Ok(());
        }

        // If it's a symlink, just remove the link itself
        if path.symlink_metadata()?.file_type().is_symlink() {
            #[cfg(unix)]
            {
                fs::remove_file(path)
                    .with_context(|| format!("Failed to remove symlink '{}'", path.display()))?;
            }
            #[cfg(windows)]
            {
                // On Windows, symlinks to directories are removed with remove_dir
                if path.is_dir() {
                    fs::remove_dir(path).with_context(|| {
                        format!("Failed to remove directory symlink '{}'", path.display())
                    })?;
                } else {
                    fs::remove_file(path).with_context(|| {
                        format!("Failed to remove file symlink '{}'", path.display())
                    })?;
                }
            }
            return Ok(());
        }

        let max_retries = 3;
        let mut last_err = None;

        for attempt in 0..max_retries {
            if let Err(e) = Self::remove_readonly_recursive(path) {
                tracing::debug!(
                    "Failed to remove readonly attributes (attempt {}): {}",
                    attempt + 1,
                    e
                );
            }

            match fs::remove_dir_all(path) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_err = Some(e);
                    if attempt < max_retries - 1 {
                        thread::sleep(Duration::from_millis(100 * (attempt as u64 + 1)));
                    }
                }
            }
        }

        let err = last_err
            .unwrap_or_else(|| std::io::Error::other("directory removal did not run"));
        Err(err).with_context(|| {
            format!(
                "Failed to delete directory '{}' after {} retries",
                path.display(),
                max_retries
            )
        })
    }

    /// Delete a single file or symlink, removing the read-only attribute if necessary.
    pub fn delete_file(path: &Path) -> Result<()> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(_) => return Ok(()),
        };

        if meta.is_file() {
            let mut perms = meta.permissions();
            if perms.readonly() {
                #[allow(clippy::permissions_set_readonly_false)]
                perms.set_readonly(false);
                let _ = fs::set_permissions(path, perms);
            }
        }

        fs::remove_file(path)
            .with_context(|| format!("Failed to delete file '{}'", path.display()))?;
        Ok(())
    }

    /// Create the parent directory of `path` if needed and return it.
    fn ensure_parent(path: &Path) -> Result<&Path> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory '{}'", parent.display()))?;
        Ok(parent)
    }

    #[cfg(unix)]
    fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
        let destination = fs::read_link(link)
            .with_context(|| format!("Failed to read symlink '{}'", link.display()))?;
        if fs::symlink_metadata(target).is_ok() {
            Self::remove_path(target)?;
        }
        std::os::unix::fs::symlink(&destination, target)
            .with_context(|| format!("Failed to create symlink '{}'", target.display()))
    }

    #[cfg(not(unix))]
    fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
        if link.is_dir() {
            Self::mirror_directory(link, target)
        } else {
            fs::copy(link, target)
                .map(|_| ())
                .with_context(|| format!("Failed to copy '{}'", link.display()))
        }
    }

    /// Recursively attempt to remove the read-only attribute from all items
    /// in a directory tree.
    fn remove_readonly_recursive(path: &Path) -> Result<()> {
        for entry in WalkDir::new(path) {
            let entry = entry?;
            if entry.path_is_symlink() {
                continue;
            }
            Self::remove_readonly(entry.path())?;
        }
        Ok(())
    }

    /// Remove the read-only attribute from a single file-system entry.
    fn remove_readonly(path: &Path) -> Result<()> {
        let meta = match fs::metadata(path) {
            Ok(m) => m,
            Err(_) => return Ok(()),
        };
        let mut perms = meta.permissions();
        if perms.readonly() {
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
            fs::set_permissions(path, perms)?;
        }
        Ok(())
    }
}
