//! Recursive tree copy used to stage mounted image contents.

use crate::HalResult;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use walkdir::WalkDir;

/// Options controlling how trees are copied.
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Replace files that already exist at the destination.
    pub overwrite: bool,
    /// Copy hidden and system files as well.
    pub include_hidden: bool,
}

impl CopyOptions {
    /// Full copy of an installation medium: overwrite everything, keep hidden files.
    pub fn staging() -> Self {
        Self {
            overwrite: true,
            include_hidden: true,
        }
    }
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self::staging()
    }
}

/// What a copy reported back.
///
/// `files_copied` is `None` when the copy tool only produced a textual summary;
/// callers parse `output` in that case.
#[derive(Debug, Clone, Default)]
pub struct CopyReport {
    pub exit_code: Option<i32>,
    pub files_copied: Option<u64>,
    pub output: String,
}

impl CopyReport {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Copy operations abstraction.
pub trait CopyOps {
    /// Recursively copy the contents of `src` into `dst`.
    fn copy_tree(
        &self,
        src: &Path,
        dst: &Path,
        opts: &CopyOptions,
        timeout: Duration,
    ) -> HalResult<CopyReport>;
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Copy `src` into `dst` with the standard library, returning the number of files written.
pub fn copy_tree_native(src: &Path, dst: &Path, opts: &CopyOptions) -> io::Result<u64> {
    let mut copied = 0u64;
    let walker = WalkDir::new(src)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| opts.include_hidden || !is_hidden(e.path()));
    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if target.exists() && !opts.overwrite {
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(entry.path(), &target)?;
        copied += 1;
    }
    Ok(copied)
}
