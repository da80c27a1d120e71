//! Dump Directory Manager (C4): acquires a scoped working directory per the
//! source-kind/keep-dump matrix, and releases it on scope exit.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{ExtractError, Result};

/// Why this directory exists and what happens to it when the guard drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// `source` was already a directory; used in place, never deleted.
    SourceIsDir,
    /// A unique temp directory created because `keep_dump` was false.
    Ephemeral,
    /// A new sibling directory created because `keep_dump` was true and no
    /// prior dump existed.
    PersistentNew,
    /// An existing sibling directory reused in resume mode.
    PersistentExisting,
}

/// A scoped handle to the working directory. Ephemeral directories are
/// deleted when this guard drops; every other lifecycle is left in place
/// for possible resume.
pub struct DumpDir {
    path: PathBuf,
    lifecycle: Lifecycle,
    _temp: Option<TempDir>,
}

impl DumpDir {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Implements the acquisition matrix from §4.4.
    pub fn acquire(source: &Path, keep_dump: bool) -> Result<DumpDir> {
        if !source.exists() {
            return Err(ExtractError::NotFound(source.to_path_buf()));
        }

        if source.is_dir() {
            log::info!("extracting to source dump dir {}", source.display());
            return Ok(DumpDir {
                path: source.to_path_buf(),
                lifecycle: Lifecycle::SourceIsDir,
                _temp: None,
            });
        }

        if !source.is_file() {
            return Err(ExtractError::UnexpectedFileType(source.to_path_buf()));
        }

        if !keep_dump {
            let temp = TempDir::new()?;
            log::info!("extracting to temporary dump dir {}", temp.path().display());
            return Ok(DumpDir {
                path: temp.path().to_path_buf(),
                lifecycle: Lifecycle::Ephemeral,
                _temp: Some(temp),
            });
        }

        let dump_dir = source.with_extension("");

        if dump_dir.is_dir() {
            log::info!("using existing dump dir {}", dump_dir.display());
            return Ok(DumpDir {
                path: dump_dir,
                lifecycle: Lifecycle::PersistentExisting,
                _temp: None,
            });
        }

        if dump_dir.exists() {
            return Err(ExtractError::UnexpectedFileType(dump_dir));
        }

        log::info!("extracting to new dump dir {}", dump_dir.display());
        std::fs::create_dir(&dump_dir)?;

        Ok(DumpDir { path: dump_dir, lifecycle: Lifecycle::PersistentNew, _temp: None })
    }
}
