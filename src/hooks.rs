//! Extract-Fn Hook Runner (C8): runs user-registered pattern callbacks
//! against every matching file in the dump directory, deleting whatever
//! each callback reports as consumed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::context::ExtractionContext;
use crate::error::{ExtractError, Result};
use crate::filter::scandir_file_names;

/// Runs every registered `(pattern, callbacks)` entry once against the
/// current contents of `dump_dir`. Deletions are batched until the whole
/// scan for a pattern completes, so a callback mutating the directory
/// doesn't perturb the in-progress scan.
pub fn run_extract_fns(ctx: &ExtractionContext, dump_dir: &Path) -> Result<()> {
    for entry in &ctx.extract_fns {
        let file_names = scandir_file_names(dump_dir)?;

        let matches: Vec<PathBuf> = file_names
            .iter()
            .filter(|name| entry.matches(name))
            .map(|name| dump_dir.join(name))
            .collect();

        if matches.is_empty() {
            continue;
        }

        log::info!(
            "pattern \"{}\" matched {} file(s)",
            entry.pattern.as_str(),
            matches.len()
        );

        let mut to_delete: HashSet<PathBuf> = HashSet::new();

        for file_path in &matches {
            log::debug!("processing {}", file_path.display());

            for callback in &entry.callbacks {
                let consumed = callback(dump_dir, file_path).map_err(|source| ExtractError::HookFailed {
                    pattern: entry.pattern.as_str().to_string(),
                    file: file_path.clone(),
                    source,
                })?;

                if let Some(consumed) = consumed {
                    to_delete.insert(consumed);
                }
            }
        }

        for path in to_delete {
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }
    }

    Ok(())
}
