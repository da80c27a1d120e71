//! Data model: `ExtractionContext` and the hook callback types it carries.

use std::collections::HashMap;
use std::path::Path;

use regex::Regex;

use crate::error::{ExtractError, Result};
use crate::partition::dedup_partitions;

/// Default partitions materialised when the caller doesn't specify any.
pub const DEFAULT_PARTITIONS: &[&str] =
    &["odm", "product", "system", "system_ext", "vendor"];

/// A user-supplied hook: given the dump directory and the matched file
/// path, either consume the file (returning the path that should now be
/// deleted) or leave it alone (returning `None`).
pub type HookFn = Box<dyn Fn(&Path, &Path) -> std::result::Result<Option<std::path::PathBuf>, Box<dyn std::error::Error + Send + Sync>> + Send + Sync>;

/// A compiled pattern plus the ordered callbacks registered against it.
pub struct HookEntry {
    pub pattern: Regex,
    pub callbacks: Vec<HookFn>,
}

impl HookEntry {
    /// Matches `name` the way the original's `re.match(pattern, file_name)`
    /// does: the pattern must match starting at position 0, not merely
    /// appear as a substring. `Regex::is_match` alone would accept
    /// `modem\.bin` against `super_modem.bin`, which the original rejects.
    pub fn matches(&self, name: &str) -> bool {
        self.pattern.find(name).map_or(false, |m| m.start() == 0)
    }
}

/// State for one extraction run. Mutated in place by the pipeline as it
/// augments the wanted-partition set and discovers alternates; owned
/// exclusively by the pipeline for the run's duration.
pub struct ExtractionContext {
    pub requested_partitions: Vec<String>,
    pub firmware_partitions: Vec<String>,
    pub extra_partitions: Vec<String>,
    pub firmware_files: Vec<String>,
    pub factory_files: Vec<String>,
    pub extra_files: Vec<String>,
    pub extract_fns: Vec<HookEntry>,
    pub extract_all: bool,
    pub keep_dump: bool,
}

impl ExtractionContext {
    pub fn new(requested_partitions: Vec<String>) -> Self {
        let requested_partitions = if requested_partitions.is_empty() {
            DEFAULT_PARTITIONS.iter().map(|s| s.to_string()).collect()
        } else {
            dedup_partitions(requested_partitions)
        };

        Self {
            requested_partitions,
            firmware_partitions: Vec::new(),
            extra_partitions: Vec::new(),
            firmware_files: Vec::new(),
            factory_files: Vec::new(),
            extra_files: Vec::new(),
            extract_fns: Vec::new(),
            extract_all: false,
            keep_dump: false,
        }
    }

    pub fn with_firmware_partitions(mut self, names: Vec<String>) -> Self {
        self.firmware_partitions = names;
        self
    }

    pub fn with_extract_all(mut self, extract_all: bool) -> Self {
        self.extract_all = extract_all;
        self
    }

    pub fn with_keep_dump(mut self, keep_dump: bool) -> Self {
        self.keep_dump = keep_dump;
        self
    }

    /// Registers a hook, normalising the single-callback-vs-list distinction
    /// at registration time (the dynamically-typed registry in the
    /// distilled design becomes a `Vec` up front here).
    pub fn register_hook(&mut self, pattern: &str, callbacks: Vec<HookFn>) -> Result<()> {
        let compiled = Regex::new(pattern)
            .map_err(|e| ExtractError::InvalidPattern(pattern.to_string(), e))?;
        self.extract_fns.push(HookEntry { pattern: compiled, callbacks });
        Ok(())
    }

    /// All partition names currently relevant for filtering the outer
    /// archive: requested + firmware + extra.
    pub fn combined_partitions(&self) -> Vec<String> {
        self.requested_partitions
            .iter()
            .chain(&self.firmware_partitions)
            .chain(&self.extra_partitions)
            .cloned()
            .collect()
    }

    /// All exact file names of interest when unpacking the outer archive.
    pub fn combined_files(&self) -> Vec<String> {
        self.firmware_files
            .iter()
            .chain(&self.factory_files)
            .chain(&self.extra_files)
            .cloned()
            .collect()
    }
}
