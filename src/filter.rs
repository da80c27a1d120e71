//! Member-selection filtering shared between the Archive Unpacker (C5) and
//! the Extraction Pipeline's partition-refinement step (C6 stage 7).
//!
//! This mirrors the "seek alternates" iteration from §4.3: pattern/file
//! matches are only considered on the first pass, then the loop repeats
//! partition-only matching against whatever alternates were discovered.

use std::collections::HashSet;
use std::path::Path;

use crate::context::HookEntry;
use crate::partition::{file_to_partition, find_alternates};

/// Filters `file_names` (basenames) down to the ones that should be
/// extracted, given the partition allowlist, the exact-name allowlist, and
/// the hook patterns. Returns the selected basenames.
pub fn filter_file_names(
    partitions: &[String],
    file_names_allowlist: &[String],
    hooks: &[HookEntry],
    candidates: &[String],
) -> Vec<String> {
    let mut found_partitions: HashSet<String> = HashSet::new();
    let mut selected = Vec::new();

    let mut wanted_partitions = partitions.to_vec();
    let mut wanted_files = file_names_allowlist.to_vec();
    let mut first_pass = true;

    loop {
        let pass_hooks: &[HookEntry] = if first_pass { hooks } else { &[] };

        for name in candidates {
            if wanted_partitions.contains(name) {
                selected.push(name.clone());
                found_partitions.insert(name.clone());
                continue;
            }

            let partition = file_to_partition(name);
            if wanted_partitions.contains(&partition.to_string()) {
                selected.push(name.clone());
                found_partitions.insert(partition.to_string());
                continue;
            }

            if first_pass && wanted_files.contains(name) {
                selected.push(name.clone());
                continue;
            }

            if pass_hooks.iter().any(|h| h.matches(name)) {
                selected.push(name.clone());
            }
        }

        let next = find_alternates(&wanted_partitions, &found_partitions);
        if next.is_empty() {
            break;
        }

        wanted_partitions = next;
        wanted_files = Vec::new();
        first_pass = false;
    }

    selected.sort();
    selected.dedup();
    selected
}

/// Partition-only refinement used by pipeline stage 7: re-scans `dump_dir`
/// and keeps only the requested partitions that are actually present, under
/// any alternate name the "seek alternates" loop can reach.
pub fn partitions_present(requested: &[String], present_file_names: &[String]) -> Vec<String> {
    let mut found_partitions: HashSet<String> = HashSet::new();
    let mut wanted = requested.to_vec();

    loop {
        for name in present_file_names {
            let partition = file_to_partition(name);
            if wanted.contains(&partition.to_string()) {
                found_partitions.insert(partition.to_string());
            }
            if wanted.contains(name) {
                found_partitions.insert(name.clone());
            }
        }

        let next = find_alternates(&wanted, &found_partitions);
        if next.is_empty() {
            break;
        }
        wanted.extend(next);
    }

    requested
        .iter()
        .filter(|p| found_partitions.contains(*p))
        .cloned()
        .collect()
}

/// Lists the basenames of regular files directly inside `dir` (non-recursive,
/// matching `os.scandir` semantics in the distilled design).
pub fn scandir_file_names(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_exact_partition_matches() {
        let candidates = vec!["system.img".to_string(), "unrelated.txt".to_string()];
        let selected =
            filter_file_names(&["system".to_string()], &[], &[], &candidates);
        assert_eq!(selected, vec!["system.img".to_string()]);
    }

    #[test]
    fn selects_exact_file_name_matches() {
        let candidates = vec!["payload.bin".to_string(), "other.bin".to_string()];
        let selected =
            filter_file_names(&[], &["payload.bin".to_string()], &[], &candidates);
        assert_eq!(selected, vec!["payload.bin".to_string()]);
    }

    #[test]
    fn filter_soundness_excludes_unrelated_members() {
        let candidates = vec![
            "system.img".to_string(),
            "boot.img".to_string(),
            "random_metadata.txt".to_string(),
        ];
        let selected =
            filter_file_names(&["system".to_string()], &[], &[], &candidates);
        assert!(!selected.contains(&"boot.img".to_string()));
        assert!(!selected.contains(&"random_metadata.txt".to_string()));
    }

    #[test]
    fn partitions_present_drops_unproduced_partition() {
        let requested = vec!["system".to_string(), "vendor".to_string()];
        let present = vec!["system.img".to_string()];
        assert_eq!(partitions_present(&requested, &present), vec!["system".to_string()]);
    }

    #[test]
    fn partitions_present_follows_alternates() {
        // odm wasn't produced directly, but its alternate root "vendor" was.
        let requested = vec!["vendor".to_string(), "odm".to_string()];
        let present = vec!["vendor.img".to_string()];
        let result = partitions_present(&requested, &present);
        assert!(result.contains(&"vendor".to_string()));
    }

    #[test]
    fn hook_pattern_match_is_anchored_not_substring() {
        let hooks = vec![crate::context::HookEntry {
            pattern: regex::Regex::new(r"modem\.bin").unwrap(),
            callbacks: Vec::new(),
        }];
        let candidates = vec!["super_modem.bin".to_string()];

        let selected = filter_file_names(&[], &[], &hooks, &candidates);
        assert!(selected.is_empty());
    }
}
