//! Partition name resolution: file-to-partition mapping, slot stripping,
//! and alternate-path discovery (C3).

use std::collections::HashSet;

/// Fixed map of a partition to its historical alternate residence inside
/// another partition's tree. Order matters for the layout normalizer, which
/// walks this list in order.
pub const ALTERNATE_PARTITION_PATHS: &[(&str, &str)] = &[
    ("product", "system/product"),
    ("system_ext", "system/system_ext"),
    ("vendor", "system/vendor"),
    ("odm", "vendor/odm"),
];

/// The partition name encoded in a file name is everything before the first
/// `.`, e.g. `system.new.dat.br` -> `system`.
pub fn file_to_partition(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or(file_name)
}

/// Drops a trailing `_a`/`_b` slot suffix, e.g. `system_a` -> `system`.
pub fn unslot(name: &str) -> &str {
    match name.rsplit_once('_') {
        Some((base, "a" | "b")) => base,
        _ => name,
    }
}

fn alternate_path_for(partition: &str) -> Option<&'static str> {
    ALTERNATE_PARTITION_PATHS
        .iter()
        .find(|(p, _)| *p == partition)
        .map(|(_, alt)| *alt)
}

/// For each wanted partition not yet found, if it has an alternate whose
/// first path component is not already wanted or found, add that first
/// component to a new wanted set.
///
/// This is the core of the "seek alternates" loop: it always returns a set
/// disjoint from `wanted ∪ found` until it returns empty, guaranteeing
/// termination within `|PARTITION_SET|` iterations (§8 property 5).
pub fn find_alternates(wanted: &[String], found: &HashSet<String>) -> Vec<String> {
    let wanted_set: HashSet<&str> = wanted.iter().map(String::as_str).collect();
    let mut new_wanted = Vec::new();

    for partition in wanted {
        if found.contains(partition) {
            continue;
        }

        let Some(alt_path) = alternate_path_for(partition) else {
            continue;
        };

        let alt_root = alt_path.split('/').next().unwrap_or(alt_path);

        if found.contains(alt_root)
            || wanted_set.contains(alt_root)
            || new_wanted.iter().any(|p: &String| p == alt_root)
        {
            continue;
        }

        new_wanted.push(alt_root.to_string());
    }

    new_wanted
}

/// Deduplicates a partition list, preserving first-seen order.
pub fn dedup_partitions(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for name in names {
        if seen.insert(name.clone()) {
            out.push(name);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_partition_from_extension() {
        assert_eq!(file_to_partition("system.new.dat.br"), "system");
        assert_eq!(file_to_partition("vendor.img"), "vendor");
        assert_eq!(file_to_partition("payload.bin"), "payload");
        assert_eq!(file_to_partition("super"), "super");
    }

    #[test]
    fn strips_known_slots_only() {
        assert_eq!(unslot("system_a"), "system");
        assert_eq!(unslot("system_b"), "system");
        assert_eq!(unslot("system"), "system");
        // Not a slot suffix, left untouched.
        assert_eq!(unslot("system_ext"), "system_ext");
    }

    #[test]
    fn find_alternates_adds_unseen_roots() {
        let wanted = vec!["odm".to_string()];
        let found: HashSet<String> = HashSet::new();

        let alternates = find_alternates(&wanted, &found);
        assert_eq!(alternates, vec!["vendor".to_string()]);
    }

    #[test]
    fn find_alternates_terminates_when_no_progress() {
        let wanted = vec!["system".to_string()];
        let found: HashSet<String> = HashSet::new();
        // "system" has no alternate path entry, so nothing is added.
        assert!(find_alternates(&wanted, &found).is_empty());
    }

    #[test]
    fn find_alternates_skips_already_wanted_root() {
        // odm's alternate root is "vendor", which is already wanted, so it
        // must not be added a second time; vendor's own alternate ("system")
        // is still discovered.
        let wanted = vec!["vendor".to_string(), "odm".to_string()];
        let found: HashSet<String> = HashSet::new();
        assert_eq!(find_alternates(&wanted, &found), vec!["system".to_string()]);
    }

    #[test]
    fn find_alternates_skips_found_partitions() {
        let wanted = vec!["vendor".to_string()];
        let found: HashSet<String> = ["vendor".to_string()].into_iter().collect();
        assert!(find_alternates(&wanted, &found).is_empty());
    }

    #[test]
    fn dedup_preserves_order() {
        let names = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        assert_eq!(dedup_partitions(names), vec!["a".to_string(), "b".to_string()]);
    }
}
