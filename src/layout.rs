//! Layout Normalizer (C7): post-extraction directory moves.

use std::path::Path;

use crate::error::Result;
use crate::partition::ALTERNATE_PARTITION_PATHS;

/// System-as-Root flattening: if `dump_dir/system/system` is a directory,
/// `dump_dir/system` becomes `dump_dir/system_root` and the nested
/// `system/system` becomes the new `dump_dir/system`.
pub fn move_sar_system_paths(dump_dir: &Path) -> Result<()> {
    let system_dir = dump_dir.join("system");
    let system_system_dir = system_dir.join("system");

    if !system_system_dir.is_dir() {
        return Ok(());
    }

    let system_root_dir = dump_dir.join("system_root");
    let system_root_system_dir = system_root_dir.join("system");

    log::info!("flattening System-as-Root layout");
    std::fs::rename(&system_dir, &system_root_dir)?;
    std::fs::rename(&system_root_system_dir, &system_dir)?;

    Ok(())
}

/// For each `(partition, alternate_path)` pair, in fixed map order: if
/// `dump_dir/partition` is missing and `dump_dir/alternate_path` exists,
/// move the alternate up to `dump_dir/partition`.
pub fn move_alternate_partition_paths(dump_dir: &Path) -> Result<()> {
    for (partition, alternate_path) in ALTERNATE_PARTITION_PATHS {
        let partition_path = dump_dir.join(partition);
        if partition_path.is_dir() {
            continue;
        }

        let alternate_full_path = dump_dir.join(alternate_path);
        if !alternate_full_path.is_dir() {
            continue;
        }

        log::info!(
            "relocating alternate partition path {alternate_path} -> {partition}"
        );
        std::fs::rename(&alternate_full_path, &partition_path)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn flattens_system_as_root() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("system").join("system").join("bin");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("init"), b"bin").unwrap();

        move_sar_system_paths(dir.path()).unwrap();

        assert!(dir.path().join("system_root").is_dir());
        assert!(dir.path().join("system").join("bin").join("init").exists());
        assert!(!dir.path().join("system").join("system").exists());
    }

    #[test]
    fn no_op_without_nested_system() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("system")).unwrap();

        move_sar_system_paths(dir.path()).unwrap();
        assert!(dir.path().join("system").is_dir());
    }

    #[test]
    fn relocates_alternate_vendor_path() {
        let dir = tempfile::tempdir().unwrap();
        let nested_vendor = dir.path().join("system").join("vendor");
        fs::create_dir_all(&nested_vendor).unwrap();
        fs::write(nested_vendor.join("build.prop"), b"x").unwrap();

        move_alternate_partition_paths(dir.path()).unwrap();

        assert!(dir.path().join("vendor").join("build.prop").exists());
        assert!(!dir.path().join("system").join("vendor").exists());
    }

    #[test]
    fn leaves_existing_top_level_partition_untouched() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("vendor")).unwrap();
        fs::create_dir_all(dir.path().join("system").join("vendor")).unwrap();

        move_alternate_partition_paths(dir.path()).unwrap();

        // Top-level vendor already existed, so the nested one is left alone.
        assert!(dir.path().join("system").join("vendor").is_dir());
    }
}
