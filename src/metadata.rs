//! Run manifest (C12, expansion): write-only JSON telemetry for one
//! completed extraction run.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha1::{Digest, Sha1};

pub const MANIFEST_FILE_NAME: &str = ".firmdump-manifest.json";

#[derive(Debug, Serialize)]
pub struct RunManifest {
    pub source: PathBuf,
    pub source_sha1: String,
    pub requested_partitions: Vec<String>,
    pub produced_partitions: Vec<String>,
    pub stub_partitions: Vec<String>,
}

/// Hashes a file's contents. Used for the manifest only — never consulted by
/// the pipeline itself.
pub fn sha1_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Writes `manifest` to `<dump_dir>/.firmdump-manifest.json`. Failure is the
/// caller's to log and swallow — this is pure telemetry, not part of the
/// extraction contract.
pub fn write_manifest(dump_dir: &Path, manifest: &RunManifest) -> std::io::Result<()> {
    let path = dump_dir.join(MANIFEST_FILE_NAME);
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, manifest)?;
    Ok(())
}
