use clap::Parser;
use std::path::PathBuf;

/// Extract Android firmware partitions to a normalised directory tree
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Firmware archive (.zip, .tar, .tar.gz, .tgz) or an already-unpacked directory
    pub source: PathBuf,

    /// Partition names to materialise (default: odm, product, system, system_ext, vendor)
    #[arg(long, value_delimiter = ',')]
    pub partitions: Vec<String>,

    /// Additional partition names to unpack from payload containers without
    /// requiring them to appear as top-level directories
    #[arg(long, value_delimiter = ',')]
    pub extra_partitions: Vec<String>,

    /// Copy every member out of the outer archive, ignoring partition filters
    #[arg(long)]
    pub all: bool,

    /// Keep the dump directory after extraction and reuse it on a later run
    #[arg(long)]
    pub keep_dump: bool,

    /// Raise log verbosity
    #[arg(long, short)]
    pub verbose: bool,
}
