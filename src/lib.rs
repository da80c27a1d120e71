pub mod archive;
pub mod args;
pub mod context;
pub mod dump_dir;
pub mod error;
pub mod filter;
pub mod hooks;
pub mod layout;
pub mod magic;
pub mod metadata;
pub mod partition;
pub mod pipeline;
pub mod tools;

pub use context::ExtractionContext;
pub use dump_dir::DumpDir;
pub use error::{ExtractError, Result};

/// Builds an `ExtractionContext` from parsed CLI arguments and runs the
/// extraction pipeline to completion.
pub fn run(args: args::Args) -> Result<DumpDir> {
    let ctx = ExtractionContext::new(args.partitions)
        .with_firmware_partitions(args.extra_partitions)
        .with_extract_all(args.all)
        .with_keep_dump(args.keep_dump);

    pipeline::run(&args.source, ctx)
}
