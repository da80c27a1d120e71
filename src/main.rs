use std::process::exit;

use clap::Parser;

use firmdump::args::Args;

fn main() {
    let args = Args::parse();

    if args.verbose && std::env::var("FIRMDUMP_LOG").is_err() {
        std::env::set_var("FIRMDUMP_LOG", "debug");
    }

    pretty_env_logger::init_custom_env("FIRMDUMP_LOG");

    match firmdump::run(args) {
        Ok(dump_dir) => {
            println!("firmdump: extracted to {}", dump_dir.path().display());
        }
        Err(e) => {
            eprintln!("firmdump: {e}");
            exit(1);
        }
    }
}
