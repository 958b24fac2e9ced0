use std::path::PathBuf;

use clap::*;
use colored::Colorize;
use log::debug;
use purity_analysis::target_filter::TargetFilterOptions;
use purity_checker::check::{execute, init_logging, GeneralConfig};

#[derive(Parser)]
#[clap(
    name = env!("CARGO_BIN_NAME"),
    about = "Command-line tool verifying that members marked as pure are free of observable side effects. Takes semantic snapshots exported by the compiler front end, as files or directories of *.json files.",
    rename_all = "kebab-case",
    author,
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Args {
    /// Snapshot files or directories containing them (default: current directory)
    #[clap(value_name = "SNAPSHOTS")]
    pub paths: Vec<PathBuf>,

    /// General options
    #[clap(flatten)]
    pub general_config: GeneralConfig,

    /// Filtering options
    #[clap(flatten)]
    pub filter_config: TargetFilterOptions,
}

fn main() {
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).unwrap();

    let args = Args::parse();

    if let Err(err) = init_logging(args.general_config.verbose) {
        eprintln!("{}", format!("failed to initialize logging: {}", err).yellow());
    }

    debug!("Purity-Checker CLI version: {}", env!("CARGO_PKG_VERSION"));

    let paths = if args.paths.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        args.paths
    };

    match execute(&paths, args.general_config, args.filter_config) {
        Ok(false) => (),
        Ok(true) => std::process::exit(1),
        Err(err) => {
            let err = format!("{:?}", err);
            println!("{}", err.bold().red());
            std::process::exit(1);
        }
    }
}
