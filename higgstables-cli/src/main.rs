//! higgstables CLI Application
//!
//! Command-line interface for building per-category event count tables.
//! It uses the higgstables-core library and adds:
//! - Configuration file loading (TOML)
//! - Source file discovery (glob patterns per table)
//! - Parallel per-file evaluation
//! - Cross-section lookup from machine files
//! - Table output (CSV/JSON)

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;

mod config;
mod discover;
mod process;
mod report;

use process::FailurePolicy;

/// higgstables - Count events per category and process
#[derive(Parser, Debug)]
#[command(name = "higgstables")]
#[command(about = "Build per-category event count tables from event files", long_about = None)]
#[command(version)]
struct Args {
    /// Event file, or directory searched with the configured table patterns
    #[arg(value_name = "DATA_SOURCE")]
    data_source: PathBuf,

    /// Folder to store the tables into
    #[arg(long, value_name = "DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Configuration file, a directory holding higgstables-config.toml, or
    /// `default` for the bundled configuration (default: next to the data source)
    #[arg(short, long, value_name = "FILE|DIR")]
    config: Option<PathBuf>,

    /// Do not add the cross section column
    #[arg(long)]
    no_cs: bool,

    /// Machine cross section file (default: <machine>.json next to the config,
    /// extracted from genmetaByFile.json when missing)
    #[arg(long, value_name = "FILE", conflicts_with = "no_cs")]
    cross_sections: Option<PathBuf>,

    /// Weight the cross sections by the beam polarizations of electron and positron
    #[arg(
        long,
        num_args = 2,
        value_names = ["E", "P"],
        allow_negative_numbers = true,
        conflicts_with = "no_cs"
    )]
    polarization: Option<Vec<f64>>,

    /// Leave files that fail to evaluate out of the tables instead of aborting
    #[arg(long)]
    skip_failed: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn beam_polarization(&self) -> Option<(f64, f64)> {
        match self.polarization.as_deref() {
            Some(&[electron, positron]) => Some((electron, positron)),
            _ => None,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("higgstables CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using core library v{}", higgstables_core::VERSION);

    run(&args)
}

fn run(args: &Args) -> Result<()> {
    let config_path = if config::is_default_tag(args.config.as_deref()) {
        fs::create_dir_all(&args.data_dir)
            .with_context(|| format!("Failed to create output directory: {:?}", args.data_dir))?;
        config::write_default_config(&args.data_dir)?
    } else {
        config::select_config_path(args.config.as_deref(), &args.data_source)?
    };
    log::debug!("{:?} is used as configuration file", config_path);
    let cascade_config = config::load_config(&config_path)?;

    let cross_sections = if args.no_cs {
        None
    } else {
        Some(process::load_cross_sections(
            args.cross_sections.as_deref(),
            &cascade_config,
            &config_path,
            args.beam_polarization(),
        )?)
    };

    fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", args.data_dir))?;
    config::copy_to_output(&config_path, &args.data_dir)?;

    let scheme = discover::discover(&args.data_source, &cascade_config)?;
    if scheme.is_empty() {
        bail!("No file was found for any table");
    }

    let policy = if args.skip_failed {
        FailurePolicy::Skip
    } else {
        FailurePolicy::Abort
    };
    let mut tables = process::build_tables(&scheme, &cascade_config, policy)?;
    if let Some(cross_sections) = &cross_sections {
        tables = process::attach_cross_sections(tables, &cascade_config, cross_sections);
    }

    for table in &tables {
        report::write_table(table, &args.data_dir, cascade_config.format)?;
        log::info!("{}", report::summarize(table));
    }
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
