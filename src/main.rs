use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tidesort::date::DateWindow;
use tidesort::pipeline::{self, PipelineConfig};
use tidesort::rename::RenamePolicy;
use tidesort::report;

#[derive(Parser)]
#[command(name = "tidesort")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sort carved files into type/date bins with dedup and integrity checks")]
struct Cli {
    /// Directory holding the carved files.
    #[arg(short, long)]
    source: PathBuf,

    /// Destination root for the sorted tree.
    #[arg(short, long)]
    dest: PathBuf,

    /// Decide everything and write the manifest, but move nothing.
    #[arg(long)]
    dry_run: bool,

    /// Which files may be renamed from recovered metadata titles.
    #[arg(long, value_enum, default_value = "carved")]
    rename: RenamePolicy,

    /// Also write an HTML summary next to the manifest.
    #[arg(long)]
    report: bool,

    /// Worker threads for analysis and placement. 0 means one per core.
    #[arg(long, default_value_t = 0)]
    workers: usize,

    /// Recovered dates before this year are treated as implausible.
    #[arg(long, default_value_t = DateWindow::DEFAULT_EARLIEST_YEAR)]
    earliest_year: i32,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = PipelineConfig {
        source: cli.source.clone(),
        dest: cli.dest.clone(),
        dry_run: cli.dry_run,
        rename: cli.rename,
        workers: cli.workers,
        earliest_year: cli.earliest_year,
        progress: true,
    };

    let outcome = pipeline::run(&config)?;

    if cli.report {
        let path = report::write_report(&cli.dest)?;
        println!("report:      {}", path.display());
    }

    let s = &outcome.summary;
    if cli.dry_run {
        println!("dry run: no files were moved");
    }
    println!("binned:      {}", s.binned);
    println!("quarantined: {}", s.quarantined);
    println!("duplicates:  {}", s.duplicates);
    println!("errored:     {}", s.errored);
    if s.skipped_resumed > 0 {
        println!("resumed:     {} already disposed", s.skipped_resumed);
    }
    println!("manifest:    {}", outcome.manifest_path.display());

    Ok(())
}
