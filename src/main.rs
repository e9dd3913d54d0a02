//! Wahis-Harvest main entry point
//!
//! Command-line interface for the two pipeline stages: `fetch` retrieves
//! outbreak reports into a resumable on-disk corpus, `tabulate` compiles the
//! corpus into a three-sheet spreadsheet.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use wahis_harvest::checkpoint::CheckpointStore;
use wahis_harvest::compile;
use wahis_harvest::config::{default_config_with_hash, load_config_with_hash, HarvestConfig};
use wahis_harvest::corpus::RecordStore;
use wahis_harvest::fetch::HttpFetchClient;
use wahis_harvest::harvest::{print_summary, Orchestrator, RetryPolicy};
use wahis_harvest::model::YearRange;

const CHECKPOINT_DB: &str = "checkpoints.db";

/// Wahis-Harvest: retrieve and tabulate disease-outbreak reports
#[derive(Parser, Debug)]
#[command(name = "wahis-harvest")]
#[command(version)]
#[command(about = "Retrieve and tabulate disease-outbreak reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Retrieve reports into the output directory, resuming any earlier run
    Fetch {
        /// Output directory for the corpus and checkpoint database
        #[arg(value_name = "OUT_DIR")]
        out_dir: PathBuf,

        /// Terrestrial disease ID (ASF is 12)
        #[arg(short, long)]
        disease_id: u32,

        /// Range of years, e.g. 2007-2016
        #[arg(short, long)]
        year_range: YearRange,

        /// Optional TOML file overriding retry/timeout/portal settings
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Compile the retrieved corpus into a spreadsheet
    Tabulate {
        /// Output directory holding the corpus
        #[arg(value_name = "OUT_DIR")]
        out_dir: PathBuf,

        /// Filename of the spreadsheet written into the output directory
        #[arg(long, default_value = "reports.xlsx")]
        xlsx_name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Fetch {
            out_dir,
            disease_id,
            year_range,
            config,
        } => handle_fetch(&out_dir, disease_id, year_range, config.as_deref()).await,
        Command::Tabulate { out_dir, xlsx_name } => handle_tabulate(&out_dir, &xlsx_name),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("wahis_harvest=info,warn"),
            1 => EnvFilter::new("wahis_harvest=debug,info"),
            2 => EnvFilter::new("wahis_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the fetch stage
///
/// Exit is successful when the pass over the pending set completes, even if
/// individual units failed and were recorded; only store I/O failures (or an
/// unusable portal during country enumeration) are fatal.
async fn handle_fetch(
    out_dir: &Path,
    disease_id: u32,
    year_range: YearRange,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    let (config, config_hash): (HarvestConfig, String) = match config_path {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            load_config_with_hash(path)?
        }
        None => default_config_with_hash(),
    };

    std::fs::create_dir_all(out_dir)?;
    let checkpoints = CheckpointStore::open(&out_dir.join(CHECKPOINT_DB))?;
    let records = RecordStore::open(out_dir)?;
    let client = HttpFetchClient::new(&config.portal, &config.fetch)?;
    let policy = RetryPolicy::from_config(&config.retry);

    let mut orchestrator =
        Orchestrator::new(client, checkpoints, records, policy, disease_id, year_range);
    let summary = orchestrator.run(&config_hash).await?;

    print_summary(&summary);
    Ok(())
}

/// Handles the tabulate stage
fn handle_tabulate(out_dir: &Path, xlsx_name: &str) -> anyhow::Result<()> {
    let records = RecordStore::open(out_dir)?;
    let (tables, summary) = compile::compile(&records)?;

    let xlsx_path = out_dir.join(xlsx_name);
    compile::write_workbook(&tables, &xlsx_path)?;

    compile::print_summary(&summary, &tables);
    println!("\n✓ Spreadsheet written to: {}", xlsx_path.display());
    Ok(())
}
