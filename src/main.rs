use std::{fs, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::info;
use tokio_util::sync::CancellationToken;

use duration_flagger::{
    ledger::{export_file_name, DedupLedger},
    page::FilePage,
    scan::LogPresenter,
    settings,
    store::SqliteStore,
    trigger::{ChangeNotifier, PollingWatcher},
    ScanScheduler, VariantCardExtractor,
};

#[derive(Parser)]
#[command(name = "duration-flagger", version, about = "Flag suspiciously short variant durations")]
struct Cli {
    /// SQLite file holding the ledger and settings
    #[arg(long, env = "DURATION_FLAGGER_STORE", default_value = "duration_flagger.sqlite3")]
    store: PathBuf,

    /// Debug-level logging
    #[arg(short, long, env = "DURATION_FLAGGER_DEBUG")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a saved page once
    Scan {
        html: PathBuf,
        /// Source context recorded with each entry (defaults to the canonical link)
        #[arg(long)]
        url: Option<String>,
    },
    /// Rescan a page file whenever it changes
    Watch {
        html: PathBuf,
        #[arg(long)]
        url: Option<String>,
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
    },
    /// Show or set the threshold in minutes
    Threshold { minutes: Option<f64> },
    /// Write the ledger CSV to stdout, a file, or a directory
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Number of ledger rows
    Count,
    /// Empty the ledger
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    duration_flagger::init_logging(cli.verbose);

    let store = Arc::new(SqliteStore::open(cli.store.clone())?);
    let ledger = DedupLedger::new(store.clone());
    ledger.ensure_initialized().await?;

    match cli.command {
        Command::Scan { html, url } => {
            let orchestrator = duration_flagger::start(
                store,
                Arc::new(FilePage::new(html, url)),
                Arc::new(VariantCardExtractor::new()?),
                Arc::new(LogPresenter::new()),
            )
            .await?;
            let summary = orchestrator.scan().await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Watch {
            html,
            url,
            interval_ms,
        } => {
            let page = Arc::new(FilePage::new(html, url));
            let orchestrator = duration_flagger::start(
                store,
                page.clone(),
                Arc::new(VariantCardExtractor::new()?),
                Arc::new(LogPresenter::new()),
            )
            .await?;

            let cancel_token = CancellationToken::new();
            let mut scans = ScanScheduler::spawn(orchestrator, cancel_token.clone());

            // The watcher's baseline poll fires the initial scan.
            let watcher = PollingWatcher::new(page, Duration::from_millis(interval_ms));
            let watch_task = watcher.subscribe(scans.trigger(), cancel_token.clone());

            info!("Watching for changes; press Ctrl-C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;

            cancel_token.cancel();
            watch_task.await.context("page watcher failed to join")?;
            scans.shutdown().await?;
            info!("Completed {} scans", scans.scans_completed());
        }
        Command::Threshold { minutes } => {
            let current = match minutes {
                Some(minutes) => settings::set_threshold_minutes(store.as_ref(), minutes).await?,
                None => settings::threshold_minutes(store.as_ref()).await,
            };
            println!("{current}");
        }
        Command::Export { output } => {
            let csv = ledger.export_csv().await?;
            match output {
                None => print!("{csv}"),
                Some(path) => {
                    let path = if path.is_dir() {
                        path.join(export_file_name(Utc::now()))
                    } else {
                        path
                    };
                    fs::write(&path, csv)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!("Exported ledger to {}", path.display());
                }
            }
        }
        Command::Count => {
            println!("{} rows", ledger.row_count().await?);
        }
        Command::Clear => {
            ledger.clear_all().await?;
            println!("0 rows");
        }
    }

    Ok(())
}
