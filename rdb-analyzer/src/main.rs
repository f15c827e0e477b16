//! rdb-analyzer CLI
//!
//! Scans the given files and folders, runs the three-phase analysis
//! pipeline, and reports progress as it goes. The library stores live under
//! the resolved library folder.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rdb_analyzer::config::{clamp_workers, AnalyzerConfig, PhaseMode};
use rdb_analyzer::scanner::FileScanner;
use rdb_analyzer::scheduler::TrackEvent;
use rdb_analyzer::store::LibraryStore;
use rdb_common::config::resolve_library_folder;
use rdb_common::events::EventBus;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "rdb-analyzer", version, about = "Offline music library analyzer")]
struct Cli {
    /// Folder holding RhythmDB.json and CriteriaDB.json
    #[arg(long, global = true)]
    library_folder: Option<String>,

    /// Verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Sequential,
    Concurrent,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze audio files and folders
    Analyze {
        /// Files or directories to analyze (directories scan recursively)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Worker pool degree per phase (1-8)
        #[arg(short = 'j', long)]
        workers: Option<usize>,

        /// Background phase ordering
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Chat-completion server base URL
        #[arg(long)]
        llm_url: Option<String>,

        /// Model name on the server
        #[arg(long)]
        model: Option<String>,

        /// Ask the classifier for stem separation
        #[arg(long)]
        demucs: bool,

        /// Waveform PNG cache folder (disabled when omitted)
        #[arg(long)]
        waveforms: Option<PathBuf>,
    },

    /// Rebuild CriteriaDB.json from the main store
    RebuildCriteria,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let library_folder = resolve_library_folder(cli.library_folder.as_deref())
        .context("resolving library folder")?;
    info!(folder = %library_folder.display(), "Library folder");

    match cli.command {
        Commands::Analyze {
            paths,
            workers,
            mode,
            llm_url,
            model,
            demucs,
            waveforms,
        } => {
            let mut config = AnalyzerConfig::with_library_folder(library_folder).apply_config_file();
            if let Some(workers) = workers {
                let workers = clamp_workers(workers);
                config.tech_workers = workers;
                config.creative_workers = workers;
                config.instrumentation_workers = workers;
            }
            if let Some(mode) = mode {
                config.mode = match mode {
                    ModeArg::Sequential => PhaseMode::Sequential,
                    ModeArg::Concurrent => PhaseMode::Concurrent,
                };
            }
            if let Some(url) = llm_url {
                config.llm_url = url;
            }
            if let Some(model) = model {
                config.llm_model = model;
            }
            if demucs {
                config.demucs = true;
            }
            if let Some(folder) = waveforms {
                config.waveform_folder = Some(folder);
            }
            analyze(config, paths).await
        }
        Commands::RebuildCriteria => {
            let store = LibraryStore::new(library_folder);
            let criteria = store
                .rebuild_criteria()
                .await
                .context("rebuilding criteria store")?;
            info!(
                genres = criteria.genre.len(),
                moods = criteria.mood.len(),
                instruments = criteria.instrument.len(),
                "Criteria store rebuilt"
            );
            Ok(())
        }
    }
}

async fn analyze(config: AnalyzerConfig, paths: Vec<PathBuf>) -> Result<()> {
    let files = FileScanner::new().scan(&paths).context("scanning inputs")?;
    if files.is_empty() {
        warn!("No audio files found");
        return Ok(());
    }
    info!(count = files.len(), "Starting analysis");

    let shutdown_grace = Duration::from_secs(config.shutdown_grace_secs);
    let bus = EventBus::default();
    let (scheduler, _store) = rdb_analyzer::build_scheduler(&config, bus);

    // The CLI drives the pipeline directly; there is no UI to wait for.
    scheduler.mark_ready();

    let total = files.len();
    let mut submission = scheduler.submit(files);

    let mut completed = 0usize;
    let mut failed = 0usize;
    while let Some(event) = submission.next_event().await {
        match event {
            TrackEvent::Partial(record) => {
                info!(
                    file = %record.file,
                    bpm = ?record.technical.bpm,
                    "Technical facts ready"
                );
            }
            TrackEvent::Completed(record) => {
                completed += 1;
                info!(
                    file = %record.file,
                    instruments = ?record.analysis.final_instruments,
                    creative_status = %record.creative_status,
                    done = completed + failed,
                    total,
                    "Track analyzed"
                );
            }
            TrackEvent::Failed { path, error } => {
                failed += 1;
                warn!(file = %path.display(), error = %error, "Track failed");
            }
        }
    }

    scheduler.shutdown(shutdown_grace).await;
    info!(completed, failed, total, "Analysis finished");
    Ok(())
}
