// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! MagicHand: desktop file organizer
//!
//! Watches the desktop and sorts settled files into the AI Library.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use magichand::cache::ClassifierCache;
use magichand::config::AppConfig;
use magichand::history::History;
use magichand::llm::ChatClient;
use magichand::organizer::{Organizer, Processed};
use magichand::service::{self, Service};
use magichand::stability::PollingStabilityDetector;
use magichand::watcher::{scan_existing, FileWatcher, IgnoreRules};

/// MagicHand CLI - desktop file organizer
#[derive(Parser, Debug)]
#[command(name = "magichand")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Sorts new desktop files into category folders", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch the desktop and organize files as they settle
    Watch {
        /// Directory to watch (overrides config)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Classify and log, but never move anything
        #[arg(long)]
        dry_run: bool,

        /// Also organize files already in the directory on startup
        #[arg(long)]
        process_existing: bool,
    },

    /// Organize everything currently in a directory, then exit
    Organize {
        /// Directory to organize (default: the watched directory)
        dir: Option<PathBuf>,

        /// Classify and log, but never move anything
        #[arg(long)]
        dry_run: bool,

        /// Give up on files still changing after this many seconds
        #[arg(long, default_value = "60")]
        max_wait: u64,
    },

    /// Classify a single file without moving it
    Classify {
        /// File to classify
        file: PathBuf,
    },

    /// Classification cache operations
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },

    /// History and undo operations
    History {
        #[command(subcommand)]
        action: HistoryCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show library layout and classification engine status
    Status,
}

#[derive(Subcommand, Debug)]
enum CacheCommands {
    /// Show entry counts per category
    Stats,

    /// List cached classifications
    List {
        /// Maximum number to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Forget every cached classification
    Clear {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCommands {
    /// List recent moves
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "10")]
        count: usize,
    },

    /// Take recently organized files back out of the AI Library
    Undo {
        /// Number of moves to undo
        #[arg(short, long, default_value = "1")]
        count: usize,

        /// Dry run (show what would be undone)
        #[arg(long)]
        dry_run: bool,

        /// Restore to the original folder instead of the Manual Library.
        /// Files put back on a watched desktop get organized again.
        #[arg(long)]
        to_original: bool,
    },

    /// Clear all history
    Clear {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

    match cli.command {
        Some(Commands::Watch { dir, dry_run, process_existing }) => {
            run_watch(config, dir, dry_run, process_existing).await
        }
        Some(Commands::Organize { dir, dry_run, max_wait }) => {
            run_organize(config, dir, dry_run, Duration::from_secs(max_wait)).await
        }
        Some(Commands::Classify { file }) => run_classify(config, file).await,
        Some(Commands::Cache { action }) => run_cache_command(config, action),
        Some(Commands::History { action }) => run_history_command(config, action),
        Some(Commands::Config { action }) => run_config_command(config, action, &cli.config),
        Some(Commands::Status) => run_status(config).await,
        None => {
            // Default: run watch mode
            run_watch(config, None, false, false).await
        }
    }
}

/// Resolve Ctrl+C / SIGTERM into the shutdown channel
fn spawn_shutdown_listener(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = terminate => info!("Received SIGTERM, shutting down..."),
        }

        let _ = shutdown_tx.send(true);
    });
}

/// Run the watch mode (main organizer loop)
async fn run_watch(
    mut config: AppConfig,
    dir_override: Option<PathBuf>,
    dry_run: bool,
    process_existing: bool,
) -> Result<()> {
    if let Some(dir) = dir_override {
        config.watch_dir = dir;
    }
    config.ensure_dirs().context("Failed to create library folders")?;

    if dry_run {
        warn!("DRY RUN MODE - files will not be moved");
    }

    let organizer = Arc::new(Organizer::from_config(&config, dry_run)?);
    info!("AI Library: {:?}", organizer.libraries().ai_library);
    info!("Loaded {} cached classifications", organizer.cache().len());

    let rules = IgnoreRules::new(&config.ignore.temp_suffixes);
    let detector = PollingStabilityDetector::new(config.stability.quiescence(), rules.clone());

    let mut watcher = FileWatcher::new().context("Failed to start file watcher")?;
    watcher
        .watch(&config.watch_dir)
        .with_context(|| format!("Failed to watch {:?}", config.watch_dir))?;

    let mut service = Service::new(
        organizer,
        detector,
        config.stability.tick(),
        config.stability.shutdown_grace(),
    );

    if process_existing {
        info!("Queueing existing files...");
        service.seed(scan_existing(&config.watch_dir, &rules)?);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_shutdown_listener(shutdown_tx);

    info!("Organizer active. Press Ctrl+C to stop.");
    let summary = service.run(watcher, shutdown_rx).await;

    info!(
        "MagicHand stopped. Organized {}, skipped {}, failed {}",
        summary.organized, summary.skipped, summary.failed
    );
    Ok(())
}

/// One-shot "Organize Now"
async fn run_organize(
    config: AppConfig,
    dir: Option<PathBuf>,
    dry_run: bool,
    max_wait: Duration,
) -> Result<()> {
    let dir = dir.unwrap_or_else(|| config.watch_dir.clone());
    if !dry_run {
        config.ensure_dirs().context("Failed to create library folders")?;
    }

    let organizer = Organizer::from_config(&config, dry_run)?;
    let rules = IgnoreRules::new(&config.ignore.temp_suffixes);
    let detector = PollingStabilityDetector::new(config.stability.quiescence(), rules.clone());

    let summary = service::organize_directory(
        &organizer,
        detector,
        &dir,
        &rules,
        config.stability.tick(),
        max_wait,
    )
    .await
    .with_context(|| format!("Failed to organize {:?}", dir))?;

    println!(
        "Organized {} file(s), skipped {}, failed {}, still changing {}",
        summary.organized, summary.skipped, summary.failed, summary.unsettled
    );
    Ok(())
}

/// Classify a single file and print the verdict
async fn run_classify(config: AppConfig, file: PathBuf) -> Result<()> {
    let organizer = Organizer::from_config(&config, true)?;

    match organizer.process(&file).await? {
        Processed::Organized(outcome) => {
            println!(
                "{}: {} ({})",
                file.display(),
                outcome.result.category,
                outcome.result.source
            );
            println!("  fingerprint: {}", outcome.key);
        }
        Processed::Skipped(reason) => println!("{}: skipped ({})", file.display(), reason),
        other => println!("{}: {:?}", file.display(), other),
    }
    Ok(())
}

fn run_cache_command(config: AppConfig, action: CacheCommands) -> Result<()> {
    let cache = ClassifierCache::open_json(config.cache_path())?;

    match action {
        CacheCommands::Stats => {
            println!("Cache ({}):", config.cache_path().display());
            println!("  Entries: {}", cache.len());
            for (category, count) in cache.category_counts() {
                println!("  {}: {}", category, count);
            }
        }
        CacheCommands::List { limit } => {
            for (key, result) in cache.entries().into_iter().take(limit) {
                println!(
                    "  {} {} ({}, {})",
                    key,
                    result.category,
                    result.source,
                    result.classified_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        CacheCommands::Clear { force } => {
            if !force {
                eprintln!("Use --force to confirm clearing the cache");
                return Ok(());
            }
            cache.clear()?;
            println!("Cache cleared");
        }
    }

    Ok(())
}

fn run_history_command(config: AppConfig, action: HistoryCommands) -> Result<()> {
    let history = History::new(config.history_path());

    match action {
        HistoryCommands::List { count } => {
            let entries = history.get_recent(count)?;
            println!("Recent history ({} entries):", entries.len());
            for entry in entries {
                let status = if entry.undone { "[UNDONE]" } else { "" };
                println!(
                    "  {} [{}] {} -> {} {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.category,
                    entry.original_path.display(),
                    entry.new_path.display(),
                    status
                );
            }
        }
        HistoryCommands::Undo { count, dry_run, to_original } => {
            let manual = config.manual_library();
            let dest = if to_original { None } else { Some(manual.as_path()) };
            let report = history.undo(count, dest, dry_run)?;

            if report.restored.is_empty() && report.failed.is_empty() {
                println!("No moves to undo");
                return Ok(());
            }
            let verb = if dry_run { "Would restore" } else { "Restored" };
            for (entry, back) in &report.restored {
                println!("{}: {} -> {}", verb, entry.new_path.display(), back.display());
            }
            for (entry, e) in &report.failed {
                eprintln!("Failed: {} ({})", entry.new_path.display(), e);
            }
            if !report.failed.is_empty() {
                anyhow::bail!("{} move(s) could not be undone", report.failed.len());
            }
        }
        HistoryCommands::Clear { force } => {
            if !force {
                eprintln!("Use --force to confirm clearing history");
                return Ok(());
            }
            history.clear()?;
            println!("History cleared");
        }
    }

    Ok(())
}

fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default()
                .save(&output)
                .with_context(|| format!("Failed to write {:?}", output))?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            // load() already validated
            println!("Configuration at {:?} is valid", config_path);
            println!("  Watch directory: {:?}", config.watch_dir);
            println!("  AI Library: {:?}", config.ai_library());
            println!("  Model: {}", config.engine.model);
        }
    }

    Ok(())
}

async fn run_status(config: AppConfig) -> Result<()> {
    println!("MagicHand v{} Status", env!("CARGO_PKG_VERSION"));
    println!("======================");

    println!("\nFolders:");
    println!("  Watching:       {}", config.watch_dir.display());
    println!("  AI Library:     {}", config.ai_library().display());
    println!("  Manual Library: {}", config.manual_library().display());

    match ClassifierCache::open_json(config.cache_path()) {
        Ok(cache) => println!("\nCache: {} entries", cache.len()),
        Err(e) => println!("\nCache: Error - {}", e),
    }

    println!("\nClassification engine ({}):", config.engine.url);
    let api_key = match config.engine.api_key() {
        Some(key) => key,
        None => {
            println!(
                "  Not configured (${} unset), extension rules only",
                config.engine.api_key_env
            );
            return Ok(());
        }
    };

    let client = ChatClient::new(
        &config.engine.url,
        api_key,
        &config.engine.model,
        config.engine.timeout(),
    )?;
    match client.health_check().await {
        Ok(()) => println!("  API: Reachable"),
        Err(e) => {
            println!("  API: Error - {}", e);
            return Ok(());
        }
    }
    match client.list_models().await {
        Ok(models) => {
            let found = models.iter().any(|m| m == client.model());
            let marker = if found { "available" } else { "not listed" };
            println!("  Model {}: {}", client.model(), marker);
        }
        Err(e) => println!("  Error listing models: {}", e),
    }

    Ok(())
}
