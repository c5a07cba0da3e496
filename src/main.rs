// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! receipt-renamer: rename receipt PDFs by payment date and service

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use receipt_renamer::ai::build_analyzer;
use receipt_renamer::cache::ContentCache;
use receipt_renamer::config::{
    default_config_path, default_history_path, save_local_pattern, AppConfig, LOCAL_CONFIG_FILE,
};
use receipt_renamer::history::PatternHistory;
use receipt_renamer::item::ItemStatus;
use receipt_renamer::orchestrator::ItemProgress;
use receipt_renamer::runner::{BatchRunner, EntryOutcome, RenameReport};
use receipt_renamer::{naming, ReceiptError, Result};

/// receipt-renamer CLI
#[derive(Parser, Debug)]
#[command(name = "receipt-renamer")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Rename receipt PDFs using AI-extracted dates and service names", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory containing receipts
    #[arg(default_value = ".")]
    directory: PathBuf,

    /// Path to configuration file (JSON format)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Show what would be renamed without renaming
    #[arg(long)]
    dry_run: bool,

    /// Ignore and do not populate the analysis cache
    #[arg(long)]
    no_cache: bool,

    /// Number of parallel analyses
    #[arg(short, long)]
    workers: Option<i64>,

    /// Service pattern, the middle part of `<Date>-<pattern>-<OriginalName>`
    #[arg(short, long)]
    pattern: Option<String>,

    /// Store `--pattern` in the directory's `.receipt-renamer.json` for later runs
    #[arg(long, requires = "pattern")]
    save_local: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

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
    /// Analysis cache operations
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Recently used service patterns
    Patterns {
        #[command(subcommand)]
        action: PatternCommands,
    },
}

#[derive(Subcommand, Debug)]
enum CacheCommands {
    /// Remove every cached analysis
    Clear,

    /// Show the number of cached analyses
    Count,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path (default: platform config directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum PatternCommands {
    /// List patterns, most recent first
    List,

    /// Forget all patterns
    Clear,
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
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = AppConfig::load(&config_path)?;

    match cli.command {
        Some(Commands::Cache { action }) => run_cache_command(config, action),
        Some(Commands::Config { action }) => run_config_command(config, action, &config_path),
        Some(Commands::Patterns { action }) => run_patterns_command(action),
        None => {
            let code = run_rename(config, &cli).await?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
    }
}

/// Analyze and rename every receipt in the target directory; returns the exit code
async fn run_rename(mut config: AppConfig, cli: &Cli) -> Result<i32> {
    let directory = cli.directory.clone();
    if !directory.is_dir() {
        return Err(ReceiptError::Config(format!(
            "{} is not a directory",
            directory.display()
        )));
    }

    config.apply_local_overrides(&directory);
    if let Some(workers) = cli.workers {
        config.ai.max_workers = workers;
    }
    if cli.no_cache {
        config.cache.enabled = false;
    }
    if let Some(pattern) = &cli.pattern {
        naming::validate_fragment(pattern)?;
        config.format.service_pattern = pattern.clone();
        if cli.save_local {
            save_local_pattern(&directory, pattern)?;
            info!("Saved pattern to {:?}", directory.join(LOCAL_CONFIG_FILE));
        }
    }

    config.resolve_credentials()?;
    let analyzer = build_analyzer(&config.ai)?;

    let history = PatternHistory::new(default_history_path());
    if let Some(pattern) = &cli.pattern {
        if let Err(e) = history.add(pattern) {
            warn!("Failed to record pattern history: {}", e);
        }
    }

    let runner = BatchRunner::from_config(directory, &config, analyzer)?
        .dry_run(cli.dry_run)
        .with_history(history);

    if !cli.quiet {
        info!("receipt-renamer v{}", env!("CARGO_PKG_VERSION"));
        info!("Provider: {}", config.ai.display_name());
        info!(
            "Cache: {}",
            if config.cache.enabled { "enabled" } else { "disabled" }
        );
    }
    if cli.dry_run {
        warn!("DRY RUN MODE - files will not be renamed");
    }

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_progress(
        progress_rx,
        cli.format == "text" && !cli.quiet,
    ));

    let report = runner.run(&cancel, Some(progress_tx)).await?;
    if let Err(e) = printer.await {
        warn!("Progress printer stopped: {}", e);
    }

    match cli.format.as_str() {
        "json" => {
            let output = serde_json::json!({
                "directory": runner.directory().to_string_lossy(),
                "report": report,
                "items": runner.store().snapshot()?,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => print_report(&report, &runner)?,
    }

    Ok(report.result.exit_code())
}

/// Cancel `cancel` on Ctrl+C or SIGTERM
fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
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
            _ = ctrl_c => info!("Received Ctrl+C, cancelling..."),
            _ = terminate => info!("Received SIGTERM, cancelling..."),
            _ = cancel.cancelled() => return,
        }

        cancel.cancel();
    });
}

async fn print_progress(mut rx: mpsc::UnboundedReceiver<ItemProgress>, enabled: bool) {
    let mut done = 0usize;
    while let Some(progress) = rx.recv().await {
        done += 1;
        if enabled {
            println!("[{}] {:<9} {}", done, progress.status.label(), progress.name);
        }
    }
}

fn print_report(report: &RenameReport, runner: &BatchRunner) -> Result<()> {
    if !report.entries.is_empty() {
        println!();
    }
    for entry in &report.entries {
        match &entry.outcome {
            EntryOutcome::Renamed { to } => println!("  {} -> {}", entry.original_name, to),
            EntryOutcome::WouldRename { to } => {
                println!("  Would rename: {} -> {}", entry.original_name, to)
            }
            EntryOutcome::Unchanged => println!("  Unchanged: {}", entry.original_name),
            EntryOutcome::Collision { target } => {
                println!("  Collision: {} -> {} (exists)", entry.original_name, target)
            }
            EntryOutcome::Failed { reason } => {
                println!("  Failed: {} ({})", entry.original_name, reason)
            }
        }
    }

    let failed: Vec<_> = runner
        .store()
        .snapshot()?
        .into_iter()
        .filter(|i| i.status() == ItemStatus::Error)
        .collect();
    if !failed.is_empty() {
        println!("\nErrors:");
        for item in failed {
            println!(
                "  {}: {}",
                item.original_name(),
                item.failure_reason().unwrap_or("unknown error")
            );
        }
    }

    let result = report.result;
    let verb = if report.dry_run { "would be renamed" } else { "renamed" };
    println!(
        "\n{} files: {} {}, {} errors, {} skipped",
        result.total, result.renamed, verb, result.errored, result.skipped
    );
    Ok(())
}

fn run_cache_command(config: AppConfig, action: CacheCommands) -> Result<()> {
    let cache = ContentCache::new(&config.cache)?;

    match action {
        CacheCommands::Clear => {
            let removed = cache.clear()?;
            println!("Removed {} cached analyses from {:?}", removed, cache.dir());
        }
        CacheCommands::Count => {
            println!("{} cached analyses in {:?}", cache.count()?, cache.dir());
        }
    }

    Ok(())
}

fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let mut shown = config;
            if shown.ai.api_key.is_some() {
                shown.ai.api_key = Some("********".to_string());
            }
            println!("# {}", config_path.display());
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }
        ConfigCommands::Generate { output } => {
            let output = output.unwrap_or_else(|| config_path.to_path_buf());
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
    }

    Ok(())
}

fn run_patterns_command(action: PatternCommands) -> Result<()> {
    let history = PatternHistory::new(default_history_path());

    match action {
        PatternCommands::List => {
            let patterns = history.get()?;
            if patterns.is_empty() {
                println!("No patterns used yet");
            }
            for (i, pattern) in patterns.iter().enumerate() {
                println!("  {:>2}. {}", i + 1, pattern);
            }
        }
        PatternCommands::Clear => {
            history.clear()?;
            println!("Pattern history cleared");
        }
    }

    Ok(())
}
