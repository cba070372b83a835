//! # snapwatch CLI - watch a directory for new, changed and deleted files
//!
//! ## Usage
//! ```bash
//! # Watch the current directory, polling every 5 seconds
//! snapwatch watch .
//!
//! # Poll faster, skip partial downloads, keep state elsewhere
//! snapwatch watch /srv/drop --interval 1s --ignore '*.part' --state-dir /var/lib/snapwatch
//!
//! # Show what the last saved snapshot contains
//! snapwatch status /srv/drop
//! ```

use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use snapwatch::utils::format_bytes;
use snapwatch::{
    default_state_dir, spawn_poller, store_key, ChangeKind, ChangeListener, ChangedFile, Completion,
    DetectorBuilder, DetectorConfig, FileStore, PersistentStore, Result, StatusTask, WatchError,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// snapwatch - durable poll-driven change detection
#[derive(Parser)]
#[command(name = "snapwatch")]
#[command(version)]
#[command(about = "Report new, changed and deleted files in a directory tree")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a directory until interrupted
    Watch {
        /// Directory to watch
        path: PathBuf,

        /// Where to keep the snapshot (defaults to <PATH>/.snapwatch)
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Time between polls
        #[arg(long, value_parser = humantime::parse_duration)]
        interval: Option<Duration>,

        /// How long failed files are skipped before being retried
        #[arg(long, value_parser = humantime::parse_duration)]
        retry_window: Option<Duration>,

        /// Ignore patterns (gitignore syntax)
        #[arg(short, long)]
        ignore: Vec<String>,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show the saved snapshot of a directory
    #[command(alias = "st")]
    Status {
        /// Watched directory
        path: PathBuf,

        /// Where the snapshot is kept (defaults to <PATH>/.snapwatch)
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("snapwatch=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("snapwatch=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    // Run command
    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e.user_message());
        std::process::exit(1);
    }
}

/// Main command runner
fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Watch {
            path,
            state_dir,
            interval,
            retry_window,
            ignore,
            config,
        } => {
            let mut settings = match config {
                Some(file) => DetectorConfig::from_json_file(&file)?,
                None => DetectorConfig::default(),
            };
            if let Some(interval) = interval {
                settings.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
            }
            if let Some(window) = retry_window {
                settings.retry_window_secs = i64::try_from(window.as_secs()).unwrap_or(i64::MAX);
            }
            settings.ignore_patterns.extend(ignore);
            cmd_watch(canonical_root(&path)?, state_dir, settings)
        }
        Commands::Status { path, state_dir } => cmd_status(canonical_root(&path)?, state_dir),
    }
}

fn canonical_root(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .map_err(|e| WatchError::root_unavailable(path.display().to_string(), e))
}

/// Prints each event and acknowledges it
struct ConsoleListener;

impl ConsoleListener {
    fn print(&self, file: &ChangedFile, completion: Completion) {
        let (marker, name) = match file.kind() {
            ChangeKind::Create => ("+".green().bold(), file.identity().green()),
            ChangeKind::Change => ("~".yellow().bold(), file.identity().yellow()),
            ChangeKind::Delete => ("-".red().bold(), file.identity().red()),
        };
        let size = match file.kind() {
            ChangeKind::Delete => String::new(),
            _ => format!(" ({})", format_bytes(file.attributes().length)),
        };
        println!(
            "{} {} {}{}",
            Local::now().format("%H:%M:%S").to_string().dimmed(),
            marker,
            name,
            size.dimmed()
        );
        completion.succeed();
    }
}

impl ChangeListener for ConsoleListener {
    fn on_start(&self, detector: &snapwatch::ChangeDetector) {
        println!(
            "{} Watching {}",
            "✓".green().bold(),
            detector.root_identity().cyan()
        );
    }

    fn on_stop(&self, _detector: &snapwatch::ChangeDetector) {
        println!("{} Stopped", "✓".green().bold());
    }

    fn on_file_create(&self, file: ChangedFile, completion: Completion) {
        self.print(&file, completion)
    }

    fn on_file_change(&self, file: ChangedFile, completion: Completion) {
        self.print(&file, completion)
    }

    fn on_file_delete(&self, file: ChangedFile, completion: Completion) {
        self.print(&file, completion)
    }
}

/// Run the detector until Ctrl-C
fn cmd_watch(root: PathBuf, state_dir: Option<PathBuf>, config: DetectorConfig) -> Result<()> {
    let state_dir = match state_dir {
        Some(dir) => std::path::absolute(dir)?,
        None => default_state_dir(&root),
    };
    let detector = DetectorBuilder::new()
        .config(config)
        .state_dir(&state_dir)
        .build_local(&root, Arc::new(ConsoleListener))?;

    println!("  Snapshot: {}", state_dir.display().to_string().cyan());
    println!(
        "  Polling every {}, press {} to stop",
        format_duration(detector.config().poll_interval()),
        "Ctrl-C".yellow()
    );

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let poller = spawn_poller(detector.clone());
        let status = StatusTask::new(detector.clone()).spawn();

        let interrupted = tokio::signal::ctrl_c().await;

        poller.stop().await;
        status.stop().await;
        interrupted
    })?;

    detector.stop();
    Ok(())
}

/// Show the saved snapshot
fn cmd_status(root: PathBuf, state_dir: Option<PathBuf>) -> Result<()> {
    let state_dir = state_dir.unwrap_or_else(|| default_state_dir(&root));
    let store = FileStore::new(&state_dir);
    let identity = root.to_string_lossy().into_owned();

    println!("{}", "Snapshot Status".bold());
    println!("  Root: {}", identity.cyan());

    let tree = match store.load(&store_key(&identity))? {
        Some(tree) => tree,
        None => {
            println!("  {}", "No snapshot saved yet".yellow());
            return Ok(());
        }
    };

    let stats = tree.stats();
    let age = (Utc::now() - tree.saved_at).to_std().unwrap_or_default();
    println!("  Files: {}", stats.files.to_string().green());
    println!("  Directories: {}", stats.directories);
    println!("  Total size: {}", format_bytes(stats.total_bytes));
    println!(
        "  Saved: {} ({} ago)",
        tree.saved_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
        format_duration(Duration::from_secs(age.as_secs()))
    );
    Ok(())
}
