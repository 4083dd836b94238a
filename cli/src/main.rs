//! stash: sorts a directory by rules and deep-stashes what nobody touched.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use stash_core::core::classify::{ClassificationPrompt, NoPrompt, UnclassifiedItem};
use stash_core::core::index::{InitOptions, InitOutcome};
use stash_core::core::restore::RestoreFilter;
use stash_core::types::FolderName;
use stash_core::{Stash, StashError};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stash")]
#[command(author, version, about = "Rule-based sorting and deep-stash for cluttered directories")]
#[command(propagate_version = true)]
struct Cli {
    /// Managed directory (default: current directory)
    #[arg(short, long, global = true, default_value = ".")]
    dir: PathBuf,

    /// Log every move and archive to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up the directory for stashing
    Init {
        /// Archive destination, e.g. a mounted external drive
        #[arg(long)]
        drive: Option<PathBuf>,

        /// Days without modification before an item is deep-stashed
        #[arg(long)]
        days: Option<u32>,
    },

    /// Show tracked, archived and soon-to-be-archived counts
    Status,

    /// Sort new entries and deep-stash stale ones
    Update {
        /// Leave unclassified files in place instead of asking
        #[arg(long)]
        no_prompt: bool,
    },

    /// Deep-stash the given items now, regardless of age
    Deepstash {
        /// Items to archive; relative paths are taken from the managed directory
        #[arg(required = true, num_args = 1..)]
        paths: Vec<PathBuf>,
    },

    /// Bring archived items back
    Restore {
        /// Only items archived within this many days
        #[arg(long)]
        timeframe: Option<u32>,

        /// Only items originally inside this folder
        #[arg(long)]
        folder: Option<PathBuf>,

        /// Exactly this item
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Rebuild the index from what is on disk
    Reconcile,

    /// List sorting rules, or add one
    Rules {
        #[command(subcommand)]
        action: Option<RuleAction>,
    },
}

#[derive(Subcommand)]
enum RuleAction {
    /// Send files with this extension to a folder
    Add { extension: String, folder: String },
}

/// Asks on stdin until it gets a usable folder name or an empty line.
struct StdinPrompt;

impl ClassificationPrompt for StdinPrompt {
    fn ask(&mut self, item: &UnclassifiedItem<'_>) -> Option<String> {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();

        loop {
            let kind = match (item.extension, item.mime_type) {
                (Some(ext), Some(mime)) => format!(".{ext}, {mime}"),
                (Some(ext), None) => format!(".{ext}"),
                (None, mime) => mime.unwrap_or("unknown type").to_string(),
            };
            print!("Folder for {} ({kind})? [empty to skip] ", item.path.display());
            stdout.flush().ok()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line).ok()? == 0 {
                return None;
            }
            let answer = line.trim();
            if answer.is_empty() {
                return None;
            }
            if FolderName::try_from(answer).is_ok() {
                return Some(answer.to_string());
            }
            println!("{answer:?} is not a folder name; use a single name without separators.");
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), StashError> {
    let mut stash = Stash::open(&cli.dir)?;
    let now = Utc::now();
    debug!(root = %stash.root().display(), "opened stash");

    match cli.command {
        Commands::Init { drive, days } => {
            let options = InitOptions {
                external_drive: drive,
                deepstash_days: days,
            };
            match stash.initialize(options, now)? {
                InitOutcome::Initialized => println!("Initialized {}", stash.root().display()),
                InitOutcome::AlreadyInitialized => {
                    println!("{} is already initialized", stash.root().display())
                }
            }
        }
        Commands::Status => cmd_status(&stash, now)?,
        Commands::Update { no_prompt } => {
            let outcome = if no_prompt {
                stash.update(&mut NoPrompt, now)?
            } else {
                stash.update(&mut StdinPrompt, now)?
            };

            let classified = &outcome.classified;
            println!(
                "Moved {}, left {} unsorted, learned {} rule(s)",
                classified.moved.len(),
                classified.skipped.len(),
                classified.rules_added.len()
            );
            match &outcome.sweep {
                Some(sweep) => println!(
                    "Deep-stashed {}, {} due soon",
                    sweep.archived.len(),
                    sweep.soon.len()
                ),
                None => println!("No archive destination; deep-stash skipped"),
            }
            let failed = classified
                .failed
                .iter()
                .chain(outcome.sweep.iter().flat_map(|s| s.failed.iter()));
            for (path, reason) in failed {
                eprintln!("Failed: {}: {}", path.display(), reason);
            }
        }
        Commands::Deepstash { paths } => {
            let outcome = stash.deep_stash(&paths, now)?;
            for record in &outcome.archived {
                println!(
                    "{} -> {}",
                    record.original_path.display(),
                    record.deep_stash_path.display()
                );
            }
            for (path, reason) in &outcome.failed {
                eprintln!("Failed: {}: {}", path.display(), reason);
            }
            for path in &outcome.rejected {
                eprintln!("Refused: {} is not an item of the managed directory", path.display());
            }
            if let Some(path) = outcome.not_found.into_iter().next() {
                return Err(StashError::NotFound(path));
            }
            if let Some(path) = outcome.rejected.into_iter().next() {
                return Err(StashError::InvalidTarget(path));
            }
        }
        Commands::Restore {
            timeframe,
            folder,
            file,
        } => {
            let filter = RestoreFilter {
                path: file,
                folder,
                within_days: timeframe,
            };
            let outcome = stash.restore(&filter, now)?;
            for path in &outcome.restored {
                println!("Restored {}", path.display());
            }
            for path in &outcome.missing {
                eprintln!("Archive copy missing: {}", path.display());
            }
            for (path, reason) in &outcome.failed {
                eprintln!("Failed: {}: {}", path.display(), reason);
            }
        }
        Commands::Reconcile => {
            let outcome = stash.reconcile(now)?;
            println!(
                "Index rebuilt: {} added, {} refreshed, {} dropped",
                outcome.added, outcome.updated, outcome.dropped
            );
        }
        Commands::Rules { action: None } => {
            let rules = stash.rules().rules();
            for (extension, folder) in &rules.extensions {
                println!(".{extension}\t{folder}");
            }
            for (mime_type, folder) in &rules.mime_types {
                println!("{mime_type}\t{folder}");
            }
        }
        Commands::Rules {
            action: Some(RuleAction::Add { extension, folder }),
        } => {
            let folder = stash.add_rule(&extension, &folder)?;
            println!("Files ending in .{} go to {}", extension.trim_start_matches('.'), folder);
        }
    }

    Ok(())
}

fn cmd_status(stash: &Stash, now: DateTime<Utc>) -> Result<(), StashError> {
    let report = stash.status(now)?;

    println!("Stash:        {}", report.name);
    match &report.external_drive {
        Some(drive) => println!("Destination:  {}", drive.display()),
        None => println!("Destination:  (none)"),
    }
    println!("Threshold:    {} days", report.deepstash_days);
    println!("Tracked:      {}", report.total);
    println!("Local:        {}", report.local);
    println!("Deep-stashed: {}", report.archived);
    println!("Due soon:     {}", report.soon);
    Ok(())
}
