//! Sunote CLI - personal notes with due dates and JSON backups.

use std::io::{self, BufRead, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use log::{debug, warn};
use sunote_core::{
    parse_due_at, BackupFolder, FileHandle, Note, NoteFilter, NoteService, NoteStore, Outcome,
    PipelineConfig, QueryPipeline, QuerySnapshot, SharedStore,
};
use sunote_sqlite::SqliteNoteStore;

const DEFAULT_DB_FILE: &str = "sunote1.db";

#[derive(Parser)]
#[command(name = "sunote", about = "Personal notes with due dates and JSON backups", version)]
struct Cli {
    /// Path to the note database
    #[arg(long, global = true, env = "SUNOTE_DB", default_value = DEFAULT_DB_FILE)]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new note
    Add {
        /// Note title
        #[arg(long, default_value = "")]
        title: String,
        /// Note content (reads from stdin if not provided)
        #[arg(long)]
        content: Option<String>,
        /// Due date (e.g. "tomorrow", "in 3 days", "2026-01-28 09:00")
        #[arg(long)]
        due: Option<String>,
    },
    /// Edit a note; fields that are not given keep their value
    Edit {
        /// Note ID
        id: i64,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// New content (reads from stdin if not provided and stdin is not a tty)
        #[arg(long)]
        content: Option<String>,
        /// New due date
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,
        /// Remove the due date
        #[arg(long)]
        clear_due: bool,
    },
    /// Show one or more notes
    Show {
        /// Comma-separated note IDs
        ids: String,
    },
    /// List notes, dated ones first
    Ls {
        /// Only notes whose title or content contains this text
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Delete one or more notes
    Rm {
        /// Comma-separated note IDs
        ids: String,
    },
    /// Back up every note as JSON
    Export {
        /// File to write
        #[arg(required_unless_present = "dir", conflicts_with = "dir")]
        path: Option<PathBuf>,
        /// Write a timestamped backup into this directory instead
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Restore notes from a JSON backup
    Import {
        /// Backup file to read
        path: PathBuf,
        /// Delete all existing notes first
        #[arg(long)]
        replace: bool,
    },
    /// Live search: type a term per line, see the list follow along
    Watch {
        /// Quiet period before a typed term is searched
        #[arg(long, env = "SUNOTE_DEBOUNCE_MS", default_value = "150")]
        debounce_ms: u64,
        /// How long the query stays live without observers
        #[arg(long, env = "SUNOTE_IDLE_GRACE_MS", default_value = "5000")]
        idle_grace_ms: u64,
    },
}

fn parse_ids(ids: &str) -> Result<Vec<i64>> {
    ids.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().context(format!("Invalid note ID: {}", s)))
        .collect()
}

fn parse_due(due: Option<String>) -> Result<Option<i64>> {
    Ok(due.map(|d| parse_due_at(&d)).transpose()?)
}

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("Failed to read from stdin")?;
    Ok(buf)
}

fn is_stdin_tty() -> bool {
    atty::is(atty::Stream::Stdin)
}

fn format_millis(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis).single() {
        Some(t) => t.format("%Y-%m-%d %H:%M").to_string(),
        None => millis.to_string(),
    }
}

fn print_summary(note: &Note) {
    let due = note
        .due_at
        .map(|d| format!(" (due {})", format_millis(d)))
        .unwrap_or_default();
    println!("{}: {}{} -- {}", note.id, note.title, due, note.preview(80));
}

fn print_snapshot(snapshot: &QuerySnapshot) {
    if let Some(ref e) = snapshot.error {
        warn!("query for {:?} failed: {}", snapshot.term, e);
        eprintln!("[query for {:?} failed: {}]", snapshot.term, e);
        return;
    }
    println!("--- {:?}: {} notes", snapshot.term, snapshot.notes.len());
    for note in &snapshot.notes {
        print_summary(note);
    }
}

/// Print the outcome and turn failures into an error exit.
fn report(outcome: Outcome) -> Result<()> {
    if outcome.success {
        println!("{}", outcome.message);
        Ok(())
    } else {
        bail!(outcome.message)
    }
}

/// Feed stdin lines into the pipeline and print every published list
/// until stdin closes.
async fn watch(store: SharedStore, config: PipelineConfig) -> Result<()> {
    let pipeline = QueryPipeline::new(store, config);
    let mut rx = pipeline.observe();

    let (lines_tx, mut lines_rx) = tokio::sync::mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines().map_while(|l| l.ok()) {
            if lines_tx.send(line).is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                print_snapshot(&rx.borrow_and_update());
            }
            line = lines_rx.recv() => match line {
                Some(term) => {
                    debug!("search term {:?}", term.trim());
                    pipeline.set_term(term.trim());
                }
                None => {
                    debug!("stdin closed, leaving watch");
                    break;
                }
            },
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    debug!("using database {}", cli.db.display());

    let store: SharedStore = Arc::new(
        SqliteNoteStore::open(&cli.db)
            .with_context(|| format!("Failed to open database {}", cli.db.display()))?,
    );
    let service = NoteService::new(store.clone());

    match cli.command {
        Commands::Add {
            title,
            content,
            due,
        } => {
            let content = match content {
                Some(c) => c,
                None => read_stdin()?,
            };
            let due_at = parse_due(due)?;
            let id = service.create(title, content, due_at).await?;
            println!("Added note {}", id);
        }

        Commands::Edit {
            id,
            title,
            content,
            due,
            clear_due,
        } => {
            let content = if content.is_none() && !is_stdin_tty() {
                Some(read_stdin()?)
            } else {
                content
            };
            let due = parse_due(due)?;

            let Some(existing) = service.get_note(id).await? else {
                bail!("Note {} not found", id);
            };
            let due_at = if clear_due { None } else { due.or(existing.due_at) };
            report(
                service
                    .save(
                        id,
                        title.unwrap_or(existing.title),
                        content.unwrap_or(existing.content),
                        due_at,
                    )
                    .await,
            )?;
        }

        Commands::Show { ids } => {
            let ids = parse_ids(&ids)?;
            if ids.is_empty() {
                bail!("No note IDs provided");
            }

            let mut not_found = Vec::new();
            let mut first = true;

            for id in &ids {
                match service.get_note(*id).await? {
                    Some(note) => {
                        if !first {
                            println!("\n{}\n", "=".repeat(40));
                        }
                        first = false;

                        println!("# {}\n", note.title);
                        println!("{}", note.content);
                        println!("\n---\n");
                        println!("Created: {}", format_millis(note.created_at));
                        println!("Last modified: {}", format_millis(note.updated_at));
                        if let Some(due) = note.due_at {
                            println!("Due: {}", format_millis(due));
                        }
                    }
                    None => not_found.push(*id),
                }
            }

            if !not_found.is_empty() {
                for id in &not_found {
                    eprintln!("Note {} not found", id);
                }
                std::process::exit(1);
            }
        }

        Commands::Ls { search } => {
            let filter = NoteFilter::from_term(search.as_deref().unwrap_or(""));
            for note in store.query(&filter).await? {
                print_summary(&note);
            }
        }

        Commands::Rm { ids } => {
            let ids = parse_ids(&ids)?;
            if ids.is_empty() {
                bail!("No note IDs provided");
            }
            for id in ids {
                report(service.remove(id).await)?;
            }
        }

        Commands::Export { path, dir } => {
            let outcome = match (path, dir) {
                (_, Some(dir)) => service.export_to(BackupFolder::new(dir)).await,
                (Some(path), None) => service.export_to(FileHandle::new(path)).await,
                (None, None) => bail!("Either a file or --dir is required"),
            };
            report(outcome)?;
        }

        Commands::Import { path, replace } => {
            report(service.import_from(FileHandle::new(path), replace).await)?;
        }

        Commands::Watch {
            debounce_ms,
            idle_grace_ms,
        } => {
            let config = PipelineConfig {
                debounce: Duration::from_millis(debounce_ms),
                idle_grace: Duration::from_millis(idle_grace_ms),
            };
            watch(store, config).await?;
        }
    }

    Ok(())
}
