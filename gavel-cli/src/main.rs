use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use gavel_core::{Task, TaskSequence};
use gavel_ingest::{read_agenda_csv, write_agenda_csv};
use std::path::PathBuf;

mod config;
mod run;
mod store;
mod voice;

#[derive(Parser, Debug)]
#[command(
    name = "gavel",
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GAVEL_BUILD_SHA"), ")"),
    about = "Meeting agenda timekeeper"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a task to the end of the agenda
    Add {
        name: String,

        /// Duration in minutes
        minutes: u32,
    },

    /// Show the agenda
    List,

    /// Rewrite the task at POSITION (1-based)
    Edit {
        position: usize,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        minutes: Option<u32>,
    },

    /// Remove the task at POSITION (1-based)
    Remove { position: usize },

    /// Remove every task from the agenda
    Clear {
        /// Skip the confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Print agenda statistics
    Stats,

    /// Import tasks from a CSV file (columns: name, minutes)
    Import {
        #[arg(long)]
        csv: PathBuf,

        /// Drop the current agenda instead of appending
        #[arg(long)]
        replace: bool,
    },

    /// Export the agenda to a CSV file
    Export {
        #[arg(long)]
        csv: PathBuf,
    },

    /// Run the meeting countdown
    Run {
        /// Skip voice narration even if enabled in config
        #[arg(long)]
        mute: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("GAVEL_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Add { name, minutes } => add(name, minutes)?,
        Command::List => list()?,
        Command::Edit {
            position,
            name,
            minutes,
        } => edit(position, name, minutes)?,
        Command::Remove { position } => remove(position)?,
        Command::Clear { yes } => clear(yes)?,
        Command::Stats => stats()?,
        Command::Import { csv, replace } => import(csv, replace)?,
        Command::Export { csv } => export(csv)?,
        Command::Run { mute } => run_meeting(mute).await?,
    }

    Ok(())
}

fn load_sequence() -> Result<TaskSequence> {
    Ok(TaskSequence::from_tasks(store::load_tasks()?))
}

fn save_sequence(seq: &TaskSequence) -> Result<()> {
    store::save_tasks(seq.tasks())
}

fn add(name: String, minutes: u32) -> Result<()> {
    let task = Task::new(name, minutes)?;
    let mut seq = load_sequence()?;
    seq.push(task.clone());
    save_sequence(&seq)?;

    println!(
        "Added '{}' ({} min); {} tasks, {} minutes total.",
        task.name,
        task.minutes,
        seq.len(),
        seq.total_minutes()
    );
    Ok(())
}

fn list() -> Result<()> {
    let seq = load_sequence()?;
    if seq.is_empty() {
        println!("Agenda is empty. Add tasks with: gavel add <name> <minutes>");
        return Ok(());
    }

    for (i, task) in seq.tasks().iter().enumerate() {
        println!("{:>2}. {} ({} min)", i + 1, task.name, task.minutes);
    }
    println!("\n{} tasks, {} minutes total", seq.len(), seq.total_minutes());
    Ok(())
}

fn edit(position: usize, name: Option<String>, minutes: Option<u32>) -> Result<()> {
    if name.is_none() && minutes.is_none() {
        bail!("nothing to change (pass --name and/or --minutes)");
    }

    let mut seq = load_sequence()?;
    let index = position
        .checked_sub(1)
        .context("positions are 1-based (got 0)")?;
    let Some(old) = seq.tasks().get(index).cloned() else {
        bail!("no task at position {position} (agenda has {})", seq.len());
    };

    let task = Task::new(name.unwrap_or(old.name), minutes.unwrap_or(old.minutes))?;
    let _previous = seq.replace(index, task.clone());
    save_sequence(&seq)?;

    println!("Task {position} is now '{}' ({} min).", task.name, task.minutes);
    Ok(())
}

fn remove(position: usize) -> Result<()> {
    let mut seq = load_sequence()?;
    let index = position
        .checked_sub(1)
        .context("positions are 1-based (got 0)")?;
    let Some(removed) = seq.remove(index) else {
        bail!("no task at position {position} (agenda has {})", seq.len());
    };
    save_sequence(&seq)?;

    println!("Removed '{}'; {} tasks remain.", removed.name, seq.len());
    Ok(())
}

fn clear(yes: bool) -> Result<()> {
    let mut seq = load_sequence()?;
    if seq.is_empty() {
        println!("Agenda is already empty.");
        return Ok(());
    }
    if !yes {
        bail!(
            "this removes all {} tasks; re-run with --yes to confirm",
            seq.len()
        );
    }

    seq.clear();
    save_sequence(&seq)?;
    println!("Agenda cleared.");
    Ok(())
}

fn stats() -> Result<()> {
    let seq = load_sequence()?;
    if seq.is_empty() {
        println!("No tasks yet.");
        return Ok(());
    }

    let count = seq.len();
    let total = seq.total_minutes();
    let average = f64::from(total) / count as f64;

    println!("Tasks:            {count}");
    println!("Total time:       {total} min");
    println!("Average task:     {average:.1} min");
    println!("Projected length: {}h {:02}m", total / 60, total % 60);
    Ok(())
}

fn import(csv: PathBuf, replace: bool) -> Result<()> {
    if !csv.exists() {
        bail!("CSV not found: {} (pass --csv <path>)", csv.display());
    }

    let import =
        read_agenda_csv(&csv).with_context(|| format!("importing {}", csv.display()))?;
    for row in &import.skipped {
        println!("line {}: skipped ({})", row.line, row.reason);
    }
    if import.tasks.is_empty() {
        bail!("no importable tasks in {}", csv.display());
    }

    let mut seq = load_sequence()?;
    if replace {
        seq.clear();
    }
    let imported = import.tasks.len();
    for task in import.tasks {
        seq.push(task);
    }
    save_sequence(&seq)?;

    println!(
        "Imported {} tasks ({} skipped); agenda now has {} tasks, {} minutes.",
        imported,
        import.skipped.len(),
        seq.len(),
        seq.total_minutes()
    );
    Ok(())
}

fn export(csv: PathBuf) -> Result<()> {
    let seq = load_sequence()?;
    if seq.is_empty() {
        bail!("nothing to export; the agenda is empty");
    }

    write_agenda_csv(&csv, seq.tasks())
        .with_context(|| format!("exporting to {}", csv.display()))?;
    println!("Exported {} tasks to {}", seq.len(), csv.display());
    Ok(())
}

async fn run_meeting(mute: bool) -> Result<()> {
    let seq = load_sequence()?;
    if seq.is_empty() {
        bail!("agenda is empty; add tasks before running");
    }

    let cfg = config::load_config()?;
    let announcer = voice::VoiceAnnouncer::from_config(&cfg.voice, mute);
    run::run_meeting(seq, announcer).await
}
