//! Checkpoint inspection and reset commands.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use console::style;
use docgen::config::Config;
use docgen::reporter::RunSummary;
use docgen::snapshot::{ProgressSnapshot, SnapshotCodec};
use docgen::task::{Task, TaskStatus};
use docgen::ui::UiMode;
use docgen::ui::icons::SAVE;

fn status_label(status: TaskStatus) -> String {
    let label = format!("{:<11}", status.to_string());
    match status {
        TaskStatus::Completed => style(label).green().to_string(),
        TaskStatus::Failed => style(label).red().to_string(),
        TaskStatus::Interrupted => style(label).yellow().to_string(),
        TaskStatus::Running => style(label).cyan().to_string(),
        TaskStatus::Pending => style(label).dim().to_string(),
    }
}

/// Time from the run's start to the last recorded end time.
fn recorded_duration(snapshot: &ProgressSnapshot) -> std::time::Duration {
    let end: Option<DateTime<Utc>> = snapshot.tasks.iter().filter_map(|t| t.end_time).max();
    match (snapshot.start_time, end) {
        (Some(start), Some(end)) => (end - start).to_std().unwrap_or_default(),
        _ => std::time::Duration::ZERO,
    }
}

fn print_task(task: &Task, indent: usize) {
    let message = if task.message.is_empty() {
        String::new()
    } else {
        style(&task.message).dim().to_string()
    };
    println!(
        "{:indent$}{:<20} {} {:>3}%  {}",
        "",
        task.name,
        status_label(task.status),
        task.percentage(),
        message,
        indent = indent
    );
}

pub fn cmd_status(config: &Config) -> Result<()> {
    let Some(snapshot) = SnapshotCodec::load(&config.checkpoint_file)
        .with_context(|| format!("Failed to read {}", config.checkpoint_file.display()))?
    else {
        println!();
        println!("No checkpoint found. Run `docgen run` to start.");
        println!();
        return Ok(());
    };

    if config.ui_mode == UiMode::Json {
        println!("{}", SnapshotCodec::encode(&snapshot)?);
        return Ok(());
    }

    println!();
    println!("{}Checkpoint: {}", SAVE, config.checkpoint_file.display());
    if let Some(run_id) = snapshot.run_id {
        println!("Run:        {}", run_id);
    }
    if let Some(start) = snapshot.start_time {
        println!("Started:    {}", start.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if snapshot.interrupted {
        println!("{}", style("Interrupted; resume with `docgen run --resume`").yellow());
    }
    println!();
    println!("{:<20} {:<11} {:>4}  Message", "Task", "Status", "Done");
    println!("{:<20} {:<11} {:>4}  -------", "-".repeat(20), "-".repeat(11), "----");
    for task in &snapshot.tasks {
        print_task(task, 0);
        for sub in &task.subtasks {
            print_task(sub, 2);
        }
    }

    println!();
    let summary = RunSummary::from_tasks(&snapshot.tasks, recorded_duration(&snapshot));
    for line in summary.lines() {
        println!("{}", line);
    }
    println!();
    Ok(())
}

pub fn cmd_reset(config: &Config, force: bool) -> Result<()> {
    use dialoguer::Confirm;

    if !config.checkpoint_file.exists() {
        println!("Nothing to reset");
        return Ok(());
    }

    if !force {
        let confirm = Confirm::new()
            .with_prompt("This will discard all saved progress. Are you sure?")
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Reset cancelled");
            return Ok(());
        }
    }

    std::fs::remove_file(&config.checkpoint_file)
        .with_context(|| format!("Failed to remove {}", config.checkpoint_file.display()))?;
    tracing::info!(path = %config.checkpoint_file.display(), "checkpoint removed");
    println!("Reset complete");
    Ok(())
}
