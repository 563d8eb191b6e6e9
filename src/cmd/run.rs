//! `docgen run`: execute the plan with live progress and interrupt handling.

use anyhow::{Context, Result};
use docgen::config::Config;
use docgen::interrupt::{FORCE_QUIT_EXIT_CODE, InterruptController, InterruptListener};
use docgen::pipeline::{Pipeline, PipelineOptions, PipelineOutcome, Plan};
use docgen::reporter::Reporter;
use docgen::snapshot::{CheckpointWriter, RestoreOptions, SnapshotCodec};
use docgen::ui::{LogLevel, ProgressDisplay, TerminalDisplay};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;

pub async fn cmd_run(config: &Config, resume: bool, fail_fast: bool) -> Result<ExitCode> {
    config.ensure_directories()?;
    let plan = Plan::load(&config.plan_file)
        .context("No runnable plan. Run `docgen init` to create one")?;

    let display = Arc::new(TerminalDisplay::new(config.ui_mode, config.verbose));
    let mut reporter = Reporter::new(
        config.policy,
        display.clone(),
        InterruptController::new(config.interrupt_debounce),
    );
    let writer = CheckpointWriter::new(&config.checkpoint_file);
    reporter.subscribe(move |event| writer.handle(event));

    if resume {
        let options = RestoreOptions {
            requeue_interrupted: config.requeue_interrupted,
        };
        match SnapshotCodec::load(&config.checkpoint_file) {
            Ok(Some(snapshot)) => {
                reporter.restore(&snapshot, options);
            }
            Ok(None) => reporter.log("No checkpoint found, starting fresh", LogLevel::Info),
            Err(err) => {
                tracing::warn!(error = %err, "ignoring unreadable checkpoint");
                reporter.log(&format!("Checkpoint ignored: {}", err), LogLevel::Warn);
            }
        }
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let quit_display = display.clone();
    let checkpoint_file = config.checkpoint_file.clone();
    let listener = InterruptListener::spawn(
        reporter.interrupt_controller(),
        tx,
        config.listen_escape,
        move || {
            quit_display.cleanup();
            eprintln!("Forced quit. The last checkpoint is at {}", checkpoint_file.display());
            std::process::exit(FORCE_QUIT_EXIT_CODE);
        },
    );

    let pipeline = Pipeline::from_plan(
        &plan,
        &config.project_dir,
        PipelineOptions {
            fail_fast,
            checkpoint: Some(config.checkpoint_file.clone()),
        },
    );
    tracing::info!(tasks = plan.tasks.len(), resume, fail_fast, "run started");

    let outcome = pipeline
        .run(&mut reporter, &mut rx)
        .await
        .context("Run aborted")?;
    // Leave raw mode before the summary is printed
    drop(listener);

    if outcome == PipelineOutcome::Interrupted {
        reporter.log(
            &format!(
                "Progress saved to {}. Resume with `docgen run --resume`",
                config.checkpoint_file.display()
            ),
            LogLevel::Warn,
        );
    }
    let summary = reporter.finish();
    tracing::info!(
        completed = summary.completed.len(),
        failed = summary.failed.len(),
        interrupted = summary.interrupted.len(),
        ?outcome,
        "run finished"
    );

    if outcome == PipelineOutcome::Finished && summary.all_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
