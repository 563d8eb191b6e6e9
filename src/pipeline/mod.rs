//! Drives a plan's work units through the [`Reporter`].
//!
//! The pipeline is the single consumer of the interrupt channel, so every
//! registry mutation (including the checkpoint) happens on its thread of
//! control. Messages on that channel are checkpoint requests already
//! classified by the [`InterruptController`](crate::interrupt::InterruptController);
//! force-quit never reaches the pipeline.

pub mod plan;
pub mod unit;

pub use plan::{Plan, PlanStep, PlanTask};
pub use unit::{CommandUnit, WorkSender, WorkUnit, WorkUpdate, parse_progress};

use crate::errors::TrackerError;
use crate::interrupt::InterruptSource;
use crate::reporter::Reporter;
use crate::snapshot::SnapshotCodec;
use crate::task::{DEFAULT_TOTAL, TaskStatus};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Output lines kept as a failed task's details.
const DETAIL_LINES: usize = 3;

/// One subtask of a [`Job`].
pub struct Step {
    pub id: String,
    pub name: String,
    pub unit: Box<dyn WorkUnit>,
}

pub enum JobWork {
    Single(Box<dyn WorkUnit>),
    Steps(Vec<Step>),
}

/// A task together with the work that drives it.
pub struct Job {
    pub id: String,
    pub name: String,
    pub total: f64,
    pub work: JobWork,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Stop after the first failed task instead of moving on
    pub fail_fast: bool,
    /// Where to persist a snapshot after each terminal transition
    pub checkpoint: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// No runnable task is left (or fail-fast stopped the run)
    Finished,
    /// An interrupt checkpointed the run
    Interrupted,
}

enum Execution {
    Done(anyhow::Result<String>),
    Interrupted,
}

/// Rolling tail of a unit's output.
#[derive(Default)]
struct OutputTail {
    lines: VecDeque<String>,
}

impl OutputTail {
    fn push(&mut self, line: String) {
        if self.lines.len() == DETAIL_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn details(&self) -> Option<Vec<String>> {
        (!self.lines.is_empty()).then(|| self.lines.iter().cloned().collect())
    }
}

pub struct Pipeline {
    jobs: Vec<Job>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(jobs: Vec<Job>, options: PipelineOptions) -> Self {
        Self { jobs, options }
    }

    /// Build shell-command jobs from a plan. Commands run in `working_dir`.
    pub fn from_plan(plan: &Plan, working_dir: &Path, options: PipelineOptions) -> Self {
        let jobs = plan
            .tasks
            .iter()
            .map(|task| {
                let work = match &task.command {
                    Some(command) => JobWork::Single(Box::new(CommandUnit::new(command, working_dir))),
                    None => JobWork::Steps(
                        task.steps
                            .iter()
                            .map(|step| Step {
                                id: step.id.clone(),
                                name: step.name.clone(),
                                unit: Box::new(CommandUnit::new(&step.command, working_dir)),
                            })
                            .collect(),
                    ),
                };
                Job {
                    id: task.id.clone(),
                    name: task.name.clone(),
                    total: task.total.unwrap_or(DEFAULT_TOTAL),
                    work,
                }
            })
            .collect();
        Self::new(jobs, options)
    }

    /// Run every pending task in registration order.
    ///
    /// Tasks already known to the reporter (restored from a checkpoint) are not
    /// registered again; completed and failed ones are skipped. The first
    /// message on `interrupts` checkpoints the run and ends it.
    pub async fn run(
        self,
        reporter: &mut Reporter,
        interrupts: &mut mpsc::UnboundedReceiver<InterruptSource>,
    ) -> Result<PipelineOutcome, TrackerError> {
        let Pipeline { jobs, options } = self;
        let mut pending: HashMap<String, Job> = HashMap::new();
        for job in jobs {
            if reporter.task(&job.id).is_none() {
                reporter.register_task(&job.id, &job.name, job.total)?;
                if let JobWork::Steps(steps) = &job.work {
                    for step in steps {
                        reporter.add_subtask(&job.id, &step.id, &step.name, DEFAULT_TOTAL);
                    }
                }
            }
            pending.insert(job.id.clone(), job);
        }

        let mut current = match reporter.current_id() {
            Some(id) => Some(id.to_string()),
            None => reporter.start_next_pending(),
        };

        while let Some(id) = current.take() {
            let Some(job) = pending.remove(&id) else {
                reporter.fail_task(&id, "no work defined for this task", None);
                persist(reporter, &options);
                current = reporter.start_next_pending();
                continue;
            };

            let succeeded = match job.work {
                JobWork::Single(unit) => run_single(reporter, interrupts, &id, unit).await,
                JobWork::Steps(steps) => run_steps(reporter, interrupts, &id, steps).await,
            };
            let Some(succeeded) = succeeded else {
                return Ok(PipelineOutcome::Interrupted);
            };
            persist(reporter, &options);

            current = if succeeded {
                reporter.current_id().map(str::to_string)
            } else if options.fail_fast {
                tracing::info!(task_id = %id, "stopping after failure");
                None
            } else {
                reporter.start_next_pending()
            };
        }
        Ok(PipelineOutcome::Finished)
    }
}

fn persist(reporter: &Reporter, options: &PipelineOptions) {
    if let Some(path) = &options.checkpoint
        && let Err(err) = SnapshotCodec::save(path, &reporter.snapshot())
    {
        tracing::error!(path = %path.display(), error = %err, "failed to persist progress");
    }
}

/// Run a single-unit task to a terminal status. `None` means interrupted.
async fn run_single(
    reporter: &mut Reporter,
    interrupts: &mut mpsc::UnboundedReceiver<InterruptSource>,
    id: &str,
    unit: Box<dyn WorkUnit>,
) -> Option<bool> {
    let mut tail = OutputTail::default();
    let execution = execute(reporter, interrupts, unit, |reporter, update| {
        let Some(task) = reporter.task(id) else {
            return;
        };
        match update {
            WorkUpdate::Progress(fraction) => {
                let progress = fraction * task.total;
                reporter.update_task(id, progress, None, None);
            }
            WorkUpdate::Chunk(line) => {
                let progress = task.progress;
                tail.push(line.clone());
                reporter.update_task(id, progress, Some(&line), tail.details());
            }
        }
    })
    .await;

    match execution {
        Execution::Interrupted => None,
        Execution::Done(Ok(message)) => {
            let message = (!message.is_empty()).then_some(message.as_str());
            Some(reporter.complete_task(id, message))
        }
        Execution::Done(Err(err)) => {
            reporter.fail_task(id, &format!("{:#}", err), tail.details());
            Some(false)
        }
    }
}

/// Run a task's steps in order as subtasks, skipping steps completed in an
/// earlier run. `None` means interrupted.
async fn run_steps(
    reporter: &mut Reporter,
    interrupts: &mut mpsc::UnboundedReceiver<InterruptSource>,
    id: &str,
    steps: Vec<Step>,
) -> Option<bool> {
    for step in steps {
        let done = reporter
            .task(id)
            .and_then(|task| task.subtask(&step.id))
            .is_some_and(|sub| sub.status == TaskStatus::Completed);
        if done {
            tracing::debug!(task_id = id, step = %step.id, "step already completed");
            continue;
        }

        let sub_id = step.id.as_str();
        let mut tail = OutputTail::default();
        let execution = execute(reporter, interrupts, step.unit, |reporter, update| {
            let Some(sub) = reporter.task(id).and_then(|task| task.subtask(sub_id)) else {
                return;
            };
            match update {
                WorkUpdate::Progress(fraction) => {
                    let progress = fraction * sub.total;
                    reporter.update_subtask(id, sub_id, progress, None, None);
                }
                WorkUpdate::Chunk(line) => {
                    let progress = sub.progress;
                    tail.push(line.clone());
                    reporter.update_subtask(id, sub_id, progress, Some(&line), tail.details());
                }
            }
        })
        .await;

        match execution {
            Execution::Interrupted => return None,
            Execution::Done(Ok(message)) => {
                let message = (!message.is_empty()).then_some(message.as_str());
                reporter.complete_subtask(id, sub_id, message);
            }
            Execution::Done(Err(err)) => {
                let error = format!("{}: {:#}", step.name, err);
                reporter.fail_task(id, &error, tail.details());
                return Some(false);
            }
        }
    }
    Some(reporter.complete_task(id, None))
}

/// Spawn `unit` and relay its updates until it finishes or an interrupt
/// checkpoints the run, in which case the unit's task is aborted first.
async fn execute(
    reporter: &mut Reporter,
    interrupts: &mut mpsc::UnboundedReceiver<InterruptSource>,
    mut unit: Box<dyn WorkUnit>,
    mut on_update: impl FnMut(&mut Reporter, WorkUpdate),
) -> Execution {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut handle = tokio::spawn(async move { unit.run(tx).await });
    let mut signals_open = true;

    loop {
        tokio::select! {
            biased;

            signal = interrupts.recv(), if signals_open => {
                let Some(source) = signal else {
                    signals_open = false;
                    continue;
                };
                handle.abort();
                reporter.checkpoint(source);
                return Execution::Interrupted;
            }
            Some(update) = rx.recv() => on_update(reporter, update),
            joined = &mut handle => {
                while let Ok(update) = rx.try_recv() {
                    on_update(reporter, update);
                }
                let result = joined
                    .unwrap_or_else(|err| Err(anyhow::anyhow!("work unit panicked: {}", err)));
                return Execution::Done(result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, TrackerEvent};
    use crate::interrupt::InterruptController;
    use crate::snapshot::RestoreOptions;
    use crate::task::{RegistryPolicy, Task};
    use crate::ui::display::testing::RecordingDisplay;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Sends canned updates, then finishes with a canned result.
    struct ScriptedUnit {
        updates: Vec<WorkUpdate>,
        result: Result<String, String>,
        hang: bool,
    }

    #[async_trait]
    impl WorkUnit for ScriptedUnit {
        async fn run(&mut self, tx: WorkSender) -> anyhow::Result<String> {
            for update in self.updates.drain(..) {
                let _ = tx.send(update);
            }
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.result.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    fn ok_unit(updates: Vec<WorkUpdate>) -> Box<dyn WorkUnit> {
        Box::new(ScriptedUnit {
            updates,
            result: Ok(String::new()),
            hang: false,
        })
    }

    fn failing_unit(lines: &[&str], error: &str) -> Box<dyn WorkUnit> {
        Box::new(ScriptedUnit {
            updates: lines.iter().map(|l| WorkUpdate::Chunk(l.to_string())).collect(),
            result: Err(error.to_string()),
            hang: false,
        })
    }

    fn job(id: &str, unit: Box<dyn WorkUnit>) -> Job {
        Job {
            id: id.into(),
            name: id.to_uppercase(),
            total: 100.0,
            work: JobWork::Single(unit),
        }
    }

    fn reporter() -> Reporter {
        Reporter::new(
            RegistryPolicy::default(),
            Arc::new(RecordingDisplay::default()),
            InterruptController::new(Duration::from_millis(300)),
        )
    }

    fn record_events(reporter: &mut Reporter) -> Arc<Mutex<Vec<TrackerEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        reporter.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        events
    }

    #[tokio::test]
    async fn test_runs_jobs_in_order() {
        let mut reporter = reporter();
        let events = record_events(&mut reporter);
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = Pipeline::new(
            vec![
                job("a", ok_unit(vec![WorkUpdate::Progress(0.5)])),
                job("b", ok_unit(vec![WorkUpdate::Chunk("hello".into())])),
            ],
            PipelineOptions::default(),
        );

        let outcome = pipeline.run(&mut reporter, &mut rx).await.unwrap();
        assert_eq!(outcome, PipelineOutcome::Finished);
        assert_eq!(reporter.task("a").unwrap().status, TaskStatus::Completed);
        assert_eq!(reporter.task("b").unwrap().status, TaskStatus::Completed);

        let kinds: Vec<EventKind> = events.lock().unwrap().iter().map(TrackerEvent::kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::TaskStart,
                EventKind::TaskUpdate,
                EventKind::TaskComplete,
                EventKind::TaskStart,
                EventKind::TaskUpdate,
                EventKind::TaskComplete,
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_continues_with_details() {
        let mut reporter = reporter();
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = Pipeline::new(
            vec![
                job("a", failing_unit(&["one", "two", "three", "four"], "disk full")),
                job("b", ok_unit(vec![])),
            ],
            PipelineOptions::default(),
        );

        pipeline.run(&mut reporter, &mut rx).await.unwrap();
        let a = reporter.task("a").unwrap();
        assert_eq!(a.status, TaskStatus::Failed);
        assert_eq!(a.message, "disk full");
        assert_eq!(a.details, vec!["two", "three", "four"]);
        assert_eq!(reporter.task("b").unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_fail_fast_stops() {
        let mut reporter = reporter();
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = Pipeline::new(
            vec![job("a", failing_unit(&[], "boom")), job("b", ok_unit(vec![]))],
            PipelineOptions {
                fail_fast: true,
                ..Default::default()
            },
        );

        pipeline.run(&mut reporter, &mut rx).await.unwrap();
        assert_eq!(reporter.task("b").unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_steps_aggregate_into_parent() {
        let mut reporter = reporter();
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = Pipeline::new(
            vec![Job {
                id: "guide".into(),
                name: "Guide".into(),
                total: 100.0,
                work: JobWork::Steps(vec![
                    Step {
                        id: "outline".into(),
                        name: "Outline".into(),
                        unit: ok_unit(vec![WorkUpdate::Progress(0.4)]),
                    },
                    Step {
                        id: "render".into(),
                        name: "Render".into(),
                        unit: failing_unit(&["rendering"], "missing font"),
                    },
                ]),
            }],
            PipelineOptions::default(),
        );

        pipeline.run(&mut reporter, &mut rx).await.unwrap();
        let guide = reporter.task("guide").unwrap();
        assert_eq!(guide.status, TaskStatus::Failed);
        assert_eq!(guide.message, "Render: missing font");
        assert_eq!(guide.subtask("outline").unwrap().status, TaskStatus::Completed);
        assert_eq!(guide.subtask("render").unwrap().status, TaskStatus::Running);
        // (100 + 0) / 2
        assert!((guide.progress - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_interrupt_aborts_unit_and_checkpoints() {
        let mut reporter = reporter();
        let events = record_events(&mut reporter);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let hanging = Box::new(ScriptedUnit {
            updates: vec![WorkUpdate::Progress(0.4)],
            result: Ok(String::new()),
            hang: true,
        });
        let pipeline = Pipeline::new(
            vec![job("a", hanging), job("b", ok_unit(vec![]))],
            PipelineOptions::default(),
        );

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(InterruptSource::CtrlC);
        });

        let outcome = pipeline.run(&mut reporter, &mut rx).await.unwrap();
        assert_eq!(outcome, PipelineOutcome::Interrupted);
        let a = reporter.task("a").unwrap();
        assert_eq!(a.status, TaskStatus::Interrupted);
        assert_eq!(a.progress, 40.0);
        assert_eq!(reporter.task("b").unwrap().status, TaskStatus::Pending);

        let events = events.lock().unwrap();
        let saves = events
            .iter()
            .filter(|e| e.kind() == EventKind::SaveProgress)
            .count();
        assert_eq!(saves, 1);
    }

    /// Sends canned updates, then waits for the test to release it.
    struct GatedUnit {
        updates: Vec<WorkUpdate>,
        release: Option<tokio::sync::oneshot::Receiver<()>>,
    }

    #[async_trait]
    impl WorkUnit for GatedUnit {
        async fn run(&mut self, tx: WorkSender) -> anyhow::Result<String> {
            for update in self.updates.drain(..) {
                let _ = tx.send(update);
            }
            if let Some(release) = self.release.take() {
                let _ = release.await;
            }
            Ok(String::new())
        }
    }

    fn hanging_unit(updates: Vec<WorkUpdate>) -> Box<dyn WorkUnit> {
        Box::new(ScriptedUnit {
            updates,
            result: Ok(String::new()),
            hang: true,
        })
    }

    fn guide_job(outline: Box<dyn WorkUnit>, render: Box<dyn WorkUnit>) -> Job {
        Job {
            id: "guide".into(),
            name: "Guide".into(),
            total: 100.0,
            work: JobWork::Steps(vec![
                Step {
                    id: "outline".into(),
                    name: "Outline".into(),
                    unit: outline,
                },
                Step {
                    id: "render".into(),
                    name: "Render".into(),
                    unit: render,
                },
            ]),
        }
    }

    #[tokio::test]
    async fn test_chunks_set_details_while_running() {
        let mut reporter = reporter();
        let events = record_events(&mut reporter);
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel();
        let unit = Box::new(GatedUnit {
            updates: ["one", "two", "three", "four"]
                .iter()
                .map(|l| WorkUpdate::Chunk(l.to_string()))
                .collect(),
            release: Some(release_rx),
        });
        let pipeline = Pipeline::new(vec![job("a", unit)], PipelineOptions::default());

        let watcher = events.clone();
        tokio::spawn(async move {
            loop {
                let updates = watcher
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|e| e.kind() == EventKind::TaskUpdate)
                    .count();
                if updates == 4 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            let _ = release_tx.send(());
        });
        pipeline.run(&mut reporter, &mut rx).await.unwrap();

        let events = events.lock().unwrap();
        let running: Vec<&Task> = events
            .iter()
            .filter(|e| e.kind() == EventKind::TaskUpdate)
            .filter_map(TrackerEvent::task)
            .collect();
        assert_eq!(running[0].details, vec!["one"]);
        let last = running.last().unwrap();
        assert_eq!(last.status, TaskStatus::Running);
        assert_eq!(last.message, "four");
        assert_eq!(last.details, vec!["two", "three", "four"]);
    }

    #[tokio::test]
    async fn test_step_chunks_set_parent_details() {
        let mut reporter = reporter();
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = Pipeline::new(
            vec![guide_job(
                ok_unit(vec![WorkUpdate::Chunk("drafting".into())]),
                ok_unit(vec![]),
            )],
            PipelineOptions::default(),
        );
        pipeline.run(&mut reporter, &mut rx).await.unwrap();
        let guide = reporter.task("guide").unwrap();
        assert_eq!(guide.details, vec!["drafting"]);
        assert_eq!(guide.subtask("outline").unwrap().details, vec!["drafting"]);
    }

    #[tokio::test]
    async fn test_repeated_requests_checkpoint_once() {
        let mut reporter = reporter();
        let events = record_events(&mut reporter);
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(InterruptSource::CtrlC).unwrap();
        tx.send(InterruptSource::Escape).unwrap();
        let pipeline = Pipeline::new(
            vec![job("a", hanging_unit(vec![]))],
            PipelineOptions::default(),
        );

        let outcome = pipeline.run(&mut reporter, &mut rx).await.unwrap();
        assert_eq!(outcome, PipelineOutcome::Interrupted);
        let saves = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind() == EventKind::SaveProgress)
            .count();
        assert_eq!(saves, 1);
        assert!(reporter.is_interrupted());
    }

    #[tokio::test]
    async fn test_interrupted_steps_resume_after_requeue() {
        let mut first = reporter();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = Pipeline::new(
            vec![
                guide_job(
                    ok_unit(vec![WorkUpdate::Progress(0.5)]),
                    hanging_unit(vec![WorkUpdate::Progress(0.3)]),
                ),
                job("api", ok_unit(vec![])),
            ],
            PipelineOptions::default(),
        );
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(InterruptSource::CtrlC);
        });
        let outcome = pipeline.run(&mut first, &mut rx).await.unwrap();
        assert_eq!(outcome, PipelineOutcome::Interrupted);

        let snapshot = first.snapshot();
        assert!(snapshot.interrupted);
        let guide = snapshot.task("guide").unwrap();
        assert_eq!(guide.status, TaskStatus::Interrupted);
        assert_eq!(guide.subtask("outline").unwrap().status, TaskStatus::Completed);
        assert_eq!(guide.subtask("render").unwrap().status, TaskStatus::Running);
        // (100 + 30) / 2
        assert!((guide.progress - 65.0).abs() < 1e-9);

        let mut second = reporter();
        let report = second.restore(
            &snapshot,
            RestoreOptions {
                requeue_interrupted: true,
            },
        );
        assert_eq!(report.requeued, vec!["guide".to_string()]);
        let restored = second.task("guide").unwrap();
        assert_eq!(restored.status, TaskStatus::Pending);
        assert!((restored.progress - 65.0).abs() < 1e-9);
        let render = restored.subtask("render").unwrap();
        assert_eq!(render.status, TaskStatus::Pending);
        assert_eq!(render.progress, 30.0);

        let (_tx, mut rx) = mpsc::unbounded_channel();
        let outcome = Pipeline::new(
            vec![
                guide_job(failing_unit(&[], "outline ran twice"), ok_unit(vec![])),
                job("api", ok_unit(vec![])),
            ],
            PipelineOptions::default(),
        )
        .run(&mut second, &mut rx)
        .await
        .unwrap();

        assert_eq!(outcome, PipelineOutcome::Finished);
        let guide = second.task("guide").unwrap();
        assert_eq!(guide.status, TaskStatus::Completed);
        assert_eq!(guide.subtask("render").unwrap().status, TaskStatus::Completed);
        assert_eq!(second.task("api").unwrap().status, TaskStatus::Completed);
        assert!(second.summary().all_success());
    }

    #[tokio::test]
    async fn test_interrupted_task_stays_interrupted_without_requeue() {
        let mut first = reporter();
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(InterruptSource::CtrlC).unwrap();
        Pipeline::new(
            vec![job("a", hanging_unit(vec![])), job("b", ok_unit(vec![]))],
            PipelineOptions::default(),
        )
        .run(&mut first, &mut rx)
        .await
        .unwrap();

        let mut second = reporter();
        second.restore(&first.snapshot(), RestoreOptions::default());
        let (_tx, mut rx) = mpsc::unbounded_channel();
        Pipeline::new(
            vec![job("a", failing_unit(&[], "must not run")), job("b", ok_unit(vec![]))],
            PipelineOptions::default(),
        )
        .run(&mut second, &mut rx)
        .await
        .unwrap();
        assert_eq!(second.task("a").unwrap().status, TaskStatus::Interrupted);
        assert_eq!(second.task("b").unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_persists_after_terminal_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let mut reporter = reporter();
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = Pipeline::new(
            vec![job("a", ok_unit(vec![])), job("b", failing_unit(&[], "boom"))],
            PipelineOptions {
                checkpoint: Some(path.clone()),
                ..Default::default()
            },
        );

        pipeline.run(&mut reporter, &mut rx).await.unwrap();
        let saved = SnapshotCodec::load(&path).unwrap().unwrap();
        assert_eq!(saved.task("a").unwrap().status, TaskStatus::Completed);
        assert_eq!(saved.task("b").unwrap().status, TaskStatus::Failed);
        assert!(!saved.interrupted);
    }

    #[tokio::test]
    async fn test_resume_skips_finished_work() {
        let mut first = reporter();
        let (_tx, mut rx) = mpsc::unbounded_channel();
        Pipeline::new(
            vec![job("a", ok_unit(vec![])), job("b", failing_unit(&[], "boom"))],
            PipelineOptions::default(),
        )
        .run(&mut first, &mut rx)
        .await
        .unwrap();
        let snapshot = first.snapshot();

        let mut second = reporter();
        second.restore(&snapshot, RestoreOptions::default());
        let events = record_events(&mut second);
        let outcome = Pipeline::new(
            vec![
                job("a", failing_unit(&[], "must not run")),
                job("b", failing_unit(&[], "must not run")),
                job("c", ok_unit(vec![])),
            ],
            PipelineOptions::default(),
        )
        .run(&mut second, &mut rx)
        .await
        .unwrap();

        assert_eq!(outcome, PipelineOutcome::Finished);
        assert_eq!(second.task("a").unwrap().status, TaskStatus::Completed);
        assert_eq!(second.task("b").unwrap().message, "boom");
        assert_eq!(second.task("c").unwrap().status, TaskStatus::Completed);
        let started: Vec<String> = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind() == EventKind::TaskStart)
            .filter_map(|e| e.task().map(|t| t.id.clone()))
            .collect();
        assert_eq!(started, vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn test_from_plan_runs_shell_commands() {
        let dir = tempfile::tempdir().unwrap();
        let plan = Plan::parse(
            r#"
[[tasks]]
id = "api"
name = "API"
command = "echo '<progress>50</progress>'; echo generated"
"#,
        )
        .unwrap();
        let mut reporter = reporter();
        let (_tx, mut rx) = mpsc::unbounded_channel();
        Pipeline::from_plan(&plan, dir.path(), PipelineOptions::default())
            .run(&mut reporter, &mut rx)
            .await
            .unwrap();
        let api = reporter.task("api").unwrap();
        assert_eq!(api.status, TaskStatus::Completed);
        assert_eq!(api.message, "generated");
    }
}
