//! Task-lifecycle facade over the registry, event bus, interrupt controller and display.
//!
//! All calls are synchronous and expect a single thread of control. Registry
//! inconsistencies (unknown ids, illegal transitions) are logged as warnings and
//! otherwise ignored; only duplicate registration and force-quit surface as errors.

mod summary;

pub use summary::{FailedTask, InterruptedTask, RunSummary, format_duration};

use crate::errors::TrackerError;
use crate::events::{EventBus, SubscriptionId, TrackerEvent};
use crate::interrupt::{InterruptAction, InterruptController, InterruptSource};
use crate::snapshot::{ProgressSnapshot, RestoreOptions, RestoreReport, SnapshotCodec};
use crate::task::{RegistryPolicy, Task, TaskRegistry, UpdateOutcome};
use crate::ui::{LogLevel, ProgressDisplay, display_subscriber};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub struct Reporter {
    registry: TaskRegistry,
    bus: EventBus,
    interrupts: InterruptController,
    display: Arc<dyn ProgressDisplay>,
    run_id: Uuid,
    started_at: Option<DateTime<Utc>>,
    logs: Vec<String>,
    checkpointed: bool,
}

impl Reporter {
    /// Create a reporter whose display is subscribed to every lifecycle event.
    pub fn new(
        policy: RegistryPolicy,
        display: Arc<dyn ProgressDisplay>,
        interrupts: InterruptController,
    ) -> Self {
        let mut bus = EventBus::new();
        bus.subscribe(display_subscriber(display.clone()));
        Self {
            registry: TaskRegistry::new(policy),
            bus,
            interrupts,
            display,
            run_id: Uuid::new_v4(),
            started_at: None,
            logs: Vec::new(),
            checkpointed: false,
        }
    }

    pub fn subscribe(&mut self, handler: impl FnMut(&TrackerEvent) + Send + 'static) -> SubscriptionId {
        self.bus.subscribe(handler)
    }

    pub fn events(&mut self) -> tokio::sync::mpsc::UnboundedReceiver<TrackerEvent> {
        self.bus.channel()
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.registry.get(id)
    }

    pub fn current_id(&self) -> Option<&str> {
        self.registry.current_id()
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupts.is_interrupted()
    }

    /// Handle on the injected controller; clones share its state.
    pub fn interrupt_controller(&self) -> InterruptController {
        self.interrupts.clone()
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    /// Append a rendered status line to the run log and forward it to the display.
    pub fn log(&mut self, line: &str, level: LogLevel) {
        self.logs
            .push(format!("[{}] {}", Utc::now().format("%H:%M:%S"), line));
        self.display.log(line, level);
    }

    fn recover<T>(&self, result: Result<T, TrackerError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(error = %err, "ignoring task operation");
                None
            }
        }
    }

    fn emit_for(&mut self, id: &str, make: fn(Task) -> TrackerEvent) {
        if let Some(task) = self.registry.get(id) {
            let event = make(task.clone());
            self.bus.emit(event);
        }
    }

    fn mark_started(&mut self, id: &str) {
        if self.started_at.is_none() {
            self.started_at = self.registry.get(id).and_then(|t| t.start_time);
        }
        let name = self
            .registry
            .get(id)
            .map(|t| t.name.clone())
            .unwrap_or_default();
        tracing::info!(task_id = id, "task started");
        self.log(&format!("Started: {}", name), LogLevel::Info);
        self.emit_for(id, |task| TrackerEvent::TaskStart { task });
    }

    pub fn register_task(&mut self, id: &str, name: &str, total: f64) -> Result<(), TrackerError> {
        let task = self.registry.register(id, name, total)?;
        let total = task.total;
        self.display.create_progress_bar(id, name, total);
        tracing::debug!(task_id = id, total, "task registered");
        Ok(())
    }

    /// Start a pending task. Returns false (after logging) if it could not be started.
    pub fn start_task(&mut self, id: &str) -> bool {
        let started = self.registry.start(id).map(|_| ());
        if self.recover(started).is_none() {
            return false;
        }
        self.mark_started(id);
        true
    }

    /// Start the first pending task in registration order.
    pub fn start_next_pending(&mut self) -> Option<String> {
        let next = self.registry.start_next_pending()?;
        self.mark_started(&next);
        Some(next)
    }

    pub fn update_task(
        &mut self,
        id: &str,
        progress: f64,
        message: Option<&str>,
        details: Option<Vec<String>>,
    ) -> bool {
        let updated = self.registry.update(id, progress, message, details);
        match self.recover(updated) {
            Some(UpdateOutcome::AutoRegistered) => {
                if let Some(task) = self.registry.get(id) {
                    self.display
                        .create_progress_bar(id, &task.name.clone(), task.total);
                }
                self.mark_started(id);
            }
            Some(UpdateOutcome::Updated) => {}
            None => return false,
        }
        self.emit_for(id, |task| TrackerEvent::TaskUpdate { task });
        true
    }

    /// Complete a running task, then auto-start the next pending one.
    pub fn complete_task(&mut self, id: &str, message: Option<&str>) -> bool {
        let completed = self.registry.complete(id, message);
        let Some(next) = self.recover(completed) else {
            return false;
        };
        let name = self.registry.get(id).map(|t| t.name.clone()).unwrap_or_default();
        tracing::info!(task_id = id, "task completed");
        self.log(&format!("Completed: {}", name), LogLevel::Info);
        self.emit_for(id, |task| TrackerEvent::TaskComplete { task });
        if let Some(next) = next {
            self.mark_started(&next);
        }
        true
    }

    /// Record a work-unit failure. Does not advance to the next task.
    pub fn fail_task(&mut self, id: &str, error: &str, details: Option<Vec<String>>) -> bool {
        let failed = self.registry.fail(id, error, details);
        if self.recover(failed).is_none() {
            return false;
        }
        let name = self.registry.get(id).map(|t| t.name.clone()).unwrap_or_default();
        tracing::warn!(task_id = id, error, "task failed");
        self.log(&format!("Failed: {}: {}", name, error), LogLevel::Error);
        self.emit_for(id, |task| TrackerEvent::TaskFail { task });
        true
    }

    pub fn add_subtask(&mut self, parent_id: &str, sub_id: &str, name: &str, total: f64) -> bool {
        let added = self.registry.add_subtask(parent_id, sub_id, name, total);
        self.recover(added).is_some()
    }

    /// Update a subtask; the parent's aggregated progress is published as a `task-update`.
    pub fn update_subtask(
        &mut self,
        parent_id: &str,
        sub_id: &str,
        progress: f64,
        message: Option<&str>,
        details: Option<Vec<String>>,
    ) -> bool {
        let updated = self
            .registry
            .update_subtask(parent_id, sub_id, progress, message, details);
        if self.recover(updated).is_none() {
            return false;
        }
        self.emit_for(parent_id, |task| TrackerEvent::TaskUpdate { task });
        true
    }

    pub fn complete_subtask(&mut self, parent_id: &str, sub_id: &str, message: Option<&str>) -> bool {
        let completed = self.registry.complete_subtask(parent_id, sub_id, message);
        if self.recover(completed).is_none() {
            return false;
        }
        self.emit_for(parent_id, |task| TrackerEvent::TaskUpdate { task });
        true
    }

    /// React to an interrupt signal.
    ///
    /// The first signal interrupts the current task and emits exactly one
    /// `interrupt` then one `save-progress` event. A repeated signal returns
    /// [`TrackerError::ForceQuit`]; the caller must terminate without further
    /// checkpointing.
    pub fn handle_interrupt(&mut self, source: InterruptSource) -> Result<InterruptAction, TrackerError> {
        match self.interrupts.signal(source) {
            InterruptAction::Checkpoint => {
                self.checkpoint(source);
                Ok(InterruptAction::Checkpoint)
            }
            InterruptAction::Coalesced => {
                tracing::debug!(%source, "duplicate interrupt coalesced");
                Ok(InterruptAction::Coalesced)
            }
            InterruptAction::ForceQuit => {
                tracing::error!(%source, "repeated interrupt, forcing termination");
                Err(TrackerError::ForceQuit)
            }
        }
    }

    /// Interrupt the current task and emit the checkpoint events.
    ///
    /// For signals the controller has already classified as
    /// [`InterruptAction::Checkpoint`] (see [`InterruptListener`]). Runs at most
    /// once per reporter; later calls are ignored.
    ///
    /// [`InterruptListener`]: crate::interrupt::InterruptListener
    pub fn checkpoint(&mut self, source: InterruptSource) {
        if self.checkpointed {
            tracing::debug!(%source, "checkpoint already taken");
            return;
        }
        self.checkpointed = true;
        if !self.interrupts.is_interrupted() {
            self.interrupts.signal(source);
        }

        let interrupted = self.registry.interrupt_current();
        let task = interrupted
            .as_deref()
            .and_then(|id| self.registry.get(id))
            .cloned();
        tracing::warn!(%source, task_id = ?interrupted, "interrupt received, saving progress");
        let line = match &task {
            Some(task) => format!(
                "Interrupted: {} at {}% ({})",
                task.name,
                task.percentage(),
                source
            ),
            None => format!("Interrupted by {}", source),
        };
        self.log(&line, LogLevel::Warn);
        self.bus.emit(TrackerEvent::Interrupt { task });

        let snapshot = self.snapshot();
        self.bus.emit(TrackerEvent::SaveProgress {
            snapshot: Box::new(snapshot),
        });
        self.log("Progress saved. Interrupt again to force quit.", LogLevel::Warn);
    }

    /// Export the current state.
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::capture(
            &self.registry,
            self.run_id,
            self.started_at,
            self.interrupts.is_interrupted(),
            &self.logs,
        )
    }

    /// Restore a previously captured snapshot into this reporter.
    pub fn restore(&mut self, snapshot: &ProgressSnapshot, options: RestoreOptions) -> RestoreReport {
        let report = SnapshotCodec::restore(&mut self.registry, snapshot, options);
        if let Some(run_id) = snapshot.run_id {
            self.run_id = run_id;
        }
        // Duration is measured from this run's first start, not the checkpoint's
        let mut logs = snapshot.logs.clone();
        logs.append(&mut self.logs);
        self.logs = logs;

        for task in &snapshot.tasks {
            if let Some(restored) = self.registry.get(&task.id) {
                self.display
                    .create_progress_bar(&restored.id, &restored.name, restored.total);
                if restored.progress > 0.0 {
                    self.display.update_progress_bar(
                        &restored.id,
                        restored.progress,
                        Some(&restored.status.to_string()),
                    );
                }
            }
        }
        self.log(
            &format!(
                "Restored {} task(s) from checkpoint ({} restarted, {} requeued)",
                report.restored,
                report.downgraded.len(),
                report.requeued.len()
            ),
            LogLevel::Info,
        );
        report
    }

    /// Decode and restore a raw JSON snapshot. Malformed input restores nothing.
    pub fn restore_json(&mut self, raw: &str, options: RestoreOptions) -> Option<RestoreReport> {
        let decoded = SnapshotCodec::decode(raw);
        match decoded {
            Ok(snapshot) => Some(self.restore(&snapshot, options)),
            Err(err) => {
                tracing::warn!(error = %err, "nothing to restore");
                self.log(&format!("Checkpoint ignored: {}", err), LogLevel::Warn);
                None
            }
        }
    }

    /// Summarize top-level tasks with the duration measured up to `now`.
    pub fn summary_at(&self, now: DateTime<Utc>) -> RunSummary {
        let duration = self
            .started_at
            .and_then(|start| (now - start).to_std().ok())
            .unwrap_or_default();
        RunSummary::from_tasks(self.registry.tasks(), duration)
    }

    pub fn summary(&self) -> RunSummary {
        self.summary_at(Utc::now())
    }

    /// Hand the summary to the display and release it.
    pub fn finish(&mut self) -> RunSummary {
        let summary = self.summary();
        self.display.show_summary(&summary);
        self.display.cleanup();
        summary
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("run_id", &self.run_id)
            .field("tasks", &self.registry.len())
            .field("current", &self.registry.current_id())
            .field("interrupted", &self.interrupts.is_interrupted())
            .finish()
    }
}
