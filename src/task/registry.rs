use super::{Task, TaskStatus, aggregate};
use crate::errors::TrackerError;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// What `register` does with an id that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Refuse with [`TrackerError::DuplicateTask`]
    #[default]
    Reject,
    /// Replace the existing task with a fresh pending one
    Reset,
}

/// What `update` does with an id that was never registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownTaskPolicy {
    /// Report [`TrackerError::UnknownTask`] and change nothing
    #[default]
    Ignore,
    /// Register the id with the default total, start it, then apply the update
    AutoRegister,
}

/// Registry behaviour for the two inputs with more than one sensible answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistryPolicy {
    #[serde(default)]
    pub duplicate: DuplicatePolicy,
    #[serde(default)]
    pub unknown_task: UnknownTaskPolicy,
}

/// Result of a successful [`TaskRegistry::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// The task did not exist and was registered and started first
    AutoRegistered,
}

/// Owns every task of a run, in registration order.
///
/// Pure state: no I/O besides `tracing` diagnostics. Not synchronized; callers
/// serialize access.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Vec<Task>,
    current: Option<String>,
    policy: RegistryPolicy,
}

impl TaskRegistry {
    pub fn new(policy: RegistryPolicy) -> Self {
        Self {
            tasks: Vec::new(),
            current: None,
            policy,
        }
    }

    pub fn policy(&self) -> RegistryPolicy {
        self.policy
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Task, TrackerError> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| TrackerError::UnknownTask { id: id.to_string() })
    }

    fn running_mut(&mut self, id: &str, action: &'static str) -> Result<&mut Task, TrackerError> {
        let task = self.get_mut(id)?;
        if task.status != TaskStatus::Running {
            return Err(TrackerError::InvalidTransition {
                id: id.to_string(),
                from: task.status,
                action,
            });
        }
        Ok(task)
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// The most recently started task that has not reached a terminal state.
    pub fn current(&self) -> Option<&Task> {
        self.current.as_deref().and_then(|id| self.get(id))
    }

    fn clear_current_if(&mut self, id: &str) {
        if self.current.as_deref() == Some(id) {
            self.current = None;
        }
    }

    /// Register a new pending task.
    pub fn register(&mut self, id: &str, name: &str, total: f64) -> Result<&Task, TrackerError> {
        let task = Task::new(id, name, total);
        if let Some(index) = self.tasks.iter().position(|t| t.id == id) {
            match self.policy.duplicate {
                DuplicatePolicy::Reject => {
                    return Err(TrackerError::DuplicateTask { id: id.to_string() });
                }
                DuplicatePolicy::Reset => {
                    tracing::debug!(task_id = id, "resetting duplicate task registration");
                    self.clear_current_if(id);
                    self.tasks[index] = task;
                    return Ok(&self.tasks[index]);
                }
            }
        }
        self.tasks.push(task);
        Ok(&self.tasks[self.tasks.len() - 1])
    }

    /// Move a pending task to running and make it current.
    pub fn start(&mut self, id: &str) -> Result<&Task, TrackerError> {
        let task = self.get_mut(id)?;
        if task.status != TaskStatus::Pending {
            return Err(TrackerError::InvalidTransition {
                id: id.to_string(),
                from: task.status,
                action: "start",
            });
        }
        task.status = TaskStatus::Running;
        task.start_time = Some(Utc::now());
        self.current = Some(id.to_string());
        self.get(id).ok_or_else(|| TrackerError::UnknownTask { id: id.to_string() })
    }

    /// Set a running task's progress. Reaching `total` does not complete it.
    pub fn update(
        &mut self,
        id: &str,
        progress: f64,
        message: Option<&str>,
        details: Option<Vec<String>>,
    ) -> Result<UpdateOutcome, TrackerError> {
        let mut outcome = UpdateOutcome::Updated;
        if self.get(id).is_none() {
            match self.policy.unknown_task {
                UnknownTaskPolicy::Ignore => {
                    return Err(TrackerError::UnknownTask { id: id.to_string() });
                }
                UnknownTaskPolicy::AutoRegister => {
                    self.register(id, id, super::DEFAULT_TOTAL)?;
                    self.start(id)?;
                    outcome = UpdateOutcome::AutoRegistered;
                }
            }
        }

        let task = self.running_mut(id, "update")?;
        task.set_progress(progress);
        if let Some(message) = message {
            task.message = message.to_string();
        }
        if let Some(details) = details {
            task.details = details;
        }
        if task.is_full() {
            tracing::debug!(task_id = id, "task reported full progress; awaiting explicit completion");
        }
        Ok(outcome)
    }

    /// Complete a running task and auto-start the first pending task, if any.
    ///
    /// Returns the id of the task that was auto-started.
    pub fn complete(&mut self, id: &str, message: Option<&str>) -> Result<Option<String>, TrackerError> {
        let task = self.running_mut(id, "complete")?;
        task.progress = task.total;
        task.status = TaskStatus::Completed;
        task.end_time = Some(Utc::now());
        if let Some(message) = message {
            task.message = message.to_string();
        }
        self.clear_current_if(id);
        Ok(self.start_next_pending())
    }

    /// Fail a running task. Never auto-advances.
    pub fn fail(&mut self, id: &str, error: &str, details: Option<Vec<String>>) -> Result<(), TrackerError> {
        let task = self.running_mut(id, "fail")?;
        task.status = TaskStatus::Failed;
        task.end_time = Some(Utc::now());
        task.message = error.to_string();
        if let Some(details) = details {
            task.details = details;
        }
        self.clear_current_if(id);
        Ok(())
    }

    /// Mark the current task interrupted, keeping its progress. Returns its id.
    pub fn interrupt_current(&mut self) -> Option<String> {
        let id = self.current.take()?;
        match self.running_mut(&id, "interrupt") {
            Ok(task) => {
                task.status = TaskStatus::Interrupted;
                task.end_time = Some(Utc::now());
                Some(id)
            }
            Err(err) => {
                tracing::warn!(task_id = %id, error = %err, "current task could not be interrupted");
                None
            }
        }
    }

    /// Start the first pending task in registration order.
    pub fn start_next_pending(&mut self) -> Option<String> {
        let next = self
            .tasks
            .iter()
            .find(|t| t.status == TaskStatus::Pending)
            .map(|t| t.id.clone())?;
        self.start(&next).ok()?;
        Some(next)
    }

    /// Append a subtask to a parent. Duplicate subtask ids are not checked;
    /// lookups resolve to the first match.
    pub fn add_subtask(&mut self, parent_id: &str, sub_id: &str, name: &str, total: f64) -> Result<(), TrackerError> {
        let parent = self.get_mut(parent_id)?;
        parent.subtasks.push(Task::new(sub_id, name, total));
        Ok(())
    }

    /// Update a subtask, then re-aggregate the parent and compose its message.
    ///
    /// `details` are recorded on both the subtask and the parent.
    pub fn update_subtask(
        &mut self,
        parent_id: &str,
        sub_id: &str,
        progress: f64,
        message: Option<&str>,
        details: Option<Vec<String>>,
    ) -> Result<(), TrackerError> {
        let parent = self.running_mut(parent_id, "update")?;
        let sub = parent
            .subtask_mut(sub_id)
            .ok_or_else(|| TrackerError::UnknownSubtask {
                parent: parent_id.to_string(),
                id: sub_id.to_string(),
            })?;
        if sub.status == TaskStatus::Pending {
            sub.status = TaskStatus::Running;
            sub.start_time = Some(Utc::now());
        }
        sub.set_progress(progress);
        if let Some(message) = message {
            sub.message = message.to_string();
        }
        let parent_details = details.map(|details| {
            sub.details = details.clone();
            details
        });
        let composed = format!("{}: {}", sub.name, sub.message);
        if let Some(details) = parent_details {
            parent.details = details;
        }
        parent.message = composed;
        aggregate::recompute(parent);
        Ok(())
    }

    /// Mark a subtask completed at full progress and re-aggregate the parent.
    pub fn complete_subtask(&mut self, parent_id: &str, sub_id: &str, message: Option<&str>) -> Result<(), TrackerError> {
        let parent = self.running_mut(parent_id, "update")?;
        let sub = parent
            .subtask_mut(sub_id)
            .ok_or_else(|| TrackerError::UnknownSubtask {
                parent: parent_id.to_string(),
                id: sub_id.to_string(),
            })?;
        let now = Utc::now();
        if sub.start_time.is_none() {
            sub.start_time = Some(now);
        }
        sub.status = TaskStatus::Completed;
        sub.end_time = Some(now);
        sub.progress = sub.total;
        if let Some(message) = message {
            sub.message = message.to_string();
        }
        parent.message = format!("{}: {}", sub.name, sub.message);
        aggregate::recompute(parent);
        Ok(())
    }

    /// Insert a task restored from a checkpoint, replacing any task with the same id.
    pub(crate) fn insert_restored(&mut self, task: Task) {
        self.clear_current_if(&task.id);
        match self.tasks.iter().position(|t| t.id == task.id) {
            Some(index) => self.tasks[index] = task,
            None => self.tasks.push(task),
        }
    }

    /// Send an interrupted task back to pending. Only used while restoring.
    pub(crate) fn requeue(&mut self, id: &str) -> Result<(), TrackerError> {
        let task = self.get_mut(id)?;
        if task.status != TaskStatus::Interrupted {
            return Err(TrackerError::InvalidTransition {
                id: id.to_string(),
                from: task.status,
                action: "requeue",
            });
        }
        task.status = TaskStatus::Pending;
        task.end_time = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(ids: &[&str]) -> TaskRegistry {
        let mut registry = TaskRegistry::default();
        for id in ids {
            registry.register(id, &id.to_uppercase(), 100.0).unwrap();
        }
        registry
    }

    #[test]
    fn test_register_starts_pending() {
        let registry = registry_with(&["a"]);
        let task = registry.get("a").unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.name, "A");
        assert!(registry.current().is_none());
    }

    #[test]
    fn test_duplicate_rejected_by_default() {
        let mut registry = registry_with(&["a"]);
        let err = registry.register("a", "Again", 100.0).unwrap_err();
        assert!(matches!(err, TrackerError::DuplicateTask { .. }));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").unwrap().name, "A");
    }

    #[test]
    fn test_duplicate_reset_policy_replaces_task() {
        let mut registry = TaskRegistry::new(RegistryPolicy {
            duplicate: DuplicatePolicy::Reset,
            ..Default::default()
        });
        registry.register("a", "A", 100.0).unwrap();
        registry.start("a").unwrap();
        registry.update("a", 50.0, None, None).unwrap();

        registry.register("a", "Fresh", 10.0).unwrap();
        let task = registry.get("a").unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0.0);
        assert_eq!(task.total, 10.0);
        assert!(registry.current().is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_start_sets_running_and_current() {
        let mut registry = registry_with(&["a"]);
        registry.start("a").unwrap();
        let task = registry.get("a").unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert!(task.start_time.is_some());
        assert_eq!(registry.current_id(), Some("a"));
    }

    #[test]
    fn test_start_unknown_is_error() {
        let mut registry = TaskRegistry::default();
        assert!(matches!(
            registry.start("ghost"),
            Err(TrackerError::UnknownTask { .. })
        ));
    }

    #[test]
    fn test_start_twice_is_invalid() {
        let mut registry = registry_with(&["a"]);
        registry.start("a").unwrap();
        registry.complete("a", None).unwrap();
        assert!(matches!(
            registry.start("a"),
            Err(TrackerError::InvalidTransition { action: "start", .. })
        ));
    }

    #[test]
    fn test_update_clamps_progress() {
        let mut registry = registry_with(&["a"]);
        registry.start("a").unwrap();
        registry.update("a", -5.0, None, None).unwrap();
        assert_eq!(registry.get("a").unwrap().progress, 0.0);
        registry.update("a", 150.0, None, None).unwrap();
        assert_eq!(registry.get("a").unwrap().progress, 100.0);
    }

    #[test]
    fn test_full_progress_does_not_complete() {
        let mut registry = registry_with(&["a", "b"]);
        registry.start("a").unwrap();
        registry.update("a", 100.0, Some("done?"), None).unwrap();
        let task = registry.get("a").unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.message, "done?");
        assert_eq!(registry.get("b").unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn test_update_replaces_details() {
        let mut registry = registry_with(&["a"]);
        registry.start("a").unwrap();
        registry
            .update("a", 10.0, None, Some(vec!["one".into(), "two".into()]))
            .unwrap();
        registry
            .update("a", 20.0, None, Some(vec!["three".into()]))
            .unwrap();
        registry.update("a", 30.0, None, None).unwrap();
        assert_eq!(registry.get("a").unwrap().details, vec!["three".to_string()]);
    }

    #[test]
    fn test_update_unknown_ignored_by_default() {
        let mut registry = TaskRegistry::default();
        let err = registry.update("ghost", 10.0, None, None).unwrap_err();
        assert!(matches!(err, TrackerError::UnknownTask { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_update_unknown_auto_registers() {
        let mut registry = TaskRegistry::new(RegistryPolicy {
            unknown_task: UnknownTaskPolicy::AutoRegister,
            ..Default::default()
        });
        let outcome = registry.update("late", 30.0, Some("hi"), None).unwrap();
        assert_eq!(outcome, UpdateOutcome::AutoRegistered);
        let task = registry.get("late").unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.progress, 30.0);
        assert_eq!(registry.current_id(), Some("late"));
    }

    #[test]
    fn test_update_pending_task_is_invalid() {
        let mut registry = registry_with(&["a"]);
        assert!(matches!(
            registry.update("a", 10.0, None, None),
            Err(TrackerError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_complete_auto_starts_next_pending_in_order() {
        let mut registry = registry_with(&["a", "b", "c"]);
        registry.start("a").unwrap();
        let next = registry.complete("a", Some("done")).unwrap();
        assert_eq!(next.as_deref(), Some("b"));
        assert_eq!(registry.get("a").unwrap().status, TaskStatus::Completed);
        assert_eq!(registry.get("a").unwrap().progress, 100.0);
        assert!(registry.get("a").unwrap().end_time.is_some());
        assert_eq!(registry.get("b").unwrap().status, TaskStatus::Running);
        assert_eq!(registry.get("c").unwrap().status, TaskStatus::Pending);
        assert_eq!(registry.current_id(), Some("b"));
    }

    #[test]
    fn test_complete_last_task_clears_current() {
        let mut registry = registry_with(&["a"]);
        registry.start("a").unwrap();
        assert_eq!(registry.complete("a", None).unwrap(), None);
        assert!(registry.current().is_none());
    }

    #[test]
    fn test_complete_skips_non_pending_tasks() {
        let mut registry = registry_with(&["a", "b", "c"]);
        registry.start("b").unwrap();
        registry.fail("b", "boom", None).unwrap();
        registry.start("a").unwrap();
        assert_eq!(registry.complete("a", None).unwrap().as_deref(), Some("c"));
    }

    #[test]
    fn test_fail_does_not_auto_advance() {
        let mut registry = registry_with(&["a", "b"]);
        registry.start("a").unwrap();
        registry
            .fail("a", "disk full", Some(vec!["write failed".into()]))
            .unwrap();
        let task = registry.get("a").unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.message, "disk full");
        assert_eq!(task.details, vec!["write failed".to_string()]);
        assert_eq!(registry.get("b").unwrap().status, TaskStatus::Pending);
        assert!(registry.current().is_none());
    }

    #[test]
    fn test_interrupt_current_preserves_progress() {
        let mut registry = registry_with(&["a"]);
        registry.start("a").unwrap();
        registry.update("a", 42.0, None, None).unwrap();
        assert_eq!(registry.interrupt_current().as_deref(), Some("a"));
        let task = registry.get("a").unwrap();
        assert_eq!(task.status, TaskStatus::Interrupted);
        assert_eq!(task.progress, 42.0);
        assert!(registry.current().is_none());
        assert_eq!(registry.interrupt_current(), None);
    }

    #[test]
    fn test_add_subtask_unknown_parent() {
        let mut registry = TaskRegistry::default();
        assert!(matches!(
            registry.add_subtask("ghost", "s", "S", 100.0),
            Err(TrackerError::UnknownTask { .. })
        ));
    }

    #[test]
    fn test_update_subtask_aggregates_and_composes_message() {
        let mut registry = registry_with(&["p"]);
        registry.add_subtask("p", "s1", "Parse", 100.0).unwrap();
        registry.add_subtask("p", "s2", "Render", 100.0).unwrap();
        registry.start("p").unwrap();

        registry.update_subtask("p", "s1", 40.0, Some("reading"), None).unwrap();
        registry.update_subtask("p", "s2", 80.0, Some("writing"), None).unwrap();

        let parent = registry.get("p").unwrap();
        assert!((parent.progress - 60.0).abs() < 1e-9);
        assert_eq!(parent.message, "Render: writing");
        assert_eq!(parent.subtask("s1").unwrap().status, TaskStatus::Running);
    }

    #[test]
    fn test_update_subtask_details_reach_parent() {
        let mut registry = registry_with(&["p"]);
        registry.add_subtask("p", "s1", "Parse", 100.0).unwrap();
        registry.start("p").unwrap();

        let tail = vec!["one".to_string(), "two".to_string()];
        registry
            .update_subtask("p", "s1", 10.0, Some("two"), Some(tail.clone()))
            .unwrap();
        let parent = registry.get("p").unwrap();
        assert_eq!(parent.details, tail);
        assert_eq!(parent.subtask("s1").unwrap().details, tail);
    }

    #[test]
    fn test_direct_update_overridden_by_next_subtask_update() {
        let mut registry = registry_with(&["p"]);
        registry.add_subtask("p", "s1", "Only", 100.0).unwrap();
        registry.start("p").unwrap();
        registry.update("p", 90.0, None, None).unwrap();
        registry.update_subtask("p", "s1", 10.0, None, None).unwrap();
        assert_eq!(registry.get("p").unwrap().progress, 10.0);
    }

    #[test]
    fn test_update_subtask_unknown_subtask() {
        let mut registry = registry_with(&["p"]);
        registry.start("p").unwrap();
        assert!(matches!(
            registry.update_subtask("p", "nope", 10.0, None, None),
            Err(TrackerError::UnknownSubtask { .. })
        ));
    }

    #[test]
    fn test_duplicate_subtask_ids_resolve_to_first() {
        let mut registry = registry_with(&["p"]);
        registry.add_subtask("p", "s", "First", 100.0).unwrap();
        registry.add_subtask("p", "s", "Second", 100.0).unwrap();
        registry.start("p").unwrap();
        registry.update_subtask("p", "s", 100.0, None, None).unwrap();
        let parent = registry.get("p").unwrap();
        assert_eq!(parent.subtasks[0].progress, 100.0);
        assert_eq!(parent.subtasks[1].progress, 0.0);
        assert_eq!(parent.progress, 50.0);
    }

    #[test]
    fn test_complete_subtask() {
        let mut registry = registry_with(&["p"]);
        registry.add_subtask("p", "s1", "One", 10.0).unwrap();
        registry.add_subtask("p", "s2", "Two", 10.0).unwrap();
        registry.start("p").unwrap();
        registry.complete_subtask("p", "s1", Some("ok")).unwrap();
        let parent = registry.get("p").unwrap();
        assert_eq!(parent.subtasks[0].status, TaskStatus::Completed);
        assert_eq!(parent.progress, 50.0);
        assert_eq!(parent.status, TaskStatus::Running);
    }

    #[test]
    fn test_requeue_only_interrupted() {
        let mut registry = registry_with(&["a", "b"]);
        registry.start("a").unwrap();
        registry.interrupt_current();
        registry.requeue("a").unwrap();
        assert_eq!(registry.get("a").unwrap().status, TaskStatus::Pending);
        assert!(registry.requeue("b").is_err());
    }
}
