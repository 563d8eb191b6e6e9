use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalization denominator used when a task is registered without one.
pub const DEFAULT_TOTAL: f64 = 100.0;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Registered but not started
    #[default]
    Pending,
    /// Currently executing
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Stopped by an interrupt; restorable
    Interrupted,
}

impl TaskStatus {
    /// Check if the status ends the task for this run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Interrupted)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// A unit of tracked work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: TaskStatus,
    /// Always within `[0, total]`
    #[serde(default)]
    pub progress: f64,
    #[serde(default = "default_total")]
    pub total: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message: String,
    /// Replaced wholesale on every update that carries details
    #[serde(default)]
    pub details: Vec<String>,
    /// Child tasks in registration order
    #[serde(default)]
    pub subtasks: Vec<Task>,
}

fn default_total() -> f64 {
    DEFAULT_TOTAL
}

impl Task {
    /// Create a pending task. Non-positive or non-finite totals fall back to [`DEFAULT_TOTAL`].
    pub fn new(id: impl Into<String>, name: impl Into<String>, total: f64) -> Self {
        let total = if total.is_finite() && total > 0.0 {
            total
        } else {
            DEFAULT_TOTAL
        };
        Self {
            id: id.into(),
            name: name.into(),
            status: TaskStatus::Pending,
            progress: 0.0,
            total,
            start_time: None,
            end_time: None,
            message: String::new(),
            details: Vec::new(),
            subtasks: Vec::new(),
        }
    }

    /// Clamp a raw progress value into `[0, total]`. NaN is treated as zero.
    pub fn clamp_progress(&self, progress: f64) -> f64 {
        if progress.is_nan() {
            return 0.0;
        }
        progress.clamp(0.0, self.total)
    }

    /// Set progress, clamping out-of-range input.
    pub fn set_progress(&mut self, progress: f64) {
        self.progress = self.clamp_progress(progress);
    }

    /// Completion fraction in `[0, 1]`; a zero total counts as no progress.
    pub fn fraction(&self) -> f64 {
        if self.total <= 0.0 || !self.total.is_finite() {
            return 0.0;
        }
        (self.progress / self.total).clamp(0.0, 1.0)
    }

    /// Completion as a whole percentage.
    pub fn percentage(&self) -> u8 {
        (self.fraction() * 100.0).round() as u8
    }

    pub fn is_full(&self) -> bool {
        self.progress >= self.total
    }

    pub fn subtask(&self, id: &str) -> Option<&Task> {
        self.subtasks.iter().find(|s| s.id == id)
    }

    pub fn subtask_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.subtasks.iter_mut().find(|s| s.id == id)
    }
}
