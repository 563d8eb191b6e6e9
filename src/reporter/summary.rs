//! End-of-run summary.

use crate::task::{Task, TaskStatus};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A failed top-level task and the error it recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTask {
    pub name: String,
    pub error: String,
}

/// An interrupted top-level task and how far it got.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptedTask {
    pub name: String,
    pub percentage: u8,
}

/// Top-level tasks partitioned by terminal status, plus run duration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub completed: Vec<String>,
    pub failed: Vec<FailedTask>,
    pub interrupted: Vec<InterruptedTask>,
    /// Tasks that never reached a terminal status
    pub unfinished: Vec<String>,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl RunSummary {
    /// Partition `tasks` (subtasks are not counted) and attach `duration`.
    pub fn from_tasks(tasks: &[Task], duration: Duration) -> Self {
        let mut summary = Self {
            duration,
            ..Default::default()
        };
        for task in tasks {
            match task.status {
                TaskStatus::Completed => summary.completed.push(task.name.clone()),
                TaskStatus::Failed => summary.failed.push(FailedTask {
                    name: task.name.clone(),
                    error: task.message.clone(),
                }),
                TaskStatus::Interrupted => summary.interrupted.push(InterruptedTask {
                    name: task.name.clone(),
                    percentage: task.percentage(),
                }),
                TaskStatus::Pending | TaskStatus::Running => {
                    summary.unfinished.push(task.name.clone())
                }
            }
        }
        summary
    }

    /// True when every task completed.
    pub fn all_success(&self) -> bool {
        self.failed.is_empty() && self.interrupted.is_empty() && self.unfinished.is_empty()
    }

    pub fn duration_label(&self) -> String {
        format_duration(self.duration)
    }

    /// Plain-text rendering, one line per non-empty section.
    ///
    /// ```text
    /// Completed: 1 {A}
    /// Failed: 1 {B: disk full}
    /// Duration: 1m 5s
    /// ```
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if !self.completed.is_empty() {
            lines.push(format!(
                "Completed: {} {{{}}}",
                self.completed.len(),
                self.completed.join(", ")
            ));
        }
        if !self.failed.is_empty() {
            let entries: Vec<String> = self
                .failed
                .iter()
                .map(|f| format!("{}: {}", f.name, f.error))
                .collect();
            lines.push(format!("Failed: {} {{{}}}", self.failed.len(), entries.join(", ")));
        }
        if !self.interrupted.is_empty() {
            let entries: Vec<String> = self
                .interrupted
                .iter()
                .map(|i| format!("{}: {}%", i.name, i.percentage))
                .collect();
            lines.push(format!(
                "Interrupted: {} {{{}}}",
                self.interrupted.len(),
                entries.join(", ")
            ));
        }
        if !self.unfinished.is_empty() {
            lines.push(format!(
                "Not run: {} {{{}}}",
                self.unfinished.len(),
                self.unfinished.join(", ")
            ));
        }
        lines.push(format!("Duration: {}", self.duration_label()));
        lines
    }
}

/// Format a duration as `Hh Mm Ss`, dropping leading zero units.
///
/// `5s`, `1m 5s`, `1h 0m 7s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
