//! The display capability consumed by the reporter.
//!
//! The tracker never writes to the terminal itself; everything user-facing
//! goes through a [`ProgressDisplay`].

use crate::events::TrackerEvent;
use crate::reporter::RunSummary;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Severity of a log line handed to the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Output mode for the terminal display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UiMode {
    /// Progress bars with colors
    #[default]
    Full,
    /// One line per transition
    Minimal,
    /// One JSON object per display call
    Json,
}

impl std::fmt::Display for UiMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UiMode::Full => write!(f, "full"),
            UiMode::Minimal => write!(f, "minimal"),
            UiMode::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for UiMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(UiMode::Full),
            "minimal" => Ok(UiMode::Minimal),
            "json" => Ok(UiMode::Json),
            _ => anyhow::bail!("Invalid UI mode '{}'. Valid values: full, minimal, json", s),
        }
    }
}

/// Rendering capability. Implementations synchronize internally; every method takes `&self`.
pub trait ProgressDisplay: Send + Sync {
    fn create_progress_bar(&self, id: &str, label: &str, total: f64);

    fn update_progress_bar(&self, id: &str, progress: f64, message: Option<&str>);

    fn complete_progress_bar(&self, id: &str, message: &str);

    /// Finish a bar without success (failed or interrupted task).
    fn abandon_progress_bar(&self, id: &str, message: &str) {
        self.complete_progress_bar(id, message);
    }

    fn log(&self, line: &str, level: LogLevel);

    fn show_error(&self, message: &str, details: Option<&[String]>);

    fn show_summary(&self, report: &RunSummary);

    fn cleanup(&self);
}

/// Build an event-bus handler that mirrors lifecycle events onto `display`.
pub fn display_subscriber(display: Arc<dyn ProgressDisplay>) -> impl FnMut(&TrackerEvent) + Send + 'static {
    move |event| match event {
        TrackerEvent::TaskStart { task } => {
            display.update_progress_bar(&task.id, task.progress, Some("Starting..."));
        }
        TrackerEvent::TaskUpdate { task } => {
            let message = (!task.message.is_empty()).then_some(task.message.as_str());
            display.update_progress_bar(&task.id, task.progress, message);
        }
        TrackerEvent::TaskComplete { task } => {
            let message = if task.message.is_empty() {
                "Done"
            } else {
                task.message.as_str()
            };
            display.complete_progress_bar(&task.id, message);
        }
        TrackerEvent::TaskFail { task } => {
            display.abandon_progress_bar(&task.id, &task.message);
            let details = (!task.details.is_empty()).then_some(task.details.as_slice());
            display.show_error(&format!("{} failed: {}", task.name, task.message), details);
        }
        TrackerEvent::Interrupt { task } => {
            if let Some(task) = task {
                display.abandon_progress_bar(
                    &task.id,
                    &format!("Interrupted at {}%", task.percentage()),
                );
            }
        }
        TrackerEvent::SaveProgress { .. } => {}
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Call, RecordingDisplay};
    use super::*;
    use crate::task::{Task, TaskStatus};

    #[test]
    fn test_ui_mode_parse() {
        assert_eq!("JSON".parse::<UiMode>().unwrap(), UiMode::Json);
        assert_eq!("minimal".parse::<UiMode>().unwrap(), UiMode::Minimal);
        assert!("fancy".parse::<UiMode>().is_err());
        assert_eq!(UiMode::default().to_string(), "full");
    }

    #[test]
    fn test_subscriber_maps_failure_to_abandon_and_error() {
        let display = Arc::new(RecordingDisplay::default());
        let mut handler = display_subscriber(display.clone());

        let mut task = Task::new("b", "Beta", 100.0);
        task.status = TaskStatus::Failed;
        task.message = "disk full".into();
        handler(&TrackerEvent::TaskFail { task });

        assert_eq!(
            display.calls(),
            vec![
                Call::Abandon {
                    id: "b".into(),
                    message: "disk full".into()
                },
                Call::Error {
                    message: "Beta failed: disk full".into()
                },
            ]
        );
    }

    #[test]
    fn test_subscriber_complete_defaults_message() {
        let display = Arc::new(RecordingDisplay::default());
        let mut handler = display_subscriber(display.clone());
        handler(&TrackerEvent::TaskComplete {
            task: Task::new("a", "Alpha", 100.0),
        });
        assert_eq!(
            display.calls(),
            vec![Call::Complete {
                id: "a".into(),
                message: "Done".into()
            }]
        );
    }
}
