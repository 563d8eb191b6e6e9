//! Typed error hierarchy for the docgen tracker.
//!
//! Registry and snapshot failures are recoverable: the [`crate::reporter::Reporter`]
//! downgrades them to warnings. Only duplicate registration and force-quit
//! reach the caller as hard errors.

use crate::task::TaskStatus;
use thiserror::Error;

/// Errors raised by the task registry, snapshot codec and reporter.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Task {id} is not registered")]
    UnknownTask { id: String },

    #[error("Task {id} is already registered")]
    DuplicateTask { id: String },

    #[error("Task {parent} has no subtask {id}")]
    UnknownSubtask { parent: String, id: String },

    #[error("Cannot {action} task {id} while it is {from}")]
    InvalidTransition {
        id: String,
        from: TaskStatus,
        action: &'static str,
    },

    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("Snapshot version {found} is newer than supported version {supported}")]
    UnsupportedSnapshotVersion { found: u32, supported: u32 },

    #[error("Forced termination after repeated interrupt")]
    ForceQuit,

    #[error("Failed to access {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TrackerError {
    /// Whether the error is an internal inconsistency that should only be logged.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnknownTask { .. }
                | Self::UnknownSubtask { .. }
                | Self::InvalidTransition { .. }
                | Self::MalformedSnapshot(_)
                | Self::UnsupportedSnapshotVersion { .. }
        )
    }
}
