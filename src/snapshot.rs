//! Checkpoint capture, (de)serialization and restore.
//!
//! The on-disk shape is the camelCase JSON object
//! `{ version, runId, tasks, currentTask, startTime, interrupted, logs }`.
//! `running` tasks are never trusted across a restore: their work unit is gone,
//! so they come back as `pending` with their progress intact.

use crate::errors::TrackerError;
use crate::events::TrackerEvent;
use crate::task::{Task, TaskRegistry, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Current snapshot schema version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Point-in-time export of all task state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    /// Snapshots written before versioning are read as version 1
    #[serde(default = "legacy_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub current_task: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub logs: Vec<String>,
}

fn legacy_version() -> u32 {
    1
}

impl ProgressSnapshot {
    /// Capture the registry's current state.
    pub fn capture(
        registry: &TaskRegistry,
        run_id: Uuid,
        start_time: Option<DateTime<Utc>>,
        interrupted: bool,
        logs: &[String],
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            run_id: Some(run_id),
            tasks: registry.tasks().to_vec(),
            current_task: registry.current_id().map(str::to_string),
            start_time,
            interrupted,
            logs: logs.to_vec(),
        }
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

/// Options applied while restoring a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Send `interrupted` tasks back to `pending` so the caller can rerun them
    pub requeue_interrupted: bool,
}

/// What a restore changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    /// Tasks found `running` and downgraded to `pending`
    pub downgraded: Vec<String>,
    /// Interrupted tasks requeued because of [`RestoreOptions::requeue_interrupted`]
    pub requeued: Vec<String>,
}

/// Encodes, decodes, persists and restores [`ProgressSnapshot`]s.
pub struct SnapshotCodec;

impl SnapshotCodec {
    pub fn encode(snapshot: &ProgressSnapshot) -> Result<String, TrackerError> {
        Ok(serde_json::to_string_pretty(snapshot)?)
    }

    /// Decode a snapshot, rejecting input without a `tasks` array or with a newer version.
    pub fn decode(raw: &str) -> Result<ProgressSnapshot, TrackerError> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| TrackerError::MalformedSnapshot(format!("invalid JSON: {}", e)))?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> Result<ProgressSnapshot, TrackerError> {
        let Some(object) = value.as_object() else {
            return Err(TrackerError::MalformedSnapshot(
                "snapshot is not an object".to_string(),
            ));
        };
        if !object.get("tasks").is_some_and(|t| t.is_array()) {
            return Err(TrackerError::MalformedSnapshot(
                "missing tasks field".to_string(),
            ));
        }
        if let Some(found) = object.get("version").and_then(|v| v.as_u64())
            && found > u64::from(SNAPSHOT_VERSION)
        {
            return Err(TrackerError::UnsupportedSnapshotVersion {
                found: u32::try_from(found).unwrap_or(u32::MAX),
                supported: SNAPSHOT_VERSION,
            });
        }
        serde_json::from_value(value).map_err(|e| TrackerError::MalformedSnapshot(e.to_string()))
    }

    /// Write a snapshot atomically (temp file, then rename).
    pub fn save(path: &Path, snapshot: &ProgressSnapshot) -> Result<(), TrackerError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| TrackerError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let encoded = Self::encode(snapshot)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, encoded).map_err(|source| TrackerError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, path).map_err(|source| TrackerError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load a snapshot; `Ok(None)` when no checkpoint exists yet.
    pub fn load(path: &Path) -> Result<Option<ProgressSnapshot>, TrackerError> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path).map_err(|source| TrackerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::decode(&raw).map(Some)
    }

    /// Re-register every snapshot task into `registry`.
    ///
    /// `running` becomes `pending` (recursively, subtasks included); progress,
    /// messages and timestamps are kept. Other statuses are preserved unless
    /// `requeue_interrupted` is set.
    pub fn restore(
        registry: &mut TaskRegistry,
        snapshot: &ProgressSnapshot,
        options: RestoreOptions,
    ) -> RestoreReport {
        let mut report = RestoreReport::default();
        for task in &snapshot.tasks {
            let mut task = task.clone();
            if downgrade_running(&mut task) {
                report.downgraded.push(task.id.clone());
            }
            let id = task.id.clone();
            let interrupted = task.status == TaskStatus::Interrupted;
            registry.insert_restored(task);
            if interrupted && options.requeue_interrupted {
                match registry.requeue(&id) {
                    Ok(()) => report.requeued.push(id),
                    Err(err) => tracing::warn!(task_id = %id, error = %err, "could not requeue task"),
                }
            }
            report.restored += 1;
        }
        tracing::info!(
            restored = report.restored,
            downgraded = report.downgraded.len(),
            requeued = report.requeued.len(),
            "restored checkpoint"
        );
        report
    }
}

/// Downgrade `running` to `pending` in a task tree. Returns whether the root was running.
fn downgrade_running(task: &mut Task) -> bool {
    for sub in &mut task.subtasks {
        downgrade_running(sub);
    }
    if task.status == TaskStatus::Running {
        task.status = TaskStatus::Pending;
        true
    } else {
        false
    }
}

/// Persists the snapshot carried by every `save-progress` event.
#[derive(Debug, Clone)]
pub struct CheckpointWriter {
    path: PathBuf,
}

impl CheckpointWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn handle(&self, event: &TrackerEvent) {
        if let TrackerEvent::SaveProgress { snapshot } = event {
            match SnapshotCodec::save(&self.path, snapshot) {
                Ok(()) => tracing::info!(path = %self.path.display(), "checkpoint written"),
                Err(err) => tracing::error!(path = %self.path.display(), error = %err, "failed to write checkpoint"),
            }
        }
    }
}
