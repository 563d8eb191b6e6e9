//! Hierarchical task model.
//!
//! The [`TaskRegistry`] owns every [`Task`] of a run and enforces the lifecycle
//! state machine:
//!
//! ```text
//! pending --start--> running --update*--> running
//! running --complete--> completed
//! running --fail--> failed
//! running --interrupt--> interrupted
//! ```
//!
//! Parent progress is derived from subtasks by the [`aggregate`] module.

pub mod aggregate;
mod registry;
mod types;

pub use registry::{DuplicatePolicy, RegistryPolicy, TaskRegistry, UnknownTaskPolicy, UpdateOutcome};
pub use types::{DEFAULT_TOTAL, Task, TaskStatus};
