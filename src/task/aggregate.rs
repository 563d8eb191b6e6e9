//! Roll-up of subtask progress into parent progress.
//!
//! Every subtask contributes equally, regardless of its own `total`:
//!
//! ```text
//! fraction       = (1/n) * Σ (progress_i / total_i)
//! parentProgress = fraction * parent.total
//! ```

use super::Task;

/// Unweighted mean of the subtasks' completion fractions, or `None` without subtasks.
pub fn fraction(subtasks: &[Task]) -> Option<f64> {
    if subtasks.is_empty() {
        return None;
    }
    let sum: f64 = subtasks.iter().map(Task::fraction).sum();
    Some(sum / subtasks.len() as f64)
}

/// Recompute and apply a parent's progress from its subtasks.
///
/// Returns the new progress, or `None` (leaving the parent untouched) when it has no subtasks.
pub fn recompute(parent: &mut Task) -> Option<f64> {
    let fraction = fraction(&parent.subtasks)?;
    parent.set_progress(fraction * parent.total);
    Some(parent.progress)
}
