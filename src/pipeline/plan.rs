//! The plan file: which tasks a run consists of and the command behind each.
//!
//! ```toml
//! [[tasks]]
//! id = "api"
//! name = "API reference"
//! command = "./scripts/gen-api.sh"
//!
//! [[tasks]]
//! id = "guide"
//! name = "User guide"
//!
//! [[tasks.steps]]
//! id = "outline"
//! name = "Outline"
//! command = "make outline"
//!
//! [[tasks.steps]]
//! id = "render"
//! name = "Render"
//! command = "make render"
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub name: String,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTask {
    pub id: String,
    pub name: String,
    /// Progress units for the task bar; defaults to 100
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub command: Option<String>,
    /// Run in order as subtasks. Mutually exclusive with `command`.
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub tasks: Vec<PlanTask>,
}

impl Plan {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid plan: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let plan: Plan = toml::from_str(content).context("Failed to parse plan.toml")?;
        plan.validate()?;
        Ok(plan)
    }

    /// Check ids are unique and every task has exactly one source of work.
    pub fn validate(&self) -> Result<()> {
        if self.tasks.is_empty() {
            bail!("Plan defines no tasks");
        }
        let mut ids = HashSet::new();
        for task in &self.tasks {
            if task.id.trim().is_empty() {
                bail!("Task '{}' has an empty id", task.name);
            }
            if !ids.insert(task.id.as_str()) {
                bail!("Duplicate task id '{}'", task.id);
            }
            match (&task.command, task.steps.is_empty()) {
                (Some(_), false) => bail!("Task '{}' has both a command and steps", task.id),
                (None, true) => bail!("Task '{}' has neither a command nor steps", task.id),
                _ => {}
            }
            if let Some(total) = task.total
                && !(total.is_finite() && total > 0.0)
            {
                bail!("Task '{}' has a non-positive total", task.id);
            }
            let mut step_ids = HashSet::new();
            for step in &task.steps {
                if !step_ids.insert(step.id.as_str()) {
                    bail!("Duplicate step id '{}' in task '{}'", step.id, task.id);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_and_steps() {
        let plan = Plan::parse(
            r#"
[[tasks]]
id = "api"
name = "API reference"
total = 20.0
command = "echo api"

[[tasks]]
id = "guide"
name = "User guide"

[[tasks.steps]]
id = "outline"
name = "Outline"
command = "echo outline"

[[tasks.steps]]
id = "render"
name = "Render"
command = "echo render"
"#,
        )
        .unwrap();
        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.tasks[0].total, Some(20.0));
        assert_eq!(plan.tasks[1].steps[1].id, "render");
        assert!(plan.tasks[1].command.is_none());
    }

    #[test]
    fn test_rejects_duplicate_task_ids() {
        let err = Plan::parse(
            "[[tasks]]\nid = \"a\"\nname = \"A\"\ncommand = \"true\"\n\
             [[tasks]]\nid = \"a\"\nname = \"A2\"\ncommand = \"true\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Duplicate task id 'a'"));
    }

    #[test]
    fn test_rejects_task_without_work() {
        let err = Plan::parse("[[tasks]]\nid = \"a\"\nname = \"A\"\n").unwrap_err();
        assert!(err.to_string().contains("neither a command nor steps"));
    }

    #[test]
    fn test_rejects_empty_plan() {
        assert!(Plan::parse("").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Plan::load(&dir.path().join("plan.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read plan file"));
    }
}
