//! Configuration for docgen, read from `.docgen/docgen.toml`.
//!
//! Layered as defaults → file → environment → CLI flags.
//!
//! ```toml
//! [tracker]
//! duplicate_policy = "reject"        # reject | reset
//! unknown_task_policy = "ignore"     # ignore | auto_register
//! requeue_interrupted = true
//!
//! [ui]
//! mode = "full"                      # full | minimal | json
//! listen_escape = true
//! interrupt_debounce_ms = 300
//!
//! [paths]
//! checkpoint = ".docgen/checkpoint.json"
//! plan = ".docgen/plan.toml"
//! logs = ".docgen/logs"
//! ```

use crate::task::{DuplicatePolicy, RegistryPolicy, UnknownTaskPolicy};
use crate::ui::UiMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the per-project state directory.
pub const DOCGEN_DIR: &str = ".docgen";

/// Environment variable overriding `[ui] mode`.
pub const ENV_UI: &str = "DOCGEN_UI";

/// Environment variable overriding `[paths] checkpoint`.
pub const ENV_CHECKPOINT: &str = "DOCGEN_CHECKPOINT";

/// Task registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerSection {
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
    #[serde(default)]
    pub unknown_task_policy: UnknownTaskPolicy,
    /// Rerun interrupted tasks when resuming from a checkpoint
    #[serde(default = "default_requeue_interrupted")]
    pub requeue_interrupted: bool,
}

fn default_requeue_interrupted() -> bool {
    true
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            duplicate_policy: DuplicatePolicy::default(),
            unknown_task_policy: UnknownTaskPolicy::default(),
            requeue_interrupted: default_requeue_interrupted(),
        }
    }
}

/// Terminal display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiSection {
    #[serde(default)]
    pub mode: UiMode,
    /// Treat the Escape key as an interrupt source
    #[serde(default = "default_listen_escape")]
    pub listen_escape: bool,
    #[serde(default = "default_interrupt_debounce_ms")]
    pub interrupt_debounce_ms: u64,
}

fn default_listen_escape() -> bool {
    true
}

fn default_interrupt_debounce_ms() -> u64 {
    300
}

impl Default for UiSection {
    fn default() -> Self {
        Self {
            mode: UiMode::default(),
            listen_escape: default_listen_escape(),
            interrupt_debounce_ms: default_interrupt_debounce_ms(),
        }
    }
}

/// File locations, relative to the project directory unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsSection {
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint: PathBuf,
    #[serde(default = "default_plan_path")]
    pub plan: PathBuf,
    #[serde(default = "default_logs_path")]
    pub logs: PathBuf,
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from(DOCGEN_DIR).join("checkpoint.json")
}

fn default_plan_path() -> PathBuf {
    PathBuf::from(DOCGEN_DIR).join("plan.toml")
}

fn default_logs_path() -> PathBuf {
    PathBuf::from(DOCGEN_DIR).join("logs")
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            checkpoint: default_checkpoint_path(),
            plan: default_plan_path(),
            logs: default_logs_path(),
        }
    }
}

/// Contents of `docgen.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocgenToml {
    #[serde(default)]
    pub tracker: TrackerSection,
    #[serde(default)]
    pub ui: UiSection,
    #[serde(default)]
    pub paths: PathsSection,
}

impl DocgenToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse docgen.toml")
    }

    /// Load `docgen.toml` from `docgen_dir`, or defaults if it does not exist.
    pub fn load_or_default(docgen_dir: &Path) -> Result<Self> {
        let path = docgen_dir.join("docgen.toml");
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn registry_policy(&self) -> RegistryPolicy {
        RegistryPolicy {
            duplicate: self.tracker.duplicate_policy,
            unknown_task: self.tracker.unknown_task_policy,
        }
    }
}

/// CLI flags that override file and environment settings.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub verbose: bool,
    pub ui: Option<UiMode>,
    pub plan: Option<PathBuf>,
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub docgen_dir: PathBuf,
    pub checkpoint_file: PathBuf,
    pub plan_file: PathBuf,
    pub log_dir: PathBuf,
    pub ui_mode: UiMode,
    pub listen_escape: bool,
    pub interrupt_debounce: Duration,
    pub policy: RegistryPolicy,
    pub requeue_interrupted: bool,
    pub verbose: bool,
}

impl Config {
    /// Resolve configuration for `project_dir`, reading overrides from the process environment.
    pub fn new(project_dir: PathBuf, overrides: CliOverrides) -> Result<Self> {
        Self::resolve(project_dir, overrides, |key| std::env::var(key).ok())
    }

    /// Resolve configuration with an explicit environment lookup.
    pub fn resolve(
        project_dir: PathBuf,
        overrides: CliOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let docgen_dir = project_dir.join(DOCGEN_DIR);
        let mut toml = DocgenToml::load_or_default(&docgen_dir)?;

        if let Some(mode) = env(ENV_UI) {
            toml.ui.mode = mode
                .parse()
                .with_context(|| format!("Invalid {} value", ENV_UI))?;
        }
        if let Some(path) = env(ENV_CHECKPOINT).filter(|p| !p.is_empty()) {
            toml.paths.checkpoint = PathBuf::from(path);
        }
        if let Some(mode) = overrides.ui {
            toml.ui.mode = mode;
        }
        if let Some(plan) = overrides.plan {
            toml.paths.plan = plan;
        }

        Ok(Self {
            checkpoint_file: project_dir.join(&toml.paths.checkpoint),
            plan_file: project_dir.join(&toml.paths.plan),
            log_dir: project_dir.join(&toml.paths.logs),
            ui_mode: toml.ui.mode,
            listen_escape: toml.ui.listen_escape,
            interrupt_debounce: Duration::from_millis(toml.ui.interrupt_debounce_ms),
            policy: toml.registry_policy(),
            requeue_interrupted: toml.tracker.requeue_interrupted,
            verbose: overrides.verbose,
            project_dir,
            docgen_dir,
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.docgen_dir).context("Failed to create .docgen directory")?;
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        Ok(())
    }
}
