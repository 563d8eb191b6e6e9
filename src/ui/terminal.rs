//! Terminal rendering of task progress.
//!
//! Supports three output modes:
//! - `full`: one `indicatif` bar per task under a shared `MultiProgress`
//! - `minimal`: a single line per transition
//! - `json`: one JSON object per call, for machine consumption

use super::display::{LogLevel, ProgressDisplay, UiMode};
use super::icons::{CHECK, CLOCK, CROSS, PAUSE, RUNNING, SPARKLE, WARNING};
use crate::reporter::RunSummary;
use console::{Term, style};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde_json::json;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

/// Bar state for one task.
#[derive(Debug)]
struct TaskBar {
    bar: ProgressBar,
    total: f64,
}

impl TaskBar {
    fn percent(&self, progress: f64) -> u64 {
        if self.total <= 0.0 {
            return 0;
        }
        ((progress / self.total).clamp(0.0, 1.0) * 100.0).round() as u64
    }
}

/// [`ProgressDisplay`] that renders to stdout.
///
/// # Thread Safety
///
/// The bar map is only locked for short, non-panicking sections, so a poisoned
/// lock is recovered rather than propagated.
pub struct TerminalDisplay {
    mode: UiMode,
    multi: MultiProgress,
    bars: Mutex<HashMap<String, TaskBar>>,
    verbose: bool,
    term: Term,
}

impl TerminalDisplay {
    pub fn new(mode: UiMode, verbose: bool) -> Self {
        Self {
            mode,
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            verbose,
            term: Term::stdout(),
        }
    }

    pub fn mode(&self) -> UiMode {
        self.mode
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("  {prefix:.bold} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░")
    }

    fn finished_style(color: &str) -> ProgressStyle {
        ProgressStyle::default_bar()
            .template(&format!("  {{prefix:.bold}} [{{bar:30.{color}/{color}}}] {{msg}}"))
            .expect("progress bar template is built from a valid static string")
            .progress_chars("███")
    }

    /// Print a line above the bars, falling back to `eprintln!` if the terminal is gone.
    fn print_line(&self, msg: impl AsRef<str>) {
        // A hidden target (not a terminal) swallows println
        if self.multi.is_hidden() {
            self.write_plain(msg);
            return;
        }
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    fn write_plain(&self, msg: impl AsRef<str>) {
        if writeln!(&self.term, "{}", msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    fn write_json(&self, value: serde_json::Value) {
        self.write_plain(value.to_string());
    }

    fn with_bars<T>(&self, f: impl FnOnce(&mut HashMap<String, TaskBar>) -> T) -> T {
        let mut bars = self
            .bars
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut bars)
    }

    fn finish_bar(&self, id: &str, message: String, color: &str) {
        self.with_bars(|bars| {
            if let Some(state) = bars.remove(id) {
                state.bar.set_style(Self::finished_style(color));
                state.bar.finish_with_message(message);
            }
        });
    }
}

impl ProgressDisplay for TerminalDisplay {
    fn create_progress_bar(&self, id: &str, label: &str, total: f64) {
        match self.mode {
            UiMode::Json => self.write_json(json!({
                "event": "create", "id": id, "label": label, "total": total
            })),
            UiMode::Minimal => {
                if self.verbose {
                    self.write_plain(format!("+ {}", label));
                }
            }
            UiMode::Full => {
                let bar = self.multi.add(ProgressBar::new(100));
                bar.set_style(Self::bar_style());
                bar.set_prefix(format!("[{}]", label));
                bar.set_message(style("pending").dim().to_string());
                self.with_bars(|bars| {
                    if let Some(old) = bars.insert(id.to_string(), TaskBar { bar, total }) {
                        old.bar.finish_and_clear();
                    }
                });
            }
        }
    }

    fn update_progress_bar(&self, id: &str, progress: f64, message: Option<&str>) {
        match self.mode {
            UiMode::Json => self.write_json(json!({
                "event": "update", "id": id, "progress": progress, "message": message
            })),
            UiMode::Minimal => {
                if let Some(message) = message {
                    self.write_plain(format!("{} {}: {}", RUNNING, id, message));
                }
            }
            UiMode::Full => self.with_bars(|bars| {
                if let Some(state) = bars.get(id) {
                    state.bar.set_position(state.percent(progress));
                    if let Some(message) = message {
                        state.bar.set_message(message.to_string());
                    }
                }
            }),
        }
    }

    fn complete_progress_bar(&self, id: &str, message: &str) {
        match self.mode {
            UiMode::Json => self.write_json(json!({
                "event": "complete", "id": id, "message": message
            })),
            UiMode::Minimal => self.write_plain(format!("✓ {} {}", id, message)),
            UiMode::Full => self.finish_bar(id, format!("{}{}", CHECK, message), "green"),
        }
    }

    fn abandon_progress_bar(&self, id: &str, message: &str) {
        match self.mode {
            UiMode::Json => self.write_json(json!({
                "event": "abandon", "id": id, "message": message
            })),
            UiMode::Minimal => self.write_plain(format!("✗ {} ({})", id, message)),
            UiMode::Full => self.finish_bar(id, format!("{}{}", CROSS, message), "red"),
        }
    }

    fn log(&self, line: &str, level: LogLevel) {
        match self.mode {
            UiMode::Json => self.write_json(json!({
                "event": "log", "level": level, "line": line
            })),
            UiMode::Minimal => {
                if level != LogLevel::Debug || self.verbose {
                    self.write_plain(line);
                }
            }
            UiMode::Full => match level {
                LogLevel::Debug if !self.verbose => {}
                LogLevel::Debug => self.print_line(format!("    {}", style(line).dim())),
                LogLevel::Info => self.print_line(format!("  {} {}", style("→").dim(), line)),
                LogLevel::Warn => self.print_line(format!("  {}{}", WARNING, style(line).yellow())),
                LogLevel::Error => self.print_line(format!("  {}{}", CROSS, style(line).red().bold())),
            },
        }
    }

    fn show_error(&self, message: &str, details: Option<&[String]>) {
        match self.mode {
            UiMode::Json => self.write_json(json!({
                "event": "error", "message": message, "details": details
            })),
            UiMode::Minimal => self.write_plain(format!("error: {}", message)),
            UiMode::Full => {
                self.print_line(format!("\n{} {}", CROSS, style(message).red().bold()));
                for detail in details.unwrap_or_default() {
                    self.print_line(format!("     {}", style(detail).dim()));
                }
            }
        }
    }

    fn show_summary(&self, report: &RunSummary) {
        match self.mode {
            UiMode::Json => {
                let value = serde_json::to_value(report).unwrap_or_default();
                self.write_json(json!({ "event": "summary", "summary": value }));
            }
            UiMode::Minimal => {
                for line in report.lines() {
                    self.write_plain(line);
                }
            }
            UiMode::Full => {
                self.print_line("");
                self.print_line(format!("{}", style("═".repeat(50)).cyan()));
                let headline = if report.all_success() {
                    format!("{}{}", SPARKLE, style("Run complete").green().bold())
                } else if !report.interrupted.is_empty() {
                    format!("{}{}", PAUSE, style("Run interrupted").yellow().bold())
                } else {
                    format!("{}{}", CROSS, style("Run finished with failures").red().bold())
                };
                self.print_line(headline);
                self.print_line(format!("{}", style("═".repeat(50)).cyan()));

                if !report.completed.is_empty() {
                    self.print_line(format!(
                        "{}Completed: {}",
                        CHECK,
                        style(report.completed.len()).green()
                    ));
                    for name in &report.completed {
                        self.print_line(format!("     {}", name));
                    }
                }
                if !report.failed.is_empty() {
                    self.print_line(format!(
                        "{}Failed: {}",
                        CROSS,
                        style(report.failed.len()).red()
                    ));
                    for failed in &report.failed {
                        self.print_line(format!(
                            "     {}: {}",
                            failed.name,
                            style(&failed.error).red()
                        ));
                    }
                }
                if !report.interrupted.is_empty() {
                    self.print_line(format!(
                        "{}Interrupted: {}",
                        PAUSE,
                        style(report.interrupted.len()).yellow()
                    ));
                    for interrupted in &report.interrupted {
                        self.print_line(format!(
                            "     {} ({}%)",
                            interrupted.name,
                            style(interrupted.percentage).yellow()
                        ));
                    }
                }
                if !report.unfinished.is_empty() {
                    self.print_line(format!(
                        "  Not run: {}",
                        style(report.unfinished.join(", ")).dim()
                    ));
                }
                self.print_line(format!("{}Duration: {}", CLOCK, report.duration_label()));
                self.print_line("");
            }
        }
    }

    fn cleanup(&self) {
        self.with_bars(|bars| {
            for (_, state) in bars.drain() {
                state.bar.abandon();
            }
        });
        if self.mode == UiMode::Full {
            self.multi.clear().ok();
        }
        self.term.flush().ok();
    }
}
