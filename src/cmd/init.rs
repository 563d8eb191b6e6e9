//! `docgen init`: scaffold the `.docgen/` directory.

use anyhow::{Context, Result};
use docgen::config::DOCGEN_DIR;
use std::path::Path;

const SAMPLE_CONFIG: &str = r#"# docgen configuration. Every key is optional.

[tracker]
duplicate_policy = "reject"        # reject | reset
unknown_task_policy = "ignore"     # ignore | auto_register
requeue_interrupted = true         # rerun interrupted tasks on `docgen run --resume`

[ui]
mode = "full"                      # full | minimal | json
listen_escape = true               # Escape interrupts like Ctrl+C
interrupt_debounce_ms = 300

[paths]
checkpoint = ".docgen/checkpoint.json"
plan = ".docgen/plan.toml"
logs = ".docgen/logs"
"#;

const SAMPLE_PLAN: &str = r#"# Tasks run in order. Print <progress>N</progress> (0-100) to report progress.

[[tasks]]
id = "api"
name = "API reference"
command = "echo 'collecting symbols'; echo '<progress>50</progress>'; echo 'API reference written'"

[[tasks]]
id = "guide"
name = "User guide"

[[tasks.steps]]
id = "outline"
name = "Outline"
command = "echo '<progress>100</progress> outline ready'"

[[tasks.steps]]
id = "render"
name = "Render"
command = "echo 'rendered'"
"#;

pub fn cmd_init(project_dir: &Path) -> Result<()> {
    let docgen_dir = project_dir.join(DOCGEN_DIR);
    std::fs::create_dir_all(docgen_dir.join("logs"))
        .with_context(|| format!("Failed to create {}", docgen_dir.display()))?;

    let mut created = Vec::new();
    for (name, content) in [("docgen.toml", SAMPLE_CONFIG), ("plan.toml", SAMPLE_PLAN)] {
        let path = docgen_dir.join(name);
        if path.exists() {
            continue;
        }
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        created.push(name);
    }

    if created.is_empty() {
        println!("docgen already initialized at {}", docgen_dir.display());
        return Ok(());
    }

    println!("Initialized docgen at {}", docgen_dir.display());
    println!();
    for name in created {
        println!("  created {}/{}", DOCGEN_DIR, name);
    }
    println!();
    println!("Next steps:");
    println!("  1. Edit .docgen/plan.toml to describe your tasks");
    println!("  2. Run `docgen run`");
    Ok(())
}
