use grove::error::{Error, Result};
use grove::scanner::{self, ScanMode};
use grove::workspace::Workspace;

/// Per-project branch and dirtiness report.
pub fn run_status(ws: &Workspace) -> Result<()> {
    grove::git::ensure_installed()?;
    let projects = scanner::scan_workspace(ws, ScanMode::Fast)?;
    let states = scanner::collect_states(&projects);

    for (key, local) in &projects {
        let Some(state) = states.get(key) else {
            println!("{:40} (state unavailable)", key.name);
            continue;
        };
        let branch = state
            .current_branch
            .as_ref()
            .map(|b| b.name.clone())
            .unwrap_or_else(|| format!("(detached {})", &state.head_revision[..12.min(state.head_revision.len())]));
        let mut flags = Vec::new();
        if state.has_uncommitted {
            flags.push("uncommitted");
        }
        if state.has_untracked {
            flags.push("untracked");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        println!("{:40} {} @ {branch}{flags}", key.name, local.project.path);
    }
    Ok(())
}

/// Exit non-zero when any project carries uncommitted changes.
pub fn run_check_clean(ws: &Workspace) -> Result<()> {
    grove::git::ensure_installed()?;
    let projects = scanner::scan_workspace(ws, ScanMode::Fast)?;
    let states = scanner::collect_states(&projects);

    let mut dirty = Vec::new();
    for (key, _) in &projects {
        if let Some(state) = states.get(key)
            && state.has_uncommitted
        {
            dirty.push(key.clone());
        }
    }
    if dirty.is_empty() {
        return Ok(());
    }
    for key in &dirty {
        eprintln!("{key} has uncommitted changes");
    }
    Err(Error::Conflict(format!(
        "{} project{} with uncommitted changes",
        dirty.len(),
        if dirty.len() == 1 { "" } else { "s" }
    )))
}
