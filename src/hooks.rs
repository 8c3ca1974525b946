//! Post-update hook execution.
//!
//! Hooks are per-manifest action scripts owned by a project; they run from
//! the owning project's checkout with a per-phase deadline. Hook failures
//! count against the run but never abort it.

use std::process::{Command, Stdio};
use std::time::Duration;

use indexmap::IndexMap;
use wait_timeout::ChildExt;

use crate::error::{Error, Result};
use crate::manifest::{Hook, Project, ProjectKey};
use crate::retry::{self, Backoff};
use crate::workspace::Workspace;

/// Default bound on a single hook run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Run every hook, resolving each owning project by name through the
/// resolved map. Failures are counted on the workspace.
pub fn run_hooks(
    ws: &Workspace,
    hooks: &[Hook],
    projects: &IndexMap<ProjectKey, Project>,
    timeout: Duration,
    attempts: u32,
) -> Result<()> {
    for hook in hooks {
        if ws.cancelled() {
            return Err(Error::Interrupted);
        }
        if let Err(e) = run_one(ws, hook, projects, timeout, attempts) {
            log::error!("hook {:?}: {e}", hook.name);
            ws.count_failure();
        }
    }
    Ok(())
}

fn run_one(
    ws: &Workspace,
    hook: &Hook,
    projects: &IndexMap<ProjectKey, Project>,
    timeout: Duration,
    attempts: u32,
) -> Result<()> {
    let Some(project) = projects.values().find(|p| p.name == hook.project) else {
        return Err(Error::NotFound(format!(
            "hook {:?} names project {:?} which is not in the resolved set",
            hook.name, hook.project
        )));
    };
    let cwd = ws.root().join(&project.path);
    let script = cwd.join(&hook.action);
    if !script.exists() {
        return Err(Error::NotFound(format!(
            "hook script {} does not exist",
            script.display()
        )));
    }

    log::info!("running hook {:?} ({})", hook.name, script.display());
    retry::with_backoff(&format!("hook {}", hook.name), attempts, Backoff::default(), || {
        run_script(ws, &script, &cwd, timeout)
    })
}

fn run_script(
    ws: &Workspace,
    script: &std::path::Path,
    cwd: &std::path::Path,
    timeout: Duration,
) -> Result<()> {
    let mut child = Command::new(script)
        .current_dir(cwd)
        .env("PATH", ws.child_path_env())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound
                || e.kind() == std::io::ErrorKind::PermissionDenied
            {
                Error::ToolMissing(script.display().to_string())
            } else {
                Error::Io(e)
            }
        })?;

    match child.wait_timeout(timeout)? {
        Some(status) if status.success() => Ok(()),
        Some(status) => {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                use std::io::Read;
                let _ = pipe.read_to_string(&mut stderr);
            }
            Err(Error::Conflict(format!(
                "hook exited with {status}: {}",
                stderr.trim()
            )))
        }
        None => {
            child.kill()?;
            let _ = child.wait();
            Err(Error::Transient(format!(
                "hook exceeded its {}s deadline",
                timeout.as_secs()
            )))
        }
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn workspace_with_project() -> (tempfile::TempDir, Workspace, IndexMap<ProjectKey, Project>)
    {
        let tmp = tempfile::TempDir::new().unwrap();
        let ws = Workspace::init(tmp.path()).unwrap();
        let project = Project {
            name: "core".into(),
            path: "core".into(),
            remote: "https://example.com/core".into(),
            ..Default::default()
        };
        std::fs::create_dir_all(tmp.path().join("core")).unwrap();
        let projects = [(project.key(), project)].into_iter().collect();
        (tmp, ws, projects)
    }

    fn write_script(dir: &std::path::Path, name: &str, body: &str) {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }

    fn hook(name: &str, action: &str) -> Hook {
        Hook {
            name: name.into(),
            project: "core".into(),
            action: action.into(),
        }
    }

    #[test]
    fn successful_hook_counts_no_failures() {
        let (tmp, ws, projects) = workspace_with_project();
        write_script(&tmp.path().join("core"), "ok.sh", "exit 0");
        run_hooks(
            &ws,
            &[hook("ok", "ok.sh")],
            &projects,
            DEFAULT_TIMEOUT,
            1,
        )
        .unwrap();
        assert_eq!(ws.failures(), 0);
    }

    #[test]
    fn failing_hook_counts_but_does_not_abort() {
        let (tmp, ws, projects) = workspace_with_project();
        write_script(&tmp.path().join("core"), "bad.sh", "exit 3");
        write_script(&tmp.path().join("core"), "ok.sh", "exit 0");
        run_hooks(
            &ws,
            &[hook("bad", "bad.sh"), hook("ok", "ok.sh")],
            &projects,
            DEFAULT_TIMEOUT,
            1,
        )
        .unwrap();
        assert_eq!(ws.failures(), 1);
    }

    #[test]
    fn missing_script_is_a_counted_failure() {
        let (_tmp, ws, projects) = workspace_with_project();
        run_hooks(
            &ws,
            &[hook("ghost", "nope.sh")],
            &projects,
            DEFAULT_TIMEOUT,
            1,
        )
        .unwrap();
        assert_eq!(ws.failures(), 1);
    }

    #[test]
    fn hook_timeout_kills_the_child() {
        let (tmp, ws, projects) = workspace_with_project();
        write_script(&tmp.path().join("core"), "slow.sh", "sleep 30");
        let started = std::time::Instant::now();
        run_hooks(
            &ws,
            &[hook("slow", "slow.sh")],
            &projects,
            Duration::from_millis(200),
            1,
        )
        .unwrap();
        assert_eq!(ws.failures(), 1);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn unknown_project_is_a_counted_failure() {
        let (_tmp, ws, _) = workspace_with_project();
        let projects = IndexMap::new();
        run_hooks(
            &ws,
            &[hook("orphan", "x.sh")],
            &projects,
            DEFAULT_TIMEOUT,
            1,
        )
        .unwrap();
        assert_eq!(ws.failures(), 1);
    }
}
