//! Run a shell command in every project, in parallel.
//!
//! Output is buffered per project and printed under a lock so interleaving
//! never mixes two projects' lines. Command failures count against the run
//! the same way per-project update failures do.

use std::process::Command;
use std::sync::Mutex;

use crossbeam_channel::unbounded;
use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::manifest::ProjectKey;
use crate::project::LocalProject;
use crate::workspace::Workspace;

/// What one project's run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub key: ProjectKey,
    pub success: bool,
    pub output: String,
}

/// Run `command` (via `sh -c`) in each project's checkout with up to
/// `ws.jobs()` in flight. Returns outcomes in project order.
pub fn run_each(
    ws: &Workspace,
    locals: &IndexMap<ProjectKey, LocalProject>,
    command: &str,
) -> Result<Vec<RunOutcome>> {
    if locals.is_empty() {
        return Ok(Vec::new());
    }
    let items: Vec<(&ProjectKey, &LocalProject)> = locals.iter().collect();
    let (tx, rx) = unbounded::<usize>();
    for index in 0..items.len() {
        tx.send(index).expect("fresh channel");
    }
    drop(tx);

    let outcomes: Mutex<Vec<Option<RunOutcome>>> =
        Mutex::new((0..items.len()).map(|_| None).collect());
    let workers = ws.jobs().min(items.len()).max(1);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let rx = rx.clone();
            let items = &items;
            let outcomes = &outcomes;
            scope.spawn(move || {
                while let Ok(index) = rx.recv() {
                    if ws.cancelled() {
                        break;
                    }
                    let (key, local) = items[index];
                    let outcome = run_in(ws, key, local, command);
                    outcomes.lock().expect("no panics hold this lock")[index] = Some(outcome);
                }
            });
        }
    });

    if ws.cancelled() {
        return Err(Error::Interrupted);
    }
    let outcomes: Vec<RunOutcome> = outcomes
        .into_inner()
        .expect("workers joined")
        .into_iter()
        .flatten()
        .collect();
    for outcome in &outcomes {
        if !outcome.success {
            ws.count_failure();
        }
    }
    Ok(outcomes)
}

fn run_in(ws: &Workspace, key: &ProjectKey, local: &LocalProject, command: &str) -> RunOutcome {
    let result = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(&local.path)
        .env("PATH", ws.child_path_env())
        .output();
    match result {
        Ok(output) => {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            RunOutcome {
                key: key.clone(),
                success: output.status.success(),
                output: text,
            }
        }
        Err(e) => RunOutcome {
            key: key.clone(),
            success: false,
            output: format!("cannot run {command:?}: {e}\n"),
        },
    }
}
