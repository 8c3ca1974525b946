use grove::error::Result;
use grove::git::{Git, GitError};
use grove::scanner::{self, ScanMode};
use grove::workspace::Workspace;

/// `git grep` across every project, with project-relative prefixes.
pub fn run_grep(ws: &Workspace, pattern: String) -> Result<()> {
    grove::git::ensure_installed()?;
    let locals = scanner::scan_workspace(ws, ScanMode::Fast)?;

    let mut matched = false;
    for (key, local) in &locals {
        let git = Git::at(&local.path);
        match git.run(&["grep", "-n", &pattern]) {
            Ok(output) => {
                for line in output.lines() {
                    println!("{}/{line}", local.project.path);
                    matched = true;
                }
            }
            // Exit code 1 is git grep's "no matches here".
            Err(GitError::CommandFailed {
                exit_code: Some(1), ..
            }) => {}
            Err(e) => log::warn!("grep in {key}: {e}"),
        }
    }
    if !matched {
        println!("no matches for {pattern:?}");
    }
    Ok(())
}
