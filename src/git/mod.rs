//! Typed façade over the external `git` binary.
//!
//! Everything the update engine does to a working copy goes through [`Git`],
//! which runs git with the bound directory as its working directory and
//! returns trimmed stdout. Failures carry a [`FailureKind`] classification;
//! retrying transient ones is the executor's responsibility.

use std::path::{Path, PathBuf};
use std::process::Command;

mod error;
mod parse;

pub use error::{FailureKind, GitError};

use parse::{parse_branches, parse_ls_remote, parse_remote_branches};
pub(crate) use parse::parse_porcelain_status;

/// A local branch with its tip and tracking information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub name: String,
    pub revision: String,
    /// Short name of the upstream (e.g. `origin/main`), if one is configured.
    pub tracking: Option<String>,
    /// Revision the upstream ref currently points at. Filled by the state
    /// scan; the for-each-ref listing leaves it `None`.
    pub tracking_revision: Option<String>,
    /// Whether this branch is currently checked out.
    pub is_head: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    pub depth: Option<u32>,
    /// Borrow objects from this repository via `--reference`.
    pub reference: Option<PathBuf>,
    pub no_checkout: bool,
    /// Bare clone (object cache repositories).
    pub bare: bool,
    /// Partial clone: `--filter=blob:none`.
    pub omit_blobs: bool,
    pub dissociate: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub refspec: Option<String>,
    pub prune: bool,
    pub all: bool,
    /// `Some(true)` forces `--recurse-submodules=on-demand`, `Some(false)`
    /// forces `--recurse-submodules=no`; `None` leaves git's default.
    pub recurse_submodules: Option<bool>,
    pub tags: bool,
    pub depth: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct CheckoutOptions {
    pub detach: bool,
    pub recurse_submodules: bool,
    pub force: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RebaseOptions {
    pub rebase_merges: bool,
}

/// Verify the git binary is reachable before the run starts.
pub fn ensure_installed() -> Result<(), GitError> {
    which::which("git").map(|_| ()).map_err(|_| GitError::Missing)
}

/// Whether `path` looks like the top of a git working copy.
pub fn is_repository(path: &Path) -> bool {
    path.join(".git").exists()
}

/// Git operations bound to a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    dir: PathBuf,
}

impl Git {
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run git with `args`, returning stdout. Non-zero exit becomes a
    /// [`GitError::CommandFailed`] carrying stderr for classification.
    pub fn run(&self, args: &[&str]) -> Result<String, GitError> {
        log::debug!("$ git {} [{}]", args.join(" "), self.dir.display());
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.dir)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    GitError::Missing
                } else {
                    GitError::command_failed(args, None, &e.to_string())
                }
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitError::command_failed(
                args,
                output.status.code(),
                &stderr,
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run git and report only whether it exited zero. For commands that use
    /// the exit code as a boolean, like `merge-base --is-ancestor`.
    pub fn run_ok(&self, args: &[&str]) -> Result<bool, GitError> {
        log::debug!("$ git {} [{}]", args.join(" "), self.dir.display());
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.dir)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    GitError::Missing
                } else {
                    GitError::command_failed(args, None, &e.to_string())
                }
            })?;
        Ok(output.status.success())
    }

    // Repository lifecycle

    pub fn init(&self) -> Result<(), GitError> {
        self.run(&["init"]).map(|_| ())
    }

    /// Clone `remote` into `dest` (an absolute path; the bound directory is
    /// only the cwd the subprocess runs from).
    pub fn clone(&self, remote: &str, dest: &Path, opts: &CloneOptions) -> Result<(), GitError> {
        let mut args: Vec<String> = vec!["clone".into()];
        if let Some(depth) = opts.depth {
            args.push(format!("--depth={depth}"));
        }
        if let Some(reference) = &opts.reference {
            args.push("--reference".into());
            args.push(reference.display().to_string());
        }
        if opts.no_checkout {
            args.push("--no-checkout".into());
        }
        if opts.bare {
            args.push("--bare".into());
        }
        if opts.omit_blobs {
            args.push("--filter=blob:none".into());
        }
        if opts.dissociate {
            args.push("--dissociate".into());
        }
        args.push(remote.into());
        args.push(dest.display().to_string());
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&argv).map(|_| ())
    }

    pub fn fetch(&self, remote: &str, opts: &FetchOptions) -> Result<(), GitError> {
        let mut args: Vec<String> = vec!["fetch".into()];
        if opts.all {
            args.push("--all".into());
        }
        if opts.prune {
            args.push("--prune".into());
        }
        if opts.tags {
            args.push("--tags".into());
        }
        match opts.recurse_submodules {
            Some(true) => args.push("--recurse-submodules=on-demand".into()),
            Some(false) => args.push("--recurse-submodules=no".into()),
            None => {}
        }
        if let Some(depth) = opts.depth {
            args.push(format!("--depth={depth}"));
        }
        if !opts.all {
            args.push(remote.into());
        }
        if let Some(refspec) = &opts.refspec {
            args.push(refspec.clone());
        }
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&argv).map(|_| ())
    }

    pub fn ls_remote(&self, remote: &str, pattern: &str) -> Result<String, GitError> {
        self.run(&["ls-remote", remote, pattern])
    }

    /// Resolve a remote branch head without a local checkout.
    pub fn remote_branch_head(&self, remote: &str, branch: &str) -> Result<String, GitError> {
        let wanted = format!("refs/heads/{branch}");
        let output = self.ls_remote(remote, &wanted)?;
        parse_ls_remote(&output, &wanted).ok_or_else(|| {
            GitError::ParseError(format!("{remote} does not advertise {wanted}"))
        })
    }

    /// Read a file's contents as of a commit, without touching the work tree.
    pub fn show_file(&self, revision: &str, path: &str) -> Result<String, GitError> {
        self.run(&["show", &format!("{revision}:{path}")])
    }

    // Work tree state

    pub fn checkout(&self, reference: &str, opts: &CheckoutOptions) -> Result<(), GitError> {
        let mut args = vec!["checkout"];
        if opts.detach {
            args.push("--detach");
        }
        if opts.force {
            args.push("--force");
        }
        if opts.recurse_submodules {
            args.push("--recurse-submodules");
        }
        args.push(reference);
        self.run(&args).map(|_| ())
    }

    pub fn rebase(&self, upstream: &str, opts: &RebaseOptions) -> Result<(), GitError> {
        let mut args = vec!["rebase"];
        if opts.rebase_merges {
            args.push("--rebase-merges");
        }
        args.push(upstream);
        self.run(&args).map(|_| ())
    }

    pub fn rebase_abort(&self) -> Result<(), GitError> {
        self.run(&["rebase", "--abort"]).map(|_| ())
    }

    pub fn cherry_pick(&self, reference: &str) -> Result<(), GitError> {
        self.run(&["cherry-pick", reference]).map(|_| ())
    }

    pub fn cherry_pick_abort(&self) -> Result<(), GitError> {
        self.run(&["cherry-pick", "--abort"]).map(|_| ())
    }

    pub fn merge_ff_only(&self, reference: &str) -> Result<(), GitError> {
        self.run(&["merge", "--ff-only", reference]).map(|_| ())
    }

    // Branches

    pub fn create_branch(&self, name: &str, start: Option<&str>) -> Result<(), GitError> {
        let mut args = vec!["branch", name];
        if let Some(start) = start {
            args.push(start);
        }
        self.run(&args).map(|_| ())
    }

    pub fn delete_branch(&self, name: &str, force: bool) -> Result<(), GitError> {
        let flag = if force { "-D" } else { "-d" };
        self.run(&["branch", flag, name]).map(|_| ())
    }

    /// Force-move a branch to a revision without checking it out.
    pub fn reset_branch(&self, name: &str, revision: &str) -> Result<(), GitError> {
        self.run(&["branch", "--force", name, revision]).map(|_| ())
    }

    pub fn set_upstream(&self, branch: &str, upstream: &str) -> Result<(), GitError> {
        self.run(&["branch", "--set-upstream-to", upstream, branch])
            .map(|_| ())
    }

    /// All local branches with tip, tracking, and HEAD marker.
    pub fn branches(&self) -> Result<Vec<Branch>, GitError> {
        let output = self.run(&[
            "for-each-ref",
            "refs/heads",
            "--format=%(refname:short)%09%(objectname)%09%(upstream:short)%09%(HEAD)",
        ])?;
        parse_branches(&output)
    }

    /// Remote branches whose history contains `sha`.
    pub fn remote_branches_containing(&self, sha: &str) -> Result<Vec<String>, GitError> {
        let output = self.run(&[
            "branch",
            "--remotes",
            "--contains",
            sha,
            "--format=%(refname:short)",
        ])?;
        Ok(parse_remote_branches(&output))
    }

    pub fn current_branch(&self) -> Result<Option<String>, GitError> {
        let output = self.run(&["branch", "--show-current"])?;
        let name = output.trim();
        Ok((!name.is_empty()).then(|| name.to_string()))
    }

    pub fn current_revision(&self) -> Result<String, GitError> {
        self.rev_parse("HEAD")
    }

    pub fn rev_parse(&self, reference: &str) -> Result<String, GitError> {
        let output = self.run(&["rev-parse", "--verify", reference])?;
        Ok(output.trim().to_string())
    }

    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool, GitError> {
        self.run_ok(&["merge-base", "--is-ancestor", ancestor, descendant])
    }

    // Status

    pub fn short_status(&self) -> Result<String, GitError> {
        self.run(&["status", "--porcelain"])
    }

    pub fn has_uncommitted(&self) -> Result<bool, GitError> {
        Ok(parse_porcelain_status(&self.short_status()?).0)
    }

    pub fn has_untracked(&self) -> Result<bool, GitError> {
        Ok(parse_porcelain_status(&self.short_status()?).1)
    }

    // History

    pub fn one_line_log(&self, reference: &str) -> Result<String, GitError> {
        let output = self.run(&["log", "-1", "--format=%h %s", reference])?;
        Ok(output.trim().to_string())
    }

    pub fn commit_message(&self, reference: &str) -> Result<String, GitError> {
        self.run(&["log", "-1", "--format=%B", reference])
    }

    /// Commit shas of `base..head`, newest first.
    pub fn rev_list(&self, base: &str, head: &str) -> Result<Vec<String>, GitError> {
        let range = format!("{base}..{head}");
        let output = self.run(&["rev-list", &range])?;
        Ok(output.lines().map(str::to_owned).collect())
    }

    // Remotes and config

    pub fn add_remote(&self, name: &str, url: &str) -> Result<(), GitError> {
        self.run(&["remote", "add", name, url]).map(|_| ())
    }

    pub fn remove_remote(&self, name: &str) -> Result<(), GitError> {
        self.run(&["remote", "remove", name]).map(|_| ())
    }

    pub fn set_remote_url(&self, name: &str, url: &str) -> Result<(), GitError> {
        self.run(&["remote", "set-url", name, url]).map(|_| ())
    }

    pub fn remote_url(&self, name: &str) -> Result<Option<String>, GitError> {
        match self.run(&["remote", "get-url", name]) {
            Ok(url) => Ok(Some(url.trim().to_string())),
            Err(_) => Ok(None),
        }
    }

    pub fn config_set(&self, key: &str, value: &str) -> Result<(), GitError> {
        self.run(&["config", key, value]).map(|_| ())
    }

    pub fn config_get(&self, key: &str) -> Result<Option<String>, GitError> {
        match self.run(&["config", key]) {
            Ok(value) => Ok(Some(value.trim().to_string())),
            Err(_) => Ok(None),
        }
    }

    /// Point a workspace-managed ref (e.g. `GROVE_HEAD`) at a revision.
    pub fn update_ref(&self, name: &str, revision: &str) -> Result<(), GitError> {
        self.run(&["update-ref", name, revision]).map(|_| ())
    }

    pub fn read_ref(&self, name: &str) -> Result<Option<String>, GitError> {
        match self.run(&["rev-parse", "--verify", "--quiet", name]) {
            Ok(sha) => Ok(Some(sha.trim().to_string())),
            Err(_) => Ok(None),
        }
    }

    /// The repository's git directory, resolved through worktree indirection.
    pub fn git_dir(&self) -> Result<PathBuf, GitError> {
        let output = self.run(&["rev-parse", "--git-dir"])?;
        let path = PathBuf::from(output.trim());
        if path.is_absolute() {
            Ok(path)
        } else {
            Ok(self.dir.join(path))
        }
    }

    // Submodules

    pub fn submodule_init(&self) -> Result<(), GitError> {
        self.run(&["submodule", "init"]).map(|_| ())
    }

    pub fn submodule_deinit_all(&self) -> Result<(), GitError> {
        self.run(&["submodule", "deinit", "--all", "--force"])
            .map(|_| ())
    }

    pub fn submodule_status(&self) -> Result<String, GitError> {
        self.run(&["submodule", "status"])
    }

    pub fn submodule_update(&self) -> Result<(), GitError> {
        self.run(&["submodule", "update", "--init", "--recursive"])
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_options_compose_flags() {
        // Exercise the argv construction through a guaranteed-failing run so
        // no network or repository is needed.
        let git = Git::at(std::env::temp_dir());
        let opts = CloneOptions {
            depth: Some(1),
            omit_blobs: true,
            ..Default::default()
        };
        let err = git
            .clone("file:///nonexistent/grove-test-remote", Path::new("/nonexistent/dest"), &opts)
            .unwrap_err();
        match err {
            GitError::CommandFailed { command, .. } => {
                assert!(command.contains("--depth=1"), "{command}");
                assert!(command.contains("--filter=blob:none"), "{command}");
            }
            GitError::Missing => {} // environment without git; nothing to assert
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn fetch_options_compose_flags() {
        let git = Git::at(std::env::temp_dir());
        let opts = FetchOptions {
            prune: true,
            tags: true,
            recurse_submodules: Some(false),
            refspec: Some("+refs/heads/*:refs/remotes/origin/*".into()),
            ..Default::default()
        };
        let err = git.fetch("file:///nonexistent/remote", &opts).unwrap_err();
        match err {
            GitError::CommandFailed { command, .. } => {
                assert!(command.contains("--prune"), "{command}");
                assert!(command.contains("--tags"), "{command}");
                assert!(command.contains("--recurse-submodules=no"), "{command}");
                assert!(command.contains("+refs/heads/*"), "{command}");
            }
            GitError::Missing => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
