//! The patch operator: fetch a Gerrit change into a project checkout.
//!
//! Fetches the change ref from the project's Gerrit host, optionally rebases
//! onto the configured remote branch, optionally cherry-picks instead of
//! checking out, and creates a `change/<cl>/<ps>` branch unless told not to.

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::gerrit::ChangeSpec;
use crate::git::{CheckoutOptions, FetchOptions, Git, RebaseOptions};
use crate::manifest::ProjectKey;
use crate::project::LocalProject;
use crate::retry::{self, Backoff};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Default)]
pub struct PatchOptions {
    /// Rebase the fetched change onto the configured remote branch.
    pub rebase: bool,
    /// Cherry-pick the change onto the current head instead of checking it
    /// out directly.
    pub cherry_pick: bool,
    /// Do not create the `change/<cl>/<ps>` branch; detach instead.
    pub no_branch: bool,
    /// Replace an existing `change/<cl>/<ps>` branch.
    pub force: bool,
    /// Override the remote branch to rebase onto.
    pub remote_branch: Option<String>,
}

/// Apply a change to the named project.
pub fn patch(
    ws: &Workspace,
    locals: &IndexMap<ProjectKey, LocalProject>,
    project_name: &str,
    change: &str,
    opts: &PatchOptions,
) -> Result<()> {
    let Some(local) = locals.values().find(|l| l.project.name == project_name) else {
        return Err(Error::ProjectNotFound(project_name.to_string()));
    };
    let project = &local.project;
    let host = if project.gerrit_host.is_empty() {
        return Err(Error::Config(format!(
            "project {project_name:?} has no gerrithost; cannot fetch changes"
        )));
    } else {
        project.gerrit_host.as_str()
    };

    let spec = ChangeSpec::parse(change)?;
    let git = Git::at(&local.path);

    log::info!(
        "fetching {} from {host} into {project_name}",
        spec.fetch_ref()
    );
    retry::with_backoff("fetch change", ws.attempts(), Backoff::default(), || {
        git.fetch(
            host,
            &FetchOptions {
                refspec: Some(spec.fetch_ref()),
                ..Default::default()
            },
        )
        .map_err(Error::from)
    })?;

    let branch = spec.branch_name();
    if !opts.no_branch {
        let exists = git.branches()?.iter().any(|b| b.name == branch);
        if exists {
            if !opts.force {
                return Err(Error::Conflict(format!(
                    "branch {branch:?} already exists in {project_name}; \
                     pass --force to replace it"
                )));
            }
            git.delete_branch(&branch, true)?;
        }
    }

    if opts.cherry_pick {
        cherry_pick_change(&git, project_name, &branch, opts)?;
    } else {
        checkout_change(&git, &branch, opts)?;
    }

    if opts.rebase {
        let remote_branch = opts
            .remote_branch
            .as_deref()
            .unwrap_or_else(|| project.remote_branch());
        let onto = format!("origin/{remote_branch}");
        if let Err(e) = git.rebase(&onto, &RebaseOptions::default()) {
            git.rebase_abort()?;
            return Err(Error::RebaseFailed {
                project: project_name.to_string(),
                detail: e.to_string(),
            });
        }
    }
    Ok(())
}

fn checkout_change(git: &Git, branch: &str, opts: &PatchOptions) -> Result<()> {
    if opts.no_branch {
        git.checkout(
            "FETCH_HEAD",
            &CheckoutOptions {
                detach: true,
                ..Default::default()
            },
        )?;
        return Ok(());
    }
    git.create_branch(branch, Some("FETCH_HEAD"))?;
    git.checkout(branch, &CheckoutOptions::default())?;
    Ok(())
}

/// Cherry-pick FETCH_HEAD onto the current head, restoring the original
/// checkout if the pick conflicts.
fn cherry_pick_change(
    git: &Git,
    project_name: &str,
    branch: &str,
    opts: &PatchOptions,
) -> Result<()> {
    let original = git.current_branch()?;
    let original_rev = git.current_revision()?;

    if !opts.no_branch {
        git.create_branch(branch, None)?;
        git.checkout(branch, &CheckoutOptions::default())?;
    }

    if let Err(e) = git.cherry_pick("FETCH_HEAD") {
        let _ = git.cherry_pick_abort();
        // Put the checkout back where it was.
        let restore = match &original {
            Some(name) => git.checkout(name, &CheckoutOptions::default()),
            None => git.checkout(
                &original_rev,
                &CheckoutOptions {
                    detach: true,
                    ..Default::default()
                },
            ),
        };
        if !opts.no_branch {
            let _ = git.delete_branch(branch, true);
        }
        restore?;
        return Err(Error::Conflict(format!(
            "cherry-pick into {project_name} conflicted and was aborted: {e}"
        )));
    }
    Ok(())
}
