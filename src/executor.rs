//! Operation execution.
//!
//! Three phases in order: creates (parallel, scheduled over a path trie so a
//! parent directory's project lands before any project nested inside it),
//! deletes (sequential, deepest first), then everything else (sequential in
//! plan order, because moves rewrite the sources of later moves).
//!
//! Per-project failures are counted on the workspace handle and never abort
//! the run; a non-zero count at the end surfaces as the non-fatal-errors
//! outcome.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, unbounded};

use crate::error::{Error, Result};
use crate::fsops;
use crate::git::{CheckoutOptions, CloneOptions, FetchOptions, Git, RebaseOptions};
use crate::manifest::Project;
use crate::plan::{OpKind, Operation, RebaseFlags};
use crate::project::{self, GROVE_HEAD_REF, ProjectState};
use crate::retry::{self, Backoff};
use crate::workspace::Workspace;

/// Temporary remote name used while verifying a change-remote.
const VERIFY_REMOTE: &str = "grove-verify";

#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Actually delete obsolete projects; off means list them only.
    pub gc: bool,
    /// Snapshot timestamp recorded into each project's metadata.
    pub timestamp: String,
}

/// Run the full plan. Returns `Err` only for fatal conditions (cancellation,
/// missing tools); ordinary per-project failures are counted instead.
pub fn execute(ws: &Workspace, ops: &[Operation], opts: &ExecOptions) -> Result<()> {
    let creates: Vec<&Operation> = ops.iter().filter(|o| o.kind() == OpKind::Create).collect();
    let deletes: Vec<&Operation> = ops.iter().filter(|o| o.kind() == OpKind::Delete).collect();
    let others: Vec<&Operation> = ops
        .iter()
        .filter(|o| !matches!(o.kind(), OpKind::Create | OpKind::Delete))
        .collect();

    run_creates(ws, &creates, &|op| run_one_create(ws, op, opts))?;
    check_cancelled(ws)?;
    run_deletes(ws, &deletes, opts)?;
    check_cancelled(ws)?;
    run_others(ws, &others, opts)?;
    Ok(())
}

fn check_cancelled(ws: &Workspace) -> Result<()> {
    if ws.cancelled() {
        Err(Error::Interrupted)
    } else {
        Ok(())
    }
}

// Create phase

struct TrieNode {
    op_index: usize,
    children: Vec<usize>,
}

/// Arrange create operations (pre-sorted by the planner in component-wise
/// path order, so every destination follows its ancestors immediately) into
/// a forest where each node's children are the creates nested directly
/// inside it. Returns the nodes plus the root indices.
fn build_create_forest(ops: &[&Operation]) -> (Vec<TrieNode>, Vec<usize>) {
    let mut nodes: Vec<TrieNode> = Vec::with_capacity(ops.len());
    let mut roots = Vec::new();
    // Stack of indices whose destinations are ancestors of the current op.
    let mut stack: Vec<usize> = Vec::new();

    for (i, op) in ops.iter().enumerate() {
        let dest = Path::new(op.destination());
        while let Some(&top) = stack.last() {
            let top_dest = Path::new(ops[top].destination());
            if dest.starts_with(top_dest) && dest != top_dest {
                break;
            }
            stack.pop();
        }
        nodes.push(TrieNode {
            op_index: i,
            children: Vec::new(),
        });
        match stack.last() {
            Some(&parent) => nodes[parent].children.push(i),
            None => roots.push(i),
        }
        stack.push(i);
    }
    (nodes, roots)
}

/// Drive the create forest with a worker pool: a node's operation runs before
/// its children are scheduled, which is the only ordering creates need.
fn run_creates(
    ws: &Workspace,
    ops: &[&Operation],
    run: &(dyn Fn(&Operation) -> Result<()> + Sync),
) -> Result<()> {
    if ops.is_empty() {
        return Ok(());
    }
    let (nodes, roots) = build_create_forest(ops);
    let pending = AtomicUsize::new(nodes.len());
    let (tx, rx) = unbounded::<usize>();
    for root in roots {
        tx.send(root).expect("fresh channel");
    }

    let workers = ws.jobs().min(nodes.len()).max(1);
    std::thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let rx = rx.clone();
            let pending = &pending;
            let nodes = &nodes;
            scope.spawn(move || {
                loop {
                    if pending.load(Ordering::SeqCst) == 0 {
                        break;
                    }
                    let index = match rx.recv_timeout(Duration::from_millis(25)) {
                        Ok(index) => index,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    };
                    let node = &nodes[index];
                    let op = ops[node.op_index];
                    if !ws.cancelled()
                        && let Err(e) = run(op)
                    {
                        log::error!("{}: {e}", op.describe());
                        ws.count_failure();
                    }
                    // Children are scheduled even when the parent failed so
                    // their failures are reported individually.
                    for &child in &node.children {
                        let _ = tx.send(child);
                    }
                    pending.fetch_sub(1, Ordering::SeqCst);
                }
            });
        }
    });
    check_cancelled(ws)
}

fn run_one_create(ws: &Workspace, op: &Operation, opts: &ExecOptions) -> Result<()> {
    let Operation::Create { project, destination } = op else {
        return Ok(());
    };
    log::info!("{}", op.describe());
    let dest = ws.root().join(destination);

    if submodule_managed_elsewhere(ws, project) {
        // The superproject materializes this checkout.
        return Ok(());
    }

    if dest == ws.root() {
        return create_in_place(ws, project, &dest, opts);
    }

    if dest.exists() && !fsops::is_empty_dir(&dest)? {
        return Err(Error::Conflict(format!(
            "cannot create {} at {}: directory exists and is not empty; \
             move it aside and rerun",
            project.key(),
            dest.display()
        )));
    }

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let cache = cache_repo(ws, &project.remote);
    let clone_opts = CloneOptions {
        depth: project.history_depth,
        // The cache only helps full-history clones.
        reference: cache.filter(|_| project.history_depth.is_none()),
        omit_blobs: ws.config().partial_clone,
        dissociate: ws.config().dissociate,
        ..Default::default()
    };
    let parent_git = Git::at(dest.parent().unwrap_or_else(|| ws.root()));
    retry::with_backoff("clone", ws.attempts(), Backoff::default(), || {
        parent_git
            .clone(&project.remote, &dest, &clone_opts)
            .map_err(Error::from)
    })?;

    let git = Git::at(&dest);
    checkout_initial(&git, project)?;

    // The clone's default branch would otherwise shadow the detached state
    // on the next scan.
    for branch in git.branches()? {
        if let Err(e) = git.delete_branch(&branch.name, true) {
            log::debug!("could not drop clone branch {}: {e}", branch.name);
        }
    }

    finish_sync(ws, &git, project, &dest, &opts.timestamp)
}

/// The workspace root itself is the project: initialize git in place rather
/// than cloning over a directory that already holds the metadata dir.
fn create_in_place(
    ws: &Workspace,
    project: &Project,
    dest: &Path,
    opts: &ExecOptions,
) -> Result<()> {
    let git = Git::at(dest);
    if !crate::git::is_repository(dest) {
        git.init()?;
        git.add_remote("origin", &project.remote)?;
    }
    git.config_set("remote.origin.fetch", "+refs/heads/*:refs/remotes/origin/*")?;
    if ws.config().partial_clone {
        git.config_set("remote.origin.promisor", "true")?;
        git.config_set("remote.origin.partialclonefilter", "blob:none")?;
    }
    if let Some(cache) = cache_repo(ws, &project.remote) {
        let alternates = dest.join(".git/objects/info/alternates");
        let objects = cache.join("objects");
        fsops::safe_write(&alternates, format!("{}\n", objects.display()).as_bytes())?;
    }
    retry::with_backoff("fetch", ws.attempts(), Backoff::default(), || {
        git.fetch("origin", &FetchOptions::default()).map_err(Error::from)
    })?;
    // Dissociating an in-place checkout means copying the borrowed objects
    // home and dropping the alternates pointer.
    if ws.config().dissociate {
        let alternates = dest.join(".git/objects/info/alternates");
        if alternates.exists() {
            git.run(&["repack", "-a", "-d"])?;
            std::fs::remove_file(&alternates)?;
        }
    }
    checkout_initial(&git, project)?;
    finish_sync(ws, &git, project, dest, &opts.timestamp)
}

fn checkout_initial(git: &Git, project: &Project) -> Result<()> {
    let target = if project.is_pinned() {
        project.revision.clone()
    } else {
        format!("refs/remotes/origin/{}", project.remote_branch())
    };
    git.checkout(
        &target,
        &CheckoutOptions {
            detach: true,
            ..Default::default()
        },
    )?;
    Ok(())
}

/// Shared tail of every successful create/update: record the synced revision
/// and refresh the metadata file.
fn finish_sync(
    ws: &Workspace,
    git: &Git,
    project: &Project,
    path: &Path,
    timestamp: &str,
) -> Result<()> {
    let head = git.current_revision()?;
    git.update_ref(GROVE_HEAD_REF, &head)?;
    if ws.config().submodules_enabled() && project.git_submodules {
        git.submodule_update()?;
    }
    project::write_metadata(path, project, timestamp)
}

fn submodule_managed_elsewhere(ws: &Workspace, project: &Project) -> bool {
    ws.config().submodules_enabled() && !project.git_submodule_of.is_empty()
}

/// Object cache repository for a remote, cloned bare on first use. A cache
/// failure degrades to an inline clone rather than failing the create.
fn cache_repo(ws: &Workspace, remote: &str) -> Option<PathBuf> {
    let cache_root = ws.cache_dir()?;
    let repo = cache_root.join(sanitize_remote(remote));
    if repo.exists() {
        return Some(repo);
    }
    if let Err(e) = std::fs::create_dir_all(&cache_root) {
        log::warn!("cannot create cache dir {}: {e}", cache_root.display());
        return None;
    }
    let git = Git::at(&cache_root);
    let opts = CloneOptions {
        bare: true,
        ..Default::default()
    };
    match git.clone(remote, &repo, &opts) {
        Ok(()) => Some(repo),
        Err(e) => {
            log::warn!("cache clone of {remote} failed; cloning inline: {e}");
            None
        }
    }
}

fn sanitize_remote(remote: &str) -> String {
    remote
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// Delete phase

fn run_deletes(ws: &Workspace, ops: &[&Operation], opts: &ExecOptions) -> Result<()> {
    if !opts.gc {
        for op in ops {
            log::info!(
                "{}; not deleting (pass --gc to garbage-collect)",
                op.describe()
            );
        }
        return Ok(());
    }
    for op in ops {
        check_cancelled(ws)?;
        if let Err(e) = run_one_delete(ws, op) {
            log::error!("{}: {e}", op.describe());
            ws.count_failure();
        }
    }
    Ok(())
}

fn run_one_delete(ws: &Workspace, op: &Operation) -> Result<()> {
    let Operation::Delete { project, source } = op else {
        return Ok(());
    };
    let path = ws.root().join(source);
    if !path.exists() {
        return Ok(());
    }
    let key = project.key();

    // Anything the user might still want stops the delete; suppression is an
    // actionable message, not a failure.
    let state = ProjectState::scan(&path)?;
    if !state.branches.is_empty() {
        let names: Vec<&str> = state.branches.iter().map(|b| b.name.as_str()).collect();
        log::warn!(
            "not deleting {key} at {source:?}: it has branches [{}]; \
             delete them (or the directory) manually to remove it",
            names.join(", ")
        );
        return Ok(());
    }
    if state.has_uncommitted {
        log::warn!(
            "not deleting {key} at {source:?}: it has uncommitted changes; \
             commit or discard them manually to remove it"
        );
        return Ok(());
    }
    if state.has_untracked {
        log::warn!(
            "not deleting {key} at {source:?}: it has untracked files; \
             remove them manually to remove it"
        );
        return Ok(());
    }

    log::info!("{}", op.describe());
    std::fs::remove_dir_all(&path)?;
    if let Some(parent) = path.parent() {
        fsops::remove_empty_parents(ws.root(), parent)?;
    }
    Ok(())
}

// Move / change-remote / update / null phase

fn run_others(ws: &Workspace, ops: &[&Operation], opts: &ExecOptions) -> Result<()> {
    // Moves rewrite the on-disk location of everything nested under them;
    // later operations see their sources through the accumulated rewrites.
    let mut rewrites: Vec<(String, String)> = Vec::new();
    for op in ops {
        check_cancelled(ws)?;
        let result = match op {
            Operation::Move {
                project,
                source,
                destination,
                rebase,
            } => {
                let effective = apply_rewrites(&rewrites, source);
                let moved = run_one_move(ws, project, &effective, destination, *rebase, opts);
                if moved.is_ok() {
                    rewrites.push((effective, destination.clone()));
                }
                moved
            }
            Operation::ChangeRemote {
                project,
                path,
                old_remote,
                rebase,
            } => run_one_change_remote(ws, project, path, old_remote, *rebase, opts),
            Operation::Update {
                project,
                path,
                rebase,
            } => run_one_update(ws, project, path, *rebase, opts),
            Operation::Null { project, path } => run_one_null(ws, project, path, opts),
            _ => Ok(()),
        };
        if let Err(e) = result {
            log::error!("{}: {e}", op.describe());
            ws.count_failure();
        }
    }
    Ok(())
}

/// Map a planner-recorded source path through the moves already applied.
fn apply_rewrites(rewrites: &[(String, String)], source: &str) -> String {
    let mut current = source.to_string();
    for (from, to) in rewrites {
        let from_path = Path::new(from);
        if let Ok(rest) = Path::new(&current).strip_prefix(from_path) {
            let mut rewritten = PathBuf::from(to);
            rewritten.push(rest);
            current = rewritten.to_string_lossy().into_owned();
        }
    }
    current
}

fn run_one_move(
    ws: &Workspace,
    project: &Project,
    source: &str,
    destination: &str,
    rebase: RebaseFlags,
    opts: &ExecOptions,
) -> Result<()> {
    log::info!("move {} from {source:?} to {destination:?}", project.key());
    if source != destination {
        let src = ws.root().join(source);
        let dst = ws.root().join(destination);
        fsops::swap_rename(&ws.swap_dir(), &src, &dst)?;
        if let Some(parent) = src.parent() {
            fsops::remove_empty_parents(ws.root(), parent)?;
        }
    }
    // A move also advances the revision.
    run_one_update(ws, project, destination, rebase, opts)
}

fn run_one_change_remote(
    ws: &Workspace,
    project: &Project,
    path: &str,
    old_remote: &str,
    rebase: RebaseFlags,
    opts: &ExecOptions,
) -> Result<()> {
    let key = project.key();
    log::info!(
        "change remote of {key} at {path:?} from {old_remote:?} to {:?}",
        project.remote
    );
    let git = Git::at(ws.root().join(path));

    // Fetch the new remote under a scratch name and prove every local branch
    // is reachable from it before touching origin.
    let _ = git.remove_remote(VERIFY_REMOTE);
    git.add_remote(VERIFY_REMOTE, &project.remote)?;
    let verified = (|| -> Result<()> {
        retry::with_backoff("fetch new remote", ws.attempts(), Backoff::default(), || {
            git.fetch(VERIFY_REMOTE, &FetchOptions::default())
                .map_err(Error::from)
        })?;
        for branch in git.branches()? {
            let prefix = format!("{VERIFY_REMOTE}/");
            let reachable = git
                .remote_branches_containing(&branch.revision)?
                .iter()
                .any(|r| r.starts_with(&prefix));
            if !reachable {
                return Err(Error::Conflict(format!(
                    "branch {:?} of {key} is not reachable from any branch on \
                     {:?}; push or delete it, then rerun (the remote was left \
                     unchanged)",
                    branch.name, project.remote
                )));
            }
        }
        Ok(())
    })();
    let cleanup = git.remove_remote(VERIFY_REMOTE);
    verified?;
    cleanup?;

    git.set_remote_url("origin", &project.remote)?;
    retry::with_backoff("fetch", ws.attempts(), Backoff::default(), || {
        git.fetch(
            "origin",
            &FetchOptions {
                prune: true,
                ..Default::default()
            },
        )
        .map_err(Error::from)
    })?;
    run_one_update(ws, project, path, rebase, opts)
}

fn run_one_update(
    ws: &Workspace,
    project: &Project,
    path: &str,
    rebase: RebaseFlags,
    opts: &ExecOptions,
) -> Result<()> {
    if submodule_managed_elsewhere(ws, project) {
        return Ok(());
    }
    let abs = ws.root().join(path);
    let git = Git::at(&abs);
    log::info!("update {} at {path:?}", project.key());

    retry::with_backoff("fetch", ws.attempts(), Backoff::default(), || {
        git.fetch(
            "origin",
            &FetchOptions {
                prune: true,
                ..Default::default()
            },
        )
        .map_err(Error::from)
    })?;

    let desired = if project.is_pinned() {
        project.revision.clone()
    } else {
        git.rev_parse(&format!("refs/remotes/origin/{}", project.remote_branch()))?
    };

    sync_branches(&git, project, &desired, rebase)?;

    git.update_ref(GROVE_HEAD_REF, &desired)?;
    if ws.config().submodules_enabled() && project.git_submodules {
        git.submodule_update()?;
    }
    project::write_metadata(&abs, project, &opts.timestamp)
}

/// Per-branch synchronization to `desired`:
/// tracked branches fast-forward when possible and rebase when allowed;
/// untracked branches rebase only under `rebase-untracked` + `rebase-all`;
/// a detached HEAD simply checks out the new revision.
fn sync_branches(git: &Git, project: &Project, desired: &str, rebase: RebaseFlags) -> Result<()> {
    let branches = git.branches()?;
    let key = project.key();

    if branches.is_empty() {
        if git.current_revision()? != desired {
            git.checkout(
                desired,
                &CheckoutOptions {
                    detach: true,
                    ..Default::default()
                },
            )?;
        }
        return Ok(());
    }

    let original = git.current_branch()?;

    for branch in &branches {
        if branch.revision == desired {
            continue;
        }
        let tracked = branch.tracking.is_some();
        let rebase_this = if tracked {
            rebase.tracked || rebase.all
        } else {
            rebase.untracked && rebase.all
        };

        if tracked && git.is_ancestor(&branch.name, desired)? {
            // Fast-forward. The checked-out branch needs a real merge so the
            // work tree follows; others can be reset in place.
            if branch.is_head {
                git.merge_ff_only(desired)?;
            } else {
                git.reset_branch(&branch.name, desired)?;
            }
            continue;
        }

        if !rebase_this {
            if tracked {
                log::warn!(
                    "branch {:?} of {key} has diverged from {desired}; \
                     not rebasing (use --rebase-tracked or --rebase-all)",
                    branch.name
                );
            }
            continue;
        }

        git.checkout(&branch.name, &CheckoutOptions::default())?;
        if let Err(e) = git.rebase(desired, &RebaseOptions::default()) {
            git.rebase_abort()?;
            restore_head(git, &original, desired)?;
            return Err(Error::Conflict(format!(
                "rebase of branch {:?} of {key} onto {desired} failed: {e}; \
                 rebase it manually",
                branch.name
            )));
        }
    }

    restore_head(git, &original, desired)
}

fn restore_head(git: &Git, original: &Option<String>, desired: &str) -> Result<()> {
    match original {
        Some(branch) => {
            if git.current_branch()?.as_deref() != Some(branch.as_str()) {
                git.checkout(branch, &CheckoutOptions::default())?;
            }
        }
        None => {
            // Originally detached: land on the new revision.
            git.checkout(
                desired,
                &CheckoutOptions {
                    detach: true,
                    ..Default::default()
                },
            )?;
        }
    }
    Ok(())
}

fn run_one_null(
    ws: &Workspace,
    project: &Project,
    path: &str,
    opts: &ExecOptions,
) -> Result<()> {
    // Refresh metadata so the next scan still recognizes the project.
    project::write_metadata(&ws.root().join(path), project, &opts.timestamp)
}
