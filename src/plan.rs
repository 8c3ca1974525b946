//! The planner: diff the resolved project set against the on-disk set and
//! emit an ordered list of operations.
//!
//! Plans are deterministic: the same resolved set, local set, and states
//! produce the same operations in the same order. Ordering is by operation
//! kind (delete < change-remote < move < update < create < null) with
//! nesting refinements that override kind priority when two operations touch
//! an ancestor/descendant pair of paths.

use std::cmp::Ordering;
use std::path::Path;

use indexmap::IndexMap;

use crate::manifest::{Project, ProjectKey};
use crate::project::{LocalConfig, ProjectState};

/// Rebase behavior for update-like operations, straight from the CLI flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebaseFlags {
    /// Rebase branches that track an upstream.
    pub tracked: bool,
    /// Rebase branches with no upstream (requires `all` too).
    pub untracked: bool,
    /// Rebase everything.
    pub all: bool,
}

/// What the planner knows about one on-disk project.
#[derive(Debug, Clone)]
pub struct LocalEntry {
    /// Definition recorded in the project's metadata; `path` is the actual
    /// workspace-relative location the scanner found it at.
    pub project: Project,
    pub local_config: LocalConfig,
    pub state: Option<ProjectState>,
}

/// Planner inputs. Resolved projects carry concrete revisions where the
/// manifest pins them; the executor resolves branch heads during fetch.
#[derive(Debug)]
pub struct PlanInput<'a> {
    pub resolved: &'a IndexMap<ProjectKey, Project>,
    pub local: &'a IndexMap<ProjectKey, LocalEntry>,
    /// Snapshot checkouts pin every revision; a differing revision alone
    /// forces an update.
    pub snapshot_mode: bool,
    /// Superproject submodule handling is on; parents drive submodule sync.
    pub submodules_enabled: bool,
    pub rebase: RebaseFlags,
}

/// Operation kinds in execution priority order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display,
)]
#[strum(serialize_all = "kebab-case")]
pub enum OpKind {
    Delete,
    ChangeRemote,
    Move,
    Update,
    Create,
    Null,
}

/// One planned filesystem operation. Paths are workspace-relative.
#[derive(Debug, Clone)]
pub enum Operation {
    Create {
        project: Project,
        destination: String,
    },
    Delete {
        project: Project,
        source: String,
    },
    Move {
        project: Project,
        source: String,
        destination: String,
        rebase: RebaseFlags,
    },
    ChangeRemote {
        project: Project,
        path: String,
        old_remote: String,
        rebase: RebaseFlags,
    },
    Update {
        project: Project,
        path: String,
        rebase: RebaseFlags,
    },
    Null {
        project: Project,
        path: String,
    },
}

impl Operation {
    pub fn kind(&self) -> OpKind {
        match self {
            Operation::Create { .. } => OpKind::Create,
            Operation::Delete { .. } => OpKind::Delete,
            Operation::Move { .. } => OpKind::Move,
            Operation::ChangeRemote { .. } => OpKind::ChangeRemote,
            Operation::Update { .. } => OpKind::Update,
            Operation::Null { .. } => OpKind::Null,
        }
    }

    pub fn project(&self) -> &Project {
        match self {
            Operation::Create { project, .. }
            | Operation::Delete { project, .. }
            | Operation::Move { project, .. }
            | Operation::ChangeRemote { project, .. }
            | Operation::Update { project, .. }
            | Operation::Null { project, .. } => project,
        }
    }

    /// Where the project will live after this operation (empty for delete).
    pub fn destination(&self) -> &str {
        match self {
            Operation::Create { destination, .. } => destination,
            Operation::Delete { .. } => "",
            Operation::Move { destination, .. } => destination,
            Operation::ChangeRemote { path, .. } => path,
            Operation::Update { path, .. } => path,
            Operation::Null { path, .. } => path,
        }
    }

    /// Where the project currently lives (empty for create).
    pub fn source(&self) -> &str {
        match self {
            Operation::Create { .. } => "",
            Operation::Delete { source, .. } => source,
            Operation::Move { source, .. } => source,
            Operation::ChangeRemote { path, .. } => path,
            Operation::Update { path, .. } => path,
            Operation::Null { path, .. } => path,
        }
    }

    pub fn describe(&self) -> String {
        let key = self.project().key();
        match self {
            Operation::Create { destination, .. } => {
                format!("create {key} at {destination:?}")
            }
            Operation::Delete { source, .. } => format!("delete {key} from {source:?}"),
            Operation::Move {
                source,
                destination,
                ..
            } => format!("move {key} from {source:?} to {destination:?}"),
            Operation::ChangeRemote {
                path, old_remote, ..
            } => format!(
                "change remote of {key} at {path:?} from {old_remote:?}"
            ),
            Operation::Update { path, .. } => format!("update {key} at {path:?}"),
            Operation::Null { path, .. } => format!("nothing to do for {key} at {path:?}"),
        }
    }
}

/// Produce the ordered operation list for one synchronization run.
pub fn plan(input: &PlanInput<'_>) -> Vec<Operation> {
    let mut ops = Vec::new();

    // Union of keys, sorted, so the walk itself is deterministic.
    let mut keys: Vec<&ProjectKey> = input
        .resolved
        .keys()
        .chain(input.local.keys())
        .collect();
    keys.sort();
    keys.dedup();

    for key in keys {
        match (input.resolved.get(key), input.local.get(key)) {
            (Some(resolved), None) => ops.push(Operation::Create {
                project: resolved.clone(),
                destination: resolved.path.clone(),
            }),
            (None, Some(local)) => {
                if local.local_config.ignore {
                    log::debug!("skipping delete of ignored project {key}");
                    continue;
                }
                if input.submodules_enabled
                    && !local.project.git_submodule_of.is_empty()
                    && parent_submodule_enabled(input, &local.project)
                {
                    // The superproject owns this checkout; deleting it out
                    // from under the parent would corrupt the submodule state.
                    continue;
                }
                ops.push(Operation::Delete {
                    project: local.project.clone(),
                    source: local.project.path.clone(),
                });
            }
            (Some(resolved), Some(local)) => {
                if local.local_config.ignore {
                    continue;
                }
                ops.push(diff_project(input, resolved, local));
            }
            (None, None) => unreachable!("key came from one of the two maps"),
        }
    }

    merge_remote_migrations(&mut ops, input);
    ops.sort_by(compare);
    ops
}

/// A project whose remote changed carries a new (name, remote) key, so the
/// keyed walk sees a delete plus a create. When the two halves share a name
/// and a path they are really one remote migration; fold them into a single
/// change-remote so the checkout (and any local branches) survives.
fn merge_remote_migrations(ops: &mut Vec<Operation>, input: &PlanInput<'_>) {
    let mut deletes: Vec<Operation> = Vec::new();
    let mut rest: Vec<Operation> = Vec::new();
    for op in ops.drain(..) {
        match op.kind() {
            OpKind::Delete => deletes.push(op),
            _ => rest.push(op),
        }
    }

    let mut merged = Vec::with_capacity(rest.len() + deletes.len());
    for op in rest {
        if let Operation::Create {
            ref project,
            ref destination,
        } = op
        {
            let matching = deletes.iter().position(|d| {
                d.project().name == project.name && d.source() == destination
            });
            if let Some(index) = matching {
                let delete = deletes.remove(index);
                merged.push(Operation::ChangeRemote {
                    project: project.clone(),
                    path: destination.clone(),
                    old_remote: delete.project().remote.clone(),
                    rebase: input.rebase,
                });
                continue;
            }
        }
        merged.push(op);
    }
    merged.extend(deletes);
    *ops = merged;
}

fn parent_submodule_enabled(input: &PlanInput<'_>, project: &Project) -> bool {
    input
        .resolved
        .values()
        .any(|p| p.git_submodules && project.is_submodule_of(&p.name))
}

fn diff_project(input: &PlanInput<'_>, resolved: &Project, local: &LocalEntry) -> Operation {
    let key = resolved.key();
    let path = local.project.path.clone();

    if resolved.remote != local.project.remote {
        // Keys match on (name, remote), so this arm only triggers when the
        // local metadata predates a remote migration recorded by key rewrite;
        // compare against the recorded remote to be safe.
        return Operation::ChangeRemote {
            project: resolved.clone(),
            path,
            old_remote: local.project.remote.clone(),
            rebase: input.rebase,
        };
    }

    if resolved.path != local.project.path {
        return Operation::Move {
            project: resolved.clone(),
            source: local.project.path.clone(),
            destination: resolved.path.clone(),
            rebase: input.rebase,
        };
    }

    if local.local_config.no_update {
        return Operation::Null {
            project: resolved.clone(),
            path,
        };
    }

    if input.snapshot_mode
        && resolved.is_pinned()
        && local
            .state
            .as_ref()
            .is_none_or(|s| s.head_revision != resolved.revision)
    {
        return Operation::Update {
            project: resolved.clone(),
            path,
            rebase: input.rebase,
        };
    }

    if input.submodules_enabled && resolved.git_submodules {
        // The parent always drives submodule sync.
        return Operation::Update {
            project: resolved.clone(),
            path,
            rebase: input.rebase,
        };
    }

    if needs_update(resolved, local) {
        return Operation::Update {
            project: resolved.clone(),
            path,
            rebase: input.rebase,
        };
    }

    Operation::Null {
        project: resolved.clone(),
        path,
    }
}

/// Update when the project is observably out of sync; null only when every
/// signal says the last sync already matches the desired revision.
fn needs_update(resolved: &Project, local: &LocalEntry) -> bool {
    let Some(state) = &local.state else {
        // No state collected; the update op re-establishes it.
        return true;
    };
    if !resolved.is_pinned() {
        // Tracking a branch: only the fetch inside the update op can tell
        // whether the remote moved.
        return true;
    }
    let desired = resolved.revision.as_str();
    if state.grove_head.as_deref() != Some(desired) {
        return true;
    }
    if state.current_branch.is_none() && state.branches.is_empty() {
        return state.head_revision != desired;
    }
    // Any branch whose tracking head no longer matches the desired revision
    // needs the update op's fast-forward/rebase handling.
    state.branches.iter().any(|b| {
        b.tracking.is_some() && b.tracking_revision.as_deref() != Some(desired)
    })
}

// Ordering

fn compare(a: &Operation, b: &Operation) -> Ordering {
    if let Some(ord) = refine(a, b) {
        return ord;
    }
    if let Some(ord) = refine(b, a) {
        return ord.reverse();
    }
    a.kind()
        .cmp(&b.kind())
        .then_with(|| within_kind(a, b))
        .then_with(|| a.project().key().cmp(&b.project().key()))
}

/// Nesting refinements that override kind priority. Returns the ordering of
/// `a` relative to `b` when a rule applies to `a`, else `None`.
fn refine(a: &Operation, b: &Operation) -> Option<Ordering> {
    let Operation::Move {
        source,
        destination,
        ..
    } = a
    else {
        return None;
    };
    let src = Path::new(source);
    let dst = Path::new(destination);
    let inward = dst.starts_with(src) && dst != src;
    let upward = src.starts_with(dst) && dst != src;

    match b {
        // The parent may need to expand into the child's vacated space, so an
        // inward move waits for the parent's update.
        Operation::Update { path, .. } if inward && related(src, Path::new(path)) => {
            Some(Ordering::Greater)
        }
        // The child must vacate before any operation on the ancestor it is
        // moving up into.
        _ if upward && b.kind() != OpKind::Move && !b.destination().is_empty()
            && src.starts_with(Path::new(b.destination())) =>
        {
            Some(Ordering::Less)
        }
        Operation::Move {
            source: b_src,
            destination: b_dst,
            ..
        } => {
            let b_src = Path::new(b_src);
            let b_dst = Path::new(b_dst);
            // A move nested inside another move (source and destination both
            // within the outer project's) follows the outer move; the
            // executor rewrites the nested source afterward. This is what
            // keeps three-deep chains sound.
            if b_src.starts_with(src) && b_src != src && b_dst.starts_with(dst) {
                return Some(Ordering::Less);
            }
            if src.starts_with(b_src) && src != b_src && dst.starts_with(b_dst) {
                return Some(Ordering::Greater);
            }
            // Otherwise outward moves free space before inward moves consume it.
            let b_inward = b_dst.starts_with(b_src) && b_dst != b_src;
            match (inward, b_inward) {
                (false, true) => Some(Ordering::Less),
                (true, false) => Some(Ordering::Greater),
                _ => None,
            }
        }
        _ => None,
    }
}

fn related(x: &Path, y: &Path) -> bool {
    x.starts_with(y) || y.starts_with(x)
}

fn within_kind(a: &Operation, b: &Operation) -> Ordering {
    // Component-wise path order, not raw string order: under str::cmp a
    // sibling like "a-extra" sorts between "a" and "a/b" ('-' < '/'), which
    // would separate a parent create from its nested children and break the
    // executor's ancestor-stack scheduling.
    match a.kind() {
        // Children before parents.
        OpKind::Delete => Path::new(b.source()).cmp(Path::new(a.source())),
        // Outer before inner; ascending path order gives exactly that.
        _ => Path::new(a.destination()).cmp(Path::new(b.destination())),
    }
}
