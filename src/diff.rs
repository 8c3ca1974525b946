//! Comparison of two manifests, usually two update-history snapshots.
//!
//! Keyed by (name, remote) like everything else: a project present only in
//! the newer manifest was added, one present only in the older was removed,
//! and a project in both may have moved, changed revision, or both.

use std::fmt;

use indexmap::IndexMap;

use crate::manifest::{Manifest, Project, ProjectKey};

/// One project's change between two manifests.
#[derive(Debug, Clone)]
pub enum ProjectChange {
    Added(Project),
    Removed(Project),
    /// Path changed (and possibly the revision too).
    Moved { old: Project, new: Project },
    /// Same path, different revision.
    Updated { old: Project, new: Project },
}

#[derive(Debug, Default)]
pub struct ManifestDiff {
    pub changes: Vec<ProjectChange>,
}

impl ManifestDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

fn keyed(manifest: &Manifest) -> IndexMap<ProjectKey, &Project> {
    manifest
        .projects
        .projects
        .iter()
        .map(|p| (p.key(), p))
        .collect()
}

/// Diff `old` against `new`, reporting changes in key order.
pub fn diff_manifests(old: &Manifest, new: &Manifest) -> ManifestDiff {
    let old_map = keyed(old);
    let new_map = keyed(new);

    let mut keys: Vec<&ProjectKey> = old_map.keys().chain(new_map.keys()).collect();
    keys.sort();
    keys.dedup();

    let mut changes = Vec::new();
    for key in keys {
        match (old_map.get(key), new_map.get(key)) {
            (None, Some(new)) => changes.push(ProjectChange::Added((*new).clone())),
            (Some(old), None) => changes.push(ProjectChange::Removed((*old).clone())),
            (Some(old), Some(new)) => {
                if old.path != new.path {
                    changes.push(ProjectChange::Moved {
                        old: (*old).clone(),
                        new: (*new).clone(),
                    });
                } else if old.revision != new.revision {
                    changes.push(ProjectChange::Updated {
                        old: (*old).clone(),
                        new: (*new).clone(),
                    });
                }
            }
            (None, None) => unreachable!("key came from one of the two maps"),
        }
    }
    ManifestDiff { changes }
}

fn short(revision: &str) -> &str {
    if revision.len() >= 12 {
        &revision[..12]
    } else {
        revision
    }
}

impl fmt::Display for ManifestDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for change in &self.changes {
            match change {
                ProjectChange::Added(p) => {
                    writeln!(f, "+ {} at {:?} ({})", p.name, p.path, short(&p.revision))?;
                }
                ProjectChange::Removed(p) => {
                    writeln!(f, "- {} at {:?}", p.name, p.path)?;
                }
                ProjectChange::Moved { old, new } => {
                    writeln!(
                        f,
                        "M {} {:?} -> {:?} ({} -> {})",
                        new.name,
                        old.path,
                        new.path,
                        short(&old.revision),
                        short(&new.revision)
                    )?;
                }
                ProjectChange::Updated { old, new } => {
                    writeln!(
                        f,
                        "U {} at {:?} ({} -> {})",
                        new.name,
                        new.path,
                        short(&old.revision),
                        short(&new.revision)
                    )?;
                }
            }
        }
        Ok(())
    }
}
