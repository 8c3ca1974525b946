//! Workspace scanning: reconstruct the on-disk project set.
//!
//! Fast mode trusts the project index written after the last successful
//! update and reads only the recorded paths' metadata. Full mode walks the
//! tree depth-first, pruning the metadata directory and configured excludes,
//! and classifies any directory carrying a metadata file as a managed
//! project. A stale index (any recorded path no longer managed) degrades to
//! a full scan.

use std::collections::HashSet;
use std::path::Path;

use indexmap::IndexMap;
use rayon::prelude::*;

use crate::error::Result;
use crate::manifest::ProjectKey;
use crate::plan::LocalEntry;
use crate::project::{self, LocalProject, ProjectState};
use crate::workspace::{META_DIR, Workspace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Trust the workspace project index.
    Fast,
    /// Walk the whole tree.
    Full,
}

/// Discover every managed project, keyed by (name, remote).
pub fn scan_workspace(
    ws: &Workspace,
    mode: ScanMode,
) -> Result<IndexMap<ProjectKey, LocalProject>> {
    let projects = match mode {
        ScanMode::Fast => match scan_from_index(ws)? {
            Some(projects) => projects,
            None => scan_tree(ws)?,
        },
        ScanMode::Full => scan_tree(ws)?,
    };
    let mut map: IndexMap<ProjectKey, LocalProject> = IndexMap::new();
    for local in projects {
        let key = local.project.key();
        if let Some(previous) = map.insert(key.clone(), local) {
            log::warn!(
                "two checkouts claim {key}: {} and the one kept; \
                 remove the stale copy",
                previous.path.display()
            );
        }
    }
    map.sort_keys();
    Ok(map)
}

/// `None` means the index is stale and a full scan is required.
fn scan_from_index(ws: &Workspace) -> Result<Option<Vec<LocalProject>>> {
    let index = ws.read_project_index()?;
    if index.is_empty() {
        return Ok(None);
    }
    let mut projects = Vec::with_capacity(index.len());
    for rel in index {
        let path = ws.root().join(&rel);
        if !project::metadata_path(&path).is_file() {
            log::debug!("project index entry {rel:?} is gone; rescanning");
            return Ok(None);
        }
        projects.push(read_project(ws, &path)?);
    }
    Ok(Some(projects))
}

fn scan_tree(ws: &Workspace) -> Result<Vec<LocalProject>> {
    let excludes: HashSet<String> = ws
        .config()
        .exclude_dir_names()
        .into_iter()
        .collect();
    let mut projects = Vec::new();
    walk_dir(ws, ws.root(), &excludes, &mut projects)?;
    Ok(projects)
}

/// Depth-first descent. Projects can nest, so the walk keeps going inside a
/// managed directory; only the metadata dir, `.git` dirs, and configured
/// excludes are pruned. Symlinked directories are not followed.
fn walk_dir(
    ws: &Workspace,
    dir: &Path,
    excludes: &HashSet<String>,
    projects: &mut Vec<LocalProject>,
) -> Result<()> {
    if project::metadata_path(dir).is_file() {
        projects.push(read_project(ws, dir)?);
    }

    let mut subdirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == META_DIR || name == ".git" || excludes.contains(name.as_ref()) {
            continue;
        }
        subdirs.push(entry.path());
    }
    subdirs.sort();
    for subdir in subdirs {
        walk_dir(ws, &subdir, excludes, projects)?;
    }
    Ok(())
}

fn read_project(ws: &Workspace, path: &Path) -> Result<LocalProject> {
    let metadata = project::read_metadata(path)?;
    let mut project = metadata.project;
    // The metadata remembers where the project was supposed to be; what
    // matters to the planner is where it actually is.
    if let Ok(rel) = path.strip_prefix(ws.root()) {
        let actual = rel.to_string_lossy().into_owned();
        if !actual.is_empty() {
            if actual != project.path {
                log::debug!(
                    "project {} recorded at {:?} but found at {actual:?}",
                    project.name,
                    project.path
                );
            }
            project.path = actual;
        }
    }
    let local_config = project::read_local_config(path)?;
    Ok(LocalProject {
        project,
        path: path.to_path_buf(),
        local_config,
    })
}

/// Collect git state for every project in parallel. Projects whose state
/// cannot be read (corrupted checkout) come back without state and are
/// logged; the planner treats them as needing an update.
pub fn collect_states(
    projects: &IndexMap<ProjectKey, LocalProject>,
) -> IndexMap<ProjectKey, ProjectState> {
    let items: Vec<(&ProjectKey, &LocalProject)> = projects.iter().collect();
    let collected: Vec<(ProjectKey, Option<ProjectState>)> = items
        .par_iter()
        .map(|(key, local)| {
            match ProjectState::scan(&local.path) {
                Ok(state) => ((*key).clone(), Some(state)),
                Err(e) => {
                    log::warn!("cannot read state of {key}: {e}");
                    ((*key).clone(), None)
                }
            }
        })
        .collect();
    collected
        .into_iter()
        .filter_map(|(key, state)| state.map(|s| (key, s)))
        .collect()
}

/// Assemble planner inputs: discovered projects joined with their states.
pub fn local_entries(
    ws: &Workspace,
    mode: ScanMode,
    with_states: bool,
) -> Result<IndexMap<ProjectKey, LocalEntry>> {
    let projects = scan_workspace(ws, mode)?;
    let mut states = if with_states {
        collect_states(&projects)
    } else {
        IndexMap::new()
    };
    Ok(projects
        .into_iter()
        .map(|(key, local)| {
            let state = states.swap_remove(&key);
            (
                key,
                LocalEntry {
                    project: local.project,
                    local_config: local.local_config,
                    state,
                },
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Project;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, Workspace) {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::init(tmp.path()).unwrap();
        (tmp, ws)
    }

    fn plant_project(ws: &Workspace, name: &str, rel: &str) -> Project {
        let project = Project {
            name: name.into(),
            path: rel.into(),
            remote: format!("https://example.com/{name}"),
            ..Default::default()
        };
        let path = ws.root().join(rel);
        std::fs::create_dir_all(path.join(".git")).unwrap();
        project::write_metadata(&path, &project, "ts").unwrap();
        project
    }

    #[test]
    fn full_scan_discovers_projects() {
        let (_tmp, ws) = fixture();
        plant_project(&ws, "a", "a");
        plant_project(&ws, "b", "dir/b");

        let found = scan_workspace(&ws, ScanMode::Full).unwrap();
        assert_eq!(found.len(), 2);
        let paths: Vec<&str> = found.values().map(|p| p.project.path.as_str()).collect();
        assert!(paths.contains(&"a"));
        assert!(paths.contains(&"dir/b"));
    }

    #[test]
    fn full_scan_descends_into_projects() {
        let (_tmp, ws) = fixture();
        plant_project(&ws, "outer", "outer");
        plant_project(&ws, "inner", "outer/nested/inner");

        let found = scan_workspace(&ws, ScanMode::Full).unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn full_scan_prunes_excluded_dirs() {
        let (tmp, ws) = fixture();
        plant_project(&ws, "seen", "seen");
        // Rewrite the config with an exclusion, then reload the workspace.
        let mut config = ws.config().clone();
        config.exclude_dirs = "out".into();
        ws.save_config(&config).unwrap();
        let ws = Workspace::load(tmp.path()).unwrap();
        plant_project(&ws, "hidden", "out/hidden");

        let found = scan_workspace(&ws, ScanMode::Full).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.values().all(|p| p.project.name == "seen"));
    }

    #[test]
    fn fast_scan_trusts_the_index() {
        let (_tmp, ws) = fixture();
        plant_project(&ws, "a", "a");
        plant_project(&ws, "b", "b");
        ws.write_project_index(vec!["a".into(), "b".into()]).unwrap();

        let found = scan_workspace(&ws, ScanMode::Fast).unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn stale_index_falls_back_to_full_scan() {
        let (_tmp, ws) = fixture();
        plant_project(&ws, "a", "a");
        ws.write_project_index(vec!["a".into(), "vanished".into()])
            .unwrap();

        let found = scan_workspace(&ws, ScanMode::Fast).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn empty_index_falls_back_to_full_scan() {
        let (_tmp, ws) = fixture();
        plant_project(&ws, "a", "a");
        let found = scan_workspace(&ws, ScanMode::Fast).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn moved_checkout_reports_actual_path() {
        let (_tmp, ws) = fixture();
        let project = plant_project(&ws, "a", "recorded");
        // Simulate a by-hand move: metadata still says "recorded".
        std::fs::rename(ws.root().join("recorded"), ws.root().join("actual")).unwrap();

        let found = scan_workspace(&ws, ScanMode::Full).unwrap();
        let local = found.get(&project.key()).unwrap();
        assert_eq!(local.project.path, "actual");
    }

    #[test]
    fn unmanaged_directories_are_ignored() {
        let (_tmp, ws) = fixture();
        plant_project(&ws, "a", "a");
        // A git checkout without grove metadata is not ours.
        std::fs::create_dir_all(ws.root().join("foreign/.git")).unwrap();

        let found = scan_workspace(&ws, ScanMode::Full).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn local_entries_without_states() {
        let (_tmp, ws) = fixture();
        plant_project(&ws, "a", "a");
        let entries = local_entries(&ws, ScanMode::Full, false).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries.values().all(|e| e.state.is_none()));
    }
}
