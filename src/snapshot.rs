//! Snapshot manifests and update history.
//!
//! After a successful update the fully-pinned manifest is written to
//! `<meta>/update-history/<timestamp>`, the `latest` / `second-latest` hard
//! links are refreshed, and a line is appended to the history log. Snapshots
//! replay through the checkout-snapshot update mode, which pins directly and
//! skips manifest resolution.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result, ResultExt};
use crate::git::Git;
use crate::manifest::{
    Hooks, LoadedManifest, Manifest, Packages, Project, Projects,
};
use crate::workspace::Workspace;

/// Snapshot timestamps: UTC, second resolution, filesystem-safe.
pub fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d-%H%M%S").to_string()
}

/// Build the fully-pinned manifest for what is on disk right now: every
/// resolved project with the revision its checkout was synchronized to.
pub fn pinned_manifest(ws: &Workspace, loaded: &LoadedManifest) -> Result<Manifest> {
    let mut projects: Vec<Project> = Vec::new();
    for project in loaded.sorted_projects() {
        let mut pinned = project.clone();
        let checkout = ws.root().join(&project.path);
        let git = Git::at(&checkout);
        pinned.revision = match git.read_ref(crate::project::GROVE_HEAD_REF)? {
            Some(rev) => rev,
            None => git.current_revision()?,
        };
        projects.push(pinned);
    }
    Ok(Manifest {
        projects: Projects { projects },
        packages: Packages {
            packages: loaded.packages.clone(),
        },
        hooks: Hooks {
            hooks: loaded.hooks.clone(),
        },
        ..Default::default()
    })
}

/// Write a snapshot manifest and maintain the latest / second-latest links.
/// Returns the snapshot's path.
pub fn write_snapshot(ws: &Workspace, manifest: &Manifest, timestamp: &str) -> Result<PathBuf> {
    let dir = ws.update_history_dir();
    fs::create_dir_all(&dir).at_path(&dir)?;

    let path = unique_snapshot_path(&dir, timestamp);
    manifest.save(&path)?;

    rotate_links(&dir, &path)?;
    append_log(ws, timestamp, &path)?;
    Ok(path)
}

/// Two updates within one second get `-1`, `-2`, ... suffixes.
fn unique_snapshot_path(dir: &Path, timestamp: &str) -> PathBuf {
    let base = dir.join(timestamp);
    if !base.exists() {
        return base;
    }
    for n in 1.. {
        let candidate = dir.join(format!("{timestamp}-{n}"));
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!("the counter loop always finds a free name")
}

/// `latest` always points at the newest snapshot, `second-latest` at the one
/// before it. Hard links, so removing old snapshot files never breaks them.
fn rotate_links(dir: &Path, snapshot: &Path) -> Result<()> {
    let latest = dir.join("latest");
    let second = dir.join("second-latest");

    if latest.exists() {
        if second.exists() {
            fs::remove_file(&second).at_path(&second)?;
        }
        fs::hard_link(&latest, &second).at_path(&second)?;
        fs::remove_file(&latest).at_path(&latest)?;
    }
    fs::hard_link(snapshot, &latest).at_path(&latest)?;
    Ok(())
}

fn append_log(ws: &Workspace, timestamp: &str, snapshot: &Path) -> Result<()> {
    let name = snapshot
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Config(format!("snapshot path {}", snapshot.display())))?;
    let mut log = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(ws.history_log_path())
        .at_path(&ws.history_log_path())?;
    writeln!(log, "{timestamp} {name}")?;
    Ok(())
}
