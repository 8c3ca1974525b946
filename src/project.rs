//! Runtime view of a checked-out project: observed git state, the persisted
//! local config, and the per-project metadata that marks a directory as
//! managed by the workspace.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fsops;
use crate::git::{Branch, Git};
use crate::manifest::Project;

/// Directory under each project's `.git` holding grove's side files.
pub const PROJECT_META_DIR: &str = "grove";
/// Per-project metadata file name. The `v2` suffix is the format version.
pub const METADATA_FILE: &str = "metadata.v2";
/// Per-project local config file name.
pub const LOCAL_CONFIG_FILE: &str = "config";
/// Workspace-managed ref recording the last-synced commit, independent of the
/// user's current branch.
pub const GROVE_HEAD_REF: &str = "GROVE_HEAD";

/// Per-project user preferences, persisted between runs under the project's
/// git directory. Not part of the manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Never touch this project: no updates, no deletion.
    #[serde(rename = "@ignore", default, skip_serializing_if = "std::ops::Not::not")]
    pub ignore: bool,
    #[serde(
        rename = "@noupdate",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub no_update: bool,
    #[serde(
        rename = "@norebase",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub no_rebase: bool,
}

impl LocalConfig {
    pub fn is_default(&self) -> bool {
        *self == LocalConfig::default()
    }
}

/// Metadata written next to each project's git dir on every successful
/// operation. The scanner uses it to classify directories as managed and to
/// recover each project's resolved attributes from the last sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    /// Timestamp of the snapshot the project was last synced under.
    #[serde(rename = "@snapshot", default, skip_serializing_if = "String::is_empty")]
    pub snapshot: String,
    #[serde(rename = "project")]
    pub project: Project,
}

/// Observed state of a working copy. Rebuilt on demand, never persisted.
#[derive(Debug, Clone, Default)]
pub struct ProjectState {
    /// The checked-out branch, if HEAD is not detached.
    pub current_branch: Option<Branch>,
    pub branches: Vec<Branch>,
    pub has_uncommitted: bool,
    pub has_untracked: bool,
    /// HEAD's revision, branch or not.
    pub head_revision: String,
    /// Last revision the workspace synchronized this project to.
    pub grove_head: Option<String>,
}

impl ProjectState {
    /// Collect the full state of the working copy at `path`.
    pub fn scan(path: &Path) -> Result<Self> {
        let git = Git::at(path);
        let mut branches = git.branches()?;
        for branch in &mut branches {
            if let Some(tracking) = &branch.tracking {
                branch.tracking_revision = git.read_ref(tracking)?;
            }
        }
        let current_branch = branches.iter().find(|b| b.is_head).cloned();
        let status = git.short_status()?;
        let (has_uncommitted, has_untracked) = crate::git::parse_porcelain_status(&status);
        let head_revision = git.current_revision()?;
        let grove_head = git.read_ref(GROVE_HEAD_REF)?;
        Ok(Self {
            current_branch,
            branches,
            has_uncommitted,
            has_untracked,
            head_revision,
            grove_head,
        })
    }

    /// Branches other than a detached HEAD; a project with any of these is
    /// never deleted automatically.
    pub fn has_real_branches(&self) -> bool {
        !self.branches.is_empty()
    }
}

/// A project as found on disk: its metadata-recorded definition, its actual
/// absolute path, and its local config.
#[derive(Debug, Clone)]
pub struct LocalProject {
    pub project: Project,
    pub path: PathBuf,
    pub local_config: LocalConfig,
}

fn git_meta_dir(project_path: &Path) -> PathBuf {
    project_path.join(".git").join(PROJECT_META_DIR)
}

pub fn metadata_path(project_path: &Path) -> PathBuf {
    git_meta_dir(project_path).join(METADATA_FILE)
}

pub fn local_config_path(project_path: &Path) -> PathBuf {
    git_meta_dir(project_path).join(LOCAL_CONFIG_FILE)
}

pub fn read_metadata(project_path: &Path) -> Result<ProjectMetadata> {
    let path = metadata_path(project_path);
    let content = std::fs::read_to_string(&path).map_err(|e| {
        Error::NotFound(format!("project metadata at {}: {e}", path.display()))
    })?;
    quick_xml::de::from_str(&content)
        .map_err(|e| Error::Config(format!("malformed metadata {}: {e}", path.display())))
}

pub fn write_metadata(project_path: &Path, project: &Project, snapshot: &str) -> Result<()> {
    let meta = ProjectMetadata {
        snapshot: snapshot.to_string(),
        project: project.clone(),
    };
    let mut body = String::new();
    let ser = quick_xml::se::Serializer::with_root(&mut body, Some("metadata"))
        .map_err(|e| Error::Config(format!("cannot serialize metadata: {e}")))?;
    meta.serialize(ser)
        .map_err(|e| Error::Config(format!("cannot serialize metadata: {e}")))?;
    fsops::safe_write(&metadata_path(project_path), body.as_bytes())
}

/// Read the local config, defaulting when the side file is absent.
pub fn read_local_config(project_path: &Path) -> Result<LocalConfig> {
    let path = local_config_path(project_path);
    match std::fs::read_to_string(&path) {
        Ok(content) => quick_xml::de::from_str(&content)
            .map_err(|e| Error::Config(format!("malformed local config {}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LocalConfig::default()),
        Err(e) => Err(e.into()),
    }
}

pub fn write_local_config(project_path: &Path, config: &LocalConfig) -> Result<()> {
    let mut body = String::new();
    let ser = quick_xml::se::Serializer::with_root(&mut body, Some("config"))
        .map_err(|e| Error::Config(format!("cannot serialize local config: {e}")))?;
    config
        .serialize(ser)
        .map_err(|e| Error::Config(format!("cannot serialize local config: {e}")))?;
    fsops::safe_write(&local_config_path(project_path), body.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_project_dir() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("proj");
        std::fs::create_dir_all(path.join(".git")).unwrap();
        (tmp, path)
    }

    fn sample_project() -> Project {
        Project {
            name: "core".into(),
            path: "core".into(),
            remote: "https://example.com/core".into(),
            revision: "1111111111111111111111111111111111111111".into(),
            ..Default::default()
        }
    }

    #[test]
    fn metadata_round_trip() {
        let (_tmp, path) = fake_project_dir();
        let project = sample_project();
        write_metadata(&path, &project, "2026-01-05-101500").unwrap();

        let meta = read_metadata(&path).unwrap();
        assert_eq!(meta.project, project);
        assert_eq!(meta.snapshot, "2026-01-05-101500");
    }

    #[test]
    fn missing_metadata_is_not_found() {
        let (_tmp, path) = fake_project_dir();
        assert!(matches!(read_metadata(&path), Err(Error::NotFound(_))));
    }

    #[test]
    fn local_config_defaults_when_absent() {
        let (_tmp, path) = fake_project_dir();
        let config = read_local_config(&path).unwrap();
        assert!(config.is_default());
    }

    #[test]
    fn local_config_round_trip() {
        let (_tmp, path) = fake_project_dir();
        let config = LocalConfig {
            ignore: true,
            no_rebase: true,
            ..Default::default()
        };
        write_local_config(&path, &config).unwrap();
        assert_eq!(read_local_config(&path).unwrap(), config);
    }

}
