//! Lockfile entries and the lockfile resolver.
//!
//! A lockfile is a JSON array of project locks (key -> revision) and package
//! locks (expanded name + version tag -> instance id), sorted by key so two
//! resolves of the same inputs diff byte-identically.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fsops;
use crate::git::Git;
use crate::manifest::{LoadedManifest, Package};
use crate::pkg;
use crate::retry::{self, Backoff};
use crate::workspace::Workspace;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectLock {
    pub project: String,
    pub remote: String,
    pub revision: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageLock {
    pub package: String,
    pub version: String,
    pub instance_id: String,
}

/// One lockfile line; the two shapes are distinguished by their field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LockEntry {
    Project(ProjectLock),
    Package(PackageLock),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lockfile {
    pub projects: Vec<ProjectLock>,
    pub packages: Vec<PackageLock>,
}

impl Lockfile {
    pub fn parse(content: &str) -> Result<Self> {
        let entries: Vec<LockEntry> = serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("malformed lockfile: {e}")))?;
        let mut lockfile = Lockfile::default();
        for entry in entries {
            match entry {
                LockEntry::Project(p) => lockfile.add_project(p)?,
                LockEntry::Package(p) => lockfile.add_package(p)?,
            }
        }
        Ok(lockfile)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::NotFound(format!("lockfile {}: {e}", path.display())))?;
        Self::parse(&content)
    }

    /// Add a project lock; two entries for the same key must agree.
    pub fn add_project(&mut self, lock: ProjectLock) -> Result<()> {
        if let Some(existing) = self
            .projects
            .iter()
            .find(|p| p.project == lock.project && p.remote == lock.remote)
        {
            if existing.revision != lock.revision {
                return Err(Error::Conflict(format!(
                    "conflicting locks for project {}={}: {} and {}",
                    lock.project, lock.remote, existing.revision, lock.revision
                )));
            }
            return Ok(());
        }
        self.projects.push(lock);
        Ok(())
    }

    pub fn add_package(&mut self, lock: PackageLock) -> Result<()> {
        if let Some(existing) = self
            .packages
            .iter()
            .find(|p| p.package == lock.package && p.version == lock.version)
        {
            if existing.instance_id != lock.instance_id {
                return Err(Error::Conflict(format!(
                    "conflicting locks for package {} at {}: {} and {}",
                    lock.package, lock.version, existing.instance_id, lock.instance_id
                )));
            }
            return Ok(());
        }
        self.packages.push(lock);
        Ok(())
    }

    pub fn project_revision(&self, project: &str, remote: &str) -> Option<&str> {
        self.projects
            .iter()
            .find(|p| p.project == project && p.remote == remote)
            .map(|p| p.revision.as_str())
    }

    pub fn package_instance(&self, package: &str, version: &str) -> Option<&str> {
        self.packages
            .iter()
            .find(|p| p.package == package && p.version == version)
            .map(|p| p.instance_id.as_str())
    }

    /// Serialize with deterministic ordering: project locks sorted by
    /// (project, remote), then package locks by (package, version).
    pub fn to_json(&self) -> Result<String> {
        let mut projects = self.projects.clone();
        projects.sort_by(|a, b| (&a.project, &a.remote).cmp(&(&b.project, &b.remote)));
        let mut packages = self.packages.clone();
        packages.sort_by(|a, b| (&a.package, &a.version).cmp(&(&b.package, &b.version)));

        let entries: Vec<LockEntry> = projects
            .into_iter()
            .map(LockEntry::Project)
            .chain(packages.into_iter().map(LockEntry::Package))
            .collect();
        let mut json = serde_json::to_string_pretty(&entries)
            .map_err(|e| Error::Config(format!("cannot serialize lockfile: {e}")))?;
        json.push('\n');
        Ok(json)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fsops::safe_write(path, self.to_json()?.as_bytes())
    }
}

fn hex_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^[0-9a-f]{40}$").expect("static regex"))
}

fn base64_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^[A-Za-z0-9_-]{29,}$").expect("static regex"))
}

/// A version tag that is already a concrete pin: a legacy 40-hex instance id,
/// a modern base64-url instance id, or a `key:value` tag.
pub fn is_pinned_version(version: &str) -> bool {
    version.contains(':') || hex_id_re().is_match(version) || base64_id_re().is_match(version)
}

/// Reject floating refs up front so a resolve cannot silently produce an
/// unreproducible lockfile.
pub fn check_floating_refs(packages: &[Package]) -> Result<()> {
    for package in packages {
        if !is_pinned_version(&package.version) {
            return Err(Error::EnsureFile(format!(
                "package {} has floating version {:?}; pin it to an instance \
                 id or a tag, or pass --allow-floating-refs",
                package.name, package.version
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    pub allow_floating_refs: bool,
    /// Re-resolve every package; off re-resolves only packages whose version
    /// tag changed relative to `existing`.
    pub full: bool,
}

/// Produce the lock document for a resolved manifest: project revisions from
/// the manifest (ls-remote for unpinned projects) and package instance ids
/// from the external package tool.
pub fn resolve(
    ws: &Workspace,
    loaded: &LoadedManifest,
    existing: Option<&Lockfile>,
    opts: ResolveOptions,
) -> Result<Lockfile> {
    let mut lockfile = Lockfile::default();
    let git = Git::at(ws.root());

    for project in loaded.sorted_projects() {
        let revision = if project.is_pinned() {
            project.revision.clone()
        } else {
            retry::with_backoff("ls-remote", ws.attempts(), Backoff::default(), || {
                git.remote_branch_head(&project.remote, project.remote_branch())
                    .map_err(Error::from)
            })?
        };
        lockfile.add_project(ProjectLock {
            project: project.name.clone(),
            remote: project.remote.clone(),
            revision,
        })?;
    }

    if !opts.allow_floating_refs {
        check_floating_refs(&loaded.packages)?;
    }

    // A partial resolve keeps locks whose version tag is unchanged and asks
    // the tool only about the rest.
    let mut todo: Vec<Package> = Vec::new();
    for package in &loaded.packages {
        let reused = (!opts.full)
            .then(|| existing)
            .flatten()
            .map(|old| pkg::reusable_locks(package, old))
            .unwrap_or_default();
        if reused.is_empty() {
            todo.push(package.clone());
        } else {
            for lock in reused {
                lockfile.add_package(lock)?;
            }
        }
    }

    if !todo.is_empty() {
        for lock in pkg::resolve_packages(ws, &todo)? {
            lockfile.add_package(lock)?;
        }
    }

    Ok(lockfile)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plock(project: &str, revision: &str) -> ProjectLock {
        ProjectLock {
            project: project.into(),
            remote: format!("https://example.com/{project}"),
            revision: revision.into(),
        }
    }

    fn pkglock(package: &str, version: &str, id: &str) -> PackageLock {
        PackageLock {
            package: package.into(),
            version: version.into(),
            instance_id: id.into(),
        }
    }

    const REV: &str = "1111111111111111111111111111111111111111";

    #[test]
    fn json_round_trip() {
        let mut lockfile = Lockfile::default();
        lockfile.add_project(plock("b", REV)).unwrap();
        lockfile.add_project(plock("a", REV)).unwrap();
        lockfile
            .add_package(pkglock("pkg/linux-amd64", "v:abc", "iid1"))
            .unwrap();

        let json = lockfile.to_json().unwrap();
        let parsed = Lockfile::parse(&json).unwrap();
        assert_eq!(parsed.projects.len(), 2);
        assert_eq!(parsed.packages.len(), 1);
        assert_eq!(parsed.project_revision("a", "https://example.com/a"), Some(REV));
        assert_eq!(
            parsed.package_instance("pkg/linux-amd64", "v:abc"),
            Some("iid1")
        );
    }

    #[test]
    fn serialization_is_sorted_and_stable() {
        let mut one = Lockfile::default();
        one.add_project(plock("b", REV)).unwrap();
        one.add_project(plock("a", REV)).unwrap();
        let mut two = Lockfile::default();
        two.add_project(plock("a", REV)).unwrap();
        two.add_project(plock("b", REV)).unwrap();
        assert_eq!(one.to_json().unwrap(), two.to_json().unwrap());

        let json = one.to_json().unwrap();
        let a = json.find("\"a\"").unwrap();
        let b = json.find("\"b\"").unwrap();
        assert!(a < b);
    }

    #[test]
    fn conflicting_project_locks_are_fatal() {
        let mut lockfile = Lockfile::default();
        lockfile.add_project(plock("a", REV)).unwrap();
        let err = lockfile
            .add_project(plock("a", "2222222222222222222222222222222222222222"))
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn agreeing_duplicate_locks_collapse() {
        let mut lockfile = Lockfile::default();
        lockfile.add_project(plock("a", REV)).unwrap();
        lockfile.add_project(plock("a", REV)).unwrap();
        assert_eq!(lockfile.projects.len(), 1);
    }

    #[test]
    fn conflicting_package_locks_are_fatal() {
        let mut lockfile = Lockfile::default();
        lockfile.add_package(pkglock("p", "v:1", "id1")).unwrap();
        let err = lockfile.add_package(pkglock("p", "v:1", "id2")).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn pinned_version_shapes() {
        // Legacy 40-hex instance id.
        assert!(is_pinned_version(REV));
        // Modern base64-url instance id (>= 29 chars).
        assert!(is_pinned_version("JB6tLcyL9qCuvv3zYyIyhG7BMws_0123456789AC"));
        // Tags always contain a colon.
        assert!(is_pinned_version("version:1.2.3"));
        // Floating refs.
        assert!(!is_pinned_version("latest"));
        assert!(!is_pinned_version("main"));
        assert!(!is_pinned_version("short-b64"));
        assert!(!is_pinned_version(""));
    }

    #[test]
    fn floating_ref_check_names_the_package() {
        let packages = vec![Package {
            name: "tools/gn".into(),
            version: "latest".into(),
            ..Default::default()
        }];
        let err = check_floating_refs(&packages).unwrap_err();
        assert!(matches!(err, Error::EnsureFile(_)));
        assert!(err.to_string().contains("tools/gn"));
    }

    #[test]
    fn lock_entries_deserialize_by_shape() {
        let json = r#"[
          {"project": "a", "remote": "https://x/a", "revision": "1111111111111111111111111111111111111111"},
          {"package": "pkg/linux-amd64", "version": "v:abc", "instance_id": "iid"}
        ]"#;
        let lockfile = Lockfile::parse(json).unwrap();
        assert_eq!(lockfile.projects.len(), 1);
        assert_eq!(lockfile.packages.len(), 1);
    }
}
