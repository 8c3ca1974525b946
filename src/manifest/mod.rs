//! The manifest data model and its XML wire format.
//!
//! A manifest enumerates git projects, transitive imports, pinned binary
//! packages, hooks, and local overrides. Attribute names follow the on-disk
//! schema exactly (`remotebranch`, `gerrithost`, `historydepth`, ...), so the
//! serde renames here are the single source of truth for the format.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fsops;

mod edit;
mod loader;

pub use edit::{Edit, EditKind, edit_manifest, edit_revisions};
pub use loader::{GitImportSource, ImportSource, LoadedManifest, ManifestLoader};

/// Default branch tracked when a project pins neither a revision nor a branch.
pub const DEFAULT_REMOTE_BRANCH: &str = "main";

/// Identity of a project: (name, remote). Paths can move; the key cannot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectKey {
    pub name: String,
    pub remote: String,
}

impl ProjectKey {
    pub fn new(name: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remote: remote.into(),
        }
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.remote)
    }
}

/// Free-form tags controlling which optional projects and packages a
/// workspace materializes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSet(BTreeSet<String>);

impl AttributeSet {
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, attr: &str) -> bool {
        self.0.contains(attr)
    }

    pub fn intersects(&self, other: &AttributeSet) -> bool {
        self.0.iter().any(|a| other.0.contains(a))
    }

    pub fn insert(&mut self, attr: impl Into<String>) {
        self.0.insert(attr.into());
    }
}

impl fmt::Display for AttributeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for attr in &self.0 {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{attr}")?;
            first = false;
        }
        Ok(())
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// A single git repository to materialize in the workspace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(rename = "@name")]
    pub name: String,
    /// Workspace-relative checkout path.
    #[serde(rename = "@path")]
    pub path: String,
    #[serde(rename = "@remote")]
    pub remote: String,
    /// Pinned 40-char commit hash, or empty to track the remote branch.
    #[serde(rename = "@revision", default, skip_serializing_if = "String::is_empty")]
    pub revision: String,
    #[serde(
        rename = "@remotebranch",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub remote_branch: String,
    #[serde(
        rename = "@gerrithost",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub gerrit_host: String,
    #[serde(rename = "@githooks", default, skip_serializing_if = "String::is_empty")]
    pub git_hooks: String,
    #[serde(
        rename = "@attributes",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub attributes: String,
    #[serde(
        rename = "@historydepth",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub history_depth: Option<u32>,
    /// This project is a superproject whose submodules the workspace manages.
    #[serde(rename = "@gitsubmodules", default, skip_serializing_if = "is_false")]
    pub git_submodules: bool,
    /// Name of the superproject this project is a submodule of.
    #[serde(
        rename = "@gitsubmoduleof",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub git_submodule_of: String,
}

impl Project {
    pub fn key(&self) -> ProjectKey {
        ProjectKey::new(&self.name, &self.remote)
    }

    /// Whether the manifest pins this project to a concrete commit.
    pub fn is_pinned(&self) -> bool {
        !self.revision.is_empty() && self.revision != "HEAD"
    }

    pub fn remote_branch(&self) -> &str {
        if self.remote_branch.is_empty() {
            DEFAULT_REMOTE_BRANCH
        } else {
            &self.remote_branch
        }
    }

    pub fn attribute_set(&self) -> AttributeSet {
        AttributeSet::parse(&self.attributes)
    }

    /// True when this project is a submodule managed through `parent`.
    pub fn is_submodule_of(&self, parent: &str) -> bool {
        self.git_submodule_of == parent
    }
}

/// A reference to another manifest, fetched from its own repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Import {
    /// Name of the manifest repository.
    #[serde(rename = "@name")]
    pub name: String,
    /// Manifest file, relative to the manifest repository root.
    #[serde(rename = "@manifest")]
    pub manifest: String,
    #[serde(rename = "@remote")]
    pub remote: String,
    #[serde(rename = "@revision", default, skip_serializing_if = "String::is_empty")]
    pub revision: String,
    #[serde(
        rename = "@remotebranch",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub remote_branch: String,
    /// Path prefix applied to every project the import contributes.
    #[serde(rename = "@root", default, skip_serializing_if = "String::is_empty")]
    pub root: String,
}

impl Import {
    pub fn key(&self) -> ProjectKey {
        ProjectKey::new(&self.name, &self.remote)
    }

    pub fn remote_branch(&self) -> &str {
        if self.remote_branch.is_empty() {
            DEFAULT_REMOTE_BRANCH
        } else {
            &self.remote_branch
        }
    }
}

/// A manifest file in the same repository as the importing manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalImport {
    #[serde(rename = "@file")]
    pub file: String,
}

/// A pinned third-party binary artifact, fetched by the external package tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Package {
    /// May contain `${platform}`, `${os}`, `${arch}` template variables,
    /// optionally constrained as `${platform=linux-amd64,mac-amd64}`.
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@version")]
    pub version: String,
    #[serde(rename = "@path", default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(
        rename = "@attributes",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub attributes: String,
    #[serde(
        rename = "@platforms",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub platforms: String,
    #[serde(rename = "@internal", default, skip_serializing_if = "is_false")]
    pub internal: bool,
    /// Optional flag file the fetcher writes after installation.
    #[serde(rename = "@flag", default, skip_serializing_if = "String::is_empty")]
    pub flag: String,
}

impl Package {
    pub fn attribute_set(&self) -> AttributeSet {
        AttributeSet::parse(&self.attributes)
    }
}

/// A post-update action script owned by a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hook {
    #[serde(rename = "@name")]
    pub name: String,
    /// Name of the owning project; resolved through the project map, never a
    /// pointer into it.
    #[serde(rename = "@project")]
    pub project: String,
    /// Script path inside the owning project.
    #[serde(rename = "@action")]
    pub action: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Imports {
    #[serde(rename = "import", default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<Import>,
    #[serde(rename = "localimport", default, skip_serializing_if = "Vec::is_empty")]
    pub local_imports: Vec<LocalImport>,
}

impl Imports {
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty() && self.local_imports.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Projects {
    #[serde(rename = "project", default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<Project>,
}

impl Projects {
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Packages {
    #[serde(rename = "package", default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<Package>,
}

impl Packages {
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Local replacements for projects and imports, matched by key. At most one
/// override of a kind may match a given key; the loader enforces this.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overrides {
    #[serde(rename = "project", default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<Project>,
    #[serde(rename = "import", default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<Import>,
}

impl Overrides {
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty() && self.imports.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hooks {
    #[serde(rename = "hook", default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<Hook>,
}

impl Hooks {
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

/// One manifest document. The resolved workspace view is produced by the
/// [`ManifestLoader`], which expands imports and applies overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Imports::is_empty")]
    pub imports: Imports,
    #[serde(default, skip_serializing_if = "Projects::is_empty")]
    pub projects: Projects,
    #[serde(default, skip_serializing_if = "Packages::is_empty")]
    pub packages: Packages,
    #[serde(default, skip_serializing_if = "Overrides::is_empty")]
    pub overrides: Overrides,
    #[serde(default, skip_serializing_if = "Hooks::is_empty")]
    pub hooks: Hooks,
}

impl Manifest {
    pub fn parse(content: &str) -> Result<Self> {
        quick_xml::de::from_str(content)
            .map_err(|e| Error::Config(format!("malformed manifest: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read manifest {}: {e}", path.display())))?;
        Self::parse(&content)
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut body = String::new();
        let mut ser = quick_xml::se::Serializer::with_root(&mut body, Some("manifest"))
            .map_err(|e| Error::Config(format!("cannot serialize manifest: {e}")))?;
        ser.indent(' ', 2);
        self.serialize(ser)
            .map_err(|e| Error::Config(format!("cannot serialize manifest: {e}")))?;
        Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}\n"))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fsops::safe_write(path, self.to_xml()?.as_bytes())
    }
}
