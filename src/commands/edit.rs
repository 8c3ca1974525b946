use std::path::PathBuf;

use grove::error::{Error, Result};
use grove::manifest::{Edit, EditKind, Manifest, edit_revisions};
use grove::workspace::Workspace;

use super::split_pair;

pub struct EditArgs {
    pub manifest: Option<PathBuf>,
    pub projects: Vec<String>,
    pub imports: Vec<String>,
    pub packages: Vec<String>,
}

/// Rewrite pinned revisions/versions in a manifest, keeping any lockfiles on
/// the path to the workspace root in step.
pub fn run_edit(ws: &Workspace, args: EditArgs) -> Result<()> {
    let manifest_path = args
        .manifest
        .unwrap_or_else(|| ws.root_manifest_path());
    let manifest = Manifest::load(&manifest_path)?;

    let mut edits = Vec::new();
    for raw in &args.projects {
        let (name, new) = split_pair(raw, "--project")?;
        let current = manifest
            .projects
            .projects
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.revision.clone())
            .ok_or_else(|| Error::NotFound(format!("project {name:?} in the manifest")))?;
        edits.push(Edit {
            kind: EditKind::Project,
            name,
            current,
            new,
        });
    }
    for raw in &args.imports {
        let (name, new) = split_pair(raw, "--import")?;
        let current = manifest
            .imports
            .imports
            .iter()
            .find(|i| i.name == name)
            .map(|i| i.revision.clone())
            .ok_or_else(|| Error::NotFound(format!("import {name:?} in the manifest")))?;
        edits.push(Edit {
            kind: EditKind::Import,
            name,
            current,
            new,
        });
    }
    for raw in &args.packages {
        let (name, new) = split_pair(raw, "--package")?;
        let current = manifest
            .packages
            .packages
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.version.clone())
            .ok_or_else(|| Error::NotFound(format!("package {name:?} in the manifest")))?;
        edits.push(Edit {
            kind: EditKind::Package,
            name,
            current,
            new,
        });
    }
    if edits.is_empty() {
        return Err(Error::Usage(
            "nothing to edit; pass --project, --import, or --package".to_string(),
        ));
    }

    let lockfile_name = ws
        .config()
        .lockfile_enabled
        .then(|| ws.config().lockfile_name.clone());
    edit_revisions(
        ws.root(),
        &manifest_path,
        lockfile_name.as_deref(),
        &edits,
    )?;
    println!("edited {}", manifest_path.display());
    Ok(())
}
