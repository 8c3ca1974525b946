use std::path::PathBuf;

use grove::error::Result;
use grove::snapshot;
use grove::workspace::Workspace;

use super::load_resolved;

/// Write (or print) a fully-pinned snapshot of the workspace as it stands.
pub fn run_snapshot(ws: &Workspace, path: Option<PathBuf>) -> Result<()> {
    grove::git::ensure_installed()?;
    let loaded = load_resolved(ws, false)?;
    let pinned = snapshot::pinned_manifest(ws, &loaded)?;
    match path {
        Some(path) => {
            pinned.save(&path)?;
            println!("wrote {}", path.display());
        }
        None => print!("{}", pinned.to_xml()?),
    }
    Ok(())
}

/// Print the resolved manifest (imports expanded, overrides applied).
pub fn run_manifest(ws: &Workspace) -> Result<()> {
    let loaded = load_resolved(ws, false)?;
    let manifest = grove::manifest::Manifest {
        projects: grove::manifest::Projects {
            projects: loaded.sorted_projects().into_iter().cloned().collect(),
        },
        packages: grove::manifest::Packages {
            packages: loaded.packages.clone(),
        },
        hooks: grove::manifest::Hooks {
            hooks: loaded.hooks.clone(),
        },
        ..Default::default()
    };
    print!("{}", manifest.to_xml()?);
    Ok(())
}
