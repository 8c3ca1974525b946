use grove::error::{Error, Result};
use grove::manifest::{Manifest, Project};
use grove::workspace::Workspace;

pub struct OverrideArgs {
    pub name: String,
    pub remote: String,
    pub revision: Option<String>,
    pub path: Option<String>,
    pub remote_branch: Option<String>,
    pub gerrit_host: Option<String>,
}

/// Add a project override stanza to the root manifest.
pub fn run_override(ws: &Workspace, args: OverrideArgs) -> Result<()> {
    let manifest_path = ws.root_manifest_path();
    let mut manifest = Manifest::load(&manifest_path)?;

    let duplicate = manifest
        .overrides
        .projects
        .iter()
        .any(|p| p.name == args.name && p.remote == args.remote);
    if duplicate {
        return Err(Error::Usage(format!(
            "an override for {}={} already exists",
            args.name, args.remote
        )));
    }

    manifest.overrides.projects.push(Project {
        name: args.name,
        remote: args.remote,
        path: args.path.unwrap_or_default(),
        revision: args.revision.unwrap_or_default(),
        remote_branch: args.remote_branch.unwrap_or_default(),
        gerrit_host: args.gerrit_host.unwrap_or_default(),
        ..Default::default()
    });
    manifest.save(&manifest_path)?;
    println!("updated {}", manifest_path.display());
    Ok(())
}
