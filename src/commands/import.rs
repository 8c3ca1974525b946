use grove::error::{Error, Result};
use grove::manifest::{Import, Manifest};
use grove::workspace::Workspace;

pub struct ImportArgs {
    pub name: String,
    pub manifest: String,
    pub remote: String,
    pub revision: Option<String>,
    pub remote_branch: Option<String>,
    pub root: Option<String>,
}

/// Append an `<import>` stanza to the root manifest.
pub fn run_import(ws: &Workspace, args: ImportArgs) -> Result<()> {
    let path = ws.root_manifest_path();
    let mut manifest = Manifest::load(&path)?;

    let import = Import {
        name: args.name,
        manifest: args.manifest,
        remote: args.remote,
        revision: args.revision.unwrap_or_default(),
        remote_branch: args.remote_branch.unwrap_or_default(),
        root: args.root.unwrap_or_default(),
    };
    let duplicate = manifest
        .imports
        .imports
        .iter()
        .any(|i| i.key() == import.key() && i.manifest == import.manifest);
    if duplicate {
        return Err(Error::Usage(format!(
            "import {}={} manifest {} is already declared",
            import.name, import.remote, import.manifest
        )));
    }
    manifest.imports.imports.push(import);
    manifest.save(&path)?;
    println!("updated {}", path.display());
    Ok(())
}
