use std::path::PathBuf;

use grove::error::{Error, Result};
use grove::lockfile::{self, Lockfile, ResolveOptions};
use grove::workspace::Workspace;

use super::load_resolved;

pub struct ResolveArgs {
    pub output: Option<PathBuf>,
    pub allow_floating_refs: bool,
    pub full: bool,
}

/// Generate (or refresh) the lockfile for the current manifest.
pub fn run_resolve(ws: &Workspace, args: ResolveArgs) -> Result<()> {
    let output = match args.output {
        Some(path) => path,
        None => ws.lockfile_path().ok_or_else(|| {
            Error::Usage(
                "lockfiles are disabled in the workspace config; pass --output".to_string(),
            )
        })?,
    };

    let loaded = load_resolved(ws, false)?;
    let existing = output.is_file().then(|| Lockfile::load(&output)).transpose()?;

    let lockfile = lockfile::resolve(
        ws,
        &loaded,
        existing.as_ref(),
        ResolveOptions {
            allow_floating_refs: args.allow_floating_refs,
            full: args.full,
        },
    )?;
    lockfile.save(&output)?;
    println!(
        "wrote {} ({} project locks, {} package locks)",
        output.display(),
        lockfile.projects.len(),
        lockfile.packages.len()
    );
    Ok(())
}
