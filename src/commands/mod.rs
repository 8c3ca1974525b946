//! Subcommand handlers. Thin: argument plumbing and output only; the real
//! work lives in the library modules.

use std::collections::HashMap;
use std::path::PathBuf;

use grove::error::{Error, Result};
use grove::manifest::{
    GitImportSource, LoadedManifest, Manifest, ManifestLoader, ProjectKey,
};
use grove::scanner::{self, ScanMode};
use grove::workspace::Workspace;

mod branch;
mod diff;
mod edit;
mod gitmodules;
mod grep;
mod hooks;
mod import;
mod init;
mod override_cmd;
mod packages;
mod patch;
mod resolve;
mod runp;
mod snapshot;
mod status;
mod update;

pub use branch::{BranchArgs, run_branch};
pub use diff::run_diff;
pub use edit::{EditArgs, run_edit};
pub use gitmodules::run_generate_gitmodules;
pub use grep::run_grep;
pub use hooks::run_hooks_command;
pub use import::{ImportArgs, run_import};
pub use init::run_init;
pub use override_cmd::{OverrideArgs, run_override};
pub use packages::run_fetch_packages;
pub use patch::{PatchArgs, run_patch};
pub use resolve::{ResolveArgs, run_resolve};
pub use runp::run_runp;
pub use snapshot::{run_manifest, run_snapshot};
pub use status::{run_check_clean, run_status};
pub use update::{UpdateArgs, run_update};

/// Open the workspace containing the current directory, applying the global
/// job/attempt overrides.
pub fn open_workspace(jobs: Option<usize>, attempts: Option<u32>) -> Result<Workspace> {
    let cwd = std::env::current_dir()?;
    let mut ws = Workspace::find(&cwd)?;
    if let Some(jobs) = jobs {
        ws.set_jobs(jobs);
    }
    if let Some(attempts) = attempts {
        ws.set_attempts(attempts);
    }
    Ok(ws)
}

/// Resolve the root manifest into the project set, reading imported
/// manifests from local checkouts when `local_manifest` is set.
pub fn load_resolved(ws: &Workspace, local_manifest: bool) -> Result<LoadedManifest> {
    let manifest_path = ws.root_manifest_path();
    let root = Manifest::load(&manifest_path)?;

    // Manifest repositories already checked out in this workspace, for
    // --local-manifest resolution.
    let local_projects: HashMap<ProjectKey, PathBuf> = scanner::scan_workspace(ws, ScanMode::Fast)?
        .into_iter()
        .map(|(key, local)| (key, local.path))
        .collect();

    let source = GitImportSource::new(ws, local_projects, local_manifest);
    let loader = ManifestLoader::new(&source, ws.config().active_attributes());
    let loaded = loader.load(&root, &manifest_path.to_string_lossy())?;

    for key in &loaded.dropped_projects {
        log::debug!("project {key} dropped by attribute filtering");
    }
    for name in &loaded.dropped_packages {
        log::debug!("package {name} dropped by attribute filtering");
    }
    Ok(loaded)
}

/// Parse a `name=value` CLI pair.
pub fn split_pair(raw: &str, what: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() && !value.is_empty() => {
            Ok((name.to_string(), value.to_string()))
        }
        _ => Err(Error::Usage(format!(
            "malformed {what} {raw:?}; expected NAME=VALUE"
        ))),
    }
}
