use std::path::PathBuf;
use std::time::Duration;

use grove::error::{Error, Result};
use grove::executor::{self, ExecOptions};
use grove::hooks;
use grove::manifest::{ImportSource, LoadedManifest, Manifest, ManifestLoader};
use grove::pkg;
use grove::plan::{self, PlanInput, RebaseFlags};
use grove::scanner::{self, ScanMode};
use grove::snapshot;
use grove::workspace::Workspace;
use grove::{git, retry};

use super::load_resolved;

pub struct UpdateArgs {
    pub gc: bool,
    pub local_manifest: bool,
    pub rebase: RebaseFlags,
    pub no_hooks: bool,
    pub no_packages: bool,
    pub hook_timeout: Duration,
    pub fetch_packages_timeout: Duration,
    pub snapshot: Option<PathBuf>,
}

/// Snapshot manifests are self-contained; imports inside one are an error.
struct NoImports;

impl ImportSource for NoImports {
    fn read_local(&self, _repo: Option<&grove::manifest::Import>, file: &str) -> Result<String> {
        Err(Error::Config(format!(
            "snapshot manifests cannot use localimport (found {file:?})"
        )))
    }

    fn read_import(&self, import: &grove::manifest::Import, _file: &str) -> Result<String> {
        Err(Error::Config(format!(
            "snapshot manifests cannot import (found {})",
            import.name
        )))
    }
}

/// The synchronize run: resolve, scan, plan, execute, snapshot, hooks,
/// packages.
pub fn run_update(ws: &Workspace, args: UpdateArgs) -> Result<()> {
    git::ensure_installed()?;
    register_interrupt(ws);

    let timestamp = snapshot::now_timestamp();
    let snapshot_mode = args.snapshot.is_some();
    let loaded = match &args.snapshot {
        Some(file) => {
            let manifest = Manifest::load(file)?;
            let source = NoImports;
            ManifestLoader::new(&source, ws.config().active_attributes())
                .load(&manifest, &file.to_string_lossy())?
        }
        None => load_resolved(ws, args.local_manifest)?,
    };

    let local = scanner::local_entries(ws, ScanMode::Fast, true)?;

    let ops = plan::plan(&PlanInput {
        resolved: &loaded.projects,
        local: &local,
        snapshot_mode,
        submodules_enabled: ws.config().submodules_enabled(),
        rebase: args.rebase,
    });
    for op in &ops {
        log::debug!("planned: {}", op.describe());
    }

    executor::execute(
        ws,
        &ops,
        &ExecOptions {
            gc: args.gc,
            timestamp: timestamp.clone(),
        },
    )?;

    // The next run's fast scan trusts this index.
    ws.write_project_index(
        loaded
            .projects
            .values()
            .map(|p| p.path.clone())
            .collect(),
    )?;

    if snapshot_mode {
        log::info!("snapshot checkout; not writing update history");
    } else {
        let pinned = snapshot::pinned_manifest(ws, &loaded)?;
        snapshot::write_snapshot(ws, &pinned, &timestamp)?;
    }

    if !args.no_hooks {
        hooks::run_hooks(ws, &loaded.hooks, &loaded.projects, args.hook_timeout, 1)?;
    }

    if !args.no_packages && !loaded.packages.is_empty() {
        let outcome = retry::with_backoff("fetch-packages", 1, Default::default(), || {
            pkg::fetch_packages(ws, &loaded.packages, args.fetch_packages_timeout)
        });
        if let Err(e) = outcome {
            log::error!("fetch-packages: {e}");
            ws.count_failure();
        }
    }

    finish(ws)
}

pub(super) fn finish(ws: &Workspace) -> Result<()> {
    if ws.cancelled() {
        return Err(Error::Interrupted);
    }
    match ws.failures() {
        0 => Ok(()),
        n => Err(Error::Conflict(format!(
            "completed with {n} non-fatal error{}",
            if n == 1 { "" } else { "s" }
        ))),
    }
}

#[cfg(unix)]
pub(super) fn register_interrupt(ws: &Workspace) {
    if let Err(e) = signal_hook::flag::register(signal_hook::consts::SIGINT, ws.cancel_flag()) {
        log::warn!("cannot install interrupt handler: {e}");
    }
}

#[cfg(not(unix))]
pub(super) fn register_interrupt(_ws: &Workspace) {}

/// Shared by run-hooks / fetch-packages: the loaded view they operate on.
pub(super) fn load_for_auxiliary(ws: &Workspace, local_manifest: bool) -> Result<LoadedManifest> {
    git::ensure_installed()?;
    load_resolved(ws, local_manifest)
}
