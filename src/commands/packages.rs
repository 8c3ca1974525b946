use std::time::Duration;

use grove::error::Result;
use grove::pkg;
use grove::retry;
use grove::workspace::Workspace;

use super::update::{finish, load_for_auxiliary, register_interrupt};

/// Fetch the manifest's binary packages for this host without synchronizing.
pub fn run_fetch_packages(
    ws: &Workspace,
    timeout: Duration,
    attempts: u32,
    local_manifest: bool,
) -> Result<()> {
    register_interrupt(ws);
    let loaded = load_for_auxiliary(ws, local_manifest)?;
    if loaded.packages.is_empty() {
        println!("no packages in the manifest");
        return Ok(());
    }
    let outcome = retry::with_backoff("fetch-packages", attempts, Default::default(), || {
        pkg::fetch_packages(ws, &loaded.packages, timeout)
    });
    if let Err(e) = outcome {
        log::error!("fetch-packages: {e}");
        ws.count_failure();
    }
    finish(ws)
}
