use std::time::Duration;

use grove::error::Result;
use grove::hooks;
use grove::workspace::Workspace;

use super::update::{finish, load_for_auxiliary, register_interrupt};

/// Run the manifest's hooks without synchronizing.
pub fn run_hooks_command(
    ws: &Workspace,
    hook_timeout: Duration,
    attempts: u32,
    local_manifest: bool,
) -> Result<()> {
    register_interrupt(ws);
    let loaded = load_for_auxiliary(ws, local_manifest)?;
    hooks::run_hooks(ws, &loaded.hooks, &loaded.projects, hook_timeout, attempts)?;
    finish(ws)
}
