use grove::error::Result;
use grove::patch_ops::{self, PatchOptions};
use grove::scanner::{self, ScanMode};
use grove::workspace::Workspace;

pub struct PatchArgs {
    pub change: String,
    pub project: String,
    pub rebase: bool,
    pub cherry_pick: bool,
    pub no_branch: bool,
    pub force: bool,
    pub remote_branch: Option<String>,
}

pub fn run_patch(ws: &Workspace, args: PatchArgs) -> Result<()> {
    grove::git::ensure_installed()?;
    let locals = scanner::scan_workspace(ws, ScanMode::Fast)?;
    patch_ops::patch(
        ws,
        &locals,
        &args.project,
        &args.change,
        &PatchOptions {
            rebase: args.rebase,
            cherry_pick: args.cherry_pick,
            no_branch: args.no_branch,
            force: args.force,
            remote_branch: args.remote_branch,
        },
    )?;
    println!("patched {} with change {}", args.project, args.change);
    Ok(())
}
