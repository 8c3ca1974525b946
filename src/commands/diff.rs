use std::path::PathBuf;

use grove::diff::diff_manifests;
use grove::error::{Error, Result};
use grove::manifest::Manifest;
use grove::workspace::Workspace;

/// Compare two snapshot manifests; defaults to second-latest vs latest.
pub fn run_diff(ws: &Workspace, from: Option<PathBuf>, to: Option<PathBuf>) -> Result<()> {
    let from = from.unwrap_or_else(|| ws.update_history_dir().join("second-latest"));
    let to = to.unwrap_or_else(|| ws.update_history_dir().join("latest"));
    if !from.is_file() {
        return Err(Error::NotFound(format!(
            "snapshot {} (run update at least twice, or name two snapshots)",
            from.display()
        )));
    }

    let old = Manifest::load(&from)?;
    let new = Manifest::load(&to)?;
    let diff = diff_manifests(&old, &new);
    if diff.is_empty() {
        println!("no changes");
    } else {
        print!("{diff}");
    }
    Ok(())
}
