use std::path::PathBuf;

use grove::error::Result;
use grove::fsops;
use grove::workspace::Workspace;

/// Create an empty workspace, with a skeleton root manifest to fill in.
pub fn run_init(directory: Option<PathBuf>) -> Result<()> {
    let root = match directory {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            dir
        }
        None => std::env::current_dir()?,
    };
    let ws = Workspace::init(&root)?;

    let manifest_path = ws.root_manifest_path();
    if !manifest_path.exists() {
        fsops::safe_write(
            &manifest_path,
            b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<manifest>\n</manifest>\n",
        )?;
    }
    println!("initialized workspace at {}", ws.root().display());
    Ok(())
}
