use std::path::PathBuf;

use grove::error::Result;
use grove::fsops;
use grove::gitmodules::generate_gitmodules;
use grove::workspace::Workspace;

use super::load_resolved;

/// Emit a `.gitmodules` view of the resolved projects.
pub fn run_generate_gitmodules(ws: &Workspace, output: Option<PathBuf>) -> Result<()> {
    let loaded = load_resolved(ws, false)?;
    let content = generate_gitmodules(&loaded);
    match output {
        Some(path) => {
            fsops::safe_write(&path, content.as_bytes())?;
            println!("wrote {}", path.display());
        }
        None => print!("{content}"),
    }
    Ok(())
}
