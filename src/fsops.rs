//! Filesystem primitives for the update engine.
//!
//! Renames route through the workspace swap directory in two steps so a
//! project can move into a subdirectory of itself (or out of one) without the
//! source and destination colliding. Small metadata files are written with
//! tmp-then-rename so readers never observe a torn write.

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result, ResultExt, swap_recovery_error};

/// Deterministic swap-entry name for a source path. Stable across runs so an
/// interrupted move leaves a recognizable entry behind.
pub fn swap_entry_name(src: &Path) -> String {
    let digest = Sha256::digest(src.to_string_lossy().as_bytes());
    // 16 bytes of hex is plenty to avoid collisions among a run's moves.
    digest[..16].iter().map(|b| format!("{b:02x}")).collect()
}

/// Move `src` to `dst` via `swap_dir`: `src -> swap/<hash>` then
/// `swap/<hash> -> dst`. If the second step fails, the entry is renamed back
/// to `src`; if even that fails, the error names the swap path so the user
/// can finish the move by hand.
pub fn swap_rename(swap_dir: &Path, src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(swap_dir).at_path(swap_dir)?;
    let staged = swap_dir.join(swap_entry_name(src));

    fs::rename(src, &staged).at_path(src)?;

    if let Some(parent) = dst.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            return recover(&staged, src, dst, e.into());
        }
    }
    if let Err(e) = fs::rename(&staged, dst) {
        return recover(&staged, src, dst, e.into());
    }
    Ok(())
}

fn recover(staged: &Path, src: &Path, dst: &Path, cause: Error) -> Result<()> {
    log::warn!(
        "rename {} -> {} failed ({cause}); restoring from swap",
        src.display(),
        dst.display()
    );
    match fs::rename(staged, src) {
        Ok(()) => Err(cause),
        Err(_) => Err(swap_recovery_error(src, staged, dst)),
    }
}

/// Write `contents` to `path` atomically: write a sibling temp file, then
/// rename it over the destination.
pub fn safe_write(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Config(format!("cannot write to {}", path.display())))?;
    fs::create_dir_all(parent).at_path(parent)?;
    let tmp = tempfile::NamedTempFile::new_in(parent).at_path(parent)?;
    fs::write(tmp.path(), contents).at_path(tmp.path())?;
    tmp.persist(path)
        .map_err(|e| Error::Io(e.error))
        .map(|_| ())
}

/// Remove empty directories from `start` upward, stopping at (and never
/// removing) `root`. A directory that still has entries ends the walk.
pub fn remove_empty_parents(root: &Path, start: &Path) -> Result<()> {
    let mut current = start.to_path_buf();
    loop {
        if current == root || !current.starts_with(root) {
            return Ok(());
        }
        match fs::read_dir(&current) {
            Ok(mut entries) => {
                if entries.next().is_some() {
                    return Ok(());
                }
            }
            // Already gone; keep walking up.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if current.exists() {
            fs::remove_dir(&current).at_path(&current)?;
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return Ok(()),
        }
    }
}

/// True when `path` is an empty directory (or does not exist at all).
pub fn is_empty_dir(path: &Path) -> Result<bool> {
    match fs::read_dir(path) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e.into()),
    }
}

/// Best-effort recursive copy, used when seeding test fixtures and staging
/// hook scripts. Follows the directory structure, not symlinks.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).at_path(dst)?;
    for entry in fs::read_dir(src).at_path(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target).at_path(&entry.path())?;
        }
    }
    Ok(())
}
