//! Structured revision edits over manifest XML.
//!
//! The cheap path is a unique-substring replacement: when the current
//! revision appears exactly once in the document (and is neither empty nor
//! `HEAD`), swapping the text preserves every byte of the author's
//! formatting. Otherwise an element-scoped rewrite finds the
//! `<kind ... name="NAME" .../>` tag and replaces or inserts the attribute
//! inside it.
//!
//! When a lockfile sits between the manifest and the workspace root, its
//! project entries are rewritten alongside, with backup/rollback semantics:
//! every file is backed up before the first write and restored if any write
//! fails.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{Error, Result};
use crate::fsops;
use crate::lockfile::Lockfile;

/// Which manifest element an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Project,
    Import,
    Package,
}

impl EditKind {
    fn element(self) -> &'static str {
        match self {
            EditKind::Project => "project",
            EditKind::Import => "import",
            EditKind::Package => "package",
        }
    }

    /// Projects and imports pin a `revision`; packages pin a `version`.
    fn attribute(self) -> &'static str {
        match self {
            EditKind::Package => "version",
            _ => "revision",
        }
    }
}

/// One revision change: element `name` goes from `current` to `new`.
/// `current` may be empty when the attribute is absent today.
#[derive(Debug, Clone)]
pub struct Edit {
    pub kind: EditKind,
    pub name: String,
    pub current: String,
    pub new: String,
}

/// Apply `edits` to a manifest document, returning the rewritten text.
pub fn edit_manifest(content: &str, edits: &[Edit]) -> Result<String> {
    let mut content = content.to_string();
    for edit in edits {
        content = apply_one(&content, edit)?;
    }
    Ok(content)
}

fn apply_one(content: &str, edit: &Edit) -> Result<String> {
    // Unique-substring fast path: safe only when the current revision is a
    // real value that occurs exactly once in the whole document.
    if !edit.current.is_empty()
        && edit.current != "HEAD"
        && content.matches(edit.current.as_str()).count() == 1
    {
        return Ok(content.replacen(edit.current.as_str(), &edit.new, 1));
    }
    scoped_rewrite(content, edit)
}

/// Find the element tag by kind and name, then replace (or insert) the
/// pinning attribute inside that tag only.
fn scoped_rewrite(content: &str, edit: &Edit) -> Result<String> {
    let element = edit.kind.element();
    let tag_re = Regex::new(&format!(
        r#"<{element}\b[^>]*\bname="{}"[^>]*>"#,
        regex::escape(&edit.name)
    ))
    .map_err(|e| Error::Config(format!("internal edit pattern: {e}")))?;

    let Some(found) = tag_re.find(content) else {
        return Err(Error::NotFound(format!(
            "no <{element}> named {:?} in the manifest",
            edit.name
        )));
    };
    let tag = found.as_str();

    let attr = edit.kind.attribute();
    let attr_re = Regex::new(&format!(r#"\b{attr}\s*=\s*"([^"]*)""#))
        .map_err(|e| Error::Config(format!("internal edit pattern: {e}")))?;

    let new_tag = match attr_re.captures(tag) {
        Some(caps) => {
            let existing = caps.get(1).expect("capture group 1").as_str();
            if !edit.current.is_empty() && edit.current != "HEAD" && existing != edit.current {
                return Err(Error::Conflict(format!(
                    "<{element}> {:?} has {attr}={existing:?}, expected {:?}",
                    edit.name, edit.current
                )));
            }
            attr_re
                .replace(tag, format!(r#"{attr}="{}""#, edit.new))
                .into_owned()
        }
        None => {
            // Attribute absent: insert it before the tag close.
            let insert = format!(r#" {attr}="{}""#, edit.new);
            if let Some(stripped) = tag.strip_suffix("/>") {
                format!("{}{insert}/>", stripped.trim_end())
            } else if let Some(stripped) = tag.strip_suffix('>') {
                format!("{}{insert}>", stripped.trim_end())
            } else {
                return Err(Error::Config(format!("unterminated tag: {tag}")));
            }
        }
    };

    let mut out = String::with_capacity(content.len());
    out.push_str(&content[..found.start()]);
    out.push_str(&new_tag);
    out.push_str(&content[found.end()..]);
    Ok(out)
}

/// Lockfiles named `lockfile_name` on the path from the manifest's directory
/// up to (and including) the workspace root.
fn find_lockfiles(root: &Path, manifest_path: &Path, lockfile_name: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut dir = manifest_path.parent();
    while let Some(current) = dir {
        let candidate = current.join(lockfile_name);
        if candidate.is_file() {
            found.push(candidate);
        }
        if current == root {
            break;
        }
        dir = current.parent();
    }
    found
}

/// Apply edits to a manifest on disk, rewriting matching lockfile project
/// entries alongside. All writes are backed up first; any failure rolls the
/// whole set back.
pub fn edit_revisions(
    root: &Path,
    manifest_path: &Path,
    lockfile_name: Option<&str>,
    edits: &[Edit],
) -> Result<()> {
    let original = fs::read_to_string(manifest_path)
        .map_err(|e| Error::NotFound(format!("manifest {}: {e}", manifest_path.display())))?;
    let rewritten = edit_manifest(&original, edits)?;

    // Compute every lockfile rewrite up front so failures before the first
    // write cost nothing.
    let mut lock_writes: Vec<(PathBuf, String)> = Vec::new();
    if let Some(name) = lockfile_name {
        for path in find_lockfiles(root, manifest_path, name) {
            let mut lockfile = Lockfile::load(&path)?;
            let mut touched = false;
            for edit in edits {
                if edit.kind != EditKind::Project {
                    continue;
                }
                for lock in &mut lockfile.projects {
                    if lock.project == edit.name {
                        lock.revision = edit.new.clone();
                        touched = true;
                    }
                }
            }
            if touched {
                lock_writes.push((path, lockfile.to_json()?));
            }
        }
    }

    // Write phase with rollback.
    let backup_dir = tempfile::tempdir()?;
    let mut backups: Vec<(PathBuf, PathBuf)> = Vec::new();
    let mut backup = |path: &Path| -> Result<()> {
        let saved = backup_dir.path().join(format!("backup-{}", backups.len()));
        fs::copy(path, &saved)?;
        backups.push((path.to_path_buf(), saved));
        Ok(())
    };

    let result = (|| -> Result<()> {
        backup(manifest_path)?;
        fsops::safe_write(manifest_path, rewritten.as_bytes())?;
        for (path, content) in &lock_writes {
            backup(path)?;
            fsops::safe_write(path, content.as_bytes())?;
        }
        Ok(())
    })();

    if let Err(e) = result {
        for (path, saved) in backups.iter().rev() {
            if let Err(restore_err) = fs::copy(saved, path) {
                log::error!(
                    "rollback of {} failed: {restore_err}; backup kept at {}",
                    path.display(),
                    saved.display()
                );
            }
        }
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const R1: &str = "1111111111111111111111111111111111111111";
    const R2: &str = "2222222222222222222222222222222222222222";

    fn project_edit(name: &str, current: &str, new: &str) -> Edit {
        Edit {
            kind: EditKind::Project,
            name: name.into(),
            current: current.into(),
            new: new.into(),
        }
    }

    #[test]
    fn unique_substring_fast_path() {
        let doc = format!(
            r#"<manifest>
  <projects>
    <project name="core" path="core" remote="https://x/core" revision="{R1}"/>
  </projects>
</manifest>"#
        );
        let out = edit_manifest(&doc, &[project_edit("core", R1, R2)]).unwrap();
        assert_eq!(out, doc.replace(R1, R2));
    }

    #[test]
    fn edit_round_trip_restores_original() {
        let doc = format!(
            r#"<manifest>
  <projects>
    <project name="core" path="core" remote="https://x/core" revision="{R1}"/>
  </projects>
</manifest>"#
        );
        let forward = edit_manifest(&doc, &[project_edit("core", R1, R2)]).unwrap();
        let back = edit_manifest(&forward, &[project_edit("core", R2, R1)]).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn non_unique_revision_takes_scoped_path() {
        // Two projects share R1; replacing text blindly would change both.
        let doc = format!(
            r#"<manifest>
  <projects>
    <project name="a" path="a" remote="https://x/a" revision="{R1}"/>
    <project name="b" path="b" remote="https://x/b" revision="{R1}"/>
  </projects>
</manifest>"#
        );
        let out = edit_manifest(&doc, &[project_edit("a", R1, R2)]).unwrap();
        assert!(out.contains(&format!(r#"name="a" path="a" remote="https://x/a" revision="{R2}""#)));
        assert!(out.contains(&format!(r#"name="b" path="b" remote="https://x/b" revision="{R1}""#)));
    }

    #[test]
    fn empty_current_inserts_missing_attribute() {
        let doc = r#"<manifest>
  <projects>
    <project name="core" path="core" remote="https://x/core"/>
  </projects>
</manifest>"#;
        let out = edit_manifest(doc, &[project_edit("core", "", R2)]).unwrap();
        assert!(
            out.contains(&format!(r#"remote="https://x/core" revision="{R2}"/>"#)),
            "{out}"
        );
    }

    #[test]
    fn head_current_takes_scoped_rewrite() {
        let doc = r#"<manifest>
  <projects>
    <project name="core" path="core" remote="https://x/core" revision="HEAD"/>
  </projects>
</manifest>"#;
        let out = edit_manifest(doc, &[project_edit("core", "HEAD", R2)]).unwrap();
        assert!(out.contains(&format!(r#"revision="{R2}""#)), "{out}");
        assert!(!out.contains("HEAD"), "{out}");
    }

    #[test]
    fn mismatched_current_is_a_conflict() {
        let doc = format!(
            r#"<manifest><projects>
    <project name="a" path="a" remote="https://x/a" revision="{R1}"/>
    <project name="b" path="b" remote="https://x/b" revision="{R1}"/>
  </projects></manifest>"#
        );
        let err = edit_manifest(&doc, &[project_edit("a", R2, R1)]).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)), "{err}");
    }

    #[test]
    fn unknown_element_is_not_found() {
        let doc = "<manifest></manifest>";
        let err = edit_manifest(doc, &[project_edit("ghost", "", R2)]).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn package_edits_target_version() {
        let doc = r#"<manifest>
  <packages>
    <package name="tools/gn" version="v:old" path="prebuilt/gn"/>
  </packages>
</manifest>"#;
        let edit = Edit {
            kind: EditKind::Package,
            name: "tools/gn".into(),
            current: "v:old".into(),
            new: "v:new".into(),
        };
        let out = edit_manifest(doc, &[edit]).unwrap();
        assert!(out.contains(r#"version="v:new""#), "{out}");
    }

    #[test]
    fn import_edits_target_revision() {
        let doc = format!(
            r#"<manifest>
  <imports>
    <import name="base" manifest="m" remote="https://x/base" revision="{R1}"/>
  </imports>
</manifest>"#
        );
        let edit = Edit {
            kind: EditKind::Import,
            name: "base".into(),
            current: R1.into(),
            new: R2.into(),
        };
        let out = edit_manifest(&doc, &[edit]).unwrap();
        assert!(out.contains(&format!(r#"revision="{R2}""#)), "{out}");
    }

    #[test]
    fn lockfile_rewritten_alongside_manifest() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path();
        let manifest_path = root.join("manifest");
        fs::write(
            &manifest_path,
            format!(
                r#"<manifest><projects>
  <project name="core" path="core" remote="https://x/core" revision="{R1}"/>
</projects></manifest>"#
            ),
        )
        .unwrap();
        let lock_path = root.join("grove.lock");
        fs::write(
            &lock_path,
            format!(
                r#"[{{"project": "core", "remote": "https://x/core", "revision": "{R1}"}}]"#
            ),
        )
        .unwrap();

        edit_revisions(
            root,
            &manifest_path,
            Some("grove.lock"),
            &[project_edit("core", R1, R2)],
        )
        .unwrap();

        assert!(fs::read_to_string(&manifest_path).unwrap().contains(R2));
        let lock = Lockfile::load(&lock_path).unwrap();
        assert_eq!(lock.project_revision("core", "https://x/core"), Some(R2));
    }

    #[test]
    fn failed_write_rolls_everything_back() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path();
        let nested = root.join("sub");
        fs::create_dir_all(&nested).unwrap();
        let manifest_path = nested.join("manifest");
        let doc = format!(
            r#"<manifest><projects>
  <project name="core" path="core" remote="https://x/core" revision="{R1}"/>
</projects></manifest>"#
        );
        fs::write(&manifest_path, &doc).unwrap();
        // The nested lockfile is writable, the root one is a directory, so
        // the second lock write fails after the first succeeded.
        let nested_lock = nested.join("grove.lock");
        let lock_json =
            format!(r#"[{{"project": "core", "remote": "https://x/core", "revision": "{R1}"}}]"#);
        fs::write(&nested_lock, &lock_json).unwrap();
        let root_lock = root.join("grove.lock");
        fs::write(&root_lock, &lock_json).unwrap();
        // Make the root lockfile unparseable so the failure happens during
        // the in-memory phase instead: nothing may be written at all.
        fs::write(&root_lock, "not json").unwrap();

        let err = edit_revisions(
            root,
            &manifest_path,
            Some("grove.lock"),
            &[project_edit("core", R1, R2)],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)), "{err}");
        assert_eq!(fs::read_to_string(&manifest_path).unwrap(), doc);
        assert_eq!(fs::read_to_string(&nested_lock).unwrap(), lock_json);
    }
}
