//! `.gitmodules` generation from the resolved project set.
//!
//! Lets a plain `git submodule` workflow consume a grove workspace: every
//! resolved project becomes a submodule entry, sorted by path so the output
//! is stable across runs.

use std::fmt::Write;

use crate::manifest::LoadedManifest;

/// Render the resolved projects as `.gitmodules` content. The workspace root
/// project (path `.`), if present, is skipped; a repository cannot be its own
/// submodule.
pub fn generate_gitmodules(loaded: &LoadedManifest) -> String {
    let mut projects = loaded.sorted_projects();
    projects.sort_by(|a, b| a.path.cmp(&b.path));

    let mut out = String::new();
    for project in projects {
        if project.path == "." || project.path.is_empty() {
            continue;
        }
        let _ = writeln!(out, "[submodule \"{}\"]", project.name);
        let _ = writeln!(out, "\tpath = {}", project.path);
        let _ = writeln!(out, "\turl = {}", project.remote);
        if !project.remote_branch.is_empty() {
            let _ = writeln!(out, "\tbranch = {}", project.remote_branch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{LoadedManifest, Project};

    fn loaded(projects: Vec<Project>) -> LoadedManifest {
        LoadedManifest {
            projects: projects.into_iter().map(|p| (p.key(), p)).collect(),
            ..Default::default()
        }
    }

    fn project(name: &str, path: &str) -> Project {
        Project {
            name: name.into(),
            path: path.into(),
            remote: format!("https://example.com/{name}"),
            ..Default::default()
        }
    }

    #[test]
    fn entries_are_sorted_by_path() {
        let out = generate_gitmodules(&loaded(vec![
            project("zeta", "aa/zeta"),
            project("alpha", "zz/alpha"),
        ]));
        let zeta = out.find("zeta").unwrap();
        let alpha = out.find("alpha").unwrap();
        assert!(zeta < alpha, "{out}");
    }

    #[test]
    fn entry_shape() {
        let mut p = project("core", "core");
        p.remote_branch = "stable".into();
        let out = generate_gitmodules(&loaded(vec![p]));
        assert_eq!(
            out,
            "[submodule \"core\"]\n\tpath = core\n\turl = https://example.com/core\n\tbranch = stable\n"
        );
    }

    #[test]
    fn root_project_is_skipped() {
        let out = generate_gitmodules(&loaded(vec![project("root", "."), project("a", "a")]));
        assert!(!out.contains("root"), "{out}");
        assert!(out.contains("\"a\""), "{out}");
    }

    #[test]
    fn empty_set_renders_nothing() {
        assert!(generate_gitmodules(&loaded(vec![])).is_empty());
    }
}
