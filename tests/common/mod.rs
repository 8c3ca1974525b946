//! Test fixtures: throwaway git remotes and workspaces driven through the
//! grove binary.
//!
//! Git runs with an isolated environment (no user or system config, fixed
//! identity) so tests behave the same on any machine.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

pub fn git_env(cmd: &mut Command) -> &mut Command {
    cmd.env("GIT_CONFIG_GLOBAL", "/dev/null")
        .env("GIT_CONFIG_SYSTEM", "/dev/null")
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_AUTHOR_NAME", "grove-test")
        .env("GIT_AUTHOR_EMAIL", "grove-test@example.com")
        .env("GIT_COMMITTER_NAME", "grove-test")
        .env("GIT_COMMITTER_EMAIL", "grove-test@example.com")
        .env("GIT_TERMINAL_PROMPT", "0")
}

/// Run git in `dir`, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = git_env(Command::new("git").args(args).current_dir(dir))
        .output()
        .expect("git is installed");
    assert!(
        output.status.success(),
        "git {args:?} in {} failed:\n{}",
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// A local "remote": a real repository addressed by file:// URL.
pub struct Remote {
    pub dir: PathBuf,
    pub url: String,
}

impl Remote {
    pub fn new(base: &Path, name: &str, files: &[(&str, &str)]) -> Self {
        let dir = base.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        git(&dir, &["init", "-b", "main"]);
        let remote = Self {
            url: format!("file://{}", dir.display()),
            dir,
        };
        remote.commit(files, "initial commit");
        remote
    }

    /// Commit files on main and return the new head revision.
    pub fn commit(&self, files: &[(&str, &str)], message: &str) -> String {
        for (path, contents) in files {
            let full = self.dir.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(full, contents).unwrap();
        }
        git(&self.dir, &["add", "-A"]);
        git(&self.dir, &["commit", "-m", message]);
        self.head()
    }

    pub fn head(&self) -> String {
        git(&self.dir, &["rev-parse", "HEAD"]).trim().to_string()
    }
}

/// Run the grove binary in `dir`.
pub fn grove(dir: &Path, args: &[&str]) -> Output {
    git_env(
        Command::new(env!("CARGO_BIN_EXE_grove"))
            .args(args)
            .current_dir(dir),
    )
    .output()
    .expect("grove binary runs")
}

pub fn grove_ok(dir: &Path, args: &[&str]) -> Output {
    let output = grove(dir, args);
    assert!(
        output.status.success(),
        "grove {args:?} failed:\nstdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

pub fn grove_fails(dir: &Path, args: &[&str]) -> Output {
    let output = grove(dir, args);
    assert!(
        !output.status.success(),
        "grove {args:?} unexpectedly succeeded"
    );
    output
}

/// Initialize a workspace directory under `base`.
pub fn init_workspace(base: &Path) -> PathBuf {
    let ws = base.join("ws");
    std::fs::create_dir_all(&ws).unwrap();
    grove_ok(&ws, &["init"]);
    ws
}

pub fn write_root_manifest(ws: &Path, body: &str) {
    std::fs::write(
        ws.join("manifest"),
        format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}"),
    )
    .unwrap();
}

pub fn project_stanza(name: &str, path: &str, remote: &Remote, revision: &str) -> String {
    if revision.is_empty() {
        format!(r#"<project name="{name}" path="{path}" remote="{}"/>"#, remote.url)
    } else {
        format!(
            r#"<project name="{name}" path="{path}" remote="{}" revision="{revision}"/>"#,
            remote.url
        )
    }
}

pub fn head_of(checkout: &Path) -> String {
    git(checkout, &["rev-parse", "HEAD"]).trim().to_string()
}
