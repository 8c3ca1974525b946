//! Core error kinds shared across the update engine.
//!
//! The library reports everything through [`Error`]; the binding layer in
//! `main.rs` maps kinds to process exit codes. Per-project failures during an
//! update are counted on the workspace handle rather than propagated, so a
//! single bad project never aborts the run.

use std::path::Path;

use crate::git::GitError;

/// Exit code for usage errors (mirrors clap's own).
pub const EXIT_USAGE: i32 = 2;
/// Exit code when `patch` cannot find the named project.
pub const EXIT_PROJECT_NOT_FOUND: i32 = 23;
/// Exit code when `patch` fails to rebase the fetched change.
pub const EXIT_REBASE_FAILED: i32 = 24;
/// Exit code for an invalid ensure-file or floating package ref.
pub const EXIT_ENSURE_FILE: i32 = 25;
/// Exit code after a user interrupt drained in-flight work.
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug)]
pub enum Error {
    /// Caller-visible misuse of the tool; exits with code 2.
    Usage(String),
    /// Malformed manifest, lockfile, or workspace config.
    Config(String),
    /// A referenced project, import, package, or file is absent.
    NotFound(String),
    /// Invariant violation, lockfile disagreement, or divergent state that
    /// needs manual resolution. The message names the manual fix.
    Conflict(String),
    /// Network or git-server failure; retried by the executor, surfaced only
    /// once attempts are exhausted.
    Transient(String),
    /// The run was cancelled by the user; in-flight work was drained.
    Interrupted,
    /// The external git or package tool is missing or not executable.
    ToolMissing(String),
    /// A required ensure-file could not be produced or a package version tag
    /// is a floating ref while floating refs are disallowed.
    EnsureFile(String),
    /// `patch` could not find the named project in the workspace.
    ProjectNotFound(String),
    /// `patch` fetched the change but could not rebase it.
    RebaseFailed { project: String, detail: String },
    /// Filesystem or subprocess failure not covered by a more specific kind.
    Io(std::io::Error),
    /// Failure from the git adapter, preserving its classification.
    Git(GitError),
}

impl Error {
    /// True when the executor's retry wrapper should try again.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transient(_) => true,
            Error::Git(e) => e.is_transient(),
            _ => false,
        }
    }

    /// The process exit code the binding layer should use for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Usage(_) => EXIT_USAGE,
            Error::ProjectNotFound(_) => EXIT_PROJECT_NOT_FOUND,
            Error::RebaseFailed { .. } => EXIT_REBASE_FAILED,
            Error::EnsureFile(_) => EXIT_ENSURE_FILE,
            Error::Interrupted => EXIT_INTERRUPTED,
            _ => 1,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Usage(msg) => write!(f, "{msg}"),
            Error::Config(msg) => write!(f, "invalid configuration: {msg}"),
            Error::NotFound(msg) => write!(f, "not found: {msg}"),
            Error::Conflict(msg) => write!(f, "{msg}"),
            Error::Transient(msg) => write!(f, "{msg}"),
            Error::Interrupted => write!(f, "interrupted; in-flight work was allowed to finish"),
            Error::ToolMissing(tool) => write!(f, "required tool is missing or not executable: {tool}"),
            Error::EnsureFile(msg) => write!(f, "{msg}"),
            Error::ProjectNotFound(name) => write!(f, "project {name:?} is not part of this workspace"),
            Error::RebaseFailed { project, detail } => {
                write!(f, "rebase failed in project {project:?}: {detail}")
            }
            Error::Io(e) => write!(f, "{e}"),
            Error::Git(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Git(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<GitError> for Error {
    fn from(e: GitError) -> Self {
        Error::Git(e)
    }
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Context helper for filesystem errors: most io::Error messages are useless
/// without the path they concern.
pub trait ResultExt<T> {
    /// Wrap a filesystem error with the path it concerns.
    fn at_path(self, path: &std::path::Path) -> Result<T>;
}

impl<T> ResultExt<T> for std::io::Result<T> {
    fn at_path(self, path: &std::path::Path) -> Result<T> {
        self.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {e}", path.display()),
            ))
        })
    }
}

/// Name the swap entry left behind by a failed two-step rename so the user
/// can complete the move by hand.
pub fn swap_recovery_error(src: &Path, swap: &Path, dst: &Path) -> Error {
    Error::Conflict(format!(
        "move of {} to {} failed and automatic recovery from the swap area also failed; \
         the project contents are at {}; move them into place manually",
        src.display(),
        dst.display(),
        swap.display()
    ))
}
