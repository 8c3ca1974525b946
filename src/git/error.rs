//! Git error types and failure classification.
//!
//! Every adapter operation fails with a [`GitError`] whose
//! [`FailureKind`] tells the executor whether retrying is worthwhile.
//! The adapter itself never retries; that is the retry wrapper's job.

use std::path::PathBuf;

/// How an operation failed, from the retry policy's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network or server-side trouble, or lock contention. Retryable.
    Transient,
    /// Malformed input or a missing ref. Retrying will not help.
    Permanent,
    /// The git binary is missing or the path is not a repository.
    Fatal,
}

/// stderr fragments that indicate a transient failure. Git does not expose a
/// machine-readable failure class, so this list is the accumulated folklore
/// of which messages mean "the server or network hiccuped".
const TRANSIENT_MARKERS: &[&str] = &[
    "could not resolve host",
    "connection timed out",
    "connection reset",
    "connection refused",
    "operation timed out",
    "early eof",
    "the remote end hung up unexpectedly",
    "rpc failed",
    "transfer closed",
    "temporary failure",
    "service unavailable",
    "index.lock",
    "shallow file has changed",
];

#[derive(Debug)]
pub enum GitError {
    /// The git binary is absent or not executable.
    Missing,
    /// The directory exists but is not a git working copy.
    NotARepository(PathBuf),
    /// git exited non-zero.
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    /// git succeeded but its output did not have the expected shape.
    ParseError(String),
}

impl GitError {
    pub(crate) fn command_failed(args: &[&str], exit_code: Option<i32>, stderr: &str) -> Self {
        GitError::CommandFailed {
            command: format!("git {}", args.join(" ")),
            exit_code,
            stderr: stderr.trim_end().to_string(),
        }
    }

    /// Classify this failure for the retry policy.
    pub fn kind(&self) -> FailureKind {
        match self {
            GitError::Missing | GitError::NotARepository(_) => FailureKind::Fatal,
            GitError::ParseError(_) => FailureKind::Permanent,
            GitError::CommandFailed { stderr, .. } => {
                let lower = stderr.to_ascii_lowercase();
                if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
                    FailureKind::Transient
                } else {
                    FailureKind::Permanent
                }
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == FailureKind::Transient
    }
}

impl std::fmt::Display for GitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitError::Missing => write!(f, "the 'git' binary was not found on PATH"),
            GitError::NotARepository(path) => {
                write!(f, "{} is not a git repository", path.display())
            }
            GitError::CommandFailed {
                command,
                exit_code,
                stderr,
            } => {
                write!(f, "{command} failed")?;
                if let Some(code) = exit_code {
                    write!(f, " (exit code {code})")?;
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
            GitError::ParseError(msg) => write!(f, "unexpected git output: {msg}"),
        }
    }
}

impl std::error::Error for GitError {}
