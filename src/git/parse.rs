//! Parsers for git's porcelain and for-each-ref output.
//!
//! Kept separate from the adapter so they can be tested without a repository.

use super::{Branch, GitError};

/// Parse `for-each-ref refs/heads` output in the adapter's format:
/// `<short-name>\t<sha>\t<upstream-short>\t<head-marker>` per line, where the
/// upstream column is empty for untracked branches and the head marker is `*`
/// for the currently checked-out branch.
pub(crate) fn parse_branches(output: &str) -> Result<Vec<Branch>, GitError> {
    let mut branches = Vec::new();
    for line in output.lines() {
        if line.is_empty() {
            continue;
        }
        let mut cols = line.split('\t');
        let (Some(name), Some(sha)) = (cols.next(), cols.next()) else {
            return Err(GitError::ParseError(format!(
                "malformed for-each-ref line: {line:?}"
            )));
        };
        let tracking = cols.next().filter(|s| !s.is_empty()).map(str::to_owned);
        let is_head = cols.next() == Some("*");
        branches.push(Branch {
            name: name.to_string(),
            revision: sha.to_string(),
            tracking,
            tracking_revision: None,
            is_head,
        });
    }
    Ok(branches)
}

/// Extract the sha that `ls-remote` reported for `wanted` (a full ref name).
pub(crate) fn parse_ls_remote(output: &str, wanted: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (sha, name) = line.split_once('\t')?;
        (name == wanted).then(|| sha.to_string())
    })
}

/// Split porcelain status output into (has_uncommitted, has_untracked).
///
/// Untracked entries are the `??` lines; anything else in the first two
/// columns is staged or unstaged tracked content.
pub(crate) fn parse_porcelain_status(output: &str) -> (bool, bool) {
    let mut uncommitted = false;
    let mut untracked = false;
    for line in output.lines() {
        if line.len() < 2 {
            continue;
        }
        if line.starts_with("??") {
            untracked = true;
        } else {
            uncommitted = true;
        }
    }
    (uncommitted, untracked)
}

/// Parse `branch -r --contains` output into remote branch names, dropping the
/// `-> ` symref alias lines git mixes in.
pub(crate) fn parse_remote_branches(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.contains("->"))
        .map(str::to_owned)
        .collect()
}
