//! The Gerrit surface the core depends on.
//!
//! Only parsing and the status-query trait live here; the HTTP client is an
//! external collaborator injected through [`ChangeStatusSource`].

use crate::error::{Error, Result};

/// Query whether a change has been submitted. Implemented by the REST
/// adapter outside the core; tests substitute a map.
pub trait ChangeStatusSource {
    fn is_submitted(&self, change_id: &str) -> Result<bool>;
}

/// The fetch ref for a change/patchset pair:
/// `refs/changes/<cl % 100, zero padded>/<cl>/<ps>`.
pub fn change_ref(change: u64, patchset: u32) -> String {
    format!("refs/changes/{:02}/{change}/{patchset}", change % 100)
}

/// Parse a user-supplied change spec: `<cl>` or `<cl>/<ps>` (patchset
/// defaults to 1), or a full `refs/...` string passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSpec {
    Change { change: u64, patchset: u32 },
    Ref(String),
}

impl ChangeSpec {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.starts_with("refs/") {
            return Ok(ChangeSpec::Ref(raw.to_string()));
        }
        let (cl, ps) = match raw.split_once('/') {
            Some((cl, ps)) => (cl, Some(ps)),
            None => (raw, None),
        };
        let change: u64 = cl
            .parse()
            .map_err(|_| Error::Usage(format!("malformed change number {raw:?}")))?;
        let patchset: u32 = match ps {
            Some(ps) => ps
                .parse()
                .map_err(|_| Error::Usage(format!("malformed patchset in {raw:?}")))?,
            None => 1,
        };
        Ok(ChangeSpec::Change { change, patchset })
    }

    pub fn fetch_ref(&self) -> String {
        match self {
            ChangeSpec::Change { change, patchset } => change_ref(*change, *patchset),
            ChangeSpec::Ref(r) => r.clone(),
        }
    }

    /// Branch name for the checkout: `change/<cl>/<ps>`.
    pub fn branch_name(&self) -> String {
        match self {
            ChangeSpec::Change { change, patchset } => format!("change/{change}/{patchset}"),
            ChangeSpec::Ref(r) => format!("change/{}", r.trim_start_matches("refs/").replace('/', "-")),
        }
    }
}

/// Extract the last `Change-Id:` trailer from a commit message.
pub fn change_id(commit_message: &str) -> Option<&str> {
    commit_message
        .lines()
        .rev()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("Change-Id:"))
        .map(str::trim)
        .filter(|id| id.starts_with('I') && id.len() > 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_ref_pads_the_bucket() {
        assert_eq!(change_ref(4, 2), "refs/changes/04/4/2");
        assert_eq!(change_ref(123456, 7), "refs/changes/56/123456/7");
        assert_eq!(change_ref(100, 1), "refs/changes/00/100/1");
    }

    #[test]
    fn parses_change_numbers() {
        assert_eq!(
            ChangeSpec::parse("12345").unwrap(),
            ChangeSpec::Change {
                change: 12345,
                patchset: 1
            }
        );
        assert_eq!(
            ChangeSpec::parse("12345/6").unwrap(),
            ChangeSpec::Change {
                change: 12345,
                patchset: 6
            }
        );
    }

    #[test]
    fn passes_refs_through() {
        let spec = ChangeSpec::parse("refs/changes/45/12345/6").unwrap();
        assert_eq!(spec.fetch_ref(), "refs/changes/45/12345/6");
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            ChangeSpec::parse("not-a-number"),
            Err(Error::Usage(_))
        ));
        assert!(matches!(
            ChangeSpec::parse("123/xyz"),
            Err(Error::Usage(_))
        ));
    }

    #[test]
    fn branch_names() {
        assert_eq!(
            ChangeSpec::parse("12345/6").unwrap().branch_name(),
            "change/12345/6"
        );
    }

    #[test]
    fn change_id_trailer() {
        let msg = "fix the thing\n\nSome body.\n\nChange-Id: I0123abcd\n";
        assert_eq!(change_id(msg), Some("I0123abcd"));
    }

    #[test]
    fn change_id_takes_the_last_trailer() {
        let msg = "squash\n\nChange-Id: Iaaaa\n\nChange-Id: Ibbbb\n";
        assert_eq!(change_id(msg), Some("Ibbbb"));
    }

    #[test]
    fn change_id_absent() {
        assert_eq!(change_id("no trailers here\n"), None);
        assert_eq!(change_id("Change-Id:\n"), None);
    }
}
