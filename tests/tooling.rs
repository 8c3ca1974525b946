//! Resolve, edit, snapshot, and status flows against file:// remotes.

mod common;

use common::*;
use tempfile::TempDir;

#[test]
fn resolve_writes_a_deterministic_lockfile() {
    let tmp = TempDir::new().unwrap();
    let remote_a = Remote::new(tmp.path(), "a", &[("f", "a\n")]);
    let remote_b = Remote::new(tmp.path(), "b", &[("f", "b\n")]);
    let ws = init_workspace(tmp.path());
    write_root_manifest(
        &ws,
        &format!(
            "<manifest><projects>{}{}</projects></manifest>\n",
            project_stanza("beta", "beta", &remote_b, ""),
            project_stanza("alpha", "alpha", &remote_a, "")
        ),
    );

    grove_ok(&ws, &["resolve"]);
    let lock_path = ws.join("grove.lock");
    let first = std::fs::read_to_string(&lock_path).unwrap();
    assert!(first.contains(&remote_a.head()));
    assert!(first.contains(&remote_b.head()));
    // Sorted by project name, independent of manifest order.
    assert!(first.find("alpha").unwrap() < first.find("beta").unwrap());

    grove_ok(&ws, &["resolve"]);
    let second = std::fs::read_to_string(&lock_path).unwrap();
    assert_eq!(first, second, "resolve is byte-deterministic");
}

#[test]
fn resolve_rejects_floating_package_refs() {
    let tmp = TempDir::new().unwrap();
    let ws = init_workspace(tmp.path());
    write_root_manifest(
        &ws,
        "<manifest><packages><package name=\"tools/gn\" version=\"latest\"/></packages></manifest>\n",
    );

    let output = grove_fails(&ws, &["resolve"]);
    assert_eq!(output.status.code(), Some(25));
}

#[test]
fn edit_rewrites_manifest_and_lockfile() {
    let tmp = TempDir::new().unwrap();
    let remote = Remote::new(tmp.path(), "remote", &[("f", "one\n")]);
    let r1 = remote.head();
    let ws = init_workspace(tmp.path());
    write_root_manifest(
        &ws,
        &format!(
            "<manifest><projects>{}</projects></manifest>\n",
            project_stanza("proj", "proj", &remote, &r1)
        ),
    );
    grove_ok(&ws, &["resolve"]);

    let r2 = remote.commit(&[("f", "two\n")], "advance");
    grove_ok(&ws, &["edit", "--project", &format!("proj={r2}")]);

    let manifest = std::fs::read_to_string(ws.join("manifest")).unwrap();
    assert!(manifest.contains(&r2));
    assert!(!manifest.contains(&r1));
    let lock = std::fs::read_to_string(ws.join("grove.lock")).unwrap();
    assert!(lock.contains(&r2), "lockfile rewritten alongside: {lock}");
}

#[test]
fn edit_round_trip_restores_the_manifest() {
    let tmp = TempDir::new().unwrap();
    let remote = Remote::new(tmp.path(), "remote", &[("f", "one\n")]);
    let r1 = remote.head();
    let r2 = remote.commit(&[("f", "two\n")], "advance");
    let ws = init_workspace(tmp.path());
    write_root_manifest(
        &ws,
        &format!(
            "<manifest><projects>{}</projects></manifest>\n",
            project_stanza("proj", "proj", &remote, &r1)
        ),
    );
    let original = std::fs::read_to_string(ws.join("manifest")).unwrap();

    grove_ok(&ws, &["edit", "--project", &format!("proj={r2}")]);
    grove_ok(&ws, &["edit", "--project", &format!("proj={r1}")]);

    assert_eq!(
        std::fs::read_to_string(ws.join("manifest")).unwrap(),
        original
    );
}

#[test]
fn lockfile_round_trips_through_snapshot_checkout() {
    let tmp = TempDir::new().unwrap();
    let remote = Remote::new(tmp.path(), "remote", &[("f", "one\n")]);
    let ws = init_workspace(tmp.path());
    write_root_manifest(
        &ws,
        &format!(
            "<manifest><projects>{}</projects></manifest>\n",
            project_stanza("proj", "proj", &remote, "")
        ),
    );
    grove_ok(&ws, &["update"]);
    grove_ok(&ws, &["resolve"]);
    let first = std::fs::read_to_string(ws.join("grove.lock")).unwrap();

    // Apply the snapshot, then resolve again: same lock content.
    let snapshot = tmp.path().join("snap");
    std::fs::copy(ws.join(".grove/update-history/latest"), &snapshot).unwrap();
    grove_ok(&ws, &["update", "--snapshot", &snapshot.display().to_string()]);
    grove_ok(&ws, &["resolve"]);

    assert_eq!(
        std::fs::read_to_string(ws.join("grove.lock")).unwrap(),
        first
    );
}

#[test]
fn snapshot_command_prints_pinned_manifest() {
    let tmp = TempDir::new().unwrap();
    let remote = Remote::new(tmp.path(), "remote", &[("f", "x\n")]);
    let ws = init_workspace(tmp.path());
    write_root_manifest(
        &ws,
        &format!(
            "<manifest><projects>{}</projects></manifest>\n",
            project_stanza("proj", "proj", &remote, "")
        ),
    );
    grove_ok(&ws, &["update"]);

    let output = grove_ok(&ws, &["snapshot"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&remote.head()), "{stdout}");
    assert!(stdout.contains("proj"), "{stdout}");
}

#[test]
fn check_clean_reflects_workspace_state() {
    let tmp = TempDir::new().unwrap();
    let remote = Remote::new(tmp.path(), "remote", &[("f", "x\n")]);
    let ws = init_workspace(tmp.path());
    write_root_manifest(
        &ws,
        &format!(
            "<manifest><projects>{}</projects></manifest>\n",
            project_stanza("proj", "proj", &remote, "")
        ),
    );
    grove_ok(&ws, &["update"]);
    grove_ok(&ws, &["check-clean"]);

    // Modify a tracked file: now dirty.
    std::fs::write(ws.join("proj/f"), "modified\n").unwrap();
    let output = grove_fails(&ws, &["check-clean"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn status_lists_projects() {
    let tmp = TempDir::new().unwrap();
    let remote = Remote::new(tmp.path(), "remote", &[("f", "x\n")]);
    let ws = init_workspace(tmp.path());
    write_root_manifest(
        &ws,
        &format!(
            "<manifest><projects>{}</projects></manifest>\n",
            project_stanza("proj", "proj", &remote, "")
        ),
    );
    grove_ok(&ws, &["update"]);

    let output = grove_ok(&ws, &["status"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("proj"), "{stdout}");
    assert!(stdout.contains("detached"), "fresh checkouts are detached: {stdout}");
}

#[test]
fn branch_lists_and_deletes_across_projects() {
    let tmp = TempDir::new().unwrap();
    let remote = Remote::new(tmp.path(), "remote", &[("f", "x\n")]);
    let ws = init_workspace(tmp.path());
    write_root_manifest(
        &ws,
        &format!(
            "<manifest><projects>{}</projects></manifest>\n",
            project_stanza("proj", "proj", &remote, "")
        ),
    );
    grove_ok(&ws, &["update"]);

    let proj = ws.join("proj");
    git(&proj, &["branch", "scratch"]);

    let output = grove_ok(&ws, &["branch", "scratch"]);
    assert!(String::from_utf8_lossy(&output.stdout).contains("proj"));

    grove_ok(&ws, &["branch", "scratch", "--delete"]);
    let branches = git(&proj, &["branch", "--list", "scratch"]);
    assert!(branches.trim().is_empty(), "branch deleted: {branches}");
}

#[test]
fn diff_reports_revision_changes_between_snapshots() {
    let tmp = TempDir::new().unwrap();
    let remote = Remote::new(tmp.path(), "remote", &[("f", "one\n")]);
    let ws = init_workspace(tmp.path());
    write_root_manifest(
        &ws,
        &format!(
            "<manifest><projects>{}</projects></manifest>\n",
            project_stanza("proj", "proj", &remote, "")
        ),
    );
    grove_ok(&ws, &["update"]);
    let r2 = remote.commit(&[("f", "two\n")], "advance");
    grove_ok(&ws, &["update"]);

    let output = grove_ok(&ws, &["diff"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("U proj"), "{stdout}");
    assert!(stdout.contains(&r2[..12]), "{stdout}");
}

#[test]
fn generate_gitmodules_lists_projects() {
    let tmp = TempDir::new().unwrap();
    let remote = Remote::new(tmp.path(), "remote", &[("f", "x\n")]);
    let ws = init_workspace(tmp.path());
    write_root_manifest(
        &ws,
        &format!(
            "<manifest><projects>{}</projects></manifest>\n",
            project_stanza("proj", "nested/proj", &remote, "")
        ),
    );

    let output = grove_ok(&ws, &["generate-gitmodules"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[submodule \"proj\"]"), "{stdout}");
    assert!(stdout.contains("path = nested/proj"), "{stdout}");
    assert!(stdout.contains(&remote.url), "{stdout}");
}

#[test]
fn runp_runs_in_each_project() {
    let tmp = TempDir::new().unwrap();
    let remote_a = Remote::new(tmp.path(), "a", &[("f", "a\n")]);
    let remote_b = Remote::new(tmp.path(), "b", &[("f", "b\n")]);
    let ws = init_workspace(tmp.path());
    write_root_manifest(
        &ws,
        &format!(
            "<manifest><projects>{}{}</projects></manifest>\n",
            project_stanza("one", "one", &remote_a, ""),
            project_stanza("two", "two", &remote_b, "")
        ),
    );
    grove_ok(&ws, &["update"]);

    let output = grove_ok(&ws, &["runp", "git", "rev-parse", "--show-toplevel"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--- one="), "{stdout}");
    assert!(stdout.contains("--- two="), "{stdout}");

    // A failing command is reported per project and exits non-fatally.
    let output = grove_fails(&ws, &["runp", "false"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn grep_prefixes_matches_with_project_paths() {
    let tmp = TempDir::new().unwrap();
    let remote = Remote::new(tmp.path(), "remote", &[("notes.txt", "needle here\n")]);
    let ws = init_workspace(tmp.path());
    write_root_manifest(
        &ws,
        &format!(
            "<manifest><projects>{}</projects></manifest>\n",
            project_stanza("proj", "proj", &remote, "")
        ),
    );
    grove_ok(&ws, &["update"]);

    let output = grove_ok(&ws, &["grep", "needle"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("proj/notes.txt:1:needle here"), "{stdout}");
}

#[test]
fn override_pins_a_project() {
    let tmp = TempDir::new().unwrap();
    let remote = Remote::new(tmp.path(), "remote", &[("f", "one\n")]);
    let r1 = remote.head();
    let ws = init_workspace(tmp.path());
    write_root_manifest(
        &ws,
        &format!(
            "<manifest><projects>{}</projects></manifest>\n",
            project_stanza("proj", "proj", &remote, "")
        ),
    );
    grove_ok(&ws, &["update"]);

    // The remote moves on, but an override pins the project at R1.
    remote.commit(&[("f", "two\n")], "advance");
    grove_ok(&ws, &[
        "override",
        "proj",
        &remote.url,
        "--revision",
        &r1,
    ]);
    grove_ok(&ws, &["update"]);

    assert_eq!(head_of(&ws.join("proj")), r1);
    assert_eq!(std::fs::read_to_string(ws.join("proj/f")).unwrap(), "one\n");
}

#[test]
fn run_hooks_executes_manifest_hooks() {
    let tmp = TempDir::new().unwrap();
    let remote = Remote::new(
        tmp.path(),
        "remote",
        &[
            ("f", "x\n"),
            ("hook.sh", "#!/bin/sh\necho ran > hook-output.txt\n"),
        ],
    );
    // Scripts need the executable bit in the remote history.
    git(&remote.dir, &["update-index", "--chmod=+x", "hook.sh"]);
    git(&remote.dir, &["commit", "-m", "make hook executable"]);

    let ws = init_workspace(tmp.path());
    write_root_manifest(
        &ws,
        &format!(
            "<manifest>\n  <projects>{}</projects>\n  <hooks>\n    <hook name=\"gen\" project=\"proj\" action=\"hook.sh\"/>\n  </hooks>\n</manifest>\n",
            project_stanza("proj", "proj", &remote, "")
        ),
    );
    grove_ok(&ws, &["update"]);

    assert_eq!(
        std::fs::read_to_string(ws.join("proj/hook-output.txt"))
            .unwrap()
            .trim(),
        "ran"
    );
}
