//! Command-line surface. Parsing only; the handlers live in `commands/`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "grove",
    version,
    about = "Materialize and synchronize a multi-repository workspace from an XML manifest"
)]
pub struct Cli {
    /// Run as if started in this directory.
    #[arg(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Verbose logging (same as RUST_LOG=debug).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Parallel job count (default: min(2 x CPUs, 50)).
    #[arg(short = 'j', long, global = true)]
    pub jobs: Option<usize>,

    /// Retry attempts for fetches and clones.
    #[arg(long, global = true)]
    pub attempts: Option<u32>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create an empty workspace in the given (or current) directory.
    Init {
        directory: Option<PathBuf>,
    },

    /// Add an import stanza to the root manifest.
    Import {
        /// Name of the manifest repository.
        name: String,
        /// Manifest file inside that repository.
        manifest: String,
        /// Git remote of the manifest repository.
        remote: String,
        /// Pin the import to a revision.
        #[arg(long)]
        revision: Option<String>,
        /// Track this branch instead of the default.
        #[arg(long)]
        remote_branch: Option<String>,
        /// Path prefix for all projects the import contributes.
        #[arg(long)]
        root: Option<String>,
    },

    /// Synchronize the workspace to the manifest.
    Update {
        /// Delete projects that left the manifest.
        #[arg(long)]
        gc: bool,
        /// Read imported manifests from their local checkouts.
        #[arg(long)]
        local_manifest: bool,
        /// Rebase branches that track an upstream.
        #[arg(long)]
        rebase_tracked: bool,
        /// Rebase branches without an upstream (needs --rebase-all too).
        #[arg(long)]
        rebase_untracked: bool,
        /// Rebase every branch.
        #[arg(long)]
        rebase_all: bool,
        /// Skip post-update hooks.
        #[arg(long)]
        no_hooks: bool,
        /// Skip binary package fetching.
        #[arg(long)]
        no_packages: bool,
        /// Per-phase hook deadline, in minutes.
        #[arg(long, default_value_t = 5)]
        hook_timeout: u64,
        /// Per-phase package fetch deadline, in minutes.
        #[arg(long, default_value_t = 20)]
        fetch_packages_timeout: u64,
        /// Check out this snapshot manifest instead of resolving.
        #[arg(long, value_name = "FILE")]
        snapshot: Option<PathBuf>,
    },

    /// Write the lockfile for the current manifest.
    Resolve {
        /// Lockfile to write (default: the configured lockfile).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Accept package version tags that are not pinned.
        #[arg(long)]
        allow_floating_refs: bool,
        /// Re-resolve every package, ignoring the existing lockfile.
        #[arg(long)]
        full: bool,
    },

    /// Rewrite project/import revisions or package versions in a manifest.
    Edit {
        /// Manifest to edit (default: the root manifest).
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// name=revision pairs for projects.
        #[arg(long = "project", value_name = "NAME=REV")]
        projects: Vec<String>,
        /// name=revision pairs for imports.
        #[arg(long = "import", value_name = "NAME=REV")]
        imports: Vec<String>,
        /// name=version pairs for packages.
        #[arg(long = "package", value_name = "NAME=VERSION")]
        packages: Vec<String>,
    },

    /// Run the manifest's hooks.
    RunHooks {
        /// Per-phase hook deadline, in minutes.
        #[arg(long, default_value_t = 5)]
        hook_timeout: u64,
        #[arg(long, default_value_t = 1)]
        attempts: u32,
        /// Read imported manifests from their local checkouts.
        #[arg(long)]
        local_manifest: bool,
    },

    /// Fetch the manifest's binary packages for this host.
    FetchPackages {
        /// Deadline, in minutes.
        #[arg(long, default_value_t = 20)]
        fetch_packages_timeout: u64,
        #[arg(long, default_value_t = 1)]
        attempts: u32,
        /// Read imported manifests from their local checkouts.
        #[arg(long)]
        local_manifest: bool,
    },

    /// Write a pinned snapshot of the current workspace.
    Snapshot {
        /// Where to write it (default: stdout).
        path: Option<PathBuf>,
    },

    /// Print the resolved manifest.
    Manifest,

    /// Show each project's branch and dirtiness.
    Status,

    /// Exit non-zero if any project has uncommitted changes.
    CheckClean,

    /// List or delete a branch across all projects.
    Branch {
        /// Branch to operate on; omitted lists nothing and is an error for
        /// delete modes.
        name: Option<String>,
        /// Delete the branch where it exists.
        #[arg(short, long)]
        delete: bool,
        /// Force-delete (git branch -D).
        #[arg(short = 'D', long)]
        force_delete: bool,
        /// Delete branches already merged into their upstream.
        #[arg(long)]
        delete_merged: bool,
        /// Apply deletions even in projects whose local config says ignore.
        #[arg(long)]
        override_local_config: bool,
    },

    /// Compare two snapshot manifests (default: second-latest vs latest).
    Diff {
        from: Option<PathBuf>,
        to: Option<PathBuf>,
    },

    /// Emit a .gitmodules view of the resolved projects.
    GenerateGitmodules {
        /// Where to write it (default: stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Add a project override stanza to the root manifest.
    Override {
        /// Project name the override matches.
        name: String,
        /// Project remote the override matches.
        remote: String,
        #[arg(long)]
        revision: Option<String>,
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        remote_branch: Option<String>,
        #[arg(long)]
        gerrit_host: Option<String>,
    },

    /// Run a shell command in every project, in parallel.
    Runp {
        /// The command line to run (joined and passed to `sh -c`).
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    /// Search every project with git grep.
    Grep {
        pattern: String,
    },

    /// Fetch a Gerrit change into a project.
    Patch {
        /// Change number (`12345`, `12345/6`) or a full ref.
        change: String,
        /// Project to patch.
        #[arg(short, long)]
        project: String,
        /// Rebase the change onto the configured remote branch.
        #[arg(long)]
        rebase: bool,
        /// Cherry-pick onto the current head instead of checking out.
        #[arg(long)]
        cherry_pick: bool,
        /// Detach instead of creating a change/<cl>/<ps> branch.
        #[arg(long)]
        no_branch: bool,
        /// Replace an existing change branch.
        #[arg(long)]
        force: bool,
        /// Rebase onto this branch instead of the project's default.
        #[arg(long)]
        remote_branch: Option<String>,
    },
}
