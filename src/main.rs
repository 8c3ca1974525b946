use std::process;
use std::time::Duration;

use clap::Parser;

mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::{
    BranchArgs, EditArgs, ImportArgs, OverrideArgs, PatchArgs, ResolveArgs, UpdateArgs,
};
use grove::error::Result;
use grove::plan::RebaseFlags;

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default()
            .default_filter_or(if cli.verbose { "debug" } else { "info" }),
    )
    .format_timestamp(None)
    .init();

    if let Some(dir) = &cli.directory
        && let Err(e) = std::env::set_current_dir(dir)
    {
        eprintln!("ERROR: cannot enter {}: {e}", dir.display());
        process::exit(1);
    }

    if let Err(e) = run(cli) {
        eprintln!("ERROR: {e}");
        process::exit(e.exit_code());
    }
}

fn minutes(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

fn run(cli: Cli) -> Result<()> {
    // init creates the workspace; everything else opens an existing one.
    let command = match cli.command {
        Commands::Init { directory } => return commands::run_init(directory),
        command => command,
    };

    let ws = commands::open_workspace(cli.jobs, cli.attempts)?;
    match command {
        Commands::Init { .. } => unreachable!("handled above"),
        Commands::Import {
            name,
            manifest,
            remote,
            revision,
            remote_branch,
            root,
        } => commands::run_import(
            &ws,
            ImportArgs {
                name,
                manifest,
                remote,
                revision,
                remote_branch,
                root,
            },
        ),
        Commands::Update {
            gc,
            local_manifest,
            rebase_tracked,
            rebase_untracked,
            rebase_all,
            no_hooks,
            no_packages,
            hook_timeout,
            fetch_packages_timeout,
            snapshot,
        } => commands::run_update(
            &ws,
            UpdateArgs {
                gc,
                local_manifest,
                rebase: RebaseFlags {
                    tracked: rebase_tracked,
                    untracked: rebase_untracked,
                    all: rebase_all,
                },
                no_hooks,
                no_packages,
                hook_timeout: minutes(hook_timeout),
                fetch_packages_timeout: minutes(fetch_packages_timeout),
                snapshot,
            },
        ),
        Commands::Resolve {
            output,
            allow_floating_refs,
            full,
        } => commands::run_resolve(
            &ws,
            ResolveArgs {
                output,
                allow_floating_refs,
                full,
            },
        ),
        Commands::Edit {
            manifest,
            projects,
            imports,
            packages,
        } => commands::run_edit(
            &ws,
            EditArgs {
                manifest,
                projects,
                imports,
                packages,
            },
        ),
        Commands::RunHooks {
            hook_timeout,
            attempts,
            local_manifest,
        } => commands::run_hooks_command(&ws, minutes(hook_timeout), attempts, local_manifest),
        Commands::FetchPackages {
            fetch_packages_timeout,
            attempts,
            local_manifest,
        } => commands::run_fetch_packages(
            &ws,
            minutes(fetch_packages_timeout),
            attempts,
            local_manifest,
        ),
        Commands::Snapshot { path } => commands::run_snapshot(&ws, path),
        Commands::Diff { from, to } => commands::run_diff(&ws, from, to),
        Commands::GenerateGitmodules { output } => {
            commands::run_generate_gitmodules(&ws, output)
        }
        Commands::Override {
            name,
            remote,
            revision,
            path,
            remote_branch,
            gerrit_host,
        } => commands::run_override(
            &ws,
            OverrideArgs {
                name,
                remote,
                revision,
                path,
                remote_branch,
                gerrit_host,
            },
        ),
        Commands::Runp { command } => commands::run_runp(&ws, command),
        Commands::Grep { pattern } => commands::run_grep(&ws, pattern),
        Commands::Manifest => commands::run_manifest(&ws),
        Commands::Status => commands::run_status(&ws),
        Commands::CheckClean => commands::run_check_clean(&ws),
        Commands::Branch {
            name,
            delete,
            force_delete,
            delete_merged,
            override_local_config,
        } => commands::run_branch(
            &ws,
            BranchArgs {
                name,
                delete,
                force_delete,
                delete_merged,
                override_local_config,
            },
        ),
        Commands::Patch {
            change,
            project,
            rebase,
            cherry_pick,
            no_branch,
            force,
            remote_branch,
        } => commands::run_patch(
            &ws,
            PatchArgs {
                change,
                project,
                rebase,
                cherry_pick,
                no_branch,
                force,
                remote_branch,
            },
        ),
    }
}
