use grove::branch_ops::{self, DeleteOptions};
use grove::error::{Error, Result};
use grove::scanner::{self, ScanMode};
use grove::workspace::Workspace;

pub struct BranchArgs {
    pub name: Option<String>,
    pub delete: bool,
    pub force_delete: bool,
    pub delete_merged: bool,
    pub override_local_config: bool,
}

pub fn run_branch(ws: &Workspace, args: BranchArgs) -> Result<()> {
    grove::git::ensure_installed()?;
    let locals = scanner::scan_workspace(ws, ScanMode::Fast)?;

    if args.delete_merged {
        let deleted = branch_ops::delete_merged(ws, &locals)?;
        println!("deleted {deleted} merged branch(es)");
        return super::update::finish(ws);
    }

    let Some(name) = args.name else {
        return Err(Error::Usage(
            "branch name required (or pass --delete-merged)".to_string(),
        ));
    };

    if args.delete || args.force_delete {
        let deleted = branch_ops::delete_branch(
            ws,
            &locals,
            &name,
            DeleteOptions {
                force: args.force_delete,
                override_local_config: args.override_local_config,
            },
        )?;
        println!("deleted {name:?} in {deleted} project(s)");
        return super::update::finish(ws);
    }

    let hits = branch_ops::find_branch(&locals, &name)?;
    if hits.is_empty() {
        println!("no project has a branch named {name:?}");
        return Ok(());
    }
    for hit in hits {
        let marker = if hit.branch.is_head { "*" } else { " " };
        println!("{marker} {} ({})", hit.key, hit.path.display());
    }
    Ok(())
}
