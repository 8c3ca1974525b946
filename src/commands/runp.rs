use grove::error::Result;
use grove::runp;
use grove::scanner::{self, ScanMode};
use grove::workspace::Workspace;

use super::update::{finish, register_interrupt};

/// Run a shell command in every project, in parallel.
pub fn run_runp(ws: &Workspace, command: Vec<String>) -> Result<()> {
    register_interrupt(ws);
    let locals = scanner::scan_workspace(ws, ScanMode::Fast)?;
    let command = command.join(" ");

    for outcome in runp::run_each(ws, &locals, &command)? {
        let marker = if outcome.success { "" } else { " (failed)" };
        println!("--- {}{marker}", outcome.key);
        print!("{}", outcome.output);
    }
    finish(ws)
}
