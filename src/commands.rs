// commands.rs - unit-of-work contract run by the PumpScripter
// A command only sees the CommandContext; connecting, readiness and the
// watchdog are handled by the executor around it.

use crate::context::CommandContext;
use crate::error::ScripterError;
use crate::types::CommandResult;
use std::future::Future;
use std::pin::Pin;

pub type CommandFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CommandResult, ScripterError>> + 'a>>;

pub trait Command {
    /// Used for logging and as the active-command marker.
    fn name(&self) -> &str;

    /// Errors are turned into a failed `CommandResult` by the executor. A
    /// result without a pump state gets one attached after the run.
    fn execute<'a>(&'a self, ctx: &'a CommandContext<'a>) -> CommandFuture<'a>;
}

/// Presses nothing; the executor attaches the snapshot of whatever is displayed.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadPumpStateCommand;

impl Command for ReadPumpStateCommand {
    fn name(&self) -> &str {
        "read pump state"
    }

    fn execute<'a>(&'a self, _ctx: &'a CommandContext<'a>) -> CommandFuture<'a> {
        Box::pin(async { Ok(CommandResult::new().success(true).enacted(false)) })
    }
}
