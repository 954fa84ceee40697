pub mod args;
pub mod calls;

pub use args::{CallsCliArgs, Cli, CliCommand};
pub use calls::handle_calls_command;
