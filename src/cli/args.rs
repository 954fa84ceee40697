use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "calltrace")]
#[command(about = "Call lifecycle tracking and reconciliation", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Print version information
    Version,
    /// List recent calls from the local store
    Calls(CallsCliArgs),
}

#[derive(ClapArgs, Debug)]
pub struct CallsCliArgs {
    /// Maximum number of calls to show
    #[arg(short, long, default_value = "20")]
    pub limit: usize,
}
