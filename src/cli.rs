use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "workflow-worker")]
#[command(about = "Remote worker node for the workflow API", long_about = None)]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// `run` when no subcommand was given.
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Poll the workflow API and process tasks until interrupted
    Run,
    /// Register this server with the workflow API and store the issued key
    Register(RegisterArgs),
}

#[derive(clap::Args, Debug, Clone, PartialEq)]
pub struct RegisterArgs {
    /// Env file that receives the SERVER_KEY entry
    #[arg(long, default_value = ".env")]
    pub env_file: PathBuf,
}
