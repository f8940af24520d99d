//! omnipilot CLI
//!
//! Usage:
//!   omnipilot run "Open Chrome and search google stock price" --max-steps 20
//!   omnipilot parse saved_output.txt
//!   omnipilot decode reply.txt

use crate::cli::{Cli, Commands};
use crate::command::{handle_decode_command, handle_parse_command, handle_run_command};

mod cli;
mod command;
mod utils;

fn main() -> anyhow::Result<()> {
    use clap::Parser;

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => handle_run_command(args),
        Commands::Parse(args) => handle_parse_command(args),
        Commands::Decode(args) => handle_decode_command(args),
    }
}
