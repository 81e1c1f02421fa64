mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Command, ConfigCommand, ModelsCommand};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        dikta_core::verbose::set_verbose(true);
    }

    match cli.command {
        Command::Run(args) => commands::run::execute(args).await,
        Command::Models { command } => match command {
            ModelsCommand::List => commands::models::list(),
            ModelsCommand::Download { model_id } => commands::models::download(&model_id).await,
            ModelsCommand::Delete { model_id } => commands::models::delete(&model_id),
        },
        Command::Config { command } => match command {
            ConfigCommand::Show => commands::config_cmd::show(),
            ConfigCommand::Set(args) => commands::config_cmd::set(args),
        },
    }
}
