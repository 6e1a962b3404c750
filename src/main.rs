use anyhow::Result;
use clap::Parser;

use agent_lab::cli::commands::config::ConfigCommand;
use agent_lab::cli::commands::gateway::GatewayCommand;
use agent_lab::cli::commands::init::InitCommand;
use agent_lab::cli::commands::run::RunCommand;
use agent_lab::cli::commands::status::StatusCommand;
use agent_lab::cli::commands::Command;
use agent_lab::cli::{Cli, Commands};
use agent_lab::config::LabConfig;
use agent_lab::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    LabConfig::load_env_file()?;
    let config = LabConfig::load(cli.config.as_deref())?;

    // Logs go to stderr so the gateway owns stdout
    init_telemetry(&config.observability)?;

    match cli.command {
        Commands::Run { auto_start, gateway } => {
            RunCommand::new(config)
                .with_auto_start(auto_start)
                .with_gateway(gateway)
                .execute()
                .await
        }
        Commands::Gateway => GatewayCommand::new().execute().await,
        Commands::Status => StatusCommand::new(config).execute().await,
        Commands::Init { force } => InitCommand::new(config).with_force(force).execute().await,
        Commands::Config { write } => ConfigCommand::new(config).with_write(write).execute().await,
    }
}
