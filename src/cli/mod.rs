use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(name = "agent-lab")]
#[command(about = "Phase-gated coordination of autonomous agents over a publish/subscribe bus")]
#[command(long_about = "agent-lab runs a fixed roster of agents on an in-process message bus and drives \
                       them through an ordered list of phases, mirroring live state to a JSON coordination \
                       file. Get started with 'agent-lab run' and type 'start'.")]
pub struct Cli {
    /// Configuration file (defaults to agent-lab.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run every configured agent, the phase orchestrator and the monitors in one process
    Run {
        /// Begin the first phase immediately
        #[arg(long, help = "Start phase 1 as soon as all agents are listening")]
        auto_start: bool,
        /// Speak JSON-RPC on stdin/stdout instead of the operator console
        #[arg(long, help = "Serve the protocol gateway on stdio instead of the interactive console")]
        gateway: bool,
    },
    /// Serve the protocol gateway on stdin/stdout without starting any agents
    Gateway,
    /// Show agents, phases and health from the coordination file
    Status,
    /// Create the coordination file for the configured agents and phases
    Init {
        /// Overwrite an existing coordination file
        #[arg(long, help = "Replace an existing coordination file with a fresh one")]
        force: bool,
    },
    /// Print the effective configuration as TOML
    Config {
        /// Write the configuration to this file instead of printing it
        #[arg(long, value_name = "PATH")]
        write: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::parse_from(["agent-lab", "--config", "lab.toml", "run", "--auto-start"]);
        assert_eq!(cli.config, Some(PathBuf::from("lab.toml")));
        assert!(matches!(cli.command, Commands::Run { auto_start: true, gateway: false }));
    }
}
