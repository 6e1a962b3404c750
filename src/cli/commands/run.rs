use anyhow::Result;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::Command;
use crate::config::LabConfig;
use crate::coordination::OrchestratorLock;
use crate::gateway::{ProtocolGateway, SessionEnd};
use crate::lab::{Lab, LabHandle};
use crate::orchestrator::{OperatorCommand, Progress};
use crate::shutdown::{ShutdownCoordinator, ShutdownListener};

pub struct RunCommand {
    config: LabConfig,
    auto_start: bool,
    gateway: bool,
}

impl RunCommand {
    pub fn new(config: LabConfig) -> Self {
        Self {
            config,
            auto_start: false,
            gateway: false,
        }
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    pub fn with_gateway(mut self, gateway: bool) -> Self {
        self.gateway = gateway;
        self
    }
}

impl Command for RunCommand {
    async fn execute(&self) -> Result<()> {
        let lock = OrchestratorLock::acquire(&self.config.lock_path())?;
        let lab = Lab::new(self.config.clone()).with_lock(lock).launch().await?;

        let interrupt = ShutdownCoordinator::new();
        interrupt.install_signal_handlers();

        if self.auto_start {
            lab.start_phases();
        }

        let interrupted = if self.gateway {
            let session = ProtocolGateway::default()
                .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), interrupt.listener())
                .await?;
            session == SessionEnd::Interrupted
        } else {
            console(&lab, &self.config, interrupt.listener()).await?
        };

        if interrupted {
            lab.interrupt().await;
        } else {
            lab.stop().await;
        }
        Ok(())
    }
}

/// Operator console on stdin. Returns whether it ended by interrupt.
async fn console(lab: &LabHandle, config: &LabConfig, mut interrupt: ShutdownListener) -> Result<bool> {
    let orchestrator = &config.orchestrator.agent;
    println!("🎭 {orchestrator} agent ready with {} agents", lab.agent_names().len());
    println!("🎯 Type 'start' to begin {}", config.project.name);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n🎭 {orchestrator}> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            _ = interrupt.wait() => {
                println!("\n👋 Shutting down...");
                return Ok(true);
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            println!("\n⌨️  Console input closed; press Ctrl-C to stop");
            interrupt.wait().await;
            return Ok(true);
        };

        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<OperatorCommand>() {
            Ok(OperatorCommand::Start) => {
                println!("\n🚀 Starting {}...", config.project.name);
                report_progress(lab.start_phases(), config);
            }
            Ok(OperatorCommand::Status) => {
                println!("\n📊 Checking agent status...");
                let status = lab.status();
                println!("{}", serde_json::to_string_pretty(&status)?);

                let health = lab.health().borrow().clone();
                if !health.unhealthy.is_empty() {
                    println!("⚠️  Unhealthy agents: {:?}", health.unhealthy);
                }
            }
            Ok(OperatorCommand::Advance) => report_progress(lab.advance(), config),
            Ok(OperatorCommand::Help) => {
                println!("\n🎯 Available Commands:");
                println!("{}", OperatorCommand::HELP);
            }
            Ok(OperatorCommand::Quit) => {
                println!("👋 Stopping agents...");
                return Ok(false);
            }
            Err(_) => println!("❓ Unknown command. Type 'help' for available commands."),
        }
    }
}

fn report_progress(progress: Progress, config: &LabConfig) {
    match progress {
        Progress::Phase(index) => {
            if let Some(phase) = config.phases.get(index) {
                println!("📍 Phase {}: {}", index + 1, phase.name);
            }
        }
        Progress::Complete => {
            println!("\n🎉 All phases completed!");
            println!("🚀 {} ready at: {}", config.project.name, config.project.path);
        }
        Progress::NotStarted => println!("⏳ Phase sequence not started"),
    }
}
