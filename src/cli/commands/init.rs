use anyhow::Result;

use super::Command;
use crate::config::LabConfig;
use crate::coordination::FileStateStore;

/// Seed the coordination file for the configured roster
pub struct InitCommand {
    config: LabConfig,
    force: bool,
}

impl InitCommand {
    pub fn new(config: LabConfig) -> Self {
        Self { config, force: false }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

impl Command for InitCommand {
    async fn execute(&self) -> Result<()> {
        let store = FileStateStore::from_config(&self.config);

        if store.initialize(self.force).await? {
            println!("✅ Coordination file initialised: {}", store.path().display());
            println!(
                "   {} agents, {} phases",
                self.config.agents.len(),
                self.config.phases.len()
            );
        } else {
            println!("📝 Coordination file exists: {}", store.path().display());
            println!("   Use --force to replace it");
        }
        Ok(())
    }
}
