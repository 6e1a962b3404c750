use anyhow::Result;
use std::path::PathBuf;

use super::Command;
use crate::config::LabConfig;

/// Print or write the effective configuration
pub struct ConfigCommand {
    config: LabConfig,
    write: Option<PathBuf>,
}

impl ConfigCommand {
    pub fn new(config: LabConfig) -> Self {
        Self { config, write: None }
    }

    pub fn with_write(mut self, path: Option<PathBuf>) -> Self {
        self.write = path;
        self
    }
}

impl Command for ConfigCommand {
    async fn execute(&self) -> Result<()> {
        match &self.write {
            Some(path) => {
                self.config.save_to_file(path)?;
                println!("✅ Configuration written to {}", path.display());
            }
            None => print!("{}", self.config.to_toml()?),
        }
        Ok(())
    }
}
