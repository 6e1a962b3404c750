use anyhow::Result;
use tokio::io::BufReader;
use tracing::info;

use super::Command;
use crate::gateway::ProtocolGateway;
use crate::shutdown::ShutdownCoordinator;

/// Protocol gateway on stdio with no agents behind it
pub struct GatewayCommand {
    gateway: ProtocolGateway,
}

impl GatewayCommand {
    pub fn new() -> Self {
        Self {
            gateway: ProtocolGateway::default(),
        }
    }
}

impl Default for GatewayCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Command for GatewayCommand {
    async fn execute(&self) -> Result<()> {
        let interrupt = ShutdownCoordinator::new();
        interrupt.install_signal_handlers();

        let end = self
            .gateway
            .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), interrupt.listener())
            .await?;

        info!(end = ?end, "Protocol gateway session ended");
        Ok(())
    }
}
