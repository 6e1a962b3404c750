//! Channel naming convention shared by every component on the bus.

/// Shared channel carrying every agent's [`StatusUpdate`](super::StatusUpdate)
pub const STATUS_CHANNEL: &str = "agent_status_update";

/// Shared channel for periodic liveness signals
pub const HEARTBEAT_CHANNEL: &str = "agent_heartbeat";

/// Shared channel for phase lifecycle events emitted by the orchestrator
pub const PHASE_CHANNEL: &str = "phase_transition";

/// Shared channel for out-of-band operator commands
pub const COMMAND_CHANNEL: &str = "coordination_command";

/// Shared channels in the order they are announced at startup
pub const COORDINATION_CHANNELS: [&str; 4] = [
    STATUS_CHANNEL,
    HEARTBEAT_CHANNEL,
    PHASE_CHANNEL,
    COMMAND_CHANNEL,
];

/// Per-agent task channel: `agent_<name>`
pub fn agent_channel(agent: &str) -> String {
    format!("agent_{agent}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_channel_naming() {
        assert_eq!(agent_channel("leaflet"), "agent_leaflet");
        assert!(!COORDINATION_CHANNELS.contains(&agent_channel("main").as_str()));
    }
}
