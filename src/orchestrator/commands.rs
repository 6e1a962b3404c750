// Operator console commands and out-of-band coordination commands

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use tracing::{info, warn};

use crate::agents::AgentLink;
use crate::bus::{Payload, COMMAND_CHANNEL};

/// Message type used to deliver a coordination command to one agent
pub const COORDINATION_COMMAND: &str = "coordination_command";

/// A line typed at the operator console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    Start,
    Status,
    Advance,
    Help,
    Quit,
}

impl FromStr for OperatorCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(OperatorCommand::Start),
            "status" => Ok(OperatorCommand::Status),
            "next" | "advance" => Ok(OperatorCommand::Advance),
            "help" => Ok(OperatorCommand::Help),
            "quit" | "exit" => Ok(OperatorCommand::Quit),
            other => Err(format!("unknown command '{other}'")),
        }
    }
}

impl OperatorCommand {
    pub const HELP: &'static str = "\
  start  - Start the phase sequence
  status - Check all agent status
  next   - Proceed to next phase (also: advance)
  help   - Show this help
  quit   - Exit (also: exit)";
}

/// Broadcast envelope on the `coordination_command` channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationCommand {
    pub command: String,
    pub targets: Vec<String>,
    #[serde(default)]
    pub payload: Payload,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
}

impl CoordinationCommand {
    pub fn new(sender: &str, command: &str, targets: &[String], payload: Payload) -> Self {
        Self {
            command: command.to_string(),
            targets: targets.to_vec(),
            payload,
            sender: sender.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Task payload delivered to each target: `{command, ...payload}`
    pub fn task_payload(&self) -> Payload {
        let mut task = self.payload.clone();
        task.insert("command".to_string(), Value::String(self.command.clone()));
        task
    }
}

/// Broadcast `command` and deliver it to every target's task channel
pub fn send_coordination_command(link: &AgentLink, command: &str, targets: &[String], payload: Payload) {
    let envelope = CoordinationCommand::new(link.agent(), command, targets, payload);

    match serde_json::to_string(&envelope) {
        Ok(encoded) => {
            if let Err(e) = link.bus().publish(COMMAND_CHANNEL, encoded) {
                warn!(command = %command, error = %e, "Coordination command broadcast failed");
            }
        }
        Err(e) => warn!(command = %command, error = %e, "Coordination command encoding failed"),
    }

    let task = envelope.task_payload();
    for target in targets {
        link.send(target, COORDINATION_COMMAND, task.clone());
    }

    info!(command = %command, targets = ?targets, "Coordination command sent");
}
