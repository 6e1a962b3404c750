use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agents::AgentStatus;

/// Opaque key-value payload carried by every task message
pub type Payload = Map<String, Value>;

/// Addressed task message exchanged between agents.
///
/// Exists only in transit: it is serialized onto the recipient's task
/// channel and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: Payload,
}

impl Message {
    pub fn new(from: &str, to: &str, message_type: &str, payload: Payload) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            message_type: message_type.to_string(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Message type used for the automatic reply to this message
    pub fn response_type(&self) -> String {
        format!("{}_response", self.message_type)
    }
}

/// Broadcast status signal; any update doubles as a heartbeat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub agent: String,
    pub status: AgentStatus,
    pub task: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn new(agent: &str, status: AgentStatus, task: Option<String>) -> Self {
        Self {
            agent: agent.to_string(),
            status,
            task,
            timestamp: Utc::now(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Build a payload from a `json!` object literal. Non-object values yield an
/// empty payload.
pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}
