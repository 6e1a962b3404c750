// Stock handlers for the bundled worker agents
//
// The real work behind a task (scaffolding, repository setup, ...) is out of
// scope; workers acknowledge each declared task with a completion payload.

use serde_json::{json, Value};
use tracing::info;

use super::identity::AgentIdentity;
use crate::bus::{payload, Payload};

/// Status a worker reports for a completed task type
pub fn completion_status(message_type: &str) -> &'static str {
    if message_type == "initialize" {
        "ready"
    } else {
        "complete"
    }
}

/// Completion payload `{agent, phase, status}` plus the request's own keys
/// under `request`.
pub fn completion_handler(
    agent: &str,
    phase: &str,
    status: &str,
) -> impl Fn(&Payload) -> anyhow::Result<Option<Payload>> + Send + Sync + 'static {
    let agent = agent.to_string();
    let phase = phase.to_string();
    let status = status.to_string();

    move |request: &Payload| {
        let mut reply = payload(json!({
            "agent": agent,
            "phase": phase,
            "status": status,
        }));
        if !request.is_empty() {
            reply.insert("request".to_string(), Value::Object(request.clone()));
        }
        Ok(Some(reply))
    }
}

/// Reply to `status_request` with the worker's identity
pub fn status_handler(
    identity: &AgentIdentity,
) -> impl Fn(&Payload) -> anyhow::Result<Option<Payload>> + Send + Sync + 'static {
    let identity = identity.clone();

    move |_: &Payload| {
        Ok(Some(payload(json!({
            "agent": identity.name,
            "status": "ready",
            "role": identity.role,
            "capabilities": identity.capabilities,
        }))))
    }
}

/// Log a `coordination_command` and produce no reply
pub fn command_logger(
    agent: &str,
) -> impl Fn(&Payload) -> anyhow::Result<Option<Payload>> + Send + Sync + 'static {
    let agent = agent.to_string();

    move |request: &Payload| {
        let command = request.get("command").and_then(Value::as_str).unwrap_or("unknown");
        info!(agent = %agent, command = %command, "Coordination command received");
        Ok(None)
    }
}

/// Log a reply such as `<task>_response` without answering it
pub fn acknowledge(
    agent: &str,
    message_type: &str,
) -> impl Fn(&Payload) -> anyhow::Result<Option<Payload>> + Send + Sync + 'static {
    let agent = agent.to_string();
    let message_type = message_type.to_string();

    move |reply: &Payload| {
        let from = reply.get("agent").and_then(Value::as_str).unwrap_or("unknown");
        let status = reply.get("status").and_then(Value::as_str).unwrap_or("-");
        info!(agent = %agent, from = %from, message_type = %message_type, status = %status, "Reply received");
        Ok(None)
    }
}
