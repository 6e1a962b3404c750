// Runs the phase orchestrator inside the orchestrator agent's runtime

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use serde_json::Value;
use tracing::{info, warn};

use super::commands::COORDINATION_COMMAND;
use super::engine::{CompletionOutcome, PhaseOrchestrator};
use super::phase::PhaseDescriptor;
use crate::agents::handlers::acknowledge;
use crate::agents::{AgentRuntime, PHASE_COMPLETE};
use crate::bus::Payload;

/// Orchestrator shared between the hosting agent's handlers and the
/// operator console
pub type SharedOrchestrator = Arc<Mutex<PhaseOrchestrator>>;

pub fn lock(orchestrator: &SharedOrchestrator) -> MutexGuard<'_, PhaseOrchestrator> {
    orchestrator.lock().unwrap_or_else(|e| e.into_inner())
}

/// Build an orchestrator sending as `runtime`'s agent and register its
/// handlers there.
pub fn host_orchestrator(
    runtime: &mut AgentRuntime,
    phases: Vec<PhaseDescriptor>,
    workers: Vec<String>,
) -> SharedOrchestrator {
    let reply_types: BTreeSet<String> = phases
        .iter()
        .flat_map(|phase| phase.tasks.iter())
        .map(|task| format!("{}_response", task.message_type))
        .chain(std::iter::once("status_request_response".to_string()))
        .collect();

    let orchestrator: SharedOrchestrator = Arc::new(Mutex::new(
        PhaseOrchestrator::new(phases, runtime.link()).with_workers(workers),
    ));

    let shared = Arc::clone(&orchestrator);
    runtime.register_handler(PHASE_COMPLETE, move |completion: &Payload| {
        let outcome = lock(&shared)
            .on_completion(completion)
            .context("invalid phase completion")?;
        match outcome {
            CompletionOutcome::Recorded { key } => info!(key = %key, "Completion recorded"),
            CompletionOutcome::Waiting { key, missing } => {
                info!(key = %key, missing = ?missing, "Waiting for remaining completions")
            }
            CompletionOutcome::Advanced { key, progress } => {
                info!(key = %key, progress = ?progress, "Phase gate satisfied")
            }
        }
        Ok(None)
    });

    runtime.register_handler("agent_ready", |notice: &Payload| {
        let agent = notice.get("agent").and_then(Value::as_str).unwrap_or("unknown");
        info!(agent = %agent, "Agent is ready");
        Ok(None)
    });

    let shared = Arc::clone(&orchestrator);
    runtime.register_handler("status_request", move |_: &Payload| {
        Ok(Some(lock(&shared).status_payload()))
    });

    let shared = Arc::clone(&orchestrator);
    runtime.register_handler(COORDINATION_COMMAND, move |request: &Payload| {
        let command = request.get("command").and_then(Value::as_str).unwrap_or("");
        let mut orchestrator = lock(&shared);
        match command {
            "start" => {
                orchestrator.start();
            }
            "advance" | "next" => {
                orchestrator.advance();
            }
            "status" => orchestrator.request_statuses(),
            other => warn!(command = %other, "Unsupported coordination command"),
        }
        Ok(None)
    });

    let agent = runtime.name().to_string();
    for reply_type in reply_types {
        runtime.register_handler(&reply_type, acknowledge(&agent, &reply_type));
    }

    orchestrator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentIdentity;
    use crate::bus::{payload, Message, MessageBus};
    use crate::orchestrator::{PhaseTask, Progress};
    use serde_json::json;

    fn main_runtime(bus: &MessageBus) -> (AgentRuntime, SharedOrchestrator) {
        let mut runtime = AgentRuntime::new(AgentIdentity::new("main", "Master Orchestrator"), bus.clone());
        let phases = vec![PhaseDescriptor::new("init", 0, ["ui_init"])
            .with_task(PhaseTask::new("ui", "initialize", Payload::new()))];
        let orchestrator = host_orchestrator(&mut runtime, phases, vec!["ui".to_string()]);
        (runtime, orchestrator)
    }

    fn to_main(message_type: &str, body: serde_json::Value) -> String {
        Message::new("ui", "main", message_type, payload(body)).encode().unwrap()
    }

    #[test]
    fn test_registers_reply_sinks() {
        let bus = MessageBus::default();
        let (runtime, _) = main_runtime(&bus);

        assert!(runtime.has_handler("initialize_response"));
        assert!(runtime.has_handler("status_request_response"));
        assert!(runtime.has_handler(PHASE_COMPLETE));
    }

    #[test]
    fn test_phase_complete_drives_orchestrator() {
        let bus = MessageBus::default();
        let (runtime, orchestrator) = main_runtime(&bus);
        lock(&orchestrator).start();

        runtime
            .dispatch(&to_main(PHASE_COMPLETE, json!({"agent": "ui", "phase": "init", "status": "ready"})))
            .unwrap();

        assert_eq!(lock(&orchestrator).progress(), Progress::Complete);
    }

    #[test]
    fn test_coordination_command_starts_sequence() {
        let bus = MessageBus::default();
        let (runtime, orchestrator) = main_runtime(&bus);

        runtime
            .dispatch(&to_main(COORDINATION_COMMAND, json!({"command": "start"})))
            .unwrap();

        assert_eq!(lock(&orchestrator).progress(), Progress::Phase(0));
    }

    #[test]
    fn test_status_request_replies_with_position() {
        let bus = MessageBus::default();
        let mut ui_inbox = bus.subscribe("agent_ui").unwrap();
        let (runtime, _) = main_runtime(&bus);

        let dispatched = runtime.dispatch(&to_main("status_request", json!({}))).unwrap();
        assert!(dispatched.replied);

        let reply = Message::decode(&ui_inbox.try_recv().unwrap()).unwrap();
        assert_eq!(reply.message_type, "status_request_response");
        assert_eq!(reply.payload["current_phase"], "init");
    }
}
