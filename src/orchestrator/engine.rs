// Phase Orchestrator - gated progression over the ordered phase list
//
// Delivery on the bus is at-most-once. A completion that is never delivered
// leaves the orchestrator at the current phase until an operator forces an
// advance; there is deliberately no timeout.

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use super::events::PhaseEvent;
use super::pending::PendingResponses;
use super::phase::PhaseDescriptor;
use crate::agents::AgentLink;
use crate::bus::{payload, Payload, PHASE_CHANNEL};
use crate::telemetry::{create_coordination_span, generate_correlation_id};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("completion payload is missing string field '{0}'")]
    MalformedCompletion(&'static str),
}

/// Where the orchestrator is in the phase list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    NotStarted,
    Phase(usize),
    Complete,
}

/// What a single completion message did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Stored, but the key does not gate the current phase
    Recorded { key: String },
    /// Counted toward the current phase; other keys are still missing
    Waiting { key: String, missing: Vec<String> },
    /// The current phase was satisfied and the orchestrator moved on
    Advanced { key: String, progress: Progress },
}

pub struct PhaseOrchestrator {
    phases: Vec<PhaseDescriptor>,
    workers: Vec<String>,
    progress: Progress,
    pending: PendingResponses,
    link: AgentLink,
}

impl std::fmt::Debug for PhaseOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseOrchestrator")
            .field("agent", &self.link.agent())
            .field("progress", &self.progress)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl PhaseOrchestrator {
    /// `link` is the hosting agent's outbound side; tasks are sent as that agent
    pub fn new(phases: Vec<PhaseDescriptor>, link: AgentLink) -> Self {
        Self {
            phases,
            workers: Vec::new(),
            progress: Progress::NotStarted,
            pending: PendingResponses::new(),
            link,
        }
    }

    /// Agents that receive `status_request` on a status sweep
    pub fn with_workers<I, S>(mut self, workers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.workers = workers.into_iter().map(Into::into).collect();
        self
    }

    pub fn agent(&self) -> &str {
        self.link.agent()
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn phases(&self) -> &[PhaseDescriptor] {
        &self.phases
    }

    pub fn pending(&self) -> &PendingResponses {
        &self.pending
    }

    pub fn current_phase(&self) -> Option<&PhaseDescriptor> {
        match self.progress {
            Progress::Phase(index) => self.phases.get(index),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.progress == Progress::Complete
    }

    /// Reset to the first phase and run its entry action
    pub fn start(&mut self) -> Progress {
        info!(agent = %self.agent(), phases = self.phases.len(), "Starting phase sequence");
        self.pending.clear();
        self.enter(0)
    }

    /// Record a `phase_complete` payload and move on if it completes the
    /// current phase.
    pub fn on_completion(&mut self, completion: &Payload) -> Result<CompletionOutcome, OrchestratorError> {
        let agent = string_field(completion, "agent")?;
        let phase = string_field(completion, "phase")?;

        info!(agent = %agent, phase = %phase, "Phase completion received");
        let key = self.pending.record(agent, phase, completion.clone());

        let Some(current) = self.current_phase() else {
            return Ok(CompletionOutcome::Recorded { key });
        };

        if !current.requires(&key) {
            return Ok(CompletionOutcome::Recorded { key });
        }

        if self.pending.satisfies(&current.required_response_keys) {
            info!(phase = %current.name, "All required completions received");
            let progress = self.transition();
            return Ok(CompletionOutcome::Advanced { key, progress });
        }

        let missing = self
            .pending
            .missing(&current.required_response_keys)
            .into_iter()
            .map(str::to_string)
            .collect();
        Ok(CompletionOutcome::Waiting { key, missing })
    }

    /// Operator override: leave the current phase whether or not its gate is
    /// met. Before the sequence has started this is the same as `start`.
    pub fn advance(&mut self) -> Progress {
        match self.progress {
            Progress::NotStarted => self.start(),
            Progress::Phase(index) => {
                info!(phase = %self.phases[index].name, "Manual advance requested");
                self.transition()
            }
            Progress::Complete => {
                info!("All phases already complete");
                self.progress
            }
        }
    }

    /// Reply body for `status_request` addressed to the orchestrator agent
    pub fn status_payload(&self) -> Payload {
        let (current_phase, phase_number) = match self.progress {
            Progress::NotStarted => (
                self.phases.first().map(|p| p.name.as_str()).unwrap_or("completed"),
                1,
            ),
            Progress::Phase(index) => (self.phases[index].name.as_str(), index + 1),
            Progress::Complete => ("completed", self.phases.len() + 1),
        };

        payload(json!({
            "agent": self.agent(),
            "status": "active",
            "started": self.progress != Progress::NotStarted,
            "current_phase": current_phase,
            "phase_number": phase_number,
            "total_phases": self.phases.len(),
        }))
    }

    /// Ask every worker for its status; replies arrive as
    /// `status_request_response`.
    pub fn request_statuses(&self) {
        for worker in &self.workers {
            self.link.send(worker, "status_request", Payload::new());
        }
    }

    fn transition(&mut self) -> Progress {
        match self.progress {
            Progress::Phase(index) => self.enter(index + 1),
            Progress::NotStarted => self.enter(0),
            Progress::Complete => self.progress,
        }
    }

    fn enter(&mut self, index: usize) -> Progress {
        let total = self.phases.len();
        let Some(phase) = self.phases.get(index) else {
            self.progress = Progress::Complete;
            info!(total, "All phases complete");
            self.publish_event(&PhaseEvent::all_complete(total));
            return self.progress;
        };

        self.progress = Progress::Phase(index);

        let span = create_coordination_span(
            "phase_transition",
            Some(self.link.agent()),
            Some(&phase.name),
            Some(&generate_correlation_id()),
        );
        let _entered = span.enter();

        info!(phase = %phase.name, number = index + 1, total, description = %phase.description, "Phase started");
        self.publish_event(&PhaseEvent::started(&phase.name, index, total));

        for task in &phase.tasks {
            self.link.send(&task.to, &task.message_type, task.payload.clone());
        }

        self.progress
    }

    fn publish_event(&self, event: &PhaseEvent) {
        let encoded = match event.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "Phase event encoding failed");
                return;
            }
        };

        if let Err(e) = self.link.bus().publish(PHASE_CHANNEL, encoded) {
            warn!(error = %e, "Phase event publish failed");
        }
    }
}

fn string_field<'a>(completion: &'a Payload, field: &'static str) -> Result<&'a str, OrchestratorError> {
    completion
        .get(field)
        .and_then(Value::as_str)
        .ok_or(OrchestratorError::MalformedCompletion(field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Message, MessageBus, Subscription};
    use crate::orchestrator::PhaseTask;

    fn phases() -> Vec<PhaseDescriptor> {
        vec![
            PhaseDescriptor::new("init", 0, ["ui_init", "github_init"])
                .with_task(PhaseTask::new("ui", "initialize", Payload::new()))
                .with_task(PhaseTask::new("github", "initialize", Payload::new())),
            PhaseDescriptor::new("github_setup", 1, ["github_repository_setup"])
                .with_task(PhaseTask::new("github", "setup_repository", Payload::new())),
        ]
    }

    fn completion(agent: &str, phase: &str) -> Payload {
        payload(json!({"agent": agent, "phase": phase, "status": "complete"}))
    }

    fn drain(sub: &mut Subscription) -> Vec<String> {
        std::iter::from_fn(|| sub.try_recv()).collect()
    }

    #[test]
    fn test_start_sends_entry_tasks() {
        let bus = MessageBus::default();
        let mut github = bus.subscribe("agent_github").unwrap();
        let mut orchestrator = PhaseOrchestrator::new(phases(), AgentLink::new("main", bus.clone()));

        assert_eq!(orchestrator.start(), Progress::Phase(0));

        let received = drain(&mut github);
        assert_eq!(received.len(), 1);
        assert_eq!(Message::decode(&received[0]).unwrap().message_type, "initialize");
    }

    #[test]
    fn test_gate_waits_for_every_key() {
        let bus = MessageBus::default();
        let mut orchestrator = PhaseOrchestrator::new(phases(), AgentLink::new("main", bus));
        orchestrator.start();

        let outcome = orchestrator.on_completion(&completion("ui", "init")).unwrap();
        assert_eq!(
            outcome,
            CompletionOutcome::Waiting {
                key: "ui_init".to_string(),
                missing: vec!["github_init".to_string()],
            }
        );

        let outcome = orchestrator.on_completion(&completion("github", "init")).unwrap();
        assert!(matches!(outcome, CompletionOutcome::Advanced { progress: Progress::Phase(1), .. }));
    }

    #[test]
    fn test_future_phase_completion_does_not_advance() {
        let bus = MessageBus::default();
        let mut orchestrator = PhaseOrchestrator::new(phases(), AgentLink::new("main", bus));
        orchestrator.start();

        let outcome = orchestrator.on_completion(&completion("github", "repository_setup")).unwrap();
        assert!(matches!(outcome, CompletionOutcome::Recorded { .. }));
        assert_eq!(orchestrator.progress(), Progress::Phase(0));
        assert!(orchestrator.pending().contains("github_repository_setup"));
    }

    #[test]
    fn test_completion_before_start_is_only_recorded() {
        let bus = MessageBus::default();
        let mut orchestrator = PhaseOrchestrator::new(phases(), AgentLink::new("main", bus));

        let outcome = orchestrator.on_completion(&completion("ui", "init")).unwrap();
        assert!(matches!(outcome, CompletionOutcome::Recorded { .. }));
        assert_eq!(orchestrator.progress(), Progress::NotStarted);
    }

    #[test]
    fn test_malformed_completion_is_rejected() {
        let bus = MessageBus::default();
        let mut orchestrator = PhaseOrchestrator::new(phases(), AgentLink::new("main", bus));
        orchestrator.start();

        let result = orchestrator.on_completion(&payload(json!({"agent": "ui"})));
        assert_eq!(result, Err(OrchestratorError::MalformedCompletion("phase")));
        assert!(orchestrator.pending().is_empty());
    }

    #[test]
    fn test_advance_past_last_phase_completes_once() {
        let bus = MessageBus::default();
        let mut events = bus.subscribe(PHASE_CHANNEL).unwrap();
        let mut orchestrator = PhaseOrchestrator::new(phases(), AgentLink::new("main", bus.clone()));

        assert_eq!(orchestrator.advance(), Progress::Phase(0));
        assert_eq!(orchestrator.advance(), Progress::Phase(1));
        assert_eq!(orchestrator.advance(), Progress::Complete);
        assert_eq!(orchestrator.advance(), Progress::Complete);

        let events: Vec<PhaseEvent> = drain(&mut events)
            .iter()
            .map(|raw| PhaseEvent::decode(raw).unwrap())
            .collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[2], PhaseEvent::AllPhasesComplete { total: 2, .. }));
        assert_eq!(orchestrator.status_payload()["current_phase"], "completed");
    }

    #[test]
    fn test_status_payload_reports_position() {
        let bus = MessageBus::default();
        let mut orchestrator = PhaseOrchestrator::new(phases(), AgentLink::new("main", bus));
        orchestrator.start();
        orchestrator.advance();

        let status = orchestrator.status_payload();
        assert_eq!(status["agent"], "main");
        assert_eq!(status["current_phase"], "github_setup");
        assert_eq!(status["phase_number"], 2);
        assert_eq!(status["total_phases"], 2);
    }
}
