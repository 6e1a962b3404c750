// Phase Orchestrator - ordered phases gated on aggregated completions

pub mod commands;
pub mod engine;
pub mod events;
pub mod host;
pub mod pending;
pub mod phase;

pub use commands::{send_coordination_command, CoordinationCommand, OperatorCommand, COORDINATION_COMMAND};
pub use engine::{CompletionOutcome, OrchestratorError, PhaseOrchestrator, Progress};
pub use events::PhaseEvent;
pub use host::{host_orchestrator, SharedOrchestrator};
pub use pending::PendingResponses;
pub use phase::{PhaseDescriptor, PhaseTask};
