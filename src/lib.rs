// Agent Lab Library - Phase-gated multi-agent coordination
// This exposes the core components for testing and integration

pub mod agents;
pub mod bus;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod gateway;
pub mod health;
pub mod lab;
pub mod orchestrator;
pub mod shutdown;
pub mod telemetry;

// Re-export key types for easy access
pub use agents::{AgentIdentity, AgentLink, AgentRuntime, AgentStatus, DispatchError, StopHandle};
pub use bus::{Message, MessageBus, Payload, StatusUpdate, Subscription};
pub use config::LabConfig;
pub use coordination::{CoordinationState, FileStateStore, InMemoryStateStore, StateStore};
pub use gateway::ProtocolGateway;
pub use health::{HealthMonitor, HealthService};
pub use lab::{Lab, LabHandle};
pub use orchestrator::{PhaseDescriptor, PhaseOrchestrator, Progress};
pub use shutdown::{ShutdownCoordinator, ShutdownListener};
pub use telemetry::{create_coordination_span, generate_correlation_id, init_telemetry};
