// Coordination State Store - durable mirror of agent statuses and phases

pub mod lock;
pub mod recorder;
pub mod state;
pub mod store;

pub use lock::OrchestratorLock;
pub use recorder::StatusRecorder;
pub use state::{
    AgentRecord, CoordinationState, CoordinationSummary, ErrorEntry, HistoryLimits, PhaseRecord, PhaseStatus,
    SessionStatus, TaskEntry, COMPLETED_PHASE,
};
pub use store::{modify, FileStateStore, InMemoryStateStore, StateStore, StoreError};

#[cfg(feature = "testing")]
pub use store::MockStateStore;
