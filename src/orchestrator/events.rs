use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Broadcast on the `phase_transition` channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PhaseEvent {
    PhaseStarted {
        phase: String,
        index: usize,
        total: usize,
        timestamp: DateTime<Utc>,
    },
    /// Terminal: the orchestrator stops advancing after this
    AllPhasesComplete { total: usize, timestamp: DateTime<Utc> },
    /// Every agent the current phase requires is ready or active.
    /// Informational only, no transition follows from it.
    PhaseReady {
        phase: String,
        ready_agents: Vec<String>,
        timestamp: DateTime<Utc>,
    },
}

impl PhaseEvent {
    pub fn started(phase: &str, index: usize, total: usize) -> Self {
        PhaseEvent::PhaseStarted {
            phase: phase.to_string(),
            index,
            total,
            timestamp: Utc::now(),
        }
    }

    pub fn all_complete(total: usize) -> Self {
        PhaseEvent::AllPhasesComplete {
            total,
            timestamp: Utc::now(),
        }
    }

    pub fn ready(phase: &str, ready_agents: Vec<String>) -> Self {
        PhaseEvent::PhaseReady {
            phase: phase.to_string(),
            ready_agents,
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
