use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::agents::{AgentIdentity, AgentStatus};
use crate::bus::StatusUpdate;
use crate::config::{LabConfig, ProjectConfig, StateConfig};
use crate::orchestrator::PhaseEvent;

/// `active_phase` once every phase is done
pub const COMPLETED_PHASE: &str = "completed";

/// Durable coordination snapshot mirrored to the coordination file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationState {
    pub agents: BTreeMap<String, AgentRecord>,
    pub coordination: CoordinationSummary,
    #[serde(default)]
    pub phases: BTreeMap<String, PhaseRecord>,
    #[serde(default)]
    pub project: ProjectConfig,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    pub status: AgentStatus,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    /// Newest last
    #[serde(default)]
    pub tasks: Vec<TaskEntry>,
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEntry {
    pub task: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Initialized,
    Running,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationSummary {
    pub active_phase: String,
    pub total_agents: usize,
    /// Always derived from agent statuses, see [`CoordinationState::recount`]
    pub active_agents: usize,
    pub status: SessionStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Pending,
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub index: usize,
    pub status: PhaseStatus,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub estimated_time: String,
    #[serde(default)]
    pub required_agents: Vec<String>,
}

/// Caps on the per-agent history lists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimits {
    pub max_recent_tasks: usize,
    pub max_errors: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self::from(&StateConfig::default())
    }
}

impl From<&StateConfig> for HistoryLimits {
    fn from(config: &StateConfig) -> Self {
        Self {
            max_recent_tasks: config.max_recent_tasks,
            max_errors: config.max_errors,
        }
    }
}

impl AgentRecord {
    /// Configured agent that has not reported yet
    pub fn offline(identity: &AgentIdentity) -> Self {
        Self {
            role: identity.role.clone(),
            capabilities: identity.capabilities.clone(),
            dependencies: identity.dependencies.clone(),
            status: AgentStatus::Offline,
            last_seen: None,
            tasks: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Agent first seen through a status update
    fn discovered(status: AgentStatus) -> Self {
        Self {
            role: String::new(),
            capabilities: BTreeSet::new(),
            dependencies: BTreeSet::new(),
            status,
            last_seen: None,
            tasks: Vec::new(),
            errors: Vec::new(),
        }
    }
}

fn push_capped<T>(list: &mut Vec<T>, item: T, cap: usize) {
    list.push(item);
    if list.len() > cap {
        let excess = list.len() - cap;
        list.drain(..excess);
    }
}

impl CoordinationState {
    /// First-run state: every configured agent offline, nothing active
    pub fn from_config(config: &LabConfig, now: DateTime<Utc>) -> Self {
        let agents: BTreeMap<String, AgentRecord> = config
            .identities()
            .iter()
            .map(|identity| (identity.name.clone(), AgentRecord::offline(identity)))
            .collect();

        let phases = config
            .phases
            .iter()
            .enumerate()
            .map(|(index, phase)| {
                (
                    phase.name.clone(),
                    PhaseRecord {
                        index,
                        status: PhaseStatus::Pending,
                        description: phase.description.clone(),
                        estimated_time: phase.estimated_time.clone(),
                        required_agents: phase.required_agents.clone(),
                    },
                )
            })
            .collect();

        let mut state = Self {
            coordination: CoordinationSummary {
                active_phase: config
                    .phases
                    .first()
                    .map(|phase| phase.name.clone())
                    .unwrap_or_else(|| COMPLETED_PHASE.to_string()),
                total_agents: agents.len(),
                active_agents: 0,
                status: SessionStatus::Initialized,
                started_at: None,
                last_update: None,
            },
            agents,
            phases,
            project: config.project.clone(),
            created_at: now,
        };
        state.recount();
        state
    }

    /// Number of agents whose status counts as active
    pub fn count_active(&self) -> usize {
        self.agents
            .values()
            .filter(|agent| agent.status.is_active())
            .count()
    }

    /// Recompute the derived counters from the agent map
    pub fn recount(&mut self) {
        self.coordination.active_agents = self.count_active();
        self.coordination.total_agents = self.agents.len();
    }

    /// Fold one status update into the snapshot
    pub fn apply_status(&mut self, update: &StatusUpdate, limits: HistoryLimits) {
        let record = self
            .agents
            .entry(update.agent.clone())
            .or_insert_with(|| AgentRecord::discovered(update.status));

        record.status = update.status;
        record.last_seen = Some(update.timestamp);

        if let Some(task) = &update.task {
            push_capped(
                &mut record.tasks,
                TaskEntry {
                    task: task.clone(),
                    timestamp: update.timestamp,
                },
                limits.max_recent_tasks,
            );
        }

        if update.status == AgentStatus::Error {
            push_capped(
                &mut record.errors,
                ErrorEntry {
                    message: update.task.clone().unwrap_or_else(|| "error".to_string()),
                    timestamp: update.timestamp,
                },
                limits.max_errors,
            );
        }

        self.coordination.last_update = Some(update.timestamp);
        self.recount();
    }

    /// Fold one phase transition event into the snapshot
    pub fn apply_phase_event(&mut self, event: &PhaseEvent) {
        match event {
            PhaseEvent::PhaseStarted {
                phase,
                index,
                timestamp,
                ..
            } => {
                for record in self.phases.values_mut() {
                    record.status = match record.index.cmp(index) {
                        std::cmp::Ordering::Less => PhaseStatus::Completed,
                        std::cmp::Ordering::Equal => PhaseStatus::Active,
                        std::cmp::Ordering::Greater => PhaseStatus::Pending,
                    };
                }
                if let Some(record) = self.phases.get_mut(phase) {
                    record.status = PhaseStatus::Active;
                }

                self.coordination.active_phase = phase.clone();
                self.coordination.status = SessionStatus::Running;
                if *index == 0 || self.coordination.started_at.is_none() {
                    self.coordination.started_at = Some(*timestamp);
                }
                self.coordination.last_update = Some(*timestamp);
            }
            PhaseEvent::AllPhasesComplete { timestamp, .. } => {
                for record in self.phases.values_mut() {
                    record.status = PhaseStatus::Completed;
                }
                self.coordination.active_phase = COMPLETED_PHASE.to_string();
                self.coordination.status = SessionStatus::Completed;
                self.coordination.last_update = Some(*timestamp);
            }
            PhaseEvent::PhaseReady { .. } => {}
        }
    }

    /// The active phase and its required agents, once each of them reports
    /// `ready` or `active`. Phases without required agents never qualify.
    pub fn ready_phase(&self) -> Option<(String, Vec<String>)> {
        let phase = self.phases.get(&self.coordination.active_phase)?;
        if phase.required_agents.is_empty() {
            return None;
        }
        let all_ready = phase.required_agents.iter().all(|name| {
            self.agents
                .get(name)
                .is_some_and(|agent| matches!(agent.status, AgentStatus::Ready | AgentStatus::Active))
        });
        all_ready.then(|| (self.coordination.active_phase.clone(), phase.required_agents.clone()))
    }

    /// Names of agents whose status counts as active
    pub fn active_agents(&self) -> BTreeSet<String> {
        self.agents
            .iter()
            .filter(|(_, agent)| agent.status.is_active())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Phase names in sequence order
    pub fn ordered_phases(&self) -> Vec<(&String, &PhaseRecord)> {
        let mut phases: Vec<_> = self.phases.iter().collect();
        phases.sort_by_key(|(_, record)| record.index);
        phases
    }
}
