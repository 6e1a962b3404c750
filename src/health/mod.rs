// Health Monitor - liveness inferred from status traffic
//
// Any StatusUpdate counts as a heartbeat. Unhealthy agents are reported,
// never restarted or evicted.

pub mod service;

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashMap};

use crate::agents::AgentStatus;
use crate::bus::StatusUpdate;
use crate::coordination::CoordinationState;

pub use service::{HealthReport, HealthService};

/// Default silence after which an agent is unhealthy
pub const DEFAULT_THRESHOLD_SECS: i64 = 120;

pub fn default_threshold() -> Duration {
    Duration::seconds(DEFAULT_THRESHOLD_SECS)
}

#[derive(Debug, Clone, Default)]
pub struct HealthMonitor {
    last_seen: HashMap<String, DateTime<Utc>>,
    statuses: HashMap<String, AgentStatus>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from the persisted `last_seen` timestamps
    pub fn from_state(state: &CoordinationState) -> Self {
        let mut monitor = Self::new();
        for (name, record) in &state.agents {
            monitor.statuses.insert(name.clone(), record.status);
            if let Some(seen) = record.last_seen {
                monitor.record_heartbeat(name, seen);
            }
        }
        monitor
    }

    /// Note that `agent` was alive at `at`. Older timestamps never move the
    /// last heartbeat back.
    pub fn record_heartbeat(&mut self, agent: &str, at: DateTime<Utc>) {
        let seen = self.last_seen.entry(agent.to_string()).or_insert(at);
        if at > *seen {
            *seen = at;
        }
    }

    pub fn record_status(&mut self, update: &StatusUpdate) {
        self.record_heartbeat(&update.agent, update.timestamp);
        self.statuses.insert(update.agent.clone(), update.status);
    }

    pub fn last_seen(&self, agent: &str) -> Option<DateTime<Utc>> {
        self.last_seen.get(agent).copied()
    }

    /// Agents whose last heartbeat is more than `threshold` before `now`
    pub fn unhealthy_agents(&self, now: DateTime<Utc>, threshold: Duration) -> BTreeSet<String> {
        self.last_seen
            .iter()
            .filter(|(_, last)| now - **last > threshold)
            .map(|(agent, _)| agent.clone())
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.statuses.values().filter(|status| status.is_active()).count()
    }

    pub fn tracked_count(&self) -> usize {
        self.statuses.len().max(self.last_seen.len())
    }
}
