// Core agent types: identity and reported status

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Static description of an agent. Immutable after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Agents that must be active before this one is useful
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
}

impl AgentIdentity {
    pub fn new(name: &str, role: &str) -> Self {
        Self {
            name: name.to_string(),
            role: role.to_string(),
            capabilities: BTreeSet::new(),
            dependencies: BTreeSet::new(),
        }
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// True when every dependency appears in `active_agents`
    pub fn dependencies_satisfied(&self, active_agents: &BTreeSet<String>) -> bool {
        self.dependencies.is_subset(active_agents)
    }

    /// Dependencies not present in `active_agents`
    pub fn missing_dependencies(&self, active_agents: &BTreeSet<String>) -> Vec<String> {
        self.dependencies
            .difference(active_agents)
            .cloned()
            .collect()
    }
}

/// Status an agent reports on the shared status channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Starting,
    Ready,
    Active,
    Working,
    Error,
    Stopping,
    Offline,
}

impl AgentStatus {
    /// Statuses counted toward the active agent total
    pub fn is_active(self) -> bool {
        matches!(
            self,
            AgentStatus::Ready | AgentStatus::Active | AgentStatus::Working
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Starting => "starting",
            AgentStatus::Ready => "ready",
            AgentStatus::Active => "active",
            AgentStatus::Working => "working",
            AgentStatus::Error => "error",
            AgentStatus::Stopping => "stopping",
            AgentStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "starting" => Ok(AgentStatus::Starting),
            "ready" => Ok(AgentStatus::Ready),
            "active" => Ok(AgentStatus::Active),
            "working" => Ok(AgentStatus::Working),
            "error" => Ok(AgentStatus::Error),
            "stopping" => Ok(AgentStatus::Stopping),
            "offline" => Ok(AgentStatus::Offline),
            other => Err(format!("unknown agent status '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependencies_satisfied() {
        let leaflet = AgentIdentity::new("leaflet", "Map Integration Specialist")
            .with_dependencies(["main", "ui"]);

        let mut active: BTreeSet<String> = ["main".to_string()].into();
        assert!(!leaflet.dependencies_satisfied(&active));
        assert_eq!(leaflet.missing_dependencies(&active), vec!["ui".to_string()]);

        active.insert("ui".to_string());
        assert!(leaflet.dependencies_satisfied(&active));
    }

    #[test]
    fn test_active_statuses() {
        assert!(AgentStatus::Ready.is_active());
        assert!(AgentStatus::Working.is_active());
        assert!(!AgentStatus::Starting.is_active());
        assert!(!AgentStatus::Error.is_active());
        assert!(!AgentStatus::Offline.is_active());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [AgentStatus::Starting, AgentStatus::Stopping, AgentStatus::Offline] {
            assert_eq!(status.as_str().parse::<AgentStatus>().unwrap(), status);
        }
        assert!("sleeping".parse::<AgentStatus>().is_err());
    }
}
