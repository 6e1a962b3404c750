use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::bus::Payload;

/// A task message published when a phase is entered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTask {
    pub to: String,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub payload: Payload,
}

impl PhaseTask {
    pub fn new(to: &str, message_type: &str, payload: Payload) -> Self {
        Self {
            to: to.to_string(),
            message_type: message_type.to_string(),
            payload,
        }
    }
}

/// One stage of the workflow. Loaded at startup and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseDescriptor {
    pub name: String,
    pub ordinal: usize,
    pub description: String,
    pub estimated_time: String,
    pub required_agents: BTreeSet<String>,
    /// Exact `{agent}_{phase}` keys that must all be present to leave the phase
    pub required_response_keys: BTreeSet<String>,
    /// Entry action
    pub tasks: Vec<PhaseTask>,
}

impl PhaseDescriptor {
    pub fn new<I, S>(name: &str, ordinal: usize, required_response_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            ordinal,
            description: String::new(),
            estimated_time: String::new(),
            required_agents: BTreeSet::new(),
            required_response_keys: required_response_keys.into_iter().map(Into::into).collect(),
            tasks: Vec::new(),
        }
    }

    pub fn with_task(mut self, task: PhaseTask) -> Self {
        self.tasks.push(task);
        self
    }

    /// Whether a completion stored under `key` counts toward this phase
    pub fn requires(&self, key: &str) -> bool {
        self.required_response_keys.contains(key)
    }
}
