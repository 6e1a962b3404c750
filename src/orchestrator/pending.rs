use std::collections::{BTreeSet, HashMap};

use crate::bus::Payload;

/// Latest completion payload per `"{agent}_{phase}"` key.
///
/// Last write wins: a repeated completion for the same agent and phase
/// overwrites the stored payload and never grows the map.
#[derive(Debug, Clone, Default)]
pub struct PendingResponses {
    responses: HashMap<String, Payload>,
}

impl PendingResponses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(agent: &str, phase: &str) -> String {
        format!("{agent}_{phase}")
    }

    /// Store `payload` under the agent/phase key and return the key
    pub fn record(&mut self, agent: &str, phase: &str, payload: Payload) -> String {
        let key = Self::key(agent, phase);
        self.responses.insert(key.clone(), payload);
        key
    }

    pub fn get(&self, key: &str) -> Option<&Payload> {
        self.responses.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.responses.contains_key(key)
    }

    /// True iff every required key has a stored completion
    pub fn satisfies(&self, required: &BTreeSet<String>) -> bool {
        required.iter().all(|key| self.responses.contains_key(key))
    }

    /// Required keys still missing, sorted
    pub fn missing<'a>(&self, required: &'a BTreeSet<String>) -> Vec<&'a str> {
        required
            .iter()
            .filter(|key| !self.responses.contains_key(*key))
            .map(String::as_str)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    pub fn clear(&mut self) {
        self.responses.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::payload;
    use serde_json::json;

    #[test]
    fn test_last_write_wins() {
        let mut pending = PendingResponses::new();
        pending.record("ui", "init", payload(json!({"status": "ready"})));
        pending.record("ui", "init", payload(json!({"status": "complete"})));

        assert_eq!(pending.len(), 1);
        assert_eq!(pending.get("ui_init").unwrap()["status"], "complete");
    }

    #[test]
    fn test_satisfied_regardless_of_order() {
        let required: BTreeSet<String> = ["ui_init", "github_init"].iter().map(|k| k.to_string()).collect();
        let mut pending = PendingResponses::new();

        pending.record("github", "init", Payload::new());
        assert!(!pending.satisfies(&required));
        assert_eq!(pending.missing(&required), vec!["ui_init"]);

        pending.record("ui", "init", Payload::new());
        assert!(pending.satisfies(&required));
    }
}
