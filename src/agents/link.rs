use std::sync::{Arc, Mutex};

use tracing::{debug, error, info};

use super::identity::AgentStatus;
use super::lifecycle::LifecycleTracker;
use crate::bus::{agent_channel, Message, MessageBus, Payload, StatusUpdate, HEARTBEAT_CHANNEL, STATUS_CHANNEL};

/// An agent's outbound side: addressed sends plus the status side channel.
///
/// Every operation is best-effort. Transport and encoding failures are
/// logged and swallowed so a dropped message never halts the caller.
/// Clones share the same lifecycle tracker.
#[derive(Clone)]
pub struct AgentLink {
    agent: String,
    bus: MessageBus,
    lifecycle: Arc<Mutex<LifecycleTracker>>,
}

impl std::fmt::Debug for AgentLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLink")
            .field("agent", &self.agent)
            .field("status", &self.status())
            .finish()
    }
}

impl AgentLink {
    pub fn new(agent: &str, bus: MessageBus) -> Self {
        Self {
            agent: agent.to_string(),
            bus,
            lifecycle: Arc::new(Mutex::new(LifecycleTracker::new(agent))),
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Current lifecycle status as tracked locally
    pub fn status(&self) -> AgentStatus {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner()).current()
    }

    /// Publish a task message on `agent_<to>`, then report `active`
    pub fn send(&self, to: &str, message_type: &str, payload: Payload) {
        let message = Message::new(&self.agent, to, message_type, payload);
        let encoded = match message.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(agent = %self.agent, to = %to, message_type = %message_type, error = %e, "Message encoding failed");
                return;
            }
        };

        match self.bus.publish(&agent_channel(to), encoded) {
            Ok(delivered) => {
                info!(agent = %self.agent, to = %to, message_type = %message_type, delivered, "Message sent");
                self.update_status(AgentStatus::Active, Some(format!("Sent {message_type} to {to}")));
            }
            Err(e) => {
                error!(agent = %self.agent, to = %to, message_type = %message_type, error = %e, "Message send failed");
            }
        }
    }

    /// Feed `status` to the lifecycle and broadcast the status it settles on.
    ///
    /// Nothing is published once the agent is offline.
    pub fn update_status(&self, status: AgentStatus, task: Option<String>) {
        let settled = {
            let mut lifecycle = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
            if lifecycle.is_offline() {
                debug!(agent = %self.agent, ignored = %status, "Agent is offline, status dropped");
                return;
            }
            lifecycle.report(status)
        };

        if settled != status {
            debug!(agent = %self.agent, reported = %status, settled = %settled, "Status report not accepted by lifecycle");
        }
        let update = StatusUpdate::new(&self.agent, settled, task);
        self.publish_status(STATUS_CHANNEL, &update);
    }

    /// Liveness signal carrying the current lifecycle status
    pub fn heartbeat(&self) {
        let update = StatusUpdate::new(&self.agent, self.status(), None);
        self.publish_status(HEARTBEAT_CHANNEL, &update);
    }

    fn publish_status(&self, channel: &str, update: &StatusUpdate) {
        let encoded = match update.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(agent = %self.agent, error = %e, "Status encoding failed");
                return;
            }
        };

        match self.bus.publish(channel, encoded) {
            Ok(_) => debug!(agent = %self.agent, status = %update.status, task = ?update.task, "Status published"),
            Err(e) => error!(agent = %self.agent, status = %update.status, error = %e, "Status update failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::payload;
    use serde_json::json;

    #[tokio::test]
    async fn test_send_publishes_message_then_active_status() {
        let bus = MessageBus::default();
        let mut inbox = bus.subscribe(&agent_channel("ui")).unwrap();
        let link = AgentLink::new("main", bus.clone());
        link.update_status(AgentStatus::Ready, None);
        let mut statuses = bus.subscribe(STATUS_CHANNEL).unwrap();

        link.send("ui", "initialize", payload(json!({"phase": "init"})));

        let message = Message::decode(&inbox.recv().await.unwrap()).unwrap();
        assert_eq!(message.from, "main");
        assert_eq!(message.to, "ui");
        assert_eq!(message.message_type, "initialize");

        let status = StatusUpdate::decode(&statuses.recv().await.unwrap()).unwrap();
        assert_eq!(status.agent, "main");
        assert_eq!(status.status, AgentStatus::Active);
        assert_eq!(status.task.as_deref(), Some("Sent initialize to ui"));
    }

    #[test]
    fn test_send_on_closed_bus_does_not_panic() {
        let bus = MessageBus::default();
        let link = AgentLink::new("main", bus.clone());
        bus.close();

        link.send("ui", "initialize", Payload::new());
        link.update_status(AgentStatus::Ready, None);
        assert_eq!(link.status(), AgentStatus::Ready);
    }

    #[tokio::test]
    async fn test_broadcast_status_matches_lifecycle() {
        let bus = MessageBus::default();
        let mut statuses = bus.subscribe(STATUS_CHANNEL).unwrap();
        let link = AgentLink::new("ui", bus.clone());

        // starting cannot jump straight to working
        link.update_status(AgentStatus::Working, Some("Building".to_string()));
        let update = StatusUpdate::decode(&statuses.recv().await.unwrap()).unwrap();
        assert_eq!(update.status, AgentStatus::Starting);
        assert_eq!(update.status, link.status());
        assert_eq!(update.task.as_deref(), Some("Building"));
    }

    #[tokio::test]
    async fn test_nothing_published_after_offline() {
        let bus = MessageBus::default();
        let mut statuses = bus.subscribe(STATUS_CHANNEL).unwrap();
        let link = AgentLink::new("ui", bus.clone());

        link.update_status(AgentStatus::Ready, None);
        link.update_status(AgentStatus::Offline, None);
        link.update_status(AgentStatus::Stopping, Some("Agent shutdown".to_string()));
        link.update_status(AgentStatus::Error, None);

        let seen: Vec<AgentStatus> = std::iter::from_fn(|| statuses.try_recv())
            .filter_map(|raw| StatusUpdate::decode(&raw).ok())
            .map(|update| update.status)
            .collect();
        assert_eq!(seen, vec![AgentStatus::Ready, AgentStatus::Offline]);
    }
}
