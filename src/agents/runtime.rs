// Agent Runtime - handler registry, receive loop and status reporting
//
// One runtime per agent. The receive loop is single-threaded per agent:
// handlers run synchronously and block the next message for their duration.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use super::identity::{AgentIdentity, AgentStatus};
use super::link::AgentLink;
use crate::bus::{agent_channel, BusError, Message, MessageBus, Payload, Subscription};
use crate::shutdown::ShutdownListener;
use crate::telemetry::{create_coordination_span, generate_correlation_id};

/// Message type of completion notices routed to the orchestrator
pub const PHASE_COMPLETE: &str = "phase_complete";

/// Handler for one message type: payload in, optional reply payload out
pub trait MessageHandler: Send + Sync {
    fn handle(&self, payload: &Payload) -> anyhow::Result<Option<Payload>>;
}

impl<F> MessageHandler for F
where
    F: Fn(&Payload) -> anyhow::Result<Option<Payload>> + Send + Sync,
{
    fn handle(&self, payload: &Payload) -> anyhow::Result<Option<Payload>> {
        self(payload)
    }
}

/// Why a single inbound message could not be handled. None of these stop
/// the receive loop.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid message on {channel}: {source}")]
    Decode {
        channel: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no handler for message type: {0}")]
    NoHandler(String),

    #[error("handler for {message_type} failed: {reason}")]
    Handler { message_type: String, reason: String },
}

/// Result of a successfully handled message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub from: String,
    pub message_type: String,
    /// A `<type>_response` reply went back to the sender
    pub replied: bool,
    /// The reply was also routed to the orchestrator as `phase_complete`
    pub completion_routed: bool,
}

/// Requests a running agent loop to stop
#[derive(Debug, Clone)]
pub struct StopHandle {
    link: AgentLink,
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    /// Report `stopping` and ask the loop to exit; `offline` follows from
    /// the loop itself.
    pub fn stop(&self) {
        self.link
            .update_status(AgentStatus::Stopping, Some("Agent shutdown".to_string()));
        self.tx.send_replace(true);
    }
}

/// Emits the terminal `offline` status when the loop scope ends, however it
/// ends (normal exit, error return, panic or task abort).
struct OfflineGuard {
    link: AgentLink,
}

impl Drop for OfflineGuard {
    fn drop(&mut self) {
        self.link
            .update_status(AgentStatus::Offline, Some("Agent stopped".to_string()));
    }
}

pub struct AgentRuntime {
    identity: AgentIdentity,
    link: AgentLink,
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
    completion_target: Option<String>,
    heartbeat_interval: Option<Duration>,
    stop_tx: Arc<watch::Sender<bool>>,
}

impl std::fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("AgentRuntime")
            .field("agent", &self.identity.name)
            .field("handlers", &types)
            .field("completion_target", &self.completion_target)
            .finish()
    }
}

impl AgentRuntime {
    pub fn new(identity: AgentIdentity, bus: MessageBus) -> Self {
        let link = AgentLink::new(&identity.name, bus);
        let (stop_tx, _) = watch::channel(false);
        Self {
            identity,
            link,
            handlers: HashMap::new(),
            completion_target: None,
            heartbeat_interval: None,
            stop_tx: Arc::new(stop_tx),
        }
    }

    /// Route completion-shaped replies to this agent as `phase_complete`
    pub fn with_completion_target(mut self, agent: &str) -> Self {
        self.completion_target = Some(agent.to_string());
        self
    }

    /// Publish a heartbeat at this interval while idle
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// Outbound side of this agent, shareable with handlers
    pub fn link(&self) -> AgentLink {
        self.link.clone()
    }

    pub fn status(&self) -> AgentStatus {
        self.link.status()
    }

    /// Register `handler` for `message_type`, replacing any earlier one
    pub fn register_handler<F>(&mut self, message_type: &str, handler: F)
    where
        F: Fn(&Payload) -> anyhow::Result<Option<Payload>> + Send + Sync + 'static,
    {
        if self
            .handlers
            .insert(message_type.to_string(), Arc::new(handler))
            .is_some()
        {
            debug!(agent = %self.identity.name, message_type = %message_type, "Handler replaced");
        }
    }

    pub fn has_handler(&self, message_type: &str) -> bool {
        self.handlers.contains_key(message_type)
    }

    pub fn send(&self, to: &str, message_type: &str, payload: Payload) {
        self.link.send(to, message_type, payload);
    }

    pub fn update_status(&self, status: AgentStatus, task: Option<String>) {
        self.link.update_status(status, task);
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            link: self.link.clone(),
            tx: Arc::clone(&self.stop_tx),
        }
    }

    /// Handle one raw inbound message and report the outcome: decode and
    /// dispatch failures are logged, handler failures also become an `error`
    /// status.
    pub fn dispatch(&self, raw: &str) -> Result<Dispatched, DispatchError> {
        let result = self.process(raw);
        match &result {
            Ok(dispatched) => {
                debug!(agent = %self.identity.name, message_type = %dispatched.message_type, replied = dispatched.replied, "Message handled");
            }
            Err(e @ DispatchError::Decode { .. }) => {
                warn!(agent = %self.identity.name, error = %e, "Invalid message received");
            }
            Err(e @ DispatchError::NoHandler(_)) => {
                warn!(agent = %self.identity.name, error = %e, "Message ignored");
            }
            Err(e @ DispatchError::Handler { .. }) => {
                error!(agent = %self.identity.name, error = %e, "Message processing error");
                self.link.update_status(AgentStatus::Error, Some(e.to_string()));
            }
        }
        result
    }

    fn process(&self, raw: &str) -> Result<Dispatched, DispatchError> {
        let message = Message::decode(raw).map_err(|source| DispatchError::Decode {
            channel: agent_channel(&self.identity.name),
            source,
        })?;

        info!(agent = %self.identity.name, from = %message.from, message_type = %message.message_type, "Message received");

        let handler = self
            .handlers
            .get(&message.message_type)
            .cloned()
            .ok_or_else(|| DispatchError::NoHandler(message.message_type.clone()))?;

        self.link.update_status(
            AgentStatus::Working,
            Some(format!("Processing {}", message.message_type)),
        );

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&message.payload)));
        let reply = match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                return Err(DispatchError::Handler {
                    message_type: message.message_type.clone(),
                    reason: format!("{e:#}"),
                })
            }
            Err(panic) => {
                return Err(DispatchError::Handler {
                    message_type: message.message_type.clone(),
                    reason: panic_reason(panic.as_ref()),
                })
            }
        };

        let mut dispatched = Dispatched {
            from: message.from.clone(),
            message_type: message.message_type.clone(),
            replied: false,
            completion_routed: false,
        };

        let Some(reply) = reply.filter(|reply| !reply.is_empty()) else {
            return Ok(dispatched);
        };

        if let Some(target) = self.completion_route(&message, &reply) {
            self.link.send(&target, PHASE_COMPLETE, reply.clone());
            dispatched.completion_routed = true;
        }

        self.link.send(&message.from, &message.response_type(), reply);
        dispatched.replied = true;

        Ok(dispatched)
    }

    /// Orchestrator to notify when `reply` is a completion payload
    fn completion_route(&self, message: &Message, reply: &Payload) -> Option<String> {
        let target = self.completion_target.as_ref()?;
        if message.message_type == PHASE_COMPLETE || *target == self.identity.name {
            return None;
        }

        let is_completion = ["agent", "phase", "status"]
            .iter()
            .all(|key| reply.get(*key).is_some_and(|value| value.is_string()));

        is_completion.then(|| target.clone())
    }

    /// Run the receive loop on the current task until shutdown, stop or bus
    /// closure. A subscription failure is returned before the loop starts.
    pub async fn run(self, shutdown: ShutdownListener) -> Result<(), BusError> {
        let attached = self.attach()?;
        attached.listen(shutdown).await;
        Ok(())
    }

    /// Subscribe synchronously, then run the receive loop on a new task.
    ///
    /// Once this returns the agent's task channel has a subscriber, so
    /// messages sent afterwards are not lost.
    pub fn start(self, shutdown: ShutdownListener) -> Result<JoinHandle<()>, BusError> {
        let attached = self.attach()?;
        let span = create_coordination_span(
            "agent_loop",
            Some(&attached.runtime.identity.name),
            None,
            Some(&generate_correlation_id()),
        );
        Ok(tokio::spawn(attached.listen(shutdown).instrument(span)))
    }

    fn attach(self) -> Result<AttachedAgent, BusError> {
        let guard = OfflineGuard {
            link: self.link.clone(),
        };

        self.link
            .update_status(AgentStatus::Starting, Some("Agent initialization".to_string()));

        let inbox = self.link.bus().subscribe(&agent_channel(&self.identity.name))?;

        info!(agent = %self.identity.name, role = %self.identity.role, "Agent listening for messages");
        self.link
            .update_status(AgentStatus::Ready, Some("Waiting for tasks".to_string()));

        Ok(AttachedAgent {
            runtime: self,
            inbox,
            _guard: guard,
        })
    }
}

struct AttachedAgent {
    runtime: AgentRuntime,
    inbox: Subscription,
    // Dropped last: `offline` is always the final status of the loop.
    _guard: OfflineGuard,
}

impl AttachedAgent {
    async fn listen(mut self, mut shutdown: ShutdownListener) {
        let name = self.runtime.identity.name.clone();
        let mut stop_rx = self.runtime.stop_tx.subscribe();
        let mut heartbeat = self.runtime.heartbeat_interval.map(|period| {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!(agent = %name, "Agent stopped by interrupt");
                    break;
                }
                _ = stop_rx.wait_for(|stop| *stop) => {
                    info!(agent = %name, "Agent stopped");
                    break;
                }
                _ = next_tick(heartbeat.as_mut()) => {
                    self.runtime.link.heartbeat();
                }
                raw = self.inbox.recv() => {
                    let Some(raw) = raw else {
                        warn!(agent = %name, "Message bus closed");
                        break;
                    };
                    // Outcome is already logged and reported by dispatch.
                    let _ = self.runtime.dispatch(&raw);
                }
            }
        }
    }
}

async fn next_tick(interval: Option<&mut tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn panic_reason(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(reason) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {reason}")
    } else if let Some(reason) = panic.downcast_ref::<String>() {
        format!("handler panicked: {reason}")
    } else {
        "handler panicked".to_string()
    }
}
