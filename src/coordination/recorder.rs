// Status recorder - mirrors bus traffic into the coordination store

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::state::{CoordinationState, HistoryLimits};
use super::store::{modify, StateStore, StoreError};
use crate::bus::{BusError, MessageBus, StatusUpdate, HEARTBEAT_CHANNEL, PHASE_CHANNEL, STATUS_CHANNEL};
use crate::orchestrator::PhaseEvent;
use crate::shutdown::ShutdownListener;

pub struct StatusRecorder {
    store: Arc<dyn StateStore>,
    limits: HistoryLimits,
    bus: Option<MessageBus>,
    /// Phase last announced as ready, cleared when readiness is lost
    announced: Mutex<Option<String>>,
}

impl StatusRecorder {
    pub fn new(store: Arc<dyn StateStore>, limits: HistoryLimits) -> Self {
        Self {
            store,
            limits,
            bus: None,
            announced: Mutex::new(None),
        }
    }

    /// Announce `phase_ready` events on this bus
    pub fn with_bus(mut self, bus: MessageBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub async fn record_status(&self, update: &StatusUpdate) -> Result<(), StoreError> {
        let limits = self.limits;
        let state = modify(self.store.as_ref(), |state| state.apply_status(update, limits)).await?;
        info!(
            agent = %update.agent,
            status = %update.status,
            task = update.task.as_deref().unwrap_or(""),
            active_agents = state.coordination.active_agents,
            "Agent status recorded"
        );
        self.check_phase_ready(&state);
        Ok(())
    }

    /// Publish `phase_ready` once each time the active phase becomes ready
    fn check_phase_ready(&self, state: &CoordinationState) {
        let ready = state.ready_phase();
        let mut announced = self.announced.lock().unwrap_or_else(|e| e.into_inner());
        let Some((phase, ready_agents)) = ready else {
            *announced = None;
            return;
        };
        if announced.as_deref() == Some(phase.as_str()) {
            return;
        }

        info!(phase = %phase, agents = ?ready_agents, "Phase ready, all agents available");
        *announced = Some(phase.clone());
        let Some(bus) = &self.bus else {
            return;
        };
        let event = PhaseEvent::ready(&phase, ready_agents);
        match event.encode() {
            Ok(encoded) => {
                if let Err(e) = bus.publish(PHASE_CHANNEL, encoded) {
                    error!(phase = %phase, error = %e, "Failed to publish phase ready event");
                }
            }
            Err(e) => error!(phase = %phase, error = %e, "Phase event encoding failed"),
        }
    }

    pub async fn record_phase_event(&self, event: &PhaseEvent) -> Result<(), StoreError> {
        if let PhaseEvent::PhaseReady { phase, .. } = event {
            debug!(phase = %phase, "Phase ready event observed");
            return Ok(());
        }
        let state = modify(self.store.as_ref(), |state| state.apply_phase_event(event)).await?;
        info!(active_phase = %state.coordination.active_phase, "Phase transition recorded");
        self.check_phase_ready(&state);
        Ok(())
    }

    async fn on_status(&self, raw: &str) {
        match StatusUpdate::decode(raw) {
            Ok(update) => {
                if let Err(e) = self.record_status(&update).await {
                    error!(agent = %update.agent, error = %e, "Failed to record status update");
                }
            }
            Err(e) => warn!(error = %e, "Invalid status update"),
        }
    }

    async fn on_phase_event(&self, raw: &str) {
        match PhaseEvent::decode(raw) {
            Ok(event) => {
                if let Err(e) = self.record_phase_event(&event).await {
                    error!(error = %e, "Failed to record phase transition");
                }
            }
            Err(e) => warn!(error = %e, "Invalid phase event"),
        }
    }

    /// Subscribe now and record on a background task until shutdown.
    ///
    /// Messages already delivered are recorded before a shutdown is honored.
    pub fn spawn(self, bus: &MessageBus, mut shutdown: ShutdownListener) -> Result<JoinHandle<()>, BusError> {
        let mut statuses = bus.subscribe(STATUS_CHANNEL)?;
        let mut heartbeats = bus.subscribe(HEARTBEAT_CHANNEL)?;
        let mut phases = bus.subscribe(PHASE_CHANNEL)?;
        let recorder = self.with_bus(bus.clone());

        Ok(tokio::spawn(async move {
            info!("Status recorder listening");
            loop {
                tokio::select! {
                    biased;
                    raw = statuses.recv() => match raw {
                        Some(raw) => recorder.on_status(&raw).await,
                        None => break,
                    },
                    raw = heartbeats.recv() => match raw {
                        Some(raw) => recorder.on_status(&raw).await,
                        None => break,
                    },
                    raw = phases.recv() => match raw {
                        Some(raw) => recorder.on_phase_event(&raw).await,
                        None => break,
                    },
                    _ = shutdown.wait() => break,
                }
            }
            debug!("Status recorder stopped");
        }))
    }
}
