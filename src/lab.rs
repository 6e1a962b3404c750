// In-process assembly: bus, agents, orchestrator host, recorder and monitor

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::agents::handlers::{command_logger, completion_handler, completion_status, status_handler};
use crate::agents::{AgentRuntime, StopHandle};
use crate::bus::channels::COORDINATION_CHANNELS;
use crate::bus::{MessageBus, Payload};
use crate::config::{AgentConfig, LabConfig};
use crate::coordination::{FileStateStore, HistoryLimits, OrchestratorLock, StateStore, StatusRecorder};
use crate::health::{HealthReport, HealthService};
use crate::orchestrator::host::lock;
use crate::orchestrator::{host_orchestrator, Progress, SharedOrchestrator, COORDINATION_COMMAND};
use crate::shutdown::ShutdownCoordinator;

pub struct Lab {
    config: LabConfig,
    store: Option<Arc<dyn StateStore>>,
    lock: Option<OrchestratorLock>,
}

struct RunningAgent {
    name: String,
    stop: StopHandle,
    handle: JoinHandle<()>,
}

/// A running lab. Dropping it without `stop` leaves the tasks running
/// until the runtime shuts down.
pub struct LabHandle {
    bus: MessageBus,
    orchestrator: SharedOrchestrator,
    store: Arc<dyn StateStore>,
    agents: Vec<RunningAgent>,
    agent_interrupt: ShutdownCoordinator,
    service_shutdown: ShutdownCoordinator,
    services: Vec<JoinHandle<()>>,
    health: watch::Receiver<HealthReport>,
    _lock: Option<OrchestratorLock>,
}

impl Lab {
    pub fn new(config: LabConfig) -> Self {
        Self {
            config,
            store: None,
            lock: None,
        }
    }

    /// Use `store` instead of the configured coordination file
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Hold the orchestrator lock for the lifetime of the lab
    pub fn with_lock(mut self, lock: OrchestratorLock) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Start services first, then every agent in dependency order.
    ///
    /// When this returns every agent is subscribed to its task channel.
    pub async fn launch(self) -> Result<LabHandle> {
        let config = self.config;
        config.validate()?;

        let bus = MessageBus::new(config.bus.channel_capacity);
        bus.ping().context("message bus unavailable")?;
        info!(channels = ?COORDINATION_CHANNELS, capacity = config.bus.channel_capacity, "Message bus ready");

        let store: Arc<dyn StateStore> = match self.store {
            Some(store) => store,
            None => Arc::new(FileStateStore::from_config(&config)),
        };
        store.read().await.context("coordination store unavailable")?;

        let service_shutdown = ShutdownCoordinator::new();
        let recorder = StatusRecorder::new(Arc::clone(&store), HistoryLimits::from(&config.state))
            .spawn(&bus, service_shutdown.listener())?;
        let (monitor, health) = HealthService::from_config(&config.health)?.spawn(&bus, service_shutdown.listener())?;

        let orchestrator_agent = config.orchestrator.agent.clone();
        let workers: Vec<String> = config
            .agents
            .iter()
            .map(|agent| agent.name.clone())
            .filter(|name| *name != orchestrator_agent)
            .collect();
        let heartbeat = config.health.heartbeat_interval_secs.map(Duration::from_secs);

        let agent_interrupt = ShutdownCoordinator::new();
        let mut agents = Vec::new();
        let mut orchestrator = None;
        let mut active = BTreeSet::new();

        for agent in config.start_order()? {
            let identity = agent.identity();
            let missing = identity.missing_dependencies(&active);
            if !missing.is_empty() {
                warn!(agent = %identity.name, missing = ?missing, "Starting agent with unmet dependencies");
            }

            let mut runtime = AgentRuntime::new(identity, bus.clone());
            if let Some(period) = heartbeat {
                runtime = runtime.with_heartbeat_interval(period);
            }

            if agent.name == orchestrator_agent {
                orchestrator = Some(host_orchestrator(&mut runtime, config.phase_descriptors(), workers.clone()));
            } else {
                runtime = runtime.with_completion_target(&orchestrator_agent);
                install_worker_handlers(&mut runtime, agent);
            }

            let stop = runtime.stop_handle();
            let handle = runtime
                .start(agent_interrupt.listener())
                .with_context(|| format!("failed to start agent {}", agent.name))?;

            active.insert(agent.name.clone());
            agents.push(RunningAgent {
                name: agent.name.clone(),
                stop,
                handle,
            });
        }

        let orchestrator =
            orchestrator.with_context(|| format!("orchestrator agent '{orchestrator_agent}' was not started"))?;

        info!(agents = agents.len(), phases = config.phases.len(), "Agent lab running");

        Ok(LabHandle {
            bus,
            orchestrator,
            store,
            agents,
            agent_interrupt,
            service_shutdown,
            services: vec![recorder, monitor],
            health,
            _lock: self.lock,
        })
    }
}

/// Stock handlers: completion for each declared task, status and commands
fn install_worker_handlers(runtime: &mut AgentRuntime, agent: &AgentConfig) {
    for (task, phase) in &agent.tasks {
        runtime.register_handler(task, completion_handler(&agent.name, phase, completion_status(task)));
    }
    let identity = runtime.identity().clone();
    runtime.register_handler("status_request", status_handler(&identity));
    runtime.register_handler(COORDINATION_COMMAND, command_logger(&agent.name));
}

impl LabHandle {
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn orchestrator(&self) -> SharedOrchestrator {
        Arc::clone(&self.orchestrator)
    }

    pub fn store(&self) -> Arc<dyn StateStore> {
        Arc::clone(&self.store)
    }

    /// Latest health poll
    pub fn health(&self) -> watch::Receiver<HealthReport> {
        self.health.clone()
    }

    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.iter().map(|agent| agent.name.as_str()).collect()
    }

    pub fn start_phases(&self) -> Progress {
        lock(&self.orchestrator).start()
    }

    pub fn advance(&self) -> Progress {
        lock(&self.orchestrator).advance()
    }

    /// Ask every worker for its status and return the orchestrator's own
    pub fn status(&self) -> Payload {
        let orchestrator = lock(&self.orchestrator);
        orchestrator.request_statuses();
        orchestrator.status_payload()
    }

    /// Graceful stop: every agent reports `stopping` then `offline`
    pub async fn stop(self) {
        for agent in self.agents.iter().rev() {
            agent.stop.stop();
        }
        self.finish().await;
    }

    /// Interrupt: agent loops exit directly, still reporting `offline` last
    pub async fn interrupt(self) {
        self.agent_interrupt.trigger();
        self.finish().await;
    }

    async fn finish(self) {
        for agent in self.agents.into_iter().rev() {
            if let Err(e) = agent.handle.await {
                warn!(agent = %agent.name, error = %e, "Agent task ended abnormally");
            }
        }

        // Agents are gone; let the recorder drain their final statuses.
        self.service_shutdown.trigger();
        for service in self.services {
            if let Err(e) = service.await {
                warn!(error = %e, "Service task ended abnormally");
            }
        }

        info!("Agent lab stopped");
    }
}
