use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::HealthMonitor;
use crate::bus::{BusError, MessageBus, StatusUpdate, HEARTBEAT_CHANNEL, STATUS_CHANNEL};
use crate::config::{ConfigError, HealthConfig};
use crate::shutdown::ShutdownListener;

/// Result of one health poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub polls: u64,
    pub checked_at: DateTime<Utc>,
    pub unhealthy: BTreeSet<String>,
    pub active_agents: usize,
    pub total_agents: usize,
}

impl Default for HealthReport {
    fn default() -> Self {
        Self {
            polls: 0,
            checked_at: Utc::now(),
            unhealthy: BTreeSet::new(),
            active_agents: 0,
            total_agents: 0,
        }
    }
}

/// Periodic pull over the heartbeats seen on the bus
#[derive(Debug)]
pub struct HealthService {
    monitor: HealthMonitor,
    threshold: Duration,
    poll_interval: std::time::Duration,
}

impl HealthService {
    pub fn new(monitor: HealthMonitor, threshold: Duration, poll_interval: std::time::Duration) -> Self {
        Self {
            monitor,
            threshold,
            poll_interval,
        }
    }

    pub fn from_config(config: &HealthConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            HealthMonitor::new(),
            config.threshold()?,
            std::time::Duration::from_secs(config.poll_interval_secs),
        ))
    }

    fn poll(&self, polls: u64) -> HealthReport {
        let now = Utc::now();
        let unhealthy = self.monitor.unhealthy_agents(now, self.threshold);

        for agent in &unhealthy {
            let last_seen = self.monitor.last_seen(agent);
            warn!(agent = %agent, last_seen = ?last_seen, "Agent appears unhealthy");
        }

        let report = HealthReport {
            polls,
            checked_at: now,
            unhealthy,
            active_agents: self.monitor.active_count(),
            total_agents: self.monitor.tracked_count(),
        };
        info!(
            active_agents = report.active_agents,
            total_agents = report.total_agents,
            unhealthy = report.unhealthy.len(),
            "Coordination health check"
        );
        report
    }

    /// Subscribe now and poll on a background task until shutdown. The
    /// receiver always holds the latest report.
    pub fn spawn(
        mut self,
        bus: &MessageBus,
        mut shutdown: ShutdownListener,
    ) -> Result<(JoinHandle<()>, watch::Receiver<HealthReport>), BusError> {
        let mut statuses = bus.subscribe(STATUS_CHANNEL)?;
        let mut heartbeats = bus.subscribe(HEARTBEAT_CHANNEL)?;
        let (report_tx, report_rx) = watch::channel(HealthReport::default());

        let handle = tokio::spawn(async move {
            info!(poll_secs = self.poll_interval.as_secs(), threshold_secs = self.threshold.num_seconds(), "Starting agent monitoring");
            let mut ticker = tokio::time::interval(self.poll_interval);
            let mut polls = 0;

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.wait() => break,
                    raw = statuses.recv() => match raw {
                        Some(raw) => self.observe(&raw),
                        None => break,
                    },
                    raw = heartbeats.recv() => match raw {
                        Some(raw) => self.observe(&raw),
                        None => break,
                    },
                    _ = ticker.tick() => {
                        polls += 1;
                        report_tx.send_replace(self.poll(polls));
                    }
                }
            }
            debug!("Agent monitoring stopped");
        });

        Ok((handle, report_rx))
    }

    fn observe(&mut self, raw: &str) {
        match StatusUpdate::decode(raw) {
            Ok(update) => self.monitor.record_status(&update),
            Err(e) => debug!(error = %e, "Ignoring undecodable status signal"),
        }
    }
}
