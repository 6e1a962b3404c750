// Liveness classification from heartbeat age

use agent_lab::agents::AgentStatus;
use agent_lab::bus::StatusUpdate;
use agent_lab::health::{default_threshold, HealthMonitor};
use chrono::{Duration, Utc};

fn seen(agent: &str, age_secs: i64) -> StatusUpdate {
    let mut update = StatusUpdate::new(agent, AgentStatus::Ready, None);
    update.timestamp = Utc::now() - Duration::seconds(age_secs);
    update
}

#[test]
fn test_silence_beyond_threshold_is_unhealthy() {
    let now = Utc::now();
    let mut monitor = HealthMonitor::new();
    monitor.record_heartbeat("ui", now - Duration::seconds(121));
    monitor.record_heartbeat("leaflet", now - Duration::seconds(60));
    monitor.record_heartbeat("github", now - Duration::seconds(120));

    let unhealthy = monitor.unhealthy_agents(now, default_threshold());
    assert!(unhealthy.contains("ui"));
    assert!(!unhealthy.contains("leaflet"));
    assert!(!unhealthy.contains("github"), "exactly at the threshold is still healthy");
}

#[test]
fn test_any_status_update_refreshes_liveness() {
    let mut monitor = HealthMonitor::new();
    monitor.record_status(&seen("ui", 300));
    assert_eq!(monitor.unhealthy_agents(Utc::now(), default_threshold()).len(), 1);

    monitor.record_status(&seen("ui", 5));
    assert!(monitor.unhealthy_agents(Utc::now(), default_threshold()).is_empty());
    assert_eq!(monitor.active_count(), 1);
}

#[test]
fn test_agents_never_seen_are_not_reported() {
    let monitor = HealthMonitor::new();
    assert!(monitor.unhealthy_agents(Utc::now(), default_threshold()).is_empty());
    assert_eq!(monitor.tracked_count(), 0);
}
