// Coordination file persistence driven by live bus traffic

use agent_lab::agents::{AgentLink, AgentStatus};
use agent_lab::bus::{MessageBus, StatusUpdate, PHASE_CHANNEL};
use agent_lab::config::LabConfig;
use agent_lab::coordination::{
    modify, CoordinationState, FileStateStore, HistoryLimits, PhaseStatus, SessionStatus, StateStore, StatusRecorder,
};
use agent_lab::orchestrator::PhaseEvent;
use agent_lab::shutdown::ShutdownCoordinator;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;

fn file_store(dir: &TempDir) -> FileStateStore {
    let seed = CoordinationState::from_config(&LabConfig::default(), Utc::now());
    FileStateStore::new(dir.path().join("warp-agent-memory.json"), seed)
}

#[tokio::test]
async fn test_first_read_seeds_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir);
    assert!(!store.exists());

    let state = store.read().await.unwrap();
    assert!(store.exists());
    assert_eq!(state.coordination.active_phase, "init");
    assert_eq!(state.coordination.status, SessionStatus::Initialized);
    assert!(state.agents.values().all(|agent| agent.status == AgentStatus::Offline));

    let on_disk: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
    assert_eq!(on_disk["coordination"]["total_agents"], 4);
    assert_eq!(on_disk["agents"]["leaflet"]["dependencies"], serde_json::json!(["main", "ui"]));
}

#[tokio::test]
async fn test_active_count_is_derived_on_write() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir);

    let mut state = store.read().await.unwrap();
    state.coordination.active_agents = 99;
    if let Some(ui) = state.agents.get_mut("ui") {
        ui.status = AgentStatus::Working;
    }
    store.write(&state).await.unwrap();

    let reread = file_store(&dir).read().await.unwrap();
    assert_eq!(reread.coordination.active_agents, 1);
}

#[tokio::test]
async fn test_written_state_reads_back_equal() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir);
    let limits = HistoryLimits::default();

    let mut state = store.read().await.unwrap();
    state.apply_status(&StatusUpdate::new("ui", AgentStatus::Ready, Some("Waiting for tasks".into())), limits);
    state.apply_status(&StatusUpdate::new("github", AgentStatus::Error, Some("token expired".into())), limits);
    state.apply_status(&StatusUpdate::new("scout", AgentStatus::Working, None), limits);
    state.apply_phase_event(&PhaseEvent::started("sveltekit_setup", 1, 5));
    state.recount();

    store.write(&state).await.unwrap();
    assert_eq!(store.read().await.unwrap(), state);
    assert_eq!(file_store(&dir).read().await.unwrap(), state);
}

#[tokio::test]
async fn test_recorder_mirrors_statuses_and_phases_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn StateStore> = Arc::new(file_store(&dir));
    let bus = MessageBus::new(64);
    let shutdown = ShutdownCoordinator::new();

    let recorder = StatusRecorder::new(Arc::clone(&store), HistoryLimits::default())
        .spawn(&bus, shutdown.listener())
        .unwrap();

    let ui = AgentLink::new("ui", bus.clone());
    ui.update_status(AgentStatus::Ready, Some("Waiting for tasks".to_string()));
    ui.update_status(AgentStatus::Error, Some("npm install failed".to_string()));
    bus.publish(PHASE_CHANNEL, PhaseEvent::started("sveltekit_setup", 1, 5).encode().unwrap())
        .unwrap();

    shutdown.trigger();
    timeout(Duration::from_secs(2), recorder).await.unwrap().unwrap();

    let state = store.read().await.unwrap();
    let record = &state.agents["ui"];
    assert_eq!(record.status, AgentStatus::Error);
    assert_eq!(record.tasks.len(), 2);
    assert_eq!(record.errors.len(), 1);
    assert_eq!(record.errors[0].message, "npm install failed");

    assert_eq!(state.coordination.active_phase, "sveltekit_setup");
    assert_eq!(state.coordination.status, SessionStatus::Running);
    assert_eq!(state.phases["init"].status, PhaseStatus::Completed);
    assert_eq!(state.phases["sveltekit_setup"].status, PhaseStatus::Active);
    assert_eq!(state.phases["final_integration"].status, PhaseStatus::Pending);
}

#[tokio::test]
async fn test_modify_is_read_modify_write() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir);

    modify(&store, |state| {
        state.project.name = "Renamed".to_string();
    })
    .await
    .unwrap();

    assert_eq!(store.read().await.unwrap().project.name, "Renamed");
}
