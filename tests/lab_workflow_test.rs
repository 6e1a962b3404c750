// Full in-process run: every default agent walks the five phases

use agent_lab::agents::AgentStatus;
use agent_lab::config::LabConfig;
use agent_lab::coordination::{CoordinationState, InMemoryStateStore, SessionStatus, StateStore, COMPLETED_PHASE};
use agent_lab::lab::Lab;
use agent_lab::orchestrator::host::lock;
use agent_lab::orchestrator::Progress;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

fn in_memory(config: &LabConfig) -> Arc<InMemoryStateStore> {
    Arc::new(InMemoryStateStore::new(CoordinationState::from_config(config, Utc::now())))
}

#[tokio::test]
async fn test_default_workflow_completes_and_goes_offline() {
    let config = LabConfig::default();
    let store = in_memory(&config);
    let lab = Lab::new(config).with_store(store.clone()).launch().await.unwrap();

    assert_eq!(lab.agent_names().len(), 4);
    assert_eq!(lab.start_phases(), Progress::Phase(0));

    let orchestrator = lab.orchestrator();
    timeout(Duration::from_secs(5), async {
        while !lock(&orchestrator).is_complete() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("every phase gate satisfied by the stock handlers");

    let status = lab.status();
    assert_eq!(status["current_phase"], "completed");
    assert_eq!(status["started"], true);

    lab.stop().await;

    let state = store.read().await.unwrap();
    assert_eq!(state.coordination.active_phase, COMPLETED_PHASE);
    assert_eq!(state.coordination.status, SessionStatus::Completed);
    assert_eq!(state.coordination.active_agents, 0);
    for (name, record) in &state.agents {
        assert_eq!(record.status, AgentStatus::Offline, "{name} should end offline");
        assert_eq!(
            record.tasks.last().map(|entry| entry.task.as_str()),
            Some("Agent stopped"),
            "{name} reports offline last"
        );
    }
}

#[tokio::test]
async fn test_interrupted_lab_still_records_offline() {
    let config = LabConfig::default();
    let store = in_memory(&config);
    let lab = Lab::new(config).with_store(store.clone()).launch().await.unwrap();

    lab.interrupt().await;

    let state = store.read().await.unwrap();
    assert!(state.agents.values().all(|record| record.status == AgentStatus::Offline));
    assert_eq!(state.coordination.status, SessionStatus::Initialized);
}

#[tokio::test]
async fn test_manual_advance_skips_a_silent_phase() {
    let mut config = LabConfig::default();
    // github answers for repository_setup, but the gate waits on a review nobody sends.
    let github_setup = config
        .phases
        .iter_mut()
        .find(|phase| phase.name == "github_setup")
        .unwrap();
    github_setup.required_response_keys = vec!["github_review".to_string()];

    let store = in_memory(&config);
    let lab = Lab::new(config).with_store(store).launch().await.unwrap();
    lab.start_phases();

    let orchestrator = lab.orchestrator();
    let waiting_on_github = timeout(Duration::from_secs(5), async {
        loop {
            if let Some(phase) = lock(&orchestrator).current_phase() {
                if phase.name == "github_setup" {
                    break;
                }
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waiting_on_github.is_ok());

    assert_eq!(lab.advance(), Progress::Phase(4));

    timeout(Duration::from_secs(5), async {
        while !lock(&orchestrator).is_complete() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("final integration completes after the manual advance");

    lab.stop().await;
}
