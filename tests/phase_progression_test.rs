// Phase gating against the default five-phase workflow

use agent_lab::agents::AgentLink;
use agent_lab::bus::{agent_channel, payload, Message, MessageBus, Payload, Subscription, PHASE_CHANNEL};
use agent_lab::config::LabConfig;
use agent_lab::orchestrator::{CompletionOutcome, PhaseEvent, PhaseOrchestrator, Progress};
use proptest::prelude::*;
use serde_json::json;

fn orchestrator(bus: &MessageBus) -> PhaseOrchestrator {
    PhaseOrchestrator::new(LabConfig::default().phase_descriptors(), AgentLink::new("main", bus.clone()))
}

fn completion(agent: &str, phase: &str) -> Payload {
    payload(json!({"agent": agent, "phase": phase, "status": "complete"}))
}

fn task_types(inbox: &mut Subscription) -> Vec<String> {
    std::iter::from_fn(|| inbox.try_recv())
        .map(|raw| Message::decode(&raw).unwrap().message_type)
        .collect()
}

fn phase_events(events: &mut Subscription) -> Vec<PhaseEvent> {
    std::iter::from_fn(|| events.try_recv())
        .map(|raw| PhaseEvent::decode(&raw).unwrap())
        .collect()
}

#[test]
fn test_init_phase_waits_for_every_agent() {
    let bus = MessageBus::new(64);
    let mut ui = bus.subscribe(&agent_channel("ui")).unwrap();
    let mut leaflet = bus.subscribe(&agent_channel("leaflet")).unwrap();
    let mut github = bus.subscribe(&agent_channel("github")).unwrap();
    let mut events = bus.subscribe(PHASE_CHANNEL).unwrap();

    let mut orchestrator = orchestrator(&bus);
    assert_eq!(orchestrator.start(), Progress::Phase(0));
    assert_eq!(task_types(&mut ui), vec!["initialize"]);
    assert_eq!(task_types(&mut leaflet), vec!["initialize"]);
    assert_eq!(task_types(&mut github), vec!["initialize"]);

    let outcome = orchestrator.on_completion(&completion("ui", "init")).unwrap();
    assert!(matches!(outcome, CompletionOutcome::Waiting { ref missing, .. } if missing.len() == 2));

    let outcome = orchestrator.on_completion(&completion("leaflet", "init")).unwrap();
    assert!(matches!(outcome, CompletionOutcome::Waiting { ref missing, .. } if missing == &["github_init"]));

    let outcome = orchestrator.on_completion(&completion("github", "init")).unwrap();
    assert_eq!(
        outcome,
        CompletionOutcome::Advanced {
            key: "github_init".to_string(),
            progress: Progress::Phase(1),
        }
    );

    assert_eq!(task_types(&mut ui), vec!["setup_sveltekit"]);
    assert!(task_types(&mut leaflet).is_empty());

    let started: Vec<String> = phase_events(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            PhaseEvent::PhaseStarted { phase, .. } => Some(phase),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec!["init", "sveltekit_setup"]);
}

#[test]
fn test_completion_for_another_phase_is_only_recorded() {
    let bus = MessageBus::new(64);
    let mut orchestrator = orchestrator(&bus);
    orchestrator.start();

    let outcome = orchestrator.on_completion(&completion("ui", "sveltekit_setup")).unwrap();
    assert_eq!(
        outcome,
        CompletionOutcome::Recorded {
            key: "ui_sveltekit_setup".to_string()
        }
    );
    assert_eq!(orchestrator.progress(), Progress::Phase(0));
    assert!(orchestrator.pending().contains("ui_sveltekit_setup"));
}

#[test]
fn test_manual_advance_runs_to_terminal_event() {
    let bus = MessageBus::new(64);
    let mut events = bus.subscribe(PHASE_CHANNEL).unwrap();
    let mut orchestrator = orchestrator(&bus);

    assert_eq!(orchestrator.advance(), Progress::Phase(0), "advance before start starts");
    for expected in 1..5 {
        assert_eq!(orchestrator.advance(), Progress::Phase(expected));
    }
    assert_eq!(orchestrator.advance(), Progress::Complete);
    assert_eq!(orchestrator.advance(), Progress::Complete);

    let events = phase_events(&mut events);
    assert_eq!(events.len(), 6, "five starts and one terminal event");
    assert!(matches!(events.last(), Some(PhaseEvent::AllPhasesComplete { total: 5, .. })));

    let status = orchestrator.status_payload();
    assert_eq!(status["current_phase"], "completed");
    assert_eq!(status["phase_number"], 6);
}

#[test]
fn test_completions_after_the_end_change_nothing() {
    let bus = MessageBus::new(64);
    let mut orchestrator = orchestrator(&bus);
    orchestrator.start();
    while orchestrator.advance() != Progress::Complete {}

    let outcome = orchestrator.on_completion(&completion("ui", "final_integration")).unwrap();
    assert!(matches!(outcome, CompletionOutcome::Recorded { .. }));
    assert!(orchestrator.is_complete());
}

#[test]
fn test_restart_clears_pending_completions() {
    let bus = MessageBus::new(64);
    let mut orchestrator = orchestrator(&bus);
    orchestrator.start();
    orchestrator.on_completion(&completion("ui", "init")).unwrap();
    assert_eq!(orchestrator.pending().len(), 1);

    orchestrator.start();
    assert!(orchestrator.pending().is_empty());
    assert_eq!(orchestrator.progress(), Progress::Phase(0));
}

fn init_agent() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("ui"), Just("leaflet"), Just("github")]
}

proptest! {
    // Duplicate completions are idempotent: only the set of senders matters.
    #[test]
    fn prop_init_gate_depends_only_on_distinct_senders(senders in prop::collection::vec(init_agent(), 0..12)) {
        let bus = MessageBus::new(64);
        let mut orchestrator = orchestrator(&bus);
        orchestrator.start();

        for agent in &senders {
            orchestrator.on_completion(&completion(agent, "init")).unwrap();
        }

        let distinct: std::collections::BTreeSet<_> = senders.iter().collect();
        let expected = if distinct.len() == 3 { Progress::Phase(1) } else { Progress::Phase(0) };
        prop_assert_eq!(orchestrator.progress(), expected);
    }
}
