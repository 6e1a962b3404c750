// Agent lifecycle state machine
//
//   starting -> ready -> { active <-> working } -> stopping -> offline
//
// `error` is reachable from every state except `offline` and returns to the
// state held before the error on the next non-error report. `offline` is
// terminal.

use statig::prelude::*;

use super::identity::AgentStatus;

/// A status the agent reported about itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport(pub AgentStatus);

#[derive(Debug)]
pub struct AgentLifecycle {
    pub agent: String,
    prior: AgentStatus,
}

impl AgentLifecycle {
    pub fn new(agent: &str) -> Self {
        Self {
            agent: agent.to_string(),
            prior: AgentStatus::Starting,
        }
    }
}

#[state_machine(initial = "State::starting()")]
impl AgentLifecycle {
    #[state]
    fn starting(&mut self, event: &StatusReport) -> Outcome<State> {
        match event.0 {
            AgentStatus::Ready => Transition(State::ready()),
            other => self.interrupt(AgentStatus::Starting, other),
        }
    }

    #[state]
    fn ready(&mut self, event: &StatusReport) -> Outcome<State> {
        match event.0 {
            AgentStatus::Active => Transition(State::active()),
            AgentStatus::Working => Transition(State::working()),
            other => self.interrupt(AgentStatus::Ready, other),
        }
    }

    #[state]
    fn active(&mut self, event: &StatusReport) -> Outcome<State> {
        match event.0 {
            AgentStatus::Working => Transition(State::working()),
            AgentStatus::Active => Handled,
            other => self.interrupt(AgentStatus::Active, other),
        }
    }

    #[state]
    fn working(&mut self, event: &StatusReport) -> Outcome<State> {
        match event.0 {
            AgentStatus::Active => Transition(State::active()),
            AgentStatus::Working => Handled,
            other => self.interrupt(AgentStatus::Working, other),
        }
    }

    #[state]
    fn error(&mut self, event: &StatusReport) -> Outcome<State> {
        match event.0 {
            AgentStatus::Error => Handled,
            AgentStatus::Stopping => Transition(State::stopping()),
            AgentStatus::Offline => Transition(State::offline()),
            _ => {
                tracing::debug!(agent = %self.agent, resumed = %self.prior, "Agent recovered from error");
                Transition(self.resume())
            }
        }
    }

    #[state]
    fn stopping(&mut self, event: &StatusReport) -> Outcome<State> {
        match event.0 {
            AgentStatus::Offline => Transition(State::offline()),
            AgentStatus::Stopping => Handled,
            other => self.interrupt(AgentStatus::Stopping, other),
        }
    }

    #[state]
    fn offline(&mut self, event: &StatusReport) -> Outcome<State> {
        tracing::debug!(agent = %self.agent, ignored = %event.0, "Agent is offline");
        Handled
    }
}

impl AgentLifecycle {
    /// Transitions every non-terminal state accepts
    fn interrupt(&mut self, from: AgentStatus, to: AgentStatus) -> Outcome<State> {
        match to {
            AgentStatus::Error => {
                self.prior = from;
                Transition(State::error())
            }
            AgentStatus::Stopping => Transition(State::stopping()),
            AgentStatus::Offline => Transition(State::offline()),
            _ => {
                tracing::debug!(agent = %self.agent, from = %from, to = %to, "Ignoring status report");
                Handled
            }
        }
    }

    fn resume(&self) -> State {
        match self.prior {
            AgentStatus::Starting => State::starting(),
            AgentStatus::Active => State::active(),
            AgentStatus::Working => State::working(),
            AgentStatus::Stopping => State::stopping(),
            AgentStatus::Ready | AgentStatus::Error | AgentStatus::Offline => State::ready(),
        }
    }
}

/// Owns a running lifecycle machine and exposes it as an [`AgentStatus`]
pub struct LifecycleTracker {
    machine: StateMachine<AgentLifecycle>,
}

impl std::fmt::Debug for LifecycleTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleTracker")
            .field("status", &self.current())
            .finish()
    }
}

impl LifecycleTracker {
    pub fn new(agent: &str) -> Self {
        Self {
            machine: AgentLifecycle::new(agent).state_machine(),
        }
    }

    /// Feed a reported status and return the resulting lifecycle status
    pub fn report(&mut self, status: AgentStatus) -> AgentStatus {
        let recovering = self.current() == AgentStatus::Error && status != AgentStatus::Error;
        self.machine.handle(&StatusReport(status));
        // recovery only restores the prior state, the report still applies on top
        if recovering && self.current() != status {
            self.machine.handle(&StatusReport(status));
        }
        self.current()
    }

    pub fn current(&self) -> AgentStatus {
        match self.machine.state() {
            State::Starting { .. } => AgentStatus::Starting,
            State::Ready { .. } => AgentStatus::Ready,
            State::Active { .. } => AgentStatus::Active,
            State::Working { .. } => AgentStatus::Working,
            State::Error { .. } => AgentStatus::Error,
            State::Stopping { .. } => AgentStatus::Stopping,
            State::Offline { .. } => AgentStatus::Offline,
        }
    }

    pub fn is_offline(&self) -> bool {
        self.current() == AgentStatus::Offline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_happy_path() {
        let mut tracker = LifecycleTracker::new("ui");
        assert_eq!(tracker.current(), AgentStatus::Starting);

        assert_eq!(tracker.report(AgentStatus::Ready), AgentStatus::Ready);
        assert_eq!(tracker.report(AgentStatus::Working), AgentStatus::Working);
        assert_eq!(tracker.report(AgentStatus::Active), AgentStatus::Active);
        assert_eq!(tracker.report(AgentStatus::Working), AgentStatus::Working);
        assert_eq!(tracker.report(AgentStatus::Stopping), AgentStatus::Stopping);
        assert_eq!(tracker.report(AgentStatus::Offline), AgentStatus::Offline);
    }

    #[test]
    fn test_starting_cannot_skip_ready() {
        let mut tracker = LifecycleTracker::new("ui");
        assert_eq!(tracker.report(AgentStatus::Working), AgentStatus::Starting);
    }

    #[test]
    fn test_error_returns_to_prior_state() {
        let mut tracker = LifecycleTracker::new("github");
        tracker.report(AgentStatus::Ready);
        tracker.report(AgentStatus::Working);

        assert_eq!(tracker.report(AgentStatus::Error), AgentStatus::Error);
        assert_eq!(tracker.report(AgentStatus::Error), AgentStatus::Error);
        assert_eq!(tracker.report(AgentStatus::Active), AgentStatus::Active);
    }

    #[test]
    fn test_recovery_keeps_prior_state_rules() {
        let mut tracker = LifecycleTracker::new("ui");
        tracker.report(AgentStatus::Ready);
        tracker.report(AgentStatus::Error);
        assert_eq!(tracker.report(AgentStatus::Working), AgentStatus::Working);

        let mut tracker = LifecycleTracker::new("ui");
        tracker.report(AgentStatus::Error);
        assert_eq!(tracker.report(AgentStatus::Working), AgentStatus::Starting);
    }

    #[test]
    fn test_offline_is_terminal() {
        let mut tracker = LifecycleTracker::new("leaflet");
        tracker.report(AgentStatus::Ready);
        tracker.report(AgentStatus::Offline);

        assert!(tracker.is_offline());
        assert_eq!(tracker.report(AgentStatus::Ready), AgentStatus::Offline);
        assert_eq!(tracker.report(AgentStatus::Error), AgentStatus::Offline);
    }

    #[test]
    fn test_error_can_stop_directly() {
        let mut tracker = LifecycleTracker::new("main");
        tracker.report(AgentStatus::Error);
        assert_eq!(tracker.report(AgentStatus::Offline), AgentStatus::Offline);
    }
}
