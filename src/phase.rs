//! Lifecycle of a single command run
//! Idle -> Connecting -> AwaitingReadiness -> (ErrorShortCircuit | Executing) -> Completed -> Idle

use log::debug;
use serde::Serialize;
use statig::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommandPhase {
    Idle,
    Connecting,
    AwaitingReadiness,
    ErrorShortCircuit,
    Executing,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseInput {
    Start,
    Connected,
    ReadyForInput,
    ErrorDisplayed,
    // Reached from any active phase: normal end, failure or watchdog
    Finished,
    Reset,
}

#[derive(Debug, Default)]
pub struct PhaseMachine;

#[state_machine(
    initial = "State::idle()",
    state(derive(Debug)),
    on_transition = "Self::on_transition"
)]
impl PhaseMachine {
    #[state]
    fn idle(event: &PhaseInput) -> Response<State> {
        use Response::*;

        match event {
            PhaseInput::Start => Transition(State::connecting()),
            _ => Handled,
        }
    }

    #[state]
    fn connecting(event: &PhaseInput) -> Response<State> {
        use Response::*;

        match event {
            PhaseInput::Connected => Transition(State::awaiting_readiness()),
            PhaseInput::Finished => Transition(State::completed()),
            _ => Handled,
        }
    }

    #[state]
    fn awaiting_readiness(event: &PhaseInput) -> Response<State> {
        use Response::*;

        match event {
            PhaseInput::ReadyForInput => Transition(State::executing()),
            PhaseInput::ErrorDisplayed => Transition(State::error_short_circuit()),
            PhaseInput::Finished => Transition(State::completed()),
            _ => Handled,
        }
    }

    #[state]
    fn error_short_circuit(event: &PhaseInput) -> Response<State> {
        use Response::*;

        match event {
            PhaseInput::Finished => Transition(State::completed()),
            _ => Handled,
        }
    }

    #[state]
    fn executing(event: &PhaseInput) -> Response<State> {
        use Response::*;

        match event {
            PhaseInput::Finished => Transition(State::completed()),
            _ => Handled,
        }
    }

    #[state]
    fn completed(event: &PhaseInput) -> Response<State> {
        use Response::*;

        match event {
            PhaseInput::Reset => Transition(State::idle()),
            _ => Handled,
        }
    }
}

impl PhaseMachine {
    fn on_transition(&mut self, source: &State, target: &State) {
        debug!(
            "Command phase: {:?} -> {:?}",
            Self::state_to_phase(source),
            Self::state_to_phase(target)
        );
    }

    fn state_to_phase(state: &State) -> CommandPhase {
        match state {
            State::Idle {} => CommandPhase::Idle,
            State::Connecting {} => CommandPhase::Connecting,
            State::AwaitingReadiness {} => CommandPhase::AwaitingReadiness,
            State::ErrorShortCircuit {} => CommandPhase::ErrorShortCircuit,
            State::Executing {} => CommandPhase::Executing,
            State::Completed {} => CommandPhase::Completed,
        }
    }
}

pub struct PhaseTracker {
    machine: statig::prelude::StateMachine<PhaseMachine>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            machine: PhaseMachine::default().state_machine(),
        }
    }

    pub fn handle(&mut self, input: PhaseInput) -> CommandPhase {
        self.machine.handle(&input);
        self.phase()
    }

    pub fn phase(&self) -> CommandPhase {
        PhaseMachine::state_to_phase(self.machine.state())
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_run() {
        let mut tracker = PhaseTracker::new();
        assert_eq!(tracker.phase(), CommandPhase::Idle);
        assert_eq!(tracker.handle(PhaseInput::Start), CommandPhase::Connecting);
        assert_eq!(tracker.handle(PhaseInput::Connected), CommandPhase::AwaitingReadiness);
        assert_eq!(tracker.handle(PhaseInput::ReadyForInput), CommandPhase::Executing);
        assert_eq!(tracker.handle(PhaseInput::Finished), CommandPhase::Completed);
        assert_eq!(tracker.handle(PhaseInput::Reset), CommandPhase::Idle);
    }

    #[test]
    fn test_error_menu_short_circuits() {
        let mut tracker = PhaseTracker::new();
        tracker.handle(PhaseInput::Start);
        tracker.handle(PhaseInput::Connected);
        assert_eq!(
            tracker.handle(PhaseInput::ErrorDisplayed),
            CommandPhase::ErrorShortCircuit
        );
        // the command itself is never started from here
        assert_eq!(
            tracker.handle(PhaseInput::ReadyForInput),
            CommandPhase::ErrorShortCircuit
        );
        assert_eq!(tracker.handle(PhaseInput::Finished), CommandPhase::Completed);
    }

    #[test]
    fn test_failure_while_connecting_completes() {
        let mut tracker = PhaseTracker::new();
        tracker.handle(PhaseInput::Start);
        assert_eq!(tracker.handle(PhaseInput::Finished), CommandPhase::Completed);
        assert_eq!(tracker.handle(PhaseInput::Reset), CommandPhase::Idle);
    }

    #[test]
    fn test_idle_ignores_stray_inputs() {
        let mut tracker = PhaseTracker::new();
        assert_eq!(tracker.handle(PhaseInput::Finished), CommandPhase::Idle);
        assert_eq!(tracker.handle(PhaseInput::Connected), CommandPhase::Idle);
    }
}
