//! Decoder lifecycle state machine
//!
//! Owned by the playback worker; only the worker thread mutates it.

use crate::error::{Error, Result};
use bgm_common::PlaybackState;

/// Tracks the decoder lifecycle and rejects illegal transitions
#[derive(Debug, Clone)]
pub struct PlaybackStateMachine {
    state: PlaybackState,
}

impl PlaybackStateMachine {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Idle,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Pause is legal from Started, Paused and Completed
    pub fn can_pause(&self) -> bool {
        matches!(
            self.state,
            PlaybackState::Started | PlaybackState::Paused | PlaybackState::Completed
        )
    }

    /// Start (resume or start-after-prepare) is legal once prepared
    pub fn can_start(&self) -> bool {
        matches!(
            self.state,
            PlaybackState::Prepared
                | PlaybackState::Started
                | PlaybackState::Paused
                | PlaybackState::Completed
        )
    }

    /// False in Error and Ended, where only release and shutdown are honoured
    pub fn accepts_commands(&self) -> bool {
        !matches!(self.state, PlaybackState::Error | PlaybackState::Ended)
    }

    /// Whether `from -> to` is an edge of the lifecycle graph
    pub fn is_allowed(from: PlaybackState, to: PlaybackState) -> bool {
        use PlaybackState as S;

        match (from, to) {
            (S::Ended, _) => false,
            (_, S::Ended) | (_, S::Error) | (_, S::Idle) => true,
            (S::Error, _) => false,
            (S::Idle, S::Initialized) => true,
            (S::Initialized, S::Preparing) => true,
            (S::Preparing, S::Prepared) => true,
            (S::Prepared | S::Started | S::Paused | S::Completed, S::Started) => true,
            (S::Started | S::Paused | S::Completed, S::Paused) => true,
            (S::Started, S::Completed) => true,
            (from, S::Stopped) => from.is_active() || from == S::Stopped,
            _ => false,
        }
    }

    /// Move to `to`, returning the previous state
    ///
    /// On rejection the state is left unchanged.
    pub fn transition(&mut self, to: PlaybackState) -> Result<PlaybackState> {
        let from = self.state;
        if !Self::is_allowed(from, to) {
            return Err(Error::InvalidTransition { from, to });
        }
        self.state = to;
        Ok(from)
    }
}

impl Default for PlaybackStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::PlaybackStateMachine;
    use crate::error::Error;
    use bgm_common::PlaybackState;
    use bgm_common::PlaybackState::{
        Completed, Ended, Idle, Initialized, Paused, Prepared, Preparing, Started, Stopped,
    };

    fn machine_in(path: &[PlaybackState]) -> PlaybackStateMachine {
        let mut machine = PlaybackStateMachine::new();
        for state in path {
            machine.transition(*state).unwrap();
        }
        machine
    }

    #[test]
    fn test_happy_path() {
        let machine = machine_in(&[Initialized, Preparing, Prepared, Started, Paused, Started]);
        assert_eq!(machine.state(), Started);
    }

    #[test]
    fn test_pause_guard() {
        for state in [Idle, Initialized, Preparing, Prepared, Stopped, PlaybackState::Error, Ended] {
            let machine = PlaybackStateMachine { state };
            assert!(!machine.can_pause(), "pause must be illegal from {}", state);
        }
        for state in [Started, Paused, Completed] {
            let machine = PlaybackStateMachine { state };
            assert!(machine.can_pause(), "pause must be legal from {}", state);
        }
    }

    #[test]
    fn test_start_guard() {
        for state in [Idle, Initialized, Preparing, Stopped, PlaybackState::Error, Ended] {
            let machine = PlaybackStateMachine { state };
            assert!(!machine.can_start(), "start must be illegal from {}", state);
        }
        for state in [Prepared, Started, Paused, Completed] {
            let machine = PlaybackStateMachine { state };
            assert!(machine.can_start());
        }
    }

    #[test]
    fn test_rejected_transition_keeps_state() {
        let mut machine = machine_in(&[Initialized]);
        let err = machine.transition(Started).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: Initialized,
                to: Started
            }
        ));
        assert_eq!(machine.state(), Initialized);
    }

    #[test]
    fn test_stop_from_active_states_only() {
        assert!(PlaybackStateMachine::is_allowed(Preparing, Stopped));
        assert!(PlaybackStateMachine::is_allowed(Completed, Stopped));
        assert!(!PlaybackStateMachine::is_allowed(Idle, Stopped));
        assert!(!PlaybackStateMachine::is_allowed(PlaybackState::Error, Stopped));
    }

    #[test]
    fn test_error_only_leaves_through_release() {
        let mut machine = machine_in(&[Initialized, Preparing, PlaybackState::Error]);
        assert!(!machine.accepts_commands());
        assert!(machine.transition(Initialized).is_err());
        assert!(machine.transition(Started).is_err());
        machine.transition(Idle).unwrap();
        assert!(machine.accepts_commands());
    }

    #[test]
    fn test_ended_is_terminal() {
        let mut machine = machine_in(&[Ended]);
        for state in [Idle, Initialized, Started, PlaybackState::Error, Ended] {
            assert!(machine.transition(state).is_err());
        }
        assert_eq!(machine.state(), Ended);
    }
}
