//! Run state machine

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Where a pipeline run is
///
/// `Idle -> Extracting -> Parsing -> Planning -> Provisioning -> Completed`,
/// with `Aborted` reachable from any non-terminal state. `provision` entry
/// points start at `Planning` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Extracting,
    Parsing,
    Planning,
    Provisioning,
    Completed,
    Aborted,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    /// Whether `self -> next` is a legal step
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (from, Aborted) => !from.is_terminal(),
            (Idle, Extracting) | (Extracting, Parsing) | (Parsing, Planning) => true,
            // Provisioning a reviewed tree skips extraction
            (Idle, Planning) => true,
            (Planning, Provisioning) | (Provisioning, Completed) => true,
            // Parsed tree handed back for review
            (Parsing, Completed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Extracting => "extracting",
            Self::Parsing => "parsing",
            Self::Planning => "planning",
            Self::Provisioning => "provisioning",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid run state transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: RunState,
    pub to: RunState,
}

/// Current state plus transition validation
#[derive(Debug, Clone, Default)]
pub struct StateTracker {
    current: RunState,
}

impl StateTracker {
    pub fn current(&self) -> RunState {
        self.current
    }

    pub fn advance(&mut self, next: RunState) -> Result<RunState, InvalidTransition> {
        let from = self.current;
        if !from.can_transition_to(next) {
            debug!(%from, to = %next, "StateTracker::advance: rejected");
            return Err(InvalidTransition { from, to: next });
        }
        debug!(%from, to = %next, "StateTracker::advance");
        self.current = next;
        Ok(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut tracker = StateTracker::default();
        for next in [
            RunState::Extracting,
            RunState::Parsing,
            RunState::Planning,
            RunState::Provisioning,
            RunState::Completed,
        ] {
            tracker.advance(next).unwrap();
        }
        assert_eq!(tracker.current(), RunState::Completed);
    }

    #[test]
    fn test_abort_from_any_live_state() {
        for state in [
            RunState::Idle,
            RunState::Extracting,
            RunState::Parsing,
            RunState::Planning,
            RunState::Provisioning,
        ] {
            assert!(state.can_transition_to(RunState::Aborted), "{state}");
        }
        assert!(!RunState::Completed.can_transition_to(RunState::Aborted));
        assert!(!RunState::Aborted.can_transition_to(RunState::Aborted));
    }

    #[test]
    fn test_rejects_skips_and_reversals() {
        assert!(!RunState::Idle.can_transition_to(RunState::Provisioning));
        assert!(!RunState::Extracting.can_transition_to(RunState::Planning));
        assert!(!RunState::Provisioning.can_transition_to(RunState::Planning));
        assert!(!RunState::Completed.can_transition_to(RunState::Idle));

        let mut tracker = StateTracker::default();
        let err = tracker.advance(RunState::Completed).unwrap_err();
        assert_eq!(err.from, RunState::Idle);
        assert_eq!(tracker.current(), RunState::Idle);
    }
}
