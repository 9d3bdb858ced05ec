//! Per-target health state machine.
//!
//! A single failure only makes a target `suspicious` and shortens its polling
//! interval; a second consecutive failure confirms it `down`. Only confirmed
//! edges raise alerts.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alert::AlertKind;

/// Divisor applied to the configured interval while a failure is being confirmed
pub const SUSPICIOUS_INTERVAL_DIVISOR: u32 = 5;

/// Lower bound of the confirmation interval
pub const MIN_CONFIRMATION_INTERVAL: Duration = Duration::from_secs(60);

/// Fixed interval while a target is down
pub const RECOVERY_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    #[default]
    Normal,
    Suspicious,
    Down,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthState::Normal => write!(f, "normal"),
            HealthState::Suspicious => write!(f, "suspicious"),
            HealthState::Down => write!(f, "down"),
        }
    }
}

impl HealthState {
    /// State after observing one check result
    pub fn next(self, healthy: bool) -> Self {
        match (self, healthy) {
            (_, true) => HealthState::Normal,
            (HealthState::Normal, false) => HealthState::Suspicious,
            (HealthState::Suspicious, false) | (HealthState::Down, false) => HealthState::Down,
        }
    }

    /// Delay until the next probe while in this state
    pub fn poll_interval(self, configured: Duration) -> Duration {
        match self {
            HealthState::Normal => configured,
            HealthState::Suspicious => {
                (configured / SUSPICIOUS_INTERVAL_DIVISOR).max(MIN_CONFIRMATION_INTERVAL)
            }
            HealthState::Down => RECOVERY_POLL_INTERVAL,
        }
    }
}

/// One step of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: HealthState,
    pub to: HealthState,
    pub alert: Option<AlertKind>,
}

impl Transition {
    pub fn evaluate(from: HealthState, healthy: bool) -> Self {
        let to = from.next(healthy);
        Self { from, to, alert: alert_for(from, to) }
    }

    pub fn is_change(&self) -> bool {
        self.from != self.to
    }
}

/// Alert raised by an edge: failure on suspicious -> down, recovery on down -> normal.
pub fn alert_for(from: HealthState, to: HealthState) -> Option<AlertKind> {
    match (from, to) {
        (HealthState::Suspicious, HealthState::Down) => Some(AlertKind::Failure),
        (HealthState::Down, HealthState::Normal) => Some(AlertKind::Recovery),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_transition_table() {
        assert_eq!(HealthState::Normal.next(true), HealthState::Normal);
        assert_eq!(HealthState::Suspicious.next(true), HealthState::Normal);
        assert_eq!(HealthState::Down.next(true), HealthState::Normal);
        assert_eq!(HealthState::Normal.next(false), HealthState::Suspicious);
        assert_eq!(HealthState::Suspicious.next(false), HealthState::Down);
        assert_eq!(HealthState::Down.next(false), HealthState::Down);
    }

    #[test]
    fn test_poll_intervals() {
        let ten_minutes = Duration::from_secs(600);
        assert_eq!(HealthState::Normal.poll_interval(ten_minutes), ten_minutes);
        assert_eq!(HealthState::Suspicious.poll_interval(ten_minutes), Duration::from_secs(120));
        assert_eq!(HealthState::Down.poll_interval(ten_minutes), Duration::from_secs(60));

        // Short intervals are floored at one minute while confirming
        let two_minutes = Duration::from_secs(120);
        assert_eq!(HealthState::Suspicious.poll_interval(two_minutes), Duration::from_secs(60));
        // Down ignores the configured interval entirely
        assert_eq!(HealthState::Down.poll_interval(Duration::from_secs(30)), Duration::from_secs(60));
    }

    #[test]
    fn test_alert_edges() {
        let steps = [false, false, false, true, true];
        let mut state = HealthState::Normal;
        let mut alerts = Vec::new();
        for healthy in steps {
            let transition = Transition::evaluate(state, healthy);
            alerts.extend(transition.alert);
            state = transition.to;
        }
        assert_eq!(alerts, vec![AlertKind::Failure, AlertKind::Recovery]);
    }

    #[test]
    fn test_no_alert_on_first_failure() {
        let transition = Transition::evaluate(HealthState::Normal, false);
        assert!(transition.is_change());
        assert_eq!(transition.alert, None);

        let recovered = Transition::evaluate(HealthState::Suspicious, true);
        assert!(recovered.is_change());
        assert_eq!(recovered.alert, None);
    }

    proptest! {
        #[test]
        fn down_is_always_preceded_by_suspicious(results in proptest::collection::vec(any::<bool>(), 0..64)) {
            let mut state = HealthState::Normal;
            for healthy in results {
                let next = state.next(healthy);
                if next == HealthState::Down && state != HealthState::Down {
                    prop_assert_eq!(state, HealthState::Suspicious);
                }
                state = next;
            }
        }

        #[test]
        fn alerts_alternate_starting_with_failure(results in proptest::collection::vec(any::<bool>(), 0..64)) {
            let mut state = HealthState::Normal;
            let mut last = None;
            for healthy in results {
                let transition = Transition::evaluate(state, healthy);
                if let Some(kind) = transition.alert {
                    match last {
                        None => prop_assert_eq!(kind, AlertKind::Failure),
                        Some(previous) => prop_assert_ne!(kind, previous),
                    }
                    last = Some(kind);
                }
                state = transition.to;
            }
        }
    }
}
