//! DHCP FSM (C9): states, the fixed legal-transition graph, and the
//! cancel-on-transition watchdog cell.
//!
//! States are an `enum_iterator`-derived enum, matching the state-enum
//! style used elsewhere in this crate, retargeted here to a strict
//! state-guard check instead of "run every hook for every state" (see
//! DESIGN.md).

use crate::dhcp::Error;
use enum_iterator::Sequence;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Sequence)]
pub enum State {
    Off,
    Init,
    InitReboot,
    Rebooting,
    Selecting,
    Requesting,
    Bound,
    Renewing,
    Rebinding,
}

impl State {
    /// The 4-bit nibble this state contributes to an outbound xid, matching
    /// `State(IntEnum)`'s ordinals. Only states that actually send a
    /// request-bearing message need a stable encoding; the rest map to 0 and
    /// are never round-tripped through `request_state`.
    pub fn nibble(self) -> u8 {
        match self {
            State::Off => 0,
            State::Init => 1,
            State::InitReboot => 2,
            State::Rebooting => 3,
            State::Requesting => 4,
            State::Selecting => 5,
            State::Bound => 6,
            State::Renewing => 7,
            State::Rebinding => 8,
        }
    }

    pub fn from_nibble(nibble: u8) -> Option<State> {
        enum_iterator::all::<State>().find(|s| s.nibble() == nibble)
    }

    /// The fixed legal-transition graph from spec.md §4.9.
    fn legal_targets(self) -> &'static [State] {
        use State::*;
        match self {
            Off => &[Init, InitReboot],
            InitReboot => &[Rebooting],
            Rebooting => &[Init, Bound],
            Init => &[Selecting],
            Selecting => &[Requesting, Init],
            Requesting => &[Bound, Init],
            Bound => &[Init, Renewing, Rebinding],
            Renewing => &[Bound, Init, Rebinding],
            Rebinding => &[Bound, Init],
        }
    }

    pub fn can_transition_to(self, target: State) -> bool {
        self.legal_targets().contains(&target)
    }
}

/// Owns the current state plus the single active watchdog, cancelling the
/// previous one on every transition. Only `Rebooting` and `Requesting` arm a
/// new watchdog on entry (spec.md §4.9's per-state timeouts).
pub struct StateCell {
    state: State,
    watchdog: Option<JoinHandle<()>>,
}

impl StateCell {
    pub fn new(initial: State) -> Self {
        StateCell { state: initial, watchdog: None }
    }

    pub fn get(&self) -> State {
        self.state
    }

    /// Validates and performs the transition, arming/cancelling watchdogs.
    /// `on_timeout` is spawned (via `tokio::spawn`) if the new state is
    /// watched; it receives nothing and must perform the reset-to-INIT
    /// itself through whatever channel the caller wires up.
    pub fn transition<F>(
        &mut self,
        to: State,
        timeouts: &TimeoutConfig,
        on_timeout: F,
    ) -> Result<(), Error>
    where
        F: FnOnce() + 'static,
    {
        if !self.state.can_transition_to(to) {
            return Err(Error::Transition { from: self.state, to });
        }
        if let Some(handle) = self.watchdog.take() {
            handle.abort();
        }
        self.state = to;
        if let Some(duration) = timeouts.for_state(to) {
            self.watchdog = Some(tokio::task::spawn_local(async move {
                sleep(duration).await;
                on_timeout();
            }));
        }
        Ok(())
    }

    pub fn cancel_watchdog(&mut self) {
        if let Some(handle) = self.watchdog.take() {
            handle.abort();
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TimeoutConfig {
    pub rebooting: Duration,
    pub requesting: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig { rebooting: Duration::from_secs(10), requesting: Duration::from_secs(30) }
    }
}

impl TimeoutConfig {
    fn for_state(&self, state: State) -> Option<Duration> {
        match state {
            State::Rebooting => Some(self.rebooting),
            State::Requesting => Some(self.requesting),
            _ => None,
        }
    }
}

/// The trigger tag a lease-bound hook receives, derived from the xid
/// suffix of the ACK that completed the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Bound,
    Renewed,
    Rebound,
    Expired,
}

impl Trigger {
    pub fn from_completing_state(state: State) -> Option<Trigger> {
        match state {
            State::Requesting | State::Rebooting => Some(Trigger::Bound),
            State::Renewing => Some(Trigger::Renewed),
            State::Rebinding => Some(Trigger::Rebound),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_graph_matches_spec() {
        assert!(State::Off.can_transition_to(State::Init));
        assert!(State::Off.can_transition_to(State::InitReboot));
        assert!(!State::Off.can_transition_to(State::Bound));
        assert!(State::Bound.can_transition_to(State::Renewing));
        assert!(State::Renewing.can_transition_to(State::Rebinding));
        assert!(!State::Rebinding.can_transition_to(State::Renewing));
    }

    #[test]
    fn invalid_transition_is_an_error() {
        let mut cell = StateCell::new(State::Off);
        let result = cell.transition(State::Bound, &TimeoutConfig::default(), || {});
        assert!(matches!(result, Err(Error::Transition { .. })));
        assert_eq!(cell.get(), State::Off);
    }

    #[test]
    fn valid_transition_updates_state() {
        let mut cell = StateCell::new(State::Off);
        cell.transition(State::Init, &TimeoutConfig::default(), || {}).unwrap();
        assert_eq!(cell.get(), State::Init);
    }

    #[test]
    fn trigger_from_state_matches_spec() {
        assert_eq!(Trigger::from_completing_state(State::Requesting), Some(Trigger::Bound));
        assert_eq!(Trigger::from_completing_state(State::Renewing), Some(Trigger::Renewed));
        assert_eq!(Trigger::from_completing_state(State::Rebinding), Some(Trigger::Rebound));
    }
}
