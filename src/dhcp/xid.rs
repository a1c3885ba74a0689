//! Transaction ID scheme: a 28-bit random prefix plus a 4-bit suffix
//! encoding the FSM state the message was sent in. Ported verbatim from
//! `xids.py`'s `Xid` class.

use crate::dhcp::fsm::State;
use rand::Rng;

const STATE_MASK: u32 = 0xF;
const RANDOM_MASK: u32 = !STATE_MASK;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Xid(u32);

impl Xid {
    /// A fresh random xid with a state nibble of 0 (the caller should
    /// immediately call [`Xid::for_state`] before using it to send).
    pub fn random() -> Self {
        let value = rand::thread_rng().gen_range(0x0000_0010..=0xFFFF_FFF0);
        Xid(value)
    }

    pub fn from_raw(value: u32) -> Self {
        Xid(value)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn random_part(self) -> u32 {
        self.0 & RANDOM_MASK
    }

    /// The state the request carrying this xid was sent in, if the low
    /// nibble decodes to a known state.
    pub fn request_state(self) -> Option<State> {
        State::from_nibble((self.0 & STATE_MASK) as u8)
    }

    /// A new xid built from this one's random part plus `state`'s nibble.
    pub fn for_state(self, state: State) -> Xid {
        Xid(self.random_part() | state.nibble() as u32)
    }

    /// Loose match: whether the random parts agree, ignoring the state
    /// suffix — used to check a reply answers a request we sent.
    pub fn matches(self, received: Xid) -> bool {
        self.random_part() == received.random_part()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_state_preserves_random_part() {
        let xid = Xid::from_raw(0xABCDE010);
        let requesting = xid.for_state(State::Requesting);
        assert_eq!(requesting.random_part(), xid.random_part());
        assert_eq!(requesting.request_state(), Some(State::Requesting));
    }

    #[test]
    fn matches_ignores_state_nibble() {
        let a = Xid::from_raw(0x12345671);
        let b = Xid::from_raw(0x12345676);
        assert!(a.matches(b));
    }

    #[test]
    fn random_is_within_reserved_bounds() {
        for _ in 0..100 {
            let xid = Xid::random();
            assert!(xid.raw() >= 0x10 && xid.raw() <= 0xFFFF_FFF0);
        }
    }
}
