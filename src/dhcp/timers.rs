//! Retransmission backoff and lease timer arming.
//!
//! The retransmission schedule is `client.py`'s
//! `randomized_increasing_backoff`: not RFC-2131-compliant (the RFC
//! prescribes halving of remaining renewal/rebinding time with a 60s
//! floor), but we preserve the source's exponential-backoff behavior — see
//! DESIGN.md's "Open question" entry.

use rand::Rng;
use std::time::Duration;
use tokio::task::JoinHandle;

/// An infinite generator of retransmission delays: starts at `wait_first`,
/// each subsequent delay is drawn uniformly from `[prev, prev * factor]`,
/// capped at `wait_max`.
pub struct Backoff {
    wait_first: f64,
    wait_max: f64,
    factor: f64,
    current: f64,
    started: bool,
}

impl Backoff {
    pub fn new(wait_first: f64, wait_max: f64, factor: f64) -> Self {
        Backoff { wait_first, wait_max, factor, current: wait_first, started: false }
    }

    pub fn standard() -> Self {
        Backoff::new(4.0, 32.0, 2.0)
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if !self.started {
            self.started = true;
            return Some(Duration::from_secs_f64(self.wait_first));
        }
        let upper = (self.current * self.factor).min(self.wait_max);
        let delay = rand::thread_rng().gen_range(self.current..=upper.max(self.current));
        self.current = upper;
        Some(Duration::from_secs_f64(delay))
    }
}

/// Three one-shot lease timer handles (renewal/rebinding/expiration), armed
/// from a lease's derived `*_in` values and cancelled as a group. Mirrors
/// `timers.py`'s `LeaseTimers`.
#[derive(Default)]
pub struct LeaseTimers {
    renewal: Option<JoinHandle<()>>,
    rebinding: Option<JoinHandle<()>>,
    expiration: Option<JoinHandle<()>>,
}

impl LeaseTimers {
    pub fn cancel(&mut self) {
        for handle in [self.renewal.take(), self.rebinding.take(), self.expiration.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }

    /// Arms all three timers that have a finite `*_in` value, invoking the
    /// matching callback when each fires. A timer whose value is `None`
    /// (infinite) or negative (already past due) is skipped, per
    /// `timers.py`'s `arm`.
    pub fn arm(
        &mut self,
        renewal_in: Option<f64>,
        rebinding_in: Option<f64>,
        expiration_in: Option<f64>,
        on_renewal: impl FnOnce() + 'static,
        on_rebinding: impl FnOnce() + 'static,
        on_expiration: impl FnOnce() + 'static,
    ) {
        self.cancel();
        self.renewal = spawn_if_due(renewal_in, on_renewal);
        self.rebinding = spawn_if_due(rebinding_in, on_rebinding);
        self.expiration = spawn_if_due(expiration_in, on_expiration);
    }
}

fn spawn_if_due(seconds: Option<f64>, callback: impl FnOnce() + 'static) -> Option<JoinHandle<()>> {
    let seconds = seconds?;
    if seconds < 0.0 {
        return None;
    }
    Some(tokio::task::spawn_local(async move {
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        callback();
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_starts_at_wait_first() {
        let mut backoff = Backoff::standard();
        assert_eq!(backoff.next(), Some(Duration::from_secs_f64(4.0)));
    }

    #[test]
    fn backoff_never_exceeds_wait_max() {
        let mut backoff = Backoff::standard();
        for _ in 0..50 {
            let delay = backoff.next().unwrap();
            assert!(delay.as_secs_f64() <= 32.0 + 1e-9);
        }
    }

    #[test]
    fn backoff_is_infinite() {
        let backoff = Backoff::standard();
        assert!(backoff.take(1000).count() == 1000);
    }
}
