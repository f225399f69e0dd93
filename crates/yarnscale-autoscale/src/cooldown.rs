//! Cooldown gate over the persisted scale state.
//!
//! `try_*` never changes state. The timestamp of a direction only moves
//! when an application is committed, and a commit is only made after the
//! policy mutation succeeded.

use tracing::debug;

use yarnscale_core::{Direction, PolicyApplication, ScaleState};
use yarnscale_state::StateStore;

use crate::error::ScaleResult;

pub struct CooldownGate {
    state: StateStore,
    cluster: String,
}

impl CooldownGate {
    pub fn new(state: StateStore, cluster: impl Into<String>) -> Self {
        Self {
            state,
            cluster: cluster.into(),
        }
    }

    /// Whether a scale-out may run at `now`.
    pub fn try_scale_out(&self, now: u64, cooldown_secs: u64) -> ScaleResult<bool> {
        self.try_scale(Direction::Out, now, cooldown_secs)
    }

    /// Whether a scale-in may run at `now`.
    pub fn try_scale_in(&self, now: u64, cooldown_secs: u64) -> ScaleResult<bool> {
        self.try_scale(Direction::In, now, cooldown_secs)
    }

    pub fn try_scale(&self, direction: Direction, now: u64, cooldown_secs: u64) -> ScaleResult<bool> {
        let last = self.state.get_scale_state(&self.cluster)?.last(direction);
        let open = now.saturating_sub(last) >= cooldown_secs;
        if !open {
            debug!(
                cluster = %self.cluster,
                %direction,
                last,
                remaining_secs = cooldown_secs - now.saturating_sub(last),
                "cooldown active"
            );
        }
        Ok(open)
    }

    /// Record a confirmed application: audit entry plus cooldown timestamp.
    pub fn commit(&self, application: &PolicyApplication) -> ScaleResult<ScaleState> {
        Ok(self.state.record_application(&self.cluster, application)?)
    }

    pub fn scale_state(&self) -> ScaleResult<ScaleState> {
        Ok(self.state.get_scale_state(&self.cluster)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> CooldownGate {
        CooldownGate::new(StateStore::open_in_memory().unwrap(), "j-1")
    }

    fn applied(direction: Direction, timestamp: u64) -> PolicyApplication {
        PolicyApplication {
            timestamp,
            direction,
            applied_maximum_units: 400,
        }
    }

    #[test]
    fn open_when_never_scaled() {
        let gate = gate();
        assert!(gate.try_scale_out(1_000, 300).unwrap());
        assert!(gate.try_scale_in(1_000, 300).unwrap());
    }

    #[test]
    fn closed_inside_cooldown_and_try_does_not_commit() {
        let gate = gate();
        gate.commit(&applied(Direction::Out, 1_000)).unwrap();

        for _ in 0..3 {
            assert!(!gate.try_scale_out(1_100, 300).unwrap());
        }
        assert_eq!(gate.scale_state().unwrap().last_scale_out, 1_000);
    }

    #[test]
    fn reopens_exactly_at_cooldown() {
        let gate = gate();
        gate.commit(&applied(Direction::Out, 1_000)).unwrap();
        assert!(!gate.try_scale_out(1_299, 300).unwrap());
        assert!(gate.try_scale_out(1_300, 300).unwrap());
    }

    #[test]
    fn directions_are_independent() {
        let gate = gate();
        gate.commit(&applied(Direction::Out, 1_000)).unwrap();
        assert!(gate.try_scale_in(1_010, 300).unwrap());
    }

    #[test]
    fn clock_behind_last_action_stays_closed() {
        let gate = gate();
        gate.commit(&applied(Direction::In, 2_000)).unwrap();
        assert!(!gate.try_scale_in(1_500, 300).unwrap());
    }
}
