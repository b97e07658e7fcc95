use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// When the grid gets recomputed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchedulePolicy {
    /// Every frame, whether or not anything moved. Needed for smooth fades.
    #[default]
    Continuous,
    /// Only after camera or pointer changes, coalesced: a new request
    /// replaces the pending one.
    Debounced { delay_ms: u64 },
}

/// Single pending-recompute slot. At most one recompute is ever pending.
#[derive(Clone, Debug)]
pub struct RecomputeScheduler {
    policy: SchedulePolicy,
    pending: Option<Instant>,
}

impl RecomputeScheduler {
    pub fn new(policy: SchedulePolicy) -> Self {
        Self {
            policy,
            pending: None,
        }
    }

    pub fn policy(&self) -> SchedulePolicy {
        self.policy
    }

    /// Something changed; cancel whatever is pending and schedule anew.
    pub fn request_recompute(&mut self, now: Instant) {
        self.pending = Some(match self.policy {
            SchedulePolicy::Continuous => now,
            SchedulePolicy::Debounced { delay_ms } => now + Duration::from_millis(delay_ms),
        });
    }

    /// Schedules a recompute for the very next poll, bypassing the debounce.
    pub fn request_immediate(&mut self, now: Instant) {
        self.pending = Some(now);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Called once per frame. Returns true when a recompute should run now.
    pub fn poll(&mut self, now: Instant) -> bool {
        match (self.policy, self.pending) {
            (SchedulePolicy::Continuous, _) => {
                self.pending = None;
                true
            }
            (SchedulePolicy::Debounced { .. }, Some(due)) if now >= due => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuous_runs_every_frame() {
        let mut s = RecomputeScheduler::new(SchedulePolicy::Continuous);
        let t = Instant::now();
        assert!(s.poll(t));
        assert!(s.poll(t));
    }

    #[test]
    fn debounce_coalesces_requests() {
        let mut s = RecomputeScheduler::new(SchedulePolicy::Debounced { delay_ms: 50 });
        let t0 = Instant::now();
        assert!(!s.poll(t0));

        s.request_recompute(t0);
        s.request_recompute(t0 + Duration::from_millis(30));
        // the first deadline was replaced
        assert!(!s.poll(t0 + Duration::from_millis(60)));
        assert!(s.poll(t0 + Duration::from_millis(80)));
        assert!(!s.poll(t0 + Duration::from_millis(200)));
    }

    #[test]
    fn cancel_drops_pending_work() {
        let mut s = RecomputeScheduler::new(SchedulePolicy::Debounced { delay_ms: 10 });
        let t0 = Instant::now();
        s.request_recompute(t0);
        assert!(s.is_pending());
        s.cancel();
        s.cancel();
        assert!(!s.poll(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn immediate_request_skips_the_delay() {
        let mut s = RecomputeScheduler::new(SchedulePolicy::Debounced { delay_ms: 1000 });
        let t0 = Instant::now();
        s.request_immediate(t0);
        assert!(s.poll(t0));
    }
}
