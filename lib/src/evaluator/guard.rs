//! Hysteresis guard timer.
//!
//! Started after a transport transition; while running, the evaluator
//! selects the gap-tightened policy variants, and a would-be transition
//! without an effective gap is deferred to the expiry wakeup.

use std::time::Duration;

use tokio::time::Instant;

use crate::types::GuardingState;

#[derive(Debug)]
pub struct GuardTimer {
    state: GuardingState,
    deadline: Option<Instant>,
}

impl Default for GuardTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardTimer {
    pub fn new() -> Self {
        GuardTimer {
            state: GuardingState::None,
            deadline: None,
        }
    }

    /// Arm the guard. A zero duration disables guarding for this
    /// transition.
    pub fn start(&mut self, duration: Duration, now: Instant) {
        if duration.is_zero() {
            self.cancel();
            return;
        }
        self.state = GuardingState::Running;
        self.deadline = Some(now + duration);
    }

    pub fn cancel(&mut self) {
        self.state = GuardingState::None;
        self.deadline = None;
    }

    pub fn state(&self) -> GuardingState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == GuardingState::Running
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true when the guard just lapsed; the state reads `Expired`
    /// until acknowledged after the follow-up evaluation.
    pub fn on_timer(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(at) if now >= at => {
                self.state = GuardingState::Expired;
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Settle `Expired` back to unguarded once the re-evaluation ran.
    pub fn acknowledge_expiry(&mut self) {
        if self.state == GuardingState::Expired {
            self.state = GuardingState::None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_guard_lifecycle() {
        let mut guard = GuardTimer::new();
        assert_eq!(guard.state(), GuardingState::None);

        let t0 = Instant::now();
        guard.start(Duration::from_millis(10_000), t0);
        assert!(guard.is_running());
        assert_eq!(guard.next_deadline(), Some(t0 + Duration::from_millis(10_000)));

        assert!(!guard.on_timer(t0 + Duration::from_millis(5000)));
        assert!(guard.is_running());

        assert!(guard.on_timer(t0 + Duration::from_millis(10_000)));
        assert_eq!(guard.state(), GuardingState::Expired);
        guard.acknowledge_expiry();
        assert_eq!(guard.state(), GuardingState::None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_disables_guard() {
        let mut guard = GuardTimer::new();
        guard.start(Duration::ZERO, Instant::now());
        assert!(!guard.is_running());
        assert_eq!(guard.next_deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_deadline() {
        let mut guard = GuardTimer::new();
        let t0 = Instant::now();
        guard.start(Duration::from_millis(5000), t0);
        guard.start(Duration::from_millis(20_000), t0);
        assert_eq!(guard.next_deadline(), Some(t0 + Duration::from_millis(20_000)));
    }
}
