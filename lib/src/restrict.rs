//! Per-transport restriction timers.
//!
//! Each evaluator owns one restrict manager scoped to its capability. A
//! transport is restricted while any reason-tagged timer is active;
//! expiries surface through `next_deadline`/`on_timer` on the evaluator
//! loop so a lapsed restriction immediately triggers re-evaluation.

use std::collections::HashMap;
use std::time::Duration;

use log::info;
use tokio::time::Instant;

use crate::types::{InitialConnectionFailureRule, NetCapability, SlotId, TransportType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestrictReason {
    WifiBackhaulProblem,
    RtpLowQuality,
    Throttled,
    InitialConnectionFail,
    ImsUnregisteredFallback,
}

#[derive(Debug, Clone, Copy)]
enum Expiry {
    At(Instant),
    /// Held until an explicit release (e.g. throttle without expiry).
    UntilReleased,
}

#[derive(Debug, Default)]
struct FailureCounter {
    consecutive_failures: u32,
    fallbacks: u32,
}

pub struct RestrictManager {
    slot: SlotId,
    capability: NetCapability,
    timers: HashMap<(TransportType, RestrictReason), Expiry>,
    failure_counters: HashMap<TransportType, FailureCounter>,
}

impl RestrictManager {
    pub fn new(slot: SlotId, capability: NetCapability) -> Self {
        RestrictManager {
            slot,
            capability,
            timers: HashMap::new(),
            failure_counters: HashMap::new(),
        }
    }

    /// Restrict a transport. `duration` of `None` holds the restriction
    /// until `release`.
    pub fn restrict(
        &mut self,
        transport: TransportType,
        reason: RestrictReason,
        duration: Option<Duration>,
        now: Instant,
    ) {
        let expiry = match duration {
            Some(d) => Expiry::At(now + d),
            None => Expiry::UntilReleased,
        };
        info!(
            "slot {} {}: restrict {transport:?} reason={reason:?} for {duration:?}",
            self.slot, self.capability
        );
        self.timers.insert((transport, reason), expiry);
    }

    /// Release one restriction; returns true when it was present.
    pub fn release(&mut self, transport: TransportType, reason: RestrictReason) -> bool {
        let removed = self.timers.remove(&(transport, reason)).is_some();
        if removed {
            info!(
                "slot {} {}: release {transport:?} reason={reason:?}",
                self.slot, self.capability
            );
        }
        removed
    }

    pub fn is_restricted(&self, transport: TransportType, now: Instant) -> bool {
        self.timers.iter().any(|(&(t, _), expiry)| {
            t == transport
                && match expiry {
                    Expiry::At(at) => *at > now,
                    Expiry::UntilReleased => true,
                }
        })
    }

    pub fn has_restriction(&self, transport: TransportType, reason: RestrictReason) -> bool {
        self.timers.contains_key(&(transport, reason))
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers
            .values()
            .filter_map(|expiry| match expiry {
                Expiry::At(at) => Some(*at),
                Expiry::UntilReleased => None,
            })
            .min()
    }

    /// Drop expired timers; returns true when any restriction lapsed.
    pub fn on_timer(&mut self, now: Instant) -> bool {
        let before = self.timers.len();
        self.timers.retain(|_, expiry| match expiry {
            Expiry::At(at) => *at > now,
            Expiry::UntilReleased => true,
        });
        before != self.timers.len()
    }

    pub fn clear(&mut self) {
        self.timers.clear();
        self.failure_counters.clear();
    }

    /// Count an initial data-connection failure against the carrier's
    /// retry budget; once exhausted, restrict the transport for the
    /// configured guard time (bounded by the max fallback count).
    pub fn on_initial_connection_failed(
        &mut self,
        transport: TransportType,
        rule: &InitialConnectionFailureRule,
        now: Instant,
    ) {
        let counter = self.failure_counters.entry(transport).or_default();
        counter.consecutive_failures += 1;
        if counter.consecutive_failures < rule.retry_count {
            return;
        }
        if counter.fallbacks >= rule.max_fallback_count {
            info!(
                "slot {} {}: fallback budget exhausted for {transport:?}",
                self.slot, self.capability
            );
            return;
        }
        counter.consecutive_failures = 0;
        counter.fallbacks += 1;
        self.restrict(
            transport,
            RestrictReason::InitialConnectionFail,
            Some(Duration::from_millis(rule.fallback_guard_timer_ms)),
            now,
        );
    }

    /// A successful connection resets the failure accounting and lifts the
    /// initial-failure restriction.
    pub fn on_connection_established(&mut self, transport: TransportType) {
        self.failure_counters.remove(&transport);
        self.release(transport, RestrictReason::InitialConnectionFail);
    }
}
