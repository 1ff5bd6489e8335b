//! Signal quality monitors.
//!
//! A monitor translates evaluator threshold interest into radio threshold
//! registrations and converts threshold crossings back into evaluator
//! events. Three invariants hold: interest replacement per (slot,
//! capability) is atomic; the radio sees only the tightest threshold per
//! measurement (min for rove-in, max for rove-out); and a crossing
//! notifies exactly the registrants whose full threshold set currently
//! matches. A threshold with a positive wait time is reported only after
//! the signal has satisfied it continuously for that long (backhaul
//! dwell); leaving the range cancels the pending report.

pub mod cellular;
pub mod wifi;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::debug;
use tokio::time::Instant;

use crate::event::{EventComponent, EventSender, QnsEvent};
use crate::types::{
    AccessNetwork, MatchKind, NetCapability, SignalMeasurement, SlotId, Threshold,
};

/// Latest observed value per (access network, measurement).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignalSnapshot {
    values: HashMap<(AccessNetwork, SignalMeasurement), i32>,
}

impl SignalSnapshot {
    /// Record a measurement; returns true when the stored value changed.
    pub fn set(
        &mut self,
        access_network: AccessNetwork,
        measurement: SignalMeasurement,
        value: i32,
    ) -> bool {
        self.values.insert((access_network, measurement), value) != Some(value)
    }

    pub fn get(
        &self,
        access_network: AccessNetwork,
        measurement: SignalMeasurement,
    ) -> Option<i32> {
        self.values.get(&(access_network, measurement)).copied()
    }

    /// Drop all measurements for one access network (signal lost).
    pub fn clear_access_network(&mut self, access_network: AccessNetwork) {
        self.values.retain(|(an, _), _| *an != access_network);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThresholdState {
    Unmatched,
    /// Instantaneously matching since `since`; reported once the dwell
    /// elapses.
    Dwelling { since: Instant },
    Satisfied,
}

#[derive(Debug)]
struct ThresholdTracker {
    threshold: Threshold,
    state: ThresholdState,
}

impl ThresholdTracker {
    fn new(threshold: Threshold) -> Self {
        ThresholdTracker {
            threshold,
            state: ThresholdState::Unmatched,
        }
    }

    /// Advance the state machine for the current measurement. Returns true
    /// when the state changed.
    fn update(&mut self, measured: Option<i32>, now: Instant) -> bool {
        let matching = measured.is_some_and(|v| self.threshold.matches(v));
        let next = match (self.state, matching) {
            (_, false) => ThresholdState::Unmatched,
            (ThresholdState::Unmatched, true) => {
                if self.threshold.wait_ms == 0 {
                    ThresholdState::Satisfied
                } else {
                    ThresholdState::Dwelling { since: now }
                }
            }
            (ThresholdState::Dwelling { since }, true) => {
                if now.duration_since(since)
                    >= Duration::from_millis(u64::from(self.threshold.wait_ms))
                {
                    ThresholdState::Satisfied
                } else {
                    ThresholdState::Dwelling { since }
                }
            }
            (ThresholdState::Satisfied, true) => ThresholdState::Satisfied,
        };
        let changed = next != self.state;
        self.state = next;
        changed
    }

    fn deadline(&self) -> Option<Instant> {
        match self.state {
            ThresholdState::Dwelling { since } => {
                Some(since + Duration::from_millis(u64::from(self.threshold.wait_ms)))
            }
            _ => None,
        }
    }
}

struct InterestEntry {
    /// Threshold groups: the entry matches when any group is fully
    /// satisfied, mirroring the policy-group semantics upstream.
    groups: Vec<Vec<ThresholdTracker>>,
    sender: EventSender<QnsEvent>,
    /// Whether the last notification reported this entry as matched; a
    /// notification fires only on the edge into the matched state.
    reported_matched: bool,
}

impl InterestEntry {
    fn matched(&self) -> bool {
        self.groups.iter().any(|g| {
            !g.is_empty() && g.iter().all(|t| t.state == ThresholdState::Satisfied)
        })
    }

    fn trackers(&self) -> impl Iterator<Item = &ThresholdTracker> {
        self.groups.iter().flatten()
    }

    fn trackers_mut(&mut self) -> impl Iterator<Item = &mut ThresholdTracker> {
        self.groups.iter_mut().flatten()
    }
}

/// Which evaluator event a monitor emits on a crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorKind {
    Cellular,
    Wifi,
}

struct Registry {
    snapshot: SignalSnapshot,
    entries: HashMap<(SlotId, NetCapability), InterestEntry>,
}

/// Shared threshold registry. Interest mutation comes from evaluator
/// threads, measurements from the monitor loop; the mutex is never held
/// across an await.
pub struct QualityMonitor {
    kind: MonitorKind,
    inner: Mutex<Registry>,
}

impl QualityMonitor {
    pub fn new(kind: MonitorKind) -> Arc<Self> {
        Arc::new(QualityMonitor {
            kind,
            inner: Mutex::new(Registry {
                snapshot: SignalSnapshot::default(),
                entries: HashMap::new(),
            }),
        })
    }

    pub fn kind(&self) -> MonitorKind {
        self.kind
    }

    /// Atomically replace the threshold interest for (slot, capability)
    /// with a set of groups (any fully-satisfied group reports a match).
    /// Dwell state carries over for thresholds present in both the old and
    /// new sets, so a re-registration never restarts a running backhaul
    /// timer. An empty set clears the registration.
    pub fn update_thresholds_for_net_capability(
        &self,
        capability: NetCapability,
        slot: SlotId,
        groups: Vec<Vec<Threshold>>,
        sender: EventSender<QnsEvent>,
    ) {
        let mut inner = self.inner.lock().unwrap();
        let previous = inner.entries.remove(&(slot, capability));
        let groups: Vec<Vec<Threshold>> =
            groups.into_iter().filter(|g| !g.is_empty()).collect();
        if groups.is_empty() {
            return;
        }
        let now = Instant::now();
        let mut tracker_groups: Vec<Vec<ThresholdTracker>> = groups
            .into_iter()
            .map(|g| g.into_iter().map(ThresholdTracker::new).collect())
            .collect();
        for tracker in tracker_groups.iter_mut().flatten() {
            let carried = previous.as_ref().and_then(|entry| {
                entry
                    .trackers()
                    .find(|t| t.threshold == tracker.threshold)
                    .map(|t| t.state)
            });
            match carried {
                Some(state) => tracker.state = state,
                None => {
                    let measured = inner.snapshot.get(
                        tracker.threshold.access_network,
                        tracker.threshold.measurement,
                    );
                    tracker.update(measured, now);
                }
            }
        }
        let mut entry = InterestEntry {
            groups: tracker_groups,
            sender,
            reported_matched: false,
        };
        entry.reported_matched = entry.matched();
        inner.entries.insert((slot, capability), entry);
    }

    pub fn clear_thresholds(&self, capability: NetCapability, slot: SlotId) {
        self.inner.lock().unwrap().entries.remove(&(slot, capability));
    }

    /// Record a measurement and notify every registrant whose full
    /// threshold set just became satisfied.
    pub fn on_measurement(
        &self,
        access_network: AccessNetwork,
        measurement: SignalMeasurement,
        value: i32,
        now: Instant,
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner.snapshot.set(access_network, measurement, value);
        self.advance(&mut inner, now);
    }

    /// Signal lost on an access network: every threshold on it reverts to
    /// unmatched and pending dwells are cancelled.
    pub fn on_signal_lost(&self, access_network: AccessNetwork, now: Instant) {
        let mut inner = self.inner.lock().unwrap();
        inner.snapshot.clear_access_network(access_network);
        self.advance(&mut inner, now);
    }

    /// Advance dwell timers; called by the monitor loop at `next_deadline`.
    pub fn on_timer(&self, now: Instant) {
        let mut inner = self.inner.lock().unwrap();
        self.advance(&mut inner, now);
    }

    fn advance(&self, inner: &mut Registry, now: Instant) {
        let snapshot = inner.snapshot.clone();
        let mut notifications: Vec<EventSender<QnsEvent>> = Vec::new();
        for entry in inner.entries.values_mut() {
            for tracker in entry.trackers_mut() {
                let measured = snapshot
                    .get(tracker.threshold.access_network, tracker.threshold.measurement);
                tracker.update(measured, now);
            }
            let matched = entry.matched();
            if matched && !entry.reported_matched {
                notifications.push(entry.sender.clone());
            }
            entry.reported_matched = matched;
        }
        if notifications.is_empty() {
            return;
        }
        let event = match self.kind {
            MonitorKind::Cellular => QnsEvent::CellularQualityChanged(snapshot.clone()),
            MonitorKind::Wifi => QnsEvent::WifiQualityChanged {
                rssi: snapshot.get(AccessNetwork::Iwlan, SignalMeasurement::Rssi),
            },
        };
        debug!(
            "{:?} monitor: {} registrant(s) crossed into match",
            self.kind,
            notifications.len()
        );
        for sender in notifications {
            sender.post(event.clone());
        }
    }

    /// Earliest pending dwell deadline across all registrations.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .values()
            .flat_map(|e| e.trackers().filter_map(ThresholdTracker::deadline).collect::<Vec<_>>())
            .min()
    }

    /// Whether a registered threshold has fully satisfied its dwell.
    pub fn threshold_satisfied(
        &self,
        capability: NetCapability,
        slot: SlotId,
        threshold: &Threshold,
    ) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .get(&(slot, capability))
            .and_then(|e| {
                e.trackers()
                    .find(|t| t.threshold == *threshold)
                    .map(|t| t.state == ThresholdState::Satisfied)
            })
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> SignalSnapshot {
        self.inner.lock().unwrap().snapshot.clone()
    }

    /// The thresholds actually registered with the radio: the union of all
    /// interest collapsed to the tightest value per (access network,
    /// measurement, direction). Rove-in (at-least) takes the minimum,
    /// rove-out (at-most) the maximum.
    pub fn radio_thresholds(&self) -> Vec<Threshold> {
        let inner = self.inner.lock().unwrap();
        let mut tightest: HashMap<(AccessNetwork, SignalMeasurement, MatchKind), i32> =
            HashMap::new();
        for entry in inner.entries.values() {
            for tracker in entry.trackers() {
                let t = &tracker.threshold;
                let key = (t.access_network, t.measurement, t.match_kind);
                tightest
                    .entry(key)
                    .and_modify(|v| {
                        *v = match t.match_kind {
                            MatchKind::AtLeast => (*v).min(t.value),
                            MatchKind::AtMost => (*v).max(t.value),
                        }
                    })
                    .or_insert(t.value);
            }
        }
        let mut thresholds: Vec<Threshold> = tightest
            .into_iter()
            .map(|((an, meas, kind), value)| Threshold::new(an, meas, value, kind, 0))
            .collect();
        thresholds.sort_by_key(|t| (t.access_network, t.measurement, t.value));
        thresholds
    }
}

/// One raw measurement from a signal feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementUpdate {
    pub access_network: AccessNetwork,
    pub measurement: SignalMeasurement,
    pub value: Option<i32>,
}

/// Event-loop driver for a shared monitor: measurements arrive on the
/// component queue, dwell deadlines wake the loop.
pub struct MonitorDriver {
    monitor: Arc<QualityMonitor>,
}

impl MonitorDriver {
    pub fn new(monitor: Arc<QualityMonitor>) -> Self {
        MonitorDriver { monitor }
    }
}

impl EventComponent for MonitorDriver {
    type Event = MeasurementUpdate;

    fn on_event(&mut self, event: MeasurementUpdate) {
        let now = Instant::now();
        match event.value {
            Some(value) => self.monitor.on_measurement(
                event.access_network,
                event.measurement,
                value,
                now,
            ),
            None => self.monitor.on_signal_lost(event.access_network, now),
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.monitor.next_deadline()
    }

    fn on_timer(&mut self, now: Instant) {
        self.monitor.on_timer(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::event_channel;

    fn rssi_threshold(value: i32, wait_ms: u32) -> Threshold {
        Threshold::new(
            AccessNetwork::Iwlan,
            SignalMeasurement::Rssi,
            value,
            MatchKind::AtLeast,
            wait_ms,
        )
    }

    fn rsrp_threshold(value: i32, kind: MatchKind) -> Threshold {
        Threshold::new(AccessNetwork::Eutran, SignalMeasurement::Rsrp, value, kind, 0)
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_threshold_notifies_on_crossing() {
        let monitor = QualityMonitor::new(MonitorKind::Cellular);
        let (tx, mut rx) = event_channel();
        monitor.update_thresholds_for_net_capability(
            NetCapability::Ims,
            0,
            vec![vec![rsrp_threshold(-115, MatchKind::AtMost)]],
            tx,
        );

        monitor.on_measurement(
            AccessNetwork::Eutran,
            SignalMeasurement::Rsrp,
            -110,
            Instant::now(),
        );
        assert!(rx.try_recv().is_err());

        monitor.on_measurement(
            AccessNetwork::Eutran,
            SignalMeasurement::Rsrp,
            -118,
            Instant::now(),
        );
        assert!(matches!(
            rx.try_recv(),
            Ok(QnsEvent::CellularQualityChanged(_))
        ));
        // staying in range does not re-notify
        monitor.on_measurement(
            AccessNetwork::Eutran,
            SignalMeasurement::Rsrp,
            -119,
            Instant::now(),
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backhaul_dwell_delays_report() {
        let monitor = QualityMonitor::new(MonitorKind::Wifi);
        let (tx, mut rx) = event_channel();
        monitor.update_thresholds_for_net_capability(
            NetCapability::Ims,
            0,
            vec![vec![rssi_threshold(-65, 3000)]],
            tx,
        );

        let t0 = Instant::now();
        monitor.on_measurement(AccessNetwork::Iwlan, SignalMeasurement::Rssi, -60, t0);
        assert!(rx.try_recv().is_err());
        let threshold = rssi_threshold(-65, 3000);
        assert!(!monitor.threshold_satisfied(NetCapability::Ims, 0, &threshold));

        // dwell completes at t0 + 3000ms
        assert_eq!(
            monitor.next_deadline(),
            Some(t0 + Duration::from_millis(3000))
        );
        monitor.on_timer(t0 + Duration::from_millis(3000));
        assert!(matches!(
            rx.try_recv(),
            Ok(QnsEvent::WifiQualityChanged { rssi: Some(-60) })
        ));
        assert!(monitor.threshold_satisfied(NetCapability::Ims, 0, &threshold));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dwell_cancelled_when_signal_leaves_range() {
        let monitor = QualityMonitor::new(MonitorKind::Wifi);
        let (tx, mut rx) = event_channel();
        monitor.update_thresholds_for_net_capability(
            NetCapability::Ims,
            0,
            vec![vec![rssi_threshold(-65, 3000)]],
            tx,
        );

        let t0 = Instant::now();
        monitor.on_measurement(AccessNetwork::Iwlan, SignalMeasurement::Rssi, -60, t0);
        // drops out of range before the dwell elapses
        monitor.on_measurement(
            AccessNetwork::Iwlan,
            SignalMeasurement::Rssi,
            -70,
            t0 + Duration::from_millis(2000),
        );
        assert_eq!(monitor.next_deadline(), None);
        monitor.on_timer(t0 + Duration::from_millis(3000));
        assert!(rx.try_recv().is_err());

        // re-entering restarts the dwell from scratch
        let t1 = t0 + Duration::from_millis(4000);
        monitor.on_measurement(AccessNetwork::Iwlan, SignalMeasurement::Rssi, -61, t1);
        monitor.on_timer(t1 + Duration::from_millis(2999));
        assert!(rx.try_recv().is_err());
        monitor.on_timer(t1 + Duration::from_millis(3000));
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_atomic_replacement_per_capability() {
        let monitor = QualityMonitor::new(MonitorKind::Cellular);
        let (tx, _rx) = event_channel();
        monitor.update_thresholds_for_net_capability(
            NetCapability::Ims,
            0,
            vec![vec![rsrp_threshold(-115, MatchKind::AtMost)]],
            tx.clone(),
        );
        monitor.update_thresholds_for_net_capability(
            NetCapability::Ims,
            0,
            vec![vec![rsrp_threshold(-100, MatchKind::AtLeast)]],
            tx,
        );
        let radio = monitor.radio_thresholds();
        assert_eq!(radio.len(), 1);
        assert_eq!(radio[0].value, -100);
        assert_eq!(radio[0].match_kind, MatchKind::AtLeast);
    }

    #[tokio::test(start_paused = true)]
    async fn test_radio_sees_tightest_of_union() {
        let monitor = QualityMonitor::new(MonitorKind::Cellular);
        let (tx, _rx) = event_channel();
        monitor.update_thresholds_for_net_capability(
            NetCapability::Ims,
            0,
            vec![
                vec![rsrp_threshold(-110, MatchKind::AtMost)],
                vec![rsrp_threshold(-98, MatchKind::AtLeast)],
            ],
            tx.clone(),
        );
        monitor.update_thresholds_for_net_capability(
            NetCapability::Mms,
            0,
            vec![
                vec![rsrp_threshold(-118, MatchKind::AtMost)],
                vec![rsrp_threshold(-105, MatchKind::AtLeast)],
            ],
            tx,
        );
        let radio = monitor.radio_thresholds();
        // rove-in (at-least): min(-98, -105) = -105
        // rove-out (at-most): max(-110, -118) = -110
        let at_least = radio
            .iter()
            .find(|t| t.match_kind == MatchKind::AtLeast)
            .unwrap();
        let at_most = radio
            .iter()
            .find(|t| t.match_kind == MatchKind::AtMost)
            .unwrap();
        assert_eq!(at_least.value, -105);
        assert_eq!(at_most.value, -110);
    }

    #[tokio::test(start_paused = true)]
    async fn test_crossing_notifies_only_matching_registrants() {
        let monitor = QualityMonitor::new(MonitorKind::Cellular);
        let (tx_a, mut rx_a) = event_channel();
        let (tx_b, mut rx_b) = event_channel();
        monitor.update_thresholds_for_net_capability(
            NetCapability::Ims,
            0,
            vec![vec![rsrp_threshold(-115, MatchKind::AtMost)]],
            tx_a,
        );
        monitor.update_thresholds_for_net_capability(
            NetCapability::Mms,
            0,
            vec![vec![rsrp_threshold(-125, MatchKind::AtMost)]],
            tx_b,
        );

        monitor.on_measurement(
            AccessNetwork::Eutran,
            SignalMeasurement::Rsrp,
            -118,
            Instant::now(),
        );
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_lost_resets_trackers() {
        let monitor = QualityMonitor::new(MonitorKind::Cellular);
        let (tx, mut rx) = event_channel();
        monitor.update_thresholds_for_net_capability(
            NetCapability::Ims,
            0,
            vec![vec![rsrp_threshold(-115, MatchKind::AtMost)]],
            tx,
        );
        monitor.on_measurement(
            AccessNetwork::Eutran,
            SignalMeasurement::Rsrp,
            -118,
            Instant::now(),
        );
        assert!(rx.try_recv().is_ok());

        monitor.on_signal_lost(AccessNetwork::Eutran, Instant::now());
        let threshold = rsrp_threshold(-115, MatchKind::AtMost);
        assert!(!monitor.threshold_satisfied(NetCapability::Ims, 0, &threshold));

        // crossing again after loss re-notifies
        monitor.on_measurement(
            AccessNetwork::Eutran,
            SignalMeasurement::Rsrp,
            -120,
            Instant::now(),
        );
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacement_preserves_running_dwell() {
        let monitor = QualityMonitor::new(MonitorKind::Wifi);
        let (tx, mut rx) = event_channel();
        monitor.update_thresholds_for_net_capability(
            NetCapability::Ims,
            0,
            vec![vec![rssi_threshold(-65, 3000)]],
            tx.clone(),
        );
        let t0 = Instant::now();
        monitor.on_measurement(AccessNetwork::Iwlan, SignalMeasurement::Rssi, -60, t0);

        // re-registration mid-dwell keeps the original start time
        tokio::time::advance(Duration::from_millis(1000)).await;
        monitor.update_thresholds_for_net_capability(
            NetCapability::Ims,
            0,
            vec![vec![rssi_threshold(-65, 3000)]],
            tx,
        );
        assert_eq!(
            monitor.next_deadline(),
            Some(t0 + Duration::from_millis(3000))
        );
        monitor.on_timer(t0 + Duration::from_millis(3000));
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_thresholds_removes_interest() {
        let monitor = QualityMonitor::new(MonitorKind::Wifi);
        let (tx, mut rx) = event_channel();
        monitor.update_thresholds_for_net_capability(
            NetCapability::Ims,
            0,
            vec![vec![rssi_threshold(-65, 0)]],
            tx,
        );
        monitor.clear_thresholds(NetCapability::Ims, 0);
        monitor.on_measurement(
            AccessNetwork::Iwlan,
            SignalMeasurement::Rssi,
            -50,
            Instant::now(),
        );
        assert!(rx.try_recv().is_err());
        assert!(monitor.radio_thresholds().is_empty());
    }
}
