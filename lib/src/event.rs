//! Typed events and per-component work queues.
//!
//! Every component owns a single-threaded event loop: state lives behind an
//! async mutex, events arrive on an unbounded channel and are processed in
//! arrival order, and timer wakeups are folded into the same loop so a
//! component never races itself. Cross-component calls are message posts
//! carrying immutable values.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;

use crate::config::provisioning::{ProvisioningInfo, ProvisioningKey};
use crate::monitor::SignalSnapshot;
use crate::tracker::ims::WfcSettings;
use crate::types::{
    AccessNetwork, CallState, CallType, DataConnectionState, ImsRegistrationState,
    IwlanAvailabilityInfo, NetCapability, PreferenceMode, QnsTelephonyInfo, RoamingType, SlotId,
    TransportType,
};

/// Sending half of a component work queue. Posting never blocks; a post to
/// a closed component is dropped silently (close-in-progress semantics).
#[derive(Debug)]
pub struct EventSender<E> {
    tx: mpsc::UnboundedSender<E>,
}

impl<E> Clone for EventSender<E> {
    fn clone(&self) -> Self {
        EventSender {
            tx: self.tx.clone(),
        }
    }
}

impl<E> EventSender<E> {
    pub fn post(&self, event: E) {
        if self.tx.send(event).is_err() {
            debug!("event dropped: component loop closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a component work queue.
pub fn event_channel<E>() -> (EventSender<E>, mpsc::UnboundedReceiver<E>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, rx)
}

/// A component drivable by [`run_component`]: events mutate state, and the
/// loop wakes the component at `next_deadline` for its pending timers.
pub trait EventComponent: Send {
    type Event: Send;

    fn on_event(&mut self, event: Self::Event);

    /// Earliest pending timer, if any. Re-queried after every event.
    fn next_deadline(&self) -> Option<Instant> {
        None
    }

    /// Called when `next_deadline` elapses.
    fn on_timer(&mut self, _now: Instant) {}
}

/// Drive a component until its channel closes. All state transitions happen
/// under the component mutex, serialized with timer wakeups.
pub async fn run_component<C: EventComponent>(
    component: Arc<Mutex<C>>,
    mut rx: mpsc::UnboundedReceiver<C::Event>,
) {
    loop {
        let deadline = component.lock().await.next_deadline();
        let event = match deadline {
            Some(at) => {
                tokio::select! {
                    ev = rx.recv() => ev,
                    _ = tokio::time::sleep_until(at) => {
                        let mut c = component.lock().await;
                        c.on_timer(Instant::now());
                        continue;
                    }
                }
            }
            None => rx.recv().await,
        };
        match event {
            Some(ev) => component.lock().await.on_event(ev),
            None => break,
        }
    }
}

static NEXT_REGISTRANT_ID: AtomicU32 = AtomicU32::new(1);

/// Opaque handle identifying one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrantId(u32);

/// Listener list for one component. Mutated only on the owning loop;
/// notification fans out over a snapshot so a listener that re-registers
/// from its callback cannot corrupt the iteration. Senders whose receiving
/// loop has closed are pruned on the next notify.
pub struct Registrants<T> {
    entries: Vec<(RegistrantId, EventSender<T>)>,
}

impl<T> Default for Registrants<T> {
    fn default() -> Self {
        Registrants {
            entries: Vec::new(),
        }
    }
}

impl<T: Clone> Registrants<T> {
    pub fn register(&mut self, sender: EventSender<T>) -> RegistrantId {
        let id = RegistrantId(NEXT_REGISTRANT_ID.fetch_add(1, Ordering::Relaxed));
        self.entries.push((id, sender));
        id
    }

    pub fn unregister(&mut self, id: RegistrantId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub fn notify_all(&mut self, value: &T) {
        self.entries.retain(|(_, sender)| !sender.is_closed());
        let snapshot: Vec<EventSender<T>> =
            self.entries.iter().map(|(_, s)| s.clone()).collect();
        for sender in snapshot {
            sender.post(value.clone());
        }
    }

    pub fn notify_one(&self, id: RegistrantId, value: &T) {
        if let Some((_, sender)) = self.entries.iter().find(|(entry_id, _)| *entry_id == id) {
            sender.post(value.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Inputs the access network evaluator consumes. Trackers and monitors
/// normalize raw feed data into these values; the evaluator recomputes from
/// the latest observed value of every input, so delivery order across
/// components does not matter.
#[derive(Debug, Clone)]
pub enum QnsEvent {
    IwlanAvailabilityChanged(IwlanAvailabilityInfo),
    TelephonyInfoChanged(QnsTelephonyInfo),
    CellularQualityChanged(SignalSnapshot),
    WifiQualityChanged { rssi: Option<i32> },
    CallTypeChanged {
        call_type: CallType,
        emergency_over_ims: bool,
    },
    ImsRegistrationChanged(ImsRegistrationState),
    WfcSettingsChanged(WfcSettings),
    AirplaneModeChanged { enabled: bool },
    ProvisioningChanged(ProvisioningInfo),
    EmergencyPreferredTransportChanged { transport: Option<TransportType> },
    DataConnectionChanged {
        transport: TransportType,
        state: DataConnectionState,
    },
    Throttled {
        transport: TransportType,
        expiry_ms: Option<u64>,
    },
    Unthrottled { transport: TransportType },
    RtpLowQuality,
    TryWfcConnection,
    /// Carrier policy reloaded; `policy_changed` distinguishes a full
    /// carrier-id reload from a content-equal refresh.
    ConfigUpdated { policy_changed: bool },
    Rebuild,
}

/// Raw per-slot service state as delivered by the telephony feed, before
/// the cellular tracker filters and classifies it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawServiceState {
    pub data_registered: bool,
    pub data_network_type: AccessNetwork,
    pub voice_network_type: AccessNetwork,
    pub roaming_type: RoamingType,
    pub registered_plmn: Option<String>,
    pub vops_supported: bool,
    pub emergency_service_supported: bool,
    pub emergency_fallback_supported: bool,
    pub voice_barred: bool,
    pub emergency_barred: bool,
}

/// External feed surface. Every asynchronous source the core subscribes to
/// enters through exactly one of these variants; the slot router in
/// `components` dispatches them to the owning tracker. Serializable so the
/// daemon can replay scripted feeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedEvent {
    // telephony feed
    ServiceState {
        slot: SlotId,
        state: RawServiceState,
    },
    PreciseCallStates {
        slot: SlotId,
        calls: Vec<CallState>,
    },
    SrvccCompleted {
        slot: SlotId,
    },
    DataConnection {
        slot: SlotId,
        capability: NetCapability,
        transport: TransportType,
        state: DataConnectionState,
    },
    Throttle {
        slot: SlotId,
        capability: NetCapability,
        transport: TransportType,
        expiry_ms: Option<u64>,
    },
    Unthrottle {
        slot: SlotId,
        capability: NetCapability,
        transport: TransportType,
    },
    // connectivity feed (default-network callbacks)
    DefaultNetworkAvailable {
        transport: TransportType,
        cellular_sub_id: Option<i32>,
    },
    DefaultNetworkCapabilities {
        transport: TransportType,
        cellular_sub_id: Option<i32>,
    },
    DefaultNetworkLinkProperties {
        has_ipv4: bool,
        has_ipv6: bool,
    },
    DefaultNetworkLost,
    // wifi feed
    WifiRssi {
        rssi: i32,
    },
    WifiCountryCode {
        code: String,
    },
    WifiToggled {
        enabled: bool,
    },
    // ims feed
    ImsServiceState {
        slot: SlotId,
        available: bool,
    },
    ImsRegistration {
        slot: SlotId,
        state: ImsRegistrationState,
    },
    ImsMmtelCapability {
        slot: SlotId,
        voice_capable: bool,
    },
    // user / platform settings
    AirplaneMode {
        enabled: bool,
    },
    WfcUserSetting {
        slot: SlotId,
        enabled: bool,
    },
    WfcRoamingSetting {
        slot: SlotId,
        enabled: bool,
    },
    WfcPlatformSetting {
        slot: SlotId,
        enabled: bool,
    },
    WfcMode {
        slot: SlotId,
        roaming: bool,
        mode: PreferenceMode,
    },
    CrossSimSetting {
        slot: SlotId,
        enabled: bool,
    },
    DefaultDataSub {
        sub_id: Option<i32>,
    },
    SlotSubId {
        slot: SlotId,
        sub_id: Option<i32>,
    },
    IwlanRegistered {
        slot: SlotId,
        registered: bool,
    },
    // signal quality feeds
    CellularSignal {
        slot: SlotId,
        access_network: AccessNetwork,
        measurement: crate::types::SignalMeasurement,
        value: i32,
    },
    // carrier config feed
    CarrierConfig {
        slot: SlotId,
        carrier_id: i32,
        overrides: std::collections::HashMap<String, crate::config::bundle::ConfigValue>,
    },
    // provisioning feed
    ProvisioningItem {
        slot: SlotId,
        key: ProvisioningKey,
        value: i32,
    },
    // alternative event feed
    RtpLowQuality {
        slot: SlotId,
        capability: NetCapability,
    },
    EmergencyPreferredTransport {
        slot: SlotId,
        transport: Option<TransportType>,
    },
    TryWfcConnection {
        slot: SlotId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registrants_register_unregister() {
        let mut registrants: Registrants<u32> = Registrants::default();
        let (tx, mut rx) = event_channel();
        let id = registrants.register(tx);
        assert_eq!(registrants.len(), 1);

        registrants.notify_all(&7);
        assert_eq!(rx.try_recv(), Ok(7));

        assert!(registrants.unregister(id));
        assert!(!registrants.unregister(id));
        assert!(registrants.is_empty());
    }

    #[test]
    fn test_registrants_prune_closed() {
        let mut registrants: Registrants<u32> = Registrants::default();
        let (tx, rx) = event_channel();
        registrants.register(tx);
        drop(rx);
        registrants.notify_all(&1);
        assert!(registrants.is_empty());
    }

    #[test]
    fn test_notify_one_targets_single_registrant() {
        let mut registrants: Registrants<u32> = Registrants::default();
        let (tx_a, mut rx_a) = event_channel();
        let (tx_b, mut rx_b) = event_channel();
        let id_a = registrants.register(tx_a);
        let _id_b = registrants.register(tx_b);

        registrants.notify_one(id_a, &42);
        assert_eq!(rx_a.try_recv(), Ok(42));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_component_processes_in_order_and_fires_timer() {
        use std::time::Duration;

        struct Counter {
            seen: Vec<u32>,
            deadline: Option<Instant>,
            timer_fired: bool,
        }
        impl EventComponent for Counter {
            type Event = u32;
            fn on_event(&mut self, event: u32) {
                self.seen.push(event);
                if event == 2 {
                    self.deadline = Some(Instant::now() + Duration::from_millis(100));
                }
            }
            fn next_deadline(&self) -> Option<Instant> {
                self.deadline
            }
            fn on_timer(&mut self, _now: Instant) {
                self.deadline = None;
                self.timer_fired = true;
            }
        }

        let component = Arc::new(Mutex::new(Counter {
            seen: Vec::new(),
            deadline: None,
            timer_fired: false,
        }));
        let (tx, rx) = event_channel();
        let handle = tokio::spawn(run_component(component.clone(), rx));

        tx.post(1);
        tx.post(2);
        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(tx);
        handle.await.unwrap();

        let c = component.lock().await;
        assert_eq!(c.seen, vec![1, 2]);
        assert!(c.timer_fired);
    }

    #[test]
    fn test_post_to_closed_loop_is_dropped() {
        let (tx, rx) = event_channel::<u32>();
        drop(rx);
        // must not panic
        tx.post(5);
        assert!(tx.is_closed());
    }
}
