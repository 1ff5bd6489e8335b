//! Process-wide component registry and per-slot lifecycle.
//!
//! Owns the singletons (IWLAN tracker, Wi-Fi quality monitor) and one
//! container of trackers plus five evaluators per active slot. Feed events
//! enter through `dispatch`, which routes each to its owning component;
//! everything downstream of that is the components' own registrant wiring.
//! Cyclic references are avoided by one-way ownership: the container owns
//! trackers and evaluators, cross-links are channel senders torn down on
//! slot removal.

use std::collections::HashMap;
use std::sync::Arc;

use log::{info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::QnsConfigManager;
use crate::config::bundle::ConfigBundle;
use crate::evaluator::{AccessNetworkEvaluator, QualifiedNetworksUpdate};
use crate::event::{
    EventSender, FeedEvent, QnsEvent, RegistrantId, event_channel, run_component,
};
use crate::monitor::cellular::CellularQualityMonitor;
use crate::monitor::wifi::WifiQualityMonitor;
use crate::monitor::{MeasurementUpdate, MonitorDriver};
use crate::tracker::call::CallStatusTracker;
use crate::tracker::cellular::CellularNetworkStatusTracker;
use crate::tracker::ims::QnsImsManager;
use crate::tracker::iwlan::{CountryCodeStore, IwlanNetworkStatusTracker};
use crate::types::{AccessNetwork, NetCapability, SignalMeasurement, SlotId, TransportType};

struct EvaluatorHandle {
    evaluator: Arc<Mutex<AccessNetworkEvaluator>>,
    sender: EventSender<QnsEvent>,
    task: JoinHandle<()>,
}

struct SlotComponents {
    config: Arc<QnsConfigManager>,
    telephony: CellularNetworkStatusTracker,
    ims: QnsImsManager,
    calls: CallStatusTracker,
    cellular_monitor: CellularQualityMonitor,
    cellular_feed: EventSender<MeasurementUpdate>,
    cellular_task: JoinHandle<()>,
    evaluators: HashMap<NetCapability, EvaluatorHandle>,
}

pub struct QnsComponents {
    iwlan_tracker: IwlanNetworkStatusTracker,
    wifi_monitor: WifiQualityMonitor,
    wifi_feed: EventSender<MeasurementUpdate>,
    wifi_task: JoinHandle<()>,
    country_store: Option<Arc<dyn CountryCodeStore>>,
    slots: HashMap<SlotId, SlotComponents>,
}

impl QnsComponents {
    pub fn new(country_store: Option<Arc<dyn CountryCodeStore>>) -> Self {
        let wifi_monitor = WifiQualityMonitor::new();
        let (wifi_feed, wifi_task) = spawn_monitor_driver(wifi_monitor.monitor());
        QnsComponents {
            iwlan_tracker: IwlanNetworkStatusTracker::new(country_store.clone()),
            wifi_monitor,
            wifi_feed,
            wifi_task,
            country_store,
            slots: HashMap::new(),
        }
    }

    /// Bring up the per-slot components and one evaluator per capability.
    /// Idempotent per slot.
    pub async fn register_slot(&mut self, slot: SlotId) {
        if self.slots.contains_key(&slot) {
            return;
        }
        info!("slot {slot}: components starting");
        let config = Arc::new(QnsConfigManager::new(slot));
        let mut telephony = CellularNetworkStatusTracker::new(slot, config.clone());
        let mut ims = QnsImsManager::new(slot, config.clone());
        let mut calls = CallStatusTracker::new(slot);
        let cellular_monitor = CellularQualityMonitor::new(slot);
        let (cellular_feed, cellular_task) = spawn_monitor_driver(cellular_monitor.monitor());
        self.iwlan_tracker.register_slot(slot, config.clone());

        let mut evaluators = HashMap::new();
        for capability in NetCapability::ALL {
            let (sender, rx) = event_channel();
            let evaluator = Arc::new(Mutex::new(AccessNetworkEvaluator::new(
                slot,
                capability,
                config.clone(),
                cellular_monitor.monitor(),
                self.wifi_monitor.monitor(),
                sender.clone(),
            )));
            let task = tokio::spawn(run_component(evaluator.clone(), rx));

            telephony.register(sender.clone());
            ims.register(sender.clone());
            if capability == NetCapability::Eims {
                calls.register_eims(sender.clone());
            } else {
                calls.register_ims(sender.clone());
            }
            self.iwlan_tracker.register_listener(slot, sender.clone());
            config.register_for_config_loaded(sender.clone());
            config.register_for_config_changed(sender.clone());

            evaluators.insert(
                capability,
                EvaluatorHandle {
                    evaluator,
                    sender,
                    task,
                },
            );
        }

        self.slots.insert(
            slot,
            SlotComponents {
                config,
                telephony,
                ims,
                calls,
                cellular_monitor,
                cellular_feed,
                cellular_task,
                evaluators,
            },
        );
    }

    /// Tear the slot down: evaluators close (cancelling timers and
    /// threshold interest), loops stop, tracker state drops. The
    /// process-wide singletons are recreated once the last slot leaves.
    pub async fn unregister_slot(&mut self, slot: SlotId) {
        let Some(components) = self.slots.remove(&slot) else {
            return;
        };
        info!("slot {slot}: components stopping");
        for handle in components.evaluators.values() {
            handle.evaluator.lock().await.close();
        }
        for (_, handle) in components.evaluators {
            handle.task.abort();
            drop(handle.sender);
        }
        components.cellular_task.abort();
        self.iwlan_tracker.unregister_slot(slot);

        if self.slots.is_empty() {
            self.wifi_task.abort();
            let wifi_monitor = WifiQualityMonitor::new();
            let (wifi_feed, wifi_task) = spawn_monitor_driver(wifi_monitor.monitor());
            self.wifi_monitor = wifi_monitor;
            self.wifi_feed = wifi_feed;
            self.wifi_task = wifi_task;
            self.iwlan_tracker = IwlanNetworkStatusTracker::new(self.country_store.clone());
        }
    }

    pub fn active_slots(&self) -> Vec<SlotId> {
        let mut slots: Vec<SlotId> = self.slots.keys().copied().collect();
        slots.sort_unstable();
        slots
    }

    /// Subscribe to qualified-network updates for (slot, capability).
    pub async fn register_qualified_networks_changed(
        &self,
        slot: SlotId,
        capability: NetCapability,
        sender: EventSender<QualifiedNetworksUpdate>,
    ) -> Option<RegistrantId> {
        let handle = self.slots.get(&slot)?.evaluators.get(&capability)?;
        Some(
            handle
                .evaluator
                .lock()
                .await
                .register_qualified_networks_changed(sender),
        )
    }

    pub async fn unregister_qualified_networks_changed(
        &self,
        slot: SlotId,
        capability: NetCapability,
        id: RegistrantId,
    ) {
        if let Some(handle) = self
            .slots
            .get(&slot)
            .and_then(|s| s.evaluators.get(&capability))
        {
            handle
                .evaluator
                .lock()
                .await
                .unregister_qualified_networks_changed(id);
        }
    }

    pub async fn last_qualified_networks(
        &self,
        slot: SlotId,
        capability: NetCapability,
    ) -> Option<crate::types::QualifiedNetworksInfo> {
        let handle = self.slots.get(&slot)?.evaluators.get(&capability)?;
        handle.evaluator.lock().await.last_notified().cloned()
    }

    /// Latest IWLAN availability computed for a slot.
    pub fn last_iwlan_info(&self, slot: SlotId) -> Option<crate::types::IwlanAvailabilityInfo> {
        self.iwlan_tracker.last_info(slot)
    }

    /// Current derived call type for a capability's track.
    pub fn current_call_type(
        &self,
        slot: SlotId,
        capability: NetCapability,
    ) -> Option<crate::types::CallType> {
        self.slots.get(&slot).map(|c| c.calls.call_type(capability))
    }

    pub fn is_emergency_over_ims(&self, slot: SlotId) -> bool {
        self.slots
            .get(&slot)
            .is_some_and(|c| c.calls.is_emergency_over_ims())
    }

    fn post_to_capability(&self, slot: SlotId, capability: NetCapability, event: QnsEvent) {
        if let Some(handle) = self
            .slots
            .get(&slot)
            .and_then(|s| s.evaluators.get(&capability))
        {
            handle.sender.post(event);
        }
    }

    fn post_to_slot(&self, slot: SlotId, event: &QnsEvent) {
        if let Some(components) = self.slots.get(&slot) {
            for handle in components.evaluators.values() {
                handle.sender.post(event.clone());
            }
        }
    }

    fn post_to_all(&self, event: &QnsEvent) {
        for components in self.slots.values() {
            for handle in components.evaluators.values() {
                handle.sender.post(event.clone());
            }
        }
    }

    /// Route one external feed event to its owning component.
    pub async fn dispatch(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::ServiceState { slot, state } => {
                let registered = state.data_registered;
                if let Some(c) = self.slots.get_mut(&slot) {
                    c.telephony.on_service_state(state);
                    if !registered {
                        // deregistration invalidates cellular measurements
                        // and cancels any pending dwell on them
                        for an in [
                            AccessNetwork::Eutran,
                            AccessNetwork::Ngran,
                            AccessNetwork::Utran,
                            AccessNetwork::Geran,
                        ] {
                            c.cellular_monitor.on_signal_lost(an, Instant::now());
                        }
                    }
                }
            }
            FeedEvent::PreciseCallStates { slot, calls } => {
                if let Some(c) = self.slots.get_mut(&slot) {
                    c.calls.on_precise_call_states(calls);
                }
            }
            FeedEvent::SrvccCompleted { slot } => {
                if let Some(c) = self.slots.get_mut(&slot) {
                    c.calls.on_srvcc_completed();
                }
            }
            FeedEvent::DataConnection {
                slot,
                capability,
                transport,
                state,
            } => {
                if let Some(c) = self.slots.get_mut(&slot) {
                    c.calls.on_data_connection(capability, transport, state);
                }
                self.post_to_capability(
                    slot,
                    capability,
                    QnsEvent::DataConnectionChanged { transport, state },
                );
            }
            FeedEvent::Throttle {
                slot,
                capability,
                transport,
                expiry_ms,
            } => {
                self.post_to_capability(
                    slot,
                    capability,
                    QnsEvent::Throttled {
                        transport,
                        expiry_ms,
                    },
                );
            }
            FeedEvent::Unthrottle {
                slot,
                capability,
                transport,
            } => {
                self.post_to_capability(slot, capability, QnsEvent::Unthrottled { transport });
            }
            FeedEvent::DefaultNetworkAvailable {
                transport,
                cellular_sub_id,
            }
            | FeedEvent::DefaultNetworkCapabilities {
                transport,
                cellular_sub_id,
            } => {
                self.iwlan_tracker.on_default_network(transport, cellular_sub_id);
            }
            FeedEvent::DefaultNetworkLinkProperties { has_ipv4, has_ipv6 } => {
                self.iwlan_tracker.on_link_properties(has_ipv4, has_ipv6);
            }
            FeedEvent::DefaultNetworkLost => {
                self.iwlan_tracker.on_default_network_lost();
                self.wifi_feed.post(MeasurementUpdate {
                    access_network: AccessNetwork::Iwlan,
                    measurement: SignalMeasurement::Rssi,
                    value: None,
                });
            }
            FeedEvent::WifiRssi { rssi } => {
                self.wifi_feed.post(MeasurementUpdate {
                    access_network: AccessNetwork::Iwlan,
                    measurement: SignalMeasurement::Rssi,
                    value: Some(rssi),
                });
            }
            FeedEvent::WifiCountryCode { code } => {
                self.iwlan_tracker.on_country_code(&code);
            }
            FeedEvent::WifiToggled { enabled } => {
                self.iwlan_tracker.on_wifi_toggled(enabled);
            }
            FeedEvent::ImsServiceState { slot, available } => {
                if let Some(c) = self.slots.get_mut(&slot) {
                    c.ims.on_ims_state(available);
                }
            }
            FeedEvent::ImsRegistration { slot, state } => {
                if let Some(c) = self.slots.get_mut(&slot) {
                    c.ims.on_registration(state);
                }
            }
            FeedEvent::ImsMmtelCapability {
                slot,
                voice_capable,
            } => {
                if let Some(c) = self.slots.get_mut(&slot) {
                    c.ims.on_mmtel_capability(voice_capable);
                }
            }
            FeedEvent::AirplaneMode { enabled } => {
                self.post_to_all(&QnsEvent::AirplaneModeChanged { enabled });
            }
            FeedEvent::WfcUserSetting { slot, enabled } => {
                if let Some(c) = self.slots.get_mut(&slot) {
                    c.ims.on_wfc_user_setting(enabled);
                }
            }
            FeedEvent::WfcRoamingSetting { slot, enabled } => {
                if let Some(c) = self.slots.get_mut(&slot) {
                    c.ims.on_wfc_roaming_setting(enabled);
                }
            }
            FeedEvent::WfcPlatformSetting { slot, enabled } => {
                if let Some(c) = self.slots.get_mut(&slot) {
                    c.ims.on_wfc_platform_setting(enabled);
                }
            }
            FeedEvent::WfcMode {
                slot,
                roaming,
                mode,
            } => {
                if let Some(c) = self.slots.get_mut(&slot) {
                    c.ims.on_wfc_mode(roaming, mode);
                }
            }
            FeedEvent::CrossSimSetting { slot, enabled } => {
                if let Some(c) = self.slots.get_mut(&slot) {
                    c.ims.on_cross_sim_setting(enabled);
                }
                self.iwlan_tracker.on_cross_sim_setting(slot, enabled);
            }
            FeedEvent::DefaultDataSub { sub_id } => {
                self.iwlan_tracker.on_default_data_sub(sub_id);
            }
            FeedEvent::SlotSubId { slot, sub_id } => {
                self.iwlan_tracker.on_slot_sub_id(slot, sub_id);
            }
            FeedEvent::IwlanRegistered { slot, registered } => {
                self.iwlan_tracker.on_iwlan_registered(slot, registered);
            }
            FeedEvent::CellularSignal {
                slot,
                access_network,
                measurement,
                value,
            } => {
                if let Some(c) = self.slots.get(&slot) {
                    c.cellular_feed.post(MeasurementUpdate {
                        access_network,
                        measurement,
                        value: Some(value),
                    });
                }
            }
            FeedEvent::CarrierConfig {
                slot,
                carrier_id,
                overrides,
            } => {
                if let Some(c) = self.slots.get(&slot) {
                    c.config
                        .update_carrier_config(carrier_id, ConfigBundle::new(overrides));
                } else {
                    warn!("carrier config for unknown slot {slot}");
                }
            }
            FeedEvent::ProvisioningItem { slot, key, value } => {
                if let Some(c) = self.slots.get(&slot)
                    && c.config.update_provisioning_item(key, value)
                {
                    let info = c.config.provisioning();
                    self.post_to_slot(slot, &QnsEvent::ProvisioningChanged(info));
                }
            }
            FeedEvent::RtpLowQuality { slot, capability } => {
                self.post_to_capability(slot, capability, QnsEvent::RtpLowQuality);
            }
            FeedEvent::EmergencyPreferredTransport { slot, transport } => {
                self.post_to_capability(
                    slot,
                    NetCapability::Eims,
                    QnsEvent::EmergencyPreferredTransportChanged { transport },
                );
            }
            FeedEvent::TryWfcConnection { slot } => {
                self.post_to_capability(slot, NetCapability::Ims, QnsEvent::TryWfcConnection);
            }
        }
    }

}

fn spawn_monitor_driver(
    monitor: Arc<crate::monitor::QualityMonitor>,
) -> (EventSender<MeasurementUpdate>, JoinHandle<()>) {
    let (tx, rx) = event_channel();
    let driver = Arc::new(Mutex::new(MonitorDriver::new(monitor)));
    let task = tokio::spawn(run_component(driver, rx));
    (tx, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RawServiceState;
    use crate::types::QualifiedNetworksInfo;
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn drain_update(
        rx: &mut UnboundedReceiver<QualifiedNetworksUpdate>,
    ) -> Option<QualifiedNetworksInfo> {
        // give the evaluator loop a chance to run
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        rx.try_recv().ok().map(|u| u.info)
    }

    fn eutran_service_state() -> RawServiceState {
        RawServiceState {
            data_registered: true,
            data_network_type: AccessNetwork::Eutran,
            voice_network_type: AccessNetwork::Eutran,
            vops_supported: true,
            ..RawServiceState::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_lifecycle() {
        let mut components = QnsComponents::new(None);
        components.register_slot(0).await;
        components.register_slot(0).await; // idempotent
        assert_eq!(components.active_slots(), vec![0]);

        components.unregister_slot(0).await;
        assert!(components.active_slots().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_cellular_emission() {
        let mut components = QnsComponents::new(None);
        components.register_slot(0).await;

        let (tx, mut rx) = event_channel();
        components
            .register_qualified_networks_changed(0, NetCapability::Ims, tx)
            .await
            .unwrap();

        components
            .dispatch(FeedEvent::ServiceState {
                slot: 0,
                state: eutran_service_state(),
            })
            .await;
        // allow the evaluator task to process the fan-out
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let info = drain_update(&mut rx).await.unwrap();
        assert_eq!(info.access_networks, vec![AccessNetwork::Eutran]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_slot_events_ignored() {
        let mut components = QnsComponents::new(None);
        components.register_slot(0).await;
        // must not panic
        components
            .dispatch(FeedEvent::ServiceState {
                slot: 3,
                state: eutran_service_state(),
            })
            .await;
        components
            .dispatch(FeedEvent::WifiRssi { rssi: -60 })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_then_open_first_emission_matches() {
        let mut components = QnsComponents::new(None);
        components.register_slot(0).await;
        let (tx, mut rx) = event_channel();
        components
            .register_qualified_networks_changed(0, NetCapability::Ims, tx)
            .await
            .unwrap();
        components
            .dispatch(FeedEvent::ServiceState {
                slot: 0,
                state: eutran_service_state(),
            })
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let first = drain_update(&mut rx).await.unwrap();

        components.unregister_slot(0).await;
        components.register_slot(0).await;
        let (tx, mut rx) = event_channel();
        components
            .register_qualified_networks_changed(0, NetCapability::Ims, tx)
            .await
            .unwrap();
        components
            .dispatch(FeedEvent::ServiceState {
                slot: 0,
                state: eutran_service_state(),
            })
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let second = drain_update(&mut rx).await.unwrap();
        assert_eq!(first, second);
    }
}
