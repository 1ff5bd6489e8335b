//! IWLAN network status tracker.
//!
//! Process-wide singleton with per-slot state. Folds the connectivity
//! feed (default-network callbacks), the Wi-Fi toggle, link protocol, the
//! connected-DDS subscription (cross-SIM), and the per-slot IWLAN
//! registration flag into one `IwlanAvailabilityInfo` per slot, emitted
//! only when it changes. Turning Wi-Fi calling or cross-SIM off marks the
//! emission with `notify_iwlan_disabled` so downstream tears the WLAN
//! connection down instead of keeping it around for handover.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};

use crate::config::QnsConfigManager;
use crate::event::{EventSender, QnsEvent, RegistrantId, Registrants};
use crate::types::{IwlanAvailabilityInfo, LinkProtocol, SlotId, TransportType};

/// Persistence hook for the last-known Wi-Fi country code. The host owns
/// the storage; the tracker only pushes upper-cased codes through it.
pub trait CountryCodeStore: Send + Sync {
    fn save(&self, code: &str);
    fn load(&self) -> Option<String>;
}

struct SlotState {
    config: Arc<QnsConfigManager>,
    sub_id: Option<i32>,
    iwlan_registered: bool,
    cross_sim_enabled: bool,
    last: Option<IwlanAvailabilityInfo>,
    registrants: Registrants<QnsEvent>,
}

pub struct IwlanNetworkStatusTracker {
    wifi_available: bool,
    wifi_enabled: bool,
    link_protocol: LinkProtocol,
    connected_dds_sub: Option<i32>,
    default_data_sub: Option<i32>,
    country_code: Option<String>,
    country_store: Option<Arc<dyn CountryCodeStore>>,
    slots: HashMap<SlotId, SlotState>,
}

impl IwlanNetworkStatusTracker {
    pub fn new(country_store: Option<Arc<dyn CountryCodeStore>>) -> Self {
        let country_code = country_store.as_ref().and_then(|s| s.load());
        IwlanNetworkStatusTracker {
            wifi_available: false,
            wifi_enabled: true,
            link_protocol: LinkProtocol::Unknown,
            connected_dds_sub: None,
            default_data_sub: None,
            country_code,
            country_store,
            slots: HashMap::new(),
        }
    }

    pub fn register_slot(&mut self, slot: SlotId, config: Arc<QnsConfigManager>) {
        self.slots.entry(slot).or_insert_with(|| SlotState {
            config,
            sub_id: None,
            iwlan_registered: false,
            cross_sim_enabled: false,
            last: None,
            registrants: Registrants::default(),
        });
    }

    pub fn unregister_slot(&mut self, slot: SlotId) {
        self.slots.remove(&slot);
    }

    pub fn has_slots(&self) -> bool {
        !self.slots.is_empty()
    }

    /// Register for availability updates on one slot; the current value is
    /// delivered synchronously when one was computed.
    pub fn register_listener(
        &mut self,
        slot: SlotId,
        sender: EventSender<QnsEvent>,
    ) -> Option<RegistrantId> {
        let state = self.slots.get_mut(&slot)?;
        let id = state.registrants.register(sender);
        if let Some(info) = state.last {
            state
                .registrants
                .notify_one(id, &QnsEvent::IwlanAvailabilityChanged(info));
        }
        Some(id)
    }

    pub fn unregister_listener(&mut self, slot: SlotId, id: RegistrantId) {
        if let Some(state) = self.slots.get_mut(&slot) {
            state.registrants.unregister(id);
        }
    }

    pub fn country_code(&self) -> Option<&str> {
        self.country_code.as_deref()
    }

    pub fn last_info(&self, slot: SlotId) -> Option<IwlanAvailabilityInfo> {
        self.slots.get(&slot).and_then(|s| s.last)
    }

    /// Default network came up or changed capabilities. A Wi-Fi default
    /// network makes Wi-Fi available; a cellular default network carries
    /// the connected-DDS subscription (possibly VCN-wrapped, in which case
    /// the host extracts the sub id from the transport info).
    pub fn on_default_network(&mut self, transport: TransportType, cellular_sub_id: Option<i32>) {
        match transport {
            TransportType::Wlan => {
                self.wifi_available = true;
                self.connected_dds_sub = None;
            }
            TransportType::Wwan => {
                self.wifi_available = false;
                self.link_protocol = LinkProtocol::Unknown;
                self.connected_dds_sub = cellular_sub_id;
            }
            TransportType::Invalid => {}
        }
        self.recompute_all(false);
    }

    pub fn on_default_network_lost(&mut self) {
        self.wifi_available = false;
        self.link_protocol = LinkProtocol::Unknown;
        self.connected_dds_sub = None;
        self.recompute_all(false);
    }

    /// Link addresses on the Wi-Fi default network changed; an IPv6-only
    /// link can block IWLAN per carrier config.
    pub fn on_link_properties(&mut self, has_ipv4: bool, has_ipv6: bool) {
        self.link_protocol = LinkProtocol::classify(has_ipv4, has_ipv6);
        // switching to an ipv6-only link while blocked is a tear-down case
        self.recompute_all(true);
    }

    pub fn on_wifi_toggled(&mut self, enabled: bool) {
        if self.wifi_enabled == enabled {
            return;
        }
        info!("wifi toggled {}", if enabled { "on" } else { "off" });
        self.wifi_enabled = enabled;
        self.recompute_all(!enabled);
    }

    pub fn on_country_code(&mut self, code: &str) {
        let upper = code.to_uppercase();
        if self.country_code.as_deref() == Some(upper.as_str()) {
            return;
        }
        info!("wifi country code {upper}");
        if let Some(store) = &self.country_store {
            store.save(&upper);
        }
        self.country_code = Some(upper);
    }

    pub fn on_default_data_sub(&mut self, sub_id: Option<i32>) {
        self.default_data_sub = sub_id;
        self.recompute_all(false);
    }

    pub fn on_slot_sub_id(&mut self, slot: SlotId, sub_id: Option<i32>) {
        if let Some(state) = self.slots.get_mut(&slot) {
            state.sub_id = sub_id;
        }
        self.recompute(slot, false);
    }

    pub fn on_iwlan_registered(&mut self, slot: SlotId, registered: bool) {
        if let Some(state) = self.slots.get_mut(&slot) {
            state.iwlan_registered = registered;
        }
        self.recompute(slot, false);
    }

    pub fn on_cross_sim_setting(&mut self, slot: SlotId, enabled: bool) {
        let was_enabled = match self.slots.get_mut(&slot) {
            Some(state) => {
                let was = state.cross_sim_enabled;
                state.cross_sim_enabled = enabled;
                was
            }
            None => return,
        };
        self.recompute(slot, was_enabled && !enabled);
    }

    /// Cross-SIM path: enabled for the slot, the slot is not the default
    /// data sub, its sub differs from the connected DDS, and a valid
    /// connected DDS exists.
    fn cross_sim_condition(&self, state: &SlotState) -> bool {
        let Some(connected) = self.connected_dds_sub else {
            return false;
        };
        state.cross_sim_enabled
            && state.sub_id != self.default_data_sub
            && state.sub_id != Some(connected)
    }

    fn compute(&self, state: &SlotState) -> IwlanAvailabilityInfo {
        let ipv6_blocked = state.config.block_ipv6_only_wifi()
            && self.link_protocol == LinkProtocol::Ipv6;
        let wifi_path = self.wifi_enabled
            && self.wifi_available
            && !ipv6_blocked
            && state.iwlan_registered;
        let cross_path = self.cross_sim_condition(state) && state.iwlan_registered;
        IwlanAvailabilityInfo {
            iwlan_available: wifi_path || cross_path,
            is_cross_wfc: !wifi_path && cross_path,
            notify_iwlan_disabled: false,
        }
    }

    fn recompute_all(&mut self, teardown: bool) {
        let slots: Vec<SlotId> = self.slots.keys().copied().collect();
        for slot in slots {
            self.recompute(slot, teardown);
        }
    }

    fn recompute(&mut self, slot: SlotId, teardown: bool) {
        let (mut info, last_seen) = match self.slots.get(&slot) {
            Some(state) => (self.compute(state), state.last),
            None => return,
        };
        let last = last_seen.unwrap_or_default();
        let mut emit = last_seen.is_none() || !info.same_availability(&last);
        if teardown && last.iwlan_available && !info.iwlan_available {
            info.notify_iwlan_disabled = true;
            emit = true;
        }
        if !emit {
            return;
        }
        debug!(
            "slot {slot}: iwlan available={} cross_wfc={} teardown={}",
            info.iwlan_available, info.is_cross_wfc, info.notify_iwlan_disabled
        );
        if let Some(state) = self.slots.get_mut(&slot) {
            state.last = Some(info);
            state
                .registrants
                .notify_all(&QnsEvent::IwlanAvailabilityChanged(info));
        }
    }
}
