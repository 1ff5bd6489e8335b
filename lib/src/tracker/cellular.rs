//! Cellular network status tracker.
//!
//! Filters the raw telephony feed into `QnsTelephonyInfo`: coverage is
//! classified from the serving PLMN, the reported roaming type, and the
//! carrier's domestic/international PLMN lists; identical consecutive
//! states are dropped before they reach the evaluators.

use std::sync::Arc;

use log::info;

use crate::config::QnsConfigManager;
use crate::event::{EventSender, QnsEvent, RawServiceState, RegistrantId, Registrants};
use crate::types::{AccessNetwork, Coverage, QnsTelephonyInfo, RoamingType, SlotId};

pub struct CellularNetworkStatusTracker {
    slot: SlotId,
    config: Arc<QnsConfigManager>,
    last: Option<QnsTelephonyInfo>,
    registrants: Registrants<QnsEvent>,
}

impl CellularNetworkStatusTracker {
    pub fn new(slot: SlotId, config: Arc<QnsConfigManager>) -> Self {
        CellularNetworkStatusTracker {
            slot,
            config,
            last: None,
            registrants: Registrants::default(),
        }
    }

    /// Register for filtered telephony updates; the current state is
    /// delivered synchronously when one exists.
    pub fn register(&mut self, sender: EventSender<QnsEvent>) -> RegistrantId {
        let id = self.registrants.register(sender);
        if let Some(info) = &self.last {
            self.registrants
                .notify_one(id, &QnsEvent::TelephonyInfoChanged(info.clone()));
        }
        id
    }

    pub fn unregister(&mut self, id: RegistrantId) {
        self.registrants.unregister(id);
    }

    pub fn current(&self) -> Option<&QnsTelephonyInfo> {
        self.last.as_ref()
    }

    pub fn on_service_state(&mut self, raw: RawServiceState) {
        let coverage = self.classify_coverage(&raw);
        let info = QnsTelephonyInfo {
            cellular_available: raw.data_registered
                && raw.data_network_type != AccessNetwork::Unknown,
            data_registered: raw.data_registered,
            coverage,
            roaming: coverage == Coverage::Roam,
            data_network_type: raw.data_network_type,
            voice_network_type: raw.voice_network_type,
            registered_plmn: raw.registered_plmn,
            vops_supported: raw.vops_supported,
            emergency_service_supported: raw.emergency_service_supported,
            emergency_fallback_supported: raw.emergency_fallback_supported,
            voice_barred: raw.voice_barred,
            emergency_barred: raw.emergency_barred,
        };
        if self.last.as_ref() == Some(&info) {
            return;
        }
        info!(
            "slot {}: telephony {:?} coverage={coverage:?} vops={}",
            self.slot, info.data_network_type, info.vops_supported
        );
        self.last = Some(info.clone());
        self.registrants
            .notify_all(&QnsEvent::TelephonyInfoChanged(info));
    }

    /// HOME/ROAM after carrier PLMN overrides: a PLMN on the domestic list
    /// is home coverage even when the network flags roaming; a PLMN on the
    /// international list is roam coverage regardless of the flag.
    fn classify_coverage(&self, raw: &RawServiceState) -> Coverage {
        if let Some(plmn) = &raw.registered_plmn {
            if plmn_listed(&self.config.international_roaming_plmns(), plmn) {
                return Coverage::Roam;
            }
            if plmn_listed(&self.config.domestic_roaming_plmns(), plmn) {
                return Coverage::Home;
            }
        }
        match raw.roaming_type {
            RoamingType::NotRoaming | RoamingType::Domestic => Coverage::Home,
            RoamingType::International => Coverage::Roam,
        }
    }
}

/// An entry matches either the full MCCMNC or, for a 3-digit entry, the
/// MCC prefix.
fn plmn_listed(list: &[String], plmn: &str) -> bool {
    list.iter()
        .any(|entry| entry == plmn || (entry.len() == 3 && plmn.starts_with(entry.as_str())))
}
