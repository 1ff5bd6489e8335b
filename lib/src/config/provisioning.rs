//! Provisioning overrides delivered by the carrier's provisioning feed.
//!
//! The key set is closed: signal thresholds for LTE and Wi-Fi, the two ePDG
//! hysteresis timers, and the WFC-roaming toggle. The config manager maps
//! these onto the matching threshold arrays and timer getters.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Closed set of provisioning items the engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningKey {
    /// LTE RSRP threshold 1 (bad).
    LteThreshold1,
    /// LTE RSRP threshold 2 (worst).
    LteThreshold2,
    /// LTE RSRP threshold 3 (good).
    LteThreshold3,
    /// Wi-Fi RSSI threshold A (good).
    WifiThresholdA,
    /// Wi-Fi RSSI threshold B (bad).
    WifiThresholdB,
    /// Hysteresis timer override when guarding toward WWAN, in ms.
    LteEpdgTimer,
    /// Hysteresis timer override when guarding toward WLAN, in ms.
    WifiEpdgTimer,
    /// WFC roaming enabled (non-zero = enabled).
    WfcRoamingEnabled,
}

/// Accumulated provisioning state for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProvisioningInfo {
    values: HashMap<ProvisioningKey, i32>,
}

impl ProvisioningInfo {
    /// Record one provisioning item. Returns true when the stored value
    /// actually changed.
    pub fn set(&mut self, key: ProvisioningKey, value: i32) -> bool {
        self.values.insert(key, value) != Some(value)
    }

    pub fn get(&self, key: ProvisioningKey) -> Option<i32> {
        self.values.get(&key).copied()
    }

    pub fn contains(&self, key: ProvisioningKey) -> bool {
        self.values.contains_key(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The complete LTE RSRP triple as (good, bad, worst), present only
    /// when all three thresholds are provisioned.
    pub fn lte_rsrp_thresholds(&self) -> Option<(i32, i32, i32)> {
        Some((
            self.get(ProvisioningKey::LteThreshold3)?,
            self.get(ProvisioningKey::LteThreshold1)?,
            self.get(ProvisioningKey::LteThreshold2)?,
        ))
    }

    /// The Wi-Fi RSSI pair as (good, bad), present only when both
    /// thresholds are provisioned.
    pub fn wifi_rssi_thresholds(&self) -> Option<(i32, i32)> {
        Some((
            self.get(ProvisioningKey::WifiThresholdA)?,
            self.get(ProvisioningKey::WifiThresholdB)?,
        ))
    }

    pub fn wfc_roaming_enabled(&self) -> Option<bool> {
        self.get(ProvisioningKey::WfcRoamingEnabled).map(|v| v != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_reports_change() {
        let mut info = ProvisioningInfo::default();
        assert!(info.set(ProvisioningKey::LteThreshold1, -115));
        assert!(!info.set(ProvisioningKey::LteThreshold1, -115));
        assert!(info.set(ProvisioningKey::LteThreshold1, -110));
    }

    #[test]
    fn test_lte_triple_requires_all_three() {
        let mut info = ProvisioningInfo::default();
        info.set(ProvisioningKey::LteThreshold1, -115);
        info.set(ProvisioningKey::LteThreshold2, -120);
        assert_eq!(info.lte_rsrp_thresholds(), None);
        info.set(ProvisioningKey::LteThreshold3, -105);
        assert_eq!(info.lte_rsrp_thresholds(), Some((-105, -115, -120)));
    }

    #[test]
    fn test_wifi_pair() {
        let mut info = ProvisioningInfo::default();
        info.set(ProvisioningKey::WifiThresholdA, -65);
        assert_eq!(info.wifi_rssi_thresholds(), None);
        info.set(ProvisioningKey::WifiThresholdB, -80);
        assert_eq!(info.wifi_rssi_thresholds(), Some((-65, -80)));
    }

    #[test]
    fn test_wfc_roaming_flag() {
        let mut info = ProvisioningInfo::default();
        assert_eq!(info.wfc_roaming_enabled(), None);
        info.set(ProvisioningKey::WfcRoamingEnabled, 1);
        assert_eq!(info.wfc_roaming_enabled(), Some(true));
        info.set(ProvisioningKey::WfcRoamingEnabled, 0);
        assert_eq!(info.wfc_roaming_enabled(), Some(false));
    }
}
