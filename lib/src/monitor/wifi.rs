//! Process-wide Wi-Fi quality monitor.
//!
//! One instance serves every slot; interest is keyed by (slot,
//! capability). RSSI reaches the monitor on two paths the host folds into
//! one feed: the connectivity capabilities callback (scoped to the current
//! tightest signal-strength registration) and the RSSI-changed broadcast.

use std::sync::Arc;

use tokio::time::Instant;

use super::{MonitorKind, QualityMonitor};
use crate::types::{AccessNetwork, MatchKind, SignalMeasurement};

pub struct WifiQualityMonitor {
    monitor: Arc<QualityMonitor>,
}

impl Default for WifiQualityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl WifiQualityMonitor {
    pub fn new() -> Self {
        WifiQualityMonitor {
            monitor: QualityMonitor::new(MonitorKind::Wifi),
        }
    }

    pub fn monitor(&self) -> Arc<QualityMonitor> {
        self.monitor.clone()
    }

    pub fn on_rssi_changed(&self, rssi: i32, now: Instant) {
        self.monitor
            .on_measurement(AccessNetwork::Iwlan, SignalMeasurement::Rssi, rssi, now);
    }

    /// Wi-Fi left the default network; pending dwells are cancelled.
    pub fn on_wifi_lost(&self, now: Instant) {
        self.monitor.on_signal_lost(AccessNetwork::Iwlan, now);
    }

    /// The RSSI the capabilities-changed callback is currently scoped to:
    /// the tightest rove-in registration, if any.
    pub fn callback_rssi_threshold(&self) -> Option<i32> {
        self.monitor
            .radio_thresholds()
            .into_iter()
            .find(|t| {
                t.access_network == AccessNetwork::Iwlan
                    && t.measurement == SignalMeasurement::Rssi
                    && t.match_kind == MatchKind::AtLeast
            })
            .map(|t| t.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{QnsEvent, event_channel};
    use crate::types::{NetCapability, Threshold};

    #[tokio::test(start_paused = true)]
    async fn test_rssi_crossing_notifies_per_slot_interest() {
        let wifi = WifiQualityMonitor::new();
        let (tx0, mut rx0) = event_channel();
        let (tx1, mut rx1) = event_channel();
        wifi.monitor().update_thresholds_for_net_capability(
            NetCapability::Ims,
            0,
            vec![vec![Threshold::new(
                AccessNetwork::Iwlan,
                SignalMeasurement::Rssi,
                -65,
                MatchKind::AtLeast,
                0,
            )]],
            tx0,
        );
        wifi.monitor().update_thresholds_for_net_capability(
            NetCapability::Ims,
            1,
            vec![vec![Threshold::new(
                AccessNetwork::Iwlan,
                SignalMeasurement::Rssi,
                -55,
                MatchKind::AtLeast,
                0,
            )]],
            tx1,
        );

        wifi.on_rssi_changed(-60, Instant::now());
        assert!(matches!(
            rx0.try_recv(),
            Ok(QnsEvent::WifiQualityChanged { rssi: Some(-60) })
        ));
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_threshold_tracks_tightest_rove_in() {
        let wifi = WifiQualityMonitor::new();
        assert_eq!(wifi.callback_rssi_threshold(), None);
        let (tx, _rx) = event_channel();
        wifi.monitor().update_thresholds_for_net_capability(
            NetCapability::Ims,
            0,
            vec![vec![Threshold::new(
                AccessNetwork::Iwlan,
                SignalMeasurement::Rssi,
                -65,
                MatchKind::AtLeast,
                0,
            )]],
            tx.clone(),
        );
        wifi.monitor().update_thresholds_for_net_capability(
            NetCapability::Mms,
            0,
            vec![vec![Threshold::new(
                AccessNetwork::Iwlan,
                SignalMeasurement::Rssi,
                -70,
                MatchKind::AtLeast,
                0,
            )]],
            tx,
        );
        assert_eq!(wifi.callback_rssi_threshold(), Some(-70));
    }
}
