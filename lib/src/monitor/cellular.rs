//! Per-slot cellular quality monitor.
//!
//! Wraps the shared registry with the cellular measurement surface: the
//! telephony feed reports per-access-network measurements (RSRP/RSRQ/RSSNR
//! for EUTRAN, the SS trio for NGRAN, RSCP/ECNO for UTRAN, RSSI for
//! GERAN), and registrations toward the radio are re-derived whenever
//! evaluator interest changes.

use std::sync::Arc;

use log::debug;
use tokio::time::Instant;

use super::{MonitorKind, QualityMonitor};
use crate::types::{AccessNetwork, SignalMeasurement, SlotId, Threshold};

pub struct CellularQualityMonitor {
    slot: SlotId,
    monitor: Arc<QualityMonitor>,
}

impl CellularQualityMonitor {
    pub fn new(slot: SlotId) -> Self {
        CellularQualityMonitor {
            slot,
            monitor: QualityMonitor::new(MonitorKind::Cellular),
        }
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Shared registry handle for evaluator registration and the loop
    /// driver.
    pub fn monitor(&self) -> Arc<QualityMonitor> {
        self.monitor.clone()
    }

    pub fn on_signal(
        &self,
        access_network: AccessNetwork,
        measurement: SignalMeasurement,
        value: i32,
        now: Instant,
    ) {
        if access_network == AccessNetwork::Iwlan {
            debug!(
                "slot {}: ignoring iwlan measurement on the cellular monitor",
                self.slot
            );
            return;
        }
        self.monitor
            .on_measurement(access_network, measurement, value, now);
    }

    pub fn on_signal_lost(&self, access_network: AccessNetwork, now: Instant) {
        self.monitor.on_signal_lost(access_network, now);
    }

    /// Signal-threshold callbacks currently registered with the radio, per
    /// measurement type and access network.
    pub fn radio_registrations(&self) -> Vec<Threshold> {
        self.monitor.radio_thresholds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::event_channel;
    use crate::types::{MatchKind, NetCapability};

    #[tokio::test(start_paused = true)]
    async fn test_iwlan_measurements_are_ignored() {
        let cellular = CellularQualityMonitor::new(0);
        let (tx, mut rx) = event_channel();
        cellular.monitor().update_thresholds_for_net_capability(
            NetCapability::Ims,
            0,
            vec![vec![Threshold::new(
                AccessNetwork::Iwlan,
                SignalMeasurement::Rssi,
                -65,
                MatchKind::AtLeast,
                0,
            )]],
            tx,
        );
        cellular.on_signal(
            AccessNetwork::Iwlan,
            SignalMeasurement::Rssi,
            -50,
            Instant::now(),
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwards_cellular_measurements() {
        let cellular = CellularQualityMonitor::new(1);
        let (tx, mut rx) = event_channel();
        cellular.monitor().update_thresholds_for_net_capability(
            NetCapability::Ims,
            1,
            vec![vec![Threshold::new(
                AccessNetwork::Eutran,
                SignalMeasurement::Rsrp,
                -115,
                MatchKind::AtMost,
                0,
            )]],
            tx,
        );
        cellular.on_signal(
            AccessNetwork::Eutran,
            SignalMeasurement::Rsrp,
            -120,
            Instant::now(),
        );
        assert!(rx.try_recv().is_ok());
        assert_eq!(cellular.radio_registrations().len(), 1);
    }
}
