//! Access network selection policy construction.
//!
//! The evaluator owns one policy set per capability, rebuilt whenever the
//! carrier config reloads. Policies are generated for every pre-condition
//! combination; while the guard timer runs, a tightened variant (threshold
//! gap applied) shadows the base policy, which is what produces the
//! hysteresis between rove-in and rove-out.

use crate::config::QnsConfigManager;
use crate::types::{
    AccessNetwork, AnspPolicy, CallType, Coverage, GuardingState, MatchKind, NetCapability,
    PreCondition, PreferenceMode, SignalMeasurement, Threshold, ThresholdGroup, TransportType,
};

/// Cellular access networks paired with their primary measurement.
const CELLULAR_MEASUREMENTS: [(AccessNetwork, SignalMeasurement); 4] = [
    (AccessNetwork::Eutran, SignalMeasurement::Rsrp),
    (AccessNetwork::Ngran, SignalMeasurement::SsRsrp),
    (AccessNetwork::Utran, SignalMeasurement::Rscp),
    (AccessNetwork::Geran, SignalMeasurement::Rssi),
];

/// Position of the "good" level in a threshold array.
const LEVEL_GOOD: usize = 0;
/// Position of the "bad" level in a threshold array.
const LEVEL_BAD: usize = 1;

/// The per-capability policy set, in declared order. The first accepted
/// policy per target transport decides; later entries never override it.
#[derive(Debug, Default)]
pub struct AnspSet {
    policies: Vec<AnspPolicy>,
}

impl AnspSet {
    /// Generate the full policy matrix for a capability from carrier
    /// config. Guarded (gap-tightened) variants are declared before their
    /// base policies so they shadow them while the guard timer runs.
    pub fn build(config: &QnsConfigManager, capability: NetCapability) -> Self {
        let mut policies = Vec::new();
        for coverage in [Coverage::Home, Coverage::Roam] {
            for call_type in [
                CallType::Idle,
                CallType::Voice,
                CallType::Video,
                CallType::Emergency,
            ] {
                for preference in [
                    PreferenceMode::WifiOnly,
                    PreferenceMode::CellularPreferred,
                    PreferenceMode::WifiPreferred,
                ] {
                    for guarding in [GuardingState::Running, GuardingState::None] {
                        let gapped = guarding == GuardingState::Running;
                        let pre = PreCondition {
                            call_type,
                            preference,
                            coverage,
                            guarding,
                        };
                        policies.push(AnspPolicy {
                            capability,
                            target_transport: TransportType::Wlan,
                            pre_condition: pre,
                            groups: rove_in_groups(
                                config, coverage, call_type, preference, gapped,
                            ),
                        });
                        policies.push(AnspPolicy {
                            capability,
                            target_transport: TransportType::Wwan,
                            pre_condition: pre,
                            groups: rove_out_groups(
                                config, coverage, call_type, preference, gapped,
                            ),
                        });
                    }
                }
            }
        }
        AnspSet { policies }
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// First policy in declared order accepting the current pre-condition
    /// for the given target transport.
    pub fn first_candidate(
        &self,
        target: TransportType,
        current: &PreCondition,
    ) -> Option<&AnspPolicy> {
        self.policies
            .iter()
            .find(|p| p.target_transport == target && p.pre_condition.accepts(current))
    }
}

fn wifi_threshold(config: &QnsConfigManager, coverage: Coverage, call_type: CallType) -> Vec<i32> {
    config.get_thresholds(
        coverage,
        call_type,
        AccessNetwork::Iwlan,
        SignalMeasurement::Rssi,
    )
}

fn apply_gap(config: &QnsConfigManager, threshold: Threshold, gapped: bool) -> Threshold {
    if !gapped {
        return threshold;
    }
    match config.threshold_gap(threshold.access_network, threshold.measurement) {
        Some(gap) => threshold.with_gap(gap),
        None => threshold,
    }
}

/// Threshold groups qualifying WLAN. Wi-Fi rove-in thresholds carry the
/// configured backhaul dwell.
fn rove_in_groups(
    config: &QnsConfigManager,
    coverage: Coverage,
    call_type: CallType,
    preference: PreferenceMode,
    gapped: bool,
) -> Vec<ThresholdGroup> {
    let wifi = wifi_threshold(config, coverage, call_type);
    let Some(&wifi_good) = wifi.get(LEVEL_GOOD) else {
        return Vec::new();
    };
    let backhaul = config.backhaul_timer_ms();
    let wifi_in = apply_gap(
        config,
        Threshold::new(
            AccessNetwork::Iwlan,
            SignalMeasurement::Rssi,
            wifi_good,
            MatchKind::AtLeast,
            backhaul,
        ),
        gapped,
    );

    match preference {
        // Wi-Fi first: a good Wi-Fi signal alone qualifies WLAN.
        PreferenceMode::WifiPreferred | PreferenceMode::WifiOnly => {
            vec![ThresholdGroup::new(vec![wifi_in])]
        }
        // Cellular first: WLAN qualifies only when some serving cellular
        // network has degraded below its bad level while Wi-Fi is good.
        PreferenceMode::CellularPreferred => CELLULAR_MEASUREMENTS
            .iter()
            .filter_map(|&(an, measurement)| {
                let levels = config.get_thresholds(coverage, call_type, an, measurement);
                let &bad = levels.get(LEVEL_BAD)?;
                let cell_bad = apply_gap(
                    config,
                    Threshold::new(an, measurement, bad, MatchKind::AtMost, 0),
                    gapped,
                );
                Some(ThresholdGroup::new(vec![cell_bad, wifi_in]))
            })
            .collect(),
    }
}

/// Threshold groups qualifying WWAN.
fn rove_out_groups(
    config: &QnsConfigManager,
    coverage: Coverage,
    call_type: CallType,
    preference: PreferenceMode,
    gapped: bool,
) -> Vec<ThresholdGroup> {
    if preference == PreferenceMode::WifiOnly {
        return Vec::new();
    }

    let wifi = wifi_threshold(config, coverage, call_type);
    let wifi_bad = wifi.get(LEVEL_BAD).map(|&bad| {
        apply_gap(
            config,
            Threshold::new(
                AccessNetwork::Iwlan,
                SignalMeasurement::Rssi,
                bad,
                MatchKind::AtMost,
                0,
            ),
            gapped,
        )
    });

    match preference {
        // Wi-Fi first: only a degraded Wi-Fi signal sends the connection
        // back to cellular.
        PreferenceMode::WifiPreferred => wifi_bad
            .map(|t| vec![ThresholdGroup::new(vec![t])])
            .unwrap_or_default(),
        // Cellular first: a recovered cellular network or a degraded Wi-Fi
        // link each qualify WWAN on their own.
        PreferenceMode::CellularPreferred => {
            let mut groups: Vec<ThresholdGroup> = CELLULAR_MEASUREMENTS
                .iter()
                .filter_map(|&(an, measurement)| {
                    let levels = config.get_thresholds(coverage, call_type, an, measurement);
                    let &good = levels.get(LEVEL_GOOD)?;
                    let cell_good = apply_gap(
                        config,
                        Threshold::new(an, measurement, good, MatchKind::AtLeast, 0),
                        gapped,
                    );
                    Some(ThresholdGroup::new(vec![cell_good]))
                })
                .collect();
            if let Some(t) = wifi_bad {
                groups.push(ThresholdGroup::new(vec![t]));
            }
            groups
        }
        PreferenceMode::WifiOnly => unreachable!(),
    }
}
