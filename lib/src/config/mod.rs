//! Carrier configuration: merged bundles, parsed rule sets, typed getters.
//!
//! The manager owns the merge chain (asset defaults ← carrier overrides),
//! parses the string rule grammars once per load, and exposes every policy
//! getter the evaluator consumes. Provisioning items override specific
//! thresholds and the hysteresis timers at getter level.
//!
//! Reload semantics: a carrier-id change reloads everything and notifies
//! the loaded registrants; a same-carrier update only notifies the changed
//! registrants when the content diff shows thresholds or handover rules
//! actually changed, so the evaluators are not re-run for cosmetic updates.

pub mod bundle;
pub mod provisioning;
pub mod rules;

use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::event::{EventSender, QnsEvent, RegistrantId, Registrants};
use crate::types::{
    AccessNetwork, CallType, Coverage, FallbackRule, HandoverRule,
    InitialConnectionFailureRule, NetCapability, PreferenceMode, PreferredTransport,
    RatPreference, RtpCriteria, RttPingRule, SignalMeasurement, SlotId, ThresholdGapRule,
    TransportType,
};

use bundle::{ConfigBundle, ConfigValue};
use provisioning::{ProvisioningInfo, ProvisioningKey};
use rules::{
    parse_fallback_rule, parse_handover_rule, parse_initial_connection_failure_rule,
    parse_rtt_ping_rule, parse_rule_list, parse_threshold_gap_rule,
};

/// Bundle keys. Threshold and timer keys are composed per coverage, call
/// type, access network and measurement; see the `*_key` helpers.
pub mod keys {
    pub const HANDOVER_RULES: &str = "qns.handover_rules";
    pub const FALLBACK_RULES: &str = "qns.fallback_rules";
    pub const INITIAL_CONNECTION_FAILURE_RULES: &str = "qns.initial_connection_failure_rules";
    pub const RTT_PING_RULE: &str = "qns.rtt_ping_rule";
    pub const THRESHOLD_GAP_RULES: &str = "qns.threshold_gap_rules";
    pub const MINIMUM_GUARDING_TIMER_MS: &str = "qns.minimum_guarding_timer_ms";
    pub const GUARDING_TIMER_LIMIT_MS: &str = "qns.guarding_timer_limit_ms";
    pub const BACKHAUL_TIMER_MS: &str = "qns.backhaul_timer_ms";
    pub const VOLTE_ROAMING_SUPPORTED: &str = "qns.volte_roaming_supported";
    pub const MMTEL_REQUIRED: &str = "qns.mmtel_required";
    pub const WFC_AIRPLANE_ALLOWED: &str = "qns.wfc_airplane_allowed";
    pub const BLOCK_IPV6_ONLY_WIFI: &str = "qns.block_ipv6_only_wifi";
    pub const IMS_PREFERENCE_OVERRIDE_AT_HOME: &str = "qns.ims_preference_override_at_home";
    pub const WFC_MODE_DEFAULT_HOME: &str = "qns.wfc_mode_default.home";
    pub const WFC_MODE_DEFAULT_ROAMING: &str = "qns.wfc_mode_default.roaming";
    pub const WFC_DEFAULT_ENABLED_HOME: &str = "qns.wfc_default_enabled.home";
    pub const WFC_DEFAULT_ENABLED_ROAMING: &str = "qns.wfc_default_enabled.roaming";
    pub const PLMN_INTERNATIONAL: &str = "qns.plmn.international";
    pub const PLMN_DOMESTIC: &str = "qns.plmn.domestic";
    pub const RTP_CRITERIA: &str = "qns.rtp_criteria";
    pub const RESTRICT_RTP_LOW_QUALITY_MS: &str = "qns.restrict_time_ms.rtp_low_quality";
    pub const RESTRICT_WIFI_BACKHAUL_MS: &str = "qns.restrict_time_ms.wifi_backhaul";
    pub const RESTRICT_THROTTLE_DEFAULT_MS: &str = "qns.restrict_time_ms.throttle_default";
    pub const VIDEO_OFFSET_CARRIERS: &str = "qns.video_offset_carriers";

    pub const THRESHOLD_PREFIX: &str = "qns.threshold.";
    pub const TRANSPORT_PREFIX: &str = "qns.transport.";
    pub const RAT_PREFERENCE_PREFIX: &str = "qns.rat_preference.";
    pub const GUARDING_TIMER_PREFIX: &str = "qns.guarding_timer_ms.";
}

/// Offset applied to Wi-Fi video thresholds for carriers listed under
/// `VIDEO_OFFSET_CARRIERS`.
const VIDEO_RSSI_OFFSET_DB: i32 = 5;

fn coverage_token(coverage: Coverage) -> &'static str {
    match coverage {
        Coverage::Home => "home",
        Coverage::Roam => "roam",
    }
}

fn call_token(call_type: CallType) -> &'static str {
    match call_type {
        CallType::Idle => "idle",
        CallType::Voice => "voice",
        CallType::Video => "video",
        CallType::Emergency => "emergency",
    }
}

fn measurement_token(measurement: SignalMeasurement) -> &'static str {
    match measurement {
        SignalMeasurement::Rsrp => "rsrp",
        SignalMeasurement::Rsrq => "rsrq",
        SignalMeasurement::Rssnr => "rssnr",
        SignalMeasurement::SsRsrp => "ssrsrp",
        SignalMeasurement::SsRsrq => "ssrsrq",
        SignalMeasurement::SsSinr => "sssinr",
        SignalMeasurement::Rscp => "rscp",
        SignalMeasurement::Rssi => "rssi",
        SignalMeasurement::Ecno => "ecno",
    }
}

fn threshold_key(
    coverage: Coverage,
    call_type: CallType,
    access_network: AccessNetwork,
    measurement: SignalMeasurement,
) -> String {
    format!(
        "{}{}.{}.{}.{}",
        keys::THRESHOLD_PREFIX,
        coverage_token(coverage),
        call_token(call_type),
        access_network,
        measurement_token(measurement)
    )
}

fn threshold_any_call_key(
    coverage: Coverage,
    access_network: AccessNetwork,
    measurement: SignalMeasurement,
) -> String {
    format!(
        "{}{}.any.{}.{}",
        keys::THRESHOLD_PREFIX,
        coverage_token(coverage),
        access_network,
        measurement_token(measurement)
    )
}

fn guarding_key(coverage: Coverage, call_type: CallType) -> String {
    format!(
        "{}{}.{}",
        keys::GUARDING_TIMER_PREFIX,
        coverage_token(coverage),
        call_token(call_type)
    )
}

/// Rule sets parsed once per load. The evaluator reads these through a
/// shared snapshot; reload swaps the whole structure.
#[derive(Debug, Default, PartialEq)]
pub struct ParsedPolicy {
    pub handover_rules: Vec<HandoverRule>,
    pub fallback_rules: Vec<FallbackRule>,
    pub initial_failure_rules: Vec<InitialConnectionFailureRule>,
    pub rtt_ping: Option<RttPingRule>,
    pub threshold_gaps: Vec<ThresholdGapRule>,
}

impl ParsedPolicy {
    fn from_bundle(bundle: &ConfigBundle) -> Self {
        let handover_rules = bundle
            .get_string_array(keys::HANDOVER_RULES)
            .map(|r| parse_rule_list(r, "handover", parse_handover_rule))
            .unwrap_or_default();
        let fallback_rules = bundle
            .get_string_array(keys::FALLBACK_RULES)
            .map(|r| parse_rule_list(r, "fallback", parse_fallback_rule))
            .unwrap_or_default();
        let initial_failure_rules = bundle
            .get_string_array(keys::INITIAL_CONNECTION_FAILURE_RULES)
            .map(|r| {
                parse_rule_list(
                    r,
                    "initial-connection-failure",
                    parse_initial_connection_failure_rule,
                )
            })
            .unwrap_or_default();
        let rtt_ping = bundle.get_string(keys::RTT_PING_RULE).and_then(|r| {
            parse_rtt_ping_rule(r)
                .map_err(|e| warn!("discarding malformed rtt ping rule `{r}`: {e}"))
                .ok()
        });
        let threshold_gaps = bundle
            .get_string_array(keys::THRESHOLD_GAP_RULES)
            .map(|r| parse_rule_list(r, "threshold-gap", parse_threshold_gap_rule))
            .unwrap_or_default();
        ParsedPolicy {
            handover_rules,
            fallback_rules,
            initial_failure_rules,
            rtt_ping,
            threshold_gaps,
        }
    }
}

struct Inner {
    carrier_id: Option<i32>,
    carrier_overrides: ConfigBundle,
    provisioning: ProvisioningInfo,
    merged: Arc<ConfigBundle>,
    policy: Arc<ParsedPolicy>,
    loaded_registrants: Registrants<QnsEvent>,
    changed_registrants: Registrants<QnsEvent>,
}

/// Per-slot carrier config manager.
pub struct QnsConfigManager {
    slot: SlotId,
    inner: Mutex<Inner>,
}

impl QnsConfigManager {
    pub fn new(slot: SlotId) -> Self {
        let merged = Arc::new(Self::asset_defaults());
        let policy = Arc::new(ParsedPolicy::from_bundle(&merged));
        QnsConfigManager {
            slot,
            inner: Mutex::new(Inner {
                carrier_id: None,
                carrier_overrides: ConfigBundle::default(),
                provisioning: ProvisioningInfo::default(),
                merged,
                policy,
                loaded_registrants: Registrants::default(),
                changed_registrants: Registrants::default(),
            }),
        }
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Built-in asset defaults, overridden by carrier bundles. Threshold
    /// arrays are [good, bad] for IWLAN and [good, bad, worst] for cellular
    /// access networks.
    pub fn asset_defaults() -> ConfigBundle {
        let mut pairs: Vec<(String, ConfigValue)> = Vec::new();
        for coverage in [Coverage::Home, Coverage::Roam] {
            pairs.push((
                threshold_any_call_key(coverage, AccessNetwork::Eutran, SignalMeasurement::Rsrp),
                ConfigValue::IntArray(vec![-105, -115, -120]),
            ));
            pairs.push((
                threshold_any_call_key(coverage, AccessNetwork::Ngran, SignalMeasurement::SsRsrp),
                ConfigValue::IntArray(vec![-105, -115, -120]),
            ));
            pairs.push((
                threshold_any_call_key(coverage, AccessNetwork::Utran, SignalMeasurement::Rscp),
                ConfigValue::IntArray(vec![-95, -105, -110]),
            ));
            pairs.push((
                threshold_any_call_key(coverage, AccessNetwork::Geran, SignalMeasurement::Rssi),
                ConfigValue::IntArray(vec![-85, -95, -100]),
            ));
            pairs.push((
                threshold_any_call_key(coverage, AccessNetwork::Iwlan, SignalMeasurement::Rssi),
                ConfigValue::IntArray(vec![-65, -80]),
            ));
        }
        for capability in NetCapability::ALL {
            let transport = if capability.is_ims_family() {
                PreferredTransport::Both
            } else {
                PreferredTransport::Wwan
            };
            pairs.push((
                format!("{}{}", keys::TRANSPORT_PREFIX, capability),
                ConfigValue::Int(i32::from(transport)),
            ));
            pairs.push((
                format!("{}{}", keys::RAT_PREFERENCE_PREFIX, capability),
                ConfigValue::Int(i32::from(RatPreference::Default)),
            ));
        }
        pairs.extend([
            (
                keys::MINIMUM_GUARDING_TIMER_MS.to_string(),
                ConfigValue::Int(0),
            ),
            (
                keys::GUARDING_TIMER_LIMIT_MS.to_string(),
                ConfigValue::Int(60_000),
            ),
            (keys::BACKHAUL_TIMER_MS.to_string(), ConfigValue::Int(3000)),
            (
                keys::VOLTE_ROAMING_SUPPORTED.to_string(),
                ConfigValue::Bool(true),
            ),
            (keys::MMTEL_REQUIRED.to_string(), ConfigValue::Bool(false)),
            (
                keys::WFC_AIRPLANE_ALLOWED.to_string(),
                ConfigValue::Bool(false),
            ),
            (
                keys::BLOCK_IPV6_ONLY_WIFI.to_string(),
                ConfigValue::Bool(false),
            ),
            (
                keys::WFC_MODE_DEFAULT_HOME.to_string(),
                ConfigValue::Int(i32::from(PreferenceMode::CellularPreferred)),
            ),
            (
                keys::WFC_MODE_DEFAULT_ROAMING.to_string(),
                ConfigValue::Int(i32::from(PreferenceMode::CellularPreferred)),
            ),
            (
                keys::RTP_CRITERIA.to_string(),
                ConfigValue::IntArray(vec![120, 5, 4000]),
            ),
            (
                keys::RESTRICT_RTP_LOW_QUALITY_MS.to_string(),
                ConfigValue::Int(60_000),
            ),
            (
                keys::RESTRICT_WIFI_BACKHAUL_MS.to_string(),
                ConfigValue::Int(12_000),
            ),
            (
                keys::RESTRICT_THROTTLE_DEFAULT_MS.to_string(),
                ConfigValue::Int(30_000),
            ),
        ]);
        ConfigBundle::from_pairs(pairs)
    }

    pub fn register_for_config_loaded(&self, sender: EventSender<QnsEvent>) -> RegistrantId {
        self.inner.lock().unwrap().loaded_registrants.register(sender)
    }

    pub fn register_for_config_changed(&self, sender: EventSender<QnsEvent>) -> RegistrantId {
        self.inner
            .lock()
            .unwrap()
            .changed_registrants
            .register(sender)
    }

    pub fn unregister(&self, id: RegistrantId) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.loaded_registrants.unregister(id) {
            inner.changed_registrants.unregister(id);
        }
    }

    /// Apply a carrier bundle. A carrier-id change is a full reload and
    /// notifies the loaded registrants; a same-carrier update notifies the
    /// changed registrants only when thresholds or handover rules differ.
    pub fn update_carrier_config(&self, carrier_id: i32, overrides: ConfigBundle) {
        let mut inner = self.inner.lock().unwrap();
        let merged = Arc::new(Self::asset_defaults().merged(&overrides));
        let policy = Arc::new(ParsedPolicy::from_bundle(&merged));

        if inner.carrier_id != Some(carrier_id) {
            info!(
                "slot {}: carrier config loaded for carrier {carrier_id} ({} overrides)",
                self.slot,
                overrides.len()
            );
            inner.carrier_id = Some(carrier_id);
            inner.carrier_overrides = overrides;
            inner.merged = merged;
            inner.policy = policy;
            inner
                .loaded_registrants
                .notify_all(&QnsEvent::ConfigUpdated {
                    policy_changed: true,
                });
            return;
        }

        let changed = Self::is_qns_config_changed(&inner.merged, &merged);
        inner.carrier_overrides = overrides;
        inner.merged = merged;
        inner.policy = policy;
        if changed {
            info!(
                "slot {}: carrier {carrier_id} config updated with policy changes",
                self.slot
            );
            inner
                .changed_registrants
                .notify_all(&QnsEvent::ConfigUpdated {
                    policy_changed: true,
                });
        }
    }

    /// Content diff limited to the policy the evaluators react to:
    /// threshold arrays and handover rules.
    pub fn is_qns_config_changed(old: &ConfigBundle, new: &ConfigBundle) -> bool {
        if old.subset(keys::THRESHOLD_PREFIX) != new.subset(keys::THRESHOLD_PREFIX) {
            return true;
        }
        old.get_string_array(keys::HANDOVER_RULES) != new.get_string_array(keys::HANDOVER_RULES)
    }

    /// Record one provisioning item. Returns true when the item changed an
    /// effective value (callers re-evaluate only then).
    pub fn update_provisioning_item(&self, key: ProvisioningKey, value: i32) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let changed = inner.provisioning.set(key, value);
        if changed {
            info!("slot {}: provisioning {key:?} = {value}", self.slot);
        }
        changed
    }

    pub fn provisioning(&self) -> ProvisioningInfo {
        self.inner.lock().unwrap().provisioning.clone()
    }

    pub fn apply_provisioning(&self, info: &ProvisioningInfo) {
        let mut inner = self.inner.lock().unwrap();
        inner.provisioning = info.clone();
    }

    pub fn carrier_id(&self) -> Option<i32> {
        self.inner.lock().unwrap().carrier_id
    }

    pub fn policy(&self) -> Arc<ParsedPolicy> {
        self.inner.lock().unwrap().policy.clone()
    }

    pub fn bundle(&self) -> Arc<ConfigBundle> {
        self.inner.lock().unwrap().merged.clone()
    }

    /// Threshold levels for (coverage, call type, access network,
    /// measurement): [good, bad] for IWLAN, [good, bad, worst] for
    /// cellular. Provisioned LTE/Wi-Fi thresholds take precedence, then the
    /// call-type-specific key, then the any-call key. Video calls on listed
    /// carriers get a +5 dB Wi-Fi offset.
    pub fn get_thresholds(
        &self,
        coverage: Coverage,
        call_type: CallType,
        access_network: AccessNetwork,
        measurement: SignalMeasurement,
    ) -> Vec<i32> {
        let inner = self.inner.lock().unwrap();

        let mut levels: Option<Vec<i32>> = None;
        if access_network == AccessNetwork::Eutran && measurement == SignalMeasurement::Rsrp {
            if let Some((good, bad, worst)) = inner.provisioning.lte_rsrp_thresholds() {
                levels = Some(vec![good, bad, worst]);
            }
        } else if access_network == AccessNetwork::Iwlan && measurement == SignalMeasurement::Rssi {
            if let Some((good, bad)) = inner.provisioning.wifi_rssi_thresholds() {
                levels = Some(vec![good, bad]);
            }
        }

        let mut levels = levels
            .or_else(|| {
                inner
                    .merged
                    .get_int_array(&threshold_key(
                        coverage,
                        call_type,
                        access_network,
                        measurement,
                    ))
                    .map(<[i32]>::to_vec)
            })
            .or_else(|| {
                inner
                    .merged
                    .get_int_array(&threshold_any_call_key(
                        coverage,
                        access_network,
                        measurement,
                    ))
                    .map(<[i32]>::to_vec)
            })
            .unwrap_or_default();

        if call_type == CallType::Video
            && access_network == AccessNetwork::Iwlan
            && measurement == SignalMeasurement::Rssi
            && let Some(carrier_id) = inner.carrier_id
            && inner
                .merged
                .get_int_array(keys::VIDEO_OFFSET_CARRIERS)
                .is_some_and(|carriers| carriers.contains(&carrier_id))
        {
            for level in &mut levels {
                *level += VIDEO_RSSI_OFFSET_DB;
            }
        }

        levels
    }

    /// Hysteresis timer for a transition toward `target`. Provisioned ePDG
    /// timers override the configured value.
    pub fn guarding_timer_ms(
        &self,
        coverage: Coverage,
        call_type: CallType,
        target: TransportType,
    ) -> u64 {
        let inner = self.inner.lock().unwrap();
        let provisioned = match target {
            TransportType::Wwan => inner.provisioning.get(ProvisioningKey::LteEpdgTimer),
            TransportType::Wlan => inner.provisioning.get(ProvisioningKey::WifiEpdgTimer),
            TransportType::Invalid => None,
        };
        if let Some(ms) = provisioned {
            return ms.max(0) as u64;
        }
        inner
            .merged
            .get_int(&guarding_key(coverage, call_type))
            .map(|v| v.max(0) as u64)
            .unwrap_or(0)
    }

    pub fn minimum_guarding_timer_ms(&self) -> u64 {
        self.get_u64(keys::MINIMUM_GUARDING_TIMER_MS, 0)
    }

    pub fn guarding_timer_limit_ms(&self) -> u64 {
        self.get_u64(keys::GUARDING_TIMER_LIMIT_MS, 60_000)
    }

    /// Default backhaul dwell attached to Wi-Fi rove-in thresholds.
    pub fn backhaul_timer_ms(&self) -> u32 {
        self.get_u64(keys::BACKHAUL_TIMER_MS, 3000) as u32
    }

    pub fn preferred_transport(&self, capability: NetCapability) -> PreferredTransport {
        let key = format!("{}{}", keys::TRANSPORT_PREFIX, capability);
        self.inner
            .lock()
            .unwrap()
            .merged
            .get_int(&key)
            .and_then(|v| PreferredTransport::try_from(v).ok())
            .unwrap_or_else(|| {
                if capability.is_ims_family() {
                    PreferredTransport::Both
                } else {
                    PreferredTransport::Wwan
                }
            })
    }

    pub fn rat_preference(&self, capability: NetCapability) -> RatPreference {
        let key = format!("{}{}", keys::RAT_PREFERENCE_PREFIX, capability);
        self.inner
            .lock()
            .unwrap()
            .merged
            .get_int(&key)
            .and_then(|v| RatPreference::try_from(v).ok())
            .unwrap_or_default()
    }

    pub fn volte_roaming_supported(&self) -> bool {
        self.get_bool(keys::VOLTE_ROAMING_SUPPORTED, true)
    }

    pub fn mmtel_capability_required(&self) -> bool {
        self.get_bool(keys::MMTEL_REQUIRED, false)
    }

    pub fn wfc_allowed_in_airplane_mode(&self) -> bool {
        self.get_bool(keys::WFC_AIRPLANE_ALLOWED, false)
    }

    pub fn block_ipv6_only_wifi(&self) -> bool {
        self.get_bool(keys::BLOCK_IPV6_ONLY_WIFI, false)
    }

    /// Optional preference-mode override applied at home coverage for the
    /// IMS capability.
    pub fn ims_preference_override_at_home(&self) -> Option<PreferenceMode> {
        self.inner
            .lock()
            .unwrap()
            .merged
            .get_int(keys::IMS_PREFERENCE_OVERRIDE_AT_HOME)
            .and_then(|v| PreferenceMode::try_from(v).ok())
    }

    pub fn default_wfc_mode(&self, roaming: bool) -> PreferenceMode {
        let key = if roaming {
            keys::WFC_MODE_DEFAULT_ROAMING
        } else {
            keys::WFC_MODE_DEFAULT_HOME
        };
        self.inner
            .lock()
            .unwrap()
            .merged
            .get_int(key)
            .and_then(|v| PreferenceMode::try_from(v).ok())
            .unwrap_or(PreferenceMode::CellularPreferred)
    }

    /// Carrier default for the WFC user toggle, used when the user never
    /// touched the setting.
    pub fn default_wfc_enabled(&self, roaming: bool) -> bool {
        let key = if roaming {
            keys::WFC_DEFAULT_ENABLED_ROAMING
        } else {
            keys::WFC_DEFAULT_ENABLED_HOME
        };
        self.get_bool(key, false)
    }

    pub fn international_roaming_plmns(&self) -> Vec<String> {
        self.get_string_vec(keys::PLMN_INTERNATIONAL)
    }

    pub fn domestic_roaming_plmns(&self) -> Vec<String> {
        self.get_string_vec(keys::PLMN_DOMESTIC)
    }

    pub fn rtp_criteria(&self) -> Option<RtpCriteria> {
        let inner = self.inner.lock().unwrap();
        let arr = inner.merged.get_int_array(keys::RTP_CRITERIA)?;
        if arr.len() != 3 {
            warn!("slot {}: rtp criteria needs 3 entries, got {}", self.slot, arr.len());
            return None;
        }
        Some(RtpCriteria {
            jitter_ms: arr[0].max(0) as u32,
            packet_loss_pct: arr[1].max(0) as u32,
            no_rtp_interval_ms: arr[2].max(0) as u32,
        })
    }

    pub fn rtp_low_quality_restrict_time_ms(&self) -> u64 {
        self.get_u64(keys::RESTRICT_RTP_LOW_QUALITY_MS, 60_000)
    }

    pub fn wifi_backhaul_restrict_time_ms(&self) -> u64 {
        self.get_u64(keys::RESTRICT_WIFI_BACKHAUL_MS, 12_000)
    }

    pub fn throttle_default_time_ms(&self) -> u64 {
        self.get_u64(keys::RESTRICT_THROTTLE_DEFAULT_MS, 30_000)
    }

    pub fn threshold_gap(
        &self,
        access_network: AccessNetwork,
        measurement: SignalMeasurement,
    ) -> Option<i32> {
        self.inner
            .lock()
            .unwrap()
            .policy
            .threshold_gaps
            .iter()
            .find(|g| g.access_network == access_network && g.measurement == measurement)
            .map(|g| g.gap)
    }

    pub fn initial_failure_rule(
        &self,
        capability: NetCapability,
    ) -> Option<InitialConnectionFailureRule> {
        self.inner
            .lock()
            .unwrap()
            .policy
            .initial_failure_rules
            .iter()
            .find(|r| r.capability == capability)
            .cloned()
    }

    pub fn provisioned_wfc_roaming_enabled(&self) -> Option<bool> {
        self.inner.lock().unwrap().provisioning.wfc_roaming_enabled()
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.inner
            .lock()
            .unwrap()
            .merged
            .get_bool(key)
            .unwrap_or(default)
    }

    fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.inner
            .lock()
            .unwrap()
            .merged
            .get_int(key)
            .map(|v| v.max(0) as u64)
            .unwrap_or(default)
    }

    fn get_string_vec(&self, key: &str) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .merged
            .get_string_array(key)
            .map(<[String]>::to_vec)
            .unwrap_or_default()
    }
}
