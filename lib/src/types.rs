//! Core data model shared by the evaluator, trackers, and config manager.
//!
//! Signal values are integers in dBm (dB for SNR-family measurements) and
//! are carried as `Option<i32>`; an absent measurement is simply `None`.

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// Slot index of a subscription (0-based). Multi-SIM devices have one set of
/// per-slot components per populated slot.
pub type SlotId = u8;

/// Radio access networks the modem can attach a data connection to.
///
/// Ordering is only used for canonicalizing qualified-network lists before
/// comparison; it carries no preference semantics.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AccessNetwork {
    #[default]
    Unknown,
    Geran,
    Utran,
    Eutran,
    Ngran,
    Iwlan,
}

impl AccessNetwork {
    /// Transport the telephony stack uses to reach this access network.
    pub fn transport_type(self) -> TransportType {
        match self {
            AccessNetwork::Iwlan => TransportType::Wlan,
            AccessNetwork::Unknown => TransportType::Invalid,
            _ => TransportType::Wwan,
        }
    }

    /// Parse a lower-case token from the carrier rule grammar. `unknown` is
    /// deliberately absent: rules may not name it.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "geran" => Some(AccessNetwork::Geran),
            "utran" => Some(AccessNetwork::Utran),
            "eutran" => Some(AccessNetwork::Eutran),
            "ngran" => Some(AccessNetwork::Ngran),
            "iwlan" => Some(AccessNetwork::Iwlan),
            _ => None,
        }
    }
}

impl fmt::Display for AccessNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessNetwork::Unknown => "unknown",
            AccessNetwork::Geran => "geran",
            AccessNetwork::Utran => "utran",
            AccessNetwork::Eutran => "eutran",
            AccessNetwork::Ngran => "ngran",
            AccessNetwork::Iwlan => "iwlan",
        };
        write!(f, "{name}")
    }
}

/// Transport a data connection rides on. IWLAN maps to WLAN, every concrete
/// cellular access network to WWAN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    Invalid,
    Wwan,
    Wlan,
}

impl TransportType {
    pub fn opposite(self) -> TransportType {
        match self {
            TransportType::Wwan => TransportType::Wlan,
            TransportType::Wlan => TransportType::Wwan,
            TransportType::Invalid => TransportType::Invalid,
        }
    }
}

/// Data services the engine produces qualified-network lists for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetCapability {
    Ims,
    Eims,
    Mms,
    Xcap,
    Cbs,
}

impl NetCapability {
    /// IMS and emergency-IMS share most policy paths (WFC preference modes,
    /// retain-last-network semantics).
    pub fn is_ims_family(self) -> bool {
        matches!(self, NetCapability::Ims | NetCapability::Eims)
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "ims" => Some(NetCapability::Ims),
            "eims" => Some(NetCapability::Eims),
            "mms" => Some(NetCapability::Mms),
            "xcap" => Some(NetCapability::Xcap),
            "cbs" => Some(NetCapability::Cbs),
            _ => None,
        }
    }

    pub const ALL: [NetCapability; 5] = [
        NetCapability::Ims,
        NetCapability::Eims,
        NetCapability::Mms,
        NetCapability::Xcap,
        NetCapability::Cbs,
    ];
}

impl fmt::Display for NetCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NetCapability::Ims => "ims",
            NetCapability::Eims => "eims",
            NetCapability::Mms => "mms",
            NetCapability::Xcap => "xcap",
            NetCapability::Cbs => "cbs",
        };
        write!(f, "{name}")
    }
}

/// Call type currently in progress, as derived by the call status tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    #[default]
    Idle,
    Voice,
    Video,
    Emergency,
}

/// HOME/ROAM classification of the serving network after applying carrier
/// PLMN overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coverage {
    #[default]
    Home,
    Roam,
}

/// WFC preference mode. Values follow the platform's wire encoding.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum PreferenceMode {
    WifiOnly = 0,
    CellularPreferred = 1,
    WifiPreferred = 2,
}

/// Per-capability RAT preference for non-IMS services, carried as an integer
/// carrier-config key.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum RatPreference {
    #[default]
    Default = 0,
    WifiOnly = 1,
    WifiWhenWfcAvailable = 2,
    WifiWhenNoCellular = 3,
    WifiWhenHomeIsNotAvailable = 4,
}

/// Transport the carrier allows a capability to use, carried as an integer
/// carrier-config key.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum PreferredTransport {
    #[default]
    Wwan = 0,
    Iwlan = 1,
    Both = 2,
}

/// Signal measurement kinds the quality monitors can register thresholds
/// for. RSRP/RSRQ/RSSNR belong to EUTRAN, the SS-prefixed trio to NGRAN,
/// RSCP/ECNO to UTRAN, RSSI to IWLAN and GERAN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalMeasurement {
    Rsrp,
    Rsrq,
    Rssnr,
    SsRsrp,
    SsRsrq,
    SsSinr,
    Rscp,
    Rssi,
    Ecno,
}

impl SignalMeasurement {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "rsrp" => Some(SignalMeasurement::Rsrp),
            "rsrq" => Some(SignalMeasurement::Rsrq),
            "rssnr" => Some(SignalMeasurement::Rssnr),
            "ssrsrp" => Some(SignalMeasurement::SsRsrp),
            "ssrsrq" => Some(SignalMeasurement::SsRsrq),
            "sssinr" => Some(SignalMeasurement::SsSinr),
            "rscp" => Some(SignalMeasurement::Rscp),
            "rssi" => Some(SignalMeasurement::Rssi),
            "ecno" => Some(SignalMeasurement::Ecno),
            _ => None,
        }
    }
}

/// Direction of a threshold comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Measurement must be >= the threshold value (rove-in style).
    AtLeast,
    /// Measurement must be <= the threshold value (rove-out style).
    AtMost,
}

/// A single signal threshold. `wait_ms` is the backhaul dwell: the
/// measurement must satisfy the comparison continuously for that long
/// before the match is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Threshold {
    pub access_network: AccessNetwork,
    pub measurement: SignalMeasurement,
    pub value: i32,
    pub match_kind: MatchKind,
    pub wait_ms: u32,
}

impl Threshold {
    pub fn new(
        access_network: AccessNetwork,
        measurement: SignalMeasurement,
        value: i32,
        match_kind: MatchKind,
        wait_ms: u32,
    ) -> Self {
        Threshold {
            access_network,
            measurement,
            value,
            match_kind,
            wait_ms,
        }
    }

    /// Whether `measured` satisfies the comparison, ignoring the dwell.
    pub fn matches(&self, measured: i32) -> bool {
        match self.match_kind {
            MatchKind::AtLeast => measured >= self.value,
            MatchKind::AtMost => measured <= self.value,
        }
    }

    /// Shift the threshold value by a signed gap (guarding hysteresis
    /// offset). The shift direction follows the match kind so a positive
    /// gap always tightens the threshold.
    pub fn with_gap(mut self, gap: i32) -> Self {
        match self.match_kind {
            MatchKind::AtLeast => self.value += gap,
            MatchKind::AtMost => self.value -= gap,
        }
        self
    }
}

/// Ordered conjunction of thresholds. The group matches iff every member
/// matches simultaneously.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ThresholdGroup {
    pub thresholds: Vec<Threshold>,
}

impl ThresholdGroup {
    pub fn new(thresholds: Vec<Threshold>) -> Self {
        ThresholdGroup { thresholds }
    }
}

/// Hysteresis guard state, part of the policy pre-condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardingState {
    #[default]
    None,
    Running,
    Expired,
}

/// State a policy applies under: call type, WFC preference and coverage,
/// optionally narrowed by the guard timer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreCondition {
    pub call_type: CallType,
    pub preference: PreferenceMode,
    pub coverage: Coverage,
    pub guarding: GuardingState,
}

impl PreCondition {
    /// Pre-conditions compare equal modulo guarding when the policy was
    /// declared without a guarding constraint.
    pub fn accepts(&self, current: &PreCondition) -> bool {
        self.call_type == current.call_type
            && self.preference == current.preference
            && self.coverage == current.coverage
            && (self.guarding == GuardingState::None || self.guarding == current.guarding)
    }
}

/// Access network selection policy: when the pre-condition holds and any
/// threshold group matches, `target_transport` is a candidate for the
/// capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnspPolicy {
    pub capability: NetCapability,
    pub target_transport: TransportType,
    pub pre_condition: PreCondition,
    pub groups: Vec<ThresholdGroup>,
}

/// allow / deny verdict of a handover rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoverRuleKind {
    Allowed,
    Disallowed,
}

/// Carrier handover policy entry. At least one of sources/targets contains
/// IWLAN and neither may contain Unknown; both invariants are enforced at
/// parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoverRule {
    pub sources: Vec<AccessNetwork>,
    pub targets: Vec<AccessNetwork>,
    pub capabilities: Vec<NetCapability>,
    pub kind: HandoverRuleKind,
    pub roaming_only: bool,
}

impl HandoverRule {
    /// Whether this rule decides the given transition. A rule with an empty
    /// capability list applies to every capability; a roaming-only rule is
    /// skipped when not roaming.
    pub fn applies(
        &self,
        source: AccessNetwork,
        target: AccessNetwork,
        capability: NetCapability,
        roaming: bool,
    ) -> bool {
        if self.roaming_only && !roaming {
            return false;
        }
        if !self.capabilities.is_empty() && !self.capabilities.contains(&capability) {
            return false;
        }
        self.sources.contains(&source) && self.targets.contains(&target)
    }
}

/// Inclusive range of IMS failure reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonRange {
    pub lo: i32,
    pub hi: i32,
}

impl ReasonRange {
    pub fn single(code: i32) -> Self {
        ReasonRange { lo: code, hi: code }
    }

    pub fn covers(&self, code: i32) -> bool {
        self.lo <= code && code <= self.hi
    }
}

/// Preference-mode filter on a fallback rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPreference {
    Cell,
    Wifi,
}

impl FallbackPreference {
    pub fn accepts(self, mode: PreferenceMode) -> bool {
        match self {
            FallbackPreference::Cell => mode == PreferenceMode::CellularPreferred,
            FallbackPreference::Wifi => {
                matches!(
                    mode,
                    PreferenceMode::WifiPreferred | PreferenceMode::WifiOnly
                )
            }
        }
    }
}

/// Back-off applied to WLAN after an IMS registration failure whose reason
/// code falls in one of the ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackRule {
    pub reasons: Vec<ReasonRange>,
    pub backoff_ms: u64,
    pub preference: Option<FallbackPreference>,
}

impl FallbackRule {
    pub fn covers(&self, reason_code: i32, mode: PreferenceMode) -> bool {
        if let Some(pref) = self.preference
            && !pref.accepts(mode)
        {
            return false;
        }
        self.reasons.iter().any(|r| r.covers(reason_code))
    }
}

/// Retry/fallback policy applied when the initial data connection for a
/// capability keeps failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialConnectionFailureRule {
    pub capability: NetCapability,
    pub retry_count: u32,
    pub retry_timer_ms: u64,
    pub fallback_guard_timer_ms: u64,
    pub max_fallback_count: u32,
}

/// RTT probing policy for Wi-Fi backhaul verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RttPingRule {
    pub server: String,
    pub count: u32,
    pub interval_ms: u64,
    pub packet_size: u32,
    pub rtt_criterion_ms: u32,
    pub check_interval_ms: u64,
    pub hysteresis_fallback_ms: u64,
}

/// Signed threshold offset applied while the guard timer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdGapRule {
    pub access_network: AccessNetwork,
    pub measurement: SignalMeasurement,
    pub gap: i32,
}

/// RTP media quality criteria from carrier config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtpCriteria {
    pub jitter_ms: u32,
    pub packet_loss_pct: u32,
    pub no_rtp_interval_ms: u32,
}

/// Per-slot IWLAN availability as computed by the IWLAN network status
/// tracker. Equality is structural over all three fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IwlanAvailabilityInfo {
    pub iwlan_available: bool,
    pub is_cross_wfc: bool,
    pub notify_iwlan_disabled: bool,
}

impl IwlanAvailabilityInfo {
    /// Equality ignoring the transient tear-down flag, used for
    /// emit-on-change suppression.
    pub fn same_availability(&self, other: &IwlanAvailabilityInfo) -> bool {
        self.iwlan_available == other.iwlan_available && self.is_cross_wfc == other.is_cross_wfc
    }
}

/// The evaluator's output: an ordered list of qualified access networks
/// (first entry preferred) plus the WLAN tear-down hint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QualifiedNetworksInfo {
    pub access_networks: Vec<AccessNetwork>,
    pub notify_iwlan_disabled: bool,
}

impl QualifiedNetworksInfo {
    pub fn new(access_networks: Vec<AccessNetwork>) -> Self {
        QualifiedNetworksInfo {
            access_networks,
            notify_iwlan_disabled: false,
        }
    }

    /// Sorted, de-duplicated view of the list. The emitted order is
    /// preference-significant but comparison against the last notified
    /// value canonicalizes first, since the raw list may carry duplicates.
    pub fn canonical(&self) -> Vec<AccessNetwork> {
        let mut v = self.access_networks.clone();
        v.sort();
        v.dedup();
        v
    }

    /// De-bounce comparison: same canonical list and same tear-down flag.
    pub fn same_as(&self, other: &QualifiedNetworksInfo) -> bool {
        self.canonical() == other.canonical()
            && self.notify_iwlan_disabled == other.notify_iwlan_disabled
    }

    /// Whether the list names any access network on the given transport.
    pub fn contains_transport(&self, transport: TransportType) -> bool {
        self.access_networks
            .iter()
            .any(|an| an.transport_type() == transport)
    }
}

/// Precise state of a single IMS call, as reported by the telephony feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreciseCallState {
    Idle,
    Active,
    Holding,
    Dialing,
    Alerting,
    Incoming,
    Waiting,
    Disconnecting,
    Disconnected,
}

impl PreciseCallState {
    /// Pre-connection states excluded when deriving the VIDEO call type.
    pub fn is_setup(self) -> bool {
        matches!(
            self,
            PreciseCallState::Alerting | PreciseCallState::Dialing | PreciseCallState::Incoming
        )
    }
}

/// IMS call profile service type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallServiceType {
    Normal,
    Emergency,
}

/// IMS call profile call type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImsCallType {
    Voice,
    Vt,
}

/// One entry of a precise-call-state snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallState {
    pub call_id: i32,
    pub service_type: CallServiceType,
    pub call_type: ImsCallType,
    pub state: PreciseCallState,
}

/// IPv4/IPv6 composition of the Wi-Fi link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkProtocol {
    #[default]
    Unknown,
    Ipv4,
    Ipv6,
    Ipv4v6,
}

impl LinkProtocol {
    pub fn classify(has_ipv4: bool, has_ipv6: bool) -> Self {
        match (has_ipv4, has_ipv6) {
            (true, true) => LinkProtocol::Ipv4v6,
            (true, false) => LinkProtocol::Ipv4,
            (false, true) => LinkProtocol::Ipv6,
            (false, false) => LinkProtocol::Unknown,
        }
    }
}

/// Roaming classification reported by the telephony feed, before carrier
/// PLMN overrides are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoamingType {
    #[default]
    NotRoaming,
    Domestic,
    International,
}

/// Filtered per-slot telephony state forwarded by the cellular network
/// status tracker. Comparison is structural; the tracker de-duplicates
/// before forwarding.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QnsTelephonyInfo {
    pub cellular_available: bool,
    pub data_registered: bool,
    pub coverage: Coverage,
    pub roaming: bool,
    pub data_network_type: AccessNetwork,
    pub voice_network_type: AccessNetwork,
    pub registered_plmn: Option<String>,
    pub vops_supported: bool,
    pub emergency_service_supported: bool,
    pub emergency_fallback_supported: bool,
    pub voice_barred: bool,
    pub emergency_barred: bool,
}

impl QnsTelephonyInfo {
    /// Cellular access network currently serving data, when registered.
    pub fn cellular_access_network(&self) -> Option<AccessNetwork> {
        if self.cellular_available && self.data_network_type != AccessNetwork::Unknown {
            Some(self.data_network_type)
        } else {
            None
        }
    }
}

/// State of the data connection for one capability on one transport, as
/// reported by the telephony stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataConnectionState {
    #[default]
    Inactive,
    Connecting,
    Connected,
    HandoverInProgress,
}

/// IMS registration state per transport, with the failure reason code
/// carried for fallback-rule matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ImsRegistrationState {
    Registered {
        transport: TransportType,
    },
    Unregistered {
        reason_code: Option<i32>,
    },
    AccessNetworkChangeFailed {
        target_transport: TransportType,
        reason_code: Option<i32>,
    },
}
