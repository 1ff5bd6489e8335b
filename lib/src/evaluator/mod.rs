//! Access network evaluator.
//!
//! One evaluator per (slot, capability). Every input change triggers a
//! single-pass, synchronous re-evaluation from the latest observed value
//! of every input: transport allowance, pre-condition resolution,
//! threshold arbitration against the policy set, cross-cutting constraints
//! (VoPS/MMTEL, handover rules, VoLTE roaming, guarding, fallback and
//! restriction timers), and finally a de-bounced emission of the
//! qualified-network list.

pub mod guard;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::time::Instant;

use crate::config::QnsConfigManager;
use crate::event::{EventComponent, EventSender, QnsEvent, RegistrantId, Registrants};
use crate::monitor::QualityMonitor;
use crate::policy::AnspSet;
use crate::restrict::{RestrictManager, RestrictReason};
use crate::tracker::ims::WfcSettings;
use crate::types::{
    AccessNetwork, AnspPolicy, CallType, Coverage, DataConnectionState, GuardingState,
    HandoverRuleKind, ImsRegistrationState, IwlanAvailabilityInfo, NetCapability, PreCondition,
    PreferenceMode, PreferredTransport, QnsTelephonyInfo, QualifiedNetworksInfo, RatPreference,
    SlotId, Threshold, TransportType,
};

use guard::GuardTimer;

/// One qualified-networks emission, delivered to registered sinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedNetworksUpdate {
    pub slot: SlotId,
    pub capability: NetCapability,
    pub info: QualifiedNetworksInfo,
}

pub struct AccessNetworkEvaluator {
    slot: SlotId,
    capability: NetCapability,
    config: Arc<QnsConfigManager>,
    cellular_monitor: Arc<QualityMonitor>,
    wifi_monitor: Arc<QualityMonitor>,
    restrict: RestrictManager,
    ansp: AnspSet,
    guard: GuardTimer,
    /// Sender feeding this evaluator's own loop; handed to the monitors so
    /// threshold crossings come back as events.
    self_tx: EventSender<QnsEvent>,

    iwlan: IwlanAvailabilityInfo,
    telephony: QnsTelephonyInfo,
    call_type: CallType,
    emergency_over_ims: bool,
    ims_registration: Option<ImsRegistrationState>,
    wfc: WfcSettings,
    airplane_mode: bool,
    emergency_pref_transport: Option<TransportType>,
    active_transport: Option<TransportType>,
    connection_states: HashMap<TransportType, DataConnectionState>,
    pending_teardown: bool,

    last_notified: Option<QualifiedNetworksInfo>,
    registrants: Registrants<QualifiedNetworksUpdate>,
    closed: bool,
}

impl AccessNetworkEvaluator {
    pub fn new(
        slot: SlotId,
        capability: NetCapability,
        config: Arc<QnsConfigManager>,
        cellular_monitor: Arc<QualityMonitor>,
        wifi_monitor: Arc<QualityMonitor>,
        self_tx: EventSender<QnsEvent>,
    ) -> Self {
        let ansp = AnspSet::build(&config, capability);
        AccessNetworkEvaluator {
            slot,
            capability,
            restrict: RestrictManager::new(slot, capability),
            ansp,
            guard: GuardTimer::new(),
            self_tx,
            cellular_monitor,
            wifi_monitor,
            config,
            iwlan: IwlanAvailabilityInfo::default(),
            telephony: QnsTelephonyInfo::default(),
            call_type: CallType::Idle,
            emergency_over_ims: false,
            ims_registration: None,
            wfc: WfcSettings::default(),
            airplane_mode: false,
            emergency_pref_transport: None,
            active_transport: None,
            connection_states: HashMap::new(),
            pending_teardown: false,
            last_notified: None,
            registrants: Registrants::default(),
            closed: false,
        }
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn capability(&self) -> NetCapability {
        self.capability
    }

    /// Register a qualified-networks sink; the last notified value is
    /// replayed synchronously so a late subscriber starts consistent.
    pub fn register_qualified_networks_changed(
        &mut self,
        sender: EventSender<QualifiedNetworksUpdate>,
    ) -> RegistrantId {
        let id = self.registrants.register(sender);
        if let Some(info) = &self.last_notified {
            self.registrants.notify_one(
                id,
                &QualifiedNetworksUpdate {
                    slot: self.slot,
                    capability: self.capability,
                    info: info.clone(),
                },
            );
        }
        id
    }

    pub fn unregister_qualified_networks_changed(&mut self, id: RegistrantId) {
        self.registrants.unregister(id);
    }

    /// Rebuild the derived policy set from current carrier config and
    /// force a re-evaluation.
    pub fn rebuild(&mut self) {
        if self.closed {
            return;
        }
        self.ansp = AnspSet::build(&self.config, self.capability);
        self.evaluate();
    }

    /// Release registrations, timers and derived policy. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cellular_monitor
            .clear_thresholds(self.capability, self.slot);
        self.wifi_monitor.clear_thresholds(self.capability, self.slot);
        self.restrict.clear();
        self.guard.cancel();
        self.ansp = AnspSet::default();
        self.registrants = Registrants::default();
        info!("slot {} {}: evaluator closed", self.slot, self.capability);
    }

    pub fn last_notified(&self) -> Option<&QualifiedNetworksInfo> {
        self.last_notified.as_ref()
    }

    fn roaming(&self) -> bool {
        self.telephony.roaming
    }

    /// IMS-family preference derives from the WFC mode of the current
    /// coverage (plus the at-home override); other capabilities follow the
    /// carrier's transport preference.
    fn preference_mode(&self) -> PreferenceMode {
        if self.capability.is_ims_family() {
            let mode = self.wfc.mode(self.roaming());
            if !self.roaming()
                && let Some(overridden) = self.config.ims_preference_override_at_home()
            {
                return overridden;
            }
            mode
        } else {
            match self.config.preferred_transport(self.capability) {
                PreferredTransport::Iwlan => PreferenceMode::WifiPreferred,
                PreferredTransport::Wwan | PreferredTransport::Both => {
                    PreferenceMode::CellularPreferred
                }
            }
        }
    }

    /// WLAN allowance: airplane-mode policy, roaming consent, and the
    /// capability's RAT preference under current facts.
    fn is_wlan_allowed(&self) -> bool {
        if self.airplane_mode && !self.config.wfc_allowed_in_airplane_mode() {
            return false;
        }
        if self.capability.is_ims_family() {
            return self.iwlan.is_cross_wfc || self.wfc.wfc_enabled(self.roaming());
        }
        if self.config.preferred_transport(self.capability) == PreferredTransport::Wwan {
            return false;
        }
        match self.config.rat_preference(self.capability) {
            RatPreference::Default | RatPreference::WifiOnly => true,
            RatPreference::WifiWhenWfcAvailable => self.ims_registered_over_wlan(),
            RatPreference::WifiWhenNoCellular => !self.telephony.cellular_available,
            RatPreference::WifiWhenHomeIsNotAvailable => {
                self.roaming() || !self.telephony.cellular_available
            }
        }
    }

    /// WWAN allowance: airplane-mode and capability transport policy.
    fn is_wwan_allowed(&self) -> bool {
        if self.airplane_mode {
            return false;
        }
        if self.capability.is_ims_family() {
            return self.preference_mode() != PreferenceMode::WifiOnly;
        }
        if self.config.preferred_transport(self.capability) == PreferredTransport::Iwlan {
            return false;
        }
        self.config.rat_preference(self.capability) != RatPreference::WifiOnly
    }

    fn ims_registered_over_wlan(&self) -> bool {
        matches!(
            self.ims_registration,
            Some(ImsRegistrationState::Registered {
                transport: TransportType::Wlan
            })
        )
    }

    fn threshold_ok(&self, threshold: &Threshold) -> bool {
        if threshold.access_network == AccessNetwork::Iwlan {
            // cross-SIM availability has no Wi-Fi link to measure
            if self.iwlan.is_cross_wfc {
                return true;
            }
            if threshold.wait_ms > 0 {
                return self
                    .wifi_monitor
                    .threshold_satisfied(self.capability, self.slot, threshold);
            }
            return self
                .wifi_monitor
                .snapshot()
                .get(threshold.access_network, threshold.measurement)
                .is_some_and(|v| threshold.matches(v));
        }
        // a cellular threshold is moot without cellular service
        if !self.telephony.cellular_available {
            return true;
        }
        if threshold.wait_ms > 0 {
            return self
                .cellular_monitor
                .threshold_satisfied(self.capability, self.slot, threshold);
        }
        self.cellular_monitor
            .snapshot()
            .get(threshold.access_network, threshold.measurement)
            .is_some_and(|v| threshold.matches(v))
    }

    fn groups_match(&self, policy: &AnspPolicy) -> bool {
        if policy.groups.is_empty() {
            return true;
        }
        policy
            .groups
            .iter()
            .any(|g| g.thresholds.iter().all(|t| self.threshold_ok(t)))
    }

    /// Handover-rule verdict for moving the active connection to `target`.
    /// First matching rule in declared order decides; with rules declared
    /// but none matching, IMS-family transitions default to allowed and
    /// the rest to denied.
    fn handover_permitted(&self, target: TransportType) -> bool {
        let Some(source) = self.active_transport else {
            return true;
        };
        if source == target {
            return true;
        }
        let source_an = match source {
            TransportType::Wlan => AccessNetwork::Iwlan,
            _ => self.telephony.data_network_type,
        };
        let target_an = match target {
            TransportType::Wlan => AccessNetwork::Iwlan,
            _ => self.telephony.data_network_type,
        };
        let policy = self.config.policy();
        if policy.handover_rules.is_empty() {
            return true;
        }
        for rule in &policy.handover_rules {
            if rule.applies(source_an, target_an, self.capability, self.roaming()) {
                return rule.kind == HandoverRuleKind::Allowed;
            }
        }
        self.capability.is_ims_family()
    }

    /// Collect the threshold interest of the policies driving the current
    /// arbitration and register it with the monitors, replacing the
    /// previous interest atomically. Each policy group registers per
    /// monitor with the thresholds that monitor can observe, so a crossing
    /// notifies as soon as any group's observable part matches.
    fn register_threshold_interest(&self, policies: &[&AnspPolicy]) {
        let mut cellular: Vec<Vec<Threshold>> = Vec::new();
        let mut wifi: Vec<Vec<Threshold>> = Vec::new();
        for policy in policies {
            for group in &policy.groups {
                let cell_part: Vec<Threshold> = group
                    .thresholds
                    .iter()
                    .filter(|t| t.access_network != AccessNetwork::Iwlan)
                    .copied()
                    .collect();
                let wifi_part: Vec<Threshold> = group
                    .thresholds
                    .iter()
                    .filter(|t| t.access_network == AccessNetwork::Iwlan)
                    .copied()
                    .collect();
                if !cell_part.is_empty() && !cellular.contains(&cell_part) {
                    cellular.push(cell_part);
                }
                if !wifi_part.is_empty() && !wifi.contains(&wifi_part) {
                    wifi.push(wifi_part);
                }
            }
        }
        self.cellular_monitor.update_thresholds_for_net_capability(
            self.capability,
            self.slot,
            cellular,
            self.self_tx.clone(),
        );
        self.wifi_monitor.update_thresholds_for_net_capability(
            self.capability,
            self.slot,
            wifi,
            self.self_tx.clone(),
        );
    }

    fn clear_threshold_interest(&self) {
        self.cellular_monitor
            .clear_thresholds(self.capability, self.slot);
        self.wifi_monitor.clear_thresholds(self.capability, self.slot);
    }

    /// The single-pass evaluation. Produces an emission only when the
    /// outcome differs from the last notified value.
    pub fn evaluate(&mut self) {
        if self.closed {
            return;
        }
        let now = Instant::now();
        let coverage = self.telephony.coverage;
        let preference = self.preference_mode();

        // step 1: transport-level viability
        let mut wlan_ok = self.is_wlan_allowed()
            && self.iwlan.iwlan_available
            && !self.restrict.is_restricted(TransportType::Wlan, now);
        let cellular_an = self.telephony.cellular_access_network();
        let mut wwan_ok = self.is_wwan_allowed()
            && cellular_an.is_some()
            && !self.restrict.is_restricted(TransportType::Wwan, now);

        // step 5: VoPS/MMTEL and VoLTE-roaming constraints on WWAN
        if self.capability == NetCapability::Ims
            && matches!(self.call_type, CallType::Voice | CallType::Video)
            && self.config.mmtel_capability_required()
            && !self.telephony.vops_supported
        {
            wwan_ok = false;
        }
        if self.capability == NetCapability::Ims
            && self.call_type == CallType::Voice
            && self.roaming()
            && !self.config.volte_roaming_supported()
        {
            wwan_ok = false;
        }
        // service barring on the serving network
        if self.capability == NetCapability::Ims
            && self.call_type == CallType::Voice
            && self.telephony.voice_barred
        {
            wwan_ok = false;
        }
        if self.capability == NetCapability::Eims && self.telephony.emergency_barred {
            wwan_ok = false;
        }

        // step 2: pre-condition
        let pre = PreCondition {
            call_type: self.call_type,
            preference,
            coverage,
            guarding: GuardingState::None,
        };

        // steps 3-4: threshold arbitration, only meaningful when both
        // transports are viable
        let mut wlan_qualified = wlan_ok;
        let mut wwan_qualified = wwan_ok;
        if wlan_ok && wwan_ok {
            let wlan_policy = self.ansp.first_candidate(TransportType::Wlan, &pre);
            let wwan_policy = self.ansp.first_candidate(TransportType::Wwan, &pre);
            let mut interest: Vec<&AnspPolicy> = Vec::new();
            if let Some(p) = wlan_policy {
                interest.push(p);
            }
            if let Some(p) = wwan_policy {
                interest.push(p);
            }

            wlan_qualified = match wlan_policy {
                Some(p) => self.groups_match(p),
                None => false,
            };
            wwan_qualified = match wwan_policy {
                Some(p) => self.groups_match(p),
                None => false,
            };

            // guarding: a threshold-arbitrated transition during the guard
            // window goes through only when the gap-tightened variant also
            // matches
            if self.guard.is_running() {
                let running = PreCondition {
                    guarding: GuardingState::Running,
                    ..pre
                };
                for (target, qualified, base) in [
                    (TransportType::Wlan, &mut wlan_qualified, wlan_policy),
                    (TransportType::Wwan, &mut wwan_qualified, wwan_policy),
                ] {
                    if !*qualified || Some(target) == self.current_preferred() {
                        continue;
                    }
                    let guarded = self.ansp.first_candidate(target, &running);
                    *qualified = match (guarded, base) {
                        (Some(g), Some(b)) if g.groups != b.groups => self.groups_match(g),
                        // no effective gap configured: hold until expiry
                        _ => false,
                    };
                    if let Some(g) = guarded {
                        interest.push(g);
                    }
                }
            }

            self.register_threshold_interest(&interest);
        } else {
            self.clear_threshold_interest();
        }

        // an emergency-preferred-transport hint from the modem pins the
        // EIMS choice to the hinted transport when it is viable
        if self.capability == NetCapability::Eims {
            match self.emergency_pref_transport {
                Some(TransportType::Wwan) => wwan_qualified = wwan_ok,
                Some(TransportType::Wlan) => wlan_qualified = wlan_ok,
                _ => {}
            }
        }

        // step 5: handover policy on the would-be transition
        if wlan_qualified && !self.handover_permitted(TransportType::Wlan) {
            wlan_qualified = false;
        }
        if wwan_qualified && !self.handover_permitted(TransportType::Wwan) {
            wwan_qualified = false;
        }

        // step 6: assemble the ordered list
        let arbitrated = wlan_ok && wwan_ok;
        let list = self.assemble(wlan_qualified, wwan_qualified, arbitrated, cellular_an, preference);
        self.emit(list, coverage, now);
    }

    fn current_preferred(&self) -> Option<TransportType> {
        self.last_notified
            .as_ref()
            .and_then(|info| info.access_networks.first())
            .map(|an| an.transport_type())
    }

    fn assemble(
        &self,
        wlan_qualified: bool,
        wwan_qualified: bool,
        arbitrated: bool,
        cellular_an: Option<AccessNetwork>,
        preference: PreferenceMode,
    ) -> Option<Vec<AccessNetwork>> {
        let mut list: Vec<AccessNetwork> = Vec::new();
        let wlan_first = match self.emergency_pref_transport {
            Some(TransportType::Wlan) if self.capability == NetCapability::Eims => true,
            Some(TransportType::Wwan) if self.capability == NetCapability::Eims => false,
            _ => matches!(
                preference,
                PreferenceMode::WifiPreferred | PreferenceMode::WifiOnly
            ),
        };
        let push_wlan = |list: &mut Vec<AccessNetwork>| {
            if wlan_qualified {
                list.push(AccessNetwork::Iwlan);
            }
        };
        let push_wwan = |list: &mut Vec<AccessNetwork>| {
            if wwan_qualified && let Some(an) = cellular_an {
                list.push(an);
            }
        };
        if wlan_first {
            push_wlan(&mut list);
            push_wwan(&mut list);
        } else {
            push_wwan(&mut list);
            push_wlan(&mut list);
        }

        if !list.is_empty() {
            return Some(list);
        }
        // nothing qualified: an explicit tear-down always surfaces; a
        // threshold stalemate between two viable transports retains the
        // last qualified network, as does the IMS family in general
        if self.pending_teardown {
            return Some(Vec::new());
        }
        if arbitrated || self.capability.is_ims_family() {
            return None;
        }
        Some(Vec::new())
    }

    fn emit(&mut self, list: Option<Vec<AccessNetwork>>, coverage: Coverage, now: Instant) {
        let Some(access_networks) = list else {
            return;
        };
        let mut info = QualifiedNetworksInfo::new(access_networks);
        if self.pending_teardown && !info.contains_transport(TransportType::Wlan) {
            info.notify_iwlan_disabled = true;
        }

        if info.access_networks.is_empty() && self.last_notified.is_none() {
            return;
        }
        if let Some(last) = &self.last_notified
            && last.same_as(&info)
        {
            return;
        }

        let previous = self.current_preferred();
        let preferred = info
            .access_networks
            .first()
            .map(|an| an.transport_type());
        info!(
            "slot {} {}: qualified networks {:?} (iwlan_disabled={})",
            self.slot, self.capability, info.access_networks, info.notify_iwlan_disabled
        );
        self.last_notified = Some(info.clone());
        self.pending_teardown = false;
        self.registrants.notify_all(&QualifiedNetworksUpdate {
            slot: self.slot,
            capability: self.capability,
            info,
        });

        // arm the guard after a transport transition
        if let Some(target) = preferred
            && previous.is_some()
            && previous != Some(target)
        {
            let configured = self
                .config
                .guarding_timer_ms(coverage, self.call_type, target);
            if configured > 0 {
                let clamped = configured
                    .max(self.config.minimum_guarding_timer_ms())
                    .min(self.config.guarding_timer_limit_ms());
                debug!(
                    "slot {} {}: guarding {target:?} for {clamped}ms",
                    self.slot, self.capability
                );
                self.guard
                    .start(Duration::from_millis(clamped), now);
            } else {
                self.guard.cancel();
            }
        }
    }

    fn on_ims_registration(&mut self, state: ImsRegistrationState) {
        self.ims_registration = Some(state);
        if !self.capability.is_ims_family() {
            return;
        }
        let now = Instant::now();
        match state {
            ImsRegistrationState::Registered { .. } => {
                self.restrict
                    .release(TransportType::Wlan, RestrictReason::ImsUnregisteredFallback);
            }
            ImsRegistrationState::Unregistered { reason_code }
            | ImsRegistrationState::AccessNetworkChangeFailed {
                reason_code,
                target_transport: _,
            } => {
                if let Some(reason) = reason_code {
                    self.apply_fallback_rules(reason, now);
                }
                if let ImsRegistrationState::AccessNetworkChangeFailed {
                    target_transport: TransportType::Wlan,
                    ..
                } = state
                {
                    // a failed handover toward Wi-Fi reads as a backhaul
                    // problem; hold WLAN briefly
                    self.restrict.restrict(
                        TransportType::Wlan,
                        RestrictReason::WifiBackhaulProblem,
                        Some(Duration::from_millis(
                            self.config.wifi_backhaul_restrict_time_ms(),
                        )),
                        now,
                    );
                }
            }
        }
    }

    fn apply_fallback_rules(&mut self, reason_code: i32, now: Instant) {
        let mode = self.preference_mode();
        let policy = self.config.policy();
        if let Some(rule) = policy
            .fallback_rules
            .iter()
            .find(|r| r.covers(reason_code, mode))
        {
            info!(
                "slot {} {}: fallback rule hit for reason {reason_code}, wlan held {}ms",
                self.slot, self.capability, rule.backoff_ms
            );
            self.restrict.restrict(
                TransportType::Wlan,
                RestrictReason::ImsUnregisteredFallback,
                Some(Duration::from_millis(rule.backoff_ms)),
                now,
            );
        }
    }

    fn on_data_connection(&mut self, transport: TransportType, state: DataConnectionState) {
        let previous = self
            .connection_states
            .insert(transport, state)
            .unwrap_or_default();
        match state {
            DataConnectionState::Connected => {
                self.active_transport = Some(transport);
                self.restrict.on_connection_established(transport);
            }
            DataConnectionState::HandoverInProgress => {
                self.active_transport = Some(transport);
            }
            DataConnectionState::Inactive => {
                if previous == DataConnectionState::Connecting
                    && let Some(rule) = self.config.initial_failure_rule(self.capability)
                {
                    self.restrict
                        .on_initial_connection_failed(transport, &rule, Instant::now());
                }
                if self.active_transport == Some(transport) {
                    self.active_transport = None;
                }
            }
            DataConnectionState::Connecting => {}
        }
    }
}

impl EventComponent for AccessNetworkEvaluator {
    type Event = QnsEvent;

    fn on_event(&mut self, event: QnsEvent) {
        if self.closed {
            return;
        }
        match event {
            QnsEvent::IwlanAvailabilityChanged(info) => {
                if info.notify_iwlan_disabled {
                    self.pending_teardown = true;
                }
                self.iwlan = info;
            }
            QnsEvent::TelephonyInfoChanged(info) => self.telephony = info,
            QnsEvent::CellularQualityChanged(_) | QnsEvent::WifiQualityChanged { .. } => {
                // snapshots are queried live during evaluation
            }
            QnsEvent::CallTypeChanged {
                call_type,
                emergency_over_ims,
            } => {
                self.call_type = call_type;
                self.emergency_over_ims = emergency_over_ims;
            }
            QnsEvent::ImsRegistrationChanged(state) => self.on_ims_registration(state),
            QnsEvent::WfcSettingsChanged(settings) => self.wfc = settings,
            QnsEvent::AirplaneModeChanged { enabled } => self.airplane_mode = enabled,
            QnsEvent::ProvisioningChanged(_) => {
                // thresholds or timers may have moved under the policy set
                self.ansp = AnspSet::build(&self.config, self.capability);
            }
            QnsEvent::EmergencyPreferredTransportChanged { transport } => {
                self.emergency_pref_transport = transport;
            }
            QnsEvent::DataConnectionChanged { transport, state } => {
                self.on_data_connection(transport, state);
            }
            QnsEvent::Throttled {
                transport,
                expiry_ms,
            } => {
                let duration = expiry_ms.map(Duration::from_millis);
                self.restrict.restrict(
                    transport,
                    RestrictReason::Throttled,
                    duration,
                    Instant::now(),
                );
            }
            QnsEvent::Unthrottled { transport } => {
                self.restrict.release(transport, RestrictReason::Throttled);
            }
            QnsEvent::RtpLowQuality => {
                if let Some(transport) = self.active_transport.or(self.current_preferred()) {
                    self.restrict.restrict(
                        transport,
                        RestrictReason::RtpLowQuality,
                        Some(Duration::from_millis(
                            self.config.rtp_low_quality_restrict_time_ms(),
                        )),
                        Instant::now(),
                    );
                }
            }
            QnsEvent::TryWfcConnection => {
                self.restrict
                    .release(TransportType::Wlan, RestrictReason::WifiBackhaulProblem);
            }
            QnsEvent::ConfigUpdated { policy_changed } => {
                if policy_changed {
                    self.ansp = AnspSet::build(&self.config, self.capability);
                }
            }
            QnsEvent::Rebuild => {
                self.ansp = AnspSet::build(&self.config, self.capability);
            }
        }
        self.evaluate();
    }

    fn next_deadline(&self) -> Option<Instant> {
        match (self.guard.next_deadline(), self.restrict.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn on_timer(&mut self, now: Instant) {
        let guard_expired = self.guard.on_timer(now);
        let restriction_lapsed = self.restrict.on_timer(now);
        if guard_expired || restriction_lapsed {
            self.evaluate();
            self.guard.acknowledge_expiry();
        }
    }
}
