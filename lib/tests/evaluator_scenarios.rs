//! End-to-end decision scenarios driven through the public surface with
//! virtual time: rove-in with backhaul dwell, guarding hysteresis,
//! handover policy, emergency-over-IMS routing, cross-SIM availability,
//! and IPv6-only Wi-Fi blocking.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use qns::components::QnsComponents;
use qns::config::QnsConfigManager;
use qns::config::bundle::{ConfigBundle, ConfigValue};
use qns::config::keys;
use qns::evaluator::{AccessNetworkEvaluator, QualifiedNetworksUpdate};
use qns::event::{EventComponent, FeedEvent, QnsEvent, event_channel};
use qns::monitor::{MonitorKind, QualityMonitor};
use qns::tracker::ims::WfcSettings;
use qns::types::{
    AccessNetwork, CallServiceType, CallState, CallType, DataConnectionState, ImsCallType,
    IwlanAvailabilityInfo, NetCapability, PreciseCallState, PreferenceMode, QnsTelephonyInfo,
    QualifiedNetworksInfo, SignalMeasurement, TransportType,
};

struct Bench {
    evaluator: AccessNetworkEvaluator,
    updates: tokio::sync::mpsc::UnboundedReceiver<QualifiedNetworksUpdate>,
    cellular: Arc<QualityMonitor>,
    wifi: Arc<QualityMonitor>,
}

fn bench(capability: NetCapability, pairs: Vec<(&str, ConfigValue)>) -> Bench {
    let config = Arc::new(QnsConfigManager::new(0));
    config.update_carrier_config(1, ConfigBundle::from_pairs(pairs));
    let cellular = QualityMonitor::new(MonitorKind::Cellular);
    let wifi = QualityMonitor::new(MonitorKind::Wifi);
    let (self_tx, _self_rx) = event_channel();
    let mut evaluator = AccessNetworkEvaluator::new(
        0,
        capability,
        config,
        cellular.clone(),
        wifi.clone(),
        self_tx,
    );
    let (tx, updates) = event_channel();
    evaluator.register_qualified_networks_changed(tx);
    Bench {
        evaluator,
        updates,
        cellular,
        wifi,
    }
}

fn telephony(network: AccessNetwork) -> QnsTelephonyInfo {
    QnsTelephonyInfo {
        cellular_available: true,
        data_registered: true,
        data_network_type: network,
        voice_network_type: network,
        registered_plmn: Some("310260".to_string()),
        vops_supported: true,
        ..QnsTelephonyInfo::default()
    }
}

fn wifi_preferred() -> WfcSettings {
    WfcSettings {
        user_enabled: true,
        roaming_user_enabled: true,
        mode_home: PreferenceMode::WifiPreferred,
        ..WfcSettings::default()
    }
}

fn iwlan_up() -> IwlanAvailabilityInfo {
    IwlanAvailabilityInfo {
        iwlan_available: true,
        is_cross_wfc: false,
        notify_iwlan_disabled: false,
    }
}

fn next(bench: &mut Bench) -> Option<QualifiedNetworksInfo> {
    bench.updates.try_recv().ok().map(|u| u.info)
}

fn wifi_rssi(bench: &mut Bench, rssi: i32) {
    bench.wifi.on_measurement(
        AccessNetwork::Iwlan,
        SignalMeasurement::Rssi,
        rssi,
        Instant::now(),
    );
    bench
        .evaluator
        .on_event(QnsEvent::WifiQualityChanged { rssi: Some(rssi) });
}

/// Fire pending dwell/guard timers up to the current instant.
fn run_timers(bench: &mut Bench) {
    let now = Instant::now();
    if bench.wifi.next_deadline().is_some_and(|at| at <= now) {
        bench.wifi.on_timer(now);
        bench
            .evaluator
            .on_event(QnsEvent::WifiQualityChanged { rssi: None });
    }
    if bench.cellular.next_deadline().is_some_and(|at| at <= now) {
        bench.cellular.on_timer(now);
        bench
            .evaluator
            .on_event(QnsEvent::CellularQualityChanged(bench.cellular.snapshot()));
    }
    if bench.evaluator.next_deadline().is_some_and(|at| at <= now) {
        bench.evaluator.on_timer(now);
    }
}

#[tokio::test(start_paused = true)]
async fn scenario_rove_in_with_backhaul() {
    let mut b = bench(NetCapability::Ims, vec![]);
    b.evaluator
        .on_event(QnsEvent::TelephonyInfoChanged(telephony(AccessNetwork::Eutran)));
    assert_eq!(
        next(&mut b).unwrap().access_networks,
        vec![AccessNetwork::Eutran]
    );

    b.evaluator.on_event(QnsEvent::WfcSettingsChanged(wifi_preferred()));
    b.evaluator
        .on_event(QnsEvent::IwlanAvailabilityChanged(iwlan_up()));
    b.cellular.on_measurement(
        AccessNetwork::Eutran,
        SignalMeasurement::Rsrp,
        -105,
        Instant::now(),
    );

    // weak wifi: nothing happens
    wifi_rssi(&mut b, -70);
    assert!(next(&mut b).is_none());

    // t=0: wifi reaches -60; backhaul dwell of 3000ms begins
    wifi_rssi(&mut b, -60);
    assert!(next(&mut b).is_none());

    tokio::time::advance(Duration::from_millis(2999)).await;
    run_timers(&mut b);
    assert!(next(&mut b).is_none());

    // t=3000: dwell satisfied, rove-in
    tokio::time::advance(Duration::from_millis(1)).await;
    run_timers(&mut b);
    assert_eq!(
        next(&mut b).unwrap().access_networks,
        vec![AccessNetwork::Iwlan]
    );
}

#[tokio::test(start_paused = true)]
async fn scenario_rove_in_cancelled_by_rssi_drop() {
    let mut b = bench(NetCapability::Ims, vec![]);
    b.evaluator
        .on_event(QnsEvent::TelephonyInfoChanged(telephony(AccessNetwork::Eutran)));
    next(&mut b);
    b.evaluator.on_event(QnsEvent::WfcSettingsChanged(wifi_preferred()));
    b.evaluator
        .on_event(QnsEvent::IwlanAvailabilityChanged(iwlan_up()));

    wifi_rssi(&mut b, -60);

    // t=2000: signal drops out of range; the pending report is cancelled
    tokio::time::advance(Duration::from_millis(2000)).await;
    wifi_rssi(&mut b, -70);

    tokio::time::advance(Duration::from_millis(5000)).await;
    run_timers(&mut b);
    assert!(next(&mut b).is_none());
    assert_eq!(
        b.evaluator.last_notified().unwrap().access_networks,
        vec![AccessNetwork::Eutran]
    );
}

#[tokio::test(start_paused = true)]
async fn scenario_guarding_blocks_rapid_flap() {
    let mut b = bench(
        NetCapability::Ims,
        vec![("qns.guarding_timer_ms.home.idle", ConfigValue::Int(10_000))],
    );
    b.evaluator
        .on_event(QnsEvent::TelephonyInfoChanged(telephony(AccessNetwork::Eutran)));
    next(&mut b);
    b.evaluator.on_event(QnsEvent::WfcSettingsChanged(wifi_preferred()));
    b.evaluator
        .on_event(QnsEvent::IwlanAvailabilityChanged(iwlan_up()));

    wifi_rssi(&mut b, -60);
    tokio::time::advance(Duration::from_millis(3000)).await;
    run_timers(&mut b);
    // t=0 for the guard: [IWLAN] emitted, 10s guard armed
    assert_eq!(
        next(&mut b).unwrap().access_networks,
        vec![AccessNetwork::Iwlan]
    );

    // t=3000: wifi collapses below the rove-out level
    tokio::time::advance(Duration::from_millis(3000)).await;
    wifi_rssi(&mut b, -85);
    // rove-out matches, but the guard defers the transition
    assert!(next(&mut b).is_none());
    assert_eq!(
        b.evaluator.last_notified().unwrap().access_networks,
        vec![AccessNetwork::Iwlan]
    );

    // guard expiry at t=13000 releases the deferred transition
    tokio::time::advance(Duration::from_millis(7000)).await;
    run_timers(&mut b);
    assert_eq!(
        next(&mut b).unwrap().access_networks,
        vec![AccessNetwork::Eutran]
    );
}

#[tokio::test(start_paused = true)]
async fn scenario_threshold_gap_allows_early_exit_from_guard() {
    let mut b = bench(
        NetCapability::Ims,
        vec![
            ("qns.guarding_timer_ms.home.idle", ConfigValue::Int(10_000)),
            (
                keys::THRESHOLD_GAP_RULES,
                ConfigValue::StringArray(vec!["iwlan:rssi:5".to_string()]),
            ),
        ],
    );
    b.evaluator
        .on_event(QnsEvent::TelephonyInfoChanged(telephony(AccessNetwork::Eutran)));
    next(&mut b);
    b.evaluator.on_event(QnsEvent::WfcSettingsChanged(wifi_preferred()));
    b.evaluator
        .on_event(QnsEvent::IwlanAvailabilityChanged(iwlan_up()));

    wifi_rssi(&mut b, -60);
    tokio::time::advance(Duration::from_millis(3000)).await;
    run_timers(&mut b);
    assert_eq!(
        next(&mut b).unwrap().access_networks,
        vec![AccessNetwork::Iwlan]
    );

    // -85 also crosses the gap-tightened rove-out threshold (-80 - 5):
    // the guard does not hold the transition
    tokio::time::advance(Duration::from_millis(3000)).await;
    wifi_rssi(&mut b, -85);
    assert_eq!(
        next(&mut b).unwrap().access_networks,
        vec![AccessNetwork::Eutran]
    );
}

#[tokio::test(start_paused = true)]
async fn scenario_handover_policy_deny() {
    let mut b = bench(
        NetCapability::Ims,
        vec![(
            keys::HANDOVER_RULES,
            ConfigValue::StringArray(vec![
                "source=iwlan, target=utran, type=disallowed, capabilities=ims".to_string(),
            ]),
        )],
    );
    b.evaluator.on_event(QnsEvent::WfcSettingsChanged(wifi_preferred()));
    b.evaluator
        .on_event(QnsEvent::IwlanAvailabilityChanged(iwlan_up()));
    assert_eq!(
        next(&mut b).unwrap().access_networks,
        vec![AccessNetwork::Iwlan]
    );
    b.evaluator.on_event(QnsEvent::DataConnectionChanged {
        transport: TransportType::Wlan,
        state: DataConnectionState::Connected,
    });
    b.evaluator.on_event(QnsEvent::CallTypeChanged {
        call_type: CallType::Voice,
        emergency_over_ims: false,
    });

    // cellular comes back as UMTS only, wifi degrades: rove-out would
    // target UTRAN, which the carrier forbids mid-call
    b.evaluator
        .on_event(QnsEvent::TelephonyInfoChanged(telephony(AccessNetwork::Utran)));
    b.cellular.on_measurement(
        AccessNetwork::Utran,
        SignalMeasurement::Rscp,
        -90,
        Instant::now(),
    );
    wifi_rssi(&mut b, -85);

    assert_eq!(
        b.evaluator.last_notified().unwrap().access_networks,
        vec![AccessNetwork::Iwlan]
    );
}

#[tokio::test(start_paused = true)]
async fn scenario_emergency_over_ims() {
    let mut components = QnsComponents::new(None);
    components.register_slot(0).await;

    // IMS data connection active, no EIMS connection
    components
        .dispatch(FeedEvent::DataConnection {
            slot: 0,
            capability: NetCapability::Ims,
            transport: TransportType::Wwan,
            state: DataConnectionState::Connected,
        })
        .await;
    components
        .dispatch(FeedEvent::PreciseCallStates {
            slot: 0,
            calls: vec![CallState {
                call_id: 1,
                service_type: CallServiceType::Emergency,
                call_type: ImsCallType::Voice,
                state: PreciseCallState::Active,
            }],
        })
        .await;

    // the emergency rides the IMS track, the EIMS track stays idle
    assert_eq!(
        components.current_call_type(0, NetCapability::Ims),
        Some(CallType::Emergency)
    );
    assert_eq!(
        components.current_call_type(0, NetCapability::Eims),
        Some(CallType::Idle)
    );
    assert!(components.is_emergency_over_ims(0));

    // call ends: the sticky flag clears
    components
        .dispatch(FeedEvent::PreciseCallStates {
            slot: 0,
            calls: vec![],
        })
        .await;
    assert!(!components.is_emergency_over_ims(0));
}

#[tokio::test(start_paused = true)]
async fn scenario_cross_sim_availability() {
    let mut components = QnsComponents::new(None);
    components.register_slot(0).await;
    components.register_slot(1).await;

    components
        .dispatch(FeedEvent::SlotSubId {
            slot: 0,
            sub_id: Some(101),
        })
        .await;
    components
        .dispatch(FeedEvent::SlotSubId {
            slot: 1,
            sub_id: Some(102),
        })
        .await;
    components
        .dispatch(FeedEvent::DefaultDataSub { sub_id: Some(101) })
        .await;
    components
        .dispatch(FeedEvent::CrossSimSetting {
            slot: 1,
            enabled: true,
        })
        .await;
    components
        .dispatch(FeedEvent::IwlanRegistered {
            slot: 1,
            registered: true,
        })
        .await;

    // default network becomes cellular on the slot-0 subscription
    components
        .dispatch(FeedEvent::DefaultNetworkAvailable {
            transport: TransportType::Wwan,
            cellular_sub_id: Some(101),
        })
        .await;

    let info = components.last_iwlan_info(1).unwrap();
    assert!(info.iwlan_available);
    assert!(info.is_cross_wfc);
    // slot 0 rides the DDS itself: no cross-SIM availability
    assert_ne!(
        components.last_iwlan_info(0).map(|i| i.iwlan_available),
        Some(true)
    );
}

#[tokio::test(start_paused = true)]
async fn scenario_ipv6_only_wifi_blocked() {
    let mut components = QnsComponents::new(None);
    components.register_slot(0).await;
    components
        .dispatch(FeedEvent::CarrierConfig {
            slot: 0,
            carrier_id: 1881,
            overrides: HashMap::from([(
                keys::BLOCK_IPV6_ONLY_WIFI.to_string(),
                ConfigValue::Bool(true),
            )]),
        })
        .await;

    components
        .dispatch(FeedEvent::IwlanRegistered {
            slot: 0,
            registered: true,
        })
        .await;
    components
        .dispatch(FeedEvent::DefaultNetworkAvailable {
            transport: TransportType::Wlan,
            cellular_sub_id: None,
        })
        .await;
    assert_eq!(
        components.last_iwlan_info(0).map(|i| i.iwlan_available),
        Some(true)
    );

    // link turns IPv6-only: availability is withdrawn with the tear-down
    // flag since Wi-Fi had been reported available
    components
        .dispatch(FeedEvent::DefaultNetworkLinkProperties {
            has_ipv4: false,
            has_ipv6: true,
        })
        .await;
    let info = components.last_iwlan_info(0).unwrap();
    assert!(!info.iwlan_available);
    assert!(info.notify_iwlan_disabled);
}

#[tokio::test(start_paused = true)]
async fn invariant_no_adjacent_equal_emissions() {
    let mut b = bench(NetCapability::Ims, vec![]);
    for _ in 0..5 {
        b.evaluator
            .on_event(QnsEvent::TelephonyInfoChanged(telephony(AccessNetwork::Eutran)));
    }
    let mut emissions = Vec::new();
    while let Some(info) = next(&mut b) {
        emissions.push(info);
    }
    assert_eq!(emissions.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn invariant_guard_timer_clamped_to_minimum() {
    let mut b = bench(
        NetCapability::Ims,
        vec![
            ("qns.guarding_timer_ms.home.idle", ConfigValue::Int(2000)),
            (keys::MINIMUM_GUARDING_TIMER_MS, ConfigValue::Int(5000)),
        ],
    );
    b.evaluator
        .on_event(QnsEvent::TelephonyInfoChanged(telephony(AccessNetwork::Eutran)));
    next(&mut b);
    b.evaluator.on_event(QnsEvent::WfcSettingsChanged(wifi_preferred()));
    b.evaluator
        .on_event(QnsEvent::IwlanAvailabilityChanged(iwlan_up()));
    wifi_rssi(&mut b, -60);
    tokio::time::advance(Duration::from_millis(3000)).await;
    run_timers(&mut b);
    assert_eq!(
        next(&mut b).unwrap().access_networks,
        vec![AccessNetwork::Iwlan]
    );

    // configured 2000ms is raised to the 5000ms minimum
    let deadline = b.evaluator.next_deadline().unwrap();
    assert_eq!(deadline, Instant::now() + Duration::from_millis(5000));
}

#[tokio::test(start_paused = true)]
async fn invariant_wwan_only_capability_never_emits_iwlan() {
    let mut b = bench(NetCapability::Xcap, vec![]);
    b.evaluator
        .on_event(QnsEvent::TelephonyInfoChanged(telephony(AccessNetwork::Ngran)));
    b.evaluator
        .on_event(QnsEvent::IwlanAvailabilityChanged(iwlan_up()));
    wifi_rssi(&mut b, -40);

    let mut saw_iwlan = false;
    while let Some(info) = next(&mut b) {
        saw_iwlan |= info.access_networks.contains(&AccessNetwork::Iwlan);
    }
    assert!(!saw_iwlan);
    assert_eq!(
        b.evaluator.last_notified().unwrap().access_networks,
        vec![AccessNetwork::Ngran]
    );
}
