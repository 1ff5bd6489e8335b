//! IMS state manager.
//!
//! Read-only view of IMS service availability, cached registration state
//! (new sinks receive the current value synchronously), and the derived
//! WFC configuration (platform, user, provisioning, roaming, cross-SIM,
//! preference mode). The one formerly blocking call in the design, the
//! MMTEL feature-state query, is expressed as an awaitable with a bounded
//! wait instead of a thread semaphore.

use std::sync::Arc;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::config::QnsConfigManager;
use crate::event::{EventSender, QnsEvent, RegistrantId, Registrants};
use crate::types::{ImsRegistrationState, PreferenceMode, SlotId, TransportType};

/// Bound on the MMTEL feature-state wait.
const FEATURE_STATE_TIMEOUT: Duration = Duration::from_secs(2);

/// Two-valued error kind for IMS operations that must distinguish a downed
/// service from a missing provisioning/capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ImsError {
    #[error("ims service is not available")]
    ServiceDown,
    #[error("not supported or not provisioned")]
    NotSupported,
}

/// Derived WFC configuration snapshot carried to the evaluators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WfcSettings {
    pub platform_enabled: bool,
    pub user_enabled: bool,
    pub roaming_user_enabled: bool,
    pub provisioned: bool,
    pub cross_sim_enabled: bool,
    pub mode_home: PreferenceMode,
    pub mode_roaming: PreferenceMode,
}

impl Default for WfcSettings {
    fn default() -> Self {
        WfcSettings {
            platform_enabled: true,
            user_enabled: false,
            roaming_user_enabled: false,
            provisioned: true,
            cross_sim_enabled: false,
            mode_home: PreferenceMode::CellularPreferred,
            mode_roaming: PreferenceMode::CellularPreferred,
        }
    }
}

impl WfcSettings {
    /// WFC usable at all under the given coverage.
    pub fn wfc_enabled(&self, roaming: bool) -> bool {
        self.platform_enabled
            && self.provisioned
            && self.user_enabled
            && (!roaming || self.roaming_user_enabled)
    }

    pub fn mode(&self, roaming: bool) -> PreferenceMode {
        if roaming {
            self.mode_roaming
        } else {
            self.mode_home
        }
    }
}

pub struct QnsImsManager {
    slot: SlotId,
    config: Arc<QnsConfigManager>,
    ims_available: bool,
    registration: Option<ImsRegistrationState>,
    // platform derivation inputs
    platform_property_override: bool,
    device_resource_allows: bool,
    carrier_allows_wfc: bool,
    gba_valid: bool,
    // provisioning inputs
    wfc_provisioned: bool,
    volte_provisioned: bool,
    volte_overrides_wfc_provisioning: bool,
    // user settings; None falls back to the carrier default
    user_wfc_enabled: Option<bool>,
    user_wfc_roaming_enabled: Option<bool>,
    user_mode_home: Option<PreferenceMode>,
    user_mode_roaming: Option<PreferenceMode>,
    cross_sim_user_enabled: bool,
    cross_sim_platform_enabled: bool,
    mmtel_voice: watch::Sender<Option<bool>>,
    last_settings: WfcSettings,
    registrants: Registrants<QnsEvent>,
}

impl QnsImsManager {
    pub fn new(slot: SlotId, config: Arc<QnsConfigManager>) -> Self {
        let (mmtel_voice, _) = watch::channel(None);
        let mut mgr = QnsImsManager {
            slot,
            config,
            ims_available: false,
            registration: None,
            platform_property_override: false,
            device_resource_allows: true,
            carrier_allows_wfc: true,
            gba_valid: true,
            wfc_provisioned: true,
            volte_provisioned: true,
            volte_overrides_wfc_provisioning: false,
            user_wfc_enabled: None,
            user_wfc_roaming_enabled: None,
            user_mode_home: None,
            user_mode_roaming: None,
            cross_sim_user_enabled: false,
            cross_sim_platform_enabled: true,
            mmtel_voice,
            last_settings: WfcSettings::default(),
            registrants: Registrants::default(),
        };
        mgr.last_settings = mgr.settings();
        mgr
    }

    /// Register for registration-state and WFC-setting events. The cached
    /// current values are delivered synchronously.
    pub fn register(&mut self, sender: EventSender<QnsEvent>) -> RegistrantId {
        let id = self.registrants.register(sender);
        self.registrants
            .notify_one(id, &QnsEvent::WfcSettingsChanged(self.last_settings));
        if let Some(state) = self.registration {
            self.registrants
                .notify_one(id, &QnsEvent::ImsRegistrationChanged(state));
        }
        id
    }

    pub fn unregister(&mut self, id: RegistrantId) {
        self.registrants.unregister(id);
    }

    pub fn on_ims_state(&mut self, available: bool) {
        if self.ims_available != available {
            info!("slot {}: ims service available={available}", self.slot);
        }
        self.ims_available = available;
        if !available {
            // feature state is stale once the service drops
            let _ = self.mmtel_voice.send(None);
        }
    }

    pub fn on_registration(&mut self, state: ImsRegistrationState) {
        info!("slot {}: ims registration {state:?}", self.slot);
        self.registration = Some(state);
        self.registrants
            .notify_all(&QnsEvent::ImsRegistrationChanged(state));
    }

    pub fn on_mmtel_capability(&mut self, voice_capable: bool) {
        let _ = self.mmtel_voice.send(Some(voice_capable));
    }

    pub fn on_wfc_user_setting(&mut self, enabled: bool) {
        self.user_wfc_enabled = Some(enabled);
        self.publish_settings();
    }

    pub fn on_wfc_roaming_setting(&mut self, enabled: bool) {
        self.user_wfc_roaming_enabled = Some(enabled);
        self.publish_settings();
    }

    pub fn on_wfc_platform_setting(&mut self, enabled: bool) {
        self.carrier_allows_wfc = enabled;
        self.publish_settings();
    }

    pub fn on_wfc_mode(&mut self, roaming: bool, mode: PreferenceMode) {
        if roaming {
            self.user_mode_roaming = Some(mode);
        } else {
            self.user_mode_home = Some(mode);
        }
        self.publish_settings();
    }

    pub fn on_cross_sim_setting(&mut self, enabled: bool) {
        self.cross_sim_user_enabled = enabled;
        self.publish_settings();
    }

    pub fn set_platform_property_override(&mut self, enabled: bool) {
        self.platform_property_override = enabled;
        self.publish_settings();
    }

    pub fn set_volte_overrides_wfc_provisioning(&mut self, enabled: bool) {
        self.volte_overrides_wfc_provisioning = enabled;
        self.publish_settings();
    }

    pub fn set_wfc_provisioned(&mut self, provisioned: bool) {
        self.wfc_provisioned = provisioned;
        self.publish_settings();
    }

    pub fn is_ims_available(&self) -> bool {
        self.ims_available
    }

    pub fn registration(&self) -> Option<ImsRegistrationState> {
        self.registration
    }

    pub fn is_registered_over(&self, transport: TransportType) -> bool {
        matches!(
            self.registration,
            Some(ImsRegistrationState::Registered { transport: t }) if t == transport
        )
    }

    pub fn is_wfc_enabled_by_platform(&self) -> bool {
        self.platform_property_override
            || (self.device_resource_allows && self.carrier_allows_wfc && self.gba_valid)
    }

    pub fn is_wfc_enabled_by_user(&self) -> bool {
        self.user_wfc_enabled
            .unwrap_or_else(|| self.config.default_wfc_enabled(false))
    }

    pub fn is_wfc_roaming_enabled_by_user(&self) -> bool {
        self.user_wfc_roaming_enabled
            .or_else(|| self.config.provisioned_wfc_roaming_enabled())
            .unwrap_or_else(|| self.config.default_wfc_enabled(true))
    }

    pub fn is_wfc_provisioned_on_device(&self) -> bool {
        if self.volte_overrides_wfc_provisioning {
            self.wfc_provisioned || self.volte_provisioned
        } else {
            self.wfc_provisioned
        }
    }

    /// Cross-SIM calling: user-enabled, platform-enabled and provisioned.
    /// Distinguishes an unprovisioned device from a downed service.
    pub fn cross_sim_calling_enabled(&self) -> Result<bool, ImsError> {
        if !self.is_wfc_provisioned_on_device() {
            return Err(ImsError::NotSupported);
        }
        Ok(self.cross_sim_user_enabled && self.cross_sim_platform_enabled)
    }

    pub fn get_wfc_mode(&self, roaming: bool) -> PreferenceMode {
        let user = if roaming {
            self.user_mode_roaming
        } else {
            self.user_mode_home
        };
        user.unwrap_or_else(|| self.config.default_wfc_mode(roaming))
    }

    pub fn settings(&self) -> WfcSettings {
        WfcSettings {
            platform_enabled: self.is_wfc_enabled_by_platform(),
            user_enabled: self.is_wfc_enabled_by_user(),
            roaming_user_enabled: self.is_wfc_roaming_enabled_by_user(),
            provisioned: self.is_wfc_provisioned_on_device(),
            cross_sim_enabled: self.cross_sim_calling_enabled().unwrap_or(false),
            mode_home: self.get_wfc_mode(false),
            mode_roaming: self.get_wfc_mode(true),
        }
    }

    /// Begin an MMTEL voice feature-state query. The returned handle waits
    /// for the feed with a bounded timeout; holding it does not borrow the
    /// manager.
    pub fn mmtel_voice_query(&self) -> MmtelVoiceQuery {
        MmtelVoiceQuery {
            available: self.ims_available,
            rx: self.mmtel_voice.subscribe(),
        }
    }

    fn publish_settings(&mut self) {
        let settings = self.settings();
        if settings == self.last_settings {
            return;
        }
        self.last_settings = settings;
        self.registrants
            .notify_all(&QnsEvent::WfcSettingsChanged(settings));
    }
}

/// Bounded MMTEL voice feature-state wait.
pub struct MmtelVoiceQuery {
    available: bool,
    rx: watch::Receiver<Option<bool>>,
}

impl MmtelVoiceQuery {
    pub async fn wait(mut self) -> Result<bool, ImsError> {
        if !self.available {
            return Err(ImsError::ServiceDown);
        }
        match timeout(FEATURE_STATE_TIMEOUT, self.rx.wait_for(Option::is_some)).await {
            Ok(Ok(value)) => (*value).ok_or(ImsError::ServiceDown),
            // sender dropped or timeout: callers treat both as unavailable
            Ok(Err(_)) | Err(_) => Err(ImsError::ServiceDown),
        }
    }
}
