//! Call status tracker.
//!
//! Consumes precise-call-state snapshots and SRVCC-completed signals and
//! derives one current call type per track (normal and emergency). An
//! emergency call carried over the IMS data connection (no EIMS connection
//! established) is reported on the IMS track with a sticky flag until the
//! emergency call leaves the list.

use log::{info, warn};

use crate::event::{EventSender, QnsEvent, RegistrantId, Registrants};
use crate::types::{
    CallServiceType, CallState, CallType, DataConnectionState, ImsCallType, NetCapability,
    PreciseCallState, SlotId, TransportType,
};

pub struct CallStatusTracker {
    slot: SlotId,
    calls: Vec<CallState>,
    normal_call_type: CallType,
    emergency_call_type: CallType,
    emergency_over_ims: bool,
    ims_data_connected: bool,
    eims_data_connected: bool,
    ims_registrants: Registrants<QnsEvent>,
    eims_registrants: Registrants<QnsEvent>,
}

impl CallStatusTracker {
    pub fn new(slot: SlotId) -> Self {
        CallStatusTracker {
            slot,
            calls: Vec::new(),
            normal_call_type: CallType::Idle,
            emergency_call_type: CallType::Idle,
            emergency_over_ims: false,
            ims_data_connected: false,
            eims_data_connected: false,
            ims_registrants: Registrants::default(),
            eims_registrants: Registrants::default(),
        }
    }

    /// Register for call-type transitions on the normal (IMS) track. The
    /// current value is delivered synchronously.
    pub fn register_ims(&mut self, sender: EventSender<QnsEvent>) -> RegistrantId {
        let id = self.ims_registrants.register(sender);
        self.ims_registrants.notify_one(
            id,
            &QnsEvent::CallTypeChanged {
                call_type: self.normal_call_type,
                emergency_over_ims: self.emergency_over_ims,
            },
        );
        id
    }

    /// Register for call-type transitions on the emergency (EIMS) track.
    pub fn register_eims(&mut self, sender: EventSender<QnsEvent>) -> RegistrantId {
        let id = self.eims_registrants.register(sender);
        self.eims_registrants.notify_one(
            id,
            &QnsEvent::CallTypeChanged {
                call_type: self.emergency_call_type,
                emergency_over_ims: false,
            },
        );
        id
    }

    pub fn unregister(&mut self, id: RegistrantId) {
        if !self.ims_registrants.unregister(id) {
            self.eims_registrants.unregister(id);
        }
    }

    pub fn call_type(&self, capability: NetCapability) -> CallType {
        match capability {
            NetCapability::Eims => self.emergency_call_type,
            _ => self.normal_call_type,
        }
    }

    pub fn is_emergency_over_ims(&self) -> bool {
        self.emergency_over_ims
    }

    /// New precise-call-state snapshot. DISCONNECTED entries are dropped on
    /// ingest; at most one emergency call may remain.
    pub fn on_precise_call_states(&mut self, calls: Vec<CallState>) {
        let mut kept: Vec<CallState> = calls
            .into_iter()
            .filter(|c| c.state != PreciseCallState::Disconnected)
            .collect();
        let emergency_count = kept
            .iter()
            .filter(|c| c.service_type == CallServiceType::Emergency)
            .count();
        if emergency_count > 1 {
            warn!(
                "slot {}: {} emergency calls in snapshot, keeping the first",
                self.slot, emergency_count
            );
            let mut seen_emergency = false;
            kept.retain(|c| {
                if c.service_type != CallServiceType::Emergency {
                    return true;
                }
                if seen_emergency {
                    return false;
                }
                seen_emergency = true;
                true
            });
        }
        self.calls = kept;
        self.derive_and_notify();
    }

    /// SRVCC moved the voice call to CS: the IMS call list empties and both
    /// tracks drop to IDLE in one step.
    pub fn on_srvcc_completed(&mut self) {
        info!("slot {}: srvcc completed, clearing call list", self.slot);
        self.calls.clear();
        self.derive_and_notify();
    }

    /// Data-connection transitions for IMS/EIMS, used to route emergency
    /// calls riding the IMS connection.
    pub fn on_data_connection(
        &mut self,
        capability: NetCapability,
        _transport: TransportType,
        state: DataConnectionState,
    ) {
        let connected = matches!(
            state,
            DataConnectionState::Connected | DataConnectionState::HandoverInProgress
        );
        match capability {
            NetCapability::Ims => self.ims_data_connected = connected,
            NetCapability::Eims => self.eims_data_connected = connected,
            _ => return,
        }
        self.derive_and_notify();
    }

    fn derive_and_notify(&mut self) {
        let has_emergency = self
            .calls
            .iter()
            .any(|c| c.service_type == CallServiceType::Emergency);
        let has_voice = self.calls.iter().any(|c| {
            c.service_type == CallServiceType::Normal && c.call_type == ImsCallType::Voice
        });
        let has_video = self.calls.iter().any(|c| {
            c.service_type == CallServiceType::Normal
                && c.call_type == ImsCallType::Vt
                && !c.state.is_setup()
        });

        let normal_base = if has_voice {
            CallType::Voice
        } else if has_video {
            CallType::Video
        } else {
            CallType::Idle
        };

        let (normal, emergency, over_ims) = if has_emergency {
            if !self.eims_data_connected && self.ims_data_connected {
                (CallType::Emergency, CallType::Idle, true)
            } else {
                (normal_base, CallType::Emergency, false)
            }
        } else {
            (normal_base, CallType::Idle, false)
        };

        // both tracks update before either listener hears about it
        let normal_changed =
            normal != self.normal_call_type || over_ims != self.emergency_over_ims;
        let emergency_changed = emergency != self.emergency_call_type;
        self.normal_call_type = normal;
        self.emergency_call_type = emergency;
        self.emergency_over_ims = over_ims;

        if normal_changed {
            info!(
                "slot {}: call type (normal) -> {normal:?}, emergency_over_ims={over_ims}",
                self.slot
            );
            self.ims_registrants.notify_all(&QnsEvent::CallTypeChanged {
                call_type: normal,
                emergency_over_ims: over_ims,
            });
        }
        if emergency_changed {
            info!(
                "slot {}: call type (emergency) -> {emergency:?}",
                self.slot
            );
            self.eims_registrants.notify_all(&QnsEvent::CallTypeChanged {
                call_type: emergency,
                emergency_over_ims: false,
            });
        }
    }
}
