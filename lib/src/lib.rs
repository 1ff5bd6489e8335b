/// Initialize logging with the given default level. Respects `RUST_LOG`
/// overrides.
pub fn init_logging(default_level: log::LevelFilter) {
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();
}

pub mod components;
pub mod config;
pub mod evaluator;
pub mod event;
pub mod monitor;
pub mod policy;
pub mod restrict;
pub mod tracker;
pub mod types;

pub use evaluator::{AccessNetworkEvaluator, QualifiedNetworksUpdate};
pub use event::{FeedEvent, QnsEvent};
pub use types::{
    AccessNetwork, CallType, Coverage, IwlanAvailabilityInfo, NetCapability, PreferenceMode,
    QualifiedNetworksInfo, SlotId, TransportType,
};
