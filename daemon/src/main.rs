use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use qns::components::QnsComponents;
use qns::config::bundle::ConfigValue;
use qns::event::event_channel;
use qns::types::NetCapability;
use qns::{FeedEvent, QualifiedNetworksUpdate};

use qns_daemon::FileCountryCodeStore;
use qns_daemon::config::{self, Config};
use qns_daemon::replay;

#[derive(Debug, Deserialize)]
struct CarrierConfigFile {
    carrier_id: i32,
    overrides: HashMap<String, ConfigValue>,
}

async fn apply_carrier_config(components: &mut QnsComponents, config: &Config) -> Result<()> {
    let Some(path) = &config.carrier_config_path else {
        return Ok(());
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read carrier config {path}"))?;
    let file: CarrierConfigFile =
        serde_json::from_str(&text).with_context(|| format!("bad carrier config in {path}"))?;
    for slot in components.active_slots() {
        components
            .dispatch(FeedEvent::CarrierConfig {
                slot,
                carrier_id: file.carrier_id,
                overrides: file.overrides.clone(),
            })
            .await;
    }
    info!("applied carrier {} config from {path}", file.carrier_id);
    Ok(())
}

/// Log every qualified-network decision the engine produces.
async fn spawn_decision_loggers(components: &QnsComponents, tracker: &TaskTracker) {
    for slot in components.active_slots() {
        for capability in NetCapability::ALL {
            let (tx, mut rx) = event_channel::<QualifiedNetworksUpdate>();
            if components
                .register_qualified_networks_changed(slot, capability, tx)
                .await
                .is_none()
            {
                continue;
            }
            tracker.spawn(async move {
                while let Some(update) = rx.recv().await {
                    info!(
                        "[{}] slot {} {}: qualified {:?} iwlan_disabled={}",
                        chrono::Local::now().format("%H:%M:%S%.3f"),
                        update.slot,
                        update.capability,
                        update.info.access_networks,
                        update.info.notify_iwlan_disabled,
                    );
                }
            });
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let store = Arc::new(FileCountryCodeStore::new(config.country_code_path.clone()));
    let mut components = QnsComponents::new(Some(store));
    for slot in 0..config.slot_count {
        components.register_slot(slot).await;
    }

    apply_carrier_config(&mut components, &config).await?;

    let shutdown = CancellationToken::new();
    let tracker = TaskTracker::new();
    spawn_decision_loggers(&components, &tracker).await;

    if let Some(path) = &config.replay_path {
        let events = replay::load_script(path).await?;
        replay::run_replay(&mut components, events, config.replay_speed, shutdown.clone()).await;
    } else {
        info!("qns daemon running, waiting for feeds (ctrl-c to stop)");
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
        info!("shutting down");
    }

    for slot in components.active_slots() {
        components.unregister_slot(slot).await;
    }
    shutdown.cancel();
    tracker.close();
    tracker.wait().await;
    Ok(())
}

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config::DEFAULT_CONFIG_PATH.to_string());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async {
        let config = config::load_config(&config_path).await?;
        let level = config
            .log_level
            .parse()
            .unwrap_or(log::LevelFilter::Info);
        qns::init_logging(level);
        info!("qns daemon starting with config from {config_path}");

        if let Err(e) = run(config).await {
            error!("daemon failed: {e:#}");
            return Err(e);
        }
        Ok(())
    })
}
