//! Feed replay for running the engine without a modem.
//!
//! A replay script is a JSON-lines file of timed feed events; replaying it
//! drives the full decision pipeline on any platform, with every
//! qualified-network emission logged.

use std::pin::pin;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::{Stream, StreamExt};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use qns::FeedEvent;
use qns::components::QnsComponents;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedEvent {
    /// Milliseconds from replay start.
    pub at_ms: u64,
    pub event: FeedEvent,
}

/// Parse a JSON-lines replay script. Blank lines and `#` comments are
/// skipped; a malformed line aborts with its line number.
pub fn parse_script(text: &str) -> Result<Vec<ScriptedEvent>> {
    let mut events = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event: ScriptedEvent = serde_json::from_str(line)
            .with_context(|| format!("bad replay event on line {}", idx + 1))?;
        events.push(event);
    }
    events.sort_by_key(|e| e.at_ms);
    Ok(events)
}

pub async fn load_script(path: &str) -> Result<Vec<ScriptedEvent>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read replay script {path}"))?;
    let events = parse_script(&text)?;
    info!("loaded {} replay events from {path}", events.len());
    Ok(events)
}

/// Scripted events as a stream, same shape the live feeds would have.
pub fn script_stream(events: Vec<ScriptedEvent>) -> impl Stream<Item = ScriptedEvent> {
    futures::stream::iter(events)
}

/// Drive the engine from a script. `speed` scales the event timeline
/// (1.0 = real time, 0 = as fast as possible).
pub async fn run_replay(
    components: &mut QnsComponents,
    events: Vec<ScriptedEvent>,
    speed: f32,
    shutdown: CancellationToken,
) {
    let mut stream = pin!(script_stream(events));
    let mut elapsed_ms: u64 = 0;
    while let Some(scripted) = stream.next().await {
        if speed > 0.0 && scripted.at_ms > elapsed_ms {
            let wait = Duration::from_millis(
                ((scripted.at_ms - elapsed_ms) as f32 / speed) as u64,
            );
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("replay interrupted");
                    return;
                }
                _ = sleep(wait) => {}
            }
        }
        elapsed_ms = scripted.at_ms;
        debug!("replay t={}ms: {:?}", scripted.at_ms, scripted.event);
        components.dispatch(scripted.event).await;
    }
    info!("replay finished at t={elapsed_ms}ms");
}

#[cfg(test)]
mod tests {
    use super::*;
    use qns::types::{AccessNetwork, NetCapability};
    use qns::{QualifiedNetworksUpdate, event::event_channel};

    #[test]
    fn test_parse_script_skips_comments_and_sorts() {
        let text = r#"
# bring up wifi, then report signal
{"at_ms": 100, "event": {"kind": "wifi_rssi", "rssi": -60}}

{"at_ms": 0, "event": {"kind": "wifi_toggled", "enabled": true}}
"#;
        let events = parse_script(text).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].at_ms, 0);
        assert_eq!(events[1].at_ms, 100);
    }

    #[test]
    fn test_parse_script_reports_bad_line() {
        let err = parse_script("{\"at_ms\": 0}\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_script_round_trip() {
        let event = ScriptedEvent {
            at_ms: 500,
            event: FeedEvent::IwlanRegistered {
                slot: 0,
                registered: true,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: ScriptedEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.at_ms, 500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_drives_engine() {
        let mut components = QnsComponents::new(None);
        components.register_slot(0).await;
        let (tx, mut rx) = event_channel::<QualifiedNetworksUpdate>();
        components
            .register_qualified_networks_changed(0, NetCapability::Ims, tx)
            .await
            .unwrap();

        let script = r#"
{"at_ms": 0, "event": {"kind": "service_state", "slot": 0, "state": {"data_registered": true, "data_network_type": "eutran", "voice_network_type": "eutran", "roaming_type": "not_roaming", "registered_plmn": "310260", "vops_supported": true, "emergency_service_supported": true, "emergency_fallback_supported": false, "voice_barred": false, "emergency_barred": false}}}
"#;
        let events = parse_script(script).unwrap();
        run_replay(&mut components, events, 0.0, CancellationToken::new()).await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        let update = rx.try_recv().unwrap();
        assert_eq!(update.info.access_networks, vec![AccessNetwork::Eutran]);
    }
}
