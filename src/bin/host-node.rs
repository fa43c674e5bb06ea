//! Host-based LoRa P2P node for development and testing.
//!
//! Runs the full node (settings store, session controller, periodic sends)
//! over an in-process loopback radio that echoes every transmission back.
//! Settings persist to a file between runs.
//!
//! # Usage
//!
//! ```bash
//! LORA_NODE_UID=E66048073B8A212F cargo run --bin host-node
//! ```
//!
//! | Variable | Default |
//! |----------|---------|
//! | `LORA_NODE_UID` | `0000000000000001` |
//! | `LORA_NODE_SETTINGS` | `~/.lora-p2p-node/settings.bin` |

use std::env;
use std::path::PathBuf;

use log::{error, info, warn};
use lora_p2p_node::lora::{LoopbackRadio, RxPolicy, Signals};
use lora_p2p_node::settings::{default_settings_path, FileFlash, UniqueId, UNIQUE_ID_LEN};
use lora_p2p_node::{run_periodic_trigger, Node};
use tokio_util::sync::CancellationToken;

const DEFAULT_UID: UniqueId = [0, 0, 0, 0, 0, 0, 0, 1];

/// Parse a 16-digit hex unique ID.
fn parse_uid(s: &str) -> Option<UniqueId> {
    let s = s.trim();
    if s.len() != UNIQUE_ID_LEN * 2 || !s.is_ascii() {
        return None;
    }
    let mut uid = [0u8; UNIQUE_ID_LEN];
    for (i, byte) in uid.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(uid)
}

fn unique_id() -> UniqueId {
    match env::var("LORA_NODE_UID") {
        Ok(value) => parse_uid(&value).unwrap_or_else(|| {
            warn!("Invalid LORA_NODE_UID {:?}, using default", value);
            DEFAULT_UID
        }),
        Err(_) => DEFAULT_UID,
    }
}

fn settings_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("LORA_NODE_SETTINGS") {
        return Some(PathBuf::from(path));
    }
    match default_settings_path() {
        Ok(path) => Some(path),
        Err(e) => {
            error!("Cannot determine settings path: {}", e);
            None
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("=== LoRa P2P host node starting ===");

    let Some(path) = settings_path() else {
        std::process::exit(1);
    };
    info!("Settings file: {}", path.display());

    let mut radio = LoopbackRadio::new();
    radio.set_echo(true);

    let mut node = match Node::start(radio, (), FileFlash::new(path), unique_id()) {
        Ok(node) => node,
        Err(e) => {
            error!("Node start failed: {}", e);
            std::process::exit(1);
        }
    };

    if node.settings().lorawan_enable {
        info!("Switching to P2P mode (the loopback radio has no LoRaWAN stack)");
        let result = node.update_settings(|s| {
            s.lorawan_enable = false;
            if s.rx_policy == RxPolicy::None {
                s.rx_policy = RxPolicy::Continuous;
            }
        });
        if let Err(e) = result {
            error!("Failed to apply P2P settings: {}", e);
            std::process::exit(1);
        }
    }

    let signals = node.signals();
    let cancel = CancellationToken::new();

    let trigger = node.periodic_interval().map(|period| {
        info!("Periodic send every {:?}", period);
        tokio::spawn(run_periodic_trigger(signals.clone(), period, cancel.clone()))
    });
    if trigger.is_none() {
        warn!("Repeat time is 0, periodic sends disabled");
    }

    info!("Entering main loop (Ctrl+C to exit)...");

    let mut counter: u32 = 0;
    loop {
        let pending = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break;
            }
            pending = signals.wait() => pending,
        };

        if pending.contains(Signals::PERIODIC_SEND) {
            counter = counter.wrapping_add(1);
            let payload = format!("hello #{}", counter);
            if let Err(e) = node.send(payload.as_bytes()) {
                warn!("Send failed: {}", e);
            }
            while let Some(event) = node.session_mut().radio_mut().take_event() {
                if let Err(e) = node.dispatch(event) {
                    warn!("Event dispatch failed: {}", e);
                }
            }
        }
        if pending.contains(Signals::UNCONFIRMED_TX_DONE) {
            info!("TX done");
        }
        if pending.contains(Signals::PACKET_RECEIVED) {
            let session = node.session();
            info!(
                "Received {:?} (RSSI {} dBm, SNR {} dB)",
                String::from_utf8_lossy(session.rx_data()),
                session.last_rssi(),
                session.last_snr()
            );
        }
    }

    cancel.cancel();
    if let Some(task) = trigger {
        let _ = task.await;
    }

    let stats = node.session().stats();
    info!(
        "Sent {} packets, received {}, {} CAD aborts",
        stats.packets_sent, stats.packets_received, stats.cad_aborts
    );
}
