//! LoRa point-to-point radio session.
//!
//! This module contains:
//! - [`config`]: Fixed radio constants and typed views of the P2P settings
//! - [`policy`]: Receive policy and the post-event action table
//! - [`event`]: Events raised by the radio hardware
//! - [`traits`]: Radio capability and busy indicator
//! - [`cad`]: Listen-before-talk gate using channel activity detection
//! - [`session`]: Event-driven session controller
//! - [`signals`]: Notification flags for the application task
//! - `loopback`: In-process radio for host builds and tests
//! - `sx126x`: SX1262 adapter (ESP32 only)

mod cad;
mod config;
mod event;
mod policy;
mod session;
mod signals;
mod traits;

#[cfg(not(target_os = "espidf"))]
mod loopback;
#[cfg(feature = "esp32")]
mod sx126x;

pub use cad::{CadResult, ChannelAccessGuard};
pub use config::{
    sx126x_payload_len, Bandwidth, LinkMode, P2pConfig, Region, CAD_DET_MIN, CAD_DET_PEAK_OFFSET, CAD_SYMBOLS,
    DEFAULT_CODING_RATE, DEFAULT_FREQUENCY_HZ, DEFAULT_PREAMBLE_LENGTH, DEFAULT_SPREADING_FACTOR,
    DEFAULT_TX_POWER, LORA_MTU, SX126X_MAX_PAYLOAD, TX_TIMEOUT_MS,
};
pub use event::{Packet, RadioEvent};
pub use policy::{post_event_action, EventKind, RadioAction, RxPolicy};
pub use session::{LinkStats, Notification, RadioSessionController, SessionError};
pub use signals::{SignalSet, Signals};
pub use traits::{BusyIndicator, CadExitMode, CadParams, Radio, RxParams, TxParams};

#[cfg(not(target_os = "espidf"))]
pub use loopback::{LoopbackError, LoopbackRadio, RadioCall};
#[cfg(feature = "esp32")]
pub use sx126x::{LedIndicator, RadioError, Sx1262Radio};
