//! LoRa point-to-point node firmware library.
//!
//! Radio session control and settings persistence for a LoRa node. The
//! hardware layer is behind the `esp32` feature; everything else builds and
//! tests on the host.

pub mod lora;
pub mod node;
pub mod settings;

// Re-export commonly used items
pub use lora::{
    Notification, Radio, RadioEvent, RadioSessionController, RxPolicy, SessionError, SignalSet,
    Signals,
};
pub use node::{run_periodic_trigger, Node, NodeError};
pub use settings::{Credentials, Flash, SettingsRecord, SettingsStore, StorageError};
