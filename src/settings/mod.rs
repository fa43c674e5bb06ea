//! Persistent node settings.
//!
//! This module contains:
//! - [`record`]: Settings record and its fixed byte layout
//! - [`credentials`]: Default credentials derived from the hardware unique ID
//! - [`storage`]: Flash abstraction with scoped exclusive reads
//! - [`store`]: Load/save/reset with write suppression
//! - `file`: File-backed sector (host only)
//! - `nvs`: NVS-backed sector (ESP32 only)

mod credentials;
mod record;
mod storage;
mod store;

#[cfg(not(target_os = "espidf"))]
mod file;
#[cfg(feature = "esp32")]
mod nvs;

pub use credentials::{derive_dev_addr, Credentials, UniqueId, UNIQUE_ID_LEN};
pub use record::{
    AesKey, Eui64, LoRaClass, RecordError, SettingsRecord, RECORD_LEN, VALID_MARK_1,
    VALID_MARK_2,
};
pub use storage::{ExclusiveAccess, Flash, MemoryFlash, StorageError, ERASED_BYTE, SECTOR_SIZE};
pub use store::{LoadOutcome, SettingsStore};

#[cfg(not(target_os = "espidf"))]
pub use file::{default_settings_path, FileFlash};
#[cfg(feature = "esp32")]
pub use nvs::NvsFlash;
