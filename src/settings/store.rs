//! Settings persistence.
//!
//! [`SettingsStore`] owns the active settings record and the storage medium.
//! A stored record is trusted only if both validity markers match; anything
//! else is treated as first boot and replaced by defaults carrying
//! credentials derived from the hardware unique identifier.
//!
//! # Usage
//!
//! ```
//! use lora_p2p_node::settings::{MemoryFlash, SettingsStore};
//!
//! let mut store = SettingsStore::new(MemoryFlash::new(), [1, 2, 3, 4, 5, 6, 7, 8]);
//! store.load().unwrap();
//! store.settings_mut().p2p_sf = 9;
//! assert!(store.save().unwrap());
//! assert!(!store.save().unwrap());
//! ```

use log::{debug, info};

use super::credentials::{Credentials, UniqueId};
use super::record::{SettingsRecord, RECORD_LEN};
use super::storage::{ExclusiveAccess, Flash, StorageError};

/// Result of [`SettingsStore::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A valid record was found and is now active.
    Loaded,
    /// No valid record; defaults were derived and written.
    Regenerated,
}

/// Active settings plus the medium they persist to.
pub struct SettingsStore<F: Flash> {
    flash: F,
    uid: UniqueId,
    active: SettingsRecord,
}

impl<F: Flash> SettingsStore<F> {
    /// Create a store with compiled defaults active. Call [`load`](Self::load)
    /// before use.
    pub fn new(flash: F, uid: UniqueId) -> Self {
        Self {
            flash,
            uid,
            active: SettingsRecord::default(),
        }
    }

    /// Load the stored record, regenerating it if the markers do not match.
    pub fn load(&mut self) -> Result<LoadOutcome, StorageError> {
        let stored = self.read_stored()?;
        debug!("Stored markers: {:02X} {:02X}", stored[0], stored[1]);

        match SettingsRecord::from_bytes(&stored) {
            Ok(record) => {
                info!("Found valid settings in flash");
                self.active = record;
                Ok(LoadOutcome::Loaded)
            }
            Err(e) => {
                info!("No valid settings found ({}), creating defaults", e);
                self.active = self.derived_defaults();
                self.write()?;
                Ok(LoadOutcome::Regenerated)
            }
        }
    }

    /// Write the active settings if they differ from the stored record.
    ///
    /// Returns `true` if an erase+write cycle was performed.
    pub fn save(&mut self) -> Result<bool, StorageError> {
        let stored = self.read_stored()?;
        if stored == self.active.to_bytes() {
            info!("Flash content identical, no need to write");
            return Ok(false);
        }

        info!("Flash content changed, writing new data");
        self.write()?;
        Ok(true)
    }

    /// Restore compiled defaults with derived credentials and write them
    /// unconditionally.
    pub fn reset(&mut self) -> Result<(), StorageError> {
        info!("Resetting settings to defaults");
        self.active = self.derived_defaults();
        self.write()
    }

    /// Active settings.
    pub fn settings(&self) -> &SettingsRecord {
        &self.active
    }

    /// Active settings, for configuration commands. Persist with
    /// [`save`](Self::save).
    pub fn settings_mut(&mut self) -> &mut SettingsRecord {
        &mut self.active
    }

    /// Hardware unique identifier credentials are derived from.
    pub fn unique_id(&self) -> &UniqueId {
        &self.uid
    }

    /// Storage medium.
    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// Mutable storage medium.
    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    /// Log every field of the active record with its storage offset.
    pub fn log_settings(&self) {
        let s = &self.active;
        info!("Saved settings:");
        info!("000 Marks: {:02X} {:02X}", s.valid_mark_1, s.valid_mark_2);
        info!("002 Dev EUI {}", hex(&s.dev_eui));
        info!("010 App EUI {}", hex(&s.app_eui));
        debug!("018 App Key {}", hex(&s.app_key));
        info!("034 Dev Addr {:08X}", s.dev_addr);
        debug!("038 NWS Key {}", hex(&s.nwk_skey));
        debug!("054 Apps Key {}", hex(&s.app_skey));
        info!("070 OTAA {}", enabled(s.otaa_enabled));
        info!("071 ADR {}", enabled(s.adr_enabled));
        info!(
            "072 {} Network",
            if s.public_network { "Public" } else { "Private" }
        );
        info!("073 Dutycycle {}", enabled(s.duty_cycle_enabled));
        info!("074 Repeat time {}", s.send_repeat_time);
        info!("078 Join trials {}", s.join_trials);
        info!("079 TX Power {}", s.tx_power);
        info!("080 DR {}", s.data_rate);
        info!("081 Class {}", s.lora_class);
        info!("082 Subband {}", s.subband_channels);
        info!("083 Auto join {}", enabled(s.auto_join));
        info!("084 Fport {}", s.app_port);
        info!(
            "085 {} Message",
            if s.confirmed_msg_enabled {
                "Confirmed"
            } else {
                "Unconfirmed"
            }
        );
        match s.region() {
            Some(region) => info!("086 Region {}", region),
            None => info!("086 Region unknown ({})", s.lora_region),
        }
        info!(
            "087 Mode {}",
            if s.lorawan_enable { "LPWAN" } else { "P2P" }
        );
        info!("088 P2P frequency {}", s.p2p_frequency);
        info!("092 P2P TX Power {}", s.p2p_tx_power);
        info!("093 P2P BW {}", s.p2p_bandwidth);
        info!("094 P2P SF {}", s.p2p_sf);
        info!("095 P2P CR {}", s.p2p_cr);
        info!("096 P2P Preamble length {}", s.p2p_preamble_len);
        info!("097 P2P Symbol Timeout {}", s.p2p_symbol_timeout);
        info!("100 P2P RX policy {:?}", s.rx_policy);
        info!("101 P2P RX window {}", s.rx_window_ms);
    }

    fn derived_defaults(&self) -> SettingsRecord {
        let mut record = SettingsRecord::default();
        Credentials::derive(&self.uid).apply_to(&mut record);
        debug!(
            "Derived DevEUI {} DevAddr {:08X}",
            hex(&record.dev_eui),
            record.dev_addr
        );
        record
    }

    fn read_stored(&mut self) -> Result<[u8; RECORD_LEN], StorageError> {
        let mut buf = [0u8; RECORD_LEN];
        let mut access = ExclusiveAccess::enter(&mut self.flash);
        access.read(&mut buf)?;
        Ok(buf)
    }

    fn write(&mut self) -> Result<(), StorageError> {
        let bytes = self.active.to_bytes();
        self.flash.erase()?;
        self.flash.program(&bytes)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}
