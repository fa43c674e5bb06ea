//! NVS-backed settings sector for ESP32.
//!
//! The record image is stored as a single blob in ESP32 Non-Volatile Storage.
//! NVS serializes access internally, so the exclusive window is a no-op here.

use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
use log::{debug, info};

use super::storage::{Flash, StorageError, ERASED_BYTE, SECTOR_SIZE};
use super::RECORD_LEN;

/// NVS namespace for node settings.
const NVS_NAMESPACE: &str = "lora_node";

/// NVS key for the settings record.
const NVS_KEY: &str = "settings";

/// Settings sector stored in NVS.
pub struct NvsFlash {
    nvs: EspNvs<NvsDefault>,
}

impl NvsFlash {
    /// Open the default NVS partition.
    pub fn take() -> Result<Self, StorageError> {
        let partition = EspNvsPartition::<NvsDefault>::take().map_err(StorageError::Nvs)?;
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true).map_err(StorageError::Nvs)?;
        Ok(Self { nvs })
    }
}

impl Flash for NvsFlash {
    fn read(&mut self, buf: &mut [u8]) -> Result<(), StorageError> {
        let mut blob = [0u8; RECORD_LEN];
        let stored = self.nvs.get_raw(NVS_KEY, &mut blob).map_err(StorageError::Nvs)?;
        let bytes = match stored {
            Some(bytes) => bytes,
            None => {
                debug!("No settings blob in NVS");
                &[][..]
            }
        };
        let len = bytes.len().min(buf.len());
        buf[..len].copy_from_slice(&bytes[..len]);
        buf[len..].fill(ERASED_BYTE);
        Ok(())
    }

    fn erase(&mut self) -> Result<(), StorageError> {
        self.nvs.remove(NVS_KEY).map_err(StorageError::Nvs)?;
        Ok(())
    }

    fn program(&mut self, data: &[u8]) -> Result<(), StorageError> {
        if data.len() > SECTOR_SIZE {
            return Err(StorageError::TooLarge {
                size: data.len(),
                max: SECTOR_SIZE,
            });
        }
        self.nvs.set_raw(NVS_KEY, data).map_err(StorageError::Nvs)?;

        // Read back and verify to catch silent flash write failures
        let mut verify = [0u8; RECORD_LEN];
        let read_back = self
            .nvs
            .get_raw(NVS_KEY, &mut verify)
            .map_err(StorageError::Nvs)?
            .ok_or(StorageError::VerifyFailed)?;
        if read_back != data {
            log::error!("Settings verification failed - data mismatch after save");
            return Err(StorageError::VerifyFailed);
        }

        info!("Settings saved and verified in NVS");
        Ok(())
    }
}
