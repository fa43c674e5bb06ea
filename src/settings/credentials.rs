//! Default credentials derived from the hardware unique identifier.
//!
//! Derivation is deterministic, so a device that loses its settings comes
//! back with the same identity without talking to a server.

use zeroize::{Zeroize, ZeroizeOnDrop};

use super::record::{AesKey, Eui64, SettingsRecord};

/// Length of the hardware unique identifier.
pub const UNIQUE_ID_LEN: usize = 8;

/// Hardware unique identifier (on ESP32, the eFuse MAC expanded to EUI-64).
pub type UniqueId = [u8; UNIQUE_ID_LEN];

/// Credential set derived from a [`UniqueId`].
#[derive(Debug, Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub dev_eui: Eui64,
    pub app_eui: Eui64,
    pub app_key: AesKey,
    pub nwk_skey: AesKey,
    pub app_skey: AesKey,
    pub dev_addr: u32,
}

impl Credentials {
    /// Derive the credential set for `uid`.
    pub fn derive(uid: &UniqueId) -> Self {
        let mut dev_eui = [0u8; 8];
        let mut app_eui = [0u8; 8];
        for (idx, &b) in uid.iter().enumerate() {
            dev_eui[idx] = b;
            app_eui[UNIQUE_ID_LEN - 1 - idx] = b;
        }

        let key = mirrored_key(uid);

        Self {
            dev_eui,
            app_eui,
            app_key: key,
            nwk_skey: key,
            app_skey: key,
            dev_addr: derive_dev_addr(uid),
        }
    }

    /// Copy the credentials into a settings record.
    pub fn apply_to(&self, record: &mut SettingsRecord) {
        record.dev_eui = self.dev_eui;
        record.app_eui = self.app_eui;
        record.app_key = self.app_key;
        record.nwk_skey = self.nwk_skey;
        record.app_skey = self.app_skey;
        record.dev_addr = self.dev_addr;
    }
}

/// 16-byte key with identifier byte `i` at positions `i` and `15 - i`.
fn mirrored_key(uid: &UniqueId) -> AesKey {
    let mut key = [0u8; 16];
    for (idx, &b) in uid.iter().enumerate() {
        key[idx] = b;
        key[15 - idx] = b;
    }
    key
}

/// Device address from pairwise byte sums.
///
/// The second field is shifted by 18, not 16. Deployed devices and their
/// network registrations use addresses produced this way, so the shift is
/// kept as-is. The sums are not truncated to 8 bits and may overlap the
/// neighbouring field.
pub fn derive_dev_addr(uid: &UniqueId) -> u32 {
    let sum = |a: usize, b: usize| uid[a] as u32 + uid[b] as u32;
    (sum(0, 1) << 24) | (sum(2, 3) << 18) | (sum(4, 5) << 8) | sum(6, 7)
}
