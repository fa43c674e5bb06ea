//! LoRa P2P radio configuration.
//!
//! Fixed radio parameters live here as constants. Everything the operator can
//! change is persisted in the settings record; [`P2pConfig`] is the typed view
//! of the P2P physical parameters taken from it.

use std::fmt;

use crate::settings::SettingsRecord;

/// Maximum packet size accepted by [`send`](super::RadioSessionController::send).
pub const LORA_MTU: usize = 256;

/// Largest payload the SX126x packet engine carries. The length register is
/// one byte, so a full [`LORA_MTU`] packet cannot be sent on this chip.
pub const SX126X_MAX_PAYLOAD: u8 = u8::MAX;

/// TX timeout programmed into the radio for every transmission (ms).
pub const TX_TIMEOUT_MS: u32 = 5000;

/// Number of symbols the radio listens for during CAD.
pub const CAD_SYMBOLS: u8 = 8;

/// Offset added to the spreading factor to get the CAD detection peak.
pub const CAD_DET_PEAK_OFFSET: u8 = 13;

/// CAD detection minimum.
pub const CAD_DET_MIN: u8 = 10;

/// Default P2P channel frequency in Hz.
pub const DEFAULT_FREQUENCY_HZ: u32 = 916_000_000;

/// Default P2P TX power in dBm.
pub const DEFAULT_TX_POWER: u8 = 22;

/// Default spreading factor.
pub const DEFAULT_SPREADING_FACTOR: u8 = 7;

/// Default coding rate code (1 = 4/5).
pub const DEFAULT_CODING_RATE: u8 = 1;

/// Default preamble length in symbols.
pub const DEFAULT_PREAMBLE_LENGTH: u8 = 8;

/// LoRa bandwidth as encoded in the settings record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bandwidth {
    /// 125 kHz (code 0)
    Khz125,
    /// 250 kHz (code 1)
    Khz250,
    /// 500 kHz (code 2)
    Khz500,
}

impl Bandwidth {
    /// Decode the record's bandwidth code. Code 3 is reserved.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Khz125),
            1 => Some(Self::Khz250),
            2 => Some(Self::Khz500),
            _ => None,
        }
    }

    /// Record code for this bandwidth.
    pub fn code(self) -> u8 {
        match self {
            Self::Khz125 => 0,
            Self::Khz250 => 1,
            Self::Khz500 => 2,
        }
    }

    /// Bandwidth in Hz.
    pub fn hz(self) -> u32 {
        match self {
            Self::Khz125 => 125_000,
            Self::Khz250 => 250_000,
            Self::Khz500 => 500_000,
        }
    }
}

/// LoRaWAN region, by the code stored in the settings record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    As923,
    Au915,
    Cn470,
    Cn779,
    Eu433,
    Eu868,
    Kr920,
    In865,
    Us915,
    As923_2,
    As923_3,
    As923_4,
    Ru864,
}

impl Region {
    const ALL: [Region; 13] = [
        Self::As923,
        Self::Au915,
        Self::Cn470,
        Self::Cn779,
        Self::Eu433,
        Self::Eu868,
        Self::Kr920,
        Self::In865,
        Self::Us915,
        Self::As923_2,
        Self::As923_3,
        Self::As923_4,
        Self::Ru864,
    ];

    /// Look up a region by its record code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Record code for this region.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Display name, as shown by the configuration interface.
    pub fn name(self) -> &'static str {
        match self {
            Self::As923 => "AS923",
            Self::Au915 => "AU915",
            Self::Cn470 => "CN470",
            Self::Cn779 => "CN779",
            Self::Eu433 => "EU433",
            Self::Eu868 => "EU868",
            Self::Kr920 => "KR920",
            Self::In865 => "IN865",
            Self::Us915 => "US915",
            Self::As923_2 => "AS923-2",
            Self::As923_3 => "AS923-3",
            Self::As923_4 => "AS923-4",
            Self::Ru864 => "RU864",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether the node runs the LoRaWAN stack or raw point-to-point LoRa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    LoRaWan,
    P2p,
}

/// P2P physical-layer parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct P2pConfig {
    /// Channel frequency in Hz.
    pub frequency_hz: u32,
    /// TX power in dBm (0..=22).
    pub tx_power: u8,
    pub bandwidth: Bandwidth,
    /// Spreading factor (7..=12).
    pub spreading_factor: u8,
    /// Coding rate code, 1..=4 for 4/5..4/8.
    pub coding_rate: u8,
    /// Preamble length in symbols.
    pub preamble_len: u8,
    /// RX symbol timeout.
    pub symbol_timeout: u16,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            tx_power: DEFAULT_TX_POWER,
            bandwidth: Bandwidth::Khz125,
            spreading_factor: DEFAULT_SPREADING_FACTOR,
            coding_rate: DEFAULT_CODING_RATE,
            preamble_len: DEFAULT_PREAMBLE_LENGTH,
            symbol_timeout: 0,
        }
    }
}

impl P2pConfig {
    /// Build the P2P view of a settings record.
    ///
    /// A reserved bandwidth code falls back to 125 kHz.
    pub fn from_settings(settings: &SettingsRecord) -> Self {
        let bandwidth = Bandwidth::from_code(settings.p2p_bandwidth).unwrap_or_else(|| {
            log::warn!(
                "Reserved P2P bandwidth code {}, using 125 kHz",
                settings.p2p_bandwidth
            );
            Bandwidth::Khz125
        });

        Self {
            frequency_hz: settings.p2p_frequency,
            tx_power: settings.p2p_tx_power,
            bandwidth,
            spreading_factor: settings.p2p_sf,
            coding_rate: settings.p2p_cr,
            preamble_len: settings.p2p_preamble_len,
            symbol_timeout: settings.p2p_symbol_timeout,
        }
    }

    /// CAD detection peak for the configured spreading factor.
    pub fn cad_det_peak(&self) -> u8 {
        self.spreading_factor.saturating_add(CAD_DET_PEAK_OFFSET)
    }
}

/// Payload length register value for `len` bytes, or `None` above
/// [`SX126X_MAX_PAYLOAD`].
pub fn sx126x_payload_len(len: usize) -> Option<u8> {
    u8::try_from(len).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sx126x_payload_len() {
        assert_eq!(sx126x_payload_len(0), Some(0));
        assert_eq!(sx126x_payload_len(255), Some(SX126X_MAX_PAYLOAD));
        // A full MTU packet must not wrap to an empty one
        assert_eq!(sx126x_payload_len(LORA_MTU), None);
    }

    #[test]
    fn test_bandwidth_codes() {
        assert_eq!(Bandwidth::from_code(0), Some(Bandwidth::Khz125));
        assert_eq!(Bandwidth::from_code(1), Some(Bandwidth::Khz250));
        assert_eq!(Bandwidth::from_code(2), Some(Bandwidth::Khz500));
        assert_eq!(Bandwidth::from_code(3), None);
        assert_eq!(Bandwidth::Khz250.hz(), 250_000);
        assert_eq!(Bandwidth::Khz500.code(), 2);
    }

    #[test]
    fn test_region_codes() {
        assert_eq!(Region::from_code(0), Some(Region::As923));
        assert_eq!(Region::from_code(1), Some(Region::Au915));
        assert_eq!(Region::from_code(8), Some(Region::Us915));
        assert_eq!(Region::from_code(12), Some(Region::Ru864));
        assert_eq!(Region::from_code(13), None);
        assert_eq!(Region::As923_3.code(), 10);
        assert_eq!(Region::As923_2.to_string(), "AS923-2");
    }

    #[test]
    fn test_p2p_config_from_default_settings() {
        let config = P2pConfig::from_settings(&SettingsRecord::default());
        assert_eq!(config, P2pConfig::default());
        assert_eq!(config.cad_det_peak(), 20);
    }

    #[test]
    fn test_reserved_bandwidth_falls_back() {
        let mut settings = SettingsRecord::default();
        settings.p2p_bandwidth = 3;
        settings.p2p_sf = 12;
        let config = P2pConfig::from_settings(&settings);
        assert_eq!(config.bandwidth, Bandwidth::Khz125);
        assert_eq!(config.cad_det_peak(), 25);
    }
}
