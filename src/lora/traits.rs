//! Radio capability consumed by the session controller.

use std::fmt;

use super::config::{Bandwidth, CAD_DET_MIN, CAD_SYMBOLS, TX_TIMEOUT_MS};
use super::P2pConfig;

/// Transmit configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxParams {
    /// Output power in dBm.
    pub power: u8,
    pub bandwidth: Bandwidth,
    pub spreading_factor: u8,
    /// Coding rate code, 1..=4 for 4/5..4/8.
    pub coding_rate: u8,
    pub preamble_len: u16,
    /// Hardware TX timeout in milliseconds.
    pub timeout_ms: u32,
}

impl From<&P2pConfig> for TxParams {
    fn from(config: &P2pConfig) -> Self {
        Self {
            power: config.tx_power,
            bandwidth: config.bandwidth,
            spreading_factor: config.spreading_factor,
            coding_rate: config.coding_rate,
            preamble_len: config.preamble_len as u16,
            timeout_ms: TX_TIMEOUT_MS,
        }
    }
}

/// Receive configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxParams {
    pub bandwidth: Bandwidth,
    pub spreading_factor: u8,
    pub coding_rate: u8,
    pub preamble_len: u16,
    /// Symbols to wait for a preamble before raising RX timeout.
    pub symbol_timeout: u16,
    pub crc_on: bool,
    /// Stay in RX after a packet instead of returning to standby.
    pub continuous: bool,
}

impl From<&P2pConfig> for RxParams {
    fn from(config: &P2pConfig) -> Self {
        Self {
            bandwidth: config.bandwidth,
            spreading_factor: config.spreading_factor,
            coding_rate: config.coding_rate,
            preamble_len: config.preamble_len as u16,
            symbol_timeout: config.symbol_timeout,
            crc_on: true,
            continuous: false,
        }
    }
}

/// What the radio does when CAD finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadExitMode {
    /// Return to standby and report.
    CadOnly,
    /// Enter RX if activity was detected.
    CadRx,
}

/// Channel activity detection configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CadParams {
    /// Symbols listened to.
    pub symbols: u8,
    pub det_peak: u8,
    pub det_min: u8,
    pub exit_mode: CadExitMode,
    /// 0 = no timeout.
    pub timeout_ms: u32,
}

impl From<&P2pConfig> for CadParams {
    fn from(config: &P2pConfig) -> Self {
        Self {
            symbols: CAD_SYMBOLS,
            det_peak: config.cad_det_peak(),
            det_min: CAD_DET_MIN,
            exit_mode: CadExitMode::CadOnly,
            timeout_ms: 0,
        }
    }
}

/// Radio hardware operations.
///
/// Every operation only starts work; completion is reported later as a
/// [`RadioEvent`](super::RadioEvent) from the hardware layer.
pub trait Radio {
    /// Error type for radio operations.
    type Error: fmt::Debug;

    /// Reset and initialize the hardware.
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Put the radio into sleep mode.
    fn sleep(&mut self) -> Result<(), Self::Error>;

    /// Set the channel frequency in Hz.
    fn set_channel(&mut self, frequency_hz: u32) -> Result<(), Self::Error>;

    /// Configure transmission.
    fn set_tx_config(&mut self, params: &TxParams) -> Result<(), Self::Error>;

    /// Configure reception.
    fn set_rx_config(&mut self, params: &RxParams) -> Result<(), Self::Error>;

    /// Start channel activity detection.
    fn start_cad(&mut self, params: &CadParams) -> Result<(), Self::Error>;

    /// Start transmitting `data`.
    fn send(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Start receiving. A timeout of 0 means no timeout.
    fn start_rx(&mut self, timeout_ms: u32) -> Result<(), Self::Error>;
}

/// Indicator switched on while a transmit cycle is in progress (usually an LED).
pub trait BusyIndicator {
    fn set_busy(&mut self, busy: bool);
}

/// No indicator.
impl BusyIndicator for () {
    fn set_busy(&mut self, _busy: bool) {}
}
