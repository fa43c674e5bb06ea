//! Radio hardware events.

use super::config::LORA_MTU;
use super::policy::EventKind;

/// Packet buffer bounded by the LoRa MTU.
pub type Packet = heapless::Vec<u8, LORA_MTU>;

/// Event raised by the radio hardware layer.
///
/// Only the hardware adapter produces these; the session controller consumes
/// them one at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// Transmission finished.
    TxDone,
    /// Packet received.
    RxDone {
        payload: Packet,
        /// RSSI in dBm.
        rssi: i16,
        /// SNR in dB.
        snr: i8,
    },
    /// Transmission did not finish within the TX timeout.
    TxTimeout,
    /// Receive window expired without a packet.
    RxTimeout,
    /// Packet received with a bad CRC.
    RxCrcError,
    /// Channel activity detection finished.
    CadDone { channel_clear: bool },
}

impl RadioEvent {
    /// Build an `RxDone` event, or `None` if `data` exceeds the MTU.
    pub fn rx_done(data: &[u8], rssi: i16, snr: i8) -> Option<Self> {
        let payload = Packet::from_slice(data).ok()?;
        Some(Self::RxDone { payload, rssi, snr })
    }

    /// Policy-table kind of a terminal event; `None` for CAD completion.
    pub fn kind(&self) -> Option<EventKind> {
        match self {
            Self::TxDone => Some(EventKind::TxDone),
            Self::RxDone { .. } => Some(EventKind::RxDone),
            Self::TxTimeout => Some(EventKind::TxTimeout),
            Self::RxTimeout => Some(EventKind::RxTimeout),
            Self::RxCrcError => Some(EventKind::RxCrcError),
            Self::CadDone { .. } => None,
        }
    }
}
