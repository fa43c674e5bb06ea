//! Persisted settings record.
//!
//! The record is stored as a fixed-size little-endian byte image. Offsets are
//! stable so that records written by deployed devices stay readable:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 1 | marker 1 (`0xAA`) |
//! | 1 | 1 | marker 2 (`0x55`) |
//! | 2 | 8 | DevEUI |
//! | 10 | 8 | AppEUI |
//! | 18 | 16 | AppKey |
//! | 34 | 4 | DevAddr |
//! | 38 | 16 | NwkSKey |
//! | 54 | 16 | AppSKey |
//! | 70 | 1 | OTAA enabled |
//! | 71 | 1 | ADR enabled |
//! | 72 | 1 | public network |
//! | 73 | 1 | duty cycle enabled |
//! | 74 | 4 | send repeat time (ms) |
//! | 78 | 1 | join trials |
//! | 79 | 1 | TX power |
//! | 80 | 1 | data rate |
//! | 81 | 1 | LoRaWAN class |
//! | 82 | 1 | sub-band |
//! | 83 | 1 | auto join |
//! | 84 | 1 | application port |
//! | 85 | 1 | confirmed messages |
//! | 86 | 1 | region code |
//! | 87 | 1 | LoRaWAN (1) or P2P (0) |
//! | 88 | 4 | P2P frequency (Hz) |
//! | 92 | 1 | P2P TX power |
//! | 93 | 1 | P2P bandwidth code |
//! | 94 | 1 | P2P spreading factor |
//! | 95 | 1 | P2P coding rate |
//! | 96 | 1 | P2P preamble length |
//! | 97 | 2 | P2P symbol timeout |
//! | 99 | 1 | reset request |
//! | 100 | 1 | P2P RX policy |
//! | 101 | 4 | P2P RX window (ms) |

use std::fmt;

use log::warn;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::lora::{LinkMode, Region, RxPolicy};

/// Expected value of the first validity marker.
pub const VALID_MARK_1: u8 = 0xAA;

/// Expected value of the second validity marker.
pub const VALID_MARK_2: u8 = 0x55;

/// Size of the encoded record in bytes.
pub const RECORD_LEN: usize = 105;

/// EUI-64 (8 bytes)
pub type Eui64 = [u8; 8];
/// AES-128 key (16 bytes)
pub type AesKey = [u8; 16];

/// LoRaWAN device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoRaClass {
    A,
    B,
    C,
}

impl LoRaClass {
    /// Decode the record's class code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::A),
            1 => Some(Self::B),
            2 => Some(Self::C),
            _ => None,
        }
    }
}

/// Errors decoding a settings record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// Fewer bytes than a full record.
    Truncated { len: usize, expected: usize },
    /// One or both validity markers do not match.
    InvalidMarker { mark_1: u8, mark_2: u8 },
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { len, expected } => {
                write!(f, "record truncated: {} bytes (expected {})", len, expected)
            }
            Self::InvalidMarker { mark_1, mark_2 } => {
                write!(f, "invalid record markers: {:02X} {:02X}", mark_1, mark_2)
            }
        }
    }
}

impl std::error::Error for RecordError {}

/// Device identity, credentials and operating parameters.
///
/// Key material is wiped when the record is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SettingsRecord {
    pub valid_mark_1: u8,
    pub valid_mark_2: u8,
    /// OTAA device EUI, MSB first.
    pub dev_eui: Eui64,
    /// OTAA application EUI, MSB first.
    pub app_eui: Eui64,
    /// OTAA application key.
    pub app_key: AesKey,
    /// ABP device address.
    pub dev_addr: u32,
    /// ABP network session key.
    pub nwk_skey: AesKey,
    /// ABP application session key.
    pub app_skey: AesKey,
    pub otaa_enabled: bool,
    pub adr_enabled: bool,
    pub public_network: bool,
    pub duty_cycle_enabled: bool,
    /// Periodic send interval in milliseconds, 0 disables it.
    pub send_repeat_time: u32,
    pub join_trials: u8,
    /// LoRaWAN TX power index (0..=10).
    pub tx_power: u8,
    /// LoRaWAN data rate (0..=15, validity depends on region).
    pub data_rate: u8,
    /// LoRaWAN class code, see [`LoRaClass`].
    pub lora_class: u8,
    /// Sub-band channel selection (1..=9).
    pub subband_channels: u8,
    pub auto_join: bool,
    pub app_port: u8,
    pub confirmed_msg_enabled: bool,
    /// Region code, see [`Region`].
    pub lora_region: u8,
    /// `true` for LoRaWAN, `false` for P2P.
    pub lorawan_enable: bool,
    pub p2p_frequency: u32,
    pub p2p_tx_power: u8,
    /// 0: 125 kHz, 1: 250 kHz, 2: 500 kHz.
    pub p2p_bandwidth: u8,
    pub p2p_sf: u8,
    /// 1: 4/5, 2: 4/6, 3: 4/7, 4: 4/8.
    pub p2p_cr: u8,
    pub p2p_preamble_len: u8,
    pub p2p_symbol_timeout: u16,
    /// Set by the configuration interface to request a device reset.
    pub reset_request: bool,
    #[zeroize(skip)]
    pub rx_policy: RxPolicy,
    /// Receive window for [`RxPolicy::TimedWindow`], in milliseconds.
    pub rx_window_ms: u32,
}

impl Default for SettingsRecord {
    fn default() -> Self {
        Self {
            valid_mark_1: VALID_MARK_1,
            valid_mark_2: VALID_MARK_2,
            dev_eui: [0x00, 0x0D, 0x75, 0xE6, 0x56, 0x4D, 0xC1, 0xF3],
            app_eui: [0x70, 0xB3, 0xD5, 0x7E, 0xD0, 0x02, 0x01, 0xE1],
            app_key: [
                0x2B, 0x84, 0xE0, 0xB0, 0x9B, 0x68, 0xE5, 0xCB, 0x42, 0x17, 0x6F, 0xE7, 0x53,
                0xDC, 0xEE, 0x79,
            ],
            dev_addr: 0x2602_1FB4,
            nwk_skey: [
                0x32, 0x3D, 0x15, 0x5A, 0x00, 0x0D, 0xF3, 0x35, 0x30, 0x7A, 0x16, 0xDA, 0x0C,
                0x9D, 0xF5, 0x3F,
            ],
            app_skey: [
                0x3F, 0x6A, 0x66, 0x45, 0x9D, 0x5E, 0xDC, 0xA6, 0x3C, 0xBC, 0x46, 0x19, 0xCD,
                0x61, 0xA1, 0x1E,
            ],
            otaa_enabled: true,
            adr_enabled: false,
            public_network: true,
            duty_cycle_enabled: false,
            send_repeat_time: 120_000,
            join_trials: 5,
            tx_power: 0,
            data_rate: 3,
            lora_class: 0,
            subband_channels: 1,
            auto_join: false,
            app_port: 2,
            confirmed_msg_enabled: false,
            lora_region: 1,
            lorawan_enable: true,
            p2p_frequency: crate::lora::DEFAULT_FREQUENCY_HZ,
            p2p_tx_power: crate::lora::DEFAULT_TX_POWER,
            p2p_bandwidth: 0,
            p2p_sf: crate::lora::DEFAULT_SPREADING_FACTOR,
            p2p_cr: crate::lora::DEFAULT_CODING_RATE,
            p2p_preamble_len: crate::lora::DEFAULT_PREAMBLE_LENGTH,
            p2p_symbol_timeout: 0,
            reset_request: true,
            rx_policy: RxPolicy::None,
            rx_window_ms: 0,
        }
    }
}

impl SettingsRecord {
    /// Check the validity markers of a raw record image.
    pub fn has_valid_markers(bytes: &[u8]) -> bool {
        bytes.len() >= 2 && bytes[0] == VALID_MARK_1 && bytes[1] == VALID_MARK_2
    }

    /// Serialize to the fixed storage layout.
    pub fn to_bytes(&self) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        let mut w = Writer::new(&mut buf);
        w.put_u8(self.valid_mark_1);
        w.put_u8(self.valid_mark_2);
        w.put_bytes(&self.dev_eui);
        w.put_bytes(&self.app_eui);
        w.put_bytes(&self.app_key);
        w.put_u32(self.dev_addr);
        w.put_bytes(&self.nwk_skey);
        w.put_bytes(&self.app_skey);
        w.put_bool(self.otaa_enabled);
        w.put_bool(self.adr_enabled);
        w.put_bool(self.public_network);
        w.put_bool(self.duty_cycle_enabled);
        w.put_u32(self.send_repeat_time);
        w.put_u8(self.join_trials);
        w.put_u8(self.tx_power);
        w.put_u8(self.data_rate);
        w.put_u8(self.lora_class);
        w.put_u8(self.subband_channels);
        w.put_bool(self.auto_join);
        w.put_u8(self.app_port);
        w.put_bool(self.confirmed_msg_enabled);
        w.put_u8(self.lora_region);
        w.put_bool(self.lorawan_enable);
        w.put_u32(self.p2p_frequency);
        w.put_u8(self.p2p_tx_power);
        w.put_u8(self.p2p_bandwidth);
        w.put_u8(self.p2p_sf);
        w.put_u8(self.p2p_cr);
        w.put_u8(self.p2p_preamble_len);
        w.put_u16(self.p2p_symbol_timeout);
        w.put_bool(self.reset_request);
        w.put_u8(self.rx_policy.code());
        w.put_u32(self.rx_window_ms);
        debug_assert_eq!(w.pos, RECORD_LEN);
        buf
    }

    /// Deserialize from the fixed storage layout.
    ///
    /// Fails if the image is short or either validity marker is wrong.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() < RECORD_LEN {
            return Err(RecordError::Truncated {
                len: bytes.len(),
                expected: RECORD_LEN,
            });
        }
        if !Self::has_valid_markers(bytes) {
            return Err(RecordError::InvalidMarker {
                mark_1: bytes[0],
                mark_2: bytes[1],
            });
        }

        let mut r = Reader::new(&bytes[..RECORD_LEN]);
        Ok(Self {
            valid_mark_1: r.u8(),
            valid_mark_2: r.u8(),
            dev_eui: r.array(),
            app_eui: r.array(),
            app_key: r.array(),
            dev_addr: r.u32(),
            nwk_skey: r.array(),
            app_skey: r.array(),
            otaa_enabled: r.bool(),
            adr_enabled: r.bool(),
            public_network: r.bool(),
            duty_cycle_enabled: r.bool(),
            send_repeat_time: r.u32(),
            join_trials: r.u8(),
            tx_power: r.u8(),
            data_rate: r.u8(),
            lora_class: r.u8(),
            subband_channels: r.u8(),
            auto_join: r.bool(),
            app_port: r.u8(),
            confirmed_msg_enabled: r.bool(),
            lora_region: r.u8(),
            lorawan_enable: r.bool(),
            p2p_frequency: r.u32(),
            p2p_tx_power: r.u8(),
            p2p_bandwidth: r.u8(),
            p2p_sf: r.u8(),
            p2p_cr: r.u8(),
            p2p_preamble_len: r.u8(),
            p2p_symbol_timeout: r.u16(),
            reset_request: r.bool(),
            rx_policy: decode_rx_policy(r.u8()),
            rx_window_ms: r.u32(),
        })
    }

    /// LoRaWAN or P2P operation.
    pub fn link_mode(&self) -> LinkMode {
        if self.lorawan_enable {
            LinkMode::LoRaWan
        } else {
            LinkMode::P2p
        }
    }

    /// Configured region, `None` for an unknown code.
    pub fn region(&self) -> Option<Region> {
        Region::from_code(self.lora_region)
    }

    /// Configured LoRaWAN class, `None` for an unknown code.
    pub fn class(&self) -> Option<LoRaClass> {
        LoRaClass::from_code(self.lora_class)
    }
}

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn put_u8(&mut self, value: u8) {
        self.put_bytes(&[value]);
    }

    fn put_bool(&mut self, value: bool) {
        self.put_u8(value as u8);
    }

    fn put_u16(&mut self, value: u16) {
        self.put_bytes(&value.to_le_bytes());
    }

    fn put_u32(&mut self, value: u32) {
        self.put_bytes(&value.to_le_bytes());
    }
}

// Callers check the length up front, so reads never run past the end.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u8(&mut self) -> u8 {
        let [b] = self.array::<1>();
        b
    }

    fn bool(&mut self) -> bool {
        self.u8() != 0
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.array())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.array())
    }
}

fn decode_rx_policy(code: u8) -> RxPolicy {
    RxPolicy::from_code(code).unwrap_or_else(|| {
        warn!("Unknown RX policy code {}, using None", code);
        RxPolicy::None
    })
}
