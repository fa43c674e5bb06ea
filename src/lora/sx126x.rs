//! SX1262 radio adapter for ESP32.
//!
//! Implements [`Radio`] for the LILYGO T3-S3 board using the `sx1262` crate
//! for the command transport. Every operation only starts work on the chip;
//! [`Sx1262Radio::poll`] turns the DIO1 interrupt flags into [`RadioEvent`]s.
//!
//! The chip's payload length register is one byte, so transmissions are
//! capped at 255 bytes and a 256-byte send fails with
//! [`RadioError::PacketTooLarge`].
//!
//! # Pin Configuration (LILYGO T3-S3)
//!
//! | Signal | GPIO | Notes |
//! |--------|------|-------|
//! | SPI MOSI | 11 | Master Out Slave In |
//! | SPI MISO | 13 | Master In Slave Out |
//! | SPI CLK | 12 | SPI Clock |
//! | NSS (CS) | 10 | Chip Select |
//! | RESET | 5 | Radio Reset |
//! | BUSY | 4 | Radio Busy Status |
//! | DIO1 | 1 | Interrupt |
//! | LED | 37 | Busy indicator |

use std::fmt;
use std::time::{Duration, Instant};

use esp_idf_hal::delay::{Ets, FreeRtos};
use esp_idf_hal::gpio::{Gpio1, Gpio10, Gpio37, Gpio4, Gpio5, Input, Output, PinDriver};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::spi::config::Config as SpiConfig;
use esp_idf_hal::spi::config::DriverConfig;
use esp_idf_hal::spi::{SpiDeviceDriver, SpiDriver, SPI2};
use esp_idf_hal::units::FromValueType;
use log::{debug, info, warn};
use regiface::{Command, FromByteArray, NoParameters, ToByteArray};
use sx1262::{
    Device, DeviceSelect, GetPacketStatus, GetRxBufferStatus, PaConfig, PacketParams, PacketType,
    RampTime, RfFrequencyConfig, RxMode, SetPaConfig, SetPacketParams, SetPacketType,
    SetRfFrequency, SetRx, SetStandby, SetTx, SetTxParams, StandbyConfig, Timeout,
    TxParams as PaTxParams,
};

use super::config::{
    sx126x_payload_len, Bandwidth, LORA_MTU, SX126X_MAX_PAYLOAD, TX_TIMEOUT_MS,
};
use super::event::RadioEvent;
use super::traits::{BusyIndicator, CadExitMode, CadParams, Radio, RxParams, TxParams};

/// Maximum time to wait for radio to become ready (ms).
const BUSY_TIMEOUT_MS: u32 = 1000;

/// RX/CAD timeout unit of the SX1262 (15.625 us), in nanoseconds.
const TIMER_STEP_NS: u64 = 15_625;

// SX1262 opcodes not covered (or covered incorrectly) by the sx1262 crate.
const OP_CLEAR_IRQ_STATUS: u8 = 0x02;
const OP_SET_DIO_IRQ_PARAMS: u8 = 0x08;
const OP_GET_IRQ_STATUS: u8 = 0x12;
const OP_GET_STATUS: u8 = 0xC0;
const OP_SET_SLEEP: u8 = 0x84;
const OP_SET_CAD_PARAMS: u8 = 0x88;
const OP_SET_MODULATION_PARAMS: u8 = 0x8B;
const OP_SET_LORA_SYMB_NUM_TIMEOUT: u8 = 0xA0;
const OP_SET_CAD: u8 = 0xC5;

// IRQ flags (datasheet Table 13-29).
const IRQ_TX_DONE: u16 = 0x0001;
const IRQ_RX_DONE: u16 = 0x0002;
const IRQ_HEADER_ERR: u16 = 0x0020;
const IRQ_CRC_ERR: u16 = 0x0040;
const IRQ_CAD_DONE: u16 = 0x0080;
const IRQ_CAD_DETECTED: u16 = 0x0100;
const IRQ_TIMEOUT: u16 = 0x0200;
const IRQ_ALL: u16 = 0x03FF;

/// Sleep config: warm start, RTC wake-up disabled.
const SLEEP_WARM_START: u8 = 0x04;

/// Minimum time between SetSleep and the next wake-up.
const SLEEP_GUARD: Duration = Duration::from_micros(500);

/// Raw command parameters.
#[derive(Debug, Clone)]
struct RawParams<const N: usize>([u8; N]);

impl<const N: usize> ToByteArray for RawParams<N> {
    type Error = core::convert::Infallible;
    type Array = [u8; N];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok(self.0)
    }
}

/// Raw write-only command with opcode `OP` and `N` parameter bytes.
#[derive(Debug, Clone)]
struct RawCommand<const OP: u8, const N: usize>(RawParams<N>);

impl<const OP: u8, const N: usize> RawCommand<OP, N> {
    fn new(params: [u8; N]) -> Self {
        Self(RawParams(params))
    }
}

impl<const OP: u8, const N: usize> Command for RawCommand<OP, N> {
    type IdType = u8;
    type CommandParameters = RawParams<N>;
    type ResponseParameters = NoParameters;

    fn id() -> Self::IdType {
        OP
    }

    fn invoking_parameters(self) -> Self::CommandParameters {
        self.0
    }
}

/// Raw GetIrqStatus response.
#[derive(Debug, Clone, Default)]
struct IrqStatusResponse {
    flags: u16,
}

impl FromByteArray for IrqStatusResponse {
    type Error = core::convert::Infallible;
    type Array = [u8; 3]; // status byte + IRQ flags (big-endian)

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            flags: u16::from_be_bytes([bytes[1], bytes[2]]),
        })
    }
}

/// Raw GetIrqStatus command.
#[derive(Debug, Clone, Default)]
struct GetIrqStatus;

impl Command for GetIrqStatus {
    type IdType = u8;
    type CommandParameters = NoParameters;
    type ResponseParameters = IrqStatusResponse;

    fn id() -> Self::IdType {
        OP_GET_IRQ_STATUS
    }

    fn invoking_parameters(self) -> Self::CommandParameters {
        Default::default()
    }
}

/// Raw SetCad command (no parameters).
#[derive(Debug, Clone, Default)]
struct SetCad;

impl Command for SetCad {
    type IdType = u8;
    type CommandParameters = NoParameters;
    type ResponseParameters = NoParameters;

    fn id() -> Self::IdType {
        OP_SET_CAD
    }

    fn invoking_parameters(self) -> Self::CommandParameters {
        Default::default()
    }
}

/// What the chip is doing, for interpreting the TIMEOUT flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activity {
    Idle,
    Transmitting { started: Instant },
    Receiving,
    Detecting,
}

/// SX1262 on the LILYGO T3-S3.
pub struct Sx1262Radio<'d> {
    device: Device<SpiDeviceDriver<'d, SpiDriver<'d>>>,
    reset: PinDriver<'d, Gpio5, Output>,
    busy: PinDriver<'d, Gpio4, Input>,
    dio1: PinDriver<'d, Gpio1, Input>,
    tx: Option<TxParams>,
    activity: Activity,
    asleep_since: Option<Instant>,
    initialized: bool,
}

impl<'d> Sx1262Radio<'d> {
    /// Set up the SPI bus and GPIO pins. Call [`Radio::init`] to configure
    /// the chip.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        spi: impl Peripheral<P = SPI2> + 'd,
        sclk: impl Peripheral<P = esp_idf_hal::gpio::Gpio12> + 'd,
        mosi: impl Peripheral<P = esp_idf_hal::gpio::Gpio11> + 'd,
        miso: impl Peripheral<P = esp_idf_hal::gpio::Gpio13> + 'd,
        cs: impl Peripheral<P = Gpio10> + 'd,
        reset: impl Peripheral<P = Gpio5> + 'd,
        busy: impl Peripheral<P = Gpio4> + 'd,
        dio1: impl Peripheral<P = Gpio1> + 'd,
    ) -> Result<Self, RadioError> {
        // SX1262 supports up to 16MHz, use conservative 2MHz
        let spi_config = SpiConfig::new().baudrate(2.MHz().into());
        let driver_config = DriverConfig::new();

        let spi_driver =
            SpiDriver::new(spi, sclk, mosi, Some(miso), &driver_config).map_err(RadioError::Spi)?;
        let spi_device =
            SpiDeviceDriver::new(spi_driver, Some(cs), &spi_config).map_err(RadioError::Spi)?;

        Ok(Self {
            device: Device::new(spi_device),
            reset: PinDriver::output(reset).map_err(RadioError::Gpio)?,
            busy: PinDriver::input(busy).map_err(RadioError::Gpio)?,
            dio1: PinDriver::input(dio1).map_err(RadioError::Gpio)?,
            tx: None,
            activity: Activity::Idle,
            asleep_since: None,
            initialized: false,
        })
    }

    /// Check the interrupt flags and convert them into an event.
    ///
    /// Call from the radio loop. Returns `Ok(None)` when nothing happened.
    pub fn poll(&mut self) -> Result<Option<RadioEvent>, RadioError> {
        if !self.initialized {
            return Ok(None);
        }

        if let Activity::Transmitting { started } = self.activity {
            if self.dio1.is_low() && started.elapsed() > Duration::from_millis(TX_TIMEOUT_MS as u64)
            {
                warn!("No TX done after {} ms", TX_TIMEOUT_MS);
                self.standby()?;
                self.activity = Activity::Idle;
                return Ok(Some(RadioEvent::TxTimeout));
            }
        }

        if self.dio1.is_low() {
            return Ok(None);
        }

        self.wait_busy()?;
        let flags = self
            .device
            .execute_command(GetIrqStatus)
            .map_err(RadioError::Command)?
            .flags;
        self.clear_irq(flags)?;
        debug!("IRQ flags {:04X} during {:?}", flags, self.activity);

        let activity = self.activity;
        let event = if flags & IRQ_CAD_DONE != 0 {
            Some(RadioEvent::CadDone {
                channel_clear: flags & IRQ_CAD_DETECTED == 0,
            })
        } else if flags & IRQ_TX_DONE != 0 {
            Some(RadioEvent::TxDone)
        } else if flags & (IRQ_CRC_ERR | IRQ_HEADER_ERR) != 0 {
            Some(RadioEvent::RxCrcError)
        } else if flags & IRQ_RX_DONE != 0 {
            self.read_packet()?
        } else if flags & IRQ_TIMEOUT != 0 {
            match activity {
                Activity::Transmitting { .. } => Some(RadioEvent::TxTimeout),
                _ => Some(RadioEvent::RxTimeout),
            }
        } else {
            // Preamble/header/sync flags only
            None
        };

        if event.is_some() {
            self.activity = Activity::Idle;
        }
        Ok(event)
    }

    fn read_packet(&mut self) -> Result<Option<RadioEvent>, RadioError> {
        let status = self
            .device
            .execute_command(GetRxBufferStatus)
            .map_err(RadioError::Command)?;
        self.wait_busy()?;

        let payload_len = status.buffer_status.payload_length as usize;
        let buffer_offset = status.buffer_status.buffer_pointer;
        if payload_len > LORA_MTU {
            warn!("Dropping oversized packet ({} bytes)", payload_len);
            return Ok(Some(RadioEvent::RxCrcError));
        }

        let mut data = [0u8; LORA_MTU];
        self.device
            .read_buffer(buffer_offset, &mut data[..payload_len])
            .map_err(RadioError::Command)?;

        let packet_status = self
            .device
            .execute_command(GetPacketStatus)
            .map_err(RadioError::Command)?;

        // LoRa mode: status[0]=RSSI (-val/2 dBm), status[1]=SNR (val/4 dB)
        let rssi = -(packet_status.packet_status.status[0] as i16) / 2;
        let snr = (packet_status.packet_status.status[1] as i8) / 4;

        Ok(RadioEvent::rx_done(&data[..payload_len], rssi, snr))
    }

    /// Hardware reset the radio.
    fn hardware_reset(&mut self) -> Result<(), RadioError> {
        debug!("Resetting radio");
        self.reset.set_low().map_err(RadioError::Gpio)?;
        FreeRtos::delay_ms(1);
        self.reset.set_high().map_err(RadioError::Gpio)?;
        FreeRtos::delay_ms(10);
        Ok(())
    }

    /// Wait for the radio to be ready (BUSY pin low).
    fn wait_busy(&self) -> Result<(), RadioError> {
        let start = Instant::now();
        let timeout = Duration::from_millis(BUSY_TIMEOUT_MS as u64);

        while self.busy.is_high() {
            if start.elapsed() > timeout {
                return Err(RadioError::Timeout);
            }
            FreeRtos::delay_ms(1);
        }

        Ok(())
    }

    fn standby(&mut self) -> Result<(), RadioError> {
        self.wake()?;
        self.wait_busy()?;
        self.device
            .execute_command(SetStandby {
                config: StandbyConfig::Rc,
            })
            .map_err(RadioError::Command)?;
        Ok(())
    }

    /// Wake the chip from sleep with a NSS falling edge (GetStatus).
    fn wake(&mut self) -> Result<(), RadioError> {
        let Some(since) = self.asleep_since.take() else {
            return Ok(());
        };
        let remaining = SLEEP_GUARD.saturating_sub(since.elapsed());
        if !remaining.is_zero() {
            Ets::delay_us(remaining.as_micros() as u32);
        }
        self.device
            .execute_command(RawCommand::<OP_GET_STATUS, 1>::new([0]))
            .map_err(RadioError::Command)?;
        Ok(())
    }

    fn clear_irq(&mut self, flags: u16) -> Result<(), RadioError> {
        self.device
            .execute_command(RawCommand::<OP_CLEAR_IRQ_STATUS, 2>::new(flags.to_be_bytes()))
            .map_err(RadioError::Command)?;
        self.wait_busy()
    }

    /// Route every completion and error flag to DIO1.
    fn configure_irq(&mut self) -> Result<(), RadioError> {
        let [hi, lo] = IRQ_ALL.to_be_bytes();
        self.device
            .execute_command(RawCommand::<OP_SET_DIO_IRQ_PARAMS, 8>::new([
                hi, lo, hi, lo, 0, 0, 0, 0,
            ]))
            .map_err(RadioError::Command)?;
        self.wait_busy()
    }

    fn set_modulation(
        &mut self,
        bandwidth: Bandwidth,
        spreading_factor: u8,
        coding_rate: u8,
    ) -> Result<(), RadioError> {
        self.device
            .execute_command(RawCommand::<OP_SET_MODULATION_PARAMS, 8>::new([
                spreading_factor,
                bandwidth_code(bandwidth),
                coding_rate,
                low_data_rate_optimize(bandwidth, spreading_factor) as u8,
                0,
                0,
                0,
                0,
            ]))
            .map_err(RadioError::Command)?;
        self.wait_busy()
    }

    fn set_packet_params(&mut self, preamble: u16, payload_len: u8) -> Result<(), RadioError> {
        self.device
            .execute_command(SetPacketParams {
                params: build_lora_packet_params(preamble, payload_len, true, false),
            })
            .map_err(RadioError::Command)?;
        self.wait_busy()
    }

    fn preamble_len(&self) -> u16 {
        self.tx.map(|tx| tx.preamble_len).unwrap_or(8)
    }
}

impl Radio for Sx1262Radio<'_> {
    type Error = RadioError;

    fn init(&mut self) -> Result<(), RadioError> {
        info!("Initializing SX1262 radio");
        self.initialized = false;
        self.activity = Activity::Idle;

        // Reset leaves the chip awake
        self.hardware_reset()?;
        self.asleep_since = None;
        self.standby()?;

        self.device
            .execute_command(SetPacketType {
                packet_type: PacketType::LoRa,
            })
            .map_err(RadioError::Command)?;
        self.wait_busy()?;

        // Configure PA for SX1262 (+22dBm capable)
        self.device
            .execute_command(SetPaConfig {
                config: PaConfig {
                    duty_cycle: 0x04,
                    hp_max: 0x07,
                    device_sel: DeviceSelect::Sx1262,
                    pa_lut: 0x01,
                },
            })
            .map_err(RadioError::Command)?;
        self.wait_busy()?;

        self.configure_irq()?;
        self.clear_irq(IRQ_ALL)?;

        self.initialized = true;
        info!("SX1262 initialized");
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), RadioError> {
        self.standby()?;
        self.device
            .execute_command(RawCommand::<OP_SET_SLEEP, 1>::new([SLEEP_WARM_START]))
            .map_err(RadioError::Command)?;
        self.asleep_since = Some(Instant::now());
        self.activity = Activity::Idle;
        Ok(())
    }

    fn set_channel(&mut self, frequency_hz: u32) -> Result<(), RadioError> {
        self.standby()?;
        self.device
            .execute_command(SetRfFrequency {
                config: RfFrequencyConfig {
                    frequency: frequency_hz,
                },
            })
            .map_err(RadioError::Command)?;
        self.wait_busy()
    }

    fn set_tx_config(&mut self, params: &TxParams) -> Result<(), RadioError> {
        self.standby()?;
        self.set_modulation(params.bandwidth, params.spreading_factor, params.coding_rate)?;
        self.device
            .execute_command(SetTxParams {
                params: PaTxParams {
                    power: params.power.min(22) as i8,
                    ramp_time: RampTime::Micros200,
                },
            })
            .map_err(RadioError::Command)?;
        self.wait_busy()?;
        self.tx = Some(*params);
        Ok(())
    }

    fn set_rx_config(&mut self, params: &RxParams) -> Result<(), RadioError> {
        self.standby()?;
        self.set_modulation(params.bandwidth, params.spreading_factor, params.coding_rate)?;
        self.set_packet_params(params.preamble_len, SX126X_MAX_PAYLOAD)?;
        let symbols = params.symbol_timeout.min(u8::MAX as u16) as u8;
        self.device
            .execute_command(RawCommand::<OP_SET_LORA_SYMB_NUM_TIMEOUT, 1>::new([symbols]))
            .map_err(RadioError::Command)?;
        self.wait_busy()
    }

    fn start_cad(&mut self, params: &CadParams) -> Result<(), RadioError> {
        if !self.initialized {
            return Err(RadioError::NotInitialized);
        }
        self.standby()?;

        let exit_mode = match params.exit_mode {
            CadExitMode::CadOnly => 0x00,
            CadExitMode::CadRx => 0x01,
        };
        let [_, t2, t1, t0] = timer_steps(params.timeout_ms).to_be_bytes();
        self.device
            .execute_command(RawCommand::<OP_SET_CAD_PARAMS, 7>::new([
                cad_symbol_code(params.symbols),
                params.det_peak,
                params.det_min,
                exit_mode,
                t2,
                t1,
                t0,
            ]))
            .map_err(RadioError::Command)?;
        self.wait_busy()?;

        self.clear_irq(IRQ_ALL)?;
        self.device
            .execute_command(SetCad)
            .map_err(RadioError::Command)?;
        self.activity = Activity::Detecting;
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<(), RadioError> {
        if !self.initialized {
            return Err(RadioError::NotInitialized);
        }
        let payload_len =
            sx126x_payload_len(data.len()).ok_or(RadioError::PacketTooLarge {
                size: data.len(),
                max: SX126X_MAX_PAYLOAD as usize,
            })?;

        self.standby()?;
        self.set_packet_params(self.preamble_len(), payload_len)?;
        self.device
            .write_buffer(0, data)
            .map_err(RadioError::Command)?;
        self.wait_busy()?;
        self.clear_irq(IRQ_ALL)?;

        // TX timeout is enforced by poll()
        self.device
            .execute_command(SetTx {
                timeout: Timeout(0),
            })
            .map_err(RadioError::Command)?;
        self.activity = Activity::Transmitting {
            started: Instant::now(),
        };
        debug!("TX started: {} bytes", data.len());
        Ok(())
    }

    fn start_rx(&mut self, timeout_ms: u32) -> Result<(), RadioError> {
        if !self.initialized {
            return Err(RadioError::NotInitialized);
        }

        self.standby()?;
        self.set_packet_params(self.preamble_len(), SX126X_MAX_PAYLOAD)?;
        self.clear_irq(IRQ_ALL)?;

        let mode = if timeout_ms == 0 {
            RxMode::Continuous
        } else {
            RxMode::Timed(timer_steps(timeout_ms))
        };
        self.device
            .execute_command(SetRx { mode })
            .map_err(RadioError::Command)?;
        self.activity = Activity::Receiving;
        Ok(())
    }
}

/// Activity LED on GPIO37.
pub struct LedIndicator<'d> {
    pin: PinDriver<'d, Gpio37, Output>,
}

impl<'d> LedIndicator<'d> {
    pub fn new(pin: impl Peripheral<P = Gpio37> + 'd) -> Result<Self, RadioError> {
        Ok(Self {
            pin: PinDriver::output(pin).map_err(RadioError::Gpio)?,
        })
    }
}

impl BusyIndicator for LedIndicator<'_> {
    fn set_busy(&mut self, busy: bool) {
        let result = if busy {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if let Err(e) = result {
            warn!("Failed to switch LED: {:?}", e);
        }
    }
}

/// Milliseconds to 15.625 us timer steps, capped at the 24-bit maximum.
fn timer_steps(ms: u32) -> u32 {
    ((ms as u64 * 1_000_000) / TIMER_STEP_NS).min(0xFF_FFFF) as u32
}

/// SetCadParams symbol count code.
fn cad_symbol_code(symbols: u8) -> u8 {
    match symbols {
        0..=1 => 0x00,
        2 => 0x01,
        3..=4 => 0x02,
        5..=8 => 0x03,
        _ => 0x04,
    }
}

/// SX1262 LoRa bandwidth register values (datasheet Table 13-48).
fn bandwidth_code(bandwidth: Bandwidth) -> u8 {
    match bandwidth {
        Bandwidth::Khz125 => 0x04,
        Bandwidth::Khz250 => 0x05,
        Bandwidth::Khz500 => 0x06,
    }
}

/// Low data rate optimization is required for symbol times >= 16.38 ms.
fn low_data_rate_optimize(bandwidth: Bandwidth, spreading_factor: u8) -> bool {
    let symbol_time_us = (1u64 << spreading_factor.min(12)) * 1_000_000 / bandwidth.hz() as u64;
    symbol_time_us >= 16_380
}

/// Build LoRa packet parameters as raw bytes.
///
/// Format: [preamble_hi, preamble_lo, header_type, payload_len, crc_on, invert_iq, 0, 0, 0]
fn build_lora_packet_params(
    preamble: u16,
    payload_len: u8,
    crc_enabled: bool,
    invert_iq: bool,
) -> PacketParams {
    let [preamble_hi, preamble_lo] = preamble.to_be_bytes();
    PacketParams {
        params: [
            preamble_hi,
            preamble_lo,
            0x00, // Header type: 0=explicit, 1=implicit
            payload_len,
            crc_enabled as u8,
            invert_iq as u8,
            0,
            0,
            0,
        ],
    }
}

/// Radio errors.
#[derive(Debug)]
pub enum RadioError {
    /// SPI communication error.
    Spi(esp_idf_sys::EspError),
    /// GPIO error.
    Gpio(esp_idf_sys::EspError),
    /// Command execution error.
    Command(sx1262::Error),
    /// Radio not initialized.
    NotInitialized,
    /// Radio busy timeout.
    Timeout,
    /// Packet too large.
    PacketTooLarge { size: usize, max: usize },
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spi(e) => write!(f, "SPI error: {:?}", e),
            Self::Gpio(e) => write!(f, "GPIO error: {:?}", e),
            Self::Command(e) => write!(f, "command error: {:?}", e),
            Self::NotInitialized => write!(f, "radio not initialized"),
            Self::Timeout => write!(f, "radio timeout"),
            Self::PacketTooLarge { size, max } => {
                write!(f, "packet too large: {} bytes (max {})", size, max)
            }
        }
    }
}

impl std::error::Error for RadioError {}
