//! Host radio that records every call and queues the events real hardware
//! would raise.
//!
//! `send` queues `TxDone`, `start_cad` queues `CadDone` with the configured
//! channel state. With echo enabled, a transmitted packet comes back as an
//! `RxDone` once the receiver is started; putting the radio to sleep first
//! drops it. That is enough to drive the full stack on a development machine.

use std::collections::VecDeque;
use std::fmt;

use super::event::RadioEvent;
use super::traits::{CadParams, Radio, RxParams, TxParams};

/// RSSI reported for echoed packets.
const ECHO_RSSI_DBM: i16 = -42;

/// SNR reported for echoed packets.
const ECHO_SNR_DB: i8 = 9;

/// A recorded radio operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    Init,
    Sleep,
    SetChannel(u32),
    SetTxConfig(TxParams),
    SetRxConfig(RxParams),
    StartCad(CadParams),
    Send(Vec<u8>),
    StartRx(u32),
}

/// Injected loopback failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopbackError {
    InitFailed,
    CadFailed,
    SendFailed,
    RxFailed,
}

impl fmt::Display for LoopbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitFailed => write!(f, "radio init failed"),
            Self::CadFailed => write!(f, "CAD start failed"),
            Self::SendFailed => write!(f, "TX start failed"),
            Self::RxFailed => write!(f, "RX start failed"),
        }
    }
}

impl std::error::Error for LoopbackError {}

/// In-process radio.
#[derive(Debug)]
pub struct LoopbackRadio {
    calls: Vec<RadioCall>,
    events: VecDeque<RadioEvent>,
    channel_clear: bool,
    echo: bool,
    echo_pending: Option<Vec<u8>>,
    fail_init: bool,
    fail_cad: bool,
    fail_send: bool,
    fail_rx: bool,
}

impl Default for LoopbackRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackRadio {
    /// Radio with a clear channel and echo off.
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            events: VecDeque::new(),
            channel_clear: true,
            echo: false,
            echo_pending: None,
            fail_init: false,
            fail_cad: false,
            fail_send: false,
            fail_rx: false,
        }
    }

    /// Channel state reported by subsequent CADs.
    pub fn set_channel_clear(&mut self, clear: bool) {
        self.channel_clear = clear;
    }

    /// Receive each transmitted packet back at the next `start_rx`.
    pub fn set_echo(&mut self, echo: bool) {
        self.echo = echo;
    }

    /// Make `init` fail.
    pub fn set_fail_init(&mut self, fail: bool) {
        self.fail_init = fail;
    }

    /// Make `start_cad` fail.
    pub fn set_fail_cad(&mut self, fail: bool) {
        self.fail_cad = fail;
    }

    /// Make `send` fail.
    pub fn set_fail_send(&mut self, fail: bool) {
        self.fail_send = fail;
    }

    /// Make `start_rx` fail.
    pub fn set_fail_rx(&mut self, fail: bool) {
        self.fail_rx = fail;
    }

    /// Recorded calls, oldest first.
    pub fn calls(&self) -> &[RadioCall] {
        &self.calls
    }

    /// Most recent call.
    pub fn last_call(&self) -> Option<&RadioCall> {
        self.calls.last()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Payloads passed to `send`, oldest first.
    pub fn sent(&self) -> Vec<&[u8]> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                RadioCall::Send(data) => Some(data.as_slice()),
                _ => None,
            })
            .collect()
    }

    /// Queue an event as if raised by the hardware.
    pub fn push_event(&mut self, event: RadioEvent) {
        self.events.push_back(event);
    }

    /// Next queued event.
    pub fn take_event(&mut self) -> Option<RadioEvent> {
        self.events.pop_front()
    }

    /// Number of queued events.
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }
}

impl Radio for LoopbackRadio {
    type Error = LoopbackError;

    fn init(&mut self) -> Result<(), Self::Error> {
        self.calls.push(RadioCall::Init);
        if self.fail_init {
            return Err(LoopbackError::InitFailed);
        }
        self.events.clear();
        self.echo_pending = None;
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), Self::Error> {
        self.calls.push(RadioCall::Sleep);
        self.echo_pending = None;
        Ok(())
    }

    fn set_channel(&mut self, frequency_hz: u32) -> Result<(), Self::Error> {
        self.calls.push(RadioCall::SetChannel(frequency_hz));
        Ok(())
    }

    fn set_tx_config(&mut self, params: &TxParams) -> Result<(), Self::Error> {
        self.calls.push(RadioCall::SetTxConfig(*params));
        Ok(())
    }

    fn set_rx_config(&mut self, params: &RxParams) -> Result<(), Self::Error> {
        self.calls.push(RadioCall::SetRxConfig(*params));
        Ok(())
    }

    fn start_cad(&mut self, params: &CadParams) -> Result<(), Self::Error> {
        self.calls.push(RadioCall::StartCad(*params));
        if self.fail_cad {
            return Err(LoopbackError::CadFailed);
        }
        self.events.push_back(RadioEvent::CadDone {
            channel_clear: self.channel_clear,
        });
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.calls.push(RadioCall::Send(data.to_vec()));
        if self.fail_send {
            return Err(LoopbackError::SendFailed);
        }
        self.events.push_back(RadioEvent::TxDone);
        if self.echo {
            self.echo_pending = Some(data.to_vec());
        }
        Ok(())
    }

    fn start_rx(&mut self, timeout_ms: u32) -> Result<(), Self::Error> {
        self.calls.push(RadioCall::StartRx(timeout_ms));
        if self.fail_rx {
            return Err(LoopbackError::RxFailed);
        }
        if let Some(data) = self.echo_pending.take() {
            if let Some(event) = RadioEvent::rx_done(&data, ECHO_RSSI_DBM, ECHO_SNR_DB) {
                self.events.push_back(event);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lora::P2pConfig;

    #[test]
    fn test_cad_queues_channel_state() {
        let mut radio = LoopbackRadio::new();
        radio.set_channel_clear(false);
        radio.start_cad(&CadParams::from(&P2pConfig::default())).unwrap();
        assert_eq!(
            radio.take_event(),
            Some(RadioEvent::CadDone {
                channel_clear: false
            })
        );
        assert_eq!(radio.take_event(), None);
    }

    #[test]
    fn test_send_records_and_queues_tx_done() {
        let mut radio = LoopbackRadio::new();
        radio.send(b"hello").unwrap();
        assert_eq!(radio.sent(), vec![&b"hello"[..]]);
        assert_eq!(radio.take_event(), Some(RadioEvent::TxDone));
    }

    #[test]
    fn test_echo_delivered_when_listening() {
        let mut radio = LoopbackRadio::new();
        radio.set_echo(true);
        radio.send(b"ping").unwrap();
        assert_eq!(radio.take_event(), Some(RadioEvent::TxDone));
        assert_eq!(radio.take_event(), None);

        radio.start_rx(0).unwrap();
        match radio.take_event() {
            Some(RadioEvent::RxDone { payload, rssi, snr }) => {
                assert_eq!(payload.as_slice(), b"ping");
                assert_eq!(rssi, ECHO_RSSI_DBM);
                assert_eq!(snr, ECHO_SNR_DB);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_init_failure() {
        let mut radio = LoopbackRadio::new();
        radio.set_fail_init(true);
        assert_eq!(radio.init(), Err(LoopbackError::InitFailed));
        assert_eq!(radio.calls(), &[RadioCall::Init]);
    }

    #[test]
    fn test_echo_dropped_when_sleeping() {
        let mut radio = LoopbackRadio::new();
        radio.set_echo(true);
        radio.send(b"ping").unwrap();
        assert_eq!(radio.take_event(), Some(RadioEvent::TxDone));

        radio.sleep().unwrap();
        radio.start_rx(0).unwrap();
        assert_eq!(radio.take_event(), None);
    }

    #[test]
    fn test_send_and_rx_failures() {
        let mut radio = LoopbackRadio::new();
        radio.set_fail_send(true);
        radio.set_fail_rx(true);
        assert_eq!(radio.send(b"x"), Err(LoopbackError::SendFailed));
        assert_eq!(radio.start_rx(0), Err(LoopbackError::RxFailed));
        assert_eq!(radio.pending_events(), 0);
    }
}
