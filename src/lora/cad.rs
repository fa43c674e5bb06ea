//! Listen-before-talk using LoRa channel activity detection (CAD).
//!
//! # Algorithm
//!
//! 1. Put the radio to sleep
//! 2. Switch the busy indicator on and start CAD with the configured
//!    symbol count and detection thresholds
//! 3. When CAD completes, transmit exactly once if the channel is clear,
//!    otherwise drop the transmission
//!
//! There is no backoff or retry here. A caller whose transmission was
//! dropped simply sends again.
//!
//! # Example
//!
//! ```
//! use lora_p2p_node::lora::{CadParams, CadResult, ChannelAccessGuard, LoopbackRadio, P2pConfig};
//!
//! let mut radio = LoopbackRadio::new();
//! let mut guard = ChannelAccessGuard::new();
//! let params = CadParams::from(&P2pConfig::default());
//!
//! guard.begin(&mut radio, &mut (), &params).unwrap();
//! match guard.complete(true) {
//!     CadResult::Transmit => println!("Channel clear, transmitting"),
//!     CadResult::Abort => println!("Channel busy, dropping"),
//!     CadResult::Unexpected => println!("No CAD in progress"),
//! }
//! ```

use log::debug;

use super::traits::{BusyIndicator, CadParams, Radio};

/// Outcome of a completed CAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "ignoring the CAD result could transmit on a busy channel"]
pub enum CadResult {
    /// Channel is clear, transmit the pending packet.
    Transmit,
    /// Channel is busy, drop the pending packet.
    Abort,
    /// CAD completion without a CAD in progress.
    Unexpected,
}

/// One-shot CAD gate in front of every transmission.
#[derive(Debug, Default)]
pub struct ChannelAccessGuard {
    pending: bool,
}

impl ChannelAccessGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep the radio and start CAD.
    ///
    /// The busy indicator is switched off again if CAD cannot be started.
    pub fn begin<R, B>(
        &mut self,
        radio: &mut R,
        indicator: &mut B,
        params: &CadParams,
    ) -> Result<(), R::Error>
    where
        R: Radio + ?Sized,
        B: BusyIndicator + ?Sized,
    {
        radio.sleep()?;
        indicator.set_busy(true);
        if let Err(e) = radio.start_cad(params) {
            indicator.set_busy(false);
            return Err(e);
        }

        debug!(
            "CAD started: {} symbols, peak {}, min {}",
            params.symbols, params.det_peak, params.det_min
        );
        self.pending = true;
        Ok(())
    }

    /// Resolve the CAD in progress.
    pub fn complete(&mut self, channel_clear: bool) -> CadResult {
        if !self.pending {
            return CadResult::Unexpected;
        }
        self.pending = false;

        if channel_clear {
            CadResult::Transmit
        } else {
            CadResult::Abort
        }
    }

    /// Forget a CAD in progress (radio re-initialized).
    pub fn reset(&mut self) {
        self.pending = false;
    }

    /// Whether a CAD is in progress.
    pub fn is_pending(&self) -> bool {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lora::{LoopbackRadio, P2pConfig, RadioCall};

    #[derive(Default)]
    struct Led {
        on: bool,
        switches: u32,
    }

    impl BusyIndicator for Led {
        fn set_busy(&mut self, busy: bool) {
            self.on = busy;
            self.switches += 1;
        }
    }

    fn params() -> CadParams {
        CadParams::from(&P2pConfig::default())
    }

    #[test]
    fn test_begin_sleeps_then_starts_cad() {
        let mut radio = LoopbackRadio::new();
        let mut led = Led::default();
        let mut guard = ChannelAccessGuard::new();

        guard.begin(&mut radio, &mut led, &params()).unwrap();

        assert_eq!(
            radio.calls(),
            &[RadioCall::Sleep, RadioCall::StartCad(params())]
        );
        assert!(led.on);
        assert!(guard.is_pending());
    }

    #[test]
    fn test_clear_channel_transmits() {
        let mut radio = LoopbackRadio::new();
        let mut guard = ChannelAccessGuard::new();
        guard.begin(&mut radio, &mut (), &params()).unwrap();

        assert_eq!(guard.complete(true), CadResult::Transmit);
        assert!(!guard.is_pending());
    }

    #[test]
    fn test_busy_channel_aborts() {
        let mut radio = LoopbackRadio::new();
        let mut guard = ChannelAccessGuard::new();
        guard.begin(&mut radio, &mut (), &params()).unwrap();

        assert_eq!(guard.complete(false), CadResult::Abort);
        assert!(!guard.is_pending());
    }

    #[test]
    fn test_completion_without_begin() {
        let mut guard = ChannelAccessGuard::new();
        assert_eq!(guard.complete(true), CadResult::Unexpected);

        // A second completion for the same CAD is also unexpected
        let mut radio = LoopbackRadio::new();
        guard.begin(&mut radio, &mut (), &params()).unwrap();
        let _ = guard.complete(true);
        assert_eq!(guard.complete(true), CadResult::Unexpected);
    }

    #[test]
    fn test_start_failure_switches_indicator_off() {
        let mut radio = LoopbackRadio::new();
        radio.set_fail_cad(true);
        let mut led = Led::default();
        let mut guard = ChannelAccessGuard::new();

        assert!(guard.begin(&mut radio, &mut led, &params()).is_err());
        assert!(!led.on);
        assert_eq!(led.switches, 2);
        assert!(!guard.is_pending());
    }
}
