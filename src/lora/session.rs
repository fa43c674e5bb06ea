//! Radio session controller.
//!
//! Owns the radio's operating mode for a point-to-point link. Transmissions
//! are gated by channel activity detection; after every terminal radio event
//! the receive policy decides whether the radio sleeps or listens again.
//!
//! The controller never blocks. Operations start radio work and return; the
//! hardware layer reports completion as [`RadioEvent`]s, which are passed to
//! [`RadioSessionController::handle`] one at a time.
//!
//! # Example
//!
//! ```
//! use lora_p2p_node::lora::{LoopbackRadio, RadioSessionController, RxPolicy};
//! use lora_p2p_node::settings::SettingsRecord;
//!
//! let mut settings = SettingsRecord::default();
//! settings.lorawan_enable = false;
//! settings.rx_policy = RxPolicy::Continuous;
//!
//! let mut session = RadioSessionController::new(LoopbackRadio::new(), (), &settings);
//! session.init().unwrap();
//! session.send(b"hello").unwrap();
//!
//! while let Some(event) = session.radio_mut().take_event() {
//!     if let Some(notification) = session.handle(event).unwrap() {
//!         println!("{:?}", notification);
//!     }
//! }
//! ```

use std::fmt;

use log::{debug, error, info, warn};

use super::cad::{CadResult, ChannelAccessGuard};
use super::config::{LinkMode, P2pConfig, LORA_MTU};
use super::event::{Packet, RadioEvent};
use super::policy::{post_event_action, EventKind, RadioAction, RxPolicy};
use super::signals::Signals;
use super::traits::{BusyIndicator, CadParams, Radio, RxParams, TxParams};
use crate::settings::SettingsRecord;

/// Session errors.
#[derive(Debug)]
pub enum SessionError<E> {
    /// Radio hardware initialization failed.
    Init(E),
    /// Radio operation failed.
    Radio(E),
    /// The event was handled but the follow-up sleep or receive failed.
    /// The event's notification is carried here.
    Rearm {
        notification: Notification,
        source: E,
    },
    /// Operation before a successful `init`.
    NotInitialized,
    /// Packet larger than the LoRa MTU.
    PacketTooLarge { size: usize, max: usize },
    /// A transmission is still outstanding.
    TxInFlight,
    /// Raw sends are only available in P2P mode.
    NotP2p,
}

impl<E: fmt::Debug> fmt::Display for SessionError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init(e) => write!(f, "radio init failed: {:?}", e),
            Self::Radio(e) => write!(f, "radio error: {:?}", e),
            Self::Rearm {
                notification,
                source,
            } => write!(
                f,
                "radio action after {:?} failed: {:?}",
                notification, source
            ),
            Self::NotInitialized => write!(f, "radio not initialized"),
            Self::PacketTooLarge { size, max } => {
                write!(f, "packet too large: {} bytes (max {})", size, max)
            }
            Self::TxInFlight => write!(f, "transmission already in progress"),
            Self::NotP2p => write!(f, "not in P2P mode"),
        }
    }
}

impl<E: fmt::Debug> std::error::Error for SessionError<E> {}

/// Notification for the application, one per terminal event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Transmission finished.
    TxDone,
    /// Transmission timed out.
    TxTimeout,
    /// Transmission dropped because CAD found the channel busy.
    ChannelBusy,
    /// Packet received.
    Received {
        payload: Packet,
        rssi: i16,
        snr: i8,
    },
    /// Receive window expired.
    RxTimeout,
    /// Packet received with a bad CRC.
    RxCrcError,
}

impl Notification {
    /// Signal raised for this notification.
    pub fn signal(&self) -> Signals {
        match self {
            Self::TxDone => Signals::UNCONFIRMED_TX_DONE,
            Self::TxTimeout => Signals::CONFIRMED_TX_NAK,
            Self::Received { .. } => Signals::PACKET_RECEIVED,
            Self::ChannelBusy | Self::RxTimeout | Self::RxCrcError => Signals::empty(),
        }
    }

    /// Whether this reports a successful transmission.
    pub fn is_tx_success(&self) -> bool {
        matches!(self, Self::TxDone)
    }
}

/// Link statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Packets transmitted (TxDone).
    pub packets_sent: u32,
    /// Packets received.
    pub packets_received: u32,
    pub tx_timeouts: u32,
    pub rx_timeouts: u32,
    pub rx_crc_errors: u32,
    /// Transmissions dropped on a busy channel.
    pub cad_aborts: u32,
}

/// Event-driven radio session.
pub struct RadioSessionController<R: Radio, B: BusyIndicator = ()> {
    radio: R,
    indicator: B,
    mode: LinkMode,
    config: P2pConfig,
    rx_policy: RxPolicy,
    rx_window_ms: u32,
    tx_buf: Packet,
    tx_in_flight: bool,
    rx_buf: Packet,
    last_rssi: i16,
    last_snr: i8,
    cad: ChannelAccessGuard,
    stats: LinkStats,
    initialized: bool,
}

impl<R: Radio, B: BusyIndicator> RadioSessionController<R, B> {
    /// Create a session configured from `settings`. Call [`init`](Self::init)
    /// before use.
    pub fn new(radio: R, indicator: B, settings: &SettingsRecord) -> Self {
        Self {
            radio,
            indicator,
            mode: settings.link_mode(),
            config: P2pConfig::from_settings(settings),
            rx_policy: settings.rx_policy,
            rx_window_ms: settings.rx_window_ms,
            tx_buf: Packet::new(),
            tx_in_flight: false,
            rx_buf: Packet::new(),
            last_rssi: 0,
            last_snr: 0,
            cad: ChannelAccessGuard::new(),
            stats: LinkStats::default(),
            initialized: false,
        }
    }

    /// Initialize the radio and apply the receive policy.
    ///
    /// In LoRaWAN mode the radio is only initialized and put to sleep; the
    /// MAC stack takes it from there.
    pub fn init(&mut self) -> Result<(), SessionError<R::Error>> {
        self.initialized = false;
        self.tx_in_flight = false;
        self.cad.reset();
        self.indicator.set_busy(false);

        self.radio.init().map_err(SessionError::Init)?;

        if self.mode == LinkMode::LoRaWan {
            info!("Radio initialized for LoRaWAN");
            self.radio.sleep().map_err(SessionError::Radio)?;
            self.initialized = true;
            return Ok(());
        }

        self.radio
            .set_channel(self.config.frequency_hz)
            .map_err(SessionError::Radio)?;
        self.radio
            .set_tx_config(&TxParams::from(&self.config))
            .map_err(SessionError::Radio)?;
        self.radio
            .set_rx_config(&RxParams::from(&self.config))
            .map_err(SessionError::Radio)?;

        let action = self.rx_policy.initial_action(self.rx_window_ms);
        self.apply(action).map_err(SessionError::Radio)?;
        self.initialized = true;

        info!(
            "Radio initialized for P2P: {} Hz, SF{}, {} Hz BW, CR 4/{}, {} dBm, policy {:?}",
            self.config.frequency_hz,
            self.config.spreading_factor,
            self.config.bandwidth.hz(),
            self.config.coding_rate.saturating_add(4),
            self.config.tx_power,
            self.rx_policy
        );
        Ok(())
    }

    /// Queue `data` for transmission behind a channel activity check.
    ///
    /// Returns once CAD has started. The outcome arrives later as a
    /// notification from [`handle`](Self::handle).
    pub fn send(&mut self, data: &[u8]) -> Result<(), SessionError<R::Error>> {
        if data.len() > LORA_MTU {
            return Err(SessionError::PacketTooLarge {
                size: data.len(),
                max: LORA_MTU,
            });
        }
        if !self.initialized {
            return Err(SessionError::NotInitialized);
        }
        if self.mode != LinkMode::P2p {
            return Err(SessionError::NotP2p);
        }
        if self.tx_in_flight {
            return Err(SessionError::TxInFlight);
        }

        self.tx_buf.clear();
        self.tx_buf
            .extend_from_slice(data)
            .map_err(|_| SessionError::PacketTooLarge {
                size: data.len(),
                max: LORA_MTU,
            })?;
        self.tx_in_flight = true;

        let params = CadParams::from(&self.config);
        if let Err(e) = self.cad.begin(&mut self.radio, &mut self.indicator, &params) {
            self.tx_in_flight = false;
            return Err(SessionError::Radio(e));
        }

        debug!("Queued {} bytes behind CAD", data.len());
        Ok(())
    }

    /// Dispatch one radio event.
    ///
    /// Updates the session state, applies the post-event radio action and
    /// returns the notification for the application. CAD completion with a
    /// clear channel only starts the transmission and returns `None`.
    ///
    /// If the post-event action fails the notification is returned inside
    /// [`SessionError::Rearm`].
    pub fn handle(
        &mut self,
        event: RadioEvent,
    ) -> Result<Option<Notification>, SessionError<R::Error>> {
        let kind = event.kind();
        let notification = match event {
            RadioEvent::TxDone => {
                self.finish_tx();
                self.stats.packets_sent += 1;
                debug!("TX done");
                Notification::TxDone
            }
            RadioEvent::TxTimeout => {
                self.finish_tx();
                self.stats.tx_timeouts += 1;
                warn!("TX timeout");
                Notification::TxTimeout
            }
            RadioEvent::RxDone { payload, rssi, snr } => {
                self.rx_buf.clone_from(&payload);
                self.last_rssi = rssi;
                self.last_snr = snr;
                self.stats.packets_received += 1;
                debug!(
                    "RX done: {} bytes, RSSI {} dBm, SNR {} dB",
                    payload.len(),
                    rssi,
                    snr
                );
                Notification::Received { payload, rssi, snr }
            }
            RadioEvent::RxTimeout => {
                self.stats.rx_timeouts += 1;
                debug!("RX timeout");
                Notification::RxTimeout
            }
            RadioEvent::RxCrcError => {
                self.stats.rx_crc_errors += 1;
                warn!("RX CRC error");
                Notification::RxCrcError
            }
            RadioEvent::CadDone { channel_clear } => return self.complete_cad(channel_clear),
        };

        match kind {
            Some(kind) => self.notify_after(kind, notification),
            None => Ok(Some(notification)),
        }
    }

    /// Change the receive policy. Takes effect at the next terminal event.
    pub fn set_rx_policy(&mut self, policy: RxPolicy, rx_window_ms: u32) {
        info!("RX policy {:?} -> {:?}", self.rx_policy, policy);
        self.rx_policy = policy;
        self.rx_window_ms = rx_window_ms;
    }

    /// Reload mode and PHY parameters from `settings`. Call
    /// [`init`](Self::init) afterwards to apply them to the radio.
    pub fn reconfigure(&mut self, settings: &SettingsRecord) {
        self.mode = settings.link_mode();
        self.config = P2pConfig::from_settings(settings);
        self.set_rx_policy(settings.rx_policy, settings.rx_window_ms);
    }

    /// Last received payload, valid until the next received packet.
    pub fn rx_data(&self) -> &[u8] {
        &self.rx_buf
    }

    /// RSSI of the last received packet, in dBm.
    pub fn last_rssi(&self) -> i16 {
        self.last_rssi
    }

    /// SNR of the last received packet, in dB.
    pub fn last_snr(&self) -> i8 {
        self.last_snr
    }

    pub fn tx_in_flight(&self) -> bool {
        self.tx_in_flight
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn rx_policy(&self) -> RxPolicy {
        self.rx_policy
    }

    pub fn mode(&self) -> LinkMode {
        self.mode
    }

    pub fn config(&self) -> &P2pConfig {
        &self.config
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn indicator(&self) -> &B {
        &self.indicator
    }

    fn finish_tx(&mut self) {
        self.tx_in_flight = false;
        self.indicator.set_busy(false);
    }

    fn complete_cad(
        &mut self,
        channel_clear: bool,
    ) -> Result<Option<Notification>, SessionError<R::Error>> {
        match self.cad.complete(channel_clear) {
            CadResult::Transmit => {
                debug!("Channel clear, transmitting {} bytes", self.tx_buf.len());
                if let Err(e) = self.radio.send(&self.tx_buf) {
                    error!("TX start failed: {:?}", e);
                    self.finish_tx();
                    // Same fallback as a timed-out transmission
                    let action =
                        post_event_action(self.rx_policy, EventKind::TxTimeout, self.rx_window_ms);
                    if let Err(rearm) = self.apply(action) {
                        error!("Radio action after failed TX also failed: {:?}", rearm);
                    }
                    return Err(SessionError::Radio(e));
                }
                Ok(None)
            }
            CadResult::Abort => {
                info!("Channel busy, dropping {} bytes", self.tx_buf.len());
                self.finish_tx();
                self.stats.cad_aborts += 1;
                self.notify_after(EventKind::TxTimeout, Notification::ChannelBusy)
            }
            CadResult::Unexpected => {
                warn!("CAD done without a pending transmission, ignoring");
                Ok(None)
            }
        }
    }

    /// Apply the post-event action for `kind`, then hand out `notification`.
    fn notify_after(
        &mut self,
        kind: EventKind,
        notification: Notification,
    ) -> Result<Option<Notification>, SessionError<R::Error>> {
        let action = post_event_action(self.rx_policy, kind, self.rx_window_ms);
        match self.apply(action) {
            Ok(()) => Ok(Some(notification)),
            Err(source) => {
                error!("Radio action {:?} failed: {:?}", action, source);
                Err(SessionError::Rearm {
                    notification,
                    source,
                })
            }
        }
    }

    fn apply(&mut self, action: RadioAction) -> Result<(), R::Error> {
        debug!("Radio action: {:?}", action);
        match action {
            RadioAction::Sleep => self.radio.sleep(),
            RadioAction::Receive { timeout_ms } => self.radio.start_rx(timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lora::{LoopbackError, LoopbackRadio, RadioCall};

    #[derive(Default)]
    struct Led {
        on: bool,
    }

    impl BusyIndicator for Led {
        fn set_busy(&mut self, busy: bool) {
            self.on = busy;
        }
    }

    fn p2p_settings(policy: RxPolicy) -> SettingsRecord {
        let mut settings = SettingsRecord::default();
        settings.lorawan_enable = false;
        settings.rx_policy = policy;
        settings.rx_window_ms = 3000;
        settings
    }

    fn session(policy: RxPolicy) -> RadioSessionController<LoopbackRadio, Led> {
        let mut session =
            RadioSessionController::new(LoopbackRadio::new(), Led::default(), &p2p_settings(policy));
        session.init().unwrap();
        session.radio_mut().clear_calls();
        session
    }

    /// Run queued radio events through the session, collecting notifications.
    fn drain(session: &mut RadioSessionController<LoopbackRadio, Led>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Some(event) = session.radio_mut().take_event() {
            if let Some(n) = session.handle(event).unwrap() {
                out.push(n);
            }
        }
        out
    }

    fn rx_event(len: usize) -> RadioEvent {
        let data: Vec<u8> = (0..len as u8).collect();
        RadioEvent::rx_done(&data, -70, 6).unwrap()
    }

    #[test]
    fn test_init_p2p_configures_radio() {
        let mut s =
            RadioSessionController::new(LoopbackRadio::new(), (), &p2p_settings(RxPolicy::None));
        s.init().unwrap();

        let config = P2pConfig::default();
        assert_eq!(
            s.radio().calls(),
            &[
                RadioCall::Init,
                RadioCall::SetChannel(916_000_000),
                RadioCall::SetTxConfig(TxParams::from(&config)),
                RadioCall::SetRxConfig(RxParams::from(&config)),
                RadioCall::Sleep,
            ]
        );
        assert!(s.is_initialized());
    }

    #[test]
    fn test_init_applies_policy() {
        for (policy, expected) in [
            (RxPolicy::None, RadioCall::Sleep),
            (RxPolicy::Continuous, RadioCall::StartRx(0)),
            (RxPolicy::OnceThenIdle, RadioCall::StartRx(0)),
            (RxPolicy::TimedWindow, RadioCall::StartRx(3000)),
        ] {
            let mut s =
                RadioSessionController::new(LoopbackRadio::new(), (), &p2p_settings(policy));
            s.init().unwrap();
            assert_eq!(s.radio().last_call(), Some(&expected), "{:?}", policy);
        }
    }

    #[test]
    fn test_init_lorawan_only_sleeps() {
        let mut s =
            RadioSessionController::new(LoopbackRadio::new(), (), &SettingsRecord::default());
        s.init().unwrap();
        assert_eq!(s.radio().calls(), &[RadioCall::Init, RadioCall::Sleep]);
        assert_eq!(s.mode(), LinkMode::LoRaWan);
        assert!(matches!(s.send(b"x"), Err(SessionError::NotP2p)));
    }

    #[test]
    fn test_init_failure_reported() {
        let mut radio = LoopbackRadio::new();
        radio.set_fail_init(true);
        let mut s = RadioSessionController::new(radio, (), &p2p_settings(RxPolicy::Continuous));

        assert!(matches!(s.init(), Err(SessionError::Init(_))));
        assert!(!s.is_initialized());
        assert_eq!(s.radio().calls(), &[RadioCall::Init]);
        assert!(matches!(s.send(b"x"), Err(SessionError::NotInitialized)));
    }

    #[test]
    fn test_send_rejects_oversized_without_radio_calls() {
        let mut s = session(RxPolicy::Continuous);
        let data = [0u8; LORA_MTU + 1];

        assert!(matches!(
            s.send(&data),
            Err(SessionError::PacketTooLarge { size: 257, max: 256 })
        ));
        assert!(s.radio().calls().is_empty());
        assert!(!s.tx_in_flight());
        assert_eq!(s.radio().pending_events(), 0);
    }

    #[test]
    fn test_send_accepts_mtu() {
        let mut s = session(RxPolicy::None);
        s.send(&[0x5A; LORA_MTU]).unwrap();
        drain(&mut s);
        assert_eq!(s.radio().sent(), vec![&[0x5A; LORA_MTU][..]]);
    }

    #[test]
    fn test_send_starts_cad() {
        let mut s = session(RxPolicy::None);
        s.send(b"abc").unwrap();

        assert_eq!(
            s.radio().calls(),
            &[
                RadioCall::Sleep,
                RadioCall::StartCad(CadParams::from(&P2pConfig::default()))
            ]
        );
        assert!(s.tx_in_flight());
        assert!(s.indicator().on);
    }

    #[test]
    fn test_second_send_rejected_while_in_flight() {
        let mut s = session(RxPolicy::None);
        s.send(b"first").unwrap();
        assert!(matches!(s.send(b"second"), Err(SessionError::TxInFlight)));

        drain(&mut s);
        assert_eq!(s.radio().sent(), vec![&b"first"[..]]);

        // Accepted again once the first completes
        s.send(b"third").unwrap();
        drain(&mut s);
        assert_eq!(s.radio().sent(), vec![&b"first"[..], &b"third"[..]]);
    }

    #[test]
    fn test_second_send_rejected_while_awaiting_tx_done() {
        let mut s = session(RxPolicy::None);
        s.send(b"first").unwrap();
        let cad = s.radio_mut().take_event().unwrap();
        assert_eq!(s.handle(cad).unwrap(), None);

        assert!(s.tx_in_flight());
        assert!(matches!(s.send(b"second"), Err(SessionError::TxInFlight)));
    }

    #[test]
    fn test_clear_channel_transmits_buffered_bytes_once() {
        let mut s = session(RxPolicy::None);
        s.send(b"payload").unwrap();

        let notifications = drain(&mut s);

        assert_eq!(s.radio().sent(), vec![&b"payload"[..]]);
        assert_eq!(notifications, vec![Notification::TxDone]);
        assert!(!s.tx_in_flight());
        assert!(!s.indicator().on);
    }

    #[test]
    fn test_busy_channel_never_transmits() {
        for policy in RxPolicy::ALL {
            let mut s = session(policy);
            s.radio_mut().set_channel_clear(false);
            s.send(b"payload").unwrap();

            let notifications = drain(&mut s);

            assert!(s.radio().sent().is_empty(), "{:?}", policy);
            assert_eq!(notifications, vec![Notification::ChannelBusy]);
            assert!(!s.tx_in_flight());
            assert!(!s.indicator().on);
            assert_eq!(s.stats().cad_aborts, 1);

            // Falls back to the failure branch of the policy table
            let expected = match post_event_action(policy, EventKind::TxTimeout, 3000) {
                RadioAction::Sleep => RadioCall::Sleep,
                RadioAction::Receive { timeout_ms } => RadioCall::StartRx(timeout_ms),
            };
            assert_eq!(s.radio().last_call(), Some(&expected), "{:?}", policy);
        }
    }

    #[test]
    fn test_cad_start_failure_rolls_back() {
        let mut s = session(RxPolicy::None);
        s.radio_mut().set_fail_cad(true);

        assert!(matches!(s.send(b"abc"), Err(SessionError::Radio(_))));
        assert!(!s.tx_in_flight());
        assert!(!s.indicator().on);

        s.radio_mut().set_fail_cad(false);
        s.send(b"abc").unwrap();
    }

    #[test]
    fn test_tx_start_failure_falls_back_to_policy() {
        let mut s = session(RxPolicy::Continuous);
        s.radio_mut().set_fail_send(true);
        s.send(b"abc").unwrap();

        let event = s.radio_mut().take_event().unwrap();
        assert!(matches!(
            s.handle(event),
            Err(SessionError::Radio(LoopbackError::SendFailed))
        ));
        assert!(!s.tx_in_flight());
        assert!(!s.indicator().on);
        assert_eq!(s.radio().last_call(), Some(&RadioCall::StartRx(0)));

        // The session accepts the next send
        s.radio_mut().set_fail_send(false);
        s.send(b"abc").unwrap();
    }

    #[test]
    fn test_rearm_failure_keeps_tx_done_notification() {
        let mut s = session(RxPolicy::Continuous);
        s.send(b"abc").unwrap();
        let cad = s.radio_mut().take_event().unwrap();
        assert_eq!(s.handle(cad).unwrap(), None);

        s.radio_mut().set_fail_rx(true);
        let tx_done = s.radio_mut().take_event().unwrap();
        match s.handle(tx_done) {
            Err(SessionError::Rearm {
                notification,
                source,
            }) => {
                assert_eq!(notification, Notification::TxDone);
                assert_eq!(source, LoopbackError::RxFailed);
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert!(!s.tx_in_flight());
        assert_eq!(s.stats().packets_sent, 1);
    }

    #[test]
    fn test_rearm_failure_keeps_received_notification() {
        let mut s = session(RxPolicy::Continuous);
        s.radio_mut().set_fail_rx(true);

        match s.handle(rx_event(4)) {
            Err(SessionError::Rearm { notification, .. }) => {
                assert_eq!(notification.signal(), Signals::PACKET_RECEIVED);
                assert_eq!(s.rx_data(), &[0, 1, 2, 3]);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_unexpected_cad_done_ignored() {
        let mut s = session(RxPolicy::Continuous);
        let result = s
            .handle(RadioEvent::CadDone {
                channel_clear: true,
            })
            .unwrap();
        assert_eq!(result, None);
        assert!(s.radio().calls().is_empty());
    }

    #[test]
    fn test_post_event_actions_follow_table() {
        let events: [(EventKind, fn() -> RadioEvent); 5] = [
            (EventKind::TxDone, || RadioEvent::TxDone),
            (EventKind::RxDone, || rx_event(4)),
            (EventKind::TxTimeout, || RadioEvent::TxTimeout),
            (EventKind::RxTimeout, || RadioEvent::RxTimeout),
            (EventKind::RxCrcError, || RadioEvent::RxCrcError),
        ];

        for policy in RxPolicy::ALL {
            for (kind, make) in &events {
                let mut s = session(policy);
                s.handle(make()).unwrap();

                let expected = match post_event_action(policy, *kind, 3000) {
                    RadioAction::Sleep => RadioCall::Sleep,
                    RadioAction::Receive { timeout_ms } => RadioCall::StartRx(timeout_ms),
                };
                assert_eq!(
                    s.radio().calls(),
                    &[expected],
                    "{:?} x {:?}",
                    policy,
                    kind
                );
            }
        }
    }

    #[test]
    fn test_one_notification_per_terminal_event() {
        let mut s = session(RxPolicy::None);
        assert_eq!(
            s.handle(RadioEvent::TxTimeout).unwrap(),
            Some(Notification::TxTimeout)
        );
        assert_eq!(
            s.handle(RadioEvent::RxTimeout).unwrap(),
            Some(Notification::RxTimeout)
        );
        assert_eq!(
            s.handle(RadioEvent::RxCrcError).unwrap(),
            Some(Notification::RxCrcError)
        );

        let stats = s.stats();
        assert_eq!(stats.tx_timeouts, 1);
        assert_eq!(stats.rx_timeouts, 1);
        assert_eq!(stats.rx_crc_errors, 1);
    }

    #[test]
    fn test_rx_updates_buffer_and_link_quality() {
        let mut s = session(RxPolicy::Continuous);
        s.handle(RadioEvent::rx_done(b"one", -90, -3).unwrap())
            .unwrap();
        assert_eq!(s.rx_data(), b"one");
        assert_eq!(s.last_rssi(), -90);
        assert_eq!(s.last_snr(), -3);

        s.handle(RadioEvent::rx_done(b"second", -60, 7).unwrap())
            .unwrap();
        assert_eq!(s.rx_data(), b"second");
        assert_eq!(s.last_rssi(), -60);
        assert_eq!(s.stats().packets_received, 2);
    }

    #[test]
    fn test_continuous_end_to_end() {
        let mut s = session(RxPolicy::Continuous);
        let data: Vec<u8> = (1..=10).collect();

        s.send(&data).unwrap();
        let notifications = drain(&mut s);

        assert_eq!(s.radio().sent(), vec![data.as_slice()]);
        assert_eq!(notifications, vec![Notification::TxDone]);
        assert_eq!(s.radio().last_call(), Some(&RadioCall::StartRx(0)));
        assert_eq!(
            notifications[0].signal(),
            Signals::UNCONFIRMED_TX_DONE
        );

        s.radio_mut().clear_calls();
        let reply: Vec<u8> = (100..120).collect();
        s.radio_mut()
            .push_event(RadioEvent::rx_done(&reply, -55, 8).unwrap());
        let notifications = drain(&mut s);

        assert_eq!(s.radio().calls(), &[RadioCall::StartRx(0)]);
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].signal(), Signals::PACKET_RECEIVED);
        match &notifications[0] {
            Notification::Received { payload, rssi, snr } => {
                assert_eq!(payload.as_slice(), reply.as_slice());
                assert_eq!(payload.len(), 20);
                assert_eq!(*rssi, -55);
                assert_eq!(*snr, 8);
            }
            other => panic!("unexpected notification {:?}", other),
        }
        assert_eq!(s.rx_data(), reply.as_slice());
    }

    #[test]
    fn test_once_then_idle_listens_after_tx_then_sleeps() {
        let mut s = session(RxPolicy::OnceThenIdle);
        s.send(b"ping").unwrap();
        drain(&mut s);
        assert_eq!(s.radio().last_call(), Some(&RadioCall::StartRx(0)));

        s.handle(rx_event(4)).unwrap();
        assert_eq!(s.radio().last_call(), Some(&RadioCall::Sleep));
    }

    #[test]
    fn test_set_rx_policy_takes_effect_on_next_event() {
        let mut s = session(RxPolicy::None);
        s.set_rx_policy(RxPolicy::TimedWindow, 1500);
        assert!(s.radio().calls().is_empty());

        s.handle(RadioEvent::TxDone).unwrap();
        assert_eq!(s.radio().calls(), &[RadioCall::StartRx(1500)]);
    }

    #[test]
    fn test_notification_signals() {
        assert_eq!(Notification::TxDone.signal(), Signals::UNCONFIRMED_TX_DONE);
        assert_eq!(Notification::TxTimeout.signal(), Signals::CONFIRMED_TX_NAK);
        assert!(Notification::ChannelBusy.signal().is_empty());
        assert!(Notification::RxTimeout.signal().is_empty());
        assert!(Notification::TxDone.is_tx_success());
        assert!(!Notification::ChannelBusy.is_tx_success());
    }
}
