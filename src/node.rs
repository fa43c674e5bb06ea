//! Node abstraction tying settings, radio session and signals together.
//!
//! A [`Node`] runs the start-up sequence (load settings, initialize the
//! radio), dispatches radio events and raises the resulting signals for the
//! application task. Settings changes are persisted and re-applied to the
//! radio.
//!
//! # Example
//!
//! ```
//! use lora_p2p_node::lora::{LoopbackRadio, RxPolicy, Signals};
//! use lora_p2p_node::settings::MemoryFlash;
//! use lora_p2p_node::Node;
//!
//! let uid = [0xE6, 0x60, 0x48, 0x07, 0x3B, 0x8A, 0x21, 0x2F];
//! let mut node = Node::start(LoopbackRadio::new(), (), MemoryFlash::new(), uid).unwrap();
//!
//! node.update_settings(|s| {
//!     s.lorawan_enable = false;
//!     s.rx_policy = RxPolicy::Continuous;
//! })
//! .unwrap();
//!
//! node.send(b"hello").unwrap();
//! while let Some(event) = node.session_mut().radio_mut().take_event() {
//!     node.dispatch(event).unwrap();
//! }
//! assert!(node.signals().take().contains(Signals::UNCONFIRMED_TX_DONE));
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::lora::{
    BusyIndicator, Notification, Radio, RadioEvent, RadioSessionController, SessionError,
    SignalSet, Signals,
};
use crate::settings::{Flash, LoadOutcome, SettingsRecord, SettingsStore, StorageError, UniqueId};

/// Error type for Node operations.
#[derive(Debug)]
pub enum NodeError<E> {
    /// Settings storage failed.
    Storage(StorageError),
    /// Radio session failed.
    Session(SessionError<E>),
}

impl<E: fmt::Debug> fmt::Display for NodeError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::Storage(e) => write!(f, "settings storage: {}", e),
            NodeError::Session(e) => write!(f, "radio session: {}", e),
        }
    }
}

impl<E: fmt::Debug> std::error::Error for NodeError<E> {}

impl<E> From<StorageError> for NodeError<E> {
    fn from(e: StorageError) -> Self {
        NodeError::Storage(e)
    }
}

impl<E> From<SessionError<E>> for NodeError<E> {
    fn from(e: SessionError<E>) -> Self {
        NodeError::Session(e)
    }
}

/// A LoRa P2P node.
pub struct Node<R: Radio, F: Flash, B: BusyIndicator = ()> {
    store: SettingsStore<F>,
    session: RadioSessionController<R, B>,
    signals: Arc<SignalSet>,
}

impl<R: Radio, F: Flash, B: BusyIndicator> Node<R, F, B> {
    /// Load settings from `flash` and initialize the radio.
    ///
    /// On first boot the settings are regenerated from `uid` and written
    /// before the radio is configured.
    pub fn start(
        radio: R,
        indicator: B,
        flash: F,
        uid: UniqueId,
    ) -> Result<Self, NodeError<R::Error>> {
        let mut store = SettingsStore::new(flash, uid);
        if store.load()? == LoadOutcome::Regenerated {
            info!("First boot, settings regenerated");
        }
        store.log_settings();

        let mut session = RadioSessionController::new(radio, indicator, store.settings());
        session.init()?;

        Ok(Self {
            store,
            session,
            signals: Arc::new(SignalSet::new()),
        })
    }

    /// Dispatch one radio event and raise its signal.
    ///
    /// The signal is raised even when the radio could not be re-armed
    /// afterwards.
    pub fn dispatch(
        &mut self,
        event: RadioEvent,
    ) -> Result<Option<Notification>, NodeError<R::Error>> {
        let notification = match self.session.handle(event) {
            Ok(notification) => notification,
            Err(e) => {
                if let SessionError::Rearm { notification, .. } = &e {
                    self.signals.raise(notification.signal());
                }
                return Err(e.into());
            }
        };
        if let Some(ref n) = notification {
            debug!("Notification {:?}", n);
            self.signals.raise(n.signal());
        }
        Ok(notification)
    }

    /// Queue a packet for transmission.
    pub fn send(&mut self, data: &[u8]) -> Result<(), NodeError<R::Error>> {
        self.session.send(data)?;
        Ok(())
    }

    /// Signals for the application task.
    pub fn signals(&self) -> Arc<SignalSet> {
        self.signals.clone()
    }

    /// Active settings.
    pub fn settings(&self) -> &SettingsRecord {
        self.store.settings()
    }

    /// Modify the settings, persist them if they changed and re-initialize
    /// the radio with them.
    ///
    /// Returns `true` if the settings were written.
    pub fn update_settings(
        &mut self,
        update: impl FnOnce(&mut SettingsRecord),
    ) -> Result<bool, NodeError<R::Error>> {
        update(self.store.settings_mut());
        let written = self.store.save()?;
        self.apply_settings()?;
        Ok(written)
    }

    /// Persist the active settings if they changed.
    pub fn save_settings(&mut self) -> Result<bool, NodeError<R::Error>> {
        Ok(self.store.save()?)
    }

    /// Restore defaults with derived credentials, write them and
    /// re-initialize the radio.
    pub fn factory_reset(&mut self) -> Result<(), NodeError<R::Error>> {
        self.store.reset()?;
        self.apply_settings()
    }

    /// Interval of the periodic send trigger, if enabled.
    pub fn periodic_interval(&self) -> Option<Duration> {
        match self.store.settings().send_repeat_time {
            0 => None,
            ms => Some(Duration::from_millis(ms as u64)),
        }
    }

    pub fn session(&self) -> &RadioSessionController<R, B> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut RadioSessionController<R, B> {
        &mut self.session
    }

    pub fn store(&self) -> &SettingsStore<F> {
        &self.store
    }

    fn apply_settings(&mut self) -> Result<(), NodeError<R::Error>> {
        self.session.reconfigure(self.store.settings());
        self.session.init()?;
        Ok(())
    }
}

/// Raise [`Signals::PERIODIC_SEND`] every `period` until cancelled.
pub async fn run_periodic_trigger(
    signals: Arc<SignalSet>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut timer = tokio::time::interval(period);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick completes immediately
    timer.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Periodic trigger stopped");
                break;
            }
            _ = timer.tick() => {
                signals.raise(Signals::PERIODIC_SEND);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lora::{LinkMode, LoopbackRadio, RadioCall, RxPolicy};
    use crate::settings::{Credentials, MemoryFlash};

    const UID: UniqueId = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    type TestNode = Node<LoopbackRadio, MemoryFlash>;

    fn p2p_node(policy: RxPolicy) -> TestNode {
        let mut node = Node::start(LoopbackRadio::new(), (), MemoryFlash::new(), UID).unwrap();
        node.update_settings(|s| {
            s.lorawan_enable = false;
            s.rx_policy = policy;
        })
        .unwrap();
        node.session_mut().radio_mut().clear_calls();
        node
    }

    fn run_events(node: &mut TestNode) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Some(event) = node.session_mut().radio_mut().take_event() {
            if let Some(n) = node.dispatch(event).unwrap() {
                out.push(n);
            }
        }
        out
    }

    #[test]
    fn test_first_start_regenerates_settings() {
        let node = Node::start(LoopbackRadio::new(), (), MemoryFlash::new(), UID).unwrap();

        assert_eq!(node.settings().dev_eui, Credentials::derive(&UID).dev_eui);
        assert_eq!(node.store().flash().program_count(), 1);
        assert_eq!(node.session().mode(), LinkMode::LoRaWan);
        assert!(node.session().is_initialized());
    }

    #[test]
    fn test_start_failure_reports_session_error() {
        let mut radio = LoopbackRadio::new();
        radio.set_fail_init(true);
        let result = Node::start(radio, (), MemoryFlash::new(), UID);
        assert!(matches!(
            result,
            Err(NodeError::Session(SessionError::Init(_)))
        ));
    }

    #[test]
    fn test_update_settings_persists_and_reinitializes() {
        let mut node = Node::start(LoopbackRadio::new(), (), MemoryFlash::new(), UID).unwrap();
        node.session_mut().radio_mut().clear_calls();

        let written = node
            .update_settings(|s| {
                s.lorawan_enable = false;
                s.rx_policy = RxPolicy::TimedWindow;
                s.rx_window_ms = 2500;
            })
            .unwrap();

        assert!(written);
        assert_eq!(node.session().mode(), LinkMode::P2p);
        assert_eq!(node.session().rx_policy(), RxPolicy::TimedWindow);
        assert_eq!(
            node.session().radio().last_call(),
            Some(&RadioCall::StartRx(2500))
        );

        // Same values again: no write
        assert!(!node.update_settings(|s| s.rx_window_ms = 2500).unwrap());
    }

    #[test]
    fn test_send_raises_tx_done_signal() {
        let mut node = p2p_node(RxPolicy::Continuous);
        node.send(b"hello").unwrap();
        let notifications = run_events(&mut node);

        assert_eq!(notifications, vec![Notification::TxDone]);
        assert_eq!(node.signals().take(), Signals::UNCONFIRMED_TX_DONE);
    }

    #[test]
    fn test_echo_raises_packet_received() {
        let mut node = p2p_node(RxPolicy::Continuous);
        node.session_mut().radio_mut().set_echo(true);
        node.send(b"ping").unwrap();
        run_events(&mut node);

        assert_eq!(
            node.signals().take(),
            Signals::UNCONFIRMED_TX_DONE | Signals::PACKET_RECEIVED
        );
        assert_eq!(node.session().rx_data(), b"ping");
    }

    #[test]
    fn test_busy_channel_raises_nothing() {
        let mut node = p2p_node(RxPolicy::None);
        node.session_mut().radio_mut().set_channel_clear(false);
        node.send(b"hello").unwrap();
        let notifications = run_events(&mut node);

        assert_eq!(notifications, vec![Notification::ChannelBusy]);
        assert!(node.signals().take().is_empty());
    }

    #[test]
    fn test_rearm_failure_still_raises_signal() {
        let mut node = p2p_node(RxPolicy::Continuous);
        node.send(b"hello").unwrap();
        let cad = node.session_mut().radio_mut().take_event().unwrap();
        node.dispatch(cad).unwrap();

        node.session_mut().radio_mut().set_fail_rx(true);
        let tx_done = node.session_mut().radio_mut().take_event().unwrap();
        assert!(matches!(
            node.dispatch(tx_done),
            Err(NodeError::Session(SessionError::Rearm { .. }))
        ));
        assert_eq!(node.signals().take(), Signals::UNCONFIRMED_TX_DONE);
    }

    #[test]
    fn test_echo_not_received_while_sleeping() {
        let mut node = p2p_node(RxPolicy::None);
        node.session_mut().radio_mut().set_echo(true);
        node.send(b"ping").unwrap();
        let notifications = run_events(&mut node);

        assert_eq!(notifications, vec![Notification::TxDone]);
        assert_eq!(node.signals().take(), Signals::UNCONFIRMED_TX_DONE);
    }

    #[test]
    fn test_factory_reset() {
        let mut node = p2p_node(RxPolicy::Continuous);
        node.factory_reset().unwrap();

        assert_eq!(node.session().mode(), LinkMode::LoRaWan);
        assert_eq!(node.settings().rx_policy, RxPolicy::None);
        assert_eq!(node.settings().dev_addr, Credentials::derive(&UID).dev_addr);
        assert!(matches!(
            node.send(b"x"),
            Err(NodeError::Session(SessionError::NotP2p))
        ));
    }

    #[test]
    fn test_periodic_interval() {
        let mut node = p2p_node(RxPolicy::None);
        assert_eq!(node.periodic_interval(), Some(Duration::from_millis(120_000)));
        node.update_settings(|s| s.send_repeat_time = 0).unwrap();
        assert_eq!(node.periodic_interval(), None);
    }

    #[tokio::test]
    async fn test_periodic_trigger_raises_and_stops() {
        let signals = Arc::new(SignalSet::new());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_periodic_trigger(
            signals.clone(),
            Duration::from_millis(10),
            cancel.clone(),
        ));

        let raised = tokio::time::timeout(Duration::from_secs(1), signals.wait())
            .await
            .expect("no periodic signal");
        assert_eq!(raised, Signals::PERIODIC_SEND);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("trigger did not stop")
            .unwrap();
    }
}
