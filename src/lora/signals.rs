//! Notification flags for the application task.
//!
//! The radio path raises flags; the application task waits for them and
//! takes the accumulated set. Flags raised while the consumer is busy are
//! OR-ed together and delivered on the next take.

use std::sync::atomic::{AtomicU8, Ordering};

use bitflags::bitflags;
use tokio::sync::Notify;

bitflags! {
    /// Wake-up reasons for the application task.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Signals: u8 {
        /// Unconfirmed transmission finished
        const UNCONFIRMED_TX_DONE = 0x01;
        /// Confirmed transmission acknowledged
        const CONFIRMED_TX_ACK = 0x02;
        /// Confirmed transmission not acknowledged, or transmission failed
        const CONFIRMED_TX_NAK = 0x04;
        /// Periodic send timer fired
        const PERIODIC_SEND = 0x08;
        /// Network join succeeded
        const JOIN_SUCCESS = 0x10;
        /// Network join failed
        const JOIN_FAIL = 0x20;
        /// Packet received
        const PACKET_RECEIVED = 0x40;
        /// Join requested by configuration
        const JOIN_REQUESTED = 0x80;
    }
}

/// Accumulating, awaitable set of [`Signals`].
#[derive(Debug, Default)]
pub struct SignalSet {
    pending: AtomicU8,
    notify: Notify,
}

impl SignalSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `signals` to the pending set and wake the consumer.
    pub fn raise(&self, signals: Signals) {
        if signals.is_empty() {
            return;
        }
        self.pending.fetch_or(signals.bits(), Ordering::AcqRel);
        self.notify.notify_one();
    }

    /// Take and clear the pending set.
    pub fn take(&self) -> Signals {
        Signals::from_bits_retain(self.pending.swap(0, Ordering::AcqRel))
    }

    /// Pending set without clearing it.
    pub fn peek(&self) -> Signals {
        Signals::from_bits_retain(self.pending.load(Ordering::Acquire))
    }

    /// Wait until at least one signal is pending, then take the set.
    pub async fn wait(&self) -> Signals {
        loop {
            let signals = self.take();
            if !signals.is_empty() {
                return signals;
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_flag_values() {
        assert_eq!(Signals::UNCONFIRMED_TX_DONE.bits(), 0x01);
        assert_eq!(Signals::CONFIRMED_TX_NAK.bits(), 0x04);
        assert_eq!(Signals::PERIODIC_SEND.bits(), 0x08);
        assert_eq!(Signals::PACKET_RECEIVED.bits(), 0x40);
        assert_eq!(Signals::JOIN_REQUESTED.bits(), 0x80);
        assert_eq!(Signals::all().bits(), 0xFF);
    }

    #[test]
    fn test_raise_accumulates() {
        let set = SignalSet::new();
        set.raise(Signals::UNCONFIRMED_TX_DONE);
        set.raise(Signals::PACKET_RECEIVED);
        set.raise(Signals::UNCONFIRMED_TX_DONE);

        assert_eq!(
            set.take(),
            Signals::UNCONFIRMED_TX_DONE | Signals::PACKET_RECEIVED
        );
        assert!(set.take().is_empty());
    }

    #[test]
    fn test_raise_empty_is_ignored() {
        let set = SignalSet::new();
        set.raise(Signals::empty());
        assert!(set.peek().is_empty());
    }

    #[tokio::test]
    async fn test_wait_returns_already_pending() {
        let set = SignalSet::new();
        set.raise(Signals::PERIODIC_SEND);
        assert_eq!(set.wait().await, Signals::PERIODIC_SEND);
    }

    #[tokio::test]
    async fn test_wait_wakes_on_raise() {
        let set = Arc::new(SignalSet::new());
        let raiser = set.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            raiser.raise(Signals::PACKET_RECEIVED);
        });

        let signals = tokio::time::timeout(Duration::from_secs(1), set.wait())
            .await
            .expect("wait timed out");
        assert_eq!(signals, Signals::PACKET_RECEIVED);
    }
}
