//! Receive policy and the post-event radio action table.
//!
//! After every terminal radio event the controller either puts the radio to
//! sleep or re-arms the receiver. Which one is decided here, purely from the
//! active [`RxPolicy`] and the kind of event, so the table can be tested
//! without a radio.

/// What the receiver does after a terminal radio event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RxPolicy {
    /// Sleep after every event.
    #[default]
    None,
    /// Keep listening with no timeout.
    Continuous,
    /// Listen for the configured window after a transmission, otherwise sleep.
    TimedWindow,
    /// Listen after a transmission until one terminal RX event, then sleep.
    OnceThenIdle,
}

impl RxPolicy {
    /// All policies in code order.
    pub const ALL: [RxPolicy; 4] = [
        RxPolicy::None,
        RxPolicy::Continuous,
        RxPolicy::TimedWindow,
        RxPolicy::OnceThenIdle,
    ];

    /// Policy for a persisted code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Persisted code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Radio action when the radio is (re)configured at init.
    pub fn initial_action(self, rx_window_ms: u32) -> RadioAction {
        match self {
            RxPolicy::None => RadioAction::Sleep,
            RxPolicy::Continuous | RxPolicy::OnceThenIdle => RadioAction::Receive { timeout_ms: 0 },
            RxPolicy::TimedWindow => RadioAction::Receive {
                timeout_ms: rx_window_ms,
            },
        }
    }
}

/// Terminal radio event kinds that drive the policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    TxDone,
    RxDone,
    TxTimeout,
    RxTimeout,
    RxCrcError,
}

/// Radio operation to apply after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioAction {
    Sleep,
    /// Start receiving; a timeout of 0 means no timeout.
    Receive { timeout_ms: u32 },
}

/// Radio action for `policy` after an event of kind `kind`.
///
/// | Event      | None  | Continuous | TimedWindow | OnceThenIdle |
/// |------------|-------|------------|-------------|--------------|
/// | TxDone     | sleep | RX (0)     | RX (window) | RX (0)       |
/// | RxDone     | sleep | RX (0)     | sleep       | sleep        |
/// | TxTimeout  | sleep | RX (0)     | sleep       | sleep        |
/// | RxTimeout  | sleep | RX (0)     | sleep       | sleep        |
/// | RxCrcError | sleep | RX (0)     | sleep       | sleep        |
///
/// A busy channel after CAD is handled as `TxTimeout`.
pub fn post_event_action(policy: RxPolicy, kind: EventKind, rx_window_ms: u32) -> RadioAction {
    match (policy, kind) {
        (RxPolicy::None, _) => RadioAction::Sleep,
        (RxPolicy::Continuous, _) => RadioAction::Receive { timeout_ms: 0 },
        (RxPolicy::TimedWindow, EventKind::TxDone) => RadioAction::Receive {
            timeout_ms: rx_window_ms,
        },
        // Listen for the reply to our own transmission
        (RxPolicy::OnceThenIdle, EventKind::TxDone) => RadioAction::Receive { timeout_ms: 0 },
        (RxPolicy::TimedWindow | RxPolicy::OnceThenIdle, _) => RadioAction::Sleep,
    }
}
