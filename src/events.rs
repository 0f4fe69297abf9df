//! Typed balance-change notifications.
//!
//! Independent UI surfaces (chat credit badge, dashboard, garden view) learn
//! of balance changes through an explicit publish/subscribe channel owned by
//! the state container, rather than an ambient global event. Exactly one
//! [`CreditUpdate`] is published per successful mutation; failed mutations
//! publish nothing.

use tokio::sync::broadcast;
use tracing::trace;

/// Payload broadcast after every successful balance mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditUpdate {
    /// Balance after the mutation was applied. Always authoritative:
    /// subscribers should display this value rather than accumulate
    /// `change` themselves.
    pub new_balance: i64,
    /// Signed delta the server confirmed (negative for spends). When a
    /// refresh landed while the mutation was in flight, `new_balance`
    /// already includes this delta from the server side, so it is not
    /// additive on top of the previously displayed balance.
    pub change: i64,
    /// Free-text classification of the mutation source
    pub reason: String,
}

/// Broadcast channel for [`CreditUpdate`] notifications.
///
/// Slow subscribers may observe `Lagged` on their receiver if they fall more
/// than the channel capacity behind; the publisher never blocks.
pub struct EventBus {
    sender: broadcast::Sender<CreditUpdate>,
}

impl EventBus {
    /// Creates a bus that retains up to `capacity` undelivered updates per
    /// subscriber. A capacity of zero is treated as one; the underlying
    /// channel requires at least one slot.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Registers a new subscriber. Subscribers only see updates published
    /// after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CreditUpdate> {
        self.sender.subscribe()
    }

    /// Publishes an update to all current subscribers. Having no subscribers
    /// is not an error.
    pub(crate) fn publish(&self, update: CreditUpdate) {
        match self.sender.send(update) {
            Ok(receivers) => trace!("Published credit update to {receivers} subscriber(s)"),
            Err(_) => trace!("Credit update published with no subscribers"),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(16)
    }
}
