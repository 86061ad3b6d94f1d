//! Publish/subscribe bus for external control messages.
//!
//! One bus is created per process (or per test) and handed to every
//! controller and collaborator that needs it; there is no global instance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use fable_ir::{ControlSink, Message};

/// Handle returned by [`SignalBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "subscriber#{}", self.0)
    }
}

pub trait SignalReceiver: Send + Sync {
    fn on_receive(&self, message: &Message);
}

impl<F> SignalReceiver for F
where
    F: Fn(&Message) + Send + Sync,
{
    fn on_receive(&self, message: &Message) {
        self(message)
    }
}

/// Forwards every message into an unbounded channel.
pub struct ChannelReceiver {
    tx: mpsc::UnboundedSender<Message>,
}

impl ChannelReceiver {
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { tx }
    }
}

impl SignalReceiver for ChannelReceiver {
    fn on_receive(&self, message: &Message) {
        if self.tx.send(message.clone()).is_err() {
            tracing::trace!("dropping {} for a closed receiver", message);
        }
    }
}

#[derive(Default)]
pub struct SignalBus {
    subscribers: RwLock<Vec<(SubscriberId, Arc<dyn SignalReceiver>)>>,
    next_id: AtomicU64,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, receiver: Arc<dyn SignalReceiver>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, receiver));
        tracing::debug!("{} subscribed", id);
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        let removed = subscribers.len() != before;
        if removed {
            tracing::debug!("{} unsubscribed", id);
        }
        removed
    }

    /// Deliver `message` synchronously to every current subscriber, in
    /// subscription order.
    pub fn broadcast(&self, message: Message) {
        // Snapshot so handlers may subscribe or unsubscribe while we deliver.
        let receivers: Vec<Arc<dyn SignalReceiver>> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, r)| Arc::clone(r))
            .collect();
        tracing::trace!("broadcasting {} to {} subscribers", message, receivers.len());
        for receiver in receivers {
            receiver.on_receive(&message);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl ControlSink for SignalBus {
    fn post(&self, message: Message) {
        self.broadcast(message);
    }
}
