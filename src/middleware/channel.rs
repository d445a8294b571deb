//! Channel-backed middleware for observing a store from elsewhere.
//!
//! Each hook invocation is turned into a [`StoreEvent`] and pushed into a
//! bounded channel. A subscriber that falls behind (buffer full) or goes away
//! is dropped: it stops receiving events, and the store never fails an update
//! on its account.

use super::pipeline::{HookResult, Middleware};
use crate::types::{Hook, PassLog, UpdateLog};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Configuration for a channel subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping the subscriber.
    /// Default: 1000
    pub buffer_size: usize,

    /// Which hooks to forward.
    pub filter: EventFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            filter: EventFilter::all(),
        }
    }
}

/// Which hook invocations become events.
#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    pub before_set_state: bool,
    pub after_set_state: bool,
    pub new_provider_value: bool,
}

impl EventFilter {
    /// Forward every hook.
    pub fn all() -> Self {
        Self {
            before_set_state: true,
            after_set_state: true,
            new_provider_value: true,
        }
    }

    /// Forward committed updates only.
    pub fn updates() -> Self {
        Self {
            after_set_state: true,
            ..Default::default()
        }
    }

    /// Forward provider passes only.
    pub fn passes() -> Self {
        Self {
            new_provider_value: true,
            ..Default::default()
        }
    }

    pub fn includes(&self, hook: Hook) -> bool {
        match hook {
            Hook::BeforeSetState => self.before_set_state,
            Hook::AfterSetState => self.after_set_state,
            Hook::NewProviderValue => self.new_provider_value,
        }
    }
}

/// Events emitted to subscribers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// An update is about to be committed.
    BeforeSetState { log: UpdateLog },

    /// An update was committed.
    AfterSetState { log: UpdateLog },

    /// A provider pass flushed its aggregated change.
    NewProviderValue { log: PassLog },

    /// Subscription was dropped; nothing follows.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Receiver went away.
    Disconnected,
}

/// Receiving end of a channel subscription.
pub struct SubscriptionHandle {
    pub receiver: Receiver<StoreEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<StoreEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<StoreEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<StoreEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain whatever is buffered right now.
    pub fn drain(&self) -> Vec<StoreEvent> {
        self.receiver.try_iter().collect()
    }
}

/// Middleware forwarding hook invocations into a bounded channel.
pub struct ChannelMiddleware {
    sender: Sender<StoreEvent>,
    filter: EventFilter,
    dropped: AtomicBool,
}

impl ChannelMiddleware {
    /// Create the middleware and the handle its events arrive on.
    pub fn subscribe(config: SubscriptionConfig) -> (Arc<Self>, SubscriptionHandle) {
        let (sender, receiver) = bounded(config.buffer_size);
        let middleware = Arc::new(Self {
            sender,
            filter: config.filter,
            dropped: AtomicBool::new(false),
        });
        (middleware, SubscriptionHandle { receiver })
    }

    /// Whether the subscriber has been dropped.
    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }

    fn forward(&self, hook: Hook, event: impl FnOnce() -> StoreEvent) {
        if !self.filter.includes(hook) || self.is_dropped() {
            return;
        }

        let reason = match self.sender.try_send(event()) {
            Ok(()) => return,
            Err(TrySendError::Full(_)) => DropReason::BufferOverflow,
            Err(TrySendError::Disconnected(_)) => DropReason::Disconnected,
        };

        self.dropped.store(true, Ordering::SeqCst);
        warn!(%hook, ?reason, "Dropping store subscriber");
        // Best effort; the buffer is probably still full.
        let _ = self.sender.try_send(StoreEvent::Dropped { reason });
    }
}

impl Middleware for ChannelMiddleware {
    fn before_set_state(&self, log: &mut UpdateLog) -> HookResult {
        self.forward(Hook::BeforeSetState, || StoreEvent::BeforeSetState { log: log.clone() });
        Ok(())
    }

    fn after_set_state(&self, log: &mut UpdateLog) -> HookResult {
        self.forward(Hook::AfterSetState, || StoreEvent::AfterSetState { log: log.clone() });
        Ok(())
    }

    fn new_provider_value(&self, log: &mut PassLog) -> HookResult {
        self.forward(Hook::NewProviderValue, || StoreEvent::NewProviderValue {
            log: log.clone(),
        });
        Ok(())
    }
}
