/*!
 * Lifecycle Event Bus
 * Named publish/subscribe channels tying instrumentation producers to
 * arbitrary downstream subscribers without direct coupling
 *
 * Publishing is synchronous and fire-and-forget. Subscribers run on the
 * publisher's call stack with the publisher's ambient context; isolating
 * subscribers from each other is the consumer's responsibility.
 */

use crate::lifecycle::events::{Event, Payload};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Handle for removing a subscriber from a channel
pub type SubscriptionId = u64;

type SubscriberFn = Arc<dyn Fn(&Event) + Send + Sync>;

/// A named publish/subscribe endpoint with zero or more subscribers
pub struct Channel {
    name: Arc<str>,
    subscribers: RwLock<Vec<(SubscriptionId, SubscriberFn)>>,
    next_id: AtomicU64,
}

impl Channel {
    fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Channel name (immutable for the life of the process)
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether anyone is listening; used to skip instrumentation overhead
    /// when tracing is not enabled for this channel
    #[inline]
    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.read().is_empty()
    }

    /// Publish a payload to every subscriber, synchronously, in
    /// registration order
    ///
    /// The event is stamped with the ambient causal context at publish
    /// time. No-op when nobody subscribed.
    pub fn publish(&self, payload: Payload) {
        // Snapshot so a subscriber may touch the channel without deadlock.
        let subscribers: Vec<SubscriberFn> = {
            let guard = self.subscribers.read();
            if guard.is_empty() {
                return;
            }
            guard.iter().map(|(_, f)| Arc::clone(f)).collect()
        };

        let event = Event::new(payload);
        for subscriber in subscribers {
            subscriber(&event);
        }
    }

    /// Register a subscriber; returns an id for later removal
    pub fn subscribe<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push((id, Arc::new(f)));
        debug!(channel = %self.name, subscription = id, "subscriber added");
        id
    }

    /// Remove a subscriber; returns false if the id was unknown
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        before != subscribers.len()
    }

    /// Current subscriber count
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Process-wide, idempotent mapping from channel name to the shared
/// channel object
///
/// Constructed once by the host at startup and injected wherever channels
/// are needed; registration happens before traffic flows and channels are
/// never removed.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: DashMap<String, Arc<Channel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or lazily create the channel for `name`
    ///
    /// Repeated calls with the same name return the identical shared object.
    pub fn channel(&self, name: &str) -> Arc<Channel> {
        self.channels
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Channel::new(name)))
            .clone()
    }

    /// Number of distinct channels created so far
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// The five lifecycle channels of one integration namespace
///
/// `<ns>:start`, `<ns>:add`, `<ns>:error`, `<ns>:async-end`, `<ns>:end` —
/// the sole wire contract between the engine and any tracing consumer.
#[derive(Debug, Clone)]
pub struct LifecycleChannels {
    pub start: Arc<Channel>,
    pub add: Arc<Channel>,
    pub error: Arc<Channel>,
    pub async_end: Arc<Channel>,
    pub end: Arc<Channel>,
}

impl LifecycleChannels {
    pub fn new(registry: &ChannelRegistry, namespace: &str) -> Self {
        Self {
            start: registry.channel(&format!("{namespace}:start")),
            add: registry.channel(&format!("{namespace}:add")),
            error: registry.channel(&format!("{namespace}:error")),
            async_end: registry.channel(&format!("{namespace}:async-end")),
            end: registry.channel(&format!("{namespace}:end")),
        }
    }
}
