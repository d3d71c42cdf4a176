/*!
 * Message-Span Association Table
 * Non-owning side table from in-flight receive-path messages to
 * externally-created span references
 *
 * Populated by the tracing consumer before a message is emitted; read by
 * the subscription emit wrapper to decide whether an emission is an
 * instrumented completion point; evicted when the lease-manager wrapper
 * observes the message's lease being released.
 */

use crate::core::types::{MessageId, SpanHandle};
use dashmap::DashMap;

/// Index-based side table keyed by message identity
#[derive(Default)]
pub struct SpanTable {
    entries: DashMap<MessageId, SpanHandle>,
}

impl SpanTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a span with a message (called by the consumer before the
    /// message is emitted)
    pub fn associate(&self, message_id: MessageId, span: SpanHandle) {
        self.entries.insert(message_id, span);
    }

    /// Look up the span for a message, if one was associated
    pub fn get(&self, message_id: MessageId) -> Option<SpanHandle> {
        self.entries.get(&message_id).map(|entry| entry.clone())
    }

    /// Whether the message has an associated span
    #[inline]
    pub fn contains(&self, message_id: MessageId) -> bool {
        self.entries.contains_key(&message_id)
    }

    /// Drop the association once the message's lease is released
    pub fn evict(&self, message_id: MessageId) -> Option<SpanHandle> {
        self.entries.remove(&message_id).map(|(_, span)| span)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
