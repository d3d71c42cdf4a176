/*!
 * Lifecycle Events
 * Strongly-typed payloads published on the lifecycle channels
 *
 * The five-channel lifecycle (start, add, error, async-end, end) is
 * universal; payload shapes are integration-specific and downstream
 * consumers must treat them that way.
 */

use crate::context::Context;
use crate::core::types::{Headers, MessageId};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Payload published on a lifecycle channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// No structured data (end, async-end, and bare start events)
    Empty,

    /// Operation failure, published at most once per operation instance
    Error(ErrorInfo),

    /// A request-style operation began
    RequestStart {
        method: String,
        project_id: Option<String>,
    },

    /// One underlying network request issued by a logical operation
    /// (retries publish this more than once)
    RequestIssued { method: String },

    /// A producer batch is about to be sent
    ProduceBatch { topic: String, message_count: usize },

    /// A consumed message was dispatched to a handler
    ConsumeStart {
        topic: String,
        partition: i32,
        offset: i64,
        headers: Headers,
    },

    /// A receive-path message was dispensed to a subscriber
    ReceiveStart { message_id: MessageId },

    /// A receive-path lease was released (one per dispensed message)
    ReceiveLease { message_id: MessageId },
}

impl Payload {
    /// Build an error payload from any displayable failure
    pub fn from_failure<E: std::fmt::Display>(err: &E) -> Self {
        Payload::Error(ErrorInfo::from_failure(err))
    }
}

/// Serializable rendering of an operation failure
///
/// The failure value itself is returned unchanged to the original caller;
/// the channel carries this rendering for span-tagging consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    pub kind: Option<String>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
        }
    }

    /// Capture a failure's display rendering and concrete type name
    pub fn from_failure<E: std::fmt::Display>(err: &E) -> Self {
        Self {
            message: err.to_string(),
            kind: Some(std::any::type_name::<E>().to_string()),
        }
    }
}

/// A published lifecycle event: payload plus the context it was emitted under
///
/// Channels may interleave events from unrelated operation instances;
/// consumers disambiguate by the attached context, never by arrival order.
#[derive(Debug, Clone)]
pub struct Event {
    /// Monotonic timestamp (nanoseconds since first event)
    pub timestamp_ns: u64,
    /// Causal context active at publish time
    pub context: Option<Context>,
    /// Event payload
    pub payload: Payload,
}

impl Event {
    /// Create a new event stamped with the ambient context
    #[inline]
    pub fn new(payload: Payload) -> Self {
        Self {
            timestamp_ns: Self::now_ns(),
            context: Context::current(),
            payload,
        }
    }

    /// Get current time in nanoseconds (monotonic)
    #[inline]
    fn now_ns() -> u64 {
        static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        let start = START.get_or_init(Instant::now);
        start.elapsed().as_nanos() as u64
    }

    /// Identity of the attached context, if any
    #[inline]
    pub fn context_id(&self) -> Option<uuid::Uuid> {
        self.context.as_ref().map(|cx| cx.id())
    }
}
