/*!
 * Tracetap
 * Instrumentation engine of a distributed-tracing agent
 *
 * Attaches observation points to third-party client-library operations
 * without modifying those libraries, and propagates causal context across
 * asynchronous boundaries so a downstream consumer can reconstruct
 * accurate parent/child span trees.
 *
 * The pieces:
 * - [`bus`]: named lifecycle channels (start, add, error, async-end, end)
 * - [`hooks`]: module hook registry with version matching and a patch
 *   failure boundary
 * - [`context`]: causal context captured at bind time, restored when a
 *   deferred continuation fires
 * - [`lifecycle`]: the driver publishing the five-event protocol per
 *   calling convention
 * - [`integrations`]: kafka and pubsub patch functions
 */

pub mod bus;
pub mod context;
pub mod core;
pub mod hooks;
pub mod integrations;
pub mod lifecycle;
pub mod telemetry;

// Re-exports
pub use bus::{Channel, ChannelRegistry, LifecycleChannels, SubscriptionId};
pub use context::{bind, bind_with, Context, ContextGuard};
pub use crate::core::errors::{ClientError, HookError};
pub use crate::core::types::{Headers, HookResult, MessageId, ModuleExports, SpanHandle};
pub use hooks::{Hook, HookRegistry, ModuleLoad};
pub use integrations::SpanTable;
pub use lifecycle::{ErrorInfo, Event, Payload};
