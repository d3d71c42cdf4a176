/*!
 * Core Types
 * Common types used across the instrumentation engine
 */

use std::any::Any;
use std::sync::Arc;

/// Identity of an in-flight message on the receive path
pub type MessageId = u64;

/// Opaque reference to an externally-created span
///
/// The engine never looks inside; consumers downcast to their own span type.
pub type SpanHandle = Arc<dyn Any + Send + Sync>;

/// Type-erased export surface of an instrumented module
///
/// Patch functions downcast to the integration's concrete export struct and
/// return a decorated surface. The hook registry keeps its own handle while
/// a patch runs, so a failed patch always leaves the original in place.
pub type ModuleExports = Arc<dyn Any + Send + Sync>;

/// Message headers map (carrier for trace-context propagation)
pub type Headers = ahash::HashMap<String, String>;

/// Common result type for hook operations
pub type HookResult<T> = Result<T, super::errors::HookError>;
