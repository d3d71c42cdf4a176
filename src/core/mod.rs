/*!
 * Core Module
 * Shared types and error taxonomy
 */

pub mod errors;
pub mod types;

pub use errors::{ClientError, HookError};
pub use types::{Headers, HookResult, MessageId, ModuleExports, SpanHandle};
