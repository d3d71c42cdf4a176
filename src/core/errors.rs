/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hook registration and patch-application errors
///
/// These never reach the application that loaded the module: a failed patch
/// is logged and the original export surface is kept.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum HookError {
    #[error("Patch function failed for module {module}: {reason}")]
    #[diagnostic(
        code(hooks::patch_failed),
        help("The module stays unpatched; tracing is lost for it, nothing else breaks.")
    )]
    PatchFailed { module: String, reason: String },

    #[error("Unexpected export surface for module {0}")]
    #[diagnostic(
        code(hooks::unexpected_surface),
        help("The host delivered a surface the patch function cannot downcast. Check the registered integration against what the host loads.")
    )]
    UnexpectedSurface(String),

    #[error("Invalid version range {0}")]
    #[diagnostic(
        code(hooks::invalid_range),
        help("Version ranges must be valid semver requirements, e.g. \">=1.4\".")
    )]
    InvalidRange(String),
}

/// Failures of the wrapped third-party clients
///
/// The instrumentation layer publishes these on the error channel and
/// re-surfaces them unchanged to the original caller; it never swallows or
/// alters an operation's outcome.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ClientError {
    #[error("Broker rejected the request: {0}")]
    #[diagnostic(code(client::broker))]
    Broker(String),

    #[error("Operation timed out after {0}ms")]
    #[diagnostic(code(client::timeout))]
    Timeout(u64),

    #[error("Message handler failed: {0}")]
    #[diagnostic(code(client::handler))]
    Handler(String),

    #[error("Connection lost: {0}")]
    #[diagnostic(code(client::connection))]
    Connection(String),
}
