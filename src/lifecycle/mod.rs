/*!
 * Operation Lifecycle
 * Event payloads and the driver that publishes the five-event protocol
 * around every instrumented operation
 */

pub mod driver;
pub mod events;

pub use driver::{begin, drive_callback, drive_future, execute, Completion, EndGuard, InstrumentedFuture};
pub use events::{ErrorInfo, Event, Payload};
