/*!
 * Operation Lifecycle Driver
 * Publishes the start/add/error/async-end/end sequence around every
 * instrumented operation with correct ordering and exactly-once semantics
 *
 * Per operation instance: `start -> [add]* -> (error)? -> async-end`, and
 * `end` exactly once at the synchronous call boundary. For synchronous
 * completions `async-end` precedes `end`; for deferred completions `end`
 * has already fired when `async-end` is published.
 *
 * One entry point per calling convention: [`execute`] for direct-return
 * synchronous outcomes, [`drive_future`] for thenable outcomes, and
 * [`drive_callback`] for the error-first-callback convention.
 */

use crate::bus::{Channel, LifecycleChannels};
use crate::context::{self, Context, ContextGuard};
use crate::lifecycle::events::Payload;
use futures::future::BoxFuture;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

/// Completion callback for error-first-callback operations
pub type Completion<T, E> = Box<dyn FnOnce(Result<T, E>) + Send>;

/// Publishes `end` when dropped, on every exit path
///
/// Declared first inside a driver entry point so it fires as control
/// returns to the synchronous caller, whatever happened in between.
pub struct EndGuard {
    channel: Arc<Channel>,
}

impl EndGuard {
    pub fn new(channel: Arc<Channel>) -> Self {
        Self { channel }
    }
}

impl Drop for EndGuard {
    fn drop(&mut self) {
        self.channel.publish(Payload::Empty);
    }
}

/// Open an operation instance: enter a fresh child context and publish
/// `start` inside it
///
/// All five events of the instance then correlate by context identity.
/// The caller holds the guard for the synchronous portion of the call.
#[must_use = "dropping the guard leaves the operation context immediately"]
pub fn begin(channels: &LifecycleChannels, payload: Payload) -> (Context, ContextGuard) {
    let cx = Context::begin();
    let guard = cx.enter();
    channels.start.publish(payload);
    (cx, guard)
}

/// Direct-return convention, synchronous outcome
///
/// Publishes `error` (on `Err`) then `async-end`, then `end`, and
/// re-returns the outcome unchanged. `end` fires even if `op` panics.
pub fn execute<T, E, F>(channels: &LifecycleChannels, op: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: Display,
{
    let _end = EndGuard::new(Arc::clone(&channels.end));
    let result = op();
    if let Err(err) = &result {
        channels.error.publish(Payload::from_failure(err));
    }
    channels.async_end.publish(Payload::Empty);
    result
}

/// Direct-return convention, thenable outcome
///
/// Invokes `op` once and returns its future wrapped so that settlement
/// publishes `error` (on `Err`) then `async-end`, exactly once, inside the
/// context captured here. `end` is published as this function returns the
/// future to the synchronous caller; the driver never awaits first.
pub fn drive_future<T, E, F>(channels: &LifecycleChannels, op: F) -> InstrumentedFuture<T, E>
where
    F: FnOnce() -> BoxFuture<'static, Result<T, E>>,
    E: Display,
{
    let _end = EndGuard::new(Arc::clone(&channels.end));
    let inner = op();
    InstrumentedFuture {
        inner,
        channels: channels.clone(),
        context: Context::current(),
        settled: false,
    }
}

/// Error-first-callback convention
///
/// Supplies its own completion to `invoke`; when the underlying operation
/// eventually completes, the completion re-enters the context captured
/// here, publishes `error` (if the result is `Err`) then `async-end`, then
/// hands the result to the caller's original continuation (itself bound to
/// the same context). `end` is published as `invoke` returns.
pub fn drive_callback<T, E, F>(channels: &LifecycleChannels, continuation: Completion<T, E>, invoke: F)
where
    T: 'static,
    E: Display + 'static,
    F: FnOnce(Completion<T, E>),
{
    let _end = EndGuard::new(Arc::clone(&channels.end));
    let error_ch = Arc::clone(&channels.error);
    let async_end_ch = Arc::clone(&channels.async_end);

    let continuation = context::bind_with(continuation);
    let completion = context::bind_with(move |result: Result<T, E>| {
        if let Err(err) = &result {
            error_ch.publish(Payload::from_failure(err));
        }
        async_end_ch.publish(Payload::Empty);
        continuation(result);
    });

    invoke(Box::new(completion));
}

/// Future wrapper that restores the bound context on every poll and
/// publishes the deferred lifecycle events on settlement
pub struct InstrumentedFuture<T, E> {
    inner: BoxFuture<'static, Result<T, E>>,
    channels: LifecycleChannels,
    context: Option<Context>,
    settled: bool,
}

impl<T, E: Display> Future for InstrumentedFuture<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, task: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let _scope = context::restore(this.context.as_ref());

        match this.inner.as_mut().poll(task) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(result) => {
                if !this.settled {
                    this.settled = true;
                    if let Err(err) = &result {
                        this.channels.error.publish(Payload::from_failure(err));
                    }
                    this.channels.async_end.publish(Payload::Empty);
                }
                Poll::Ready(result)
            }
        }
    }
}
