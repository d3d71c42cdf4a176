/*!
 * Lifecycle Driver Tests
 * Event ordering and context attribution across deferred completions
 */

mod common;

use common::Recorder;
use futures::future::BoxFuture;
use pretty_assertions::assert_eq;
use tracetap::lifecycle::{self, Completion};
use tracetap::{ChannelRegistry, ClientError, Context, LifecycleChannels};

fn setup(namespace: &str) -> (ChannelRegistry, LifecycleChannels, Recorder) {
    let registry = ChannelRegistry::new();
    let channels = LifecycleChannels::new(&registry, namespace);
    let recorder = Recorder::attach(&channels);
    (registry, channels, recorder)
}

#[tokio::test]
async fn test_rejected_future_publishes_after_the_call_returned() {
    let (_registry, channels, recorder) = setup("apm:test");

    let fut = lifecycle::drive_future(&channels, || -> BoxFuture<'static, Result<(), ClientError>> {
        Box::pin(async {
            tokio::task::yield_now().await;
            Err(ClientError::Broker("leader lost".into()))
        })
    });

    // end fires at the synchronous boundary; the outcome is still pending.
    assert_eq!(recorder.tags(), ["end"]);

    let result = fut.await;
    assert_eq!(result.unwrap_err(), ClientError::Broker("leader lost".into()));
    assert_eq!(recorder.tags(), ["end", "error", "async-end"]);
}

#[tokio::test]
async fn test_resolved_future_skips_error() {
    let (_registry, channels, recorder) = setup("apm:test");

    let fut = lifecycle::drive_future(&channels, || -> BoxFuture<'static, Result<u32, ClientError>> {
        Box::pin(async {
            tokio::task::yield_now().await;
            Ok(99)
        })
    });

    assert_eq!(fut.await.unwrap(), 99);
    assert_eq!(recorder.tags(), ["end", "async-end"]);
    assert_eq!(recorder.count("error"), 0);
}

#[tokio::test]
async fn test_deferred_completion_restores_the_operation_context() {
    let (_registry, channels, recorder) = setup("apm:test");

    let operation_cx = Context::new();
    let fut = {
        let _scope = operation_cx.enter();
        channels.start.publish(tracetap::Payload::Empty);
        lifecycle::drive_future(&channels, || -> BoxFuture<'static, Result<(), ClientError>> {
            Box::pin(async {
                tokio::task::yield_now().await;
                Ok(())
            })
        })
    };

    // A different operation is ambient while the first one settles.
    let unrelated = Context::new();
    let _unrelated_scope = unrelated.enter();
    fut.await.unwrap();

    for event in recorder.on("async-end") {
        assert_eq!(event.context, Some(operation_cx.clone()));
    }
    // The interloper's ambient context survived the settlement.
    assert_eq!(Context::current(), Some(unrelated));
}

#[test]
fn test_error_first_callback_attribution() {
    let (_registry, channels, recorder) = setup("apm:test");

    let operation_cx = Context::new();
    let continuation_saw = std::sync::Arc::new(parking_lot::Mutex::new(None));

    let mut deferred: Option<Completion<(), ClientError>> = None;
    {
        let _scope = operation_cx.enter();
        let continuation_saw = std::sync::Arc::clone(&continuation_saw);
        let continuation: Completion<(), ClientError> =
            Box::new(move |_| *continuation_saw.lock() = Context::current());
        lifecycle::drive_callback(&channels, continuation, |done| deferred = Some(done));
    }

    // The library completes much later, under a foreign context.
    let foreign = Context::new();
    let _foreign_scope = foreign.enter();
    deferred.unwrap()(Err(ClientError::Timeout(30)));

    assert_eq!(recorder.tags(), ["end", "error", "async-end"]);
    for (_, event) in recorder.events() {
        assert_eq!(event.context, Some(operation_cx.clone()));
    }
    // The user continuation also ran inside the operation context.
    assert_eq!(*continuation_saw.lock(), Some(operation_cx));
}

#[test]
fn test_sync_outcome_orders_async_end_before_end() {
    let (_registry, channels, recorder) = setup("apm:test");

    let result: Result<(), ClientError> = lifecycle::execute(&channels, || Ok(()));
    result.unwrap();
    assert_eq!(recorder.tags(), ["async-end", "end"]);
}
