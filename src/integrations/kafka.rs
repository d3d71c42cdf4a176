/*!
 * Kafka Client Instrumentation
 * Producer send and consumer dispatch lifecycle events for kafkajs-style
 * clients
 *
 * Decorators around the client traits stand in for runtime method
 * patching: the hook's patch function wraps the loaded client surface and
 * the host binds to the decorated one. Everything short-circuits to the
 * unwrapped client when nobody subscribed to the relevant start channel.
 */

use crate::bus::{ChannelRegistry, LifecycleChannels};
use crate::core::errors::{ClientError, HookError};
use crate::core::types::{Headers, HookResult, ModuleExports};
use crate::hooks::{Hook, HookRegistry};
use crate::lifecycle::{self, Payload};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Lifecycle namespace for producer sends
pub const PRODUCE_NAMESPACE: &str = "apm:kafka:produce";
/// Lifecycle namespace for consumer message dispatch
pub const CONSUME_NAMESPACE: &str = "apm:kafka:consume";

/// Hooked module name
pub const MODULE_NAME: &str = "kafkajs";
const SUPPORTED_VERSIONS: &[&str] = &[">=1.4"];

/// One record in a producer batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerRecord {
    pub key: Option<String>,
    pub value: Vec<u8>,
    /// Absent until the instrumentation guarantees a map for trace-context
    /// injection downstream
    pub headers: Option<Headers>,
}

/// A batch of records bound for one topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProduceBatch {
    pub topic: String,
    pub messages: Vec<ProducerRecord>,
}

/// A message as handed to a consumer handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumedMessage {
    pub key: Option<String>,
    pub value: Vec<u8>,
    pub offset: i64,
    pub headers: Headers,
}

/// One delivery to a consumer handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub topic: String,
    pub partition: i32,
    pub message: ConsumedMessage,
}

pub type SendFuture = BoxFuture<'static, Result<(), ClientError>>;
pub type MessageHandler = Arc<dyn Fn(Delivery) -> Result<(), ClientError> + Send + Sync>;

/// Producer surface of the wrapped client
pub trait Producer: Send + Sync {
    fn send(&self, batch: ProduceBatch) -> SendFuture;
}

/// Consumer surface of the wrapped client
pub trait Consumer: Send + Sync {
    /// Run the consume loop, dispatching each message to `handler`
    fn run(&self, handler: MessageHandler) -> Result<(), ClientError>;
}

/// The client factory the host loads and binds to
pub trait KafkaClient: Send + Sync {
    fn producer(&self) -> Arc<dyn Producer>;
    fn consumer(&self) -> Arc<dyn Consumer>;
}

/// Export surface delivered on a kafkajs load
pub struct KafkaExports {
    pub client: Arc<dyn KafkaClient>,
}

/// Register the kafka hook: decorates the loaded client so producers and
/// consumers publish lifecycle events
pub fn register(hooks: &HookRegistry, channels: &ChannelRegistry) -> HookResult<()> {
    let produce = LifecycleChannels::new(channels, PRODUCE_NAMESPACE);
    let consume = LifecycleChannels::new(channels, CONSUME_NAMESPACE);

    hooks.register(
        Hook::new(MODULE_NAME).with_versions(SUPPORTED_VERSIONS),
        Box::new(move |exports| {
            let surface = exports
                .downcast::<KafkaExports>()
                .map_err(|_| HookError::UnexpectedSurface(MODULE_NAME.to_string()))?;
            let client = Arc::new(TracedKafkaClient {
                inner: Arc::clone(&surface.client),
                produce: produce.clone(),
                consume: consume.clone(),
            });
            let patched: ModuleExports = Arc::new(KafkaExports { client });
            Ok(patched)
        }),
    )
}

struct TracedKafkaClient {
    inner: Arc<dyn KafkaClient>,
    produce: LifecycleChannels,
    consume: LifecycleChannels,
}

impl KafkaClient for TracedKafkaClient {
    fn producer(&self) -> Arc<dyn Producer> {
        let inner = self.inner.producer();
        if !self.produce.start.has_subscribers() {
            return inner;
        }
        Arc::new(TracedProducer {
            inner,
            channels: self.produce.clone(),
        })
    }

    fn consumer(&self) -> Arc<dyn Consumer> {
        let inner = self.inner.consumer();
        if !self.consume.start.has_subscribers() {
            return inner;
        }
        Arc::new(TracedConsumer {
            inner,
            channels: self.consume.clone(),
        })
    }
}

struct TracedProducer {
    inner: Arc<dyn Producer>,
    channels: LifecycleChannels,
}

impl Producer for TracedProducer {
    fn send(&self, mut batch: ProduceBatch) -> SendFuture {
        if !self.channels.start.has_subscribers() {
            return self.inner.send(batch);
        }

        let (_cx, _scope) = lifecycle::begin(&self.channels, Payload::Empty);

        // Guarantee a headers map on every record so a consumer-side trace
        // context can be injected by whoever subscribes.
        for record in &mut batch.messages {
            record.headers.get_or_insert_with(Headers::default);
        }
        self.channels.add.publish(Payload::ProduceBatch {
            topic: batch.topic.clone(),
            message_count: batch.messages.len(),
        });

        let inner = Arc::clone(&self.inner);
        Box::pin(lifecycle::drive_future(&self.channels, move || {
            inner.send(batch)
        }))
    }
}

struct TracedConsumer {
    inner: Arc<dyn Consumer>,
    channels: LifecycleChannels,
}

impl Consumer for TracedConsumer {
    fn run(&self, handler: MessageHandler) -> Result<(), ClientError> {
        if !self.channels.start.has_subscribers() {
            return self.inner.run(handler);
        }

        let channels = self.channels.clone();
        self.inner.run(Arc::new(move |delivery: Delivery| {
            let (_cx, _scope) = lifecycle::begin(
                &channels,
                Payload::ConsumeStart {
                    topic: delivery.topic.clone(),
                    partition: delivery.partition,
                    offset: delivery.message.offset,
                    headers: delivery.message.headers.clone(),
                },
            );
            // Handler failures are published, then re-surfaced unchanged.
            lifecycle::execute(&channels, || handler(delivery))
        }))
    }
}
