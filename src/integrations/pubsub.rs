/*!
 * PubSub Client Instrumentation
 * Request-path and receive-path lifecycle events for google-cloud-pubsub
 * style clients
 *
 * Two independent registrations on the same module name: the main export
 * surface (request calls, subscription message emission) and the
 * lease-manager subpath (message dispense and lease release). The emit
 * wrapper treats a message emission as a completion point only when the
 * span side table holds an association for it; an unassociated message is
 * silently passed through, by policy.
 */

use crate::bus::{ChannelRegistry, LifecycleChannels};
use crate::core::errors::{ClientError, HookError};
use crate::core::types::{Headers, HookResult, MessageId, ModuleExports};
use crate::hooks::{Hook, HookRegistry};
use crate::integrations::span_table::SpanTable;
use crate::lifecycle::{self, Completion, EndGuard, Payload};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Lifecycle namespace for RPC-style request calls
pub const REQUEST_NAMESPACE: &str = "apm:pubsub:request";
/// Lifecycle namespace for the message receive path
pub const RECEIVE_NAMESPACE: &str = "apm:pubsub:receive";

/// Hooked module name
pub const MODULE_NAME: &str = "google-cloud-pubsub";
/// Subpath of the lease-manager load within the module
pub const LEASE_MANAGER_FILE: &str = "build/src/lease-manager.js";
const SUPPORTED_VERSIONS: &[&str] = &[">=1.2"];

/// Configuration of one RPC request issued by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestConfig {
    pub method: String,
}

impl RequestConfig {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
        }
    }
}

/// An in-flight message on the receive path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PubSubMessage {
    pub id: MessageId,
    pub data: Vec<u8>,
    pub attributes: Headers,
}

/// Error-first completion of one request
pub type RequestCallback = Completion<serde_json::Value, ClientError>;

/// RPC surface of the wrapped client
pub trait PubSubClient: Send + Sync {
    fn project_id(&self) -> String;
    fn request(&self, config: RequestConfig, callback: RequestCallback);
}

/// An event emitted on a subscription
#[derive(Clone)]
pub enum SubscriptionEvent {
    Message(Arc<PubSubMessage>),
    Other(String),
}

/// Event-emitter surface of the wrapped subscription
pub trait Subscription: Send + Sync {
    fn emit(&self, event: SubscriptionEvent) -> Result<(), ClientError>;
}

/// Lease-manager surface of the wrapped module's streaming receive path
pub trait LeaseManager: Send + Sync {
    /// Hand a message to a subscriber (start of its lease)
    fn dispense(&self, message: Arc<PubSubMessage>);
    /// Release one message's lease
    fn remove(&self, message: &PubSubMessage);
    /// Release all outstanding leases at once (e.g. on shutdown)
    fn clear(&self);
}

/// Export surface of the main module load
pub struct PubSubExports {
    pub client: Arc<dyn PubSubClient>,
    pub subscription: Arc<dyn Subscription>,
}

/// Export surface of the lease-manager subpath load
pub struct LeaseExports {
    pub manager: Arc<dyn LeaseManager>,
}

/// Register both pubsub hooks against the main surface and the
/// lease-manager subpath
pub fn register(
    hooks: &HookRegistry,
    channels: &ChannelRegistry,
    spans: Arc<SpanTable>,
) -> HookResult<()> {
    let request = LifecycleChannels::new(channels, REQUEST_NAMESPACE);
    let receive = LifecycleChannels::new(channels, RECEIVE_NAMESPACE);

    {
        let receive = receive.clone();
        let spans = Arc::clone(&spans);
        hooks.register(
            Hook::new(MODULE_NAME).with_versions(SUPPORTED_VERSIONS),
            Box::new(move |exports| {
                let surface = exports
                    .downcast::<PubSubExports>()
                    .map_err(|_| HookError::UnexpectedSurface(MODULE_NAME.to_string()))?;
                let patched: ModuleExports = Arc::new(PubSubExports {
                    client: Arc::new(TracedPubSubClient {
                        inner: Arc::clone(&surface.client),
                        channels: request.clone(),
                    }),
                    subscription: Arc::new(TracedSubscription {
                        inner: Arc::clone(&surface.subscription),
                        channels: receive.clone(),
                        spans: Arc::clone(&spans),
                    }),
                });
                Ok(patched)
            }),
        )?;
    }

    hooks.register(
        Hook::new(MODULE_NAME)
            .with_versions(SUPPORTED_VERSIONS)
            .with_file(LEASE_MANAGER_FILE),
        Box::new(move |exports| {
            let surface = exports
                .downcast::<LeaseExports>()
                .map_err(|_| HookError::UnexpectedSurface(MODULE_NAME.to_string()))?;
            let patched: ModuleExports = Arc::new(LeaseExports {
                manager: Arc::new(TracedLeaseManager {
                    inner: Arc::clone(&surface.manager),
                    channels: receive.clone(),
                    spans: Arc::clone(&spans),
                    outstanding: Mutex::new(ahash::HashSet::default()),
                }),
            });
            Ok(patched)
        }),
    )
}

struct TracedPubSubClient {
    inner: Arc<dyn PubSubClient>,
    channels: LifecycleChannels,
}

impl PubSubClient for TracedPubSubClient {
    fn project_id(&self) -> String {
        self.inner.project_id()
    }

    fn request(&self, config: RequestConfig, callback: RequestCallback) {
        if !self.channels.start.has_subscribers() {
            return self.inner.request(config, callback);
        }

        let (_cx, _scope) = lifecycle::begin(
            &self.channels,
            Payload::RequestStart {
                method: config.method.clone(),
                project_id: Some(self.inner.project_id()),
            },
        );
        self.channels.add.publish(Payload::RequestIssued {
            method: config.method.clone(),
        });

        let inner = Arc::clone(&self.inner);
        lifecycle::drive_callback(&self.channels, callback, move |completion| {
            inner.request(config, completion)
        });
    }
}

struct TracedSubscription {
    inner: Arc<dyn Subscription>,
    channels: LifecycleChannels,
    spans: Arc<SpanTable>,
}

impl Subscription for TracedSubscription {
    fn emit(&self, event: SubscriptionEvent) -> Result<(), ClientError> {
        let SubscriptionEvent::Message(message) = &event else {
            return self.inner.emit(event);
        };
        // Only a message somebody associated a span with is an
        // instrumented completion point; anything else passes through.
        if !self.spans.contains(message.id) {
            return self.inner.emit(event);
        }

        let _end = EndGuard::new(Arc::clone(&self.channels.end));
        let result = self.inner.emit(event);
        if let Err(err) = &result {
            self.channels.error.publish(Payload::from_failure(err));
        }
        result
    }
}

struct TracedLeaseManager {
    inner: Arc<dyn LeaseManager>,
    channels: LifecycleChannels,
    spans: Arc<SpanTable>,
    /// Dispensed, not-yet-released message ids; drained on bulk clear
    outstanding: Mutex<ahash::HashSet<MessageId>>,
}

impl LeaseManager for TracedLeaseManager {
    fn dispense(&self, message: Arc<PubSubMessage>) {
        if !self.channels.start.has_subscribers() {
            return self.inner.dispense(message);
        }
        self.outstanding.lock().insert(message.id);
        self.channels.start.publish(Payload::ReceiveStart {
            message_id: message.id,
        });
        self.inner.dispense(message);
    }

    fn remove(&self, message: &PubSubMessage) {
        self.outstanding.lock().remove(&message.id);
        self.channels.async_end.publish(Payload::ReceiveLease {
            message_id: message.id,
        });
        self.spans.evict(message.id);
        self.inner.remove(message);
    }

    fn clear(&self) {
        let drained: Vec<MessageId> = {
            let mut outstanding = self.outstanding.lock();
            outstanding.drain().collect()
        };
        // One async-end per previously dispensed, not-yet-released message.
        for message_id in drained {
            self.channels
                .async_end
                .publish(Payload::ReceiveLease { message_id });
            self.spans.evict(message_id);
        }
        self.inner.clear();
    }
}
