/*!
 * Shared Test Helpers
 * Event recorder attached to a lifecycle channel bundle
 */
#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use tracetap::{Event, LifecycleChannels};

/// Records every event published on the five channels of one namespace,
/// tagged with the channel kind, in publish order
#[derive(Clone)]
pub struct Recorder {
    log: Arc<Mutex<Vec<(String, Event)>>>,
}

impl Recorder {
    pub fn attach(channels: &LifecycleChannels) -> Self {
        let log = Arc::new(Mutex::new(Vec::new()));
        for (tag, channel) in [
            ("start", &channels.start),
            ("add", &channels.add),
            ("error", &channels.error),
            ("async-end", &channels.async_end),
            ("end", &channels.end),
        ] {
            let log = Arc::clone(&log);
            channel.subscribe(move |event| log.lock().push((tag.to_string(), event.clone())));
        }
        Self { log }
    }

    /// Channel kinds in publish order
    pub fn tags(&self) -> Vec<String> {
        self.log.lock().iter().map(|(tag, _)| tag.clone()).collect()
    }

    /// Everything recorded so far
    pub fn events(&self) -> Vec<(String, Event)> {
        self.log.lock().clone()
    }

    /// Events published on one channel kind
    pub fn on(&self, tag: &str) -> Vec<Event> {
        self.log
            .lock()
            .iter()
            .filter(|(t, _)| t == tag)
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub fn count(&self, tag: &str) -> usize {
        self.log.lock().iter().filter(|(t, _)| t == tag).count()
    }

    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }
}
