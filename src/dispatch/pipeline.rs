use std::sync::Arc;

use tracing::debug;

use crate::{
    classify::Classifier,
    decode,
    error::EventDecodeError,
    registry::Registry,
    types::{EventContext, LogRecord, TradeEvent},
};

/// Trade event along with the context of its log.
pub type TradeRecord = EventContext<TradeEvent>;

/// Log processor - pure logic, no async.
#[derive(Debug)]
pub struct Pipeline {
    registry: Arc<Registry>,
    classifier: Classifier,
}

impl Pipeline {
    pub fn new(registry: Arc<Registry>) -> Self {
        let classifier = Classifier::new(&registry);
        Self {
            registry,
            classifier,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Decodes and classifies every matching topic of the log, in topic order.
    ///
    /// Topics not known to the registry and events that are no trade
    /// lifecycle events produce nothing.
    pub fn process_log(&self, log: &LogRecord) -> Vec<Result<TradeRecord, EventDecodeError>> {
        if self.registry.category_of(&log.address()).is_none() {
            debug!(address = %log.address(), "log of unbound contract skipped");
            return Vec::new();
        }

        decode::decode(log, &self.registry)
            .filter_map(|decoded| match decoded {
                Ok(event) => self.classifier.classify(&event).map(Ok),
                Err(e) => Some(Err(e)),
            })
            .collect()
    }
}
