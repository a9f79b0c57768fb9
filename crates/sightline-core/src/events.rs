use std::sync::Arc;

use async_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::{CandidateKinds, DocumentFacts, FileId};

/// Capacity of each subscriber queue.
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Notifications published by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    DocumentFactsChanged {
        file: FileId,
        facts: Arc<DocumentFacts>,
    },
    DocumentFactsRemoved {
        file: FileId,
    },
    LensChanged {
        file: FileId,
    },
    LensRemoved {
        file: FileId,
    },
    LensCleared,
    CandidateFileUpdated {
        file: FileId,
        kinds: CandidateKinds,
    },
}

/// Fan-out of [`EngineEvent`]s to any number of subscribers.
///
/// Queues are bounded to avoid unbounded memory growth; if a subscriber does not
/// keep up, events are dropped for that subscriber. Closed receivers are pruned
/// on the next publish.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<EngineEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        let (tx, rx) = async_channel::bounded(EVENT_QUEUE_CAPACITY);
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: EngineEvent) {
        let mut subs = self.subscribers.lock();
        subs.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(async_channel::TrySendError::Full(_)) => {
                tracing::trace!(target = "sightline.events", "subscriber queue full; dropping event");
                true
            }
            Err(async_channel::TrySendError::Closed(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
