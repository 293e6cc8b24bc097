//! Fire-and-forget domain notifications.
//!
//! Listeners registered on the [`EventBus`] run synchronously on the emitting
//! thread; subscribers receive a copy through a broadcast channel.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::types::{PrincipalId, ProjectId, PublishHistoryId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RepositoryEvent {
    ResourceCreated {
        root_path: String,
        project_id: ProjectId,
    },
    ResourceModified {
        root_path: String,
        project_id: ProjectId,
    },
    ResourceDeleted {
        root_path: String,
        project_id: ProjectId,
    },
    ResourceCopied {
        source: String,
        destination: String,
        project_id: ProjectId,
    },
    ResourceLocked {
        root_path: String,
        user_id: PrincipalId,
        project_id: ProjectId,
    },
    ResourceUnlocked {
        root_path: String,
        project_id: ProjectId,
    },
    PropertyModified {
        root_path: String,
        name: String,
    },
    ProjectModified {
        project_id: ProjectId,
    },
    ProjectPublished {
        project_id: ProjectId,
        history_id: PublishHistoryId,
        tag: i64,
    },
    /// Emitted to, and observed by, every cache layer sharing the bus.
    ClearCaches,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: RepositoryEvent);
}

pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &RepositoryEvent);
}

pub struct EventBus {
    sender: broadcast::Sender<RepositoryEvent>,
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl EventBus {
    /// Capacity bounds how many events a slow subscriber may lag behind.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            listeners: RwLock::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_default_capacity() -> Self {
        Self::new(1024)
    }

    pub fn add_listener(&self, listener: Arc<dyn EventListener>) {
        self.listeners.write().push(listener);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RepositoryEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: RepositoryEvent) {
        debug!(?event, "emitting event");
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_event(&event);
        }
        // Err only means there are no subscribers.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<RepositoryEvent>>,
    }

    impl EventListener for Recorder {
        fn on_event(&self, event: &RepositoryEvent) {
            self.seen.lock().push(event.clone());
        }
    }

    #[test]
    fn test_listeners_and_subscribers_receive_events() {
        let bus = EventBus::new(8);
        let recorder = Arc::new(Recorder::default());
        bus.add_listener(recorder.clone());
        let mut rx = bus.subscribe();

        bus.emit(RepositoryEvent::ClearCaches);

        assert_eq!(recorder.seen.lock().as_slice(), &[RepositoryEvent::ClearCaches]);
        assert_eq!(rx.try_recv().unwrap(), RepositoryEvent::ClearCaches);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::with_default_capacity();
        bus.emit(RepositoryEvent::ProjectModified {
            project_id: ProjectId::new(2),
        });
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let json = serde_json::to_value(RepositoryEvent::ResourceDeleted {
            root_path: "/a".to_string(),
            project_id: ProjectId::new(2),
        })
        .unwrap();
        assert_eq!(json["type"], "resource_deleted");
        assert_eq!(json["project_id"], 2);
    }
}
