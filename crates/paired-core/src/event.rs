//! Lifecycle events with broadcast + history.

use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::{Arc, PoisonError, RwLock},
};

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Default number of events kept for late subscribers.
const HISTORY_EVENTS: usize = 1000;

/// Lifecycle notification emitted by the runtime.
///
/// Event names are part of the observer contract and must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum LifecycleEvent {
    SessionCreated {
        session_id: String,
        project_path: PathBuf,
        client_id: String,
    },
    SessionDestroyed {
        session_id: String,
        project_path: PathBuf,
        reason: String,
    },
    ConnectionAdded {
        session_id: String,
        connection_id: String,
    },
    ConnectionClosed {
        session_id: String,
        connection_id: String,
    },
    AgentInitialized {
        agent_id: String,
    },
    AgentShutdown {
        agent_id: String,
    },
    TaskCompleted {
        agent_id: String,
        task_id: String,
        strategy: String,
        duration_ms: u64,
    },
    TaskFailed {
        agent_id: String,
        task_id: String,
        error_kind: String,
    },
    HandoffCreated {
        package_id: String,
        from_agent: String,
        to_agent: String,
    },
    HandoffAccepted {
        package_id: String,
        agent_id: String,
    },
    SyncCompleted {
        manifest_id: String,
        uploaded: usize,
        downloaded: usize,
    },
    SyncFailed {
        manifest_id: String,
        error: String,
    },
}

impl LifecycleEvent {
    /// Contract name of the event (`sessionCreated`, ...).
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SessionCreated { .. } => "sessionCreated",
            Self::SessionDestroyed { .. } => "sessionDestroyed",
            Self::ConnectionAdded { .. } => "connectionAdded",
            Self::ConnectionClosed { .. } => "connectionClosed",
            Self::AgentInitialized { .. } => "agentInitialized",
            Self::AgentShutdown { .. } => "agentShutdown",
            Self::TaskCompleted { .. } => "taskCompleted",
            Self::TaskFailed { .. } => "taskFailed",
            Self::HandoffCreated { .. } => "handoffCreated",
            Self::HandoffAccepted { .. } => "handoffAccepted",
            Self::SyncCompleted { .. } => "syncCompleted",
            Self::SyncFailed { .. } => "syncFailed",
        }
    }
}

/// Event bus with broadcast and history support.
///
/// New subscribers can replay history and then follow live events.
pub struct EventBus {
    history: RwLock<VecDeque<LifecycleEvent>>,
    capacity: usize,
    sender: broadcast::Sender<LifecycleEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a new event bus.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_EVENTS)
    }

    /// Create an event bus keeping at most `capacity` events of history.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            history: RwLock::new(VecDeque::with_capacity(capacity.min(64))),
            capacity: capacity.max(1),
            sender,
        }
    }

    /// Publish an event to live subscribers and history.
    pub fn emit(&self, event: LifecycleEvent) {
        tracing::trace!(event = event.name(), "lifecycle event");
        let _ = self.sender.send(event.clone()); // no subscribers is fine

        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        while history.len() >= self.capacity {
            history.pop_front();
        }
        history.push_back(event);
    }

    /// Get a receiver for live events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    /// Snapshot of the history.
    #[must_use]
    pub fn history(&self) -> Vec<LifecycleEvent> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Stream that yields history first, then live events.
    #[must_use]
    pub fn history_plus_stream(&self) -> futures::stream::BoxStream<'static, LifecycleEvent> {
        let (history, rx) = (self.history(), self.subscribe());

        let hist = futures::stream::iter(history);
        let live = BroadcastStream::new(rx).filter_map(|res| async move { res.ok() });

        Box::pin(hist.chain(live))
    }

    /// Forward a stream of events into this bus until it ends.
    pub fn spawn_forwarder<S>(self: Arc<Self>, stream: S) -> tokio::task::JoinHandle<()>
    where
        S: futures::Stream<Item = LifecycleEvent> + Send + 'static,
    {
        tokio::spawn(async move {
            tokio::pin!(stream);

            while let Some(event) = stream.next().await {
                self.emit(event);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_event(id: &str) -> LifecycleEvent {
        LifecycleEvent::AgentInitialized {
            agent_id: id.to_string(),
        }
    }

    #[test]
    fn test_event_wire_name() {
        let event = LifecycleEvent::SessionCreated {
            session_id: "s1".into(),
            project_path: PathBuf::from("/proj"),
            client_id: "c".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "sessionCreated");
        assert_eq!(json["session_id"], "s1");
        assert_eq!(event.name(), "sessionCreated");
    }

    #[test]
    fn test_history_is_bounded() {
        let bus = EventBus::with_capacity(3);
        for i in 0..5 {
            bus.emit(agent_event(&format!("a{i}")));
        }
        let history = bus.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0], agent_event("a2"));
        assert_eq!(history[2], agent_event("a4"));
    }

    #[tokio::test]
    async fn test_live_subscriber_receives_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(agent_event("planner"));
        assert_eq!(rx.recv().await.unwrap(), agent_event("planner"));
    }

    #[tokio::test]
    async fn test_history_plus_stream_replays_then_follows() {
        let bus = EventBus::new();
        bus.emit(agent_event("first"));
        let mut stream = bus.history_plus_stream();
        bus.emit(agent_event("second"));

        assert_eq!(stream.next().await, Some(agent_event("first")));
        assert_eq!(stream.next().await, Some(agent_event("second")));
    }

    #[tokio::test]
    async fn test_forwarder_drains_stream() {
        let bus = Arc::new(EventBus::new());
        let events = futures::stream::iter(vec![agent_event("a"), agent_event("b")]);
        Arc::clone(&bus).spawn_forwarder(events).await.unwrap();
        assert_eq!(bus.history(), vec![agent_event("a"), agent_event("b")]);
    }
}
