//! Domain event system: decoupled observation of agent episodes.
//!
//! The loop publishes events as an episode progresses. Front-ends subscribe
//! to render streamed text, plan progress and tool activity without the loop
//! knowing who is listening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use crate::directive::{PlanStep, ToolKind};

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// An episode began for the given objective
    EpisodeStarted {
        session_id: String,
        objective: String,
        mode: String,
        timestamp: DateTime<Utc>,
    },

    /// A model invocation is about to be issued
    TurnStarted {
        session_id: String,
        turn: u32,
        timestamp: DateTime<Utc>,
    },

    /// A streamed text delta arrived
    ChunkReceived {
        session_id: String,
        turn: u32,
        delta: String,
    },

    /// Plan steps appeared or changed status
    PlanUpdated {
        session_id: String,
        steps: Vec<PlanStep>,
    },

    /// A proposed file change was staged
    FileStaged {
        session_id: String,
        path: String,
        bytes: usize,
    },

    /// A tool directive was dispatched
    ToolExecuted {
        session_id: String,
        kind: ToolKind,
        description: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The loop re-prompted a model that produced nothing actionable
    CorrectionInjected {
        session_id: String,
        turn: u32,
    },

    /// The episode reached a terminal state
    EpisodeFinished {
        session_id: String,
        outcome: String,
        turns: u32,
        files_changed: usize,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::FileStaged {
            session_id: "s1".into(),
            path: "src/App.tsx".into(),
            bytes: 42,
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::FileStaged { path, bytes, .. } => {
                assert_eq!(path, "src/App.tsx");
                assert_eq!(*bytes, 42);
            }
            _ => panic!("Expected FileStaged event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::CorrectionInjected {
            session_id: "s1".into(),
            turn: 1,
        });
    }
}
