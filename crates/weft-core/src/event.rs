use crate::types::EngineEvent;

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: EngineEvent) {
        // No receivers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunId;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::default();
        bus.publish(EngineEvent::RunCancelled {
            run_id: RunId::new(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let run_id = RunId::from_string("r1");

        bus.publish(EngineEvent::NodeStarted {
            run_id: run_id.clone(),
            node_id: "a".into(),
        });
        bus.publish(EngineEvent::RunCompleted {
            run_id: run_id.clone(),
            elapsed_ms: 5,
        });

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, EngineEvent::NodeStarted { ref node_id, .. } if node_id == "a"));
        let second = rx.recv().await.unwrap();
        assert!(second.is_terminal());
        assert_eq!(second.run_id(), &run_id);
    }
}
