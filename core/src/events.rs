use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Change made to the recipe table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeEvent {
    Inserted(i64),
    Updated(i64),
    Deleted(i64),
}

/// Fan-out of recipe changes to interested listeners. Closed receivers are
/// pruned on the next publish.
pub struct EventBus {
    subscribers: Vec<UnboundedSender<RecipeEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    /// Subscribe to changes, returning a receiver for events.
    pub fn subscribe(&mut self) -> UnboundedReceiver<RecipeEvent> {
        let (tx, rx) = unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Publish a change to every live subscriber.
    pub fn publish(&mut self, event: RecipeEvent) {
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
