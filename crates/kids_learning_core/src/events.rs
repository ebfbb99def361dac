//! crates/kids_learning_core/src/events.rs
//!
//! In-page events decoupling lesson-card clicks from quiz rendering.

use crate::domain::Lesson;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    OpenQuiz { lesson: Lesson },
}

impl PageEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PageEvent::OpenQuiz { .. } => "open-quiz",
        }
    }
}

#[derive(Clone)]
pub struct PageEvents {
    sender: broadcast::Sender<PageEvent>,
}

impl PageEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self { sender }
    }

    /// Delivers the event to every current listener and returns how many there were.
    /// An event nobody listens for is dropped.
    pub fn publish(&self, event: PageEvent) -> usize {
        tracing::debug!(event = event.name(), "page event");
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.sender.subscribe()
    }
}

impl Default for PageEvents {
    fn default() -> Self {
        Self::new()
    }
}
