//! Progress events for publish runs
//!
//! An in-process broadcast bus. The orchestrator emits events as each
//! account branch moves along; dashboards, loggers or request handlers
//! subscribe. Emitting never blocks: with no subscribers the event is
//! dropped, and a lagging subscriber loses its oldest events.
//!
//! ```no_run
//! use libsocialcast::service::events::{Event, EventBus};
//!
//! # async fn example() {
//! let bus = EventBus::new(100);
//! let mut receiver = bus.subscribe();
//!
//! bus.emit(Event::PublishStarted {
//!     post_id: "abc123".to_string(),
//!     accounts: vec!["acc-1".to_string()],
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("{:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{AccountOutcome, PostStatus};

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` is the number of buffered events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Where an account branch currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStage {
    CheckingQuota,
    WaitingForRateLimit,
    Publishing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The post was marked publishing and branches are about to start
    PublishStarted {
        post_id: String,
        accounts: Vec<String>,
    },

    AccountProgress {
        post_id: String,
        account_id: String,
        platform: String,
        stage: PublishStage,
    },

    /// One account branch finished, successfully or not
    AccountSettled {
        post_id: String,
        outcome: AccountOutcome,
    },

    /// All branches settled and results were persisted
    PublishCompleted {
        post_id: String,
        status: PostStatus,
        published: usize,
        failed: usize,
    },
}

impl Event {
    pub fn post_id(&self) -> &str {
        match self {
            Event::PublishStarted { post_id, .. }
            | Event::AccountProgress { post_id, .. }
            | Event::AccountSettled { post_id, .. }
            | Event::PublishCompleted { post_id, .. } => post_id,
        }
    }
}
