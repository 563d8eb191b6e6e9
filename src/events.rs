//! In-process publish/subscribe for task lifecycle transitions.
//!
//! Delivery is synchronous and ordered: `emit` hands the event to every
//! subscriber registered before the call, in subscription order, before it
//! returns. Nothing is persisted.

use crate::snapshot::ProgressSnapshot;
use crate::task::Task;
use serde::Serialize;
use tokio::sync::mpsc;

/// A lifecycle transition observed by subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum TrackerEvent {
    TaskStart { task: Task },
    TaskUpdate { task: Task },
    TaskComplete { task: Task },
    TaskFail { task: Task },
    /// The task that was running when the interrupt arrived, if any
    Interrupt { task: Option<Task> },
    SaveProgress { snapshot: Box<ProgressSnapshot> },
}

/// Discriminant of [`TrackerEvent`], handy for filtering and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TaskStart,
    TaskUpdate,
    TaskComplete,
    TaskFail,
    Interrupt,
    SaveProgress,
}

impl TrackerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::TaskStart { .. } => EventKind::TaskStart,
            Self::TaskUpdate { .. } => EventKind::TaskUpdate,
            Self::TaskComplete { .. } => EventKind::TaskComplete,
            Self::TaskFail { .. } => EventKind::TaskFail,
            Self::Interrupt { .. } => EventKind::Interrupt,
            Self::SaveProgress { .. } => EventKind::SaveProgress,
        }
    }

    /// The task carried by the event, if it carries one.
    pub fn task(&self) -> Option<&Task> {
        match self {
            Self::TaskStart { task }
            | Self::TaskUpdate { task }
            | Self::TaskComplete { task }
            | Self::TaskFail { task } => Some(task),
            Self::Interrupt { task } => task.as_ref(),
            Self::SaveProgress { .. } => None,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&TrackerEvent) + Send>;

enum Subscriber {
    Handler(Handler),
    Channel(mpsc::UnboundedSender<TrackerEvent>),
}

impl Subscriber {
    /// Deliver `event`. Returns false when the subscriber is gone for good.
    fn deliver(&mut self, event: &TrackerEvent) -> bool {
        match self {
            Subscriber::Handler(handler) => {
                handler(event);
                true
            }
            Subscriber::Channel(tx) => tx.send(event.clone()).is_ok(),
        }
    }
}

/// Ordered, single-threaded event dispatcher.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, subscriber));
        id
    }

    pub fn subscribe(&mut self, handler: impl FnMut(&TrackerEvent) + Send + 'static) -> SubscriptionId {
        self.add(Subscriber::Handler(Box::new(handler)))
    }

    /// Forward clones of every event into an unbounded channel.
    ///
    /// The subscription is removed at the first emit after the receiver is dropped.
    pub fn channel(&mut self) -> mpsc::UnboundedReceiver<TrackerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.add(Subscriber::Channel(tx));
        rx
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn emit(&mut self, event: TrackerEvent) {
        tracing::trace!(kind = ?event.kind(), "emitting event");
        self.subscribers.retain_mut(|(id, subscriber)| {
            let alive = subscriber.deliver(&event);
            if !alive {
                tracing::debug!(subscription = id.0, "dropping closed event channel");
            }
            alive
        });
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
