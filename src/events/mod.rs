// src/events/mod.rs

//! Asynchronous notifications for whoever sits in front of the engine.
//!
//! Events are a closed enum, so consumers match exhaustively instead of
//! dispatching on strings. The wire names (`new_log_entry`, ...) are still
//! available through [`EventKind::name`] and [`EventKind::from_str`] for
//! transports that need them.
//!
//! Every subscriber owns an unbounded channel: a slow consumer never makes
//! the bus drop events for it, and never blocks a publisher.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use crate::types::{CommandId, ExitOutcome, GroupId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// One output line of a running command.
    NewLogEntry { id: CommandId, line: String },
    ProcessStarted { id: CommandId },
    ProcessFinished { id: CommandId, outcome: ExitOutcome },
    CommandGroupDeleted { id: GroupId },
    /// An output line matched one or more of the command's error patterns.
    CommandFailed {
        id: CommandId,
        line: String,
        patterns: Vec<String>,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::NewLogEntry { .. } => EventKind::NewLogEntry,
            Event::ProcessStarted { .. } => EventKind::ProcessStarted,
            Event::ProcessFinished { .. } => EventKind::ProcessFinished,
            Event::CommandGroupDeleted { .. } => EventKind::CommandGroupDeleted,
            Event::CommandFailed { .. } => EventKind::CommandFailed,
        }
    }

    /// The command or group id the event is about.
    pub fn subject_id(&self) -> &str {
        match self {
            Event::NewLogEntry { id, .. }
            | Event::ProcessStarted { id }
            | Event::ProcessFinished { id, .. }
            | Event::CommandGroupDeleted { id }
            | Event::CommandFailed { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewLogEntry,
    ProcessStarted,
    ProcessFinished,
    CommandGroupDeleted,
    CommandFailed,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::NewLogEntry,
        EventKind::ProcessStarted,
        EventKind::ProcessFinished,
        EventKind::CommandGroupDeleted,
        EventKind::CommandFailed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::NewLogEntry => "new_log_entry",
            EventKind::ProcessStarted => "process_started",
            EventKind::ProcessFinished => "process_finished",
            EventKind::CommandGroupDeleted => "command_group_deleted",
            EventKind::CommandFailed => "command_failed",
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        EventKind::ALL
            .into_iter()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| format!("unknown event name: {s}"))
    }
}

pub type SubscriptionId = u64;

/// Receiving end handed to a subscriber.
///
/// `recv` returns `None` once the subscription was removed with
/// [`EventBus::unsubscribe`] or [`EventBus::unsubscribe_all`].
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

#[derive(Debug)]
struct Subscriber {
    kinds: Option<HashSet<EventKind>>,
    tx: mpsc::UnboundedSender<Event>,
}

#[derive(Debug, Default)]
struct BusState {
    next_id: SubscriptionId,
    subscribers: HashMap<SubscriptionId, Subscriber>,
}

/// Cloneable publish/subscribe hub.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    state: Arc<Mutex<BusState>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every event kind.
    pub fn subscribe(&self) -> Subscription {
        self.add_subscriber(None)
    }

    /// Subscribe to the given kinds only.
    pub fn subscribe_to(&self, kinds: &[EventKind]) -> Subscription {
        self.add_subscriber(Some(kinds.iter().copied().collect()))
    }

    fn add_subscriber(&self, kinds: Option<HashSet<EventKind>>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.insert(id, Subscriber { kinds, tx });
        Subscription { id, rx }
    }

    /// Returns whether the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.state.lock().subscribers.remove(&id).is_some()
    }

    /// Drop every subscriber at once (teardown).
    pub fn unsubscribe_all(&self) {
        self.state.lock().subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Deliver `event` to every interested subscriber.
    ///
    /// Subscribers whose receiver was dropped are pruned.
    pub fn publish(&self, event: Event) {
        trace!(kind = event.kind().name(), id = event.subject_id(), "publishing event");
        let kind = event.kind();
        let mut state = self.state.lock();
        state.subscribers.retain(|_, sub| {
            if sub.kinds.as_ref().is_some_and(|k| !k.contains(&kind)) {
                return !sub.tx.is_closed();
            }
            sub.tx.send(event.clone()).is_ok()
        });
    }
}
