//! Channel Model (spec.md §4.5): asynchronous event sources with a
//! start/stop lifecycle bound to the Runner's context.
use std::{sync::Arc, time::SystemTime};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{context::ValueBag, errors::ForceError};

pub mod duplicate;
pub mod files;
pub mod oneshot;
pub mod ticker;

/// An event emitted by a [`Channel`]. `metadata` feeds
/// [`Event::add_metadata`], which plugin-registered event kinds use to
/// inject fields into the per-event logger (spec.md §4.9).
#[derive(Clone)]
pub struct Event {
    pub created: SystemTime,
    pub kind: EventKind,
    pub metadata: Vec<(String, String)>,
}

#[derive(Clone)]
pub enum EventKind {
    Oneshot,
    Tick(u64),
    FileChange(String),
    /// Signals orderly termination of the Runner, optionally carrying
    /// an exit code the runner surfaces (spec.md §6).
    Exit(Option<i32>),
    Custom(String),
}

impl Event {
    pub fn oneshot() -> Self {
        Self {
            created: SystemTime::now(),
            kind: EventKind::Oneshot,
            metadata: Vec::new(),
        }
    }

    pub fn exit(code: Option<i32>) -> Self {
        Self {
            created: SystemTime::now(),
            kind: EventKind::Exit(code),
            metadata: Vec::new(),
        }
    }

    pub fn is_exit(&self) -> bool {
        matches!(self.kind, EventKind::Exit(_))
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.kind {
            EventKind::Exit(code) => code,
            _ => None,
        }
    }

    /// Injects this event's metadata fields into a fresh
    /// [`ExecutionContext`](crate::context::ExecutionContext)'s logger
    /// (spec.md §4.9 `AddMetadata`).
    pub fn add_metadata(&self, bag: &ValueBag) {
        for (key, value) in &self.metadata {
            bag.set(key.clone(), value.clone());
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }
}

/// Event source contract (spec.md §4.5). External channels (VCS
/// pollers, container build watchers, …) implement the same trait;
/// the core only guarantees ordered delivery, not content filtering
/// (spec.md §9 open question iii).
#[async_trait]
pub trait Channel: Send + Sync {
    /// Start background production. Must return promptly; production
    /// happens in a spawned task that sends into the channel returned
    /// by [`Channel::events`].
    async fn start(&self, cancellation: CancellationToken) -> Result<(), ForceError>;

    /// A fresh receiver for this channel's event stream, in emission
    /// order. Each call subscribes an independent receiver so multiple
    /// processes (and `Duplicate`) can watch the same channel.
    fn subscribe(&self) -> broadcast::Receiver<Event>;

    /// `None` means "never terminates" (spec.md §4.5); the fan-in
    /// reader must then rely on Runner cancellation alone to stop
    /// reading (spec.md §9 open question ii).
    fn done(&self) -> Option<CancellationToken> {
        None
    }
}

/// Bounded buffer size new channel implementations default to for
/// their internal broadcast, matching the "plugin-defined" back
/// pressure note in spec.md §5.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Small helper used by every built-in channel: owns the broadcast
/// sender so `subscribe()` is trivial, and exposes an mpsc-style
/// `emit` for the background production task.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // A broadcast send only fails when there are zero receivers;
        // that's an acceptable drop, matching the fan-out "drop with
        // warning" policy (spec.md §5).
        if self.sender.send(event).is_err() {
            log::warn!("channel has no subscribers yet, dropping event");
        }
    }

    /// A clone of this bus, for moving into a spawned production task
    /// while the channel itself keeps one for `subscribe()`.
    pub fn sender_handle(&self) -> EventBus {
        self.clone()
    }
}

pub type SharedChannel = Arc<dyn Channel>;
