//! `Oneshot` channel (spec.md §4.5): emits a single event immediately
//! after start, then stays silent.
use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::errors::ForceError;

use super::{Channel, Event, EventBus, DEFAULT_CHANNEL_CAPACITY};

pub struct Oneshot {
    bus: EventBus,
}

impl Oneshot {
    pub fn new() -> Self {
        Self {
            bus: EventBus::new(DEFAULT_CHANNEL_CAPACITY),
        }
    }
}

#[async_trait]
impl Channel for Oneshot {
    async fn start(&self, _cancellation: CancellationToken) -> Result<(), ForceError> {
        self.bus.emit(Event::oneshot());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }
}
