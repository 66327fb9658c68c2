//! `Ticker` channel (spec.md §4.5): emits at a fixed period until
//! cancelled.
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::errors::ForceError;

use super::{Channel, Event, EventBus, EventKind, DEFAULT_CHANNEL_CAPACITY};

pub struct Ticker {
    period: Duration,
    bus: EventBus,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            bus: EventBus::new(DEFAULT_CHANNEL_CAPACITY),
        }
    }
}

#[async_trait]
impl Channel for Ticker {
    async fn start(&self, cancellation: CancellationToken) -> Result<(), ForceError> {
        if self.period.is_zero() {
            return Err(ForceError::bad_parameter("ticker period must be positive"));
        }
        // Fire-and-forget production task; `start` must return promptly
        // (spec.md §4.5).
        let bus = self.bus.sender_handle();
        let period = self.period;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            let mut tick = 0u64;
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => break,
                    _ = interval.tick() => {
                        tick += 1;
                        bus.emit(Event { kind: EventKind::Tick(tick), ..Event::oneshot() });
                    }
                }
            }
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emits_repeatedly_until_cancelled() {
        let channel = Ticker::new(Duration::from_millis(5));
        let mut events = channel.subscribe();
        let cancellation = CancellationToken::new();
        channel.start(cancellation.clone()).await.unwrap();

        for _ in 0..3 {
            let event = events.recv().await.unwrap();
            assert!(matches!(event.kind, EventKind::Tick(_)));
        }
        cancellation.cancel();
    }

    #[tokio::test]
    async fn rejects_zero_period() {
        let channel = Ticker::new(Duration::ZERO);
        let result = channel.start(CancellationToken::new()).await;
        assert!(result.is_err());
    }
}
