//! `Duplicate` channel (spec.md §4.5): fans one input channel into two
//! downstreams with independent back-pressure (each downstream is a
//! fresh broadcast subscription, so a slow reader on one side cannot
//! stall the other).
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, OnceCell};
use tokio_util::sync::CancellationToken;

use crate::errors::ForceError;

use super::{Channel, Event, EventBus, DEFAULT_CHANNEL_CAPACITY};

pub struct Duplicate {
    source: Arc<dyn Channel>,
    left: EventBus,
    right: EventBus,
    // Both `DuplicateSide` handles call through to this `start`
    // independently; the guard makes sure the upstream channel is
    // actually started, and the forwarding task actually spawned, once.
    started: OnceCell<()>,
}

impl Duplicate {
    pub fn new(source: Arc<dyn Channel>) -> Self {
        Self {
            source,
            left: EventBus::new(DEFAULT_CHANNEL_CAPACITY),
            right: EventBus::new(DEFAULT_CHANNEL_CAPACITY),
            started: OnceCell::new(),
        }
    }

    /// The second downstream; `subscribe`/the [`Channel`] impl only
    /// exposes the first, since a single script identifier binds to
    /// one [`Channel`] value. Callers construct one `Duplicate` and
    /// take both `this_side`/`other_side` handles off of it (see
    /// `builtins::DuplicateAction`) rather than building a second
    /// `Duplicate` around the same source, which would start the
    /// source's production twice.
    pub fn other_side(self: &Arc<Self>) -> Arc<DuplicateSide> {
        Arc::new(DuplicateSide {
            parent: self.clone(),
            left: false,
        })
    }

    pub fn this_side(self: &Arc<Self>) -> Arc<DuplicateSide> {
        Arc::new(DuplicateSide {
            parent: self.clone(),
            left: true,
        })
    }
}

#[async_trait]
impl Channel for Duplicate {
    async fn start(&self, cancellation: CancellationToken) -> Result<(), ForceError> {
        self.started
            .get_or_try_init(|| async {
                // Subscribe before starting: a source channel may emit
                // synchronously from within `start` (e.g. `Oneshot`).
                let mut upstream = self.source.subscribe();
                self.source.start(cancellation.clone()).await?;
                let left = self.left.sender_handle();
                let right = self.right.sender_handle();
                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            _ = cancellation.cancelled() => break,
                            event = upstream.recv() => {
                                match event {
                                    Ok(event) => {
                                        left.emit(event.clone());
                                        right.emit(event);
                                    }
                                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                        log::warn!("duplicate channel lagged, dropped {skipped} events");
                                    }
                                    Err(broadcast::error::RecvError::Closed) => break,
                                }
                            }
                        }
                    }
                });
                Ok::<(), ForceError>(())
            })
            .await?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.left.subscribe()
    }
}

/// A handle to one side of a [`Duplicate`] fan-out, itself a [`Channel`].
pub struct DuplicateSide {
    parent: Arc<Duplicate>,
    left: bool,
}

#[async_trait]
impl Channel for DuplicateSide {
    async fn start(&self, cancellation: CancellationToken) -> Result<(), ForceError> {
        self.parent.start(cancellation).await
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        if self.left {
            self.parent.left.subscribe()
        } else {
            self.parent.right.subscribe()
        }
    }
}
