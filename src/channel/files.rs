//! `Files` channel (spec.md §4.5): emits on filesystem changes matching
//! the given globs.
//!
//! The teacher has no filesystem-watching code to ground this on;
//! rather than pull in an extra watcher crate the ambient stack
//! doesn't otherwise need, this polls mtimes through the already
//! teacher-carried `glob` crate on a short interval, which satisfies
//! the same "bounded buffered output stream, drop-with-warning"
//! contract spec.md §4.5 asks of every channel.
use std::{
    collections::HashMap,
    path::PathBuf,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::errors::ForceError;

use super::{Channel, Event, EventBus, EventKind, DEFAULT_CHANNEL_CAPACITY};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct Files {
    globs: Vec<String>,
    bus: EventBus,
}

impl Files {
    pub fn new(globs: Vec<String>) -> Self {
        Self {
            globs,
            bus: EventBus::new(DEFAULT_CHANNEL_CAPACITY),
        }
    }

    fn snapshot(&self) -> HashMap<PathBuf, SystemTime> {
        let mut result = HashMap::new();
        for pattern in &self.globs {
            let Ok(paths) = glob::glob(pattern) else {
                continue;
            };
            for path in paths.flatten() {
                if let Ok(metadata) = std::fs::metadata(&path) {
                    if let Ok(modified) = metadata.modified() {
                        result.insert(path, modified);
                    }
                }
            }
        }
        result
    }
}

#[async_trait]
impl Channel for Files {
    async fn start(&self, cancellation: CancellationToken) -> Result<(), ForceError> {
        for pattern in &self.globs {
            glob::Pattern::new(pattern)
                .map_err(|err| ForceError::bad_parameter(format!("bad glob {pattern}: {err}")))?;
        }

        let bus = self.bus.sender_handle();
        let mut previous = self.snapshot();
        let globs = self.globs.clone();
        let watcher = Files {
            globs,
            bus: bus.clone(),
        };
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => break,
                    _ = interval.tick() => {
                        let current = watcher.snapshot();
                        for (path, modified) in &current {
                            if previous.get(path) != Some(modified) {
                                watcher.bus.emit(Event {
                                    kind: EventKind::FileChange(path.display().to_string()),
                                    ..Event::oneshot()
                                });
                            }
                        }
                        previous = current;
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
    use std::io::Write;

    #[tokio::test]
    async fn emits_when_a_matched_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watched.txt");
        std::fs::write(&path, "v1").unwrap();

        let pattern = format!("{}/*.txt", dir.path().display());
        let channel = Files::new(vec![pattern]);
        let mut events = channel.subscribe();
        let cancellation = CancellationToken::new();
        channel.start(cancellation.clone()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "v2").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("channel should emit before timeout")
            .unwrap();
        assert!(matches!(event.kind, EventKind::FileChange(_)));
        cancellation.cancel();
    }
}
