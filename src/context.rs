//! Execution Context (spec.md §4.8): per-event scope carrying id,
//! event, process, logger, cancellation, and a value bag; supports
//! scoped resource closers run in LIFO order on [`ExecutionContext::close`].
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, Weak},
};

use futures::future::BoxFuture;
use log::Level;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::{channel::Event, errors::ForceError, scope::ScopeRef};

/// Closure run when the owning [`ExecutionContext`] closes. Boxed so
/// `Defer` actions and plugin resource acquisitions can register
/// arbitrary teardown work (spec.md §4.4 `Defer`, §4.8 `AddCloser`). Takes
/// the closing context by reference since a deferred action must itself
/// be `eval`'d against an `&ExecutionContext`.
pub type Closer =
    Box<dyn for<'a> FnOnce(&'a ExecutionContext) -> BoxFuture<'a, Result<(), ForceError>> + Send>;

/// Thread-safe key/value bag carried by an [`ExecutionContext`]; this
/// is the "runtime scope" role spec.md §4.2 splits out from the
/// lexical [`crate::scope::Scope`] (SetValue/Value like a context bag).
#[derive(Clone, Default)]
pub struct ValueBag(Arc<Mutex<HashMap<String, String>>>);

impl ValueBag {
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.0.lock().unwrap().insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.0.lock().unwrap().get(key).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.0.lock().unwrap().clone()
    }
}

/// A process-scoped logger, keyed by process name and run id, with
/// event-derived fields merged in (spec.md §6 Logging, §4.9 `AddMetadata`).
#[derive(Clone)]
pub struct ContextLogger {
    pub process_name: String,
    pub run_id: String,
    pub fields: ValueBag,
}

impl ContextLogger {
    fn log(&self, level: Level, message: &str) {
        let mut extra = self
            .fields
            .snapshot()
            .into_iter()
            .map(|(k, v)| format!(" {k}={v}"))
            .collect::<Vec<_>>();
        extra.sort();
        log::log!(
            level,
            "process={} run={}{} {message}",
            self.process_name,
            self.run_id,
            extra.concat()
        );
    }

    pub fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }
}

/// Per-event scope (spec.md §4.8). Created fresh for every dispatched
/// event; `close` runs registered closers in reverse order, aggregating
/// any errors (spec.md §8 property 10, §4.4 `Defer`).
pub struct ExecutionContext {
    pub id: String,
    pub event: Event,
    pub process_name: String,
    pub logger: ContextLogger,
    pub cancellation: CancellationToken,
    pub values: ValueBag,
    /// The scope the dispatched action graph was parsed under (the
    /// process's global/root scope), handed to the top-level `eval`
    /// call. Per-block and per-call scoping below that point is
    /// threaded explicitly through `Action::eval`'s `scope` parameter,
    /// not stored here (see `action` module docs).
    pub root_scope: ScopeRef,
    /// The Runner this dispatch belongs to, if any (a bare foreground
    /// `Engine::run` has none). Lets `Load`/`Reload` (spec.md §4.11)
    /// register a child runner without every `Action` needing a Runner
    /// handle threaded through its signature. `Weak` since the Runner
    /// owns the Process that owns this context's dispatcher.
    pub runner: Option<Weak<crate::runner::Runner>>,
    closers: Mutex<Vec<Closer>>,
}

impl ExecutionContext {
    pub fn new(
        process_name: &str,
        event: Event,
        parent: &CancellationToken,
        root_scope: ScopeRef,
    ) -> Self {
        let id = random_id();
        let fields = ValueBag::default();
        event.add_metadata(&fields);
        Self {
            id: id.clone(),
            event,
            process_name: process_name.to_owned(),
            logger: ContextLogger {
                process_name: process_name.to_owned(),
                run_id: id,
                fields,
            },
            cancellation: parent.child_token(),
            values: ValueBag::default(),
            root_scope,
            runner: None,
            closers: Mutex::new(Vec::new()),
        }
    }

    /// Attaches the owning Runner (spec.md §4.11 `Load`/`Reload` need it
    /// to register a child).
    pub fn with_runner(mut self, runner: Weak<crate::runner::Runner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Register a closer to run when this context closes (spec.md §4.8).
    /// `Defer` actions use this to schedule LIFO-ordered teardown.
    pub fn add_closer(&self, closer: Closer) {
        self.closers.lock().unwrap().push(closer);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Run every registered closer in LIFO order, even if earlier ones
    /// failed, aggregating errors (spec.md §4.8, §8 property 6/10).
    pub async fn close(&self) -> Result<(), ForceError> {
        let closers = std::mem::take(&mut *self.closers.lock().unwrap());
        let mut errors = Vec::new();
        for closer in closers.into_iter().rev() {
            if let Err(err) = closer(self).await {
                errors.push(err);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ForceError::aggregate(errors))
        }
    }
}

/// Short random hex id (spec.md §4.8), grounded on the same `rand`
/// crate the ambient stack already pulls in for this purpose.
pub fn random_id() -> String {
    let mut rng = rand::thread_rng();
    (0..8).map(|_| format!("{:x}", rng.gen_range(0..16))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{channel::Event, scope::ScopeRef};

    #[tokio::test]
    async fn closers_run_in_lifo_order_even_on_error() {
        let ctx = ExecutionContext::new(
            "p",
            Event::oneshot(),
            &CancellationToken::new(),
            ScopeRef::root(),
        );
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = order.clone();
        ctx.add_closer(Box::new(move |_ctx| {
            Box::pin(async move {
                o1.lock().unwrap().push(1);
                Ok(())
            })
        }));
        let o2 = order.clone();
        ctx.add_closer(Box::new(move |_ctx| {
            Box::pin(async move {
                o2.lock().unwrap().push(2);
                Err(ForceError::from("boom"))
            })
        }));
        let o3 = order.clone();
        ctx.add_closer(Box::new(move |_ctx| {
            Box::pin(async move {
                o3.lock().unwrap().push(3);
                Ok(())
            })
        }));

        let result = ctx.close().await;
        assert!(result.is_err());
        assert_eq!(*order.lock().unwrap(), vec![3, 2, 1]);
    }
}
