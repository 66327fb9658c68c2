//! Process (spec.md §4.6): binds one channel to one action under a
//! stable name, owning its own dispatcher task.
use std::sync::{Arc, Mutex, Weak};

use tokio::{sync::watch, task::JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{
    action::Action,
    channel::{Channel, Event},
    constants::PROCESS_QUEUE_CAPACITY,
    context::ExecutionContext,
    errors::ForceError,
    scope::ScopeRef,
};

pub struct Process {
    pub name: String,
    pub channel: Arc<dyn Channel>,
    pub action: Arc<dyn Action>,
    /// The scope `action` was parsed under; handed to every dispatch's
    /// `ExecutionContext` as the root of that dispatch's scope tree
    /// (spec.md §4.2, §4.6).
    pub scope: ScopeRef,
    cancellation: CancellationToken,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
    exit_code: Mutex<Option<i32>>,
    /// The [`crate::runner::Runner`] this process is registered on, set
    /// by [`crate::runner::Runner::register_process`]. Threaded into
    /// every dispatch's [`ExecutionContext`] so a script's `Load`/
    /// `Reload` call (spec.md §4.11) can reach the runner it should
    /// register a child under without every `Action` needing a runner
    /// handle in its own signature.
    owner: Mutex<Option<Weak<crate::runner::Runner>>>,
}

impl Process {
    pub fn new(
        name: impl Into<String>,
        channel: Arc<dyn Channel>,
        action: Arc<dyn Action>,
        scope: ScopeRef,
    ) -> Self {
        let (done_tx, done_rx) = watch::channel(false);
        Self {
            name: name.into(),
            channel,
            action,
            scope,
            cancellation: CancellationToken::new(),
            done_tx,
            done_rx,
            exit_code: Mutex::new(None),
            owner: Mutex::new(None),
        }
    }

    /// Records the runner this process is registered on (spec.md
    /// §4.11). Called once by `Runner::register_process`.
    pub fn set_owner(&self, runner: Weak<crate::runner::Runner>) {
        *self.owner.lock().unwrap() = Some(runner);
    }

    /// Starts this process's channel and its dispatcher task (spec.md
    /// §4.6). `runner_cancellation` is the parent cancellation token;
    /// closing the Runner cancels this process too.
    pub async fn start(self: &Arc<Self>, runner_cancellation: CancellationToken) -> Result<(), ForceError> {
        // Subscribe before starting: a channel may emit synchronously
        // from within `start` (e.g. `Oneshot`), and a broadcast send
        // only reaches receivers that already exist.
        let mut events = self.channel.subscribe();
        self.channel.start(self.cancellation.clone()).await?;
        let process = self.clone();
        let runner_cancellation = runner_cancellation.clone();

        tokio::spawn(async move {
            let (tx, mut rx) = tokio::sync::mpsc::channel::<Event>(PROCESS_QUEUE_CAPACITY);
            let mut in_flight = JoinSet::new();

            loop {
                tokio::select! {
                    biased;
                    _ = runner_cancellation.cancelled() => break,
                    _ = process.cancellation.cancelled() => break,
                    event = events.recv() => {
                        match event {
                            Ok(event) => {
                                if event.is_exit() {
                                    *process.exit_code.lock().unwrap() = Some(event.exit_code().unwrap_or(0));
                                    process.cancellation.cancel();
                                    break;
                                }
                                // Non-blocking forward into the per-process
                                // buffer; drop with warning on overflow
                                // (spec.md §5).
                                if tx.try_send(event).is_err() {
                                    log::warn!(
                                        "process {} event buffer full, dropping event",
                                        process.name
                                    );
                                }
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                                log::warn!(
                                    "process {} lagged on its channel, dropped {skipped} events",
                                    process.name
                                );
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    Some(event) = rx.recv() => {
                        // Per-event goroutine: spawned detached from the
                        // dispatcher's perspective (errors are logged, not
                        // propagated, spec.md §4.6), but tracked in
                        // `in_flight` so the dispatcher can drain it before
                        // signalling `done` (spec.md §4.6 step 2, §8
                        // property 8).
                        let process = process.clone();
                        in_flight.spawn(async move { process.dispatch(event).await });
                    }
                    Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                }
            }

            while in_flight.join_next().await.is_some() {}

            let _ = process.done_tx.send(true);
        });

        Ok(())
    }

    async fn dispatch(self: Arc<Self>, event: Event) {
        let mut ctx = ExecutionContext::new(&self.name, event, &self.cancellation, self.scope.clone());
        if let Some(owner) = self.owner.lock().unwrap().clone() {
            ctx = ctx.with_runner(owner);
        }
        let result = self.action.eval(&ctx, &self.scope).await;
        if let Err(err) = &result {
            ctx.logger.error(&format!("handler failed: {err}"));
        }
        if let Err(err) = ctx.close().await {
            ctx.logger.error(&format!("closers failed: {err}"));
        }
    }

    /// Cancels this process's own sub-context (spec.md §4.6 step 2).
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Stops this process as if its channel had delivered an `ExitEvent`
    /// carrying `code` (spec.md §4.6 step 2). The Runner calls this to
    /// propagate a runner-wide exit signal (e.g. a caught SIGINT) to
    /// every process, independent of what each process's own channel
    /// produces.
    pub fn signal_exit(&self, code: Option<i32>) {
        if let Some(code) = code {
            *self.exit_code.lock().unwrap() = Some(code);
        }
        self.cancellation.cancel();
    }

    /// Non-blocking check of whether the dispatcher has returned
    /// (spec.md §4.7 "each tick checks remaining process count").
    pub fn is_done(&self) -> bool {
        *self.done_rx.borrow()
    }

    /// The exit code carried by the `ExitEvent` that stopped this
    /// process, if any (spec.md §6).
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.lock().unwrap()
    }

    /// Resolves once the dispatcher task has returned, including every
    /// in-flight per-event handler it spawned (spec.md §4.6, §4.7
    /// reload waits on this before swapping a child runner in).
    pub async fn done(&self) {
        let mut rx = self.done_rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.wait_for(|done| *done).await;
    }
}
