//! Runner (spec.md §4.7): the supervisor owning a Runner's process set,
//! plugin-populated scope, child-runner map (for `Reload`), and exit
//! sequencing.
//!
//! Fan-in/fan-out (spec.md §4.7's two named algorithms) are realized per
//! channel rather than through one additional central queue: each
//! `Process` already subscribes directly to its own bound `Channel`'s
//! broadcast bus (`process.rs::Process::start`), which gives the same
//! "one reader forwards non-blockingly into a bounded per-subscriber
//! buffer, drop-with-warning on overflow" behavior spec.md describes,
//! for free, from `tokio::sync::broadcast`. What the Runner still owns
//! on top of that is exit sequencing (§4.7 "Exit"): polling every
//! `SHUTDOWN_TICK` once any process reports an exit code, and closing
//! once none remain. See DESIGN.md.
use std::{collections::HashMap, sync::Arc, sync::Mutex};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{constants::SHUTDOWN_TICK, errors::ForceError, process::Process, scope::ScopeRef};

pub struct Runner {
    scope: ScopeRef,
    processes: Mutex<HashMap<String, Arc<Process>>>,
    children: Mutex<HashMap<String, Arc<Runner>>>,
    cancellation: CancellationToken,
    exit_code: Mutex<Option<i32>>,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

impl Runner {
    pub fn new(scope: ScopeRef) -> Arc<Self> {
        Self::with_parent_cancellation(scope, CancellationToken::new())
    }

    /// A runner whose own cancellation is a child of `parent`'s, so
    /// closing `parent` (or the whole process) closes this one too
    /// (spec.md §5 "closing the Runner cancels all subordinate
    /// contexts"). Used by the Script Loader for `Load`/`Reload`'s
    /// child runners.
    pub fn child_of(parent: &Runner, scope: ScopeRef) -> Arc<Self> {
        Self::with_parent_cancellation(scope, parent.cancellation.child_token())
    }

    fn with_parent_cancellation(scope: ScopeRef, cancellation: CancellationToken) -> Arc<Self> {
        let (done_tx, done_rx) = watch::channel(false);
        Arc::new(Self {
            scope,
            processes: Mutex::new(HashMap::new()),
            children: Mutex::new(HashMap::new()),
            cancellation,
            exit_code: Mutex::new(None),
            done_tx,
            done_rx,
        })
    }

    pub fn scope(&self) -> &ScopeRef {
        &self.scope
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Registers `process` under its name; rejects a second process
    /// under a name already present (spec.md §3 "name is a key for
    /// reload/swap").
    pub fn register_process(self: &Arc<Self>, process: Arc<Process>) -> Result<(), ForceError> {
        let mut processes = self.processes.lock().unwrap();
        if processes.contains_key(&process.name) {
            return Err(ForceError::AlreadyExists(format!(
                "process {} is already registered",
                process.name
            )));
        }
        process.set_owner(Arc::downgrade(self));
        processes.insert(process.name.clone(), process);
        Ok(())
    }

    pub fn processes(&self) -> Vec<Arc<Process>> {
        self.processes.lock().unwrap().values().cloned().collect()
    }

    /// Installs `child` under `name`, returning whatever was previously
    /// registered there (spec.md §4.11 `SwapRunner`); the caller is
    /// responsible for closing the returned runner and waiting on its
    /// `Done` (spec.md §4.7 "Reload").
    pub fn swap_child(&self, name: impl Into<String>, child: Arc<Runner>) -> Option<Arc<Runner>> {
        self.children.lock().unwrap().insert(name.into(), child)
    }

    pub fn child(&self, name: &str) -> Option<Arc<Runner>> {
        self.children.lock().unwrap().get(name).cloned()
    }

    /// Starts every registered process's channel and dispatcher, then
    /// arms the exit-sequencing watch task (spec.md §4.7).
    pub async fn start(self: &Arc<Self>) -> Result<(), ForceError> {
        let processes = self.processes();
        for process in &processes {
            process.start(self.cancellation.clone()).await?;
        }
        self.spawn_exit_watch();
        Ok(())
    }

    /// Propagates a runner-wide exit to every currently registered
    /// process (spec.md §4.6 step 2 applied to the whole process set) —
    /// used by the CLI front-end on a caught shutdown signal, and by
    /// tests driving scenario S5/S8.
    pub fn signal_exit(&self, code: Option<i32>) {
        for process in self.processes.lock().unwrap().values() {
            process.signal_exit(code);
        }
    }

    fn spawn_exit_watch(self: &Arc<Self>) {
        let runner = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SHUTDOWN_TICK);
            let mut exit_observed = false;
            loop {
                tokio::select! {
                    _ = runner.cancellation.cancelled() => break,
                    _ = interval.tick() => {
                        let processes = runner.processes();
                        if processes.is_empty() {
                            continue;
                        }

                        // Last-seen-wins across concurrently observed
                        // ExitEvents (spec.md §9 open question i): every
                        // tick re-reads every process's current exit
                        // code, so the latest non-empty reading always
                        // overwrites the runner's recorded code.
                        for process in &processes {
                            if let Some(code) = process.exit_code() {
                                *runner.exit_code.lock().unwrap() = Some(code);
                                exit_observed = true;
                            }
                        }

                        if exit_observed && processes.iter().all(|p| p.is_done()) {
                            break;
                        }
                    }
                }
            }
            runner.cancellation.cancel();
            let _ = runner.done_tx.send(true);
        });
    }

    /// Cancels this runner's root context; every process and any
    /// subordinate scope cancels transitively (spec.md §5).
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Cancels and waits for the exit-watch task to observe every
    /// process finishing (spec.md §3 "closed on exit event or parent
    /// cancel").
    pub async fn close(self: &Arc<Self>) {
        self.cancellation.cancel();
        self.done().await;
    }

    pub async fn done(&self) {
        let mut rx = self.done_rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.wait_for(|done| *done).await;
    }

    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{action::Literal, channel::oneshot::Oneshot, value::Value};
    use std::time::Duration;

    #[tokio::test]
    async fn rejects_registering_two_processes_under_the_same_name() {
        let runner = Runner::new(ScopeRef::root());
        let a = Arc::new(Process::new("p", Arc::new(Oneshot::new()), Arc::new(Literal(Value::Void)), ScopeRef::root()));
        let b = Arc::new(Process::new("p", Arc::new(Oneshot::new()), Arc::new(Literal(Value::Void)), ScopeRef::root()));
        runner.register_process(a).unwrap();
        let result = runner.register_process(b);
        assert!(matches!(result, Err(ForceError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn closes_once_every_process_has_observed_its_exit() {
        let runner = Runner::new(ScopeRef::root());
        let process = Arc::new(Process::new(
            "p",
            Arc::new(Oneshot::new()),
            Arc::new(Literal(Value::Void)),
            ScopeRef::root(),
        ));
        runner.register_process(process.clone()).unwrap();
        runner.start().await.unwrap();

        // Let the oneshot handler run, then simulate an ExitEvent the
        // way a SIGTERM/`ExitEvent` on some channel would (spec.md §8 S5).
        tokio::time::sleep(Duration::from_millis(20)).await;
        runner.signal_exit(Some(3));

        tokio::time::timeout(Duration::from_secs(2), runner.done())
            .await
            .expect("runner should close within a couple of shutdown ticks");
        assert_eq!(runner.exit_code(), Some(3));
    }

    #[tokio::test]
    async fn swap_child_returns_the_previously_registered_runner() {
        let runner = Runner::new(ScopeRef::root());
        let first = Runner::child_of(&runner, ScopeRef::root());
        let second = Runner::child_of(&runner, ScopeRef::root());

        assert!(runner.swap_child("p", first.clone()).is_none());
        let previous = runner.swap_child("p", second.clone());
        assert!(previous.is_some());
        assert!(Arc::ptr_eq(&previous.unwrap(), &first));
        assert!(Arc::ptr_eq(&runner.child("p").unwrap(), &second));
    }

    #[tokio::test]
    async fn cancelling_the_parent_cancels_a_child_runner() {
        let runner = Runner::new(ScopeRef::root());
        let child = Runner::child_of(&runner, ScopeRef::root());
        assert!(!child.is_cancelled());
        runner.cancel();
        assert!(child.is_cancelled());
    }
}
