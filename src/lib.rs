//! Force: a small CI/CD automation engine (spec.md §1-§3). Parses a
//! Go-syntax-subset script into an [`Action`] graph and either runs it
//! once in the foreground or binds it to a [`Channel`] as a long-lived
//! watching [`Process`] (spec.md §6 `Setup`/`Run`/`Watch`).
pub mod action;
pub mod builtins;
pub mod channel;
pub mod constants;
pub mod context;
pub mod errors;
pub mod lexer;
pub mod loader;
pub mod parser;
pub mod plugin;
pub mod process;
pub mod runner;
pub mod scope;
pub mod value;

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

pub use action::Action;
pub use builtins::CorePlugin;
pub use channel::{Channel, Event};
pub use context::ExecutionContext;
pub use errors::{CodeError, ForceError};
pub use plugin::{register, register_core, Plugin};
pub use process::Process;
pub use runner::Runner;
pub use scope::ScopeRef;
pub use value::{Type, Value};

/// Extracts the `Name`/`Watch`/`Run` fields of a `Value::Struct{"Process", …}`
/// (spec.md §3 Process, produced by the `Process{}` composite literal in
/// `builtins::process_prototype`) into an actual runnable [`Process`].
pub(crate) fn into_process(value: Value, scope: &ScopeRef) -> Result<Arc<Process>, ForceError> {
    let type_name = value.as_struct()?.type_name.clone();
    if type_name != "Process" {
        return Err(ForceError::bad_parameter(format!(
            "expected a Process, found {type_name}"
        )));
    }
    let name = value.field("Name")?.as_str()?.to_owned();
    let channel = value.field("Watch")?.as_channel()?;
    let action = value.field("Run")?.as_action()?;
    Ok(Arc::new(Process::new(name, channel, action, scope.clone())))
}

/// The engine a CLI front-end drives (spec.md §6 entry points). Owns the
/// lexical scope plugins register into and, between a `Watch` call and
/// the `Run` that follows it, the channel the next foreground action
/// should be bound to.
pub struct Engine {
    scope: ScopeRef,
    pending_watch: Mutex<Option<Arc<dyn Channel>>>,
}

impl Engine {
    /// A scope with only the bundled `core` plugin registered (spec.md
    /// §8's end-to-end scenarios need nothing more).
    pub fn new() -> Arc<Self> {
        let scope = ScopeRef::root();
        register_core(&scope, &CorePlugin).expect("core plugin registers cleanly into a fresh scope");
        Arc::new(Self {
            scope,
            pending_watch: Mutex::new(None),
        })
    }

    /// Registers every plugin's functions/prototypes (qualified
    /// `plugin.Name`, spec.md §4.9) and runs each plugin's one-shot
    /// `setup()` before any script is parsed.
    pub async fn with_plugins(plugins: Vec<Arc<dyn Plugin>>) -> Result<Arc<Self>, ForceError> {
        let engine = Self::new();
        for plugin in &plugins {
            register(&engine.scope, plugin.as_ref())?;
            plugin.setup().await?;
        }
        Ok(engine)
    }

    pub fn scope(&self) -> &ScopeRef {
        &self.scope
    }

    /// `Setup(actions…)` (spec.md §6): parses and runs each source in
    /// order under a bootstrap foreground context, before the `Run` that
    /// follows. Stops at the first failure.
    pub async fn setup(&self, sources: &[(String, String)]) -> Result<(), CodeError> {
        for (file, source) in sources {
            let action = parser::parse_script(file, source, &self.scope)?;
            let ctx = ExecutionContext::new("setup", Event::oneshot(), &CancellationToken::new(), self.scope.clone());
            let result = action.eval(&ctx, &self.scope).await;
            ctx.close().await.map_err(CodeError::from)?;
            result.map_err(CodeError::from)?;
        }
        Ok(())
    }

    /// `Watch(channel)` (spec.md §6): binds `channel` to the action the
    /// next `run` call parses, turning what would otherwise be a single
    /// foreground execution into a long-lived watching process.
    pub fn watch(&self, channel: Arc<dyn Channel>) {
        *self.pending_watch.lock().unwrap() = Some(channel);
    }

    /// `Run(action|process)` (spec.md §6): parses `source` and either
    /// runs it once in the foreground, binds it to a pending `Watch`
    /// channel, or (if it is itself a `Process{}` literal) starts it
    /// directly. Returns the process exit code (spec.md §6 exit codes).
    pub async fn run(&self, file: &str, source: &str) -> Result<i32, CodeError> {
        let action = parser::parse_script(file, source, &self.scope)?;

        if let Some(channel) = self.pending_watch.lock().unwrap().take() {
            let name = file.trim_end_matches(".frc").to_owned();
            let process = Arc::new(Process::new(name, channel, action, self.scope.clone()));
            return self.run_process(process).await;
        }

        let ctx = ExecutionContext::new("run", Event::oneshot(), &CancellationToken::new(), self.scope.clone());
        let result = action.eval(&ctx, &self.scope).await;
        let closed = ctx.close().await;
        if result.is_ok() {
            closed.map_err(CodeError::from)?;
        }

        match result {
            Ok(Value::Struct(structure)) if structure.type_name == "Process" => {
                let process = into_process(Value::Struct(structure), &self.scope).map_err(CodeError::from)?;
                self.run_process(process).await
            }
            Ok(_) => Ok(0),
            Err(ForceError::Exit(code)) => Ok(code as i32),
            Err(err) => Err(CodeError::from(err)),
        }
    }

    /// Registers and starts `process` under a fresh [`Runner`], then
    /// blocks until the runner closes (spec.md §4.7 Exit, §8 S5).
    async fn run_process(&self, process: Arc<Process>) -> Result<i32, CodeError> {
        let runner = Runner::new(self.scope.clone());
        runner.register_process(process).map_err(CodeError::from)?;
        runner.start().await.map_err(CodeError::from)?;
        runner.done().await;
        Ok(runner.exit_code().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_executes_a_plain_foreground_action_and_returns_its_exit_code() {
        let engine = Engine::new();
        let code = engine.run("t.frc", r#"Exit(0)"#).await.unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn run_propagates_a_nonzero_exit_code() {
        let engine = Engine::new();
        let code = engine.run("t.frc", r#"Exit(7)"#).await.unwrap();
        assert_eq!(code, 7);
    }

    #[tokio::test]
    async fn run_starts_a_process_literal_and_keeps_it_running_until_exit() {
        let engine = Engine::new();
        let run = engine.run(
            "t.frc",
            r#"Process{Name: "p", Watch: Oneshot(), Run: func(){ Log(ID()); }}"#,
        );
        // A Oneshot process never emits an ExitEvent itself, so `run`
        // only returns once something signals the runner's exit;
        // nothing does here, so this proves the process started (and
        // its handler ran) without erroring, rather than that it ever
        // completes.
        let result = tokio::time::timeout(std::time::Duration::from_millis(100), run).await;
        assert!(result.is_err(), "expected the watching process to still be running");
    }

    #[tokio::test]
    async fn watch_binds_a_channel_to_the_next_run_turning_an_action_into_a_process() {
        let engine = Engine::new();
        engine.watch(Arc::new(channel::oneshot::Oneshot::new()));
        let run = engine.run("watched.frc", r#"Log("hi")"#);
        let result = tokio::time::timeout(std::time::Duration::from_millis(200), run).await;
        // The bound process never receives an ExitEvent, so `run` is
        // still pending; confirm it didn't fail outright instead.
        assert!(result.is_err(), "expected the watch-bound process to still be running");
    }
}
