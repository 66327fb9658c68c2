//! Script Loader (spec.md §4.11): `Load` and `Reload`, the two runtime
//! forms of the loader. `Include` is the third form, but it is parser
//! syntax rather than a runtime [`Action`] — it must parse and evaluate
//! its target file immediately, against the *same* scope the rest of
//! the enclosing parse sees, so top-level `Define`s and plugin setups
//! in the included file are visible to the remainder of the including
//! script (spec.md §4.11 "evaluated immediately … so … become visible
//! to the rest of the parse"). That requires the token stream and the
//! in-progress parse scope, so it lives in
//! `parser::expressions::parse_include` instead of here; this module
//! only documents the contract it follows.
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    action::Action,
    channel::Event,
    context::ExecutionContext,
    errors::ForceError,
    process::Process,
    runner::Runner,
    scope::ScopeRef,
    value::Value,
};

/// Shared by `Load` and `Reload`: read `path`, parse it as a script
/// expected to evaluate to a `Process{}` literal (spec.md §3 Process),
/// and resolve that value into a runnable [`Process`] bound to
/// `scope`. Mirrors [`crate::into_process`], the same extraction
/// `Engine::run` does for a top-level `Process{}` result.
async fn load_process(path: &str, scope: &ScopeRef) -> Result<Arc<Process>, ForceError> {
    let source = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| ForceError::not_found(format!("cannot read {path}: {err}")))?;
    let action = crate::parser::parse_script(path, &source, scope)
        .map_err(|err| ForceError::bad_parameter(err.to_string()))?;

    let ctx = ExecutionContext::new("load", Event::oneshot(), &CancellationToken::new(), scope.clone());
    let value = action.eval(&ctx, scope).await?;
    ctx.close().await?;

    crate::into_process(value, scope)
}

/// `Load(path)` (spec.md §4.11): parses `path` as a script producing a
/// `Process`, spawns a child [`Runner`] for it, starts it, registers it
/// on the enclosing runner under its process name, and blocks the
/// caller until the child runner closes.
pub struct LoadAction(pub Arc<dyn Action>);

#[async_trait]
impl Action for LoadAction {
    async fn eval(&self, ctx: &ExecutionContext, scope: &ScopeRef) -> Result<Value, ForceError> {
        let path = self.0.eval(ctx, scope).await?.as_str()?.to_owned();
        let parent = owning_runner(ctx, "Load")?;

        let child_scope = parent.scope().clone();
        let process = load_process(&path, &child_scope).await?;
        let name = process.name.clone();

        let child = Runner::child_of(&parent, child_scope);
        child.register_process(process.clone())?;
        child.start().await?;
        parent.swap_child(name, child.clone());

        child.done().await;
        Ok(Value::Process(process))
    }
}

/// `Reload(path)` (spec.md §4.11): like [`LoadAction`], but atomically
/// swaps the freshly started child in under its process name, then
/// closes and waits on whatever was previously registered there — not
/// on the new child, which is left running. A parse/start failure for
/// the new script leaves the previous child untouched and still
/// running (spec.md §4.11 "Failure during parse leaves the previous
/// child running").
pub struct ReloadAction(pub Arc<dyn Action>);

#[async_trait]
impl Action for ReloadAction {
    async fn eval(&self, ctx: &ExecutionContext, scope: &ScopeRef) -> Result<Value, ForceError> {
        let path = self.0.eval(ctx, scope).await?.as_str()?.to_owned();
        let parent = owning_runner(ctx, "Reload")?;

        let child_scope = parent.scope().clone();
        let process = load_process(&path, &child_scope).await?;
        let name = process.name.clone();

        let child = Runner::child_of(&parent, child_scope);
        child.register_process(process.clone())?;
        child.start().await?;

        // Swap in the new child before tearing down the old one, so a
        // reader of the runner's registry never observes the name
        // unbound (spec.md §8 property 9 "Reload atomicity").
        let previous = parent.swap_child(name, child);
        if let Some(previous) = previous {
            previous.close().await;
        }
        Ok(Value::Process(process))
    }
}

fn owning_runner(ctx: &ExecutionContext, form: &str) -> Result<Arc<Runner>, ForceError> {
    ctx.runner
        .as_ref()
        .and_then(|runner| runner.upgrade())
        .ok_or_else(|| ForceError::bad_parameter(format!("{form} can only be called from a running process")))
}
