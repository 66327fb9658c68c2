//! Action Model (spec.md §4.4): the unit of deferred work. Every
//! [`Action`] exposes `eval(ctx, scope) -> Result<Value, ForceError>`;
//! this module holds the composite actions spec.md names explicitly.
//! Parser-produced leaf expressions (literals, struct/slice literals,
//! calls) live in `parser::expressions` but implement the same trait,
//! since the source treats "Action" and "Expression" as the one
//! Eval-able interface (spec.md §3 merges them: "Expression … may be
//! an Action").
//!
//! `eval` takes an explicit `scope` alongside `ctx`, rather than only
//! `ctx` as spec.md's abstract `Eval(ctx)` suggests: the teacher
//! threads its variable scope the same way, as an explicit parameter
//! to `evaluate` (`components/expressions/block.rs::Evaluatable`,
//! `components/stack.rs::ExecutorStack`) rather than folding it into
//! the context, because `ctx` is shared by concurrently running
//! siblings (`Parallel`) and a scope mutated in place would race.
//! Every `{ }` block (`Sequence`) opens a fresh child scope on each
//! `eval`, so a process's retained action graph can be dispatched many
//! times (spec.md §3 "retained across many events") without each
//! dispatch's `Define`s colliding with the last (spec.md §8 property 2
//! forbids redefinition in the *same* scope, not across dispatches).
//!
//! `eval` is `async`: Force's actions run as real concurrent tasks on
//! the Tokio multi-thread runtime (spec.md §5), and several builtins
//! (`Command`, the VCS/container plugins spec.md's Non-goals keep
//! external) do real asynchronous I/O.
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use crate::{context::ExecutionContext, errors::ForceError, scope::ScopeRef, value::Value};

pub mod define;
pub mod lambda;
pub mod var_ref;

pub use define::{Define, DynamicDefine};
pub use lambda::{LambdaFunction, LambdaFunctionCall, LambdaLiteral};
pub use var_ref::VarRef;

/// The universal evaluable node (spec.md §3 Action, §4.4).
#[async_trait]
pub trait Action: Send + Sync {
    async fn eval(&self, ctx: &ExecutionContext, scope: &ScopeRef) -> Result<Value, ForceError>;
}

/// A value already known when the action tree was built: integer,
/// string and bool literals, and anywhere a [`Value`] needs wrapping
/// back into an [`Action`] (e.g. [`LambdaFunctionCall::thunk`]).
pub struct Literal(pub Value);

#[async_trait]
impl Action for Literal {
    async fn eval(&self, _ctx: &ExecutionContext, _scope: &ScopeRef) -> Result<Value, ForceError> {
        Ok(self.0.clone())
    }
}

/// Evaluates children in order inside a fresh child scope; stops on
/// first error; returns the last value (spec.md §4.4, §8 property 4).
pub struct Sequence(pub Vec<Arc<dyn Action>>);

#[async_trait]
impl Action for Sequence {
    async fn eval(&self, ctx: &ExecutionContext, scope: &ScopeRef) -> Result<Value, ForceError> {
        let scope = scope.child();
        let mut last = Value::Void;
        for action in &self.0 {
            if ctx.is_cancelled() {
                return Err(ForceError::ConnectionProblem(
                    "context cancelled during sequence".into(),
                ));
            }
            last = action.eval(ctx, &scope).await?;
        }
        Ok(last)
    }
}

/// Evaluates children concurrently, each against its own child scope;
/// joins; returns an aggregate error containing all failures. A
/// failing sibling does not prevent the others from running to
/// completion (spec.md §4.4, §8 property 5).
pub struct Parallel(pub Vec<Arc<dyn Action>>);

#[async_trait]
impl Action for Parallel {
    async fn eval(&self, ctx: &ExecutionContext, scope: &ScopeRef) -> Result<Value, ForceError> {
        let futures = self
            .0
            .iter()
            .map(|action| async move { action.eval(ctx, &scope.child()).await });
        let results = join_all(futures).await;

        let mut errors = Vec::new();
        let mut last = Value::Void;
        for result in results {
            match result {
                Ok(value) => last = value,
                Err(err) => errors.push(err),
            }
        }
        if errors.is_empty() {
            Ok(last)
        } else {
            Err(ForceError::aggregate(errors))
        }
    }
}

/// Schedules its inner action to run when the enclosing
/// [`ExecutionContext`] closes, in LIFO order regardless of error
/// (spec.md §4.4, §8 property 6).
pub struct Defer(pub Arc<dyn Action>);

#[async_trait]
impl Action for Defer {
    async fn eval(&self, ctx: &ExecutionContext, scope: &ScopeRef) -> Result<Value, ForceError> {
        let action = self.0.clone();
        let scope = scope.clone();
        ctx.add_closer(Box::new(move |ctx| {
            Box::pin(async move { action.eval(ctx, &scope).await.map(|_| ()) })
        }));
        Ok(Value::Void)
    }
}

/// Evaluates a predicate, branches by truthiness (spec.md §4.4).
pub struct If {
    pub predicate: Arc<dyn Action>,
    pub then_branch: Arc<dyn Action>,
    pub else_branch: Option<Arc<dyn Action>>,
}

#[async_trait]
impl Action for If {
    async fn eval(&self, ctx: &ExecutionContext, scope: &ScopeRef) -> Result<Value, ForceError> {
        let predicate = self.predicate.eval(ctx, scope).await?;
        if predicate.is_truthy() {
            self.then_branch.eval(ctx, scope).await
        } else if let Some(else_branch) = &self.else_branch {
            else_branch.eval(ctx, scope).await
        } else {
            Ok(Value::Void)
        }
    }
}
