//! `LambdaFunction`/`LambdaFunctionCall` (spec.md §4.4, §4.3 function
//! literal `func(params…){ stmts }`).
//!
//! [`LambdaLiteral`] is the parsed AST node for the literal itself: an
//! [`Action`] whose `eval` captures the *current* scope (the scope
//! handed to it by its enclosing `Sequence`) as the lambda's closure,
//! producing a [`Value::Lambda`]. Capturing at `eval` time rather than
//! parse time is what gives a retained process action graph a fresh
//! closure on every dispatch, while still reading whatever was bound
//! at the point in that dispatch's scope tree where the literal sits
//! (spec.md §8 property 1).
//!
//! [`LambdaFunctionCall`] is the call site: it evaluates the callee
//! expression (usually a [`VarRef`](super::VarRef) or a `LambdaLiteral`
//! directly, for an immediately-invoked literal) to a
//! [`Value::Lambda`], validates arity, and binds each argument as a
//! `Define` in a freshly nested child of the lambda's closure scope
//! (spec.md §4.4), so calling the same lambda twice — or the same
//! retained process action twice — never collides on redefinition.
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use crate::{context::ExecutionContext, errors::ForceError, scope::{Definition, ScopeRef}, value::Value};

use super::Action;

/// The callable value produced by evaluating a [`LambdaLiteral`]:
/// closure scope, ordered parameter names, and the body to run as a
/// `Sequence` (spec.md §3 Lambda, §4.4).
pub struct LambdaFunction {
    pub closure: ScopeRef,
    pub params: Vec<String>,
    pub body: Arc<dyn Action>,
}

pub struct LambdaLiteral {
    pub params: Vec<String>,
    pub body: Arc<dyn Action>,
}

#[async_trait]
impl Action for LambdaLiteral {
    async fn eval(&self, _ctx: &ExecutionContext, scope: &ScopeRef) -> Result<Value, ForceError> {
        Ok(Value::Lambda(Arc::new(LambdaFunction {
            closure: scope.clone(),
            params: self.params.clone(),
            body: self.body.clone(),
        })))
    }
}

pub struct LambdaFunctionCall {
    pub callee: Arc<dyn Action>,
    pub args: Vec<Arc<dyn Action>>,
}

impl LambdaFunctionCall {
    pub fn new(callee: Arc<dyn Action>, args: Vec<Arc<dyn Action>>) -> Self {
        Self { callee, args }
    }

    /// A zero-argument call site wrapping an already-known lambda
    /// value, used by [`Value::as_action`](crate::value::Value::as_action)
    /// to turn a bare `Value::Lambda` (e.g. a process's `Run` field)
    /// into a dispatchable [`Action`] without call-site syntax.
    pub fn thunk(lambda: Arc<LambdaFunction>) -> Self {
        Self {
            callee: Arc::new(super::Literal(Value::Lambda(lambda))),
            args: Vec::new(),
        }
    }
}

#[async_trait]
impl Action for LambdaFunctionCall {
    async fn eval(&self, ctx: &ExecutionContext, scope: &ScopeRef) -> Result<Value, ForceError> {
        let lambda = self.callee.eval(ctx, scope).await?.as_lambda()?;

        if self.args.len() != lambda.params.len() {
            return Err(ForceError::bad_parameter(format!(
                "expected {} argument(s), found {}",
                lambda.params.len(),
                self.args.len()
            )));
        }

        let arg_values = join_all(self.args.iter().map(|arg| arg.eval(ctx, scope))).await;

        let call_scope = lambda.closure.child();
        for (name, value) in lambda.params.iter().zip(arg_values) {
            call_scope.define(name, Definition::Value(value?))?;
        }

        lambda.body.eval(ctx, &call_scope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{action::{Define, Literal, Sequence, VarRef}, channel::Event};
    use tokio_util::sync::CancellationToken;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("p", Event::oneshot(), &CancellationToken::new(), ScopeRef::root())
    }

    #[tokio::test]
    async fn captures_the_value_bound_at_definition_time() {
        // a := 1; l := func(){ a }; (nested) a := 2; l() -> 1
        let root = ScopeRef::root();
        Define::new("a".into(), Arc::new(Literal(Value::Int(1))))
            .eval(&ctx(), &root)
            .await
            .unwrap();

        let lambda_body: Arc<dyn Action> =
            Arc::new(Sequence(vec![Arc::new(VarRef::new("a".into(), vec![]))]));
        let literal = LambdaLiteral {
            params: vec![],
            body: lambda_body,
        };
        let lambda_value = literal.eval(&ctx(), &root).await.unwrap();

        // Shadow `a` in a nested scope; the already-captured closure
        // is unaffected.
        let nested = root.child();
        Define::new("a".into(), Arc::new(Literal(Value::Int(2))))
            .eval(&ctx(), &nested)
            .await
            .unwrap();

        let call = LambdaFunctionCall::new(Arc::new(Literal(lambda_value)), vec![]);
        let result = call.eval(&ctx(), &root).await.unwrap();
        assert!(matches!(result, Value::Int(1)));
    }

    #[tokio::test]
    async fn a_thunked_lambda_can_be_dispatched_repeatedly() {
        let root = ScopeRef::root();
        let define: Arc<dyn Action> =
            Arc::new(Define::new("x".into(), Arc::new(Literal(Value::Int(1)))));
        let literal = LambdaLiteral {
            params: vec![],
            body: Arc::new(Sequence(vec![define])),
        };
        let value = literal.eval(&ctx(), &root).await.unwrap().as_lambda().unwrap();

        LambdaFunctionCall::thunk(value.clone())
            .eval(&ctx(), &root)
            .await
            .unwrap();
        LambdaFunctionCall::thunk(value)
            .eval(&ctx(), &root)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejects_wrong_arity() {
        let root = ScopeRef::root();
        let literal = LambdaLiteral {
            params: vec!["a".into()],
            body: Arc::new(Sequence(vec![])),
        };
        let value = literal.eval(&ctx(), &root).await.unwrap();
        let call = LambdaFunctionCall::new(Arc::new(Literal(value)), vec![]);
        let result = call.eval(&ctx(), &root).await;
        assert!(matches!(result, Err(ForceError::BadParameter(_))));
    }
}
