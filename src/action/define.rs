//! `Define` (spec.md §4.4, §4.3 short assignment `name := expr`):
//! evaluates `expr` against the scope handed to this call, then binds
//! the result to `name` in that same scope. Redefining a name already
//! present in that scope is `BadParameter` (spec.md §8 property 2);
//! the parser additionally rejects this earlier, at parse time, so the
//! common case is reported with a source snippet rather than only at
//! dispatch.
use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    context::ExecutionContext,
    errors::ForceError,
    scope::{Definition, ScopeRef},
    value::Value,
};

use super::Action;

pub struct Define {
    pub name: String,
    pub expr: Arc<dyn Action>,
}

impl Define {
    pub fn new(name: String, expr: Arc<dyn Action>) -> Self {
        Self { name, expr }
    }
}

#[async_trait]
impl Action for Define {
    async fn eval(&self, ctx: &ExecutionContext, scope: &ScopeRef) -> Result<Value, ForceError> {
        let value = self.expr.eval(ctx, scope).await?;
        scope
            .define(&self.name, Definition::Value(value.clone()))
            .map_err(|_| {
                ForceError::bad_parameter(format!("{} is already defined in this scope", self.name))
            })?;
        Ok(value)
    }
}

/// The `Define(name, expr)` builtin form (spec.md §8 S2), as distinct
/// from the `name := expr` parser sugar [`Define`] desugars to: the
/// name here is itself an evaluated expression rather than known at
/// parse time, since `Define` also appears as an ordinary argument
/// inside `Sequence`/`Parallel` call lists.
pub struct DynamicDefine {
    pub name: Arc<dyn Action>,
    pub expr: Arc<dyn Action>,
}

impl DynamicDefine {
    pub fn new(name: Arc<dyn Action>, expr: Arc<dyn Action>) -> Self {
        Self { name, expr }
    }
}

#[async_trait]
impl Action for DynamicDefine {
    async fn eval(&self, ctx: &ExecutionContext, scope: &ScopeRef) -> Result<Value, ForceError> {
        let name = self.name.eval(ctx, scope).await?.as_str()?.to_owned();
        let value = self.expr.eval(ctx, scope).await?;
        scope
            .define(&name, Definition::Value(value.clone()))
            .map_err(|_| ForceError::bad_parameter(format!("{name} is already defined in this scope")))?;
        Ok(value)
    }
}
