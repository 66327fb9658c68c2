//! `VarRef` (spec.md §4.4, §4.3 selector chains `a.b.c`): looks up
//! `name` in the scope handed to this call (walking parents), then
//! walks `path` via struct field access on the resulting value.
use async_trait::async_trait;

use crate::{context::ExecutionContext, errors::ForceError, scope::ScopeRef, value::Value};

use super::Action;

pub struct VarRef {
    pub name: String,
    pub path: Vec<String>,
}

impl VarRef {
    pub fn new(name: String, path: Vec<String>) -> Self {
        Self { name, path }
    }
}

#[async_trait]
impl Action for VarRef {
    async fn eval(&self, _ctx: &ExecutionContext, scope: &ScopeRef) -> Result<Value, ForceError> {
        let mut value = scope.lookup_value(&self.name)?;
        for segment in &self.path {
            value = value.field(segment)?;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{channel::Event, scope::Definition, value::StructValue};
    use std::{collections::BTreeMap, sync::Arc};
    use tokio_util::sync::CancellationToken;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("p", Event::oneshot(), &CancellationToken::new(), ScopeRef::root())
    }

    #[tokio::test]
    async fn resolves_a_bare_name() {
        let scope = ScopeRef::root();
        scope.define("x", Definition::Value(Value::Int(7))).unwrap();
        let result = VarRef::new("x".into(), vec![]).eval(&ctx(), &scope).await;
        assert!(matches!(result, Ok(Value::Int(7))));
    }

    #[tokio::test]
    async fn walks_a_selector_path_through_struct_fields() {
        let scope = ScopeRef::root();
        let mut fields = BTreeMap::new();
        fields.insert("Name".to_owned(), Value::from("build"));
        scope
            .define(
                "p",
                Definition::Value(Value::Struct(Arc::new(StructValue {
                    type_name: "Process".into(),
                    fields,
                }))),
            )
            .unwrap();
        let result = VarRef::new("p".into(), vec!["Name".into()])
            .eval(&ctx(), &scope)
            .await;
        assert!(matches!(result, Ok(Value::String(s)) if s == "build"));
    }

    #[tokio::test]
    async fn missing_identifier_is_not_found() {
        let scope = ScopeRef::root();
        let result = VarRef::new("missing".into(), vec![]).eval(&ctx(), &scope).await;
        assert!(matches!(result, Err(ForceError::NotFound(_))));
    }
}
