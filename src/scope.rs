//! Lexical + runtime chained environments (spec.md §4.2).
//!
//! Two roles share this one structure: the **lexical scope** the
//! parser builds statically as it walks the expression tree (used to
//! bind identifiers to [`Define`](crate::action::Define) sites and to
//! register plugin-contributed functions/prototypes), and the
//! **runtime scope** an [`ExecutionContext`](crate::context::ExecutionContext)
//! carries per event (a thread-safe key/value bag, see §4.8). Only the
//! lexical role lives here; the runtime bag is its own small type in
//! `context.rs` since it has different concurrency requirements
//! (shared across goroutines, not just parent-chained).
//!
//! `Arc<Mutex<_>>` rather than the teacher's `Rc<RefCell<_>>`: a
//! [`LambdaFunction`](crate::action::lambda::LambdaFunction) captures
//! its defining scope and runs as a real concurrent task, so the scope
//! chain must be `Send + Sync`.
use std::{collections::HashMap, sync::Arc, sync::Mutex};

use crate::{
    errors::ForceError,
    value::{Type, Value},
};

/// What a name can be bound to in a [`Scope`].
#[derive(Clone)]
pub enum Definition {
    Value(Value),
    /// A plugin- or core-registered builtin function (spec.md §4.3,
    /// §4.9). Resolved at parse time, then bound against the parsed
    /// argument actions to produce the call's [`Action`](crate::action::Action).
    Callable(Arc<dyn crate::plugin::Callable>),
    /// A struct/type prototype a composite literal may instantiate.
    Prototype(Arc<crate::plugin::StructPrototype>),
}

struct ScopeInner {
    definitions: HashMap<String, Definition>,
    parent: Option<ScopeRef>,
    /// Parent-type hint (spec.md §4.2): lets `_`-typed composite
    /// literals infer their prototype from the expected field type.
    parent_type_hint: Option<Type>,
}

/// Reference-counted handle to a scope. Cheap to clone; clones share
/// the same underlying bindings.
#[derive(Clone)]
pub struct ScopeRef(Arc<Mutex<ScopeInner>>);

impl ScopeRef {
    pub fn root() -> Self {
        Self(Arc::new(Mutex::new(ScopeInner {
            definitions: HashMap::new(),
            parent: None,
            parent_type_hint: None,
        })))
    }

    /// Create a scope nested under `self`, e.g. for a lambda body or a
    /// function-call's argument scope.
    pub fn child(&self) -> Self {
        Self(Arc::new(Mutex::new(ScopeInner {
            definitions: HashMap::new(),
            parent: Some(self.clone()),
            parent_type_hint: None,
        })))
    }

    pub fn child_with_type_hint(&self, hint: Type) -> Self {
        let child = self.child();
        child.0.lock().unwrap().parent_type_hint = Some(hint);
        child
    }

    pub fn type_hint(&self) -> Option<Type> {
        self.0.lock().unwrap().parent_type_hint.clone()
    }

    /// Bind `name` in this scope. Redefining a name already present in
    /// *this* scope (not a parent) is an error (spec.md §4.2, §4.4
    /// `Define`); shadowing in a nested scope is allowed.
    pub fn define(&self, name: &str, definition: Definition) -> Result<(), ForceError> {
        let mut inner = self.0.lock().unwrap();
        if inner.definitions.contains_key(name) {
            return Err(ForceError::AlreadyExists(format!(
                "{name} is already defined in this scope"
            )));
        }
        inner.definitions.insert(name.to_owned(), definition);
        Ok(())
    }

    /// Look up `name`, walking parent scopes.
    pub fn lookup(&self, name: &str) -> Option<Definition> {
        let inner = self.0.lock().unwrap();
        if let Some(value) = inner.definitions.get(name) {
            return Some(value.clone());
        }
        inner.parent.as_ref().and_then(|parent| parent.lookup(name))
    }

    pub fn lookup_value(&self, name: &str) -> Result<Value, ForceError> {
        match self.lookup(name) {
            Some(Definition::Value(value)) => Ok(value),
            Some(_) => Err(ForceError::bad_parameter(format!("{name} is not a value"))),
            None => Err(ForceError::not_found(format!(
                "undefined identifier {name}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_find_definitions_through_parent_chain() {
        let root = ScopeRef::root();
        root.define("x", Definition::Value(Value::Int(1))).unwrap();
        let child = root.child();
        assert!(matches!(
            child.lookup("x"),
            Some(Definition::Value(Value::Int(1)))
        ));
    }

    #[test]
    fn should_reject_redefinition_in_same_scope() {
        let root = ScopeRef::root();
        root.define("x", Definition::Value(Value::Int(1))).unwrap();
        let result = root.define("x", Definition::Value(Value::Int(2)));
        assert!(matches!(result, Err(ForceError::AlreadyExists(_))));
    }

    #[test]
    fn should_allow_shadowing_in_nested_scope() {
        let root = ScopeRef::root();
        root.define("x", Definition::Value(Value::Int(1))).unwrap();
        let child = root.child();
        child
            .define("x", Definition::Value(Value::Int(2)))
            .unwrap();
        assert!(matches!(
            child.lookup("x"),
            Some(Definition::Value(Value::Int(2)))
        ));
        assert!(matches!(
            root.lookup("x"),
            Some(Definition::Value(Value::Int(1)))
        ));
    }

    #[test]
    fn lexical_binding_survives_later_rebinding_of_outer_name() {
        // Testable property #1 (spec.md §8): a lambda's captured scope
        // sees the value bound at *definition* time.
        let root = ScopeRef::root();
        root.define("a", Definition::Value(Value::Int(1))).unwrap();
        let captured = root.clone();
        let nested = root.child();
        nested
            .define("a", Definition::Value(Value::Int(2)))
            .unwrap();
        assert!(matches!(
            captured.lookup("a"),
            Some(Definition::Value(Value::Int(1)))
        ));
    }
}
