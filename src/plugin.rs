//! Plugin Surface (spec.md §4.9): the narrow contract external modules
//! (VCS pollers, container builders, Kubernetes job submission, logging
//! sinks — all out of scope per spec.md §1) use to contribute named
//! functions, struct prototypes, and long-lived client resources into
//! a [`crate::runner::Runner`]'s parse-time [`ScopeRef`].
//!
//! Plugin-qualified names (`plugin.Name`) are registered under a single
//! flat scope key of the form `"<plugin_key>.<Name>"` rather than a
//! nested per-plugin scope: [`ScopeRef`] already supports arbitrary
//! string keys, and a flat key gives the same collision-free
//! namespacing spec.md asks for ("route through the plugin's local
//! definition table rather than the global scope") without a second
//! lookup structure. See DESIGN.md.
use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;

use crate::{
    action::Action,
    context::ExecutionContext,
    errors::ForceError,
    scope::{Definition, ScopeRef},
    value::{Converter, Type, Value},
};

/// A registered builtin or plugin-contributed function (spec.md §4.3,
/// §4.9). The parser resolves a call's `Name` to a `Callable`, parses
/// the call's arguments as actions under the call's scope, then asks
/// the `Callable` to bind them into the call's own [`Action`].
pub trait Callable: Send + Sync {
    /// Human-readable name, used in arity/type error messages.
    fn name(&self) -> &str;

    /// Bind parsed argument expressions into this call's [`Action`].
    /// Arity is checked here; argument *values* (and thus most type
    /// errors) are only known once the returned action is evaluated,
    /// since an argument may itself be an arbitrary expression.
    fn bind(&self, args: Vec<Arc<dyn Action>>) -> Result<Arc<dyn Action>, ForceError>;
}

/// A struct/type prototype a composite literal (`Type{Field: expr}`)
/// may instantiate (spec.md §4.2, §4.3). Field order is preserved for
/// diagnostics; lookup is by name.
pub struct StructPrototype {
    pub type_name: String,
    pub fields: Vec<StructField>,
}

pub struct StructField {
    pub name: String,
    pub field_type: Type,
    pub converter: Arc<dyn Converter>,
    pub required: bool,
}

impl StructPrototype {
    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Builds a `Value::Struct` from already-evaluated field values,
    /// running each field's [`Converter`] and checking every required
    /// field was supplied (spec.md §4.1 Converter, §4.3 struct literal).
    pub fn construct(
        &self,
        mut values: BTreeMap<String, Value>,
    ) -> Result<Value, ForceError> {
        let mut fields = BTreeMap::new();
        for field in &self.fields {
            match values.remove(&field.name) {
                Some(value) => {
                    fields.insert(field.name.clone(), field.converter.convert(value)?);
                }
                None if field.required => {
                    return Err(ForceError::bad_parameter(format!(
                        "{} is missing required field {}",
                        self.type_name, field.name
                    )))
                }
                None => {}
            }
        }
        if let Some(unknown) = values.keys().next() {
            return Err(ForceError::bad_parameter(format!(
                "{} has no field named {unknown}",
                self.type_name
            )));
        }
        Ok(Value::Struct(Arc::new(crate::value::StructValue {
            type_name: self.type_name.clone(),
            fields,
        })))
    }
}

/// An external module contributing named functions, struct prototypes
/// and any long-lived client resource into a Runner's scope at setup
/// time (spec.md §4.9).
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Namespacing key for `plugin.Name` qualification (spec.md §4.9).
    fn key(&self) -> &str;

    fn functions(&self) -> Vec<Arc<dyn Callable>> {
        Vec::new()
    }

    fn prototypes(&self) -> Vec<Arc<StructPrototype>> {
        Vec::new()
    }

    /// Called once when the plugin is registered into a Runner, before
    /// any script is parsed against its scope; used for one-shot client
    /// setup (auth, connection pools).
    async fn setup(&self) -> Result<(), ForceError> {
        Ok(())
    }
}

/// Registers every function/prototype a plugin contributes into
/// `scope`, under the flat `"<key>.<name>"` key (spec.md §4.9).
pub fn register(scope: &ScopeRef, plugin: &dyn Plugin) -> Result<(), ForceError> {
    let key = plugin.key();
    for function in plugin.functions() {
        let qualified = format!("{key}.{}", function.name());
        scope
            .define(&qualified, Definition::Callable(function))
            .map_err(|_| ForceError::bad_parameter(format!("{qualified} is already registered")))?;
    }
    for prototype in plugin.prototypes() {
        let qualified = format!("{key}.{}", prototype.type_name);
        scope
            .define(&qualified, Definition::Prototype(prototype))
            .map_err(|_| ForceError::bad_parameter(format!("{qualified} is already registered")))?;
    }
    Ok(())
}

/// Registers a plugin's functions/prototypes under their bare,
/// unqualified names instead of `"<key>.<name>"`. Used once, at Runner
/// setup, for the bundled ambient `core` plugin (`Command`, `Sequence`,
/// `Exit`, …): spec.md §8's end-to-end scenarios call these unqualified
/// (`Exit(1)`, not `core.Exit(1)`), unlike genuine external plugins,
/// which are always qualified (spec.md §4.9).
pub fn register_core(scope: &ScopeRef, plugin: &dyn Plugin) -> Result<(), ForceError> {
    for function in plugin.functions() {
        let name = function.name().to_owned();
        scope
            .define(&name, Definition::Callable(function))
            .map_err(|_| ForceError::bad_parameter(format!("{name} is already registered")))?;
    }
    for prototype in plugin.prototypes() {
        let name = prototype.type_name.clone();
        scope
            .define(&name, Definition::Prototype(prototype))
            .map_err(|_| ForceError::bad_parameter(format!("{name} is already registered")))?;
    }
    Ok(())
}

/// Trivial [`Action`] wrapper handing back an already-evaluated
/// [`Value`]; most `Callable::bind` implementations that need a
/// constant (e.g. an arity-zero builtin) reach for this instead of the
/// heavier general-purpose evaluation path.
pub struct ConstAction(pub Value);

#[async_trait]
impl Action for ConstAction {
    async fn eval(&self, _ctx: &ExecutionContext, _scope: &ScopeRef) -> Result<Value, ForceError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopFn;
    impl Callable for NoopFn {
        fn name(&self) -> &str {
            "Noop"
        }

        fn bind(&self, args: Vec<Arc<dyn Action>>) -> Result<Arc<dyn Action>, ForceError> {
            if !args.is_empty() {
                return Err(ForceError::bad_parameter("Noop takes no arguments"));
            }
            Ok(Arc::new(ConstAction(Value::Void)))
        }
    }

    struct TestPlugin;
    impl Plugin for TestPlugin {
        fn key(&self) -> &str {
            "test"
        }

        fn functions(&self) -> Vec<Arc<dyn Callable>> {
            vec![Arc::new(NoopFn)]
        }
    }

    #[tokio::test]
    async fn registers_functions_under_the_qualified_key() {
        let scope = ScopeRef::root();
        register(&scope, &TestPlugin).unwrap();
        assert!(matches!(
            scope.lookup("test.Noop"),
            Some(Definition::Callable(_))
        ));
    }

    #[tokio::test]
    async fn rejects_double_registration() {
        let scope = ScopeRef::root();
        register(&scope, &TestPlugin).unwrap();
        assert!(register(&scope, &TestPlugin).is_err());
    }

    #[tokio::test]
    async fn register_core_uses_bare_names() {
        let scope = ScopeRef::root();
        register_core(&scope, &TestPlugin).unwrap();
        assert!(matches!(scope.lookup("Noop"), Some(Definition::Callable(_))));
        assert!(scope.lookup("test.Noop").is_none());
    }
}
