//! Value & Type layer (spec.md §4.1): tagged scalar wrappers, slices,
//! maps, structs and first-class lambdas, plus the [`Converter`]
//! coercion hook the parser uses when assigning a literal or
//! expression result into a struct field or function parameter.
//!
//! Every collection is `Arc<Mutex<_>>` rather than the teacher's
//! `Rc<RefCell<_>>`: Force's actions run as real concurrent tasks
//! across the Tokio multi-thread runtime (spec.md §5), so values that
//! cross an `Action::eval` boundary must be `Send + Sync`.
use std::{
    collections::BTreeMap,
    fmt::Display,
    sync::{Arc, Mutex},
};

use serde::Serialize;

use crate::{action::Action, channel::Channel, errors::ForceError, process::Process};

/// Every script-observable value is carried by this tagged wrapper, so
/// the parser can always distinguish e.g. `Value::String` from a raw
/// host `String` (spec.md §4.1).
#[derive(Clone)]
pub enum Value {
    Void,
    String(String),
    Int(i64),
    Bool(bool),
    Slice(Arc<Mutex<Vec<Value>>>, Type),
    Map(Arc<Mutex<BTreeMap<String, Value>>>, Type),
    Struct(Arc<StructValue>),
    Lambda(Arc<crate::action::lambda::LambdaFunction>),
    Action(Arc<dyn Action>),
    Channel(Arc<dyn Channel>),
    Process(Arc<Process>),
}

/// A struct value: a type name plus its bound fields. `&expr` produces
/// the same representation (spec.md §4.3 address-of); Force has no
/// separate pointer representation, mirroring the "mostly-value"
/// semantics of the host DSL.
pub struct StructValue {
    pub type_name: String,
    pub fields: BTreeMap<String, Value>,
}

impl Value {
    pub fn get_type(&self) -> Type {
        match self {
            Value::Void => Type::Void,
            Value::String(_) => Type::String,
            Value::Int(_) => Type::Int,
            Value::Bool(_) => Type::Bool,
            Value::Slice(_, element) => Type::Slice(Box::new(element.clone())),
            Value::Map(_, element) => Type::Map(Box::new(element.clone())),
            Value::Struct(value) => Type::Struct(value.type_name.clone()),
            Value::Lambda(_) => Type::Func,
            Value::Action(_) => Type::Action,
            Value::Channel(_) => Type::Channel,
            Value::Process(_) => Type::Process,
        }
    }

    pub fn as_str(&self) -> Result<&str, ForceError> {
        match self {
            Value::String(value) => Ok(value.as_str()),
            other => Err(ForceError::bad_parameter(format!(
                "expected a string, found {}",
                other.get_type()
            ))),
        }
    }

    pub fn as_int(&self) -> Result<i64, ForceError> {
        match self {
            Value::Int(value) => Ok(*value),
            other => Err(ForceError::bad_parameter(format!(
                "expected an int, found {}",
                other.get_type()
            ))),
        }
    }

    pub fn as_bool(&self) -> Result<bool, ForceError> {
        match self {
            Value::Bool(value) => Ok(*value),
            other => Err(ForceError::bad_parameter(format!(
                "expected a bool, found {}",
                other.get_type()
            ))),
        }
    }

    /// Truthiness used by `If` (spec.md §4.4): a `Bool` is tested
    /// directly, any other value-bearing expression is truthy unless
    /// it is `Void`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(value) => *value,
            Value::Void => false,
            _ => true,
        }
    }

    pub fn as_struct(&self) -> Result<&Arc<StructValue>, ForceError> {
        match self {
            Value::Struct(value) => Ok(value),
            other => Err(ForceError::bad_parameter(format!(
                "expected a struct, found {}",
                other.get_type()
            ))),
        }
    }

    pub fn as_lambda(&self) -> Result<Arc<crate::action::lambda::LambdaFunction>, ForceError> {
        match self {
            Value::Lambda(value) => Ok(value.clone()),
            other => Err(ForceError::bad_parameter(format!(
                "expected a function, found {}",
                other.get_type()
            ))),
        }
    }

    pub fn as_action(&self) -> Result<Arc<dyn Action>, ForceError> {
        match self {
            Value::Action(value) => Ok(value.clone()),
            Value::Lambda(value) => Ok(Arc::new(crate::action::lambda::LambdaFunctionCall::thunk(
                value.clone(),
            ))),
            other => Err(ForceError::bad_parameter(format!(
                "expected an action, found {}",
                other.get_type()
            ))),
        }
    }

    pub fn as_channel(&self) -> Result<Arc<dyn Channel>, ForceError> {
        match self {
            Value::Channel(value) => Ok(value.clone()),
            other => Err(ForceError::bad_parameter(format!(
                "expected a channel, found {}",
                other.get_type()
            ))),
        }
    }

    /// Struct field access along a selector path (spec.md §4.4 `VarRef`).
    pub fn field(&self, name: &str) -> Result<Value, ForceError> {
        let value = self.as_struct()?;
        value
            .fields
            .get(name)
            .cloned()
            .ok_or_else(|| ForceError::not_found(format!("no field named {name}")))
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Void => f.write_str("void"),
            Value::String(data) => write!(f, "{data:?}"),
            Value::Int(data) => data.fmt(f),
            Value::Bool(data) => data.fmt(f),
            Value::Slice(data, _) => crate::utils::formatting::fmt_collection(
                "[",
                ", ",
                "]",
                data.lock().unwrap().iter(),
                f,
            ),
            Value::Map(data, _) => {
                f.write_str("{")?;
                for (index, (key, item)) in data.lock().unwrap().iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {item}")?;
                }
                f.write_str("}")
            }
            Value::Struct(value) => {
                write!(f, "{}{{", value.type_name)?;
                for (index, (key, item)) in value.fields.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {item}")?;
                }
                f.write_str("}")
            }
            Value::Lambda(_) => f.write_str("<func>"),
            Value::Action(_) => f.write_str("<action>"),
            Value::Channel(_) => f.write_str("<channel>"),
            Value::Process(process) => write!(f, "<process {}>", process.name),
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// Type descriptor, used for struct/slice/map element type checking
/// and the parser's "parent-type hint" (spec.md §4.2) for inferring
/// `_`-typed composite literals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Type {
    Void,
    String,
    Int,
    Bool,
    Slice(Box<Type>),
    Map(Box<Type>),
    Struct(String),
    Func,
    Action,
    Channel,
    Process,
    /// `_`: inferred from context; only legal inside a composite
    /// literal whose expected field/element type is known.
    Inferred,
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Void => f.write_str("void"),
            Type::String => f.write_str("string"),
            Type::Int => f.write_str("int"),
            Type::Bool => f.write_str("bool"),
            Type::Slice(element) => write!(f, "[]{element}"),
            Type::Map(element) => write!(f, "map[string]{element}"),
            Type::Struct(name) => f.write_str(name),
            Type::Func => f.write_str("func"),
            Type::Action => f.write_str("action"),
            Type::Channel => f.write_str("channel"),
            Type::Process => f.write_str("process"),
            Type::Inferred => f.write_str("_"),
        }
    }
}

/// Runtime coercion hook (spec.md §4.1): lets the parser convert an
/// untyped literal or expression result into a wrapper's own
/// representation when assigning into a struct field or function
/// parameter. Conversion failures are reported as `BadParameter`.
pub trait Converter: Send + Sync {
    fn convert(&self, value: Value) -> Result<Value, ForceError>;
}

/// The trivial converter used by scalar struct fields: the value must
/// already carry the expected [`Type`].
pub struct ExactTypeConverter(pub Type);

impl Converter for ExactTypeConverter {
    fn convert(&self, value: Value) -> Result<Value, ForceError> {
        let actual = value.get_type();
        if actual == self.0 || matches!(self.0, Type::Inferred) {
            Ok(value)
        } else {
            Err(ForceError::bad_parameter(format!(
                "cannot assign value of type {actual} into field of type {}",
                self.0
            )))
        }
    }
}
