//! Recursive-descent expression parser (spec.md §4.3): every recognized
//! expression form — literals, composite struct/slice literals, function
//! calls, the address-of unary, selector chains, and function literals —
//! lives here, each producing an [`Action`] directly rather than an
//! intermediate AST node (see module-level docs on `action` for why).
//!
//! Force has no arithmetic/comparison operators (spec.md §6: "Arithmetic,
//! comparison, and control statements beyond `if` are not supported"), so
//! unlike the teacher's `parser/expressions.rs` (which loops consuming
//! `parse_operator` between operands), there is exactly one level of
//! expression: a primary expression, with no operator-precedence climbing.
use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;

use tokio_util::sync::CancellationToken;

use crate::{
    action::{Action, If, LambdaFunctionCall, LambdaLiteral, Literal, VarRef},
    channel::Event,
    constants::{ELSE, FALSE, FUNC, IF, INCLUDE, TRUE, UNDERSCORE},
    context::ExecutionContext,
    errors::{CodeError, ForceError},
    lexer::TokenValue,
    plugin::{Callable, StructPrototype},
    scope::{Definition, ScopeRef},
    value::{Converter, ExactTypeConverter, Type, Value},
};

use super::{error_at, expect, literals, not_found_at, peek_position, TokenStream};

pub(crate) fn parse_expression(
    tokens: &mut TokenStream<'_>,
    scope: &ScopeRef,
    file: &str,
    source: &str,
) -> Result<Arc<dyn Action>, CodeError> {
    let position = peek_position(tokens, source);
    let token = tokens
        .next()
        .ok_or_else(|| error_at(position, file, source, "expected an expression, found end of file"))?;

    match token.value {
        TokenValue::IntegerLiteral(_) => {
            let value = literals::parse_integer_literal(&token, file, source)?;
            Ok(Arc::new(Literal(Value::Int(value))))
        }
        TokenValue::DoubleQuote() => {
            let value = literals::parse_string_literal(tokens, file, source)?;
            Ok(Arc::new(Literal(Value::from(value))))
        }
        TokenValue::Keyword(TRUE) => Ok(Arc::new(Literal(Value::Bool(true)))),
        TokenValue::Keyword(FALSE) => Ok(Arc::new(Literal(Value::Bool(false)))),
        // `&expr` (spec.md §4.3 address-of): Force's `Value` has no separate
        // pointer representation (see `value::StructValue` docs), so this
        // is transparent at the action-tree level.
        TokenValue::Ampersand() => parse_expression(tokens, scope, file, source),
        TokenValue::Keyword(FUNC) => parse_lambda(tokens, scope, file, source),
        TokenValue::Keyword(IF) => parse_if(tokens, scope, file, source),
        TokenValue::Identifier(name) => parse_identifier_expression(tokens, scope, file, source, name, token.start),
        TokenValue::LeftSquare() => parse_slice_literal(tokens, scope, file, source, token.start),
        other => Err(error_at(
            token.start,
            file,
            source,
            format!("unexpected {other:?}, expected an expression"),
        )),
    }
}

/// Collects a selector chain `a.b.c` starting from an already-consumed
/// leading identifier, then dispatches on what follows it: `(` means a
/// function call (spec.md §4.3 "Name may be plain, plugin-qualified");
/// `{` means a composite struct literal; anything else is a bare
/// [`VarRef`] (spec.md §4.3 "selector chains … desugar into `Var(…)`").
fn parse_identifier_expression(
    tokens: &mut TokenStream<'_>,
    scope: &ScopeRef,
    file: &str,
    source: &str,
    first: &str,
    start: usize,
) -> Result<Arc<dyn Action>, CodeError> {
    let mut segments = vec![first.to_owned()];
    while let Some(token) = tokens.peek() {
        if !matches!(token.value, TokenValue::Dot()) {
            break;
        }
        tokens.next();
        let segment = expect(tokens, file, source, |v| matches!(v, TokenValue::Identifier(_)), "an identifier after .")?;
        let TokenValue::Identifier(segment) = segment.value else {
            unreachable!()
        };
        segments.push(segment.to_owned());
    }

    match tokens.peek().map(|t| t.value) {
        Some(TokenValue::LeftBracket()) => {
            tokens.next();
            // `Include` is parser syntax, not a registered `Callable`
            // (spec.md §4.11): it must parse and evaluate its target
            // file immediately, against this same in-progress scope,
            // before the rest of the current parse continues.
            if segments.len() == 1 && segments[0] == INCLUDE {
                return parse_include(tokens, scope, file, source, start);
            }
            let args = parse_call_args(tokens, scope, file, source)?;
            build_call(scope, segments, args, start, file, source)
        }
        Some(TokenValue::LeftCurly()) => parse_struct_literal(tokens, scope, file, source, segments, start),
        _ => {
            let mut segments = segments;
            let name = segments.remove(0);
            Ok(Arc::new(VarRef::new(name, segments)))
        }
    }
}

/// Resolves a call's target name against the parser's (plugin-populated)
/// scope. A hit means a builtin/plugin [`Callable`]; a miss falls back to
/// treating the name as a local variable holding a lambda (spec.md §4.3:
/// "converted into a list of `Define` statements and wrapped in a
/// `LambdaFunctionCall` for lambdas").
fn build_call(
    scope: &ScopeRef,
    segments: Vec<String>,
    args: Vec<Arc<dyn Action>>,
    start: usize,
    file: &str,
    source: &str,
) -> Result<Arc<dyn Action>, CodeError> {
    let joined = segments.join(".");
    match scope.lookup(&joined) {
        Some(Definition::Callable(callable)) => callable
            .bind(args)
            .map_err(|err| CodeError::from(err).at(file, start, source)),
        Some(Definition::Prototype(_)) => {
            Err(error_at(start, file, source, format!("{joined} is a type, not a function")))
        }
        Some(Definition::Value(_)) | None => {
            let mut segments = segments;
            let name = segments.remove(0);
            let callee: Arc<dyn Action> = Arc::new(VarRef::new(name, segments));
            Ok(Arc::new(LambdaFunctionCall::new(callee, args)))
        }
    }
}

fn parse_call_args(
    tokens: &mut TokenStream<'_>,
    scope: &ScopeRef,
    file: &str,
    source: &str,
) -> Result<Vec<Arc<dyn Action>>, CodeError> {
    let mut args = Vec::new();
    if let Some(token) = tokens.peek() {
        if matches!(token.value, TokenValue::RightBracket()) {
            tokens.next();
            return Ok(args);
        }
    } else {
        return Err(error_at(source.len(), file, source, "unexpected end of file in argument list"));
    }

    loop {
        args.push(parse_expression(tokens, scope, file, source)?);
        let separator = expect(
            tokens,
            file,
            source,
            |v| matches!(v, TokenValue::RightBracket() | TokenValue::Comma()),
            ", or )",
        )?;
        if matches!(separator.value, TokenValue::RightBracket()) {
            break;
        }
        if let Some(next) = tokens.peek() {
            if matches!(next.value, TokenValue::RightBracket()) {
                tokens.next();
                break;
            }
        }
    }
    Ok(args)
}

/// `Include(paths…)` (spec.md §4.11): reads, parses, and evaluates each
/// path's script immediately, against `scope` — the same scope the
/// rest of this parse uses — so any top-level `Define`s or plugin
/// registrations it makes are visible to whatever follows in the
/// including script. Resolves to a no-op action at runtime, since all
/// of its effect already happened at parse time.
fn parse_include(
    tokens: &mut TokenStream<'_>,
    scope: &ScopeRef,
    file: &str,
    source: &str,
    start: usize,
) -> Result<Arc<dyn Action>, CodeError> {
    let args = parse_call_args(tokens, scope, file, source)?;
    for arg in args {
        let value = eval_at_parse_time(&arg, scope)
            .map_err(|err| CodeError::from(err).at(file, start, source))?;
        let path = value
            .as_str()
            .map_err(|err| CodeError::from(err).at(file, start, source))?
            .to_owned();

        let included_source = std::fs::read_to_string(&path)
            .map_err(|err| error_at(start, file, source, format!("cannot read {path}: {err}")))?;
        let included_action = super::parse_script(&path, &included_source, scope)?;
        eval_at_parse_time(&included_action, scope)
            .map_err(|err| CodeError::from(err).at(file, start, source))?;
    }
    Ok(Arc::new(Literal(Value::Void)))
}

/// Runs `action` to completion right now, on whatever thread is
/// parsing, rather than deferring to the eventual dispatch (`Include`'s
/// only caller). `futures::executor::block_on` rather than
/// `tokio::runtime::Handle::block_on`: parsing is synchronous and may
/// happen before any Tokio runtime exists, or on a thread already
/// driving one — `block_on` from `futures` needs neither.
fn eval_at_parse_time(action: &Arc<dyn Action>, scope: &ScopeRef) -> Result<Value, ForceError> {
    let ctx = ExecutionContext::new("include", Event::oneshot(), &CancellationToken::new(), scope.clone());
    futures::executor::block_on(action.eval(&ctx, scope))
}

/// `func(params…){ stmts }` (spec.md §4.3). An immediately trailing `(`
/// makes this an invoked lambda (`func(){ … }()`, spec.md §8 S1/S2):
/// that second call is parsed the same way any other call site is.
fn parse_lambda(
    tokens: &mut TokenStream<'_>,
    scope: &ScopeRef,
    file: &str,
    source: &str,
) -> Result<Arc<dyn Action>, CodeError> {
    expect(tokens, file, source, |v| matches!(v, TokenValue::LeftBracket()), "(")?;

    let mut params = Vec::new();
    match tokens.peek() {
        Some(token) if matches!(token.value, TokenValue::RightBracket()) => {
            tokens.next();
        }
        Some(_) => loop {
            let token = expect(tokens, file, source, |v| matches!(v, TokenValue::Identifier(_)), "a parameter name")?;
            let TokenValue::Identifier(name) = token.value else {
                unreachable!()
            };
            params.push(name.to_owned());
            let separator = expect(
                tokens,
                file,
                source,
                |v| matches!(v, TokenValue::RightBracket() | TokenValue::Comma()),
                ", or )",
            )?;
            if matches!(separator.value, TokenValue::RightBracket()) {
                break;
            }
        },
        None => return Err(error_at(source.len(), file, source, "unexpected end of file in function parameters")),
    }

    let body = super::block::parse_block(tokens, scope, file, source)?;
    let literal: Arc<dyn Action> = Arc::new(LambdaLiteral { params, body });

    if let Some(token) = tokens.peek() {
        if matches!(token.value, TokenValue::LeftBracket()) {
            tokens.next();
            let args = parse_call_args(tokens, scope, file, source)?;
            return Ok(Arc::new(LambdaFunctionCall::new(literal, args)));
        }
    }
    Ok(literal)
}

/// `if predicate { … } else { … }` / `if predicate { … } else if … ` (spec.md §4.4 `If`).
fn parse_if(
    tokens: &mut TokenStream<'_>,
    scope: &ScopeRef,
    file: &str,
    source: &str,
) -> Result<Arc<dyn Action>, CodeError> {
    let predicate = parse_expression(tokens, scope, file, source)?;
    let then_branch = super::block::parse_block(tokens, scope, file, source)?;

    let else_branch = match tokens.peek() {
        Some(token) if matches!(token.value, TokenValue::Keyword(ELSE)) => {
            tokens.next();
            match tokens.peek() {
                Some(next) if matches!(next.value, TokenValue::Keyword(IF)) => {
                    tokens.next();
                    Some(parse_if(tokens, scope, file, source)?)
                }
                Some(_) => Some(super::block::parse_block(tokens, scope, file, source)?),
                None => {
                    return Err(error_at(source.len(), file, source, "expected { or if after else"))
                }
            }
        }
        _ => None,
    };

    Ok(Arc::new(If { predicate, then_branch, else_branch }))
}

/// `Type{Field: expr, …}` (spec.md §4.3). `Type` is looked up in `scope`
/// as a [`StructPrototype`]; `_` infers it from the enclosing composite
/// literal's expected field type (spec.md §4.2 parent-type hint).
fn parse_struct_literal(
    tokens: &mut TokenStream<'_>,
    scope: &ScopeRef,
    file: &str,
    source: &str,
    segments: Vec<String>,
    start: usize,
) -> Result<Arc<dyn Action>, CodeError> {
    let type_name = if segments.len() == 1 && segments[0] == UNDERSCORE {
        match scope.type_hint() {
            Some(Type::Struct(name)) => name,
            _ => return Err(error_at(start, file, source, "cannot infer struct type of _ here")),
        }
    } else {
        segments.join(".")
    };

    let prototype = match scope.lookup(&type_name) {
        Some(Definition::Prototype(prototype)) => prototype,
        Some(_) => return Err(error_at(start, file, source, format!("{type_name} is not a struct type"))),
        None => return Err(not_found_at(start, file, source, format!("no struct type named {type_name}"))),
    };

    expect(tokens, file, source, |v| matches!(v, TokenValue::LeftCurly()), "{")?;

    let mut fields = Vec::new();
    match tokens.peek() {
        Some(token) if matches!(token.value, TokenValue::RightCurly()) => {
            tokens.next();
        }
        Some(_) => loop {
            let name_token = expect(tokens, file, source, |v| matches!(v, TokenValue::Identifier(_)), "a field name")?;
            let TokenValue::Identifier(field_name) = name_token.value else {
                unreachable!()
            };
            expect(tokens, file, source, |v| matches!(v, TokenValue::Colon()), ":")?;

            let field_scope = match prototype.field(field_name) {
                Some(field) => scope.child_with_type_hint(field.field_type.clone()),
                None => scope.child(),
            };
            let value = parse_expression(tokens, &field_scope, file, source)?;
            fields.push((field_name.to_owned(), value));

            let separator = expect(
                tokens,
                file,
                source,
                |v| matches!(v, TokenValue::RightCurly() | TokenValue::Comma()),
                ", or }",
            )?;
            if matches!(separator.value, TokenValue::RightCurly()) {
                break;
            }
            if let Some(next) = tokens.peek() {
                if matches!(next.value, TokenValue::RightCurly()) {
                    tokens.next();
                    break;
                }
            }
        },
        None => return Err(error_at(source.len(), file, source, "unexpected end of file in struct literal")),
    }

    Ok(Arc::new(StructLiteral { prototype, fields }))
}

struct StructLiteral {
    prototype: Arc<StructPrototype>,
    fields: Vec<(String, Arc<dyn Action>)>,
}

#[async_trait]
impl Action for StructLiteral {
    async fn eval(&self, ctx: &ExecutionContext, scope: &ScopeRef) -> Result<Value, ForceError> {
        let mut values = BTreeMap::new();
        for (name, expr) in &self.fields {
            values.insert(name.clone(), expr.eval(ctx, scope).await?);
        }
        self.prototype.construct(values)
    }
}

/// `[]Type{elem, …}` (spec.md §4.3). `Type` is either a scalar wrapper
/// name (`String`/`Int`/`Bool`), a struct type name, or `_` inferred
/// from the enclosing slice-typed field's element type.
fn parse_slice_literal(
    tokens: &mut TokenStream<'_>,
    scope: &ScopeRef,
    file: &str,
    source: &str,
    start: usize,
) -> Result<Arc<dyn Action>, CodeError> {
    expect(tokens, file, source, |v| matches!(v, TokenValue::RightSquare()), "]")?;
    let type_token = expect(tokens, file, source, |v| matches!(v, TokenValue::Identifier(_)), "a slice element type")?;
    let TokenValue::Identifier(type_name) = type_token.value else {
        unreachable!()
    };

    let element_type = if type_name == UNDERSCORE {
        match scope.type_hint() {
            Some(Type::Slice(inner)) => *inner,
            _ => return Err(error_at(type_token.start, file, source, "cannot infer slice element type here")),
        }
    } else {
        scalar_type(type_name).unwrap_or_else(|| Type::Struct(type_name.to_owned()))
    };

    expect(tokens, file, source, |v| matches!(v, TokenValue::LeftCurly()), "{")?;
    let element_scope = scope.child_with_type_hint(element_type.clone());

    let mut elements = Vec::new();
    match tokens.peek() {
        Some(token) if matches!(token.value, TokenValue::RightCurly()) => {
            tokens.next();
        }
        Some(_) => loop {
            elements.push(parse_expression(tokens, &element_scope, file, source)?);
            let separator = expect(
                tokens,
                file,
                source,
                |v| matches!(v, TokenValue::RightCurly() | TokenValue::Comma()),
                ", or }",
            )?;
            if matches!(separator.value, TokenValue::RightCurly()) {
                break;
            }
            if let Some(next) = tokens.peek() {
                if matches!(next.value, TokenValue::RightCurly()) {
                    tokens.next();
                    break;
                }
            }
        },
        None => return Err(error_at(source.len(), file, source, "unexpected end of file in slice literal")),
    }

    Ok(Arc::new(SliceLiteral { element_type, elements }))
}

fn scalar_type(name: &str) -> Option<Type> {
    match name {
        "String" => Some(Type::String),
        "Int" => Some(Type::Int),
        "Bool" => Some(Type::Bool),
        _ => None,
    }
}

struct SliceLiteral {
    element_type: Type,
    elements: Vec<Arc<dyn Action>>,
}

#[async_trait]
impl Action for SliceLiteral {
    async fn eval(&self, ctx: &ExecutionContext, scope: &ScopeRef) -> Result<Value, ForceError> {
        let converter = ExactTypeConverter(self.element_type.clone());
        let mut values = Vec::with_capacity(self.elements.len());
        for element in &self.elements {
            let value = element.eval(ctx, scope).await?;
            values.push(converter.convert(value)?);
        }
        Ok(Value::Slice(
            Arc::new(std::sync::Mutex::new(values)),
            self.element_type.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builtins::CorePlugin, channel::Event, context::ExecutionContext, plugin::register_core,
        utils::iterators::Backtrackable,
    };
    use tokio_util::sync::CancellationToken;

    fn scope() -> ScopeRef {
        let scope = ScopeRef::root();
        register_core(&scope, &CorePlugin).unwrap();
        scope
    }

    fn tokens(source: &str) -> TokenStream<'_> {
        let tokens = crate::lexer::lex(source).collect::<Result<Vec<_>, _>>().unwrap();
        Backtrackable::new(tokens.into_iter())
    }

    async fn eval(action: &Arc<dyn Action>, scope: &ScopeRef) -> Value {
        let ctx = ExecutionContext::new("t", Event::oneshot(), &CancellationToken::new(), scope.clone());
        action.eval(&ctx, scope).await.unwrap()
    }

    #[tokio::test]
    async fn parses_a_slice_literal_of_strings() {
        let scope = scope();
        let source = r#"[]String{"a", "b", "c"}"#;
        let mut stream = tokens(source);
        let action = parse_expression(&mut stream, &scope, "t.frc", source).unwrap();
        let value = eval(&action, &scope).await;
        match value {
            Value::Slice(items, Type::String) => assert_eq!(items.lock().unwrap().len(), 3),
            other => panic!("expected a string slice, got {other}"),
        }
    }

    #[tokio::test]
    async fn rejects_a_slice_element_of_the_wrong_type() {
        let scope = scope();
        let source = r#"[]String{1}"#;
        let mut stream = tokens(source);
        let action = parse_expression(&mut stream, &scope, "t.frc", source).unwrap();
        let ctx = ExecutionContext::new("t", Event::oneshot(), &CancellationToken::new(), scope.clone());
        assert!(action.eval(&ctx, &scope).await.is_err());
    }

    #[tokio::test]
    async fn a_call_to_an_unknown_name_falls_back_to_a_local_lambda() {
        let scope = scope();
        let source = r#"func(){ greet := func(){ Exit(3); }; greet(); }()"#;
        let mut stream = tokens(source);
        let action = parse_expression(&mut stream, &scope, "t.frc", source).unwrap();
        let ctx = ExecutionContext::new("t", Event::oneshot(), &CancellationToken::new(), scope.clone());
        let result = action.eval(&ctx, &scope).await;
        assert!(matches!(result, Err(ForceError::Exit(3))));
    }

    #[tokio::test]
    async fn reports_not_found_for_an_unknown_struct_type() {
        let scope = scope();
        let source = r#"NoSuchType{}"#;
        let mut stream = tokens(source);
        let err = parse_expression(&mut stream, &scope, "t.frc", source).unwrap_err();
        assert!(matches!(err.error, ForceError::NotFound(_)));
    }
}
