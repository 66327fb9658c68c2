//! Recursive-descent parser (spec.md §4.3): walks the Go-syntax-subset
//! token stream and produces the Action/Expression graph directly,
//! binding identifiers through `scope` as it goes — plugin-registered
//! `Callable`s and `StructPrototype`s are resolved here, at parse time;
//! local `name := expr` bindings are resolved later, at eval time, by
//! [`crate::action::VarRef`] against the runtime scope `Action::eval`
//! threads (see `action` module docs for why).
//!
//! Generalizes the teacher's `Backtrackable`-driven recursive descent
//! (`parser/expressions.rs`, `parser/statements.rs`,
//! `parser/code_blocks.rs` in the retrieved `nash` source) from a
//! separate AST-then-executor-stack design into one that builds
//! Action nodes directly, matching spec.md §4.3 ("the parser … produces
//! Action/Expression/Process/Channel instances, binding identifiers
//! through scope").
use std::sync::Arc;

use crate::{
    action::Action,
    errors::{CodeError, ForceError},
    lexer::{self, Token, TokenValue},
    scope::ScopeRef,
    utils::iterators::Backtrackable,
};

mod block;
mod expressions;
mod literals;

pub(crate) type TokenStream<'a> = Backtrackable<std::vec::IntoIter<Token<'a>>>;

/// Parses `source` as the single top-level expression spec.md §4.3
/// requires, under `scope` (which must already have the ambient `core`
/// plugin, and any other plugins, registered — see
/// [`crate::plugin::register`]/[`crate::plugin::register_core`]).
pub fn parse_script(file: &str, source: &str, scope: &ScopeRef) -> Result<Arc<dyn Action>, CodeError> {
    let tokens = lexer::lex(source).collect::<Result<Vec<_>, _>>().map_err(|err| {
        let position = err.position.unwrap_or(0);
        CodeError::from(ForceError::from(err)).at(file, position, source)
    })?;

    let mut stream = Backtrackable::new(tokens.into_iter());
    let action = expressions::parse_expression(&mut stream, scope, file, source)?;

    if let Some(trailing) = stream.peek() {
        return Err(error_at(
            trailing.start,
            file,
            source,
            "expected end of file, found a second top-level expression",
        ));
    }

    Ok(action)
}

pub(crate) fn error_at(position: usize, file: &str, source: &str, message: impl Into<String>) -> CodeError {
    CodeError::from(ForceError::bad_parameter(message.into())).at(file, position, source)
}

pub(crate) fn not_found_at(position: usize, file: &str, source: &str, message: impl Into<String>) -> CodeError {
    CodeError::from(ForceError::not_found(message.into())).at(file, position, source)
}

pub(crate) fn peek_position(tokens: &mut TokenStream<'_>, source: &str) -> usize {
    tokens.peek().map(|t| t.start).unwrap_or(source.len())
}

/// Consumes the next token if `matcher` accepts its value, otherwise
/// fails with a source-positioned error naming `expected`.
pub(crate) fn expect<'a>(
    tokens: &mut TokenStream<'a>,
    file: &str,
    source: &str,
    matcher: impl Fn(&TokenValue<'a>) -> bool,
    expected: &str,
) -> Result<Token<'a>, CodeError> {
    let position = peek_position(tokens, source);
    match tokens.next() {
        Some(token) if matcher(&token.value) => Ok(token),
        Some(token) => Err(error_at(
            token.start,
            file,
            source,
            format!("expected {expected}, found {:?}", token.value),
        )),
        None => Err(error_at(
            position,
            file,
            source,
            format!("expected {expected}, found end of file"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builtins::CorePlugin,
        channel::Event,
        context::ExecutionContext,
        plugin::register_core,
        value::Value,
    };
    use tokio_util::sync::CancellationToken;

    fn scope() -> ScopeRef {
        let scope = ScopeRef::root();
        register_core(&scope, &CorePlugin).unwrap();
        scope
    }

    async fn eval(action: &Arc<dyn Action>, scope: &ScopeRef) -> Value {
        let ctx = ExecutionContext::new("test", Event::oneshot(), &CancellationToken::new(), scope.clone());
        action.eval(&ctx, scope).await.unwrap()
    }

    #[tokio::test]
    async fn parses_an_integer_literal() {
        let scope = scope();
        let action = parse_script("t.frc", "1", &scope).unwrap();
        assert!(matches!(eval(&action, &scope).await, Value::Int(1)));
    }

    #[tokio::test]
    async fn parses_a_string_literal() {
        let scope = scope();
        let action = parse_script("t.frc", r#""hello""#, &scope).unwrap();
        assert!(matches!(eval(&action, &scope).await, Value::String(s) if s == "hello"));
    }

    #[tokio::test]
    async fn parses_booleans() {
        let scope = scope();
        let action = parse_script("t.frc", "true", &scope).unwrap();
        assert!(matches!(eval(&action, &scope).await, Value::Bool(true)));
    }

    #[tokio::test]
    async fn parses_a_builtin_call() {
        let scope = scope();
        let action = parse_script("t.frc", r#"Exit(1)"#, &scope).unwrap();
        let ctx = ExecutionContext::new("test", Event::oneshot(), &CancellationToken::new(), scope.clone());
        let result = action.eval(&ctx, &scope).await;
        assert!(matches!(result, Err(ForceError::Exit(1))));
    }

    #[tokio::test]
    async fn parses_an_immediately_invoked_lambda() {
        let scope = scope();
        let action = parse_script("t.frc", r#"func(){ Exit(2); }()"#, &scope).unwrap();
        let ctx = ExecutionContext::new("test", Event::oneshot(), &CancellationToken::new(), scope.clone());
        let result = action.eval(&ctx, &scope).await;
        assert!(matches!(result, Err(ForceError::Exit(2))));
    }

    #[tokio::test]
    async fn parses_define_and_var_ref() {
        let scope = scope();
        let action = parse_script("t.frc", r#"func(){ x := 1; Log(x); }()"#, &scope).unwrap();
        eval(&action, &scope).await;
    }

    #[tokio::test]
    async fn parses_if_else() {
        let scope = scope();
        let action = parse_script("t.frc", r#"if true { Exit(1); } else { Exit(2); }"#, &scope).unwrap();
        let ctx = ExecutionContext::new("test", Event::oneshot(), &CancellationToken::new(), scope.clone());
        let result = action.eval(&ctx, &scope).await;
        assert!(matches!(result, Err(ForceError::Exit(1))));
    }

    #[tokio::test]
    async fn parses_a_process_struct_literal() {
        let scope = scope();
        let action = parse_script(
            "t.frc",
            r#"Process{Name: "p", Watch: Oneshot(), Run: func(){ Log("hi"); }}"#,
            &scope,
        )
        .unwrap();
        let value = eval(&action, &scope).await;
        assert!(matches!(value, Value::Struct(_)));
    }

    #[tokio::test]
    async fn reports_a_source_snippet_on_parse_error() {
        let scope = scope();
        let err = parse_script("t.frc", "NotDefinedAtAll(1)", &scope).unwrap_err();
        assert!(err.snippet.is_some());
    }

    #[tokio::test]
    async fn rejects_redefinition_via_define_syntax() {
        let scope = scope();
        let action = parse_script("t.frc", r#"func(){ x := 1; x := 2; }()"#, &scope).unwrap();
        let ctx = ExecutionContext::new("test", Event::oneshot(), &CancellationToken::new(), scope.clone());
        let result = action.eval(&ctx, &scope).await;
        assert!(matches!(result, Err(ForceError::BadParameter(_))));
    }
}
