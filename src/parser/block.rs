//! `{ stmt; stmt; … }` block parsing (spec.md §4.3): the body of a
//! lambda literal or an `if`/`else` arm. Each statement is either the
//! short-assignment form `name := expr` (desugars to [`Define`],
//! spec.md §4.4) or a bare expression evaluated for effect.
//!
//! Generalizes the teacher's `parser/code_blocks.rs` + `parser/statements.rs`
//! split into one module: Force has no separate top-level `func` statement
//! form the teacher's `CodeBlock` tracks alongside `Statement`s (a Force
//! function is always a `func(){}` *expression*), so there is only one
//! kind of block member to collect.
use std::sync::Arc;

use crate::{
    action::{Action, Define, Sequence},
    errors::CodeError,
    lexer::TokenValue,
    scope::ScopeRef,
};

use super::{expect, expressions::parse_expression, TokenStream};

/// Parses a `{ … }` block into a [`Sequence`] (spec.md §4.4 `Sequence`
/// evaluates children in order). The opening `{` is consumed here; the
/// caller has already decided a block is expected at this position.
pub(super) fn parse_block(
    tokens: &mut TokenStream<'_>,
    scope: &ScopeRef,
    file: &str,
    source: &str,
) -> Result<Arc<dyn Action>, CodeError> {
    expect(tokens, file, source, |v| matches!(v, TokenValue::LeftCurly()), "{")?;

    let mut statements = Vec::new();
    loop {
        if let Some(token) = tokens.peek() {
            if matches!(token.value, TokenValue::RightCurly()) {
                tokens.next();
                break;
            }
        } else {
            return Err(super::error_at(
                source.len(),
                file,
                source,
                "unexpected end of file inside block, expected }",
            ));
        }

        statements.push(parse_statement(tokens, scope, file, source)?);
        expect(tokens, file, source, |v| matches!(v, TokenValue::Semicolon()), ";")?;
    }

    Ok(Arc::new(Sequence(statements)))
}

fn parse_statement(
    tokens: &mut TokenStream<'_>,
    scope: &ScopeRef,
    file: &str,
    source: &str,
) -> Result<Arc<dyn Action>, CodeError> {
    if let Some(token) = tokens.peek() {
        if let TokenValue::Identifier(name) = token.value {
            let checkpoint = tokens.checkpoint();
            tokens.next();
            if let Some(TokenValue::Walrus()) = tokens.peek().map(|t| t.value) {
                tokens.next();
                let expr = parse_expression(tokens, scope, file, source)?;
                return Ok(Arc::new(Define::new(name.to_owned(), expr)));
            }
            tokens.backtrack(checkpoint);
        }
    }

    parse_expression(tokens, scope, file, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builtins::CorePlugin, channel::Event, context::ExecutionContext, plugin::register_core,
        utils::iterators::Backtrackable, value::Value,
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

    #[tokio::test]
    async fn parses_a_define_then_a_call() {
        let scope = scope();
        let source = r#"{ x := 1; Log(x); }"#;
        let mut stream = tokens(source);
        let action = parse_block(&mut stream, &scope, "t.frc", source).unwrap();
        let ctx = ExecutionContext::new("p", Event::oneshot(), &CancellationToken::new(), scope.clone());
        let result = action.eval(&ctx, &scope).await.unwrap();
        assert!(matches!(result, Value::Int(1)));
    }

    #[tokio::test]
    async fn requires_a_semicolon_between_statements() {
        let scope = scope();
        let source = r#"{ x := 1 Log(x); }"#;
        let mut stream = tokens(source);
        let result = parse_block(&mut stream, &scope, "t.frc", source);
        assert!(result.is_err());
    }
}
