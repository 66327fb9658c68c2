//! The bundled `core` [`Plugin`](crate::plugin::Plugin) (spec.md §8 end
//! to end scenarios): `Command`, `Log`, `Exit`, `Env`, `ExpectEnv`,
//! `ID`, the channel constructors (`Oneshot`, `Ticker`, `Files`,
//! `Duplicate`), and the composite-action call forms (`Sequence`,
//! `Parallel`, `Defer`, `Define`), plus the two runtime Script Loader
//! forms (`Load`, `Reload`, spec.md §4.11 — `Include` is parser syntax
//! and has no `Callable` here, see `parser::expressions::parse_include`)
//! a script invokes as ordinary function calls rather than through
//! parser sugar. Registered under bare names via
//! [`crate::plugin::register_core`], not `core.Name` — every §8
//! scenario calls these unqualified.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::future::join_all;

use crate::{
    action::{Action, Define, DynamicDefine, Parallel, Sequence},
    channel::{duplicate::Duplicate, files::Files, oneshot::Oneshot, ticker::Ticker, Channel},
    context::ExecutionContext,
    errors::ForceError,
    loader::{LoadAction, ReloadAction},
    plugin::{Callable, ConstAction, Plugin},
    scope::ScopeRef,
    value::Value,
};

/// A [`Callable`] whose binding is just arity-checking plus wrapping
/// the parsed argument actions into some other [`Action`]; covers every
/// builtin except the struct/converter surface in [`crate::plugin`].
struct Builtin<F> {
    name: &'static str,
    min_args: usize,
    max_args: Option<usize>,
    build: F,
}

impl<F> Callable for Builtin<F>
where
    F: Fn(Vec<Arc<dyn Action>>) -> Result<Arc<dyn Action>, ForceError> + Send + Sync,
{
    fn name(&self) -> &str {
        self.name
    }

    fn bind(&self, args: Vec<Arc<dyn Action>>) -> Result<Arc<dyn Action>, ForceError> {
        let too_few = args.len() < self.min_args;
        let too_many = self.max_args.is_some_and(|max| args.len() > max);
        if too_few || too_many {
            return Err(ForceError::bad_parameter(format!(
                "{} expected {} argument(s), found {}",
                self.name,
                match self.max_args {
                    Some(max) if max == self.min_args => format!("{max}"),
                    Some(max) => format!("{}..{max}", self.min_args),
                    None => format!("at least {}", self.min_args),
                },
                args.len()
            )));
        }
        (self.build)(args)
    }
}

fn exact<F>(name: &'static str, arity: usize, build: F) -> Arc<dyn Callable>
where
    F: Fn(Vec<Arc<dyn Action>>) -> Result<Arc<dyn Action>, ForceError> + Send + Sync + 'static,
{
    Arc::new(Builtin { name, min_args: arity, max_args: Some(arity), build })
}

fn variadic<F>(name: &'static str, min_args: usize, build: F) -> Arc<dyn Callable>
where
    F: Fn(Vec<Arc<dyn Action>>) -> Result<Arc<dyn Action>, ForceError> + Send + Sync + 'static,
{
    Arc::new(Builtin { name, min_args, max_args: None, build })
}

/// `Command(cmd)` (spec.md §8 S1): runs `cmd` through a shell,
/// inheriting this process's stdio so a script's `Command("echo hi")`
/// is observable on the runner's own stdout. A non-zero exit status is
/// a `BadParameter`-classified failure rather than a panic, matching
/// spec.md §7's "runtime errors inside a handler are logged, the
/// handler returns" policy; the VCS/container/k8s plugins spec.md §1
/// keeps external do their own thing entirely, this is only the bare
/// shell-out every one of §8's scenarios needs.
struct CommandAction(Arc<dyn Action>);

#[async_trait]
impl Action for CommandAction {
    async fn eval(&self, ctx: &ExecutionContext, scope: &ScopeRef) -> Result<Value, ForceError> {
        let command = self.0.eval(ctx, scope).await?.as_str()?.to_owned();
        let status = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .status()
            .await
            .map_err(|err| ForceError::Other(format!("failed to run `{command}`: {err}")))?;
        match status.code() {
            Some(0) | None => Ok(Value::Int(0)),
            Some(code) => Err(ForceError::bad_parameter(format!(
                "`{command}` exited with status {code}"
            ))),
        }
    }
}

/// `Log(value)`: writes through the per-event context logger (spec.md
/// §8 S4, S5).
struct LogAction(Arc<dyn Action>);

#[async_trait]
impl Action for LogAction {
    async fn eval(&self, ctx: &ExecutionContext, scope: &ScopeRef) -> Result<Value, ForceError> {
        let value = self.0.eval(ctx, scope).await?;
        let message = match &value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        ctx.logger.info(&message);
        Ok(value)
    }
}

/// `Exit(code)`: short-circuits the enclosing `Sequence` via
/// `ForceError::Exit`, surfacing `code` as the process's exit status
/// (spec.md §6, §8 S2).
struct ExitAction(Arc<dyn Action>);

#[async_trait]
impl Action for ExitAction {
    async fn eval(&self, ctx: &ExecutionContext, scope: &ScopeRef) -> Result<Value, ForceError> {
        let code = self.0.eval(ctx, scope).await?.as_int()?;
        Err(ForceError::Exit(code))
    }
}

/// `Env(name)`: empty string if unset (spec.md §6).
struct EnvAction(Arc<dyn Action>);

#[async_trait]
impl Action for EnvAction {
    async fn eval(&self, ctx: &ExecutionContext, scope: &ScopeRef) -> Result<Value, ForceError> {
        let name = self.0.eval(ctx, scope).await?.as_str()?.to_owned();
        Ok(Value::from(std::env::var(name).unwrap_or_default()))
    }
}

/// `ExpectEnv(name)`: `NotFound` (a descriptive, classified error) if
/// unset (spec.md §6).
struct ExpectEnvAction(Arc<dyn Action>);

#[async_trait]
impl Action for ExpectEnvAction {
    async fn eval(&self, ctx: &ExecutionContext, scope: &ScopeRef) -> Result<Value, ForceError> {
        let name = self.0.eval(ctx, scope).await?.as_str()?.to_owned();
        std::env::var(&name)
            .map(Value::from)
            .map_err(|_| ForceError::not_found(format!("environment variable {name} is not set")))
    }
}

/// `ID()`: the dispatching context's short random id (spec.md §8 S5).
struct IdAction;

#[async_trait]
impl Action for IdAction {
    async fn eval(&self, ctx: &ExecutionContext, _scope: &ScopeRef) -> Result<Value, ForceError> {
        Ok(Value::from(ctx.id.clone()))
    }
}

/// `Ticker(periodMillis)`: the period is itself evaluated (may be a
/// variable), so construction happens at `eval`, not bind, time.
struct TickerAction(Arc<dyn Action>);

#[async_trait]
impl Action for TickerAction {
    async fn eval(&self, ctx: &ExecutionContext, scope: &ScopeRef) -> Result<Value, ForceError> {
        let millis = self.0.eval(ctx, scope).await?.as_int()?;
        if millis <= 0 {
            return Err(ForceError::bad_parameter("Ticker period must be a positive number of milliseconds"));
        }
        Ok(Value::Channel(Arc::new(Ticker::new(Duration::from_millis(millis as u64)))))
    }
}

/// `Files(globs...)`.
struct FilesAction(Vec<Arc<dyn Action>>);

#[async_trait]
impl Action for FilesAction {
    async fn eval(&self, ctx: &ExecutionContext, scope: &ScopeRef) -> Result<Value, ForceError> {
        let globs = join_all(self.0.iter().map(|arg| arg.eval(ctx, scope))).await;
        let globs = globs
            .into_iter()
            .map(|value| Ok(value?.as_str()?.to_owned()))
            .collect::<Result<Vec<_>, ForceError>>()?;
        Ok(Value::Channel(Arc::new(Files::new(globs))))
    }
}

/// `Duplicate(ch)` (spec.md §4.5): wraps `ch` in one shared [`Duplicate`]
/// and hands back both downstreams at once, as a `Duplicate{Left, Right}`
/// struct, so there is exactly one [`Duplicate`] instance per upstream
/// channel and therefore exactly one call to its `start` — getting both
/// sides from two independent calls would build two wrappers around the
/// same source and start it twice.
struct DuplicateAction(Arc<dyn Action>);

#[async_trait]
impl Action for DuplicateAction {
    async fn eval(&self, ctx: &ExecutionContext, scope: &ScopeRef) -> Result<Value, ForceError> {
        let source = self.0.eval(ctx, scope).await?.as_channel()?;
        let duplicate = Arc::new(Duplicate::new(source));
        let mut fields = std::collections::BTreeMap::new();
        fields.insert("Left".to_owned(), Value::Channel(duplicate.this_side()));
        fields.insert("Right".to_owned(), Value::Channel(duplicate.other_side()));
        Ok(Value::Struct(Arc::new(crate::value::StructValue {
            type_name: "Duplicate".to_owned(),
            fields,
        })))
    }
}

/// The ambient `core` plugin (spec.md §8's `Command`/`Log`/`Exit`/
/// `Env`/`ExpectEnv`/`ID`, the channel constructors, and the
/// `Sequence`/`Parallel`/`Defer`/`Define` call forms).
pub struct CorePlugin;

impl Plugin for CorePlugin {
    fn key(&self) -> &str {
        "core"
    }

    fn functions(&self) -> Vec<Arc<dyn Callable>> {
        vec![
            exact("Command", 1, |mut args| Ok(Arc::new(CommandAction(args.remove(0))))),
            exact("Log", 1, |mut args| Ok(Arc::new(LogAction(args.remove(0))))),
            exact("Exit", 1, |mut args| Ok(Arc::new(ExitAction(args.remove(0))))),
            exact("Env", 1, |mut args| Ok(Arc::new(EnvAction(args.remove(0))))),
            exact("ExpectEnv", 1, |mut args| Ok(Arc::new(ExpectEnvAction(args.remove(0))))),
            exact("ID", 0, |_| Ok(Arc::new(IdAction))),
            exact("Oneshot", 0, |_| {
                Ok(Arc::new(ConstAction(Value::Channel(Arc::new(Oneshot::new())))))
            }),
            exact("Ticker", 1, |mut args| Ok(Arc::new(TickerAction(args.remove(0))))),
            variadic("Files", 1, |args| Ok(Arc::new(FilesAction(args)))),
            exact("Duplicate", 1, |mut args| Ok(Arc::new(DuplicateAction(args.remove(0))))),
            variadic("Sequence", 0, |args| Ok(Arc::new(Sequence(args)))),
            variadic("Parallel", 0, |args| Ok(Arc::new(Parallel(args)))),
            exact("Defer", 1, |mut args| Ok(Arc::new(crate::action::Defer(args.remove(0))))),
            exact("Load", 1, |mut args| Ok(Arc::new(LoadAction(args.remove(0))))),
            exact("Reload", 1, |mut args| Ok(Arc::new(ReloadAction(args.remove(0))))),
            exact("Define", 2, |mut args| {
                let expr = args.remove(1);
                let name = args.remove(0);
                Ok(Arc::new(DynamicDefine::new(name, expr)))
            }),
        ]
    }

    fn prototypes(&self) -> Vec<Arc<crate::plugin::StructPrototype>> {
        vec![Arc::new(process_prototype())]
    }
}

/// `Process{Name: "...", Watch: <channel>, Run: func(){ ... }}`
/// (spec.md §3 Process, §8 S5). `Run` accepts a bare function literal
/// and coerces it into an [`Value::Action`] through
/// [`Value::as_action`].
fn process_prototype() -> crate::plugin::StructPrototype {
    use crate::{
        plugin::StructField,
        value::{Converter, Type},
    };

    struct ActionConverter;
    impl Converter for ActionConverter {
        fn convert(&self, value: Value) -> Result<Value, ForceError> {
            Ok(Value::Action(value.as_action()?))
        }
    }

    crate::plugin::StructPrototype {
        type_name: "Process".into(),
        fields: vec![
            StructField {
                name: "Name".into(),
                field_type: Type::String,
                converter: Arc::new(crate::value::ExactTypeConverter(Type::String)),
                required: true,
            },
            StructField {
                name: "Watch".into(),
                field_type: Type::Channel,
                converter: Arc::new(crate::value::ExactTypeConverter(Type::Channel)),
                required: true,
            },
            StructField {
                name: "Run".into(),
                field_type: Type::Action,
                converter: Arc::new(ActionConverter),
                required: true,
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        action::Literal,
        channel::Event,
        scope::{Definition, ScopeRef},
    };
    use tokio_util::sync::CancellationToken;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("p", Event::oneshot(), &CancellationToken::new(), ScopeRef::root())
    }

    #[tokio::test]
    async fn exit_short_circuits_with_the_given_code() {
        let action = ExitAction(Arc::new(Literal(Value::Int(7))));
        let result = action.eval(&ctx(), &ScopeRef::root()).await;
        assert!(matches!(result, Err(ForceError::Exit(7))));
    }

    #[tokio::test]
    async fn env_returns_empty_string_when_unset() {
        std::env::remove_var("FORCE_BUILTIN_TEST_UNSET");
        let action = EnvAction(Arc::new(Literal(Value::from("FORCE_BUILTIN_TEST_UNSET"))));
        let result = action.eval(&ctx(), &ScopeRef::root()).await.unwrap();
        assert!(matches!(result, Value::String(s) if s.is_empty()));
    }

    #[tokio::test]
    async fn expect_env_fails_when_unset() {
        std::env::remove_var("FORCE_BUILTIN_TEST_UNSET");
        let action = ExpectEnvAction(Arc::new(Literal(Value::from("FORCE_BUILTIN_TEST_UNSET"))));
        let result = action.eval(&ctx(), &ScopeRef::root()).await;
        assert!(matches!(result, Err(ForceError::NotFound(_))));
    }

    #[tokio::test]
    async fn process_prototype_coerces_a_lambda_into_run() {
        use crate::action::{lambda::LambdaFunction, Sequence};

        let lambda = Value::Lambda(Arc::new(LambdaFunction {
            closure: ScopeRef::root(),
            params: vec![],
            body: Arc::new(Sequence(vec![])),
        }));
        let mut fields = std::collections::BTreeMap::new();
        fields.insert("Name".to_owned(), Value::from("p"));
        fields.insert("Watch".to_owned(), Value::Channel(Arc::new(Oneshot::new())));
        fields.insert("Run".to_owned(), lambda);

        let value = process_prototype().construct(fields).unwrap();
        assert!(matches!(value, Value::Struct(_)));
    }

    #[tokio::test]
    async fn duplicate_returns_both_sides_as_struct_fields() {
        let action = DuplicateAction(Arc::new(Literal(Value::Channel(Arc::new(Oneshot::new())))));
        let value = action.eval(&ctx(), &ScopeRef::root()).await.unwrap();
        let fields = value.as_struct().unwrap();
        assert!(matches!(fields.fields.get("Left"), Some(Value::Channel(_))));
        assert!(matches!(fields.fields.get("Right"), Some(Value::Channel(_))));
    }

    #[tokio::test]
    async fn duplicate_sides_both_observe_the_one_upstream_emission() {
        let action = DuplicateAction(Arc::new(Literal(Value::Channel(Arc::new(Oneshot::new())))));
        let value = action.eval(&ctx(), &ScopeRef::root()).await.unwrap();
        let fields = &value.as_struct().unwrap().fields;
        let left = fields.get("Left").unwrap().as_channel().unwrap();
        let right = fields.get("Right").unwrap().as_channel().unwrap();

        let mut left_events = left.subscribe();
        let mut right_events = right.subscribe();
        left.start(CancellationToken::new()).await.unwrap();
        right.start(CancellationToken::new()).await.unwrap();

        assert!(left_events.recv().await.is_ok());
        assert!(right_events.recv().await.is_ok());
    }

    #[tokio::test]
    async fn core_plugin_registers_every_builtin_under_a_bare_name() {
        let scope = ScopeRef::root();
        crate::plugin::register_core(&scope, &CorePlugin).unwrap();
        for name in ["Command", "Log", "Exit", "Env", "ExpectEnv", "ID", "Sequence", "Define"] {
            assert!(matches!(scope.lookup(name), Some(Definition::Callable(_))), "missing {name}");
        }
        assert!(matches!(scope.lookup("Process"), Some(Definition::Prototype(_))));
    }
}
