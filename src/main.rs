//! CLI front-end (spec.md §6): a thin wrapper over [`force::Engine`]'s
//! `Setup`/`Run` entry points. `Watch` has no separate CLI flag since
//! every script that wants to keep running binds its own channel
//! through a `Process{Watch: …}` literal (spec.md §4.6); the CLI only
//! decides *which* scripts to parse and in what order.
use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use force::{CodeError, Engine};

/// Run a Force script (spec.md §1, §6).
#[derive(Parser)]
#[command(name = "force", version, about = "A small CI/CD automation engine")]
struct Cli {
    /// One or more scripts to run through `Setup` before `script`,
    /// in order (spec.md §6 `Setup(actions…)`).
    #[arg(long = "setup", value_name = "FILE")]
    setup: Vec<PathBuf>,

    /// The script to run in the foreground, or whose `Process{}` keeps
    /// this invocation alive until an `ExitEvent` (spec.md §6 `Run`).
    script: PathBuf,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start the async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<i32, CodeError> {
    let engine = Engine::new();

    let mut setup_sources = Vec::with_capacity(cli.setup.len());
    for path in &cli.setup {
        let source = read_script(path)?;
        setup_sources.push((path.display().to_string(), source));
    }
    engine.setup(&setup_sources).await?;

    let script_source = read_script(&cli.script)?;
    engine
        .run(&cli.script.display().to_string(), &script_source)
        .await
}

fn read_script(path: &PathBuf) -> Result<String, CodeError> {
    std::fs::read_to_string(path)
        .map_err(|err| CodeError::from(format!("cannot read {}: {err}", path.display())))
}
