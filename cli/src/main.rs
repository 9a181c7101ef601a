use clap::Parser;
use taskflow_cli::commands::{cli, run, validate};
use taskflow_core::error::{CliError, ExecutorError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let mut cfg = match args.config.as_deref() {
        Some(path) => taskflow_core::config::load_from_path(path).map(|mut cfg| {
            taskflow_core::config::apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
            cfg
        }),
        None => taskflow_core::config::load_default(),
    }
    .map_err(|e| CliError::Config(e.to_string()))?;
    args.apply_logging_overrides(&mut cfg.logging);
    init_tracing(&cfg.logging, args.machine_output()).map_err(CliError::Command)?;

    match args.command {
        cli::Commands::Run(run_args) => run::run_cmd(run_args, cfg).await,
        cli::Commands::Validate(validate_args) => validate::validate_cmd(&validate_args),
    }
}

fn exit_code_for_error(e: &CliError) -> i32 {
    // 0: success, 1: task failure, 2: cancelled (returned as normal exit codes)
    // 11: config error
    // 12: invalid workflow graph
    // 20: IO error
    // 50: internal/uncategorized
    match e {
        CliError::Config(_) => 11,
        CliError::Workflow(_) => 12,
        CliError::Executor(ee) => match ee {
            ee if ee.is_validation() => 12,
            ExecutorError::Config(_) => 11,
            ExecutorError::Io(_) => 20,
            _ => 50,
        },
        CliError::Io(_) => 20,
        CliError::Command(_) => 20,
        CliError::Anyhow(_) => 50,
    }
}

/// Console logs go to stderr. With `plain_console` (jsonl runs) they carry no
/// ANSI codes and no targets, so a merged `2>&1` stream stays greppable.
fn init_tracing(
    logging: &taskflow_core::config::LoggingConfig,
    plain_console: bool,
) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("taskflow"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("taskflow.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(!plain_console && atty::is(atty::Stream::Stderr))
            .with_target(!plain_console)
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
