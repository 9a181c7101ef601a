use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use taskflow_core::config::LoggingConfig;

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Jsonl,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Jsonl => "jsonl",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "taskflow", version, about = "Run dependency-ordered AI workflows")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to use instead of ~/.taskflow/config.toml / ./taskflow.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter overriding logging.level, e.g. "debug" or "taskflow_core=trace"
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

impl Args {
    pub fn apply_logging_overrides(&self, logging: &mut LoggingConfig) {
        if let Some(level) = self.log_level.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            logging.level = level.to_string();
        }
    }

    /// Stdout carries JSON lines; console logs must stay plain text on stderr.
    pub fn machine_output(&self) -> bool {
        matches!(&self.command, Commands::Run(run) if run.format == OutputFormat::Jsonl)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a workflow file
    Run(RunArgs),
    /// Check a workflow file without running it
    Validate(ValidateArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Workflow JSON file: {"nodes": [...], "edges": [...]}
    #[arg(long, short = 'w')]
    pub workflow: PathBuf,

    /// Override executor.max_concurrent_tasks
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Progress event format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Draw progress bars (text format only)
    #[arg(long)]
    pub progress: bool,

    /// Override executor.task_timeout_ms (0 disables the deadline)
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Restrict text output to ASCII status words
    #[arg(long)]
    pub ascii: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ValidateArgs {
    #[arg(long, short = 'w')]
    pub workflow: PathBuf,
}
