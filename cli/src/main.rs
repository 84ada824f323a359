//! gather CLI - run shell commands as one job group.
//!
//! ```text
//! main() -> Cli::try_parse -> GatherConfig::load -> JobGroup::run -> print in submission order
//! ```
//!
//! Settings come from the config file and are overridden by flags. The
//! execution report goes to `tracing` at the configured level, or straight to
//! stderr with `--report`.

mod args;
mod command;

use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use gather_config::{ConfigError, GatherConfig};
use gather_core::{
    GroupSettings, HumanDuration, JobGroup, MemorySink, NotFoundError, SettingsError,
    TimeoutError, TraceSink, TracingSink, Unit,
};

use args::Cli;
use command::CommandError;

const EXIT_FAILED: u8 = 1;
const EXIT_TIMEOUT: u8 = 2;
const EXIT_USAGE: u8 = 64;
const EXIT_CONFIG: u8 = 78;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    // stdout carries command output; logs go to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<GatherConfig, ConfigError> {
    let loaded = match path {
        Some(path) => GatherConfig::load_from(path)?,
        None => GatherConfig::load()?,
    };
    Ok(loaded.unwrap_or_default())
}

/// Fold command-line overrides over the settings from the config file.
fn resolve_settings(base: GroupSettings, cli: &Cli) -> Result<GroupSettings, SettingsError> {
    let mut settings = base;
    if let Some(deadline) = cli.deadline {
        settings = settings.with_deadline(deadline)?;
    }
    if let Some(long_threshold) = cli.long_threshold {
        settings = settings.with_long_threshold(long_threshold);
    }
    Ok(settings)
}

/// Exit status for a finished run: timeout wins over unit failures.
fn exit_code(
    status: &Result<(), TimeoutError>,
    errors: &[Result<Option<&CommandError>, NotFoundError>],
) -> u8 {
    if status.is_err() {
        EXIT_TIMEOUT
    } else if errors.iter().any(|e| matches!(e, Ok(Some(_)))) {
        EXIT_FAILED
    } else {
        0
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Help and version go to stdout and are not failures.
            err.print().context("failed to print usage")?;
            let code = if err.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
            return Ok(code);
        }
    };

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("gather: {err}");
            return Ok(ExitCode::from(EXIT_CONFIG));
        }
    };
    let settings = match resolve_settings(config.settings(), &cli) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("gather: {err}\n\n{}", Cli::command().render_usage());
            return Ok(ExitCode::from(EXIT_USAGE));
        }
    };

    let memory = Arc::new(MemorySink::new());
    let sink: Arc<dyn TraceSink> = if cli.report {
        memory.clone()
    } else {
        Arc::new(TracingSink::new(config.trace_level()))
    };

    let mut group: JobGroup<String, CommandError> = JobGroup::with_settings(settings)
        .with_sink(sink)
        .with_label("gather");
    group.extend(
        cli.commands
            .iter()
            .cloned()
            .map(|cmd| Unit::future(command::run_shell(cmd))),
    );

    tracing::info!(
        commands = cli.commands.len(),
        deadline_ms = settings.deadline().as_millis() as u64,
        trace_level = %config.trace_level(),
        "Running commands"
    );
    let status = group.run().await;

    let mut out = io::stdout().lock();
    for (index, (cmd, result)) in cli.commands.iter().zip(group.results()).enumerate() {
        let elapsed = group.elapsed(index).map(HumanDuration).ok();
        match (result, elapsed) {
            (Ok(Ok(stdout)), Some(elapsed)) => {
                writeln!(out, "[{index}] ok ({elapsed}) {cmd}")?;
                out.write_all(stdout.as_bytes())?;
            }
            (Ok(Err(err)), Some(elapsed)) => {
                writeln!(out, "[{index}] failed ({elapsed}) {cmd}: {err}")?;
            }
            _ => writeln!(out, "[{index}] timeout {cmd}")?,
        }
    }
    out.flush().context("failed to flush command output")?;

    if cli.report
        && let Some(report) = memory.last()
    {
        eprintln!("{report}");
    }
    if let Err(err) = &status {
        eprintln!("gather: {err}");
    }

    Ok(ExitCode::from(exit_code(&status, &group.errors())))
}
