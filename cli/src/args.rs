//! Command-line parsing.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "gather")]
#[command(version)]
#[command(about = "Run shell commands in parallel and wait at most the group deadline")]
#[command(after_help = "\
Exit status: 0 all succeeded, 1 some command failed, 2 deadline elapsed,
64 bad usage, 78 unusable config file.")]
pub struct Cli {
    /// Group deadline in milliseconds (overrides the config file)
    #[arg(long = "deadline-ms", value_name = "N", value_parser = parse_millis)]
    pub deadline: Option<Duration>,

    /// Report successful commands slower than this many milliseconds
    #[arg(long = "long-ms", value_name = "N", value_parser = parse_millis)]
    pub long_threshold: Option<Duration>,

    /// Config file to read instead of ~/.gather/config.toml
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the run report to stderr instead of logging it
    #[arg(long)]
    pub report: bool,

    /// Commands to run through `sh -c`
    #[arg(value_name = "CMD", required = true, trailing_var_arg = true)]
    pub commands: Vec<String>,
}

fn parse_millis(value: &str) -> Result<Duration, String> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| format!("expected a whole number of milliseconds, got {value:?}"))
}
