//! Shell commands as job group units.

use std::io;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start: {0}")]
    Spawn(#[from] io::Error),
    #[error("{}", describe_exit(.code, .stderr))]
    Exit { code: Option<i32>, stderr: String },
}

fn describe_exit(code: &Option<i32>, stderr: &str) -> String {
    let status = match code {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    };
    match stderr.lines().next().map(str::trim).filter(|l| !l.is_empty()) {
        Some(first) => format!("{status}: {first}"),
        None => status,
    }
}

/// Run `command` through `sh -c`, capturing stdout.
///
/// The child is killed if the unit is dropped, which only happens when the
/// runtime shuts down with the command still running.
pub async fn run_shell(command: String) -> Result<String, CommandError> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(&command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(CommandError::Exit {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
