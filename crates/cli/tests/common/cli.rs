//! CLI command execution helpers with automatic timing
//!
//! This module provides a wrapper around the `inwatch` binary that
//! measures execution time, isolates the user's configuration directory
//! and provides convenient assertion methods.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

/// CLI command builder with timing
pub struct InwatchCommand {
    binary_path: PathBuf,
    working_dir: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
}

impl InwatchCommand {
    /// Create a new command in the given working directory
    ///
    /// `XDG_CONFIG_HOME` points at the working directory so a config file
    /// on the host never leaks into a test.
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        let working_dir = working_dir.as_ref().to_path_buf();
        let mut env = HashMap::new();
        env.insert(
            "XDG_CONFIG_HOME".to_string(),
            working_dir.display().to_string(),
        );

        Self {
            binary_path: PathBuf::from(env!("CARGO_BIN_EXE_inwatch")),
            working_dir,
            args: Vec::new(),
            env,
        }
    }

    /// Add command arguments
    pub fn args(&mut self, args: &[&str]) -> &mut Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    /// Set environment variable
    pub fn env(&mut self, key: &str, value: &str) -> &mut Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    /// Execute command and return result with timing
    pub fn execute(&self) -> Result<CommandResult> {
        let start = Instant::now();

        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .current_dir(&self.working_dir)
            .env_remove("RUST_LOG")
            .envs(&self.env)
            .output()
            .context("Failed to execute command")?;

        Ok(CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            duration: start.elapsed(),
        })
    }

    /// Execute and assert success
    pub fn assert_success(&self) -> Result<CommandResult> {
        let result = self.execute()?;

        if !result.success() {
            anyhow::bail!(
                "Command failed (exit code: {}):\nArgs: {:?}\nStdout: {}\nStderr: {}",
                result.exit_code,
                self.args,
                result.stdout,
                result.stderr
            );
        }

        Ok(result)
    }

    /// Execute and expect failure
    pub fn assert_failure(&self) -> Result<CommandResult> {
        let result = self.execute()?;

        if result.success() {
            anyhow::bail!(
                "Command should have failed but succeeded:\nArgs: {:?}\nStdout: {}",
                self.args,
                result.stdout
            );
        }

        Ok(result)
    }
}

/// Command execution result with timing
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl CommandResult {
    /// Check if command succeeded
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Check if stdout contains text
    pub fn contains_stdout(&self, text: &str) -> bool {
        self.stdout.contains(text)
    }

    /// Check if stderr contains text
    pub fn contains_stderr(&self, text: &str) -> bool {
        self.stderr.contains(text)
    }

    /// Parse the `(events, overflows)` counts from the summary line
    pub fn parse_summary(&self) -> Option<(u64, u64)> {
        self.stdout.lines().find_map(parse_summary_line)
    }
}

/// Parse "Received N events and M queue-overflow events in S s"
pub fn parse_summary_line(line: &str) -> Option<(u64, u64)> {
    let rest = line.trim().strip_prefix("Received ")?;
    let (events, rest) = rest.split_once(" events and ")?;
    let (overflows, _) = rest.split_once(" queue-overflow events in ")?;
    Some((events.trim().parse().ok()?, overflows.trim().parse().ok()?))
}

/// Macro for convenient command construction
///
/// Usage:
/// ```ignore
/// inwatch!(dir, "limits").assert_success()?;
/// inwatch!(dir, "watch", path, "--duration", "1").assert_success()?;
/// ```
#[macro_export]
macro_rules! inwatch {
    ($dir:expr, $($arg:expr),*) => {{
        let mut cmd = $crate::common::cli::InwatchCommand::new($dir);
        cmd.args(&[$($arg),*]);
        cmd
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_parsing() {
        let line = "Received 12 events and 1 queue-overflow events in 2.01 s";
        assert_eq!(parse_summary_line(line), Some((12, 1)));
        assert_eq!(parse_summary_line("Watching 1 path"), None);
    }

    #[test]
    fn test_summary_from_output() {
        let result = CommandResult {
            stdout: "Watching 1 path\n\nReceived 0 events and 0 queue-overflow events in 1.00 s\n"
                .to_string(),
            stderr: String::new(),
            exit_code: 0,
            duration: Duration::from_millis(10),
        };
        assert_eq!(result.parse_summary(), Some((0, 0)));
    }
}
