//! External tool invocation
//!
//! Every call out to an OS tool (`osascript`, `plutil`, `killall`, `system_profiler`)
//! goes through a [`CommandRunner`] so the wallpaper code can be exercised without macOS.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::common::command_log::CommandLogger;
use crate::common::shell::shell_quote;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },

    #[error("{program} exited with {}: {}", code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()), stderr.trim())]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

impl CommandError {
    /// Standard error text of a failed command, empty for spawn errors and timeouts
    pub fn stderr(&self) -> &str {
        match self {
            CommandError::Failed { stderr, .. } => stderr,
            _ => "",
        }
    }
}

/// Captured output of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, failing on spawn errors, timeouts and non-zero exit
    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, CommandError>;
}

/// Runs commands on the host through duct
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner {
    logger: Option<CommandLogger>,
}

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self {
            logger: CommandLogger::new().ok(),
        }
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(20);

impl CommandRunner for SystemCommandRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, CommandError> {
        crate::ui::emit(
            crate::ui::Level::Debug,
            "command.run",
            &format!("Running {}", render_command_line(program, args)),
            None,
        );

        let started = Instant::now();
        let handle = duct::cmd(program, args)
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .start()
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let output = loop {
            let polled = handle.try_wait().map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;
            if let Some(output) = polled {
                break output.clone();
            }
            if let Some(limit) = timeout
                && started.elapsed() >= limit
            {
                let _ = handle.kill();
                return Err(CommandError::TimedOut {
                    program: program.to_string(),
                    timeout: limit,
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        if let Some(logger) = &self.logger {
            let _ = logger.log_command(program, args, &output, started.elapsed());
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(CommandError::Failed {
                program: program.to_string(),
                code: output.status.code(),
                stderr,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

/// Human-readable command line for diagnostics
pub fn render_command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}
