use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{OpenOptions, create_dir_all};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use crate::common::paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandLogEntry {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub args: Vec<String>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub success: bool,
    pub duration_ms: u64,
}

/// Appends external command invocations to a JSON-lines file while debug mode is on
#[derive(Debug, Clone)]
pub struct CommandLogger {
    log_dir: PathBuf,
}

impl CommandLogger {
    pub fn new() -> Result<Self> {
        Ok(Self::with_dir(paths::app_logs_dir()?))
    }

    pub fn with_dir(log_dir: PathBuf) -> Self {
        Self { log_dir }
    }

    fn log_file_path(&self) -> PathBuf {
        self.log_dir.join("commands.jsonl")
    }

    pub fn log_command(
        &self,
        command: &str,
        args: &[String],
        output: &std::process::Output,
        elapsed: Duration,
    ) -> Result<()> {
        if !crate::ui::is_debug_enabled() {
            return Ok(());
        }

        let entry = CommandLogEntry {
            timestamp: Utc::now(),
            command: command.to_string(),
            args: args.to_vec(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
            success: output.status.success(),
            duration_ms: elapsed.as_millis() as u64,
        };
        self.append(&entry)
    }

    pub fn append(&self, entry: &CommandLogEntry) -> Result<()> {
        create_dir_all(&self.log_dir).context("Failed to create command log directory")?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_file_path())
            .context("Failed to open command log file")?;

        let json_line =
            serde_json::to_string(entry).context("Failed to serialize command log entry")?;
        writeln!(file, "{json_line}").context("Failed to write to command log file")?;

        Ok(())
    }

    /// Logged commands, newest first
    pub fn get_logs(&self) -> Result<Vec<CommandLogEntry>> {
        let log_file = self.log_file_path();
        if !log_file.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&log_file).context("Failed to read command log")?;

        let mut logs = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: CommandLogEntry =
                serde_json::from_str(line).context("Failed to parse command log entry")?;
            logs.push(entry);
        }

        logs.reverse();
        Ok(logs)
    }

    pub fn clear_logs(&self) -> Result<()> {
        let log_file = self.log_file_path();
        if log_file.exists() {
            std::fs::remove_file(&log_file).context("Failed to remove command log")?;
        }
        Ok(())
    }
}
