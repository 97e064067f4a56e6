use anyhow::{Context, Result};
use serde_json::Value;
use std::process::Command;

use super::common::TestEnvironment;

pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    /// The response document printed on stdout
    pub fn json(&self) -> Result<Value> {
        serde_json::from_str(self.stdout.trim())
            .with_context(|| format!("stdout is not JSON: {:?}", self.stdout))
    }

    /// The error envelope, which is the last line on stderr
    pub fn error_json(&self) -> Result<Value> {
        let line = self
            .stderr
            .lines()
            .rev()
            .find(|line| line.trim_start().starts_with('{'))
            .with_context(|| format!("no JSON on stderr: {:?}", self.stderr))?;
        Ok(serde_json::from_str(line)?)
    }
}

pub fn run_wallset_command(env: &TestEnvironment, args: &[&str]) -> Result<CommandOutput> {
    let output = Command::new(env!("CARGO_BIN_EXE_wallset"))
        .args(args)
        .env("WALLSET_DATA_DIR", env.data_dir())
        .env("WALLSET_CONFIG_DIR", env.config_dir())
        .env("HOME", env.home_dir())
        .env("NO_COLOR", "1")
        .current_dir(env.path())
        .output()?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}
