//! Terminal output
//!
//! Command results go to stdout as a single JSON document so callers can parse them.
//! Everything else (progress, warnings, debug traces) goes to stderr through [`emit`].

use colored::*;
use serde::Serialize;
use std::io::{self, Write};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy)]
pub enum Level {
    Info,
    Success,
    Warn,
    Error,
    Debug,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Success => "success",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Debug => "debug",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Renderer {
    pub format: OutputFormat,
    pub color: bool,
}

impl Renderer {
    const fn new() -> Self {
        Self {
            format: OutputFormat::Text,
            color: true,
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

static RENDERER: RwLock<Renderer> = RwLock::new(Renderer::new());

// Global debug state
static DEBUG_MODE: AtomicBool = AtomicBool::new(false);

pub fn set_debug_mode(enabled: bool) {
    DEBUG_MODE.store(enabled, Ordering::Relaxed);
}

pub fn is_debug_enabled() -> bool {
    DEBUG_MODE.load(Ordering::Relaxed)
}

pub fn init(format: OutputFormat, color: bool) {
    if let Ok(mut r) = RENDERER.write() {
        r.format = format;
        r.color = color;
    }
}

fn renderer() -> Renderer {
    RENDERER
        .read()
        .map(|r| r.clone())
        .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
}

#[derive(Serialize)]
struct Event<'a> {
    level: &'a str,
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

fn colorize(level: Level, s: &str, enable: bool) -> String {
    if !enable {
        return s.to_string();
    }
    match level {
        Level::Info => s.normal().to_string(),
        Level::Success => s.green().bold().to_string(),
        Level::Warn => s.yellow().bold().to_string(),
        Level::Error => s.red().bold().to_string(),
        Level::Debug => s.cyan().to_string(),
    }
}

fn strip_ansi(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == 0x1b && i + 1 < bytes.len() && bytes[i + 1] == b'[' {
            i += 2;
            // Skip to the final byte of the CSI sequence
            while i < bytes.len() {
                let b = bytes[i];
                i += 1;
                if (b'@'..=b'~').contains(&b) {
                    break;
                }
            }
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn render_event(r: &Renderer, level: Level, code: &str, message: &str, data: Option<serde_json::Value>) -> String {
    match r.format {
        OutputFormat::Text => colorize(level, message, r.color),
        OutputFormat::Json => {
            let clean_msg = strip_ansi(message);
            let ev = Event {
                level: level.as_str(),
                code,
                message: &clean_msg,
                data,
            };
            serde_json::to_string(&ev).unwrap_or_else(|_| clean_msg.clone())
        }
    }
}

/// Report progress or a diagnostic on stderr. Debug events only show with `--debug`.
pub fn emit(level: Level, code: &str, message: &str, data: Option<serde_json::Value>) {
    if matches!(level, Level::Debug) && !is_debug_enabled() {
        return;
    }
    let line = render_event(&renderer(), level, code, message, data);
    let _ = writeln!(io::stderr(), "{}", line);
}

/// Write a command's result document to stdout
pub fn respond(value: &serde_json::Value) {
    let rendered = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
    let mut out = io::stdout();
    let _ = writeln!(out, "{}", rendered);
    let _ = out.flush();
}

/// Write a failure document to stderr
pub fn respond_error(value: &serde_json::Value) {
    let rendered = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
    let _ = writeln!(io::stderr(), "{}", rendered);
}

pub mod prelude {
    pub use super::{Level, emit, respond};
}
