//! Display geometry
//!
//! The main display's pixel size drives both the goals render size and the crop aspect lock.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::common::command::CommandRunner;
use crate::ui::prelude::*;

/// Pixel dimensions of a display or an output image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width over height, used to aspect-lock the crop container
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }

    /// Parse "2560 x 1440" style strings as reported by system_profiler
    pub fn parse(text: &str) -> Option<Self> {
        let re = Regex::new(r"(\d+)\s*x\s*(\d+)").ok()?;
        let caps = re.captures(text)?;
        let width = caps[1].parse().ok()?;
        let height = caps[2].parse().ok()?;
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self { width, height })
    }
}

pub trait ScreenProvider: Send + Sync {
    /// Pixel size of the main display
    fn main_screen_size(&self) -> ScreenSize;
}

/// Fixed geometry, for hosts without `system_profiler`
#[derive(Debug, Clone, Copy)]
pub struct FixedScreen(pub ScreenSize);

impl ScreenProvider for FixedScreen {
    fn main_screen_size(&self) -> ScreenSize {
        self.0
    }
}

/// Queries `system_profiler SPDisplaysDataType -json` for the main display
pub struct SystemProfilerScreens {
    runner: Arc<dyn CommandRunner>,
    fallback: ScreenSize,
}

impl SystemProfilerScreens {
    pub fn new(runner: Arc<dyn CommandRunner>, fallback: ScreenSize) -> Self {
        Self { runner, fallback }
    }
}

impl ScreenProvider for SystemProfilerScreens {
    fn main_screen_size(&self) -> ScreenSize {
        let args = vec!["SPDisplaysDataType".to_string(), "-json".to_string()];
        let output = match self.runner.run("system_profiler", &args, None) {
            Ok(output) => output,
            Err(err) => {
                emit(
                    Level::Warn,
                    "display.query_failed",
                    &format!(
                        "Could not query displays ({}); using {}x{}",
                        err, self.fallback.width, self.fallback.height
                    ),
                    None,
                );
                return self.fallback;
            }
        };

        match main_display_from_profiler(&output.stdout) {
            Some(size) => size,
            None => {
                emit(
                    Level::Warn,
                    "display.parse_failed",
                    &format!(
                        "No display geometry in system_profiler output; using {}x{}",
                        self.fallback.width, self.fallback.height
                    ),
                    None,
                );
                self.fallback
            }
        }
    }
}

/// Pick the main display (or the first one) out of system_profiler JSON
pub fn main_display_from_profiler(json: &str) -> Option<ScreenSize> {
    let root: Value = serde_json::from_str(json).ok()?;
    let gpus = root.get("SPDisplaysDataType")?.as_array()?;

    let displays: Vec<&Value> = gpus
        .iter()
        .filter_map(|gpu| gpu.get("spdisplays_ndrvs").and_then(Value::as_array))
        .flatten()
        .collect();

    let main = displays
        .iter()
        .find(|d| d.get("spdisplays_main").and_then(Value::as_str) == Some("spdisplays_yes"))
        .or_else(|| displays.first())?;

    ["_spdisplays_pixels", "_spdisplays_resolution"]
        .iter()
        .filter_map(|key| main.get(*key).and_then(Value::as_str))
        .find_map(ScreenSize::parse)
}
