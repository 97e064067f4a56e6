use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::common::display::ScreenSize;
use crate::common::paths;
use crate::documented_config;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct WallsetConfig {
    pub sync_spaces: bool,
    pub apply_timeout_secs: u64,
    pub fallback_width: u32,
    pub fallback_height: u32,
    pub preview_debounce_ms: u64,
    pub output_dir: Option<String>,
}

impl Default for WallsetConfig {
    fn default() -> Self {
        Self {
            sync_spaces: true,
            apply_timeout_secs: 10,
            fallback_width: 1920,
            fallback_height: 1080,
            preview_debounce_ms: 400,
            output_dir: None,
        }
    }
}

documented_config!(WallsetConfig {
    fields: [
        sync_spaces, "Rewrite the wallpaper store so every space shows the new picture",
        apply_timeout_secs, "Seconds to wait for the System Events automation call",
        fallback_width, "Screen width used when the display cannot be queried",
        fallback_height, "Screen height used when the display cannot be queried",
        preview_debounce_ms, "Delay before a goals preview is re-rendered after an edit",
    ],
    optional: [
        output_dir, "Directory for generated and cropped wallpapers",
    ],
    config_path: paths::app_config_dir().map(|dir| dir.join("wallset.toml")),
});

impl WallsetConfig {
    pub fn apply_timeout(&self) -> Duration {
        Duration::from_secs(self.apply_timeout_secs.max(1))
    }

    pub fn preview_debounce(&self) -> Duration {
        Duration::from_millis(self.preview_debounce_ms)
    }

    pub fn fallback_screen(&self) -> ScreenSize {
        ScreenSize::new(self.fallback_width.max(1), self.fallback_height.max(1))
    }

    /// Where rendered goals wallpapers go
    pub fn generated_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.output_dir {
            Some(dir) => Ok(PathBuf::from(dir).join("generated")),
            None => paths::generated_dir(),
        }
    }

    /// Where cropped wallpapers go
    pub fn cropped_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.output_dir {
            Some(dir) => Ok(PathBuf::from(dir).join("cropped")),
            None => paths::cropped_dir(),
        }
    }
}
