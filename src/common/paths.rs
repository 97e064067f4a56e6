use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Centralized path management for wallset
/// This module provides a single source of truth for all application paths

pub const APP_NAME: &str = "wallset";

/// Overrides the application data root (state, generated images, logs)
pub const DATA_DIR_ENV: &str = "WALLSET_DATA_DIR";
/// Overrides the configuration root
pub const CONFIG_DIR_ENV: &str = "WALLSET_CONFIG_DIR";

fn env_dir(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Get the main wallset data directory
pub fn app_data_dir() -> Result<PathBuf> {
    let data_dir = match env_dir(DATA_DIR_ENV) {
        Some(dir) => dir,
        None => dirs::data_dir()
            .context("Unable to determine user data directory")?
            .join(APP_NAME),
    };

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory at {}", data_dir.display()))?;

    Ok(data_dir)
}

/// Get the main wallset config directory
pub fn app_config_dir() -> Result<PathBuf> {
    let config_dir = match env_dir(CONFIG_DIR_ENV) {
        Some(dir) => dir,
        None => dirs::config_dir()
            .context("Unable to determine user config directory")?
            .join(APP_NAME),
    };

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("creating config directory at {}", config_dir.display()))?;

    Ok(config_dir)
}

/// Location of the persisted state document
pub fn state_file_path() -> Result<PathBuf> {
    Ok(app_data_dir()?.join("state.json"))
}

/// Get the directory rendered goals wallpapers are written to
pub fn generated_dir() -> Result<PathBuf> {
    Ok(app_data_dir()?.join("generated"))
}

/// Get the directory cropped wallpapers are written to
pub fn cropped_dir() -> Result<PathBuf> {
    Ok(app_data_dir()?.join("cropped"))
}

pub fn preview_dir() -> Result<PathBuf> {
    Ok(app_data_dir()?.join("preview"))
}

pub fn app_logs_dir() -> Result<PathBuf> {
    Ok(app_data_dir()?.join("logs"))
}

pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("Unable to determine home directory")
}

/// macOS per-user index of which image is assigned to each space and display
pub fn wallpaper_store_path(home: &Path) -> PathBuf {
    home.join("Library")
        .join("Application Support")
        .join("com.apple.wallpaper")
        .join("Store")
        .join("Index.plist")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn data_dir_honors_override() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("state-root");
        unsafe { std::env::set_var(DATA_DIR_ENV, &root) };

        let state = state_file_path().unwrap();
        let generated = generated_dir().unwrap();

        unsafe { std::env::remove_var(DATA_DIR_ENV) };

        assert_eq!(state, root.join("state.json"));
        assert_eq!(generated, root.join("generated"));
        assert!(root.is_dir());
    }

    #[test]
    fn store_path_is_under_application_support() {
        let path = wallpaper_store_path(Path::new("/Users/me"));
        assert_eq!(
            path,
            PathBuf::from("/Users/me/Library/Application Support/com.apple.wallpaper/Store/Index.plist")
        );
    }
}
