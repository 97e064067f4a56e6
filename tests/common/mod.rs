use anyhow::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Isolated data, config and home directories for one test
pub struct TestEnvironment {
    temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        for dir in ["data", "config", "home"] {
            std::fs::create_dir_all(temp_dir.path().join(dir))?;
        }
        Ok(Self { temp_dir })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.path().join("data")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.path().join("config")
    }

    pub fn home_dir(&self) -> PathBuf {
        self.path().join("home")
    }

    pub fn state_file(&self) -> PathBuf {
        self.data_dir().join("state.json")
    }

    /// Write a solid-color PNG and return its path
    pub fn write_png(&self, name: &str, width: u32, height: u32) -> Result<PathBuf> {
        let path = self.path().join(name);
        image::RgbaImage::from_pixel(width, height, image::Rgba([40, 80, 120, 255])).save(&path)?;
        Ok(path)
    }
}
