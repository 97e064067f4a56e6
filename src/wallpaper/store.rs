//! Wallpaper store synchronization
//!
//! System Events only changes the picture of the space currently visible on each display.
//! Every other space keeps its own entry in `Index.plist`, so after the active desktops are
//! set we rewrite every desktop file reference in that store and restart the agent that
//! paints wallpapers.

use anyhow::{Context, Result, bail};
use plist::Value;
use std::path::{Path, PathBuf};

use crate::common::command::{CommandError, CommandRunner};
use crate::ui::prelude::*;
use crate::wallpaper::error::WallpaperError;

const RENDERING_AGENT: &str = "WallpaperAgent";
const DESKTOP_SHELL: &str = "Dock";
const NO_MATCHING_PROCESS: &str = "No matching processes";

/// Outcome of the all-spaces step of an apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpaceSync {
    /// Turned off in the config
    Disabled,
    /// No store on this system; nothing to do
    StoreMissing,
    Synced { references: usize },
    /// The active desktops changed but other spaces may still show the old picture
    Failed(WallpaperError),
}

impl SpaceSync {
    pub fn warning(&self) -> Option<&WallpaperError> {
        match self {
            SpaceSync::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// `file://` URL with each path segment percent-encoded.
///
/// Relative paths are made absolute against the working directory; symlinks are kept as is.
pub fn file_url_for(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let encoded: Vec<String> = absolute
        .to_string_lossy()
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("file://{}", encoded.join("/"))
}

/// Point every desktop file reference at `file_url`, returning how many were rewritten.
///
/// A reference is a `relative` string inside `Desktop.Content.Choices[].Files[]`. `Desktop`
/// nodes may sit at any depth; nothing else in the document is touched, so dates and data
/// blobs keep their plist types.
pub fn patch_wallpaper_store(root: &mut Value, file_url: &str) -> usize {
    match root {
        Value::Dictionary(dict) => dict
            .iter_mut()
            .map(|(key, child)| {
                let direct = if key == "Desktop" {
                    rewrite_desktop(child, file_url)
                } else {
                    0
                };
                direct + patch_wallpaper_store(child, file_url)
            })
            .sum(),
        Value::Array(items) => items
            .iter_mut()
            .map(|item| patch_wallpaper_store(item, file_url))
            .sum(),
        _ => 0,
    }
}

fn rewrite_desktop(desktop: &mut Value, file_url: &str) -> usize {
    let Some(choices) = desktop
        .as_dictionary_mut()
        .and_then(|desktop| desktop.get_mut("Content"))
        .and_then(Value::as_dictionary_mut)
        .and_then(|content| content.get_mut("Choices"))
        .and_then(Value::as_array_mut)
    else {
        return 0;
    };

    let mut updates = 0;
    for choice in choices {
        let Some(files) = choice
            .as_dictionary_mut()
            .and_then(|choice| choice.get_mut("Files"))
            .and_then(Value::as_array_mut)
        else {
            continue;
        };
        for file in files.iter_mut().filter_map(Value::as_dictionary_mut) {
            if let Some(relative) = file.get_mut("relative") {
                *relative = Value::String(file_url.to_string());
                updates += 1;
            }
        }
    }
    updates
}

/// Rewrites the per-space wallpaper store through `plutil` and restarts the agent
pub struct StoreSynchronizer<'a> {
    runner: &'a dyn CommandRunner,
    store_path: PathBuf,
}

impl<'a> StoreSynchronizer<'a> {
    pub fn new(runner: &'a dyn CommandRunner, store_path: PathBuf) -> Self {
        Self { runner, store_path }
    }

    /// Best effort: failures come back as [`SpaceSync::Failed`], never as an error
    pub fn sync(&self, image: &Path) -> SpaceSync {
        if !self.store_path.exists() {
            emit(
                Level::Debug,
                "wallpaper.store_missing",
                &format!(
                    "No wallpaper store at {}; skipping space sync",
                    self.store_path.display()
                ),
                None,
            );
            return SpaceSync::StoreMissing;
        }

        match self.rewrite_store(image) {
            Ok(references) => SpaceSync::Synced { references },
            Err(err) => SpaceSync::Failed(WallpaperError::apply(format!(
                "Failed to synchronize wallpaper across spaces: {:#}",
                err
            ))),
        }
    }

    fn rewrite_store(&self, image: &Path) -> Result<usize> {
        // Dropped on every return path, removing the scratch files
        let scratch = tempfile::Builder::new()
            .prefix("wallset-store-")
            .tempdir()
            .context("creating scratch directory")?;
        let xml_path = scratch.path().join("Index.xml");
        let patched_path = scratch.path().join("Index.patched.xml");
        let store = self.store_path.to_string_lossy().to_string();

        self.plutil(&["-convert", "xml1", "-o", &xml_path.to_string_lossy(), &store])
            .context("converting wallpaper store to XML")?;

        let mut document =
            Value::from_file(&xml_path).context("parsing converted wallpaper store")?;

        let updates = patch_wallpaper_store(&mut document, &file_url_for(image));
        if updates == 0 {
            bail!("the wallpaper store had no recognizable entries");
        }

        document
            .to_file_xml(&patched_path)
            .context("writing patched store")?;

        self.plutil(&["-convert", "binary1", "-o", &store, &patched_path.to_string_lossy()])
            .context("converting wallpaper store back to binary")?;

        self.restart_agent()?;

        emit(
            Level::Debug,
            "wallpaper.store_synced",
            &format!("Rewrote {} desktop references", updates),
            Some(serde_json::json!({ "references": updates })),
        );
        Ok(updates)
    }

    fn plutil(&self, args: &[&str]) -> Result<(), CommandError> {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        self.runner.run("plutil", &args, None).map(|_| ())
    }

    fn restart_agent(&self) -> Result<()> {
        match self.killall(RENDERING_AGENT) {
            Ok(()) => Ok(()),
            Err(err) if err.stderr().contains(NO_MATCHING_PROCESS) => self
                .killall(DESKTOP_SHELL)
                .with_context(|| format!("restarting {}", DESKTOP_SHELL)),
            Err(err) => Err(err).with_context(|| format!("restarting {}", RENDERING_AGENT)),
        }
    }

    fn killall(&self, process: &str) -> Result<(), CommandError> {
        self.runner
            .run("killall", &[process.to_string()], None)
            .map(|_| ())
    }
}
