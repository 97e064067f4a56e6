//! macOS wallpaper adapter
//!
//! Sets the picture of every visible desktop through System Events, then brings the other
//! spaces in line through the wallpaper store (see [`crate::wallpaper::store`]).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::common::command::{CommandError, CommandRunner};
use crate::common::paths;
use crate::wallpaper::error::WallpaperError;
use crate::wallpaper::store::{SpaceSync, StoreSynchronizer};

pub const SUPPORTED_EXTENSIONS: [&str; 8] =
    ["jpg", "jpeg", "png", "gif", "heic", "bmp", "tiff", "webp"];

const AUTOMATION_DENIED_PATTERNS: [&str; 2] = ["Not authorized to send Apple events", "-1743"];

/// Result of a successful apply. `spaces` may still carry a non-fatal sync failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub spaces: SpaceSync,
}

impl ApplyReport {
    pub fn warning(&self) -> Option<&WallpaperError> {
        self.spaces.warning()
    }
}

pub trait WallpaperAdapter: Send + Sync {
    fn validate_image(&self, path: &Path) -> Result<(), WallpaperError> {
        validate_image(path)
    }

    /// Set `path` on every desktop. Validation failures happen before any side effect.
    fn apply_wallpaper(&self, path: &Path) -> Result<ApplyReport, WallpaperError>;

    /// Picture currently shown on each visible desktop
    fn current_wallpapers(&self) -> Result<Vec<PathBuf>, WallpaperError>;
}

/// The file must exist and carry an allow-listed extension (case-insensitive)
pub fn validate_image(path: &Path) -> Result<(), WallpaperError> {
    if !path.exists() {
        return Err(WallpaperError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(WallpaperError::UnsupportedFormat {
            path: path.display().to_string(),
            supported: SUPPORTED_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        });
    }
    Ok(())
}

/// `osascript` invocation that sets the picture of every desktop to the trailing argument.
///
/// The path is passed through `argv` rather than interpolated into the script, so it reaches
/// AppleScript verbatim.
pub fn build_apply_command(path: &Path) -> (&'static str, Vec<String>) {
    let script = [
        "on run argv",
        "tell application \"System Events\"",
        "repeat with desktopRef in desktops",
        "set picture of desktopRef to (item 1 of argv)",
        "end repeat",
        "end tell",
        "end run",
    ];
    let mut args: Vec<String> = script
        .iter()
        .flat_map(|line| ["-e".to_string(), line.to_string()])
        .collect();
    args.push("--".to_string());
    args.push(path.to_string_lossy().to_string());
    ("osascript", args)
}

/// `osascript` invocation printing each desktop's picture on its own line
fn build_current_command() -> (&'static str, Vec<String>) {
    let script = [
        "set pictures to {}",
        "tell application \"System Events\"",
        "repeat with desktopRef in desktops",
        "set end of pictures to (picture of desktopRef as text)",
        "end repeat",
        "end tell",
        "set AppleScript's text item delimiters to linefeed",
        "return pictures as text",
    ];
    let args = script
        .iter()
        .flat_map(|line| ["-e".to_string(), line.to_string()])
        .collect();
    ("osascript", args)
}

pub fn is_automation_denied(stderr: &str) -> bool {
    AUTOMATION_DENIED_PATTERNS
        .iter()
        .any(|pattern| stderr.contains(pattern))
}

/// Drives System Events and the wallpaper store through a [`CommandRunner`]
pub struct MacOsAdapter {
    runner: Arc<dyn CommandRunner>,
    home: PathBuf,
    timeout: Duration,
    sync_spaces: bool,
    check_tools: bool,
}

impl MacOsAdapter {
    pub fn new(runner: Arc<dyn CommandRunner>, home: PathBuf, timeout: Duration) -> Self {
        Self {
            runner,
            home,
            timeout,
            sync_spaces: true,
            check_tools: true,
        }
    }

    pub fn sync_spaces(mut self, enabled: bool) -> Self {
        self.sync_spaces = enabled;
        self
    }

    /// Skip the `which osascript` lookup, for runners that do not touch the host
    #[cfg(test)]
    pub fn skip_tool_check(mut self) -> Self {
        self.check_tools = false;
        self
    }

    fn ensure_osascript(&self) -> Result<(), WallpaperError> {
        if self.check_tools && which::which("osascript").is_err() {
            return Err(WallpaperError::apply(
                "osascript is not available; wallpaper automation requires macOS",
            ));
        }
        Ok(())
    }

    fn set_active_desktops(&self, path: &Path) -> Result<(), WallpaperError> {
        let (program, args) = build_apply_command(path);
        self.runner
            .run(program, &args, Some(self.timeout))
            .map(|_| ())
            .map_err(|err| apply_error(&err))
    }
}

fn apply_error(err: &CommandError) -> WallpaperError {
    let stderr = err.stderr().trim();
    if is_automation_denied(stderr) {
        return WallpaperError::PermissionDenied {
            operation: "set desktop picture".to_string(),
            detail: stderr.to_string(),
        };
    }
    let reason = if stderr.is_empty() {
        err.to_string()
    } else {
        stderr.to_string()
    };
    WallpaperError::apply(format!("Failed to set wallpaper: {}", reason))
}

impl WallpaperAdapter for MacOsAdapter {
    fn apply_wallpaper(&self, path: &Path) -> Result<ApplyReport, WallpaperError> {
        self.validate_image(path)?;
        self.ensure_osascript()?;
        self.set_active_desktops(path)?;

        let spaces = if self.sync_spaces {
            StoreSynchronizer::new(self.runner.as_ref(), paths::wallpaper_store_path(&self.home))
                .sync(path)
        } else {
            SpaceSync::Disabled
        };

        Ok(ApplyReport { spaces })
    }

    fn current_wallpapers(&self) -> Result<Vec<PathBuf>, WallpaperError> {
        self.ensure_osascript()?;
        let (program, args) = build_current_command();
        let output = self
            .runner
            .run(program, &args, Some(self.timeout))
            .map_err(|err| apply_error(&err))?;
        Ok(parse_picture_list(&output.stdout))
    }
}

/// One path per line; commas are legal in file names
fn parse_picture_list(stdout: &str) -> Vec<PathBuf> {
    stdout
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::command::CommandOutput;
    use std::sync::Mutex;

    /// Records calls and answers each program with a scripted result
    #[derive(Default)]
    struct ScriptedRunner {
        calls: Mutex<Vec<(String, Vec<String>, Option<Duration>)>>,
        osascript: Option<Result<String, String>>,
    }

    impl ScriptedRunner {
        fn failing_osascript(stderr: &str) -> Self {
            Self {
                osascript: Some(Err(stderr.to_string())),
                ..Default::default()
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(
            &self,
            program: &str,
            args: &[String],
            timeout: Option<Duration>,
        ) -> Result<CommandOutput, CommandError> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec(), timeout));
            match (program, &self.osascript) {
                ("osascript", Some(Err(stderr))) => Err(CommandError::Failed {
                    program: program.to_string(),
                    code: Some(1),
                    stderr: stderr.clone(),
                }),
                ("osascript", Some(Ok(stdout))) => Ok(CommandOutput {
                    stdout: stdout.clone(),
                    stderr: String::new(),
                }),
                _ => Ok(CommandOutput::default()),
            }
        }
    }

    fn adapter(runner: Arc<ScriptedRunner>, home: &Path) -> MacOsAdapter {
        MacOsAdapter::new(runner, home.to_path_buf(), Duration::from_secs(10)).skip_tool_check()
    }

    fn image_in(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"not really an image").unwrap();
        path
    }

    #[test]
    fn apply_command_iterates_every_desktop() {
        let path = Path::new("/tmp/example wallpaper's \"best\".jpg");
        let (program, args) = build_apply_command(path);
        let script = args.join("\n");

        assert_eq!(program, "osascript");
        assert!(script.contains("tell application \"System Events\""));
        assert!(script.contains("repeat with desktopRef in desktops"));
        assert_eq!(args[args.len() - 2], "--");
        assert_eq!(args.last().unwrap(), "/tmp/example wallpaper's \"best\".jpg");
    }

    #[test]
    fn validation_accepts_allow_list_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        for ext in SUPPORTED_EXTENSIONS {
            assert!(validate_image(&image_in(dir.path(), &format!("a.{ext}"))).is_ok());
            let upper = ext.to_uppercase();
            assert!(validate_image(&image_in(dir.path(), &format!("b.{upper}"))).is_ok());
        }
        for name in ["a.svg", "a.pdf", "noext"] {
            let err = validate_image(&image_in(dir.path(), name)).unwrap_err();
            assert_eq!(err.code(), "unsupported_format", "{name}");
        }
    }

    #[test]
    fn missing_file_fails_without_os_calls() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::default());
        let err = adapter(runner.clone(), dir.path())
            .apply_wallpaper(&dir.path().join("missing.jpg"))
            .unwrap_err();

        assert_eq!(err.code(), "file_not_found");
        assert_eq!(runner.call_count(), 0);
    }

    #[test]
    fn unsupported_format_fails_without_os_calls() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::default());
        let err = adapter(runner.clone(), dir.path())
            .apply_wallpaper(&image_in(dir.path(), "wallpaper.svg"))
            .unwrap_err();

        match err {
            WallpaperError::UnsupportedFormat { supported, .. } => {
                assert_eq!(supported.len(), SUPPORTED_EXTENSIONS.len());
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(runner.call_count(), 0);
    }

    #[test]
    fn runs_osascript_only_when_store_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = image_in(dir.path(), "wallpaper.png");
        let runner = Arc::new(ScriptedRunner::default());

        let report = adapter(runner.clone(), dir.path()).apply_wallpaper(&path).unwrap();

        assert_eq!(report.spaces, SpaceSync::StoreMissing);
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "osascript");
        assert_eq!(calls[0].1.last().unwrap(), &path.to_string_lossy().to_string());
        assert_eq!(calls[0].2, Some(Duration::from_secs(10)));
    }

    #[test]
    fn disabled_sync_never_touches_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = paths::wallpaper_store_path(dir.path());
        std::fs::create_dir_all(store.parent().unwrap()).unwrap();
        std::fs::write(&store, "bplist00").unwrap();
        let path = image_in(dir.path(), "wallpaper.png");
        let runner = Arc::new(ScriptedRunner::default());

        let report = adapter(runner.clone(), dir.path())
            .sync_spaces(false)
            .apply_wallpaper(&path)
            .unwrap();

        assert_eq!(report.spaces, SpaceSync::Disabled);
        assert_eq!(runner.call_count(), 1);
    }

    #[test]
    fn store_failure_is_degraded_success() {
        let dir = tempfile::tempdir().unwrap();
        let store = paths::wallpaper_store_path(dir.path());
        std::fs::create_dir_all(store.parent().unwrap()).unwrap();
        std::fs::write(&store, "bplist00").unwrap();
        let path = image_in(dir.path(), "wallpaper.png");
        // plutil "succeeds" without producing JSON, so reading the conversion fails
        let runner = Arc::new(ScriptedRunner::default());

        let report = adapter(runner.clone(), dir.path()).apply_wallpaper(&path).unwrap();

        let warning = report.warning().unwrap();
        assert!(warning
            .to_string()
            .contains("Failed to synchronize wallpaper across spaces"));
    }

    #[test]
    fn automation_denial_is_permission_denied() {
        let dir = tempfile::tempdir().unwrap();
        let path = image_in(dir.path(), "wallpaper.jpg");
        let runner = Arc::new(ScriptedRunner::failing_osascript(
            "Not authorized to send Apple events to System Events.\n",
        ));

        let err = adapter(runner, dir.path()).apply_wallpaper(&path).unwrap_err();
        assert_eq!(err.code(), "permission_denied");
        assert!(err
            .to_string()
            .contains("Not authorized to send Apple events to System Events"));
    }

    #[test]
    fn other_osascript_failures_carry_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let path = image_in(dir.path(), "wallpaper.jpg");
        let runner = Arc::new(ScriptedRunner::failing_osascript(
            "execution error: System Events got an error: Can't get desktop 1. (-1728)\n",
        ));

        let err = adapter(runner, dir.path()).apply_wallpaper(&path).unwrap_err();
        assert_eq!(err.code(), "apply_failed");
        assert!(err.to_string().contains("Failed to set wallpaper: execution error"));
    }

    #[test]
    fn lists_current_pictures() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner {
            osascript: Some(Ok("/Users/me/a.jpg\n/Users/me/b b.png\n".into())),
            ..Default::default()
        });

        let current = adapter(runner.clone(), dir.path()).current_wallpapers().unwrap();
        assert_eq!(
            current,
            vec![PathBuf::from("/Users/me/a.jpg"), PathBuf::from("/Users/me/b b.png")]
        );

        let calls = runner.calls.lock().unwrap();
        let script = calls[0].1.join("\n");
        assert!(script.contains("text item delimiters to linefeed"));
        assert!(script.contains("repeat with desktopRef in desktops"));
    }

    #[test]
    fn picture_paths_may_contain_commas() {
        let listed = parse_picture_list(
            "/Users/me/Pictures/Paris, France.jpg\r\n\n/Users/me/Pictures/Tokyo, 2024, night.png\n",
        );
        assert_eq!(
            listed,
            vec![
                PathBuf::from("/Users/me/Pictures/Paris, France.jpg"),
                PathBuf::from("/Users/me/Pictures/Tokyo, 2024, night.png"),
            ]
        );
    }
}
