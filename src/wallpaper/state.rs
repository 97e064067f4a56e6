//! Application state and request flows
//!
//! [`WallpaperApp`] owns everything a front end needs: the selected image, committed crop,
//! goals draft, history and apply status. Only one apply or generate runs at a time; a request
//! that arrives while another is in flight is dropped and reported as `None`. Blocking work
//! (AppleScript, PNG encoding, disk I/O) runs on tokio's blocking pool.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use crate::common::display::{ScreenProvider, ScreenSize};
use crate::ui::prelude::*;
use crate::wallpaper::crop::{self, CropState};
use crate::wallpaper::error::WallpaperError;
use crate::wallpaper::goals::GoalsRenderer;
use crate::wallpaper::macos::WallpaperAdapter;
use crate::wallpaper::models::{
    ApplyStatus, GoalsDraft, HistoryEntry, PersistenceEnvelope, RenderedWallpaper,
    WallpaperSource,
};
use crate::wallpaper::persistence::WallpaperPersistence;

pub const APPLIED_MESSAGE: &str = "Wallpaper applied.";
pub const GENERATED_MESSAGE: &str = "Goals wallpaper generated.";

/// Where rendered images are written
#[derive(Debug, Clone)]
pub struct OutputDirs {
    pub generated: PathBuf,
    pub cropped: PathBuf,
    pub preview: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub selected_image: Option<PathBuf>,
    pub crop: CropState,
    pub apply_status: ApplyStatus,
    pub last_error: Option<WallpaperError>,
    pub history: Vec<HistoryEntry>,
    pub goals_draft: GoalsDraft,
    pub last_applied: Option<PathBuf>,
}

/// A recorded apply, plus the space-sync failure if the apply was degraded
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    pub entry: HistoryEntry,
    pub warning: Option<WallpaperError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreviewOutcome {
    Rendered(RenderedWallpaper),
    /// A newer draft arrived during the debounce window
    Superseded,
}

/// Latest-wins debounce: each request takes a ticket and only runs if still newest after
/// waiting out the delay
#[derive(Debug)]
pub struct PreviewDebouncer {
    delay: Duration,
    generation: AtomicU64,
}

impl PreviewDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: AtomicU64::new(0),
        }
    }

    /// Wait out the delay; true if no newer request arrived meanwhile
    pub async fn settle(&self) -> bool {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        self.generation.load(Ordering::SeqCst) == ticket
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct WallpaperApp {
    adapter: Arc<dyn WallpaperAdapter>,
    renderer: Arc<dyn GoalsRenderer>,
    persistence: Arc<dyn WallpaperPersistence>,
    screens: Arc<dyn ScreenProvider>,
    dirs: OutputDirs,
    busy: AtomicBool,
    state: Mutex<AppState>,
    preview: PreviewDebouncer,
}

async fn run_blocking<T, F, E>(op: F, on_join_error: E) -> Result<T, WallpaperError>
where
    F: FnOnce() -> Result<T, WallpaperError> + Send + 'static,
    T: Send + 'static,
    E: FnOnce(String) -> WallpaperError,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| on_join_error(format!("background task failed: {e}")))?
}

fn persistence_join_error(detail: String) -> WallpaperError {
    WallpaperError::PersistenceFailed {
        operation: "background".to_string(),
        detail,
    }
}

impl WallpaperApp {
    pub fn new(
        adapter: Arc<dyn WallpaperAdapter>,
        renderer: Arc<dyn GoalsRenderer>,
        persistence: Arc<dyn WallpaperPersistence>,
        screens: Arc<dyn ScreenProvider>,
        dirs: OutputDirs,
    ) -> Self {
        Self {
            adapter,
            renderer,
            persistence,
            screens,
            dirs,
            busy: AtomicBool::new(false),
            state: Mutex::new(AppState::default()),
            preview: PreviewDebouncer::new(Duration::from_millis(400)),
        }
    }

    pub fn with_preview_debounce(mut self, delay: Duration) -> Self {
        self.preview = PreviewDebouncer::new(delay);
        self
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> AppState {
        self.with_state(|state| state.clone())
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn try_begin(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| BusyGuard(&self.busy))
    }

    fn record_failure(&self, err: &WallpaperError) {
        self.with_state(|state| {
            state.last_error = Some(err.clone());
            state.apply_status = ApplyStatus::Failure(err.to_string());
        });
    }

    fn record_error(&self, err: &WallpaperError) {
        self.with_state(|state| state.last_error = Some(err.clone()));
    }

    pub fn screen_size(&self) -> ScreenSize {
        self.screens.main_screen_size()
    }

    /// Load persisted state; history comes back newest first
    pub async fn bootstrap(&self) -> Result<PersistenceEnvelope, WallpaperError> {
        let persistence = self.persistence.clone();
        let loaded = run_blocking(move || persistence.load_envelope(), persistence_join_error).await;

        let mut envelope = match loaded {
            Ok(envelope) => envelope,
            Err(err) => {
                self.record_error(&err);
                return Err(err);
            }
        };
        envelope.sort_history();

        self.clear_error();
        self.with_state(|state| {
            state.history = envelope.history.clone();
            state.goals_draft = envelope.goals_draft.clone();
            state.last_applied = envelope.last_applied_path.clone();
            if let Some(path) = &envelope.last_applied_path {
                state.selected_image = Some(path.clone());
            }
        });
        Ok(envelope)
    }

    /// Make `path` the image the next apply or crop works on
    pub fn select_image(&self, path: PathBuf) {
        self.with_state(|state| {
            state.selected_image = Some(path);
            state.crop.reset();
            state.apply_status = ApplyStatus::Idle;
        });
    }

    pub fn restore_history_entry(&self, id: Uuid) -> Result<PathBuf, WallpaperError> {
        let found = self.with_state(|state| {
            state
                .history
                .iter()
                .find(|entry| entry.id == id)
                .map(|entry| entry.file_url.clone())
        });
        match found {
            Some(path) => {
                self.select_image(path.clone());
                Ok(path)
            }
            None => Err(WallpaperError::FileNotFound {
                path: format!("history entry {id}"),
            }),
        }
    }

    pub fn validate_image(&self, path: &Path) -> Result<(), WallpaperError> {
        self.adapter.validate_image(path)
    }

    pub fn clear_error(&self) {
        self.with_state(|state| {
            state.last_error = None;
            if matches!(state.apply_status, ApplyStatus::Failure(_)) {
                state.apply_status = ApplyStatus::Idle;
            }
        });
    }

    /// Apply an image file and record it. `None` if another apply or generate is running.
    pub async fn apply_path(
        &self,
        path: PathBuf,
        source: WallpaperSource,
        metadata: BTreeMap<String, String>,
    ) -> Option<Result<ApplyOutcome, WallpaperError>> {
        let _guard = self.try_begin()?;
        Some(self.apply_unguarded(path, source, metadata).await)
    }

    pub async fn apply_selected(&self) -> Option<Result<ApplyOutcome, WallpaperError>> {
        let _guard = self.try_begin()?;
        let Some(path) = self.with_state(|state| state.selected_image.clone()) else {
            let err = WallpaperError::FileNotFound {
                path: "No file selected".to_string(),
            };
            self.record_error(&err);
            return Some(Err(err));
        };
        Some(self.apply_unguarded(path, WallpaperSource::LocalImage, BTreeMap::new()).await)
    }

    async fn apply_unguarded(
        &self,
        path: PathBuf,
        source: WallpaperSource,
        metadata: BTreeMap<String, String>,
    ) -> Result<ApplyOutcome, WallpaperError> {
        self.with_state(|state| state.apply_status = ApplyStatus::Applying);

        let adapter = self.adapter.clone();
        let target = path.clone();
        let report = match run_blocking(
            move || adapter.apply_wallpaper(&target),
            WallpaperError::apply,
        )
        .await
        {
            Ok(report) => report,
            Err(err) => {
                self.record_failure(&err);
                return Err(err);
            }
        };

        let warning = report.warning().cloned();
        if let Some(warning) = &warning {
            emit(
                Level::Warn,
                "wallpaper.spaces_sync_failed",
                &format!("Wallpaper set on visible desktops only: {}", warning),
                None,
            );
        }

        let entry = HistoryEntry::new(path.clone(), source, metadata);
        let history = self.with_state(|state| {
            let mut envelope = PersistenceEnvelope {
                history: std::mem::take(&mut state.history),
                ..Default::default()
            };
            envelope.record(entry.clone());
            state.history = envelope.history;
            state.last_applied = Some(path.clone());
            state.apply_status = ApplyStatus::Success(APPLIED_MESSAGE.to_string());
            state.history.clone()
        });

        let persistence = self.persistence.clone();
        let applied = path.clone();
        let saved = run_blocking(
            move || {
                persistence.save_history(&history)?;
                persistence.save_last_applied(Some(&applied))
            },
            persistence_join_error,
        )
        .await;
        if let Err(err) = saved {
            self.record_failure(&err);
            return Err(err);
        }

        emit(
            Level::Success,
            "wallpaper.applied",
            &format!("Applied {}", path.display()),
            None,
        );
        Ok(ApplyOutcome { entry, warning })
    }

    /// Render the current draft (or `draft`, which then becomes current) at screen size and
    /// select the result
    pub async fn generate_goals(
        &self,
        draft: Option<GoalsDraft>,
    ) -> Option<Result<RenderedWallpaper, WallpaperError>> {
        let _guard = self.try_begin()?;
        Some(self.generate_unguarded(draft).await)
    }

    /// Render the goals wallpaper and apply it in one busy section
    pub async fn generate_and_apply(
        &self,
        draft: Option<GoalsDraft>,
    ) -> Option<Result<(RenderedWallpaper, ApplyOutcome), WallpaperError>> {
        let _guard = self.try_begin()?;
        let rendered = match self.generate_unguarded(draft).await {
            Ok(rendered) => rendered,
            Err(err) => return Some(Err(err)),
        };
        let title = self.with_state(|state| state.goals_draft.title.trim().to_string());
        let metadata = BTreeMap::from([("title".to_string(), title)]);
        Some(
            self.apply_unguarded(rendered.file_url.clone(), WallpaperSource::GeneratedGoals, metadata)
                .await
                .map(|outcome| (rendered, outcome)),
        )
    }

    async fn generate_unguarded(
        &self,
        draft: Option<GoalsDraft>,
    ) -> Result<RenderedWallpaper, WallpaperError> {
        let draft = match draft {
            Some(draft) => {
                self.with_state(|state| state.goals_draft = draft.clone());
                draft
            }
            None => self.with_state(|state| state.goals_draft.clone()),
        };
        let size = self.screen_size();

        let renderer = self.renderer.clone();
        let output_dir = self.dirs.generated.clone();
        let to_render = draft.clone();
        let rendered = match run_blocking(
            move || renderer.render(&to_render, size, &output_dir),
            WallpaperError::render,
        )
        .await
        {
            Ok(rendered) => rendered,
            Err(err) => {
                self.record_failure(&err);
                return Err(err);
            }
        };

        self.with_state(|state| {
            state.selected_image = Some(rendered.file_url.clone());
            state.crop.reset();
        });

        let persistence = self.persistence.clone();
        let saved = run_blocking(
            move || persistence.save_goals_draft(&draft),
            persistence_join_error,
        )
        .await;
        if let Err(err) = saved {
            self.record_failure(&err);
            return Err(err);
        }

        self.with_state(|state| {
            state.apply_status = ApplyStatus::Success(GENERATED_MESSAGE.to_string());
        });
        Ok(rendered)
    }

    /// Materialize `crop` of the selected image at screen size and apply it.
    ///
    /// A default crop applies the original file untouched.
    pub async fn crop_and_apply(
        &self,
        crop: CropState,
    ) -> Option<Result<ApplyOutcome, WallpaperError>> {
        let _guard = self.try_begin()?;
        Some(self.crop_and_apply_unguarded(crop).await)
    }

    async fn crop_and_apply_unguarded(&self, crop: CropState) -> Result<ApplyOutcome, WallpaperError> {
        let Some(original) = self.with_state(|state| state.selected_image.clone()) else {
            let err = WallpaperError::FileNotFound {
                path: "No file selected".to_string(),
            };
            self.record_error(&err);
            return Err(err);
        };

        if crop.is_default() {
            self.with_state(|state| state.crop = crop);
            return self
                .apply_unguarded(original, WallpaperSource::LocalImage, BTreeMap::new())
                .await;
        }

        if let Err(err) = self.adapter.validate_image(&original) {
            self.record_failure(&err);
            return Err(err);
        }

        let screen = self.screen_size();
        let output_dir = self.dirs.cropped.clone();
        let source = original.clone();
        let cropped = run_blocking(
            move || {
                let image = crop::image_size(&source)?;
                let committed = crop.aspect_locked(screen).clamped(image);
                crop::crop_to_file(&source, &committed, screen, &output_dir)
                    .map(|rendered| (committed, rendered))
            },
            WallpaperError::render,
        )
        .await;
        let (committed, rendered) = match cropped {
            Ok(result) => result,
            Err(err) => {
                self.record_failure(&err);
                return Err(err);
            }
        };
        self.with_state(|state| state.crop = committed);

        let metadata = BTreeMap::from([(
            "croppedFrom".to_string(),
            original.to_string_lossy().to_string(),
        )]);
        self.apply_unguarded(rendered.file_url, WallpaperSource::LocalImage, metadata)
            .await
    }

    /// Replace the draft and persist it
    pub async fn update_draft(&self, draft: GoalsDraft) -> Result<(), WallpaperError> {
        self.with_state(|state| state.goals_draft = draft.clone());
        let persistence = self.persistence.clone();
        let saved = run_blocking(
            move || persistence.save_goals_draft(&draft),
            persistence_join_error,
        )
        .await;
        if let Err(err) = &saved {
            self.record_error(err);
        }
        saved
    }

    /// Render a throwaway preview of `draft` once edits settle
    pub async fn preview_goals(&self, draft: GoalsDraft) -> Result<PreviewOutcome, WallpaperError> {
        if !self.preview.settle().await {
            return Ok(PreviewOutcome::Superseded);
        }
        let size = self.screen_size();
        let renderer = self.renderer.clone();
        let output_dir = self.dirs.preview.clone();
        run_blocking(
            move || renderer.render(&draft, size, &output_dir),
            WallpaperError::render,
        )
        .await
        .map(PreviewOutcome::Rendered)
    }

    /// Remove one entry by id; false if no entry matched
    pub async fn delete_history(&self, id: Uuid) -> Result<bool, WallpaperError> {
        let (removed, history) = self.with_state(|state| {
            let before = state.history.len();
            state.history.retain(|entry| entry.id != id);
            (state.history.len() != before, state.history.clone())
        });
        if removed {
            self.save_history(history, "deleteHistoryEntry").await?;
        }
        Ok(removed)
    }

    pub async fn clear_history(&self) -> Result<(), WallpaperError> {
        self.with_state(|state| state.history.clear());
        self.save_history(Vec::new(), "clearHistory").await
    }

    async fn save_history(&self, history: Vec<HistoryEntry>, operation: &'static str) -> Result<(), WallpaperError> {
        let persistence = self.persistence.clone();
        let saved = run_blocking(
            move || persistence.save_history(&history),
            move |detail| WallpaperError::PersistenceFailed {
                operation: operation.to_string(),
                detail,
            },
        )
        .await;
        if let Err(err) = &saved {
            self.record_error(err);
        }
        saved
    }

    pub async fn current_wallpapers(&self) -> Result<Vec<PathBuf>, WallpaperError> {
        let adapter = self.adapter.clone();
        run_blocking(move || adapter.current_wallpapers(), WallpaperError::apply).await
    }
}
