use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::common::command::{CommandRunner, SystemCommandRunner};
use crate::common::command_log::CommandLogger;
use crate::common::config::DocumentedConfig;
use crate::common::display::{FixedScreen, ScreenProvider, SystemProfilerScreens};
use crate::common::paths;
use crate::ui::prelude::*;
use crate::wallpaper::cli::{
    ApplyArgs, CropApplyArgs, DraftArg, GenerateArgs, HistoryIdArg, LogsArgs, WallpaperCommands,
};
use crate::wallpaper::config::WallsetConfig;
use crate::wallpaper::crop::{self, CropSession, CropState, CropStep};
use crate::wallpaper::goals::PngGoalsRenderer;
use crate::wallpaper::macos::MacOsAdapter;
use crate::wallpaper::models::{GoalsDraft, RenderedWallpaper};
use crate::wallpaper::persistence::FileWallpaperPersistence;
use crate::wallpaper::state::{
    APPLIED_MESSAGE, ApplyOutcome, OutputDirs, PreviewOutcome, WallpaperApp,
};

pub async fn handle_wallpaper_command(command: WallpaperCommands) -> Result<()> {
    if let WallpaperCommands::Logs(args) = &command {
        return handle_logs(args);
    }

    let config = WallsetConfig::load().context("loading wallset configuration")?;
    let app = build_app(&config)?;

    match command {
        WallpaperCommands::Bootstrap => handle_bootstrap(&app).await,
        WallpaperCommands::Apply(args) => handle_apply(&app, args).await,
        WallpaperCommands::GenerateGoals(args) => handle_generate(&app, args).await,
        WallpaperCommands::PreviewGoals(args) => handle_preview(&app, args).await,
        WallpaperCommands::SaveDraft(args) => handle_save_draft(&app, args).await,
        WallpaperCommands::CropApply(args) => handle_crop_apply(&app, args).await,
        WallpaperCommands::Restore(args) => handle_restore(&app, args).await,
        WallpaperCommands::DeleteHistory(args) => handle_delete_history(&app, args).await,
        WallpaperCommands::ClearHistory => handle_clear_history(&app).await,
        WallpaperCommands::ScreenInfo => handle_screen_info(&app),
        WallpaperCommands::Current => handle_current(&app).await,
        WallpaperCommands::Logs(_) => Ok(()),
    }
}

fn build_app(config: &WallsetConfig) -> Result<WallpaperApp> {
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner::new());
    let adapter = MacOsAdapter::new(runner.clone(), paths::home_dir()?, config.apply_timeout())
        .sync_spaces(config.sync_spaces);
    let screens: Arc<dyn ScreenProvider> = if cfg!(target_os = "macos") {
        Arc::new(SystemProfilerScreens::new(runner, config.fallback_screen()))
    } else {
        Arc::new(FixedScreen(config.fallback_screen()))
    };
    let dirs = OutputDirs {
        generated: config.generated_dir()?,
        cropped: config.cropped_dir()?,
        preview: paths::preview_dir()?,
    };

    Ok(WallpaperApp::new(
        Arc::new(adapter),
        Arc::new(PngGoalsRenderer),
        Arc::new(FileWallpaperPersistence::new(paths::state_file_path()?)),
        screens,
        dirs,
    )
    .with_preview_debounce(config.preview_debounce()))
}

fn busy() -> anyhow::Error {
    anyhow!("another wallpaper operation is already in progress")
}

fn parse_draft(raw: &str) -> Result<GoalsDraft> {
    let value: Value = serde_json::from_str(raw).context("parsing goals draft JSON")?;
    Ok(GoalsDraft::from_json_value(&value))
}

fn apply_response(outcome: &ApplyOutcome) -> Value {
    let mut response = json!({
        "success": true,
        "message": APPLIED_MESSAGE,
        "entry": outcome.entry,
    });
    if let Some(warning) = &outcome.warning {
        response["warning"] = json!(warning.to_string());
    }
    response
}

fn rendered_response(rendered: &RenderedWallpaper) -> Value {
    json!({
        "success": true,
        "fileURL": rendered.file_url,
        "width": rendered.size.width,
        "height": rendered.size.height,
    })
}

async fn handle_bootstrap(app: &WallpaperApp) -> Result<()> {
    let envelope = app.bootstrap().await?;
    respond(&serde_json::to_value(&envelope).context("serializing state")?);
    Ok(())
}

async fn handle_apply(app: &WallpaperApp, args: ApplyArgs) -> Result<()> {
    app.bootstrap().await?;
    let metadata: BTreeMap<String, String> = args.metadata.into_iter().collect();
    let outcome = app
        .apply_path(args.path, args.source, metadata)
        .await
        .ok_or_else(busy)??;
    respond(&apply_response(&outcome));
    Ok(())
}

async fn handle_generate(app: &WallpaperApp, args: GenerateArgs) -> Result<()> {
    let draft = parse_draft(&args.draft)?;
    app.bootstrap().await?;

    if args.apply {
        let (rendered, outcome) = app
            .generate_and_apply(Some(draft))
            .await
            .ok_or_else(busy)??;
        let mut response = rendered_response(&rendered);
        response["applied"] = apply_response(&outcome);
        respond(&response);
        return Ok(());
    }

    let rendered = app.generate_goals(Some(draft)).await.ok_or_else(busy)??;
    emit(
        Level::Info,
        "wallpaper.generated",
        &format!("Rendered {}", rendered.file_url.display()),
        None,
    );
    respond(&rendered_response(&rendered));
    Ok(())
}

async fn handle_preview(app: &WallpaperApp, args: DraftArg) -> Result<()> {
    let draft = parse_draft(&args.draft)?;
    match app.preview_goals(draft).await? {
        PreviewOutcome::Rendered(rendered) => respond(&rendered_response(&rendered)),
        PreviewOutcome::Superseded => respond(&json!({ "success": true, "superseded": true })),
    }
    Ok(())
}

async fn handle_save_draft(app: &WallpaperApp, args: DraftArg) -> Result<()> {
    let draft = parse_draft(&args.draft)?;
    app.bootstrap().await?;
    app.update_draft(draft).await?;
    respond(&json!({ "success": true }));
    Ok(())
}

#[derive(Debug, Deserialize)]
struct CropRequest {
    path: PathBuf,
    #[serde(flatten)]
    crop: CropState,
    /// Preview interactions to replay on top of `crop`
    #[serde(default)]
    gestures: Vec<CropStep>,
}

fn replay_gestures(app: &WallpaperApp, request: &CropRequest) -> Result<CropState> {
    if request.gestures.is_empty() {
        return Ok(request.crop);
    }
    app.validate_image(&request.path)?;
    let image = crop::image_size(&request.path)?;
    let screen = app.screen_size();

    let mut session = CropSession::resume(image, request.crop.aspect_locked(screen));
    for step in &request.gestures {
        let shown = session.apply_step(*step, screen);
        emit(
            Level::Debug,
            "crop.step",
            &format!(
                "{:?}: zoom {:.3}, offset ({:.1}, {:.1})",
                step, shown.zoom, shown.offset_x, shown.offset_y
            ),
            None,
        );
    }
    Ok(session.committed())
}

async fn handle_crop_apply(app: &WallpaperApp, args: CropApplyArgs) -> Result<()> {
    let request: CropRequest =
        serde_json::from_str(&args.crop).context("parsing crop request JSON")?;
    app.bootstrap().await?;
    let crop = replay_gestures(app, &request)?;
    app.select_image(request.path);
    let outcome = app
        .crop_and_apply(crop)
        .await
        .ok_or_else(busy)??;
    respond(&apply_response(&outcome));
    Ok(())
}

fn parse_history_id(args: &HistoryIdArg) -> Result<Uuid> {
    Uuid::parse_str(args.id.trim()).with_context(|| format!("invalid history id '{}'", args.id))
}

async fn handle_restore(app: &WallpaperApp, args: HistoryIdArg) -> Result<()> {
    let id = parse_history_id(&args)?;
    app.bootstrap().await?;
    let path = app.restore_history_entry(id)?;
    emit(
        Level::Debug,
        "wallpaper.history_restored",
        &format!("Restoring {}", path.display()),
        None,
    );
    let outcome = app.apply_selected().await.ok_or_else(busy)??;
    respond(&apply_response(&outcome));
    Ok(())
}

async fn handle_delete_history(app: &WallpaperApp, args: HistoryIdArg) -> Result<()> {
    let id = parse_history_id(&args)?;
    app.bootstrap().await?;
    let removed = app.delete_history(id).await?;
    if !removed {
        emit(
            Level::Warn,
            "wallpaper.history_missing",
            &format!("No history entry with id {}", id),
            None,
        );
    }
    respond(&json!({ "success": true, "removed": removed }));
    Ok(())
}

async fn handle_clear_history(app: &WallpaperApp) -> Result<()> {
    app.bootstrap().await?;
    app.clear_history().await?;
    respond(&json!({ "success": true }));
    Ok(())
}

fn handle_screen_info(app: &WallpaperApp) -> Result<()> {
    let size = app.screen_size();
    respond(&json!({ "width": size.width, "height": size.height }));
    Ok(())
}

async fn handle_current(app: &WallpaperApp) -> Result<()> {
    let wallpapers = app.current_wallpapers().await?;
    respond(&json!({ "wallpapers": wallpapers }));
    Ok(())
}

fn handle_logs(args: &LogsArgs) -> Result<()> {
    let logger = CommandLogger::new()?;
    if args.clear {
        logger.clear_logs()?;
        respond(&json!({ "success": true }));
        return Ok(());
    }
    let logs: Vec<_> = logger.get_logs()?.into_iter().take(args.limit).collect();
    respond(&json!({ "logs": logs }));
    Ok(())
}
