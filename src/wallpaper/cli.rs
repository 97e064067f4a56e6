use clap::{Args, Subcommand, ValueHint};
use std::path::PathBuf;

use crate::wallpaper::models::WallpaperSource;

#[derive(Subcommand, Debug, Clone)]
pub enum WallpaperCommands {
    /// Print persisted history, goals draft and last applied path
    Bootstrap,
    /// Set an image as the wallpaper on every desktop and space
    Apply(ApplyArgs),
    /// Render the goals wallpaper from a JSON draft
    GenerateGoals(GenerateArgs),
    /// Render a goals preview into the preview directory
    PreviewGoals(DraftArg),
    /// Persist the goals draft
    SaveDraft(DraftArg),
    /// Crop an image to the screen and apply it
    CropApply(CropApplyArgs),
    /// Re-apply the image of a history entry
    Restore(HistoryIdArg),
    /// Remove one history entry by id
    DeleteHistory(HistoryIdArg),
    /// Remove every history entry
    ClearHistory,
    /// Print the main display's pixel size
    ScreenInfo,
    /// Print the picture shown on each visible desktop
    Current,
    /// Show external commands logged while running with --debug
    Logs(LogsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ApplyArgs {
    /// Image to apply
    #[arg(value_hint = ValueHint::FilePath)]
    pub path: PathBuf,

    /// Where the image came from, recorded in history
    #[arg(long, value_enum, default_value = "local-image")]
    pub source: WallpaperSource,

    /// Extra history metadata as key=value (repeatable)
    #[arg(long = "meta", value_parser = parse_key_val)]
    pub metadata: Vec<(String, String)>,
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Draft as JSON: {"title", "goalsText", "theme"}
    pub draft: String,

    /// Apply the rendered image right away
    #[arg(long)]
    pub apply: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DraftArg {
    /// Draft as JSON: {"title", "goalsText", "theme"}
    pub draft: String,
}

#[derive(Args, Debug, Clone)]
pub struct CropApplyArgs {
    /// Crop as JSON: {"path", "zoom", "offsetX", "offsetY", "containerWidth", "containerHeight"},
    /// optionally with "gestures": [{"drag": {"dx", "dy"}}, {"magnify": {"factor"}},
    /// {"scroll": {"delta", "precise"}}, {"resize": {"width", "height"}}, "reset"]
    pub crop: String,
}

#[derive(Args, Debug, Clone)]
pub struct HistoryIdArg {
    /// History entry id
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct LogsArgs {
    /// Number of entries to show
    #[arg(short = 'n', long, default_value_t = 20)]
    pub limit: usize,

    /// Delete the command log instead of printing it
    #[arg(long)]
    pub clear: bool,
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_pairs_split_on_first_equals() {
        assert_eq!(
            parse_key_val("title=a=b").unwrap(),
            ("title".to_string(), "a=b".to_string())
        );
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }
}
