mod common;
mod ui;
mod wallpaper;

use clap::Parser;
use colored::control;
use serde_json::json;

use crate::ui::OutputFormat;
use crate::wallpaper::cli::WallpaperCommands;
use crate::wallpaper::error::WallpaperError;

/// Set macOS wallpapers across every display and space
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Activate debug mode: verbose diagnostics and a log of every external command
    #[arg(short, long, global = true)]
    debug: bool,

    /// Format of diagnostics written to stderr
    #[arg(long, value_enum, global = true, default_value = "text")]
    format: OutputFormat,

    /// Disable colored diagnostics
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: WallpaperCommands,
}

/// Failure document written to stderr
fn error_envelope(err: &anyhow::Error) -> serde_json::Value {
    match err.downcast_ref::<WallpaperError>() {
        Some(domain) => json!({
            "error": true,
            "code": domain.code(),
            "message": domain.to_string(),
            "suggestion": domain.suggestion(),
        }),
        None => json!({
            "error": true,
            "code": "internal",
            "message": format!("{:#}", err),
            "suggestion": "",
        }),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    ui::set_debug_mode(cli.debug);
    let color = !cli.no_color && std::env::var_os("NO_COLOR").is_none();
    if !color {
        control::set_override(false);
    }
    ui::init(cli.format, color);

    if let Err(err) = wallpaper::commands::handle_wallpaper_command(cli.command).await {
        ui::emit(ui::Level::Debug, "wallset.error", &format!("{:?}", err), None);
        ui::respond_error(&error_envelope(&err));
        std::process::exit(1);
    }
}
