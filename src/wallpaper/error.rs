use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WallpaperError {
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Unsupported image format: {path}")]
    UnsupportedFormat {
        path: String,
        supported: Vec<String>,
    },

    #[error("Could not apply wallpaper: {reason}")]
    ApplyFailed { reason: String },

    #[error("Permission denied while trying to {operation}: {detail}")]
    PermissionDenied { operation: String, detail: String },

    #[error("Could not save app data ({operation}): {detail}")]
    PersistenceFailed { operation: String, detail: String },

    #[error("Could not generate wallpaper: {reason}")]
    RenderFailed { reason: String },

    #[error("No goals provided")]
    EmptyGoals,
}

impl WallpaperError {
    /// Stable identifier used in the JSON error envelope
    pub fn code(&self) -> &'static str {
        match self {
            WallpaperError::FileNotFound { .. } => "file_not_found",
            WallpaperError::UnsupportedFormat { .. } => "unsupported_format",
            WallpaperError::ApplyFailed { .. } => "apply_failed",
            WallpaperError::PermissionDenied { .. } => "permission_denied",
            WallpaperError::PersistenceFailed { .. } => "persistence_failed",
            WallpaperError::RenderFailed { .. } => "render_failed",
            WallpaperError::EmptyGoals => "empty_goals",
        }
    }

    /// Actionable recovery hint shown next to the error message
    pub fn suggestion(&self) -> String {
        match self {
            WallpaperError::FileNotFound { path } => {
                format!("Verify that the file still exists at {}.", path)
            }
            WallpaperError::UnsupportedFormat { supported, .. } => {
                format!("Use one of these formats: {}.", supported.join(", "))
            }
            WallpaperError::ApplyFailed { .. } => "Try another image or retry apply.".to_string(),
            WallpaperError::PermissionDenied { operation, .. } => format!(
                "Allow this app to control System Events in System Settings > Privacy & Security > Automation, then retry {}.",
                operation
            ),
            WallpaperError::PersistenceFailed { .. } => {
                "Retry after checking available disk space and permissions.".to_string()
            }
            WallpaperError::RenderFailed { .. } => {
                "Adjust goals text/theme and try again. Crops need a decodable image: HEIC files can only be applied uncropped, so convert them to JPEG or PNG first.".to_string()
            }
            WallpaperError::EmptyGoals => {
                "Add at least one goal line before generating.".to_string()
            }
        }
    }

    pub fn persistence(operation: &str, err: impl std::fmt::Display) -> Self {
        WallpaperError::PersistenceFailed {
            operation: operation.to_string(),
            detail: err.to_string(),
        }
    }

    pub fn render(reason: impl Into<String>) -> Self {
        WallpaperError::RenderFailed {
            reason: reason.into(),
        }
    }

    pub fn apply(reason: impl Into<String>) -> Self {
        WallpaperError::ApplyFailed {
            reason: reason.into(),
        }
    }
}
