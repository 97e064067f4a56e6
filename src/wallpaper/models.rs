use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

use crate::common::display::ScreenSize;
use crate::wallpaper::theme::ThemeColor;

/// User-edited text for the generated goals wallpaper
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalsDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub goals_text: String,
    #[serde(default)]
    pub theme: ThemeColor,
}

impl GoalsDraft {
    /// Decode a draft from loosely typed JSON.
    ///
    /// Non-string text fields become empty and the theme is normalized, so a draft written
    /// by an older client never fails to load.
    pub fn from_json_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };
        let text = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            title: text("title"),
            goals_text: text("goalsText"),
            theme: object
                .get("theme")
                .map(ThemeColor::from_value)
                .unwrap_or_default(),
        }
    }

    /// Trimmed, non-empty goal lines in order
    pub fn goal_lines(&self) -> Vec<&str> {
        self.goals_text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect()
    }

    pub fn trimmed_title(&self) -> Option<&str> {
        let title = self.title.trim();
        (!title.is_empty()).then_some(title)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum WallpaperSource {
    LocalImage,
    GeneratedGoals,
}

/// One successful apply, immutable once recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    #[serde(rename = "fileURL")]
    pub file_url: PathBuf,
    pub created_at: DateTime<Utc>,
    pub source: WallpaperSource,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl HistoryEntry {
    pub fn new(
        file_url: PathBuf,
        source: WallpaperSource,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_url,
            created_at: Utc::now(),
            source,
            metadata,
        }
    }
}

/// An image written by the goals renderer or the cropper
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedWallpaper {
    #[serde(rename = "fileURL")]
    pub file_url: PathBuf,
    pub size: ScreenSize,
}

/// Everything that survives a restart, stored as one JSON document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceEnvelope {
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default, deserialize_with = "deserialize_draft")]
    pub goals_draft: GoalsDraft,
    #[serde(default)]
    pub last_applied_path: Option<PathBuf>,
}

fn deserialize_draft<'de, D>(deserializer: D) -> Result<GoalsDraft, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(GoalsDraft::from_json_value(&value))
}

impl PersistenceEnvelope {
    /// Insert newest-first, replacing any entry with the same id
    pub fn record(&mut self, entry: HistoryEntry) {
        self.history.retain(|existing| existing.id != entry.id);
        self.history.insert(0, entry);
    }

    pub fn sort_history(&mut self) {
        self.history
            .sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "camelCase")]
pub enum ApplyStatus {
    #[default]
    Idle,
    Applying,
    Success(String),
    Failure(String),
}
