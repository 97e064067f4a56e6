//! Self-documenting TOML configuration
//!
//! A config struct declares its defaults through serde. The `documented_config!` macro
//! adds a [`DocumentedConfig`] impl that writes every field with its description as an
//! inline comment, and writes unset optional fields commented out.
//!
//! ```ignore
//! documented_config!(WallsetConfig {
//!     fields: [
//!         sync_spaces, "Rewrite the wallpaper store for every space",
//!     ],
//!     optional: [
//!         output_dir, "Directory for generated images",
//!     ],
//!     config_path: paths::app_config_dir().map(|d| d.join("wallset.toml")),
//! });
//! ```

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ConfigFieldMeta {
    pub name: &'static str,
    /// TOML rendering of the default value, None if it cannot be rendered
    pub default_value: Option<String>,
    pub description: &'static str,
    pub is_optional: bool,
}

pub trait DocumentedConfig: Sized + Default + serde::de::DeserializeOwned {
    fn field_metadata() -> Vec<ConfigFieldMeta>;

    fn is_optional_field_set(&self, field_name: &str) -> bool;

    /// TOML rendering of the current value of a field
    fn get_field_value(&self, field_name: &str) -> String;

    fn config_path() -> Result<PathBuf>;

    /// Render the config with one documented line per field
    fn render_documented(&self) -> String {
        let mut output = String::new();
        for field in Self::field_metadata() {
            if field.is_optional && !self.is_optional_field_set(field.name) {
                let Some(default_val) = &field.default_value else {
                    continue;
                };
                output.push_str(&format!(
                    "# {} = {}  # {}\n",
                    field.name, default_val, field.description
                ));
            } else {
                output.push_str(&format!(
                    "{} = {}  # {}\n",
                    field.name,
                    self.get_field_value(field.name),
                    field.description
                ));
            }
        }
        output
    }

    fn save_with_documentation(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        fs::write(path, self.render_documented())
            .with_context(|| format!("writing config to {}", path.display()))?;
        Ok(())
    }

    /// Load from `path`, writing a documented default file first if none exists
    fn load_from_path_documented(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_with_documentation(path)?;
            return Ok(config);
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing config {}", path.display()))
    }

    fn load() -> Result<Self> {
        Self::load_from_path_documented(&Self::config_path()?)
    }
}

#[macro_export]
macro_rules! documented_config {
    (
        $config_name:ident {
            fields: [
                $($field:ident, $desc:expr),* $(,)?
            ],
            optional: [
                $($opt_field:ident, $opt_desc:expr),* $(,)?
            ],
            config_path: $path:expr $(,)?
        }
    ) => {
        impl $crate::common::config::DocumentedConfig for $config_name {
            fn field_metadata() -> Vec<$crate::common::config::ConfigFieldMeta> {
                let default_config = Self::default();
                vec![
                    $(
                        $crate::common::config::ConfigFieldMeta {
                            name: stringify!($field),
                            default_value: toml::Value::try_from(&default_config.$field)
                                .map(|v| v.to_string())
                                .ok(),
                            description: $desc,
                            is_optional: false,
                        },
                    )*
                    $(
                        $crate::common::config::ConfigFieldMeta {
                            name: stringify!($opt_field),
                            default_value: {
                                let inner_default = default_config.$opt_field.clone()
                                    .unwrap_or_default();
                                toml::Value::try_from(&inner_default)
                                    .map(|v| v.to_string())
                                    .ok()
                            },
                            description: $opt_desc,
                            is_optional: true,
                        },
                    )*
                ]
            }

            fn is_optional_field_set(&self, field_name: &str) -> bool {
                match field_name {
                    $(
                        stringify!($opt_field) => self.$opt_field.is_some(),
                    )*
                    _ => false,
                }
            }

            fn get_field_value(&self, field_name: &str) -> String {
                match field_name {
                    $(
                        stringify!($field) => toml::Value::try_from(&self.$field)
                            .map(|v| v.to_string())
                            .unwrap_or_else(|_| format!("{:?}", self.$field)),
                    )*
                    $(
                        stringify!($opt_field) => {
                            let value = self.$opt_field.clone().unwrap_or_default();
                            toml::Value::try_from(&value)
                                .map(|v| v.to_string())
                                .unwrap_or_else(|_| "\"\"".to_string())
                        }
                    )*
                    _ => String::new(),
                }
            }

            fn config_path() -> anyhow::Result<std::path::PathBuf> {
                $path
            }
        }
    };
}
