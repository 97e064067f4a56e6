//! Goals wallpaper theme colors
//!
//! Every theme is an RGB triple serialized as `#rrggbb`. Older drafts stored one of two
//! symbolic names; those map onto fixed colors.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThemeColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

pub const DEFAULT_THEME_COLOR: ThemeColor = ThemeColor::rgb(0x1f, 0x1f, 0x1f);
pub const LEGACY_DARK: ThemeColor = ThemeColor::rgb(0x1f, 0x1f, 0x1f);
pub const LEGACY_LIGHT: ThemeColor = ThemeColor::rgb(0xf2, 0xf2, 0xf2);

const WHITE: ThemeColor = ThemeColor::rgb(255, 255, 255);
const BLACK: ThemeColor = ThemeColor::rgb(0, 0, 0);

const LIGHTEN_WEIGHT: f64 = 0.18;
const DARKEN_WEIGHT: f64 = 0.26;
const LUMINANCE_THRESHOLD: f64 = 0.56;

impl ThemeColor {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Canonicalize any user or persisted theme string.
    ///
    /// Accepts `#rgb` and `#rrggbb` in any case plus the legacy names
    /// `minimalDark`/`minimalLight`. Anything else becomes [`DEFAULT_THEME_COLOR`].
    pub fn normalize(input: &str) -> Self {
        let candidate = input.trim();
        match candidate {
            "" => return DEFAULT_THEME_COLOR,
            "minimalDark" => return LEGACY_DARK,
            "minimalLight" => return LEGACY_LIGHT,
            _ => {}
        }
        Self::parse_hex(candidate).unwrap_or(DEFAULT_THEME_COLOR)
    }

    /// Like [`ThemeColor::normalize`] but for arbitrary JSON; non-strings get the default
    pub fn from_value(value: &Value) -> Self {
        value
            .as_str()
            .map(Self::normalize)
            .unwrap_or(DEFAULT_THEME_COLOR)
    }

    fn parse_hex(candidate: &str) -> Option<Self> {
        let hex = candidate.strip_prefix('#')?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return None,
        };
        let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
        Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Linear per-channel interpolation toward `target`, rounded and clamped
    pub fn mix(&self, target: ThemeColor, weight: f64) -> Self {
        let channel = |base: u8, to: u8| {
            let value = base as f64 + (to as f64 - base as f64) * weight;
            value.round().clamp(0.0, 255.0) as u8
        };
        Self::rgb(
            channel(self.r, target.r),
            channel(self.g, target.g),
            channel(self.b, target.b),
        )
    }

    /// Relative luminance in [0, 1]
    pub fn luminance(&self) -> f64 {
        (0.2126 * self.r as f64 + 0.7152 * self.g as f64 + 0.0722 * self.b as f64) / 255.0
    }

    pub fn to_rgba(&self, alpha: u8) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, alpha])
    }
}

impl Default for ThemeColor {
    fn default() -> Self {
        DEFAULT_THEME_COLOR
    }
}

impl fmt::Display for ThemeColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ThemeColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ThemeColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextColor {
    Black,
    White,
}

impl TextColor {
    pub fn rgb(&self) -> ThemeColor {
        match self {
            TextColor::Black => BLACK,
            TextColor::White => WHITE,
        }
    }
}

/// Background gradient stops and a readable text color for one theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThemePalette {
    pub base: ThemeColor,
    pub gradient_top: ThemeColor,
    pub gradient_bottom: ThemeColor,
    pub text: TextColor,
}

impl ThemePalette {
    pub fn build(base: ThemeColor) -> Self {
        let mut gradient_top = base.mix(WHITE, LIGHTEN_WEIGHT);
        let mut gradient_bottom = base.mix(BLACK, DARKEN_WEIGHT);

        // Pure white cannot get lighter and pure black cannot get darker; nudge the
        // saturated stop the other way so neither stop collapses onto the base.
        if gradient_top == base {
            gradient_top = base.mix(BLACK, LIGHTEN_WEIGHT / 2.0);
        }
        if gradient_bottom == base {
            gradient_bottom = base.mix(WHITE, DARKEN_WEIGHT / 2.0);
        }

        let text = if base.luminance() > LUMINANCE_THRESHOLD {
            TextColor::Black
        } else {
            TextColor::White
        };

        Self {
            base,
            gradient_top,
            gradient_bottom,
            text,
        }
    }

    #[cfg(test)]
    pub fn from_theme(theme: &str) -> Self {
        Self::build(ThemeColor::normalize(theme))
    }
}
