//! Goals wallpaper rasterizer
//!
//! Draws a vertical gradient in the theme's colors, an optional bold title and one bulleted
//! line per goal. Text uses the 8x8 bitmap font scaled up, so rendering needs no system fonts
//! and is identical on every machine.

use chrono::Local;
use font8x8::{BASIC_FONTS, GREEK_FONTS, LATIN_FONTS, UnicodeFonts};
use image::{ImageBuffer, ImageFormat, Rgba, RgbaImage};
use std::path::{Path, PathBuf};

use crate::common::display::ScreenSize;
use crate::wallpaper::error::WallpaperError;
use crate::wallpaper::models::{GoalsDraft, RenderedWallpaper};
use crate::wallpaper::theme::{ThemeColor, ThemePalette};

const GLYPH_SIZE: i32 = 8;
const TITLE_SCALE: i32 = 7;
const GOAL_SCALE: i32 = 5;
const TITLE_ADVANCE: i32 = 90;
const GOAL_ADVANCE: i32 = 62;
const TITLE_POSITION: f64 = 0.28;
const HORIZONTAL_INSET: f64 = 0.08;
const TITLE_ALPHA: u8 = 242;
const GOAL_ALPHA: u8 = 230;
const MAX_PIXELS: u64 = 16384 * 16384;

pub trait GoalsRenderer: Send + Sync {
    /// Render `draft` at exactly `size` pixels into a new PNG under `output_dir`
    fn render(
        &self,
        draft: &GoalsDraft,
        size: ScreenSize,
        output_dir: &Path,
    ) -> Result<RenderedWallpaper, WallpaperError>;
}

/// Writes `goals-YYYYMMDD-HHMMSS.png` files
#[derive(Debug, Clone, Copy, Default)]
pub struct PngGoalsRenderer;

impl GoalsRenderer for PngGoalsRenderer {
    fn render(
        &self,
        draft: &GoalsDraft,
        size: ScreenSize,
        output_dir: &Path,
    ) -> Result<RenderedWallpaper, WallpaperError> {
        let image = rasterize(draft, size)?;

        std::fs::create_dir_all(output_dir).map_err(|e| {
            WallpaperError::render(format!(
                "cannot create output directory {}: {}",
                output_dir.display(),
                e
            ))
        })?;

        let file_url = timestamped_path(output_dir, "goals");
        image
            .save_with_format(&file_url, ImageFormat::Png)
            .map_err(|e| WallpaperError::render(format!("cannot write PNG: {e}")))?;

        Ok(RenderedWallpaper { file_url, size })
    }
}

/// Unused `<prefix>-YYYYMMDD-HHMMSS.png` in `dir`, local time.
///
/// Within the same second later files get `-1`, `-2`, ... so earlier history entries keep
/// pointing at their own image.
pub fn timestamped_path(dir: &Path, prefix: &str) -> PathBuf {
    let stem = format!("{}-{}", prefix, Local::now().format("%Y%m%d-%H%M%S"));
    unused_path(dir, &stem)
}

fn unused_path(dir: &Path, stem: &str) -> PathBuf {
    let first = dir.join(format!("{stem}.png"));
    if !first.exists() {
        return first;
    }
    (1u32..)
        .map(|n| dir.join(format!("{stem}-{n}.png")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

/// Draw the goals wallpaper in memory
pub fn rasterize(draft: &GoalsDraft, size: ScreenSize) -> Result<RgbaImage, WallpaperError> {
    let goals = draft.goal_lines();
    if goals.is_empty() {
        return Err(WallpaperError::EmptyGoals);
    }
    if size.width == 0 || size.height == 0 {
        return Err(WallpaperError::render(format!(
            "invalid output size {}x{}",
            size.width, size.height
        )));
    }
    if size.width as u64 * size.height as u64 > MAX_PIXELS {
        return Err(WallpaperError::render(format!(
            "cannot allocate a {}x{} drawing surface",
            size.width, size.height
        )));
    }

    let palette = ThemePalette::build(draft.theme);
    let mut canvas = gradient(size, palette.gradient_top, palette.gradient_bottom);

    let width = size.width as f64;
    let left = (width * HORIZONTAL_INSET).round() as i32;
    let right = (width - width * HORIZONTAL_INSET).round() as i32;
    let text = palette.text.rgb();

    let mut cursor = (size.height as f64 * TITLE_POSITION).round() as i32;

    if let Some(title) = draft.trimmed_title() {
        let top = cursor - GLYPH_SIZE * TITLE_SCALE;
        let color = text.to_rgba(TITLE_ALPHA);
        let mut pen = TextPen::new(&mut canvas, right, TITLE_SCALE, color);
        pen.draw(left, top, title);
        // Faux bold
        pen.draw(left + (TITLE_SCALE / 3).max(1), top, title);
        cursor += TITLE_ADVANCE;
    }

    let bullet_radius = (GOAL_SCALE * GLYPH_SIZE) as f64 * 0.14;
    for line in goals {
        let top = cursor - GLYPH_SIZE * GOAL_SCALE;
        let color = text.to_rgba(GOAL_ALPHA);
        let cell = GLYPH_SIZE * GOAL_SCALE;
        draw_disc(
            &mut canvas,
            (left + cell / 2) as f64,
            (top + cell / 2) as f64,
            bullet_radius,
            color,
            right,
        );
        TextPen::new(&mut canvas, right, GOAL_SCALE, color).draw(left + 2 * cell, top, line);
        cursor += GOAL_ADVANCE;
    }

    Ok(canvas)
}

fn gradient(size: ScreenSize, top: ThemeColor, bottom: ThemeColor) -> RgbaImage {
    let span = (size.height.max(2) - 1) as f64;
    let lerp = |from: u8, to: u8, t: f64| {
        (from as f64 + (to as f64 - from as f64) * t)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    let rows: Vec<Rgba<u8>> = (0..size.height)
        .map(|y| {
            let t = y as f64 / span;
            Rgba([
                lerp(top.r, bottom.r, t),
                lerp(top.g, bottom.g, t),
                lerp(top.b, bottom.b, t),
                255,
            ])
        })
        .collect();
    ImageBuffer::from_fn(size.width, size.height, |_, y| rows[y as usize])
}

fn glyph(ch: char) -> Option<[u8; 8]> {
    BASIC_FONTS
        .get(ch)
        .or_else(|| LATIN_FONTS.get(ch))
        .or_else(|| GREEK_FONTS.get(ch))
        .or_else(|| BASIC_FONTS.get('?'))
}

fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let a = f64::from(src[3]) / 255.0;
    if a <= 0.0 {
        return dst;
    }
    let inv = 1.0 - a;
    let mix = |d: u8, s: u8| (f64::from(d) * inv + f64::from(s) * a).round().clamp(0.0, 255.0) as u8;
    Rgba([mix(dst[0], src[0]), mix(dst[1], src[1]), mix(dst[2], src[2]), 255])
}

/// Scaled bitmap text clipped to a right margin. Lines never wrap.
struct TextPen<'a> {
    canvas: &'a mut RgbaImage,
    clip_right: i32,
    scale: i32,
    color: Rgba<u8>,
}

impl<'a> TextPen<'a> {
    fn new(canvas: &'a mut RgbaImage, clip_right: i32, scale: i32, color: Rgba<u8>) -> Self {
        Self {
            canvas,
            clip_right,
            scale,
            color,
        }
    }

    fn draw(&mut self, x: i32, y: i32, text: &str) {
        let advance = GLYPH_SIZE * self.scale;
        let mut cursor_x = x;
        for ch in text.chars() {
            if cursor_x >= self.clip_right {
                break;
            }
            if let Some(rows) = glyph(ch) {
                self.glyph(cursor_x, y, rows);
            }
            cursor_x += advance;
        }
    }

    fn glyph(&mut self, x: i32, y: i32, rows: [u8; 8]) {
        let (width, height) = (self.canvas.width() as i32, self.canvas.height() as i32);
        let right = self.clip_right.min(width);
        for (row_idx, row) in rows.iter().enumerate() {
            for col in 0..GLYPH_SIZE {
                if (row >> col) & 1 == 0 {
                    continue;
                }
                let px = x + col * self.scale;
                let py = y + row_idx as i32 * self.scale;
                for ty in py.max(0)..(py + self.scale).min(height) {
                    for tx in px.max(0)..(px + self.scale).min(right) {
                        let dst = *self.canvas.get_pixel(tx as u32, ty as u32);
                        self.canvas
                            .put_pixel(tx as u32, ty as u32, blend_pixel(dst, self.color));
                    }
                }
            }
        }
    }
}

fn draw_disc(img: &mut RgbaImage, cx: f64, cy: f64, radius: f64, color: Rgba<u8>, clip_right: i32) {
    let right = clip_right.min(img.width() as i32) - 1;
    let bottom = img.height() as i32 - 1;
    if right < 0 || bottom < 0 {
        return;
    }
    let min_x = ((cx - radius).floor() as i32).clamp(0, right);
    let max_x = ((cx + radius).ceil() as i32).clamp(0, right);
    let min_y = ((cy - radius).floor() as i32).clamp(0, bottom);
    let max_y = ((cy + radius).ceil() as i32).clamp(0, bottom);
    let r2 = radius * radius;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let dx = f64::from(x) - cx;
            let dy = f64::from(y) - cy;
            if dx * dx + dy * dy <= r2 {
                let dst = *img.get_pixel(x as u32, y as u32);
                img.put_pixel(x as u32, y as u32, blend_pixel(dst, color));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallpaper::theme::ThemeColor;

    fn draft(title: &str, goals: &str) -> GoalsDraft {
        GoalsDraft {
            title: title.into(),
            goals_text: goals.into(),
            theme: ThemeColor::normalize("#1f1f1f"),
        }
    }

    #[test]
    fn whitespace_only_goals_are_rejected() {
        let err = rasterize(&draft("Title", "  \n\t\n "), ScreenSize::new(320, 200)).unwrap_err();
        assert_eq!(err, WallpaperError::EmptyGoals);
    }

    #[test]
    fn zero_sized_output_is_a_render_failure() {
        let err = rasterize(&draft("", "Ship it"), ScreenSize::new(0, 200)).unwrap_err();
        assert_eq!(err.code(), "render_failed");
    }

    #[test]
    fn background_runs_from_top_stop_to_bottom_stop() {
        let image = rasterize(&draft("", "x"), ScreenSize::new(64, 400)).unwrap();
        let palette = ThemePalette::from_theme("#1f1f1f");
        assert_eq!(*image.get_pixel(0, 0), palette.gradient_top.to_rgba(255));
        assert_eq!(*image.get_pixel(0, 399), palette.gradient_bottom.to_rgba(255));
    }

    #[test]
    fn text_is_drawn_inside_the_inset() {
        let size = ScreenSize::new(800, 600);
        let with_text = rasterize(&draft("Focus", "Ship the release"), size).unwrap();
        let palette = ThemePalette::from_theme("#1f1f1f");
        let background = gradient(size, palette.gradient_top, palette.gradient_bottom);

        let inset = (800.0 * HORIZONTAL_INSET).round() as u32;
        let mut changed_inside = false;
        for (x, y, pixel) in with_text.enumerate_pixels() {
            if pixel != background.get_pixel(x, y) {
                assert!(x >= inset && x < 800 - inset, "pixel drawn at x={x}");
                changed_inside = true;
            }
        }
        assert!(changed_inside);
    }

    #[test]
    fn long_lines_are_clipped_not_wrapped() {
        let size = ScreenSize::new(400, 300);
        let long = "w".repeat(200);
        let image = rasterize(&draft("", &long), size).unwrap();
        let palette = ThemePalette::from_theme("#1f1f1f");
        let background = gradient(size, palette.gradient_top, palette.gradient_bottom);

        let first_line_bottom = (300.0 * TITLE_POSITION).round() as u32;
        for (x, y, pixel) in image.enumerate_pixels() {
            if pixel != background.get_pixel(x, y) {
                assert!(y < first_line_bottom, "text spilled onto row {y}");
            }
        }
    }

    #[test]
    fn same_second_names_get_a_numeric_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let stem = "goals-20240501-100000";

        let first = unused_path(dir.path(), stem);
        assert_eq!(first, dir.path().join("goals-20240501-100000.png"));
        std::fs::write(&first, b"png").unwrap();

        let second = unused_path(dir.path(), stem);
        assert_eq!(second, dir.path().join("goals-20240501-100000-1.png"));
        std::fs::write(&second, b"png").unwrap();

        assert_eq!(
            unused_path(dir.path(), stem),
            dir.path().join("goals-20240501-100000-2.png")
        );
    }

    #[test]
    fn back_to_back_renders_keep_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("generated");
        let size = ScreenSize::new(64, 36);

        let first = PngGoalsRenderer.render(&draft("", "One"), size, &output).unwrap();
        let second = PngGoalsRenderer.render(&draft("", "Two"), size, &output).unwrap();

        assert_ne!(first.file_url, second.file_url);
        assert!(first.file_url.exists());
        assert!(second.file_url.exists());
    }

    #[test]
    fn render_writes_png_with_exact_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let size = ScreenSize::new(640, 360);
        let rendered = PngGoalsRenderer
            .render(&draft("Q3", "One\nTwo"), size, &dir.path().join("generated"))
            .unwrap();

        assert_eq!(rendered.size, size);
        let name = rendered.file_url.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("goals-") && name.ends_with(".png"), "{name}");
        assert_eq!(image::image_dimensions(&rendered.file_url).unwrap(), (640, 360));
    }
}
