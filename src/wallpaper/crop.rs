//! Pan and zoom cropping
//!
//! The preview container has the screen's aspect ratio. The image is scaled to cover it
//! (the fill scale), then zoomed and offset by the user. Committed state is always clamped so
//! the image never uncovers the container; in-flight gestures are kept separately until they
//! end.

use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::common::display::ScreenSize;
use crate::wallpaper::error::WallpaperError;
use crate::wallpaper::goals::timestamped_path;
use crate::wallpaper::models::RenderedWallpaper;

pub const MIN_ZOOM: f64 = 1.0;
pub const MAX_ZOOM: f64 = 5.0;

/// Container size used when the viewing area or screen has no usable geometry
const FALLBACK_CONTAINER: (f64, f64) = (100.0, 100.0);

/// Scroll sensitivity for trackpads (precise deltas) and notched wheels
const PRECISE_SCROLL_SENSITIVITY: f64 = 0.005;
const LINE_SCROLL_SENSITIVITY: f64 = 0.03;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropState {
    #[serde(default)]
    pub offset_x: f64,
    #[serde(default)]
    pub offset_y: f64,
    #[serde(default = "default_zoom")]
    pub zoom: f64,
    pub container_width: f64,
    pub container_height: f64,
}

fn default_zoom() -> f64 {
    MIN_ZOOM
}

impl Default for CropState {
    fn default() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            zoom: MIN_ZOOM,
            container_width: 0.0,
            container_height: 0.0,
        }
    }
}

impl CropState {
    pub fn with_container(width: f64, height: f64) -> Self {
        Self {
            container_width: width,
            container_height: height,
            ..Default::default()
        }
    }

    pub fn is_default(&self) -> bool {
        self.zoom == MIN_ZOOM && self.offset_x == 0.0 && self.offset_y == 0.0
    }

    /// Back to zoom 1 and no offset, keeping the container
    pub fn reset(&mut self) {
        *self = Self::with_container(self.container_width, self.container_height);
    }

    /// The same crop with the container narrowed to the screen's aspect ratio.
    ///
    /// A container without usable geometry is returned unchanged so cropping reports it.
    pub fn aspect_locked(self, screen: ScreenSize) -> Self {
        if !(self.container_width > 0.0 && self.container_height > 0.0) || screen.aspect_ratio() <= 0.0 {
            return self;
        }
        let (container_width, container_height) =
            fitted_container(self.container_width, self.container_height, screen);
        Self {
            container_width,
            container_height,
            ..self
        }
    }

    /// Zoom clamped to the allowed range, then offset clamped to the pan it allows
    pub fn clamped(self, image: ScreenSize) -> Self {
        let zoom = clamp_zoom(self.zoom);
        let (offset_x, offset_y) = clamp_offset(
            image,
            self.container_width,
            self.container_height,
            zoom,
            (self.offset_x, self.offset_y),
        );
        Self {
            offset_x,
            offset_y,
            zoom,
            ..self
        }
    }
}

pub fn clamp_zoom(zoom: f64) -> f64 {
    if zoom.is_nan() {
        return MIN_ZOOM;
    }
    zoom.clamp(MIN_ZOOM, MAX_ZOOM)
}

/// Largest rectangle with the screen's aspect ratio that fits the available area
pub fn fitted_container(available_width: f64, available_height: f64, screen: ScreenSize) -> (f64, f64) {
    let ratio = screen.aspect_ratio();
    if available_width <= 0.0 || available_height <= 0.0 || ratio <= 0.0 {
        return FALLBACK_CONTAINER;
    }
    if ratio > available_width / available_height {
        (available_width, available_width / ratio)
    } else {
        (available_height * ratio, available_height)
    }
}

/// Minimum scale at which the image covers the container
pub fn fill_scale(image: ScreenSize, container_width: f64, container_height: f64) -> f64 {
    (container_width / image.width as f64).max(container_height / image.height as f64)
}

fn has_geometry(image: ScreenSize, container_width: f64, container_height: f64) -> bool {
    image.width > 0 && image.height > 0 && container_width > 0.0 && container_height > 0.0
}

/// Largest offset magnitude per axis that keeps the container covered
pub fn max_pan(image: ScreenSize, container_width: f64, container_height: f64, zoom: f64) -> (f64, f64) {
    if !has_geometry(image, container_width, container_height) {
        return (0.0, 0.0);
    }
    let scale = fill_scale(image, container_width, container_height) * zoom;
    let displayed_w = image.width as f64 * scale;
    let displayed_h = image.height as f64 * scale;
    (
        ((displayed_w - container_width) / 2.0).max(0.0),
        ((displayed_h - container_height) / 2.0).max(0.0),
    )
}

pub fn clamp_offset(
    image: ScreenSize,
    container_width: f64,
    container_height: f64,
    zoom: f64,
    offset: (f64, f64),
) -> (f64, f64) {
    let (max_x, max_y) = max_pan(image, container_width, container_height, zoom);
    (offset.0.clamp(-max_x, max_x), offset.1.clamp(-max_y, max_y))
}

/// Gesture in progress, not yet folded into the committed state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CropGesture {
    Drag { dx: f64, dy: f64 },
    Magnify { factor: f64 },
}

/// Committed crop for one image plus whatever gesture is in flight
#[derive(Debug, Clone, PartialEq)]
pub struct CropSession {
    image: ScreenSize,
    committed: CropState,
    gesture: Option<CropGesture>,
}

impl CropSession {
    #[cfg(test)]
    pub fn new(image: ScreenSize, container_width: f64, container_height: f64) -> Self {
        Self {
            image,
            committed: CropState::with_container(container_width, container_height),
            gesture: None,
        }
    }

    /// Continue from a previously committed state, re-clamped for `image`
    pub fn resume(image: ScreenSize, state: CropState) -> Self {
        Self {
            image,
            committed: state.clamped(image),
            gesture: None,
        }
    }

    pub fn committed(&self) -> CropState {
        self.committed
    }

    /// What the preview shows right now: committed state combined with the live gesture
    pub fn effective(&self) -> CropState {
        effective_state(self.committed, self.gesture, self.image)
    }

    pub fn update_gesture(&mut self, gesture: CropGesture) {
        self.gesture = Some(gesture);
    }

    /// Fold the gesture into the committed state and clamp
    pub fn end_gesture(&mut self, gesture: CropGesture) {
        self.gesture = None;
        let mut next = self.committed;
        match gesture {
            CropGesture::Drag { dx, dy } => {
                next.offset_x += dx;
                next.offset_y += dy;
            }
            CropGesture::Magnify { factor } => {
                next.zoom *= factor;
            }
        }
        self.committed = next.clamped(self.image);
    }

    /// One scroll-wheel step; positive deltas zoom in
    pub fn scroll(&mut self, delta: f64, precise: bool) {
        let sensitivity = if precise {
            PRECISE_SCROLL_SENSITIVITY
        } else {
            LINE_SCROLL_SENSITIVITY
        };
        let mut next = self.committed;
        next.zoom *= 1.0 + delta * sensitivity;
        self.committed = next.clamped(self.image);
    }

    /// The viewing area changed; keep the crop but re-clamp for the new container
    pub fn resize_container(&mut self, available_width: f64, available_height: f64, screen: ScreenSize) {
        let (width, height) = fitted_container(available_width, available_height, screen);
        let mut next = self.committed;
        next.container_width = width;
        next.container_height = height;
        self.committed = next.clamped(self.image);
    }

    pub fn reset(&mut self) {
        self.gesture = None;
        self.committed.reset();
    }

    /// Replay one recorded step and return what the preview showed while it ran
    pub fn apply_step(&mut self, step: CropStep, screen: ScreenSize) -> CropState {
        let gesture = match step {
            CropStep::Drag { dx, dy } => CropGesture::Drag { dx, dy },
            CropStep::Magnify { factor } => CropGesture::Magnify { factor },
            CropStep::Scroll { delta, precise } => {
                self.scroll(delta, precise);
                return self.committed;
            }
            CropStep::Resize { width, height } => {
                self.resize_container(width, height, screen);
                return self.committed;
            }
            CropStep::Reset => {
                self.reset();
                return self.committed;
            }
        };
        self.update_gesture(gesture);
        let shown = self.effective();
        self.end_gesture(gesture);
        shown
    }
}

/// A recorded preview interaction, as sent with a crop request
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CropStep {
    Drag {
        dx: f64,
        dy: f64,
    },
    Magnify {
        factor: f64,
    },
    Scroll {
        delta: f64,
        #[serde(default)]
        precise: bool,
    },
    /// The viewing area changed to `width` x `height`
    Resize {
        width: f64,
        height: f64,
    },
    Reset,
}

/// Committed state plus a transient gesture, as displayed.
///
/// Zoom is clamped while magnifying and the offset is clamped against that zoom, matching
/// what the committed state becomes when the gesture ends.
pub fn effective_state(committed: CropState, gesture: Option<CropGesture>, image: ScreenSize) -> CropState {
    let mut state = committed;
    match gesture {
        Some(CropGesture::Drag { dx, dy }) => {
            state.offset_x += dx;
            state.offset_y += dy;
        }
        Some(CropGesture::Magnify { factor }) => {
            state.zoom *= factor;
        }
        None => {}
    }
    state.clamped(image)
}

/// Integer source-pixel rectangle selected by a crop state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Map a crop state back to source pixels.
///
/// The rectangle is the container divided by the total scale, centered on the image center
/// shifted by the offset. It is intersected with the image bounds and expanded outward to whole
/// pixels; an empty intersection is a render failure.
pub fn crop_rect(image: ScreenSize, state: &CropState) -> Result<CropRect, WallpaperError> {
    if !has_geometry(image, state.container_width, state.container_height) {
        return Err(WallpaperError::render(format!(
            "invalid crop geometry: image {}x{}, container {}x{}",
            image.width, image.height, state.container_width, state.container_height
        )));
    }

    let (img_w, img_h) = (image.width as f64, image.height as f64);
    let total = fill_scale(image, state.container_width, state.container_height) * state.zoom;
    if !total.is_finite() || total <= 0.0 {
        return Err(WallpaperError::render("invalid crop scale"));
    }

    let crop_w = state.container_width / total;
    let crop_h = state.container_height / total;
    let center_x = img_w / 2.0 - state.offset_x / total;
    let center_y = img_h / 2.0 - state.offset_y / total;

    let left = (center_x - crop_w / 2.0).max(0.0);
    let top = (center_y - crop_h / 2.0).max(0.0);
    let right = (center_x + crop_w / 2.0).min(img_w);
    let bottom = (center_y + crop_h / 2.0).min(img_h);

    if right <= left || bottom <= top {
        return Err(WallpaperError::render("crop rectangle is outside the image"));
    }

    let x = left.floor() as u32;
    let y = top.floor() as u32;
    let width = (right.ceil() as u32).min(image.width) - x;
    let height = (bottom.ceil() as u32).min(image.height) - y;
    if width == 0 || height == 0 {
        return Err(WallpaperError::render("crop rectangle is empty"));
    }

    Ok(CropRect {
        x,
        y,
        width,
        height,
    })
}

/// Cut the crop out of `source` and resample it to exactly `output`
pub fn render_crop(
    source: &image::DynamicImage,
    state: &CropState,
    output: ScreenSize,
) -> Result<image::RgbaImage, WallpaperError> {
    if output.width == 0 || output.height == 0 {
        return Err(WallpaperError::render(format!(
            "invalid output size {}x{}",
            output.width, output.height
        )));
    }
    let image = ScreenSize::new(source.width(), source.height());
    let rect = crop_rect(image, state)?;
    let cropped = source.crop_imm(rect.x, rect.y, rect.width, rect.height);
    Ok(cropped
        .resize_exact(output.width, output.height, FilterType::Triangle)
        .to_rgba8())
}

/// HEIC/HEIF can be applied as is but the decoder has no support for cropping them
fn is_heif(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("heic") || ext.eq_ignore_ascii_case("heif"))
}

fn reader_for(path: &Path) -> Result<ImageReader<BufReader<File>>, WallpaperError> {
    if is_heif(path) {
        return Err(WallpaperError::render(format!(
            "cannot crop {}: HEIC images cannot be decoded; apply it uncropped or convert it to JPEG or PNG",
            path.display()
        )));
    }
    ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| WallpaperError::render(format!("cannot read image {}: {}", path.display(), e)))
}

/// Size after the EXIF rotation is applied
pub fn oriented_size(size: ScreenSize, orientation: Orientation) -> ScreenSize {
    match orientation {
        Orientation::Rotate90
        | Orientation::Rotate270
        | Orientation::Rotate90FlipH
        | Orientation::Rotate270FlipH => ScreenSize::new(size.height, size.width),
        _ => size,
    }
}

/// Pixel dimensions as displayed, without decoding the pixels
pub fn image_size(path: &Path) -> Result<ScreenSize, WallpaperError> {
    let mut decoder = reader_for(path)?.into_decoder().map_err(|e| {
        WallpaperError::render(format!("cannot read image {}: {}", path.display(), e))
    })?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let (width, height) = decoder.dimensions();
    Ok(oriented_size(ScreenSize::new(width, height), orientation))
}

/// Decode `path` upright, honoring its EXIF orientation
fn open_oriented(path: &Path) -> Result<DynamicImage, WallpaperError> {
    let decode_error =
        |e: image::ImageError| WallpaperError::render(format!("cannot decode {}: {}", path.display(), e));
    let mut decoder = reader_for(path)?.into_decoder().map_err(decode_error)?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut image = DynamicImage::from_decoder(decoder).map_err(decode_error)?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// Crop `source_path` and write `crop-YYYYMMDD-HHMMSS.png` under `output_dir`
pub fn crop_to_file(
    source_path: &Path,
    state: &CropState,
    output: ScreenSize,
    output_dir: &Path,
) -> Result<RenderedWallpaper, WallpaperError> {
    let source = open_oriented(source_path)?;
    let rendered = render_crop(&source, state, output)?;

    std::fs::create_dir_all(output_dir).map_err(|e| {
        WallpaperError::render(format!(
            "cannot create output directory {}: {}",
            output_dir.display(),
            e
        ))
    })?;
    let file_url = timestamped_path(output_dir, "crop");
    rendered
        .save_with_format(&file_url, image::ImageFormat::Png)
        .map_err(|e| WallpaperError::render(format!("Could not encode cropped image: {e}")))?;

    Ok(RenderedWallpaper {
        file_url,
        size: output,
    })
}
