// src/overlay/renderer.rs
//
// Draws the latest detection snapshot onto a transparent surface sized to
// the displayed image.
//
// Each pass produces two things:
//   - a display list (`Primitive`s) describing what was drawn, in draw order
//   - the rasterised RGBA surface, ready to be laid over the frame
//
// Draw order: vehicles, traffic lights, crosswalk. The surface is cleared
// (or reallocated on a size change) at the start of every pass, so a render
// never shows boxes from an earlier snapshot.

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, bail, Context, Result};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::debug;

use super::coords::{map_corners, map_sized, ScaleFactors, ScreenRect};
use crate::snapshot::DetectionSnapshot;
use crate::types::Size;

pub const LINE_WIDTH: u32 = 2;
pub const LABEL_FONT_PX: f32 = 14.0;
/// Label origin relative to the box's top-left corner.
pub const LABEL_OFFSET: (f64, f64) = (2.0, 2.0);
pub const CROSSWALK_LABEL: &str = "Crosswalk";

// ============================================================================
// COLORS
// ============================================================================

pub mod colors {
    use image::Rgba;

    pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

    pub const VEHICLE: Rgba<u8> = Rgba([255, 255, 0, 255]);
    pub const CROSSWALK: Rgba<u8> = Rgba([0, 0, 255, 255]);

    // Traffic lights
    pub const RED_LIGHT: Rgba<u8> = Rgba([255, 0, 0, 255]);
    pub const GREEN_LIGHT: Rgba<u8> = Rgba([0, 128, 0, 255]);
    pub const OTHER_LIGHT: Rgba<u8> = Rgba([255, 165, 0, 255]);
}

/// Defined for every label, including a missing one.
pub fn traffic_light_color(label: Option<&str>) -> Rgba<u8> {
    match label {
        Some("red_light") => colors::RED_LIGHT,
        Some("green_light") => colors::GREEN_LIGHT,
        _ => colors::OTHER_LIGHT,
    }
}

// ============================================================================
// DISPLAY LIST
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    StrokeRect {
        rect: ScreenRect,
        color: Rgba<u8>,
        line_width: u32,
    },
    Label {
        x: f64,
        y: f64,
        text: String,
        color: Rgba<u8>,
    },
}

/// Sizes needed for one render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    /// Size the frame is shown at; the overlay surface matches it exactly.
    pub displayed: Size,
    /// Decoded size of the frame, used when the snapshot omits frame dimensions.
    pub natural: Size,
}

pub struct Overlay {
    size: Size,
    primitives: Vec<Primitive>,
    surface: RgbaImage,
}

impl Default for Overlay {
    fn default() -> Self {
        Self {
            size: Size::new(0, 0),
            primitives: Vec::new(),
            surface: RgbaImage::new(0, 0),
        }
    }
}

impl Overlay {
    pub fn size(&self) -> Size {
        self.size
    }

    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    fn reset(&mut self, size: Size) {
        if self.size != size {
            self.surface = RgbaImage::new(size.width, size.height);
            self.size = size;
        } else {
            for pixel in self.surface.pixels_mut() {
                *pixel = colors::TRANSPARENT;
            }
        }
        self.primitives.clear();
    }
}

#[cfg(test)]
impl Overlay {
    pub fn rects(&self) -> impl Iterator<Item = (ScreenRect, Rgba<u8>)> + '_ {
        self.primitives.iter().filter_map(|p| match p {
            Primitive::StrokeRect { rect, color, .. } => Some((*rect, *color)),
            _ => None,
        })
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> + '_ {
        self.primitives.iter().filter_map(|p| match p {
            Primitive::Label { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

// ============================================================================
// RENDERER
// ============================================================================

#[derive(Default)]
pub struct OverlayRenderer {
    font: Option<FontVec>,
    overlay: Overlay,
}

impl OverlayRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font(font: FontVec) -> Self {
        Self {
            font: Some(font),
            overlay: Overlay::default(),
        }
    }

    pub fn from_font_file(path: &str) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read font {}", path))?;
        let font = FontVec::try_from_vec(bytes).map_err(|e| anyhow!("Invalid font {}: {}", path, e))?;
        Ok(Self::with_font(font))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    /// Drops the surface allocation. The next render reallocates it.
    pub fn release(&mut self) {
        self.overlay = Overlay::default();
    }

    pub fn render(&mut self, snapshot: &DetectionSnapshot, frame: FrameGeometry) -> &Overlay {
        self.overlay.reset(frame.displayed);

        let source = snapshot.source_size(frame.natural);
        let scale = ScaleFactors::between(frame.displayed, source);
        let mut primitives = Vec::new();

        for vehicle in snapshot.vehicles.iter().flatten() {
            let text = format!(
                "{} ({})",
                vehicle.label.as_deref().unwrap_or("vehicle"),
                vehicle.id.as_ref().map_or("?", |id| id.0.as_str())
            );
            push_box(
                &mut primitives,
                map_corners(vehicle.bbox, scale),
                colors::VEHICLE,
                Some(text),
            );
        }

        for light in snapshot.traffic_lights.iter().flatten() {
            push_box(
                &mut primitives,
                map_corners(light.bbox, scale),
                traffic_light_color(light.label.as_deref()),
                light.label.clone(),
            );
        }

        if let Some(crosswalk) = snapshot.crosswalk_bbox {
            push_box(
                &mut primitives,
                map_sized(crosswalk, scale),
                colors::CROSSWALK,
                Some(CROSSWALK_LABEL.to_string()),
            );
        }

        for primitive in &primitives {
            rasterize(&mut self.overlay.surface, self.font.as_ref(), primitive);
        }
        debug!(
            "Overlay rendered: {} primitives on {} (source {}, scale {:.3}x{:.3})",
            primitives.len(),
            frame.displayed,
            source,
            scale.x,
            scale.y
        );
        self.overlay.primitives = primitives;
        &self.overlay
    }
}

fn push_box(out: &mut Vec<Primitive>, rect: ScreenRect, color: Rgba<u8>, label: Option<String>) {
    out.push(Primitive::StrokeRect {
        rect,
        color,
        line_width: LINE_WIDTH,
    });
    if let Some(text) = label {
        out.push(Primitive::Label {
            x: rect.x + LABEL_OFFSET.0,
            y: rect.y + LABEL_OFFSET.1,
            text,
            color,
        });
    }
}

fn rasterize(surface: &mut RgbaImage, font: Option<&FontVec>, primitive: &Primitive) {
    match primitive {
        Primitive::StrokeRect {
            rect,
            color,
            line_width,
        } => stroke_rect(surface, *rect, *color, *line_width),
        Primitive::Label { x, y, text, color } => {
            // labels stay in the display list only until a font is configured
            if let Some(font) = font {
                draw_text_mut(
                    surface,
                    *color,
                    x.round() as i32,
                    y.round() as i32,
                    PxScale::from(LABEL_FONT_PX),
                    font,
                    text,
                );
            }
        }
    }
}

/// Strokes `line_width` nested outlines inward from the box edge.
fn stroke_rect(surface: &mut RgbaImage, rect: ScreenRect, color: Rgba<u8>, line_width: u32) {
    let (width, height) = surface.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    // Edges far off-canvas are pulled in to just outside it; nothing visible
    // changes but the line rasteriser no longer walks millions of pixels.
    let margin = line_width as i64 + 1;
    let clamp_x = |v: f64| (v.round() as i64).clamp(-margin, width as i64 + margin);
    let clamp_y = |v: f64| (v.round() as i64).clamp(-margin, height as i64 + margin);

    let (x0, x1) = ordered(rect.x, rect.x + rect.width);
    let (y0, y1) = ordered(rect.y, rect.y + rect.height);
    let (left, right) = (clamp_x(x0), clamp_x(x1));
    let (top, bottom) = (clamp_y(y0), clamp_y(y1));

    for inset in 0..line_width as i64 {
        let w = right - left - 2 * inset;
        let h = bottom - top - 2 * inset;
        if inset > 0 && (w <= 0 || h <= 0) {
            break;
        }
        let outline = Rect::at((left + inset) as i32, (top + inset) as i32)
            .of_size(w.max(1) as u32, h.max(1) as u32);
        draw_hollow_rect_mut(surface, outline, color);
    }
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Frame scaled to the overlay's size with the overlay alpha-blended on top.
pub fn compose(frame_bytes: &[u8], overlay: &Overlay) -> Result<RgbaImage> {
    let size = overlay.size();
    if size.is_empty() {
        bail!("No overlay surface to compose onto");
    }

    let frame = image::load_from_memory(frame_bytes)
        .context("Failed to decode frame for composition")?
        .to_rgba8();
    let mut base = if frame.dimensions() == (size.width, size.height) {
        frame
    } else {
        imageops::resize(&frame, size.width, size.height, FilterType::Triangle)
    };
    imageops::overlay(&mut base, overlay.surface(), 0, 0);
    Ok(base)
}
