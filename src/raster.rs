use crate::error::BannerPressError;
use crate::font::{LoadedFont, detect_direction, glyph_advance_units};
use crate::text::TextLayout;
use crate::types::{Rect, Rgb};
use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbaImage};
use rustybuzz::{Face as HbFace, UnicodeBuffer};
use std::path::Path as FsPath;
use tiny_skia::{FillRule, Mask, Path, PathBuilder, Transform};
use ttf_parser::{GlyphId, OutlineBuilder};

/// How overlay pixels are written onto the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PasteMode {
    /// Any overlay pixel with non-zero alpha replaces the destination pixel.
    #[default]
    MaskCutover,
    /// Destination and overlay are mixed by overlay alpha, alpha included.
    Blend,
}

/// Where and how large a resized overlay lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayPlacement {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

/// Fits a `src_width x src_height` image into `target`: height first, then
/// width if the height fit overflows horizontally. The width fit never
/// re-checks height. The result is centered with floor division.
pub fn plan_overlay(src_width: u32, src_height: u32, target: Rect) -> OverlayPlacement {
    let ratio = src_width.max(1) as f64 / src_height.max(1) as f64;
    let mut height = target.height.max(1);
    let mut width = round_px(target.height as f64 * ratio);
    if width > target.width {
        width = target.width.max(1);
        height = round_px(target.width as f64 / ratio);
    }
    let x = target.x as i64 + (target.width as i64 - width as i64).div_euclid(2);
    let y = target.y as i64 + (target.height as i64 - height as i64).div_euclid(2);
    OverlayPlacement {
        x,
        y,
        width,
        height,
    }
}

fn round_px(value: f64) -> u32 {
    if !value.is_finite() {
        return 1;
    }
    value.round().clamp(1.0, u32::MAX as f64) as u32
}

pub(crate) fn resize_overlay(src: &RgbaImage, placement: &OverlayPlacement) -> RgbaImage {
    if src.dimensions() == (placement.width, placement.height) {
        return src.clone();
    }
    image::imageops::resize(src, placement.width, placement.height, FilterType::Lanczos3)
}

/// Resizes `overlay` into `target` and pastes it onto `dst`.
pub fn place_overlay(
    dst: &mut RgbaImage,
    overlay: &RgbaImage,
    target: Rect,
    mode: PasteMode,
) -> OverlayPlacement {
    let placement = plan_overlay(overlay.width(), overlay.height(), target);
    let resized = resize_overlay(overlay, &placement);
    paste(dst, &resized, placement.x, placement.y, mode);
    placement
}

pub fn paste(dst: &mut RgbaImage, src: &RgbaImage, x: i64, y: i64, mode: PasteMode) {
    let (dst_w, dst_h) = (dst.width() as i64, dst.height() as i64);
    for (sx, sy, src_px) in src.enumerate_pixels() {
        let dx = x + sx as i64;
        let dy = y + sy as i64;
        if dx < 0 || dy < 0 || dx >= dst_w || dy >= dst_h {
            continue;
        }
        let alpha = src_px.0[3];
        if alpha == 0 {
            continue;
        }
        let dst_px = dst.get_pixel_mut(dx as u32, dy as u32);
        match mode {
            PasteMode::MaskCutover => *dst_px = *src_px,
            PasteMode::Blend => {
                for channel in 0..4 {
                    dst_px.0[channel] = blend_u8(dst_px.0[channel], src_px.0[channel], alpha);
                }
            }
        }
    }
}

/// `from + (to - from) * weight / 255`, rounded.
fn blend_u8(from: u8, to: u8, weight: u8) -> u8 {
    let tmp = (to as i32 - from as i32) * weight as i32 + 128;
    (from as i32 + ((tmp + (tmp >> 8)) >> 8)).clamp(0, 255) as u8
}

pub(crate) fn load_rgba(source: &FsPath) -> Result<RgbaImage, BannerPressError> {
    let raw = source.to_string_lossy();
    if let Some((mime, data)) = parse_data_uri(&raw) {
        return decode_rgba(&data, Some(&mime));
    }
    let bytes = std::fs::read(source)?;
    decode_rgba(&bytes, None)
}

pub(crate) fn decode_rgba(data: &[u8], mime: Option<&str>) -> Result<RgbaImage, BannerPressError> {
    let guessed_format = match mime {
        Some(mime) if mime.contains("png") => Some(ImageFormat::Png),
        Some(mime) if mime.contains("jpeg") || mime.contains("jpg") => Some(ImageFormat::Jpeg),
        _ => image::guess_format(data).ok(),
    };
    let decoded = match guessed_format {
        Some(fmt) => image::load_from_memory_with_format(data, fmt)?,
        None => image::load_from_memory(data)?,
    };
    Ok(decoded.to_rgba8())
}

pub(crate) fn save_png(image: &RgbaImage, path: &FsPath, flatten: bool) -> Result<(), BannerPressError> {
    if flatten {
        DynamicImage::ImageRgba8(image.clone())
            .to_rgb8()
            .save_with_format(path, ImageFormat::Png)?;
    } else {
        image.save_with_format(path, ImageFormat::Png)?;
    }
    Ok(())
}

/// Lanczos downscale to fit `max_width x max_height`, keeping the aspect
/// ratio. Smaller images are returned unchanged.
pub fn thumbnail(image: &RgbaImage, max_width: u32, max_height: u32) -> RgbaImage {
    let (w, h) = image.dimensions();
    if w <= max_width && h <= max_height {
        return image.clone();
    }
    let scale = (max_width as f64 / w.max(1) as f64).min(max_height as f64 / h.max(1) as f64);
    let tw = round_px(w as f64 * scale).min(max_width.max(1));
    let th = round_px(h as f64 * scale).min(max_height.max(1));
    image::imageops::resize(image, tw, th, FilterType::Lanczos3)
}

fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    if !uri.starts_with("data:") {
        return None;
    }
    let (header, payload) = uri.split_once(',')?;
    let mime = header
        .trim_start_matches("data:")
        .split(';')
        .next()
        .filter(|v| !v.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.contains(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .ok()?
    } else {
        payload.as_bytes().to_vec()
    };
    Some((mime, data))
}

struct GlyphPlacement {
    glyph_id: u16,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

/// Rasterizes every line of `layout` with `font` and mixes `color` into `dst`
/// by glyph coverage. Returns the number of glyph outlines drawn.
pub(crate) fn draw_text(
    dst: &mut RgbaImage,
    layout: &TextLayout,
    color: Rgb,
    font: &LoadedFont,
) -> Result<usize, BannerPressError> {
    let Ok(face) = ttf_parser::Face::parse(&font.data, 0) else {
        return Err(BannerPressError::Font(format!(
            "font {} could not be parsed",
            font.name
        )));
    };
    let Some(mut mask) = Mask::new(dst.width(), dst.height()) else {
        return Ok(0);
    };
    let font_size = layout.size as f32;
    let mut drawn = 0usize;
    for line in &layout.lines {
        let placements = layout_text_glyphs(
            &font.data,
            &line.text,
            font_size,
            line.x as f32,
            line.baseline_y as f32,
        );
        for placement in placements {
            let mut builder =
                GlyphPathBuilder::new(placement.origin_x, placement.origin_y, placement.scale);
            if face
                .outline_glyph(GlyphId(placement.glyph_id), &mut builder)
                .is_none()
            {
                continue;
            }
            let Some(path) = builder.finish() else {
                continue;
            };
            mask.fill_path(&path, FillRule::Winding, true, Transform::identity());
            drawn += 1;
        }
    }
    apply_coverage(dst, &mask, color);
    Ok(drawn)
}

fn apply_coverage(dst: &mut RgbaImage, mask: &Mask, color: Rgb) {
    let ink = [color.0, color.1, color.2, 255];
    for (coverage, px) in mask.data().iter().zip(dst.pixels_mut()) {
        if *coverage == 0 {
            continue;
        }
        for channel in 0..4 {
            px.0[channel] = blend_u8(px.0[channel], ink[channel], *coverage);
        }
    }
}

fn layout_text_glyphs(
    font_data: &[u8],
    text: &str,
    font_size: f32,
    baseline_x: f32,
    baseline_y: f32,
) -> Vec<GlyphPlacement> {
    let Some(face) = HbFace::from_slice(font_data, 0) else {
        return layout_text_glyphs_unshaped(font_data, text, font_size, baseline_x, baseline_y);
    };
    let hb_units = face.units_per_em().max(1) as f32;
    let scale = font_size / hb_units;
    let mut buffer = UnicodeBuffer::new();
    buffer.set_direction(detect_direction(text));
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let infos = output.glyph_infos();
    let positions = output.glyph_positions();
    if infos.is_empty() || infos.len() != positions.len() {
        return layout_text_glyphs_unshaped(font_data, text, font_size, baseline_x, baseline_y);
    }

    let mut out = Vec::with_capacity(infos.len());
    let mut pen_x = 0.0f32;
    let mut pen_y = 0.0f32;
    for (info, pos) in infos.iter().zip(positions.iter()) {
        let gid = info.glyph_id as u16;
        if gid != 0 {
            out.push(GlyphPlacement {
                glyph_id: gid,
                origin_x: baseline_x + pen_x + pos.x_offset as f32 * scale,
                origin_y: baseline_y - (pen_y + pos.y_offset as f32 * scale),
                scale,
            });
        }
        pen_x += pos.x_advance as f32 * scale;
        pen_y += pos.y_advance as f32 * scale;
    }
    out
}

fn layout_text_glyphs_unshaped(
    font_data: &[u8],
    text: &str,
    font_size: f32,
    baseline_x: f32,
    baseline_y: f32,
) -> Vec<GlyphPlacement> {
    let Ok(face) = ttf_parser::Face::parse(font_data, 0) else {
        return Vec::new();
    };
    let units_per_em = face.units_per_em().max(1) as f32;
    let scale = font_size / units_per_em;

    let mut out = Vec::new();
    let mut pen_x = 0.0f32;
    for ch in text.chars() {
        let gid = face.glyph_index(ch).map(|id| id.0).unwrap_or(0);
        if gid == 0 {
            pen_x += font_size * 0.5;
            continue;
        }
        out.push(GlyphPlacement {
            glyph_id: gid,
            origin_x: baseline_x + pen_x,
            origin_y: baseline_y,
            scale,
        });
        let mut adv = glyph_advance_units(&face, gid) as f32 * scale;
        if adv <= 0.0 {
            adv = font_size * 0.5;
        }
        pen_x += adv;
    }
    out
}

/// Font outlines are y-up; image rows grow downward.
struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(origin_x: f32, origin_y: f32, scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            origin_y,
            scale,
        }
    }

    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale, self.origin_y - y * self.scale)
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}
