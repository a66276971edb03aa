//! Pure Rust pixel engine on top of the `image` crate.
//!
//! Every decoded image is normalised to 8-bit RGBA so filters can work on one
//! pixel layout and transparency survives until the encode stage.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, GIF) | `image::load_from_memory` |
//! | Resize | `image::imageops::resize` with `Lanczos3` filter |
//! | Blur, brightness, contrast, hue | `image::imageops::{blur, brighten, contrast, huerotate}` |
//! | Overlay / embed | `image::imageops::{overlay, replace}` |
//! | Encode → JPEG / AVIF | `JpegEncoder` / `AvifEncoder` (rav1e, speed 6) with quality |
//! | Encode → PNG, WebP (lossless), GIF, TIFF | `DynamicImage::write_to` |
//! | Trim, saturation, RGB shift, round corners, smart focus | per-pixel code below |

use super::backend::{EngineError, PixelEngine};
use super::calculations::{Edge, align_offset, calculate_fill_dimensions};
use super::params::{Axis, Color, FillMode, OutputFormat, Quality, Rect, Rotation};
use crate::plan::TrimAnchor;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

/// Sigma used for the blurred background of `fill(blur)`.
const FILL_BLUR_SIGMA: f32 = 10.0;

/// Pure Rust engine using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustEngine;

impl RustEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn to_format(format: OutputFormat) -> ImageFormat {
    match format {
        OutputFormat::Jpeg => ImageFormat::Jpeg,
        OutputFormat::Png => ImageFormat::Png,
        OutputFormat::Webp => ImageFormat::WebP,
        OutputFormat::Gif => ImageFormat::Gif,
        OutputFormat::Tiff => ImageFormat::Tiff,
        OutputFormat::Avif => ImageFormat::Avif,
    }
}

fn luma(p: &Rgba<u8>) -> f32 {
    0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32
}

fn clamp_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Bounding box of pixels that are not fully transparent.
fn opaque_bounds(image: &RgbaImage) -> Option<Rect> {
    bounds_where(image, |p| p[3] > 0)
}

fn bounds_where(image: &RgbaImage, keep: impl Fn(&Rgba<u8>) -> bool) -> Option<Rect> {
    let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
    let (mut max_x, mut max_y) = (0, 0);
    for (x, y, p) in image.enumerate_pixels() {
        if keep(p) {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }
    if min_x == u32::MAX {
        return None;
    }
    Some(Rect::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

/// Offset along one axis whose `window`-long run of `energy` is largest.
/// Ties go to the offset nearest the centre.
fn best_window(energy: &[f64], window: usize) -> u32 {
    if window >= energy.len() {
        return 0;
    }
    let mut prefix = vec![0.0; energy.len() + 1];
    for (i, e) in energy.iter().enumerate() {
        prefix[i + 1] = prefix[i] + e;
    }
    let overflow = energy.len() - window;
    let center = align_offset(overflow as u32, Edge::Center) as usize;
    let mut best = (f64::MIN, usize::MAX, 0usize);
    for offset in 0..=overflow {
        let score = prefix[offset + window] - prefix[offset];
        let distance = offset.abs_diff(center);
        if score > best.0 || (score == best.0 && distance < best.1) {
            best = (score, distance, offset);
        }
    }
    best.2 as u32
}

impl PixelEngine for RustEngine {
    type Image = RgbaImage;

    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, EngineError> {
        image::load_from_memory(bytes)
            .map(|img| img.to_rgba8())
            .map_err(|e| EngineError::Decode(e.to_string()))
    }

    fn infer_format(&self, bytes: &[u8]) -> Option<OutputFormat> {
        match image::guess_format(bytes).ok()? {
            ImageFormat::Jpeg => Some(OutputFormat::Jpeg),
            ImageFormat::Png => Some(OutputFormat::Png),
            ImageFormat::WebP => Some(OutputFormat::Webp),
            ImageFormat::Gif => Some(OutputFormat::Gif),
            ImageFormat::Tiff => Some(OutputFormat::Tiff),
            ImageFormat::Avif => Some(OutputFormat::Avif),
            _ => None,
        }
    }

    fn dimensions(&self, image: &RgbaImage) -> (u32, u32) {
        image.dimensions()
    }

    fn trim(&self, image: &RgbaImage, anchor: TrimAnchor, tolerance: u8) -> Option<Rect> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return None;
        }
        let reference = match anchor {
            TrimAnchor::BottomRight => *image.get_pixel(w - 1, h - 1),
            TrimAnchor::TopLeft | TrimAnchor::Default => *image.get_pixel(0, 0),
        };
        bounds_where(image, |p| {
            p.0.iter()
                .zip(reference.0.iter())
                .any(|(a, b)| a.abs_diff(*b) > tolerance)
        })
    }

    fn crop(&self, image: RgbaImage, rect: Rect) -> Result<RgbaImage, EngineError> {
        let (w, h) = image.dimensions();
        if rect.width == 0 || rect.height == 0 || rect.x + rect.width > w || rect.y + rect.height > h {
            return Err(EngineError::ProcessingFailed(format!(
                "crop {rect:?} outside {w}x{h}"
            )));
        }
        Ok(imageops::crop_imm(&image, rect.x, rect.y, rect.width, rect.height).to_image())
    }

    fn resize(&self, image: RgbaImage, width: u32, height: u32) -> Result<RgbaImage, EngineError> {
        if width == 0 || height == 0 {
            return Err(EngineError::ProcessingFailed(format!(
                "cannot resize to {width}x{height}"
            )));
        }
        if image.dimensions() == (width, height) {
            return Ok(image);
        }
        Ok(imageops::resize(&image, width, height, FilterType::Lanczos3))
    }

    fn smart_focus(&self, image: &RgbaImage, width: u32, height: u32) -> (u32, u32) {
        let (w, h) = image.dimensions();
        let mut columns = vec![0.0f64; w as usize];
        let mut rows = vec![0.0f64; h as usize];
        for y in 0..h {
            for x in 0..w {
                let here = luma(image.get_pixel(x, y));
                let right = if x + 1 < w { luma(image.get_pixel(x + 1, y)) } else { here };
                let below = if y + 1 < h { luma(image.get_pixel(x, y + 1)) } else { here };
                let energy = ((here - right).abs() + (here - below).abs()) as f64;
                columns[x as usize] += energy;
                rows[y as usize] += energy;
            }
        }
        (
            best_window(&columns, width as usize),
            best_window(&rows, height as usize),
        )
    }

    fn flip(&self, image: RgbaImage, axis: Axis) -> RgbaImage {
        match axis {
            Axis::Horizontal => imageops::flip_horizontal(&image),
            Axis::Vertical => imageops::flip_vertical(&image),
        }
    }

    fn embed(&self, image: RgbaImage, canvas: (u32, u32), x: u32, y: u32) -> RgbaImage {
        let mut out = RgbaImage::new(canvas.0, canvas.1);
        imageops::replace(&mut out, &image, x as i64, y as i64);
        out
    }

    fn blur(&self, image: RgbaImage, sigma: f32) -> RgbaImage {
        if sigma <= 0.0 {
            return image;
        }
        imageops::blur(&image, sigma)
    }

    fn rotate(&self, image: RgbaImage, rotation: Rotation) -> RgbaImage {
        // imageops rotates clockwise
        match rotation {
            Rotation::None => image,
            Rotation::Ccw90 => imageops::rotate270(&image),
            Rotation::Ccw180 => imageops::rotate180(&image),
            Rotation::Ccw270 => imageops::rotate90(&image),
        }
    }

    fn brightness(&self, image: RgbaImage, amount: i32) -> RgbaImage {
        imageops::brighten(&image, amount * 255 / 100)
    }

    fn contrast(&self, image: RgbaImage, amount: i32) -> RgbaImage {
        imageops::contrast(&image, amount as f32)
    }

    fn rgb_shift(&self, mut image: RgbaImage, r: i32, g: i32, b: i32) -> RgbaImage {
        let shifts = [r * 255 / 100, g * 255 / 100, b * 255 / 100];
        for p in image.pixels_mut() {
            for (channel, shift) in p.0.iter_mut().zip(shifts) {
                *channel = (*channel as i32 + shift).clamp(0, 255) as u8;
            }
        }
        image
    }

    fn grayscale(&self, mut image: RgbaImage) -> RgbaImage {
        for p in image.pixels_mut() {
            let l = clamp_channel(luma(p));
            p.0 = [l, l, l, p[3]];
        }
        image
    }

    fn hue(&self, image: RgbaImage, degrees: i32) -> RgbaImage {
        imageops::huerotate(&image, degrees)
    }

    fn saturation(&self, mut image: RgbaImage, amount: i32) -> RgbaImage {
        let factor = 1.0 + amount as f32 / 100.0;
        for p in image.pixels_mut() {
            let l = luma(p);
            for c in 0..3 {
                p[c] = clamp_channel(l + (p[c] as f32 - l) * factor);
            }
        }
        image
    }

    fn round_corner(&self, mut image: RgbaImage, rx: u32, ry: u32, color: Color) -> RgbaImage {
        let (w, h) = image.dimensions();
        let rx = rx.min(w / 2);
        let ry = ry.min(h / 2);
        if rx == 0 || ry == 0 {
            return image;
        }
        let outside = |x: u32, y: u32| {
            let dx = (rx as f32 - x as f32 - 0.5) / rx as f32;
            let dy = (ry as f32 - y as f32 - 0.5) / ry as f32;
            dx * dx + dy * dy > 1.0
        };
        let paint = Rgba(color.to_array());
        for y in 0..ry {
            for x in 0..rx {
                if outside(x, y) {
                    image.put_pixel(x, y, paint);
                    image.put_pixel(w - 1 - x, y, paint);
                    image.put_pixel(x, h - 1 - y, paint);
                    image.put_pixel(w - 1 - x, h - 1 - y, paint);
                }
            }
        }
        image
    }

    fn strip_metadata(&self, image: RgbaImage) -> RgbaImage {
        // Decoded buffers carry no EXIF/ICC; the encoders write none
        image
    }

    fn fill(&self, image: RgbaImage, mode: FillMode) -> RgbaImage {
        let (w, h) = image.dimensions();
        let background = match mode {
            FillMode::None => return image,
            FillMode::Color(color) => RgbaImage::from_pixel(w, h, Rgba(color.to_array())),
            FillMode::Auto => {
                let Some(content) = opaque_bounds(&image) else {
                    return image;
                };
                let mut sample = *image.get_pixel(content.x, content.y);
                sample[3] = 255;
                RgbaImage::from_pixel(w, h, sample)
            }
            FillMode::Blur => {
                let Some(content) = opaque_bounds(&image) else {
                    return image;
                };
                let inner =
                    imageops::crop_imm(&image, content.x, content.y, content.width, content.height)
                        .to_image();
                let (fw, fh) = calculate_fill_dimensions(inner.dimensions(), (w, h));
                let cover = imageops::resize(&inner, fw, fh, FilterType::Triangle);
                let x = align_offset(fw - w, Edge::Center);
                let y = align_offset(fh - h, Edge::Center);
                let mut bg = imageops::blur(&imageops::crop_imm(&cover, x, y, w, h).to_image(), FILL_BLUR_SIGMA);
                for p in bg.pixels_mut() {
                    p[3] = 255;
                }
                bg
            }
        };
        let mut out = background;
        imageops::overlay(&mut out, &image, 0, 0);
        out
    }

    fn composite(
        &self,
        mut base: RgbaImage,
        overlay: &RgbaImage,
        x: i64,
        y: i64,
        opacity: f32,
    ) -> RgbaImage {
        let opacity = opacity.clamp(0.0, 1.0);
        if opacity == 0.0 {
            return base;
        }
        let mut layer = overlay.clone();
        if opacity < 1.0 {
            for p in layer.pixels_mut() {
                p[3] = clamp_channel(p[3] as f32 * opacity);
            }
        }
        imageops::overlay(&mut base, &layer, x, y);
        base
    }

    fn encode(
        &self,
        image: &RgbaImage,
        format: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, EngineError> {
        let mut buf = Cursor::new(Vec::new());
        let encode_err = |e: image::ImageError| EngineError::Encode(format!("{format}: {e}"));
        match format {
            OutputFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(image.clone()).to_rgb8());
                let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                    &mut buf,
                    quality.value() as u8,
                );
                rgb.write_with_encoder(encoder).map_err(encode_err)?;
            }
            OutputFormat::Avif => {
                let encoder = image::codecs::avif::AvifEncoder::new_with_speed_quality(
                    &mut buf,
                    6,
                    quality.value() as u8,
                );
                DynamicImage::ImageRgba8(image.clone())
                    .write_with_encoder(encoder)
                    .map_err(encode_err)?;
            }
            other => {
                DynamicImage::ImageRgba8(image.clone())
                    .write_to(&mut buf, to_format(other))
                    .map_err(encode_err)?;
            }
        }
        Ok(buf.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{bordered_image, encode_png, gradient_image};

    fn engine() -> RustEngine {
        RustEngine::new()
    }

    #[test]
    fn decode_png_roundtrip_dimensions() {
        let bytes = encode_png(&gradient_image(64, 48));
        let decoded = engine().decode(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
        assert_eq!(engine().infer_format(&bytes), Some(OutputFormat::Png));
    }

    #[test]
    fn decode_garbage_errors() {
        assert!(matches!(
            engine().decode(b"definitely not an image"),
            Err(EngineError::Decode(_))
        ));
    }

    #[test]
    fn trim_tolerance_zero_finds_exact_interior() {
        // 100x80 white canvas, 10px border, red interior
        let image = bordered_image(100, 80, 10, Color::WHITE, Color::rgb(200, 0, 0));
        let rect = engine().trim(&image, TrimAnchor::Default, 0).unwrap();
        assert_eq!(rect, Rect::new(10, 10, 80, 60));
    }

    #[test]
    fn trim_maximum_tolerance_keeps_original_bounds() {
        let image = bordered_image(100, 80, 10, Color::WHITE, Color::BLACK);
        assert_eq!(engine().trim(&image, TrimAnchor::Default, 255), None);
    }

    #[test]
    fn trim_uniform_canvas_is_none() {
        let image = RgbaImage::from_pixel(20, 20, Rgba([9, 9, 9, 255]));
        assert_eq!(engine().trim(&image, TrimAnchor::TopLeft, 0), None);
    }

    #[test]
    fn trim_collapses_to_single_pixel() {
        let mut image = RgbaImage::from_pixel(20, 20, Rgba([255, 255, 255, 255]));
        image.put_pixel(7, 3, Rgba([0, 0, 0, 255]));
        assert_eq!(
            engine().trim(&image, TrimAnchor::Default, 10),
            Some(Rect::new(7, 3, 1, 1))
        );
    }

    #[test]
    fn trim_bottom_right_anchor_uses_that_corner() {
        // Top-left corner differs from the rest; bottom-right is background
        let mut image = RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255]));
        image.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        assert_eq!(
            engine().trim(&image, TrimAnchor::BottomRight, 0),
            Some(Rect::new(0, 0, 1, 1))
        );
    }

    #[test]
    fn crop_and_resize() {
        let image = gradient_image(100, 100);
        let cropped = engine().crop(image, Rect::new(10, 10, 50, 40)).unwrap();
        assert_eq!(cropped.dimensions(), (50, 40));
        let resized = engine().resize(cropped, 25, 20).unwrap();
        assert_eq!(resized.dimensions(), (25, 20));
    }

    #[test]
    fn crop_outside_bounds_errors() {
        let image = gradient_image(10, 10);
        assert!(engine().crop(image, Rect::new(5, 5, 10, 10)).is_err());
    }

    #[test]
    fn rotate_quarter_turn_swaps_axes() {
        let image = gradient_image(30, 10);
        let rotated = engine().rotate(image, Rotation::Ccw90);
        assert_eq!(rotated.dimensions(), (10, 30));
    }

    #[test]
    fn flip_horizontal_mirrors_pixels() {
        let mut image = RgbaImage::from_pixel(3, 1, Rgba([0, 0, 0, 255]));
        image.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let flipped = engine().flip(image, Axis::Horizontal);
        assert_eq!(flipped.get_pixel(2, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn grayscale_keeps_alpha() {
        let image = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 128]));
        let gray = engine().grayscale(image);
        let p = gray.get_pixel(0, 0);
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
        assert_eq!(p[3], 128);
    }

    #[test]
    fn saturation_minus_100_desaturates() {
        let image = RgbaImage::from_pixel(1, 1, Rgba([200, 50, 50, 255]));
        let p = *engine().saturation(image, -100).get_pixel(0, 0);
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
    }

    #[test]
    fn rgb_shift_clamps() {
        let image = RgbaImage::from_pixel(1, 1, Rgba([250, 10, 100, 255]));
        let p = *engine().rgb_shift(image, 10, -50, 0).get_pixel(0, 0);
        assert_eq!(p, Rgba([255, 0, 100, 255]));
    }

    #[test]
    fn embed_and_fill_color() {
        let image = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255]));
        let embedded = engine().embed(image, (20, 10), 5, 0);
        assert_eq!(embedded.get_pixel(0, 0)[3], 0);
        assert_eq!(embedded.get_pixel(5, 0), &Rgba([255, 0, 0, 255]));
        let filled = engine().fill(embedded, FillMode::Color(Color::rgb(255, 255, 0)));
        assert_eq!(filled.get_pixel(0, 0), &Rgba([255, 255, 0, 255]));
        assert_eq!(filled.get_pixel(5, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn fill_auto_samples_content_corner() {
        let image = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255]));
        let embedded = engine().embed(image, (8, 4), 2, 0);
        let filled = engine().fill(embedded, FillMode::Auto);
        assert_eq!(filled.get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn fill_blur_makes_background_opaque() {
        let embedded = engine().embed(gradient_image(10, 10), (30, 10), 10, 0);
        let filled = engine().fill(embedded, FillMode::Blur);
        assert_eq!(filled.dimensions(), (30, 10));
        assert!(filled.pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn composite_respects_opacity_and_clips() {
        let base = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        let overlay = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
        let out = engine().composite(base, &overlay, 8, 8, 0.5);
        assert_eq!(out.dimensions(), (10, 10));
        let p = out.get_pixel(9, 9);
        assert!(p[0] > 100 && p[0] < 160, "half-blended, got {p:?}");
        assert_eq!(out.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn round_corner_paints_corners_only() {
        let image = RgbaImage::from_pixel(40, 40, Rgba([255, 255, 255, 255]));
        let out = engine().round_corner(image, 10, 10, Color::BLACK);
        assert_eq!(out.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(out.get_pixel(39, 39), &Rgba([0, 0, 0, 255]));
        assert_eq!(out.get_pixel(20, 20), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn smart_focus_finds_busy_region() {
        // Flat image with a noisy stripe on the right
        let mut image = RgbaImage::from_pixel(100, 20, Rgba([128, 128, 128, 255]));
        for y in 0..20 {
            for x in 80..100 {
                let v = if (x + y) % 2 == 0 { 0 } else { 255 };
                image.put_pixel(x, y, Rgba([v, v, v, 255]));
            }
        }
        let (x, y) = engine().smart_focus(&image, 20, 20);
        assert_eq!(y, 0);
        assert!(x >= 75, "expected focus near the stripe, got {x}");
    }

    #[test]
    fn encode_formats_produce_decodable_bytes() {
        let image = gradient_image(16, 16);
        for format in [OutputFormat::Jpeg, OutputFormat::Png, OutputFormat::Webp, OutputFormat::Gif, OutputFormat::Tiff] {
            let bytes = engine().encode(&image, format, Quality::default()).unwrap();
            assert_eq!(engine().infer_format(&bytes), Some(format), "{format}");
            assert_eq!(engine().decode(&bytes).unwrap().dimensions(), (16, 16));
        }
    }

    #[test]
    fn encode_is_deterministic() {
        let image = gradient_image(32, 32);
        let a = engine().encode(&image, OutputFormat::Jpeg, Quality::new(70)).unwrap();
        let b = engine().encode(&image, OutputFormat::Jpeg, Quality::new(70)).unwrap();
        assert_eq!(a, b);
    }
}
