//! Shared test utilities: synthetic images and loader fixtures.
//!
//! Images are generated in code so tests never depend on files on disk.
//!
//! # Usage
//!
//! ```ignore
//! use crate::test_helpers::*;
//!
//! let loader = fixture_loader();
//! let bytes = loader.load("gopher.png").unwrap();
//! assert_eq!(decoded_dimensions(&bytes), (320, 240));
//! ```

use crate::imaging::Color;
use crate::loader::MemoryLoader;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

// =========================================================================
// Synthetic images
// =========================================================================

/// Smooth two-axis gradient; every pixel differs from its neighbours.
pub fn gradient_image(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let r = (x * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        Rgba([r, g, 128, 255])
    })
}

/// Solid `background` with a `border`-wide frame around a solid `content` box.
pub fn bordered_image(
    width: u32,
    height: u32,
    border: u32,
    background: Color,
    content: Color,
) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let inside = x >= border && y >= border && x < width - border && y < height - border;
        Rgba(if inside { content } else { background }.to_array())
    })
}

/// Half-transparent square used as a watermark.
pub fn logo_image(size: u32) -> RgbaImage {
    RgbaImage::from_pixel(size, size, Rgba([255, 0, 0, 200]))
}

pub fn encode_png(image: &RgbaImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image.clone())
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// Dimensions of encoded bytes. Panics if they do not decode.
pub fn decoded_dimensions(bytes: &[u8]) -> (u32, u32) {
    let image = image::load_from_memory(bytes)
        .unwrap_or_else(|e| panic!("output does not decode: {e}"));
    (image.width(), image.height())
}

// =========================================================================
// Loader fixtures
// =========================================================================

/// Loader serving:
///
/// - `gopher.png`: 320x240 gradient
/// - `bordered.png`: 200x100 white frame (20px) around a blue box
/// - `logo.png`: 40x40 translucent red square
pub fn fixture_loader() -> MemoryLoader {
    MemoryLoader::new()
        .with("gopher.png", encode_png(&gradient_image(320, 240)))
        .with(
            "bordered.png",
            encode_png(&bordered_image(200, 100, 20, Color::WHITE, Color::rgb(0, 0, 255))),
        )
        .with("logo.png", encode_png(&logo_image(40)))
}
