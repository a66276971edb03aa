//! Pixel engine trait and shared types.
//!
//! The [`PixelEngine`] trait lists every primitive the pipeline composes. The
//! pipeline depends on these signatures only; the working image is an
//! associated type passed by value through each call, so a stage consumes
//! its input and returns a fresh image.
//!
//! The production implementation is
//! [`RustEngine`](super::rust_backend::RustEngine), built on the `image` crate.

use super::params::{Axis, Color, FillMode, OutputFormat, Quality, Rect, Rotation};
use crate::plan::TrimAnchor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Trait for pixel processing engines.
///
/// Implementations must be deterministic: the same calls on the same input
/// produce the same bytes. `Sync` so one engine can serve concurrent requests.
pub trait PixelEngine: Sync {
    type Image;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Image, EngineError>;

    /// Format sniffed from the source bytes, if recognisable.
    fn infer_format(&self, bytes: &[u8]) -> Option<OutputFormat>;

    fn dimensions(&self, image: &Self::Image) -> (u32, u32);

    /// Bounding box of the content that differs from the anchor corner's
    /// color by more than `tolerance`. `None` when nothing differs.
    fn trim(&self, image: &Self::Image, anchor: TrimAnchor, tolerance: u8) -> Option<Rect>;

    fn crop(&self, image: Self::Image, rect: Rect) -> Result<Self::Image, EngineError>;

    /// Resize to exactly `width` x `height`.
    fn resize(&self, image: Self::Image, width: u32, height: u32) -> Result<Self::Image, EngineError>;

    /// Origin of the most interesting `width` x `height` window.
    fn smart_focus(&self, image: &Self::Image, width: u32, height: u32) -> (u32, u32);

    fn flip(&self, image: Self::Image, axis: Axis) -> Self::Image;

    /// Place the image at (`x`, `y`) on a transparent canvas.
    fn embed(&self, image: Self::Image, canvas: (u32, u32), x: u32, y: u32) -> Self::Image;

    fn blur(&self, image: Self::Image, sigma: f32) -> Self::Image;

    fn rotate(&self, image: Self::Image, rotation: Rotation) -> Self::Image;

    /// `amount` in -100..=100.
    fn brightness(&self, image: Self::Image, amount: i32) -> Self::Image;

    /// `amount` in -100..=100.
    fn contrast(&self, image: Self::Image, amount: i32) -> Self::Image;

    /// Per-channel shift, each in -100..=100 percent.
    fn rgb_shift(&self, image: Self::Image, r: i32, g: i32, b: i32) -> Self::Image;

    fn grayscale(&self, image: Self::Image) -> Self::Image;

    fn hue(&self, image: Self::Image, degrees: i32) -> Self::Image;

    /// `amount` in -100..=100; -100 is fully desaturated.
    fn saturation(&self, image: Self::Image, amount: i32) -> Self::Image;

    fn round_corner(&self, image: Self::Image, rx: u32, ry: u32, color: Color) -> Self::Image;

    fn strip_metadata(&self, image: Self::Image) -> Self::Image;

    /// Paint transparent areas according to `mode`.
    fn fill(&self, image: Self::Image, mode: FillMode) -> Self::Image;

    /// Blend `overlay` onto `base` at (`x`, `y`) with `opacity` in 0.0..=1.0.
    /// Parts outside the base are clipped.
    fn composite(
        &self,
        base: Self::Image,
        overlay: &Self::Image,
        x: i64,
        y: i64,
        opacity: f32,
    ) -> Self::Image;

    fn encode(
        &self,
        image: &Self::Image,
        format: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, EngineError>;
}
