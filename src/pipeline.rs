//! Pipeline orchestrator: run one [`OperationPlan`] against one source image.
//!
//! ```text
//! Parsed → Validated → Loaded → Trimmed? → Cropped? → Resized → Filtered → Encoded
//! ```
//!
//! Filters are resolved against the dispatch table before the source is
//! loaded, so argument errors never cost a decode. Every stage consumes the
//! previous stage's image and hands a new one on; nothing is retried and no
//! partial result escapes.
//!
//! ## Stages
//!
//! | Stage | Effect |
//! |---|---|
//! | trim | crop to the content box found by the engine, if any |
//! | crop | crop to the plan's rectangle, clamped to the image |
//! | resize | fit-in, stretch, or cover-and-crop by alignment / smart focus; then flips |
//! | filter | pixel filters in declared order |
//! | encode | encode to the chosen format, or emit JSON for `meta/` plans |
//!
//! ## Cancellation
//!
//! A [`CancelToken`] is checked on entry to each of the five stages. A filter
//! in progress always runs to completion.
//!
//! ## Output format
//!
//! The last `format()` filter wins, then the configured default, then the
//! source format, then JPEG. Formats without alpha are flattened onto the
//! last `background_color()` (white when none is given).

use crate::config::ProcessorConfig;
use crate::filters::{self, DispatchError, Filter, FilterArgError, WatermarkSpec};
use crate::imaging::calculations::{
    Edge, align_offset, calculate_fill_dimensions, calculate_fit_dimensions, clamp_crop,
    placement_origins, resolve_target, watermark_size,
};
use crate::imaging::{
    Axis, Color, EngineError, FillMode, OutputFormat, PixelEngine, Quality, Rect, RustEngine,
};
use crate::loader::{LoadError, Loader};
use crate::path::{self, ParseError};
use crate::plan::{OperationPlan, ResizeSpec, TrimAnchor};
use log::debug;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Pipeline stage, used to tag engine errors and cancellations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Trim,
    Crop,
    Resize,
    Filter,
    Encode,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Trim => "trim",
            Stage::Crop => "crop",
            Stage::Resize => "resize",
            Stage::Filter => "filter",
            Stage::Encode => "encode",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("unknown filter `{0}`")]
    UnknownFilter(String),
    #[error(transparent)]
    FilterArg(#[from] FilterArgError),
    #[error("filter `{filter}` failed: {source}")]
    Filter {
        filter: &'static str,
        #[source]
        source: EngineError,
    },
    #[error("image not found: {0}")]
    NotFound(String),
    #[error("cancelled before {0} stage")]
    Cancelled(Stage),
    #[error("{stage} stage failed: {source}")]
    Engine {
        stage: Stage,
        #[source]
        source: EngineError,
    },
    #[error(transparent)]
    Load(LoadError),
    #[error("meta encoding failed: {0}")]
    Meta(#[from] serde_json::Error),
}

impl From<DispatchError> for ProcessError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::UnknownFilter(name) => ProcessError::UnknownFilter(name),
            DispatchError::Arg(arg) => ProcessError::FilterArg(arg),
        }
    }
}

impl From<LoadError> for ProcessError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::NotFound(id) => ProcessError::NotFound(id),
            other => ProcessError::Load(other),
        }
    }
}

fn at(stage: Stage) -> impl FnOnce(EngineError) -> ProcessError {
    move |source| ProcessError::Engine { stage, source }
}

fn in_filter(filter: &'static str) -> impl FnOnce(EngineError) -> ProcessError {
    move |source| ProcessError::Filter { filter, source }
}

/// Cooperative cancellation: a shared flag plus an optional deadline.
///
/// Clones share the flag, so the caller keeps one clone and hands another
/// to the render.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that also expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::default(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Token honouring the configured `request.timeout_ms`, if any.
    pub fn for_config(config: &ProcessorConfig) -> Self {
        config.timeout().map(Self::with_timeout).unwrap_or_default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn check(&self, stage: Stage) -> Result<(), ProcessError> {
        if self.is_cancelled() {
            debug!("Cancelled before {stage}");
            return Err(ProcessError::Cancelled(stage));
        }
        Ok(())
    }
}

/// Result of one render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub bytes: Vec<u8>,
    /// Format of the image (for `meta/` plans: the format it would have).
    pub format: OutputFormat,
    pub content_type: &'static str,
    pub width: u32,
    pub height: u32,
}

/// JSON body returned for `meta/` plans.
#[derive(Debug, Serialize)]
struct MetaInfo {
    format: OutputFormat,
    content_type: &'static str,
    width: u32,
    height: u32,
}

/// Resolve the plan's filters with the configured unknown-filter policy.
pub fn validate(plan: &OperationPlan, config: &ProcessorConfig) -> Result<Vec<Filter>, ProcessError> {
    Ok(filters::resolve_filters(&plan.filters, config.filters.unknown)?)
}

/// Parse a request path and render it with the default engine.
pub fn process_path(
    raw: &str,
    loader: &dyn Loader,
    config: &ProcessorConfig,
) -> Result<Rendered, ProcessError> {
    let plan = path::parse_request_path(raw)?;
    process(&plan, loader, config, &CancelToken::for_config(config))
}

/// Load the plan's image and render it with the default [`RustEngine`].
pub fn process(
    plan: &OperationPlan,
    loader: &dyn Loader,
    config: &ProcessorConfig,
    cancel: &CancelToken,
) -> Result<Rendered, ProcessError> {
    let engine = RustEngine::new();
    process_with_engine(&engine, plan, loader, config, cancel)
}

/// Load the plan's image and render it with a specific engine (allows testing with mock).
pub fn process_with_engine<E: PixelEngine>(
    engine: &E,
    plan: &OperationPlan,
    loader: &dyn Loader,
    config: &ProcessorConfig,
    cancel: &CancelToken,
) -> Result<Rendered, ProcessError> {
    let filters = validate(plan, config)?;
    debug!("Loading {}", plan.image);
    let source = loader.load(&plan.image)?;
    run(engine, plan, &filters, &source, loader, config, cancel)
}

/// Render already-loaded source bytes. `loader` serves watermark images.
pub fn render_with_engine<E: PixelEngine>(
    engine: &E,
    plan: &OperationPlan,
    source: &[u8],
    loader: &dyn Loader,
    config: &ProcessorConfig,
    cancel: &CancelToken,
) -> Result<Rendered, ProcessError> {
    let filters = validate(plan, config)?;
    run(engine, plan, &filters, source, loader, config, cancel)
}

fn run<E: PixelEngine>(
    engine: &E,
    plan: &OperationPlan,
    filters: &[Filter],
    source: &[u8],
    loader: &dyn Loader,
    config: &ProcessorConfig,
    cancel: &CancelToken,
) -> Result<Rendered, ProcessError> {
    let source_format = engine.infer_format(source);
    let mut image = engine.decode(source).map_err(at(Stage::Load))?;

    cancel.check(Stage::Trim)?;
    image = trim_stage(engine, image, plan)?;

    cancel.check(Stage::Crop)?;
    image = crop_stage(engine, image, plan)?;

    cancel.check(Stage::Resize)?;
    let upscale = filters.iter().any(|f| matches!(f, Filter::Upscale));
    let embed = filters.iter().any(|f| {
        matches!(
            f,
            Filter::Fill(FillMode::Color(_) | FillMode::Blur | FillMode::Auto)
        )
    });
    image = resize_stage(engine, image, &plan.resize, upscale, embed).map_err(at(Stage::Resize))?;

    cancel.check(Stage::Filter)?;
    for filter in filters {
        image = apply_filter(engine, image, filter, loader)?;
    }

    cancel.check(Stage::Encode)?;
    encode_stage(engine, image, plan, filters, source_format, config)
}

fn trim_stage<E: PixelEngine>(
    engine: &E,
    image: E::Image,
    plan: &OperationPlan,
) -> Result<E::Image, ProcessError> {
    if !plan.trim.enabled {
        return Ok(image);
    }
    let tolerance = plan.trim.effective_tolerance();
    trim_to_content(engine, image, plan.trim.anchor, tolerance).map_err(at(Stage::Trim))
}

fn trim_to_content<E: PixelEngine>(
    engine: &E,
    image: E::Image,
    anchor: TrimAnchor,
    tolerance: u8,
) -> Result<E::Image, EngineError> {
    let (w, h) = engine.dimensions(&image);
    match engine.trim(&image, anchor, tolerance) {
        Some(rect) if rect != Rect::new(0, 0, w, h) => {
            debug!("Trim {w}x{h} to {rect:?}");
            engine.crop(image, rect)
        }
        _ => {
            debug!("Trim found nothing to remove");
            Ok(image)
        }
    }
}

fn crop_stage<E: PixelEngine>(
    engine: &E,
    image: E::Image,
    plan: &OperationPlan,
) -> Result<E::Image, ProcessError> {
    let Some(crop) = plan.crop else {
        return Ok(image);
    };
    let (w, h) = engine.dimensions(&image);
    match clamp_crop(crop, (w, h)) {
        Some(rect) if rect != Rect::new(0, 0, w, h) => {
            debug!("Crop {w}x{h} to {rect:?}");
            engine.crop(image, rect).map_err(at(Stage::Crop))
        }
        Some(_) => Ok(image),
        None => {
            debug!("Crop {crop:?} is empty inside {w}x{h}, skipping");
            Ok(image)
        }
    }
}

fn resize_to<E: PixelEngine>(
    engine: &E,
    image: E::Image,
    size: (u32, u32),
) -> Result<E::Image, EngineError> {
    if engine.dimensions(&image) == size {
        Ok(image)
    } else {
        engine.resize(image, size.0, size.1)
    }
}

/// Scale and position the image per the resize spec, then apply flips.
///
/// `embed` places a fit-in result on a transparent canvas of the requested
/// size even without padding, so a `fill()` filter has an area to paint.
fn resize_stage<E: PixelEngine>(
    engine: &E,
    image: E::Image,
    spec: &ResizeSpec,
    upscale: bool,
    embed: bool,
) -> Result<E::Image, EngineError> {
    let source = engine.dimensions(&image);
    let h_edge = Edge::from(spec.h_align);
    let v_edge = Edge::from(spec.v_align);

    let mut image = if spec.fit_in {
        let fitted = calculate_fit_dimensions(source, spec.width, spec.height, upscale);
        debug!("Fit {}x{} into {:?}x{:?} as {fitted:?}", source.0, source.1, spec.width, spec.height);
        let image = resize_to(engine, image, fitted)?;
        if spec.padding.is_some() || embed {
            let pad = spec.padding.unwrap_or_default();
            let box_w = spec.width.filter(|&w| w > 0).unwrap_or(fitted.0).max(fitted.0);
            let box_h = spec.height.filter(|&h| h > 0).unwrap_or(fitted.1).max(fitted.1);
            let canvas = box_w
                .checked_add(pad.left)
                .and_then(|w| w.checked_add(pad.right))
                .zip(box_h.checked_add(pad.top).and_then(|h| h.checked_add(pad.bottom)))
                .ok_or_else(|| {
                    EngineError::ProcessingFailed(format!(
                        "padding {}x{}:{}x{} overflows a {box_w}x{box_h} canvas",
                        pad.left, pad.top, pad.right, pad.bottom
                    ))
                })?;
            // Both offsets are bounded by the canvas checked above
            let x = pad.left + align_offset(box_w - fitted.0, h_edge);
            let y = pad.top + align_offset(box_h - fitted.1, v_edge);
            engine.embed(image, canvas, x, y)
        } else {
            image
        }
    } else if let Some(target) = resolve_target(source, spec.width, spec.height) {
        if spec.stretch {
            debug!("Stretch to {target:?}");
            resize_to(engine, image, target)?
        } else {
            let filled = calculate_fill_dimensions(source, target);
            debug!("Cover {target:?} via {filled:?}");
            let image = resize_to(engine, image, filled)?;
            let overflow = (filled.0 - target.0, filled.1 - target.1);
            if overflow == (0, 0) {
                image
            } else {
                let (x, y) = if spec.smart {
                    let (fx, fy) = engine.smart_focus(&image, target.0, target.1);
                    (fx.min(overflow.0), fy.min(overflow.1))
                } else {
                    (align_offset(overflow.0, h_edge), align_offset(overflow.1, v_edge))
                };
                engine.crop(image, Rect::new(x, y, target.0, target.1))?
            }
        }
    } else {
        image
    };

    if spec.flip_h {
        image = engine.flip(image, Axis::Horizontal);
    }
    if spec.flip_v {
        image = engine.flip(image, Axis::Vertical);
    }
    Ok(image)
}

fn apply_filter<E: PixelEngine>(
    engine: &E,
    image: E::Image,
    filter: &Filter,
    loader: &dyn Loader,
) -> Result<E::Image, ProcessError> {
    if filter.is_output_only() {
        return Ok(image);
    }
    debug!("Filter {}", filter.name());
    let image = match filter {
        Filter::Blur(sigma) => engine.blur(image, *sigma),
        Filter::Brightness(amount) => engine.brightness(image, *amount),
        Filter::Contrast(amount) => engine.contrast(image, *amount),
        Filter::Fill(mode) => engine.fill(image, *mode),
        Filter::Grayscale => engine.grayscale(image),
        Filter::Hue(degrees) => engine.hue(image, *degrees),
        Filter::Rgb(r, g, b) => engine.rgb_shift(image, *r, *g, *b),
        Filter::Rotate(rotation) => engine.rotate(image, *rotation),
        Filter::RoundCorner { rx, ry, color } => engine.round_corner(image, *rx, *ry, *color),
        Filter::Saturation(amount) => engine.saturation(image, *amount),
        Filter::StripExif | Filter::StripIcc => engine.strip_metadata(image),
        Filter::Trim { tolerance, anchor } => {
            trim_to_content(engine, image, *anchor, *tolerance).map_err(in_filter("trim"))?
        }
        Filter::Watermark(spec) => watermark(engine, image, spec, loader)?,
        Filter::BackgroundColor(_) | Filter::Format(_) | Filter::Quality(_) | Filter::Upscale => {
            image
        }
    };
    Ok(image)
}

fn watermark<E: PixelEngine>(
    engine: &E,
    image: E::Image,
    spec: &WatermarkSpec,
    loader: &dyn Loader,
) -> Result<E::Image, ProcessError> {
    let bytes = loader.load(&spec.image)?;
    let mark = engine.decode(&bytes).map_err(in_filter("watermark"))?;

    let canvas = engine.dimensions(&image);
    let natural = engine.dimensions(&mark);
    let size = watermark_size(natural, canvas, spec.width_ratio, spec.height_ratio);
    let mark = resize_to(engine, mark, size).map_err(in_filter("watermark"))?;

    let xs = placement_origins(spec.x, canvas.0, size.0);
    let ys = placement_origins(spec.y, canvas.1, size.1);
    let opacity = spec.alpha as f32 / 100.0;
    debug!("Watermark {} at {xs:?} x {ys:?}", spec.image);

    let mut image = image;
    for &y in &ys {
        for &x in &xs {
            image = engine.composite(image, &mark, x, y, opacity);
        }
    }
    Ok(image)
}

/// Pick the encode format: last `format()`, configured default, source, JPEG.
fn output_format(
    filters: &[Filter],
    config: &ProcessorConfig,
    source: Option<OutputFormat>,
) -> OutputFormat {
    filters
        .iter()
        .rev()
        .find_map(|f| match f {
            Filter::Format(format) => Some(*format),
            _ => None,
        })
        .or(config.output.format)
        .or(source)
        .unwrap_or(OutputFormat::Jpeg)
}

fn output_quality(filters: &[Filter], config: &ProcessorConfig) -> Quality {
    filters
        .iter()
        .rev()
        .find_map(|f| match f {
            Filter::Quality(q) => Some(*q),
            _ => None,
        })
        .unwrap_or_else(|| config.quality())
}

fn encode_stage<E: PixelEngine>(
    engine: &E,
    image: E::Image,
    plan: &OperationPlan,
    filters: &[Filter],
    source_format: Option<OutputFormat>,
    config: &ProcessorConfig,
) -> Result<Rendered, ProcessError> {
    let format = output_format(filters, config, source_format);
    let (width, height) = engine.dimensions(&image);

    if plan.meta {
        let info = MetaInfo {
            format,
            content_type: format.content_type(),
            width,
            height,
        };
        return Ok(Rendered {
            bytes: serde_json::to_vec(&info)?,
            format,
            content_type: "application/json",
            width,
            height,
        });
    }

    let background = filters.iter().rev().find_map(|f| match f {
        Filter::BackgroundColor(color) => Some(*color),
        _ => None,
    });
    let image = match background {
        Some(color) => engine.fill(image, FillMode::Color(color)),
        None if !format.supports_alpha() => engine.fill(image, FillMode::Color(Color::WHITE)),
        None => image,
    };

    let quality = output_quality(filters, config);
    debug!("Encode {width}x{height} as {format} at quality {}", quality.value());
    let bytes = engine
        .encode(&image, format, quality)
        .map_err(at(Stage::Encode))?;
    Ok(Rendered {
        bytes,
        format,
        content_type: format.content_type(),
        width,
        height,
    })
}
