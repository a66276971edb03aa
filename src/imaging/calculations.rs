//! Pure geometry for the pipeline stages.
//!
//! All functions here are pure and testable without any I/O or images:
//! target-size derivation, fit/fill scaling, crop clamping, alignment
//! offsets and watermark placement.

use super::params::Rect;
use crate::plan::{CropRect, HAlign, VAlign};

/// Resolve the requested box against the source aspect ratio.
///
/// Zero and absent mean "derive from the other axis". Returns `None` when
/// neither axis is given.
pub fn resolve_target(
    source: (u32, u32),
    width: Option<u32>,
    height: Option<u32>,
) -> Option<(u32, u32)> {
    let (src_w, src_h) = source;
    let width = width.filter(|&w| w > 0);
    let height = height.filter(|&h| h > 0);

    match (width, height) {
        (Some(w), Some(h)) => Some((w, h)),
        (Some(w), None) => {
            let h = (w as f64 * src_h as f64 / src_w as f64).round() as u32;
            Some((w, h.max(1)))
        }
        (None, Some(h)) => {
            let w = (h as f64 * src_w as f64 / src_h as f64).round() as u32;
            Some((w.max(1), h))
        }
        (None, None) => None,
    }
}

/// Calculate dimensions that fit entirely inside the target box.
///
/// Aspect ratio is preserved. One axis may be absent (unconstrained). Without
/// `upscale` the result never exceeds the source.
pub fn calculate_fit_dimensions(
    source: (u32, u32),
    width: Option<u32>,
    height: Option<u32>,
    upscale: bool,
) -> (u32, u32) {
    let (src_w, src_h) = source;
    let ratio_w = width
        .filter(|&w| w > 0)
        .map(|w| w as f64 / src_w as f64);
    let ratio_h = height
        .filter(|&h| h > 0)
        .map(|h| h as f64 / src_h as f64);

    let scale = match (ratio_w, ratio_h) {
        (Some(rw), Some(rh)) => rw.min(rh),
        (Some(r), None) | (None, Some(r)) => r,
        (None, None) => 1.0,
    };
    let scale = if upscale { scale } else { scale.min(1.0) };

    let w = (src_w as f64 * scale).round() as u32;
    let h = (src_h as f64 * scale).round() as u32;
    (w.max(1), h.max(1))
}

/// Calculate dimensions needed to fill a target area (resize before crop).
///
/// Returns dimensions that completely cover the target area while maintaining
/// the source aspect ratio. One dimension will match exactly, the other may exceed.
pub fn calculate_fill_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        // Source is wider: height will match, width will exceed
        let h = tgt_h;
        let w = (h as f64 * src_aspect).round() as u32;
        (w.max(tgt_w), h)
    } else {
        // Source is taller: width will match, height will exceed
        let w = tgt_w;
        let h = (w as f64 / src_aspect).round() as u32;
        (w, h.max(tgt_h))
    }
}

/// Where along an axis a smaller box sits inside a larger one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Start,
    Center,
    End,
}

impl From<Option<HAlign>> for Edge {
    fn from(align: Option<HAlign>) -> Self {
        match align {
            Some(HAlign::Left) => Edge::Start,
            Some(HAlign::Right) => Edge::End,
            Some(HAlign::Center) | None => Edge::Center,
        }
    }
}

impl From<Option<VAlign>> for Edge {
    fn from(align: Option<VAlign>) -> Self {
        match align {
            Some(VAlign::Top) => Edge::Start,
            Some(VAlign::Bottom) => Edge::End,
            Some(VAlign::Center) | None => Edge::Center,
        }
    }
}

/// Offset of the retained window given the overflow along one axis.
pub fn align_offset(overflow: u32, edge: Edge) -> u32 {
    match edge {
        Edge::Start => 0,
        Edge::Center => overflow / 2,
        Edge::End => overflow,
    }
}

/// Clamp a crop rectangle to the image bounds.
///
/// Returns `None` when nothing of the rectangle remains inside the image,
/// in which case the crop stage leaves the image untouched.
pub fn clamp_crop(rect: CropRect, bounds: (u32, u32)) -> Option<Rect> {
    let (w, h) = (bounds.0 as i64, bounds.1 as i64);
    let left = (rect.left as i64).clamp(0, w);
    let top = (rect.top as i64).clamp(0, h);
    let right = (rect.right as i64).clamp(0, w);
    let bottom = (rect.bottom as i64).clamp(0, h);

    if right <= left || bottom <= top {
        return None;
    }
    Some(Rect::new(
        left as u32,
        top as u32,
        (right - left) as u32,
        (bottom - top) as u32,
    ))
}

/// Watermark position along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Pixels from the near edge; negative counts from the far edge.
    Offset(i32),
    /// Percent of the canvas; negative counts from the far edge.
    Percent(i32),
    Center,
    Start,
    End,
    /// Tile across the axis at natural size.
    Repeat,
}

/// Origins of every copy of the mark along one axis.
///
/// Single placements yield one origin (which may lie partly outside the
/// canvas; compositing clips). `Repeat` tiles from zero.
pub fn placement_origins(placement: Placement, canvas: u32, mark: u32) -> Vec<i64> {
    let canvas = canvas as i64;
    let mark = mark as i64;

    let origin = match placement {
        Placement::Offset(n) if n < 0 => canvas - mark + n as i64,
        Placement::Offset(n) => n as i64,
        Placement::Percent(p) if p < 0 => canvas - mark - canvas * -(p as i64) / 100,
        Placement::Percent(p) => canvas * p as i64 / 100,
        Placement::Center => (canvas - mark) / 2,
        Placement::Start => 0,
        Placement::End => canvas - mark,
        Placement::Repeat => {
            if mark <= 0 {
                return vec![0];
            }
            return (0..canvas).step_by(mark as usize).collect();
        }
    };
    vec![origin]
}

/// Size of a watermark after applying the optional per-axis canvas ratios.
///
/// A single ratio keeps the mark's aspect ratio; both ratios scale each axis
/// independently.
pub fn watermark_size(
    mark: (u32, u32),
    canvas: (u32, u32),
    width_ratio: Option<u32>,
    height_ratio: Option<u32>,
) -> (u32, u32) {
    let scaled = |canvas_len: u32, ratio: u32| {
        ((canvas_len as u64 * ratio as u64) / 100).max(1) as u32
    };
    match (width_ratio, height_ratio) {
        (Some(rw), Some(rh)) => (scaled(canvas.0, rw), scaled(canvas.1, rh)),
        (Some(rw), None) => resolve_target(mark, Some(scaled(canvas.0, rw)), None).unwrap_or(mark),
        (None, Some(rh)) => resolve_target(mark, None, Some(scaled(canvas.1, rh))).unwrap_or(mark),
        (None, None) => mark,
    }
}
