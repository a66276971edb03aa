//! Filter dispatch table.
//!
//! The path grammar leaves filter arguments as raw strings. This module owns
//! the table of known filters: each [`FilterSpec`] declares its arity and the
//! kind of every positional argument, arguments are coerced into [`ArgValue`]s,
//! and the coerced values are assembled into a typed [`Filter`].
//!
//! All filters of a plan are resolved before any pixel work, so a bad
//! argument in the last filter fails the request without decoding the source.
//!
//! | Filter | Arguments |
//! |---|---|
//! | `background_color` | color |
//! | `blur` | sigma |
//! | `brightness`, `contrast`, `saturation` | -100..=100 |
//! | `fill` | color, `blur`, `auto` or `none` |
//! | `format` | jpeg, png, webp, gif, tiff, avif |
//! | `grayscale`, `strip_exif`, `strip_icc`, `upscale` | none |
//! | `hue` | degrees |
//! | `quality` | 0..=100 |
//! | `rgb` | r, g, b, each -100..=100 |
//! | `rotate` | multiple of 90 |
//! | `round_corner` | rx [, ry [, color]] |
//! | `trim` | [tolerance [, top-left or bottom-right]] |
//! | `watermark` | image, x, y [, alpha [, w_ratio [, h_ratio]]] |

use crate::imaging::calculations::Placement;
use crate::imaging::{Color, FillMode, OutputFormat, Quality, Rotation};
use crate::plan::{DEFAULT_TRIM_TOLERANCE, FilterCall, TrimAnchor};
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A filter argument that could not be coerced, or a call with the wrong arity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("filter `{filter}` argument {index}: expected {expected}")]
pub struct FilterArgError {
    pub filter: String,
    pub index: usize,
    pub expected: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("unknown filter `{0}`")]
    UnknownFilter(String),
    #[error(transparent)]
    Arg(#[from] FilterArgError),
}

/// What to do with a filter name that is not in the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownFilterPolicy {
    /// Drop the call and log a warning.
    #[default]
    Ignore,
    /// Fail the request with [`DispatchError::UnknownFilter`].
    Reject,
}

/// Expected shape of one positional argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgKind {
    Int { min: i32, max: i32 },
    Float { min: f32, max: f32 },
    Color,
    Text,
    Format,
    Fill,
    Rotation,
    Anchor,
    /// Watermark x: number, `Np`, `left`, `right`, `center` or `repeat`.
    PlacementX,
    /// Watermark y: number, `Np`, `top`, `bottom`, `center` or `repeat`.
    PlacementY,
    /// Percent 0..=100, or `none`.
    Ratio,
}

impl ArgKind {
    fn describe(self) -> String {
        match self {
            ArgKind::Int { min, max } => format!("integer in {min}..={max}"),
            ArgKind::Float { min, max } => format!("number in {min}..={max}"),
            ArgKind::Color => "color name or hex".into(),
            ArgKind::Text => "non-empty text".into(),
            ArgKind::Format => "jpeg, png, webp, gif, tiff or avif".into(),
            ArgKind::Fill => "color, blur, auto or none".into(),
            ArgKind::Rotation => "multiple of 90".into(),
            ArgKind::Anchor => "top-left or bottom-right".into(),
            ArgKind::PlacementX => "pixels, Np (N in -100..=100), left, right, center or repeat".into(),
            ArgKind::PlacementY => "pixels, Np (N in -100..=100), top, bottom, center or repeat".into(),
            ArgKind::Ratio => "percent 0..=100 or none".into(),
        }
    }
}

/// A coerced argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Int(i32),
    Float(f32),
    Color(Color),
    Text(String),
    Format(OutputFormat),
    Fill(FillMode),
    Rotation(Rotation),
    Anchor(TrimAnchor),
    Placement(Placement),
    Ratio(Option<u32>),
}

impl ArgValue {
    fn int(&self) -> Option<i32> {
        match self {
            ArgValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    fn float(&self) -> Option<f32> {
        match self {
            ArgValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    fn color(&self) -> Option<Color> {
        match self {
            ArgValue::Color(c) => Some(*c),
            _ => None,
        }
    }

    fn text(&self) -> Option<String> {
        match self {
            ArgValue::Text(t) => Some(t.clone()),
            _ => None,
        }
    }

    fn format(&self) -> Option<OutputFormat> {
        match self {
            ArgValue::Format(f) => Some(*f),
            _ => None,
        }
    }

    fn fill(&self) -> Option<FillMode> {
        match self {
            ArgValue::Fill(mode) => Some(*mode),
            _ => None,
        }
    }

    fn rotation(&self) -> Option<Rotation> {
        match self {
            ArgValue::Rotation(r) => Some(*r),
            _ => None,
        }
    }

    fn anchor(&self) -> Option<TrimAnchor> {
        match self {
            ArgValue::Anchor(a) => Some(*a),
            _ => None,
        }
    }

    fn placement(&self) -> Option<Placement> {
        match self {
            ArgValue::Placement(p) => Some(*p),
            _ => None,
        }
    }

    fn ratio(&self) -> Option<Option<u32>> {
        match self {
            ArgValue::Ratio(r) => Some(*r),
            _ => None,
        }
    }
}

/// Arity, argument kinds and constructor of one filter.
#[derive(Debug, Clone, Copy)]
pub struct FilterSpec {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    pub arg_kinds: &'static [ArgKind],
    build: fn(&Args) -> Result<Filter, FilterArgError>,
}

const PERCENT: ArgKind = ArgKind::Int { min: -100, max: 100 };

const FILTER_TABLE: &[FilterSpec] = &[
    FilterSpec {
        name: "background_color",
        min_args: 1,
        max_args: 1,
        arg_kinds: &[ArgKind::Color],
        build: |a| Ok(Filter::BackgroundColor(a.required(0, ArgValue::color)?)),
    },
    FilterSpec {
        name: "blur",
        min_args: 1,
        max_args: 1,
        arg_kinds: &[ArgKind::Float { min: 0.0, max: 150.0 }],
        build: |a| Ok(Filter::Blur(a.required(0, ArgValue::float)?)),
    },
    FilterSpec {
        name: "brightness",
        min_args: 1,
        max_args: 1,
        arg_kinds: &[PERCENT],
        build: |a| Ok(Filter::Brightness(a.required(0, ArgValue::int)?)),
    },
    FilterSpec {
        name: "contrast",
        min_args: 1,
        max_args: 1,
        arg_kinds: &[PERCENT],
        build: |a| Ok(Filter::Contrast(a.required(0, ArgValue::int)?)),
    },
    FilterSpec {
        name: "fill",
        min_args: 1,
        max_args: 1,
        arg_kinds: &[ArgKind::Fill],
        build: |a| Ok(Filter::Fill(a.required(0, ArgValue::fill)?)),
    },
    FilterSpec {
        name: "format",
        min_args: 1,
        max_args: 1,
        arg_kinds: &[ArgKind::Format],
        build: |a| Ok(Filter::Format(a.required(0, ArgValue::format)?)),
    },
    FilterSpec {
        name: "grayscale",
        min_args: 0,
        max_args: 0,
        arg_kinds: &[],
        build: |_| Ok(Filter::Grayscale),
    },
    FilterSpec {
        name: "hue",
        min_args: 1,
        max_args: 1,
        arg_kinds: &[ArgKind::Int { min: -360, max: 360 }],
        build: |a| Ok(Filter::Hue(a.required(0, ArgValue::int)?)),
    },
    FilterSpec {
        name: "quality",
        min_args: 1,
        max_args: 1,
        arg_kinds: &[ArgKind::Int { min: 0, max: 100 }],
        build: |a| Ok(Filter::Quality(Quality::new(a.required(0, ArgValue::int)? as u32))),
    },
    FilterSpec {
        name: "rgb",
        min_args: 3,
        max_args: 3,
        arg_kinds: &[PERCENT, PERCENT, PERCENT],
        build: |a| {
            Ok(Filter::Rgb(
                a.required(0, ArgValue::int)?,
                a.required(1, ArgValue::int)?,
                a.required(2, ArgValue::int)?,
            ))
        },
    },
    FilterSpec {
        name: "rotate",
        min_args: 1,
        max_args: 1,
        arg_kinds: &[ArgKind::Rotation],
        build: |a| Ok(Filter::Rotate(a.required(0, ArgValue::rotation)?)),
    },
    FilterSpec {
        name: "round_corner",
        min_args: 1,
        max_args: 3,
        arg_kinds: &[
            ArgKind::Int { min: 0, max: 10_000 },
            ArgKind::Int { min: 0, max: 10_000 },
            ArgKind::Color,
        ],
        build: |a| {
            let rx = a.required(0, ArgValue::int)? as u32;
            Ok(Filter::RoundCorner {
                rx,
                ry: a.get(1, ArgValue::int)?.map_or(rx, |v| v as u32),
                color: a.get(2, ArgValue::color)?.unwrap_or(Color::TRANSPARENT),
            })
        },
    },
    FilterSpec {
        name: "saturation",
        min_args: 1,
        max_args: 1,
        arg_kinds: &[PERCENT],
        build: |a| Ok(Filter::Saturation(a.required(0, ArgValue::int)?)),
    },
    FilterSpec {
        name: "strip_exif",
        min_args: 0,
        max_args: 0,
        arg_kinds: &[],
        build: |_| Ok(Filter::StripExif),
    },
    FilterSpec {
        name: "strip_icc",
        min_args: 0,
        max_args: 0,
        arg_kinds: &[],
        build: |_| Ok(Filter::StripIcc),
    },
    FilterSpec {
        name: "trim",
        min_args: 0,
        max_args: 2,
        arg_kinds: &[ArgKind::Int { min: 0, max: 255 }, ArgKind::Anchor],
        build: |a| {
            Ok(Filter::Trim {
                tolerance: a.get(0, ArgValue::int)?.map_or(DEFAULT_TRIM_TOLERANCE, |v| v as u8),
                anchor: a.get(1, ArgValue::anchor)?.unwrap_or(TrimAnchor::Default),
            })
        },
    },
    FilterSpec {
        name: "upscale",
        min_args: 0,
        max_args: 0,
        arg_kinds: &[],
        build: |_| Ok(Filter::Upscale),
    },
    FilterSpec {
        name: "watermark",
        min_args: 3,
        max_args: 6,
        arg_kinds: &[
            ArgKind::Text,
            ArgKind::PlacementX,
            ArgKind::PlacementY,
            ArgKind::Int { min: 0, max: 100 },
            ArgKind::Ratio,
            ArgKind::Ratio,
        ],
        build: |a| {
            Ok(Filter::Watermark(WatermarkSpec {
                image: a.required(0, ArgValue::text)?,
                x: a.required(1, ArgValue::placement)?,
                y: a.required(2, ArgValue::placement)?,
                alpha: a.get(3, ArgValue::int)?.map_or(100, |v| v as u32),
                width_ratio: a.get(4, ArgValue::ratio)?.flatten(),
                height_ratio: a.get(5, ArgValue::ratio)?.flatten(),
            }))
        },
    },
];

/// Look up a filter by name.
pub fn lookup(name: &str) -> Option<&'static FilterSpec> {
    FILTER_TABLE.iter().find(|spec| spec.name == name)
}

/// Watermark arguments after coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkSpec {
    pub image: String,
    pub x: Placement,
    pub y: Placement,
    /// Opacity percent, 100 is fully opaque.
    pub alpha: u32,
    pub width_ratio: Option<u32>,
    pub height_ratio: Option<u32>,
}

/// A validated filter ready for the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    BackgroundColor(Color),
    Blur(f32),
    Brightness(i32),
    Contrast(i32),
    Fill(FillMode),
    Format(OutputFormat),
    Grayscale,
    Hue(i32),
    Quality(Quality),
    Rgb(i32, i32, i32),
    Rotate(Rotation),
    RoundCorner { rx: u32, ry: u32, color: Color },
    Saturation(i32),
    StripExif,
    StripIcc,
    Trim { tolerance: u8, anchor: TrimAnchor },
    Upscale,
    Watermark(WatermarkSpec),
}

impl Filter {
    /// Filters that only change how the result is encoded or sized, not the
    /// pixels at their position in the chain.
    pub fn is_output_only(&self) -> bool {
        matches!(
            self,
            Filter::Format(_) | Filter::Quality(_) | Filter::BackgroundColor(_) | Filter::Upscale
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Filter::BackgroundColor(_) => "background_color",
            Filter::Blur(_) => "blur",
            Filter::Brightness(_) => "brightness",
            Filter::Contrast(_) => "contrast",
            Filter::Fill(_) => "fill",
            Filter::Format(_) => "format",
            Filter::Grayscale => "grayscale",
            Filter::Hue(_) => "hue",
            Filter::Quality(_) => "quality",
            Filter::Rgb(..) => "rgb",
            Filter::Rotate(_) => "rotate",
            Filter::RoundCorner { .. } => "round_corner",
            Filter::Saturation(_) => "saturation",
            Filter::StripExif => "strip_exif",
            Filter::StripIcc => "strip_icc",
            Filter::Trim { .. } => "trim",
            Filter::Upscale => "upscale",
            Filter::Watermark(_) => "watermark",
        }
    }
}

fn parse_placement(raw: &str, start: &str, end: &str) -> Option<Placement> {
    match raw {
        "center" => Some(Placement::Center),
        "repeat" => Some(Placement::Repeat),
        _ if raw == start => Some(Placement::Start),
        _ if raw == end => Some(Placement::End),
        _ => match raw.strip_suffix('p') {
            Some(percent) => percent
                .parse::<i32>()
                .ok()
                .filter(|p| (-100..=100).contains(p))
                .map(Placement::Percent),
            None => raw.parse().ok().map(Placement::Offset),
        },
    }
}

/// Coerce one raw argument into the value its kind demands.
pub fn coerce(raw: &str, kind: ArgKind) -> Option<ArgValue> {
    let raw = raw.trim();
    match kind {
        ArgKind::Int { min, max } => raw
            .parse::<i32>()
            .ok()
            .filter(|v| (min..=max).contains(v))
            .map(ArgValue::Int),
        ArgKind::Float { min, max } => raw
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite() && (min..=max).contains(v))
            .map(ArgValue::Float),
        ArgKind::Color => raw.parse().ok().map(ArgValue::Color),
        ArgKind::Text => (!raw.is_empty()).then(|| ArgValue::Text(raw.to_string())),
        ArgKind::Format => raw.parse().ok().map(ArgValue::Format),
        ArgKind::Fill => match raw {
            "blur" => Some(ArgValue::Fill(FillMode::Blur)),
            "auto" => Some(ArgValue::Fill(FillMode::Auto)),
            "none" => Some(ArgValue::Fill(FillMode::None)),
            _ => raw.parse().ok().map(|c| ArgValue::Fill(FillMode::Color(c))),
        },
        ArgKind::Rotation => raw
            .parse::<i32>()
            .ok()
            .and_then(Rotation::from_degrees)
            .map(ArgValue::Rotation),
        ArgKind::Anchor => match raw {
            "top-left" => Some(ArgValue::Anchor(TrimAnchor::TopLeft)),
            "bottom-right" => Some(ArgValue::Anchor(TrimAnchor::BottomRight)),
            _ => None,
        },
        ArgKind::PlacementX => parse_placement(raw, "left", "right").map(ArgValue::Placement),
        ArgKind::PlacementY => parse_placement(raw, "top", "bottom").map(ArgValue::Placement),
        ArgKind::Ratio => match raw {
            "none" => Some(ArgValue::Ratio(None)),
            _ => raw
                .parse::<u32>()
                .ok()
                .filter(|v| *v <= 100)
                .map(|v| ArgValue::Ratio((v > 0).then_some(v))),
        },
    }
}

/// Coerced arguments of one call, read positionally by a table constructor.
///
/// A value of the wrong kind at an index is an error, never a default.
struct Args {
    filter: &'static str,
    values: Vec<ArgValue>,
}

impl Args {
    fn error(&self, index: usize, expected: String) -> FilterArgError {
        FilterArgError {
            filter: self.filter.to_string(),
            index,
            expected,
        }
    }

    /// `Ok(None)` when the optional argument at `index` was not given.
    fn get<T>(&self, index: usize, pick: fn(&ArgValue) -> Option<T>) -> Result<Option<T>, FilterArgError> {
        match self.values.get(index) {
            None => Ok(None),
            Some(value) => pick(value)
                .map(Some)
                .ok_or_else(|| self.error(index, format!("another kind of value, got {value:?}"))),
        }
    }

    fn required<T>(&self, index: usize, pick: fn(&ArgValue) -> Option<T>) -> Result<T, FilterArgError> {
        self.get(index, pick)?
            .ok_or_else(|| self.error(index, "a value, got nothing".into()))
    }
}

fn arg_error(spec: &FilterSpec, index: usize, expected: String) -> FilterArgError {
    FilterArgError {
        filter: spec.name.to_string(),
        index,
        expected,
    }
}

/// Resolve one call against the table. `Ok(None)` when the name is unknown.
pub fn resolve_call(call: &FilterCall) -> Result<Option<Filter>, FilterArgError> {
    let Some(spec) = lookup(&call.name) else {
        return Ok(None);
    };
    let count = call.args.len();
    if count < spec.min_args || count > spec.max_args {
        let expected = if spec.min_args == spec.max_args {
            format!("{} argument(s), got {count}", spec.min_args)
        } else {
            format!("{}..={} arguments, got {count}", spec.min_args, spec.max_args)
        };
        return Err(arg_error(spec, count.min(spec.max_args), expected));
    }

    let values = call
        .args
        .iter()
        .zip(spec.arg_kinds)
        .enumerate()
        .map(|(index, (raw, kind))| {
            coerce(raw, *kind)
                .ok_or_else(|| arg_error(spec, index, format!("{}, got `{raw}`", kind.describe())))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let args = Args {
        filter: spec.name,
        values,
    };
    (spec.build)(&args).map(Some)
}

/// Resolve every call of a plan, in order.
///
/// Unknown names are dropped with a warning under
/// [`UnknownFilterPolicy::Ignore`] and fail under `Reject`.
pub fn resolve_filters(
    calls: &[FilterCall],
    policy: UnknownFilterPolicy,
) -> Result<Vec<Filter>, DispatchError> {
    let mut filters = Vec::with_capacity(calls.len());
    for call in calls {
        match resolve_call(call)? {
            Some(filter) => filters.push(filter),
            None => match policy {
                UnknownFilterPolicy::Ignore => warn!("Dropping unknown filter `{}`", call.name),
                UnknownFilterPolicy::Reject => {
                    return Err(DispatchError::UnknownFilter(call.name.clone()));
                }
            },
        }
    }
    Ok(filters)
}
