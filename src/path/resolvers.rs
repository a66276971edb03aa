//! One parser per structural segment.
//!
//! Every resolver is a pure `&str → Result<T, ParseError>` function with no
//! knowledge of the other segments; cross-segment rules live in
//! [`builder`](super::builder).

use super::ParseError;
use crate::plan::{CropRect, FilterCall, HAlign, Padding, TrimAnchor, TrimSpec, VAlign};

fn malformed(segment: &str, what: &str) -> ParseError {
    ParseError::MalformedPath(format!("`{segment}`: {what}"))
}

/// Parse a non-empty run of ASCII digits.
fn parse_uint(text: &str, segment: &str) -> Result<u32, ParseError> {
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return Err(malformed(segment, &format!("`{text}` is not a non-negative integer")));
    }
    text.parse()
        .map_err(|_| malformed(segment, &format!("`{text}` is out of range")))
}

fn parse_pair(text: &str, segment: &str) -> Result<(u32, u32), ParseError> {
    let (a, b) = text
        .split_once('x')
        .ok_or_else(|| malformed(segment, "expected `AxB`"))?;
    Ok((parse_uint(a, segment)?, parse_uint(b, segment)?))
}

fn to_i32(value: u32, segment: &str) -> Result<i32, ParseError> {
    i32::try_from(value).map_err(|_| malformed(segment, "coordinate out of range"))
}

/// `trim`, `trim:<0-255>`, `trim:top-left` or `trim:bottom-right`.
pub fn resolve_trim(segment: &str) -> Result<TrimSpec, ParseError> {
    let mut spec = TrimSpec {
        enabled: true,
        ..TrimSpec::default()
    };
    let Some(qualifier) = segment.strip_prefix("trim").filter(|q| !q.is_empty()) else {
        return Ok(spec);
    };
    let qualifier = qualifier
        .strip_prefix(':')
        .ok_or_else(|| malformed(segment, "expected `trim:<qualifier>`"))?;

    match qualifier {
        "top-left" => spec.anchor = TrimAnchor::TopLeft,
        "bottom-right" => spec.anchor = TrimAnchor::BottomRight,
        value if value.contains(':') => {
            return Err(malformed(segment, "only one trim qualifier is allowed"));
        }
        value => {
            let tolerance = parse_uint(value, segment)?;
            let tolerance = u8::try_from(tolerance)
                .map_err(|_| malformed(segment, "trim tolerance must be 0-255"))?;
            spec.tolerance = Some(tolerance);
        }
    }
    Ok(spec)
}

/// `LxT:RxB`, all four values required.
pub fn resolve_crop(segment: &str) -> Result<CropRect, ParseError> {
    let (top_left, bottom_right) = segment
        .split_once(':')
        .ok_or_else(|| malformed(segment, "expected `LxT:RxB`"))?;
    let (left, top) = parse_pair(top_left, segment)?;
    let (right, bottom) = parse_pair(bottom_right, segment)?;
    Ok(CropRect {
        left: to_i32(left, segment)?,
        top: to_i32(top, segment)?,
        right: to_i32(right, segment)?,
        bottom: to_i32(bottom, segment)?,
    })
}

/// Target size with per-axis flip flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dimension {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub flip_h: bool,
    pub flip_v: bool,
}

/// `[-][W]x[-][H]`. A leading `-` flips that axis; a blank size is derived
/// later from the aspect ratio. Only one sign per axis: `--W` is malformed.
pub fn resolve_dimension(segment: &str) -> Result<Dimension, ParseError> {
    let (w, h) = segment
        .split_once('x')
        .ok_or_else(|| malformed(segment, "expected `WxH`"))?;

    let axis = |text: &str| -> Result<(bool, Option<u32>), ParseError> {
        let (flip, magnitude) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        if magnitude.is_empty() {
            return Ok((flip, None));
        }
        Ok((flip, Some(parse_uint(magnitude, segment)?)))
    };

    let (flip_h, width) = axis(w)?;
    let (flip_v, height) = axis(h)?;
    if width.is_none() && height.is_none() && !flip_h && !flip_v {
        return Err(malformed(segment, "neither a size nor a flip"));
    }
    Ok(Dimension {
        width,
        height,
        flip_h,
        flip_v,
    })
}

/// `LxT` (right = left, bottom = top) or `LxT:RxB`.
pub fn resolve_padding(segment: &str) -> Result<Padding, ParseError> {
    let (near, far) = match segment.split_once(':') {
        Some((near, far)) => (parse_pair(near, segment)?, Some(parse_pair(far, segment)?)),
        None => (parse_pair(segment, segment)?, None),
    };
    let (left, top) = near;
    let (right, bottom) = far.unwrap_or(near);
    Ok(Padding {
        left,
        top,
        right,
        bottom,
    })
}

/// Resolved alignment keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Alignment {
    pub h_align: Option<HAlign>,
    pub v_align: Option<VAlign>,
    pub smart: bool,
}

/// Merge the alignment keyword segments.
///
/// `center` is ambiguous on its own; it fills whichever axis the explicit
/// keywords left unset, horizontal first. `middle` is always vertical.
pub fn resolve_alignment(tokens: &[&str]) -> Result<Alignment, ParseError> {
    let conflict = |what: String| ParseError::ConflictingAlignment(what);
    let mut alignment = Alignment::default();
    let mut centers = 0;

    for &token in tokens {
        let (h, v) = match token {
            "left" => (Some(HAlign::Left), None),
            "right" => (Some(HAlign::Right), None),
            "top" => (None, Some(VAlign::Top)),
            "bottom" => (None, Some(VAlign::Bottom)),
            "middle" => (None, Some(VAlign::Center)),
            "center" => {
                centers += 1;
                continue;
            }
            "smart" => {
                if alignment.smart {
                    return Err(conflict("`smart` given twice".into()));
                }
                alignment.smart = true;
                continue;
            }
            other => {
                return Err(ParseError::MalformedPath(format!(
                    "`{other}` is not an alignment keyword"
                )));
            }
        };
        if let Some(h) = h {
            if let Some(prev) = alignment.h_align {
                return Err(conflict(format!("`{token}` after {prev:?} horizontal alignment")));
            }
            alignment.h_align = Some(h);
        }
        if let Some(v) = v {
            if let Some(prev) = alignment.v_align {
                return Err(conflict(format!("`{token}` after {prev:?} vertical alignment")));
            }
            alignment.v_align = Some(v);
        }
    }

    for _ in 0..centers {
        if alignment.h_align.is_none() {
            alignment.h_align = Some(HAlign::Center);
        } else if alignment.v_align.is_none() {
            alignment.v_align = Some(VAlign::Center);
        } else {
            return Err(conflict("`center` with both axes already aligned".into()));
        }
    }

    if alignment.smart && (alignment.h_align.is_some() || alignment.v_align.is_some()) {
        return Err(conflict("`smart` cannot be combined with explicit alignment".into()));
    }
    Ok(alignment)
}

/// Split on `sep` where it is not nested inside parentheses.
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn is_filter_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// `filters:name(a,b):name()`. Arguments stay raw strings; their meaning is
/// decided by the [`filters`](crate::filters) dispatch table.
pub fn resolve_filters(segment: &str) -> Result<Vec<FilterCall>, ParseError> {
    let body = segment
        .strip_prefix("filters:")
        .ok_or_else(|| malformed(segment, "expected `filters:` prefix"))?;
    if body.is_empty() {
        return Err(malformed(segment, "empty filter list"));
    }

    split_top_level(body, ':')
        .into_iter()
        .map(|entry| -> Result<FilterCall, ParseError> {
            let (name, args) = entry
                .strip_suffix(')')
                .and_then(|e| e.split_once('('))
                .ok_or_else(|| malformed(segment, &format!("`{entry}` is not `name(args)`")))?;
            if !is_filter_name(name) {
                return Err(malformed(segment, &format!("`{name}` is not a filter name")));
            }
            let args = if args.is_empty() {
                Vec::new()
            } else {
                split_top_level(args, ',')
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            };
            Ok(FilterCall {
                name: name.to_string(),
                args,
            })
        })
        .collect()
}
