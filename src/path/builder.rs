//! Merge resolved segments into one validated [`OperationPlan`].
//!
//! Rules checked here span more than one segment:
//!
//! | Rule | Example rejected |
//! |---|---|
//! | `fit-in` and `stretch` are exclusive | `fit-in/stretch/100x100/a.png` |
//! | `fit-in` needs a non-zero dimension | `fit-in/a.png` |
//! | `stretch` needs a non-zero dimension | `stretch/a.png` |
//! | `stretch` forbids alignment and `smart` | `stretch/100x100/left/a.png` |
//! | padding needs `fit-in` | `100x100/10x10/a.png` |
//! | `stretch` appears at most once | `stretch/100x100/left/stretch/a.png` |

use super::ParseError;
use super::resolvers::{
    resolve_alignment, resolve_crop, resolve_dimension, resolve_filters, resolve_padding,
    resolve_trim,
};
use super::tokenizer::{PathSegment, SegmentKind};
use crate::plan::{OperationPlan, ResizeSpec, Signature};

fn malformed(what: impl Into<String>) -> ParseError {
    ParseError::MalformedPath(what.into())
}

/// Build a plan from tokenized segments. Fails on the first violated rule.
pub fn build_plan(signature: Signature, segments: &[PathSegment<'_>]) -> Result<OperationPlan, ParseError> {
    let mut plan = OperationPlan::for_image(String::new());
    plan.signature = signature;

    let mut resize = ResizeSpec::default();
    let mut alignment_tokens: Vec<&str> = Vec::new();
    let mut image = None;

    for segment in segments {
        match segment.kind {
            SegmentKind::Meta => plan.meta = true,
            SegmentKind::Trim => plan.trim = resolve_trim(segment.text)?,
            SegmentKind::Crop => plan.crop = Some(resolve_crop(segment.text)?),
            SegmentKind::FitIn => resize.fit_in = true,
            SegmentKind::Stretch => {
                if resize.stretch {
                    return Err(malformed("`stretch/` given twice"));
                }
                resize.stretch = true;
            }
            SegmentKind::Dimension => {
                let d = resolve_dimension(segment.text)?;
                resize.width = d.width;
                resize.height = d.height;
                resize.flip_h = d.flip_h;
                resize.flip_v = d.flip_v;
            }
            SegmentKind::Padding => resize.padding = Some(resolve_padding(segment.text)?),
            SegmentKind::Alignment => alignment_tokens.push(segment.text),
            SegmentKind::Filters => plan.filters = resolve_filters(segment.text)?,
            SegmentKind::ImagePath => image = Some(segment.text),
        }
    }

    let alignment = resolve_alignment(&alignment_tokens)?;
    resize.h_align = alignment.h_align;
    resize.v_align = alignment.v_align;
    resize.smart = alignment.smart;

    validate_resize(&resize, &alignment_tokens)?;

    plan.image = image
        .filter(|i| !i.is_empty())
        .ok_or_else(|| malformed("missing image identifier"))?
        .to_string();
    plan.resize = resize;
    Ok(plan)
}

fn validate_resize(resize: &ResizeSpec, alignment_tokens: &[&str]) -> Result<(), ParseError> {
    if resize.fit_in && resize.stretch {
        return Err(malformed("`fit-in/` and `stretch/` are mutually exclusive"));
    }
    if resize.fit_in && !resize.has_dimension() {
        return Err(malformed("`fit-in/` requires a non-zero dimension segment"));
    }
    if resize.stretch && !resize.has_dimension() {
        return Err(malformed("`stretch/` requires a non-zero dimension segment"));
    }
    if resize.stretch && !alignment_tokens.is_empty() {
        return Err(malformed(format!(
            "`stretch/` cannot be combined with `{}/`",
            alignment_tokens.join("/")
        )));
    }
    if resize.padding.is_some() && !resize.fit_in {
        return Err(malformed("padding segment requires `fit-in/`"));
    }
    Ok(())
}
