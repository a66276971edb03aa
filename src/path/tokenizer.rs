//! Split a path into classified segments.
//!
//! Classification is by *shape* only: a segment that looks like a dimension
//! is tagged [`SegmentKind::Dimension`] even if its numbers are malformed, so
//! the resolver can report the error instead of the segment silently
//! becoming part of the image identifier.

use super::ParseError;

const FILTERS_PREFIX: &str = "filters:";

const ALIGNMENT_KEYWORDS: &[&str] = &["left", "right", "center", "top", "bottom", "middle", "smart"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Meta,
    Trim,
    Crop,
    FitIn,
    Stretch,
    Dimension,
    Padding,
    Alignment,
    Filters,
    ImagePath,
}

/// A slice of the input path with the structural slot it was matched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathSegment<'a> {
    pub kind: SegmentKind,
    pub text: &'a str,
}

/// Structural slots in precedence order. `Stretch` appears twice: before the
/// dimension (canonical) and after the alignment keywords.
const SLOTS: &[SegmentKind] = &[
    SegmentKind::Meta,
    SegmentKind::Trim,
    SegmentKind::Crop,
    SegmentKind::FitIn,
    SegmentKind::Stretch,
    SegmentKind::Dimension,
    SegmentKind::Padding,
    SegmentKind::Alignment,
    SegmentKind::Stretch,
    SegmentKind::Filters,
];

fn is_signed_digits(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_digit() || c == '-')
}

/// `AxB` where both sides are digits/minus signs and non-empty.
fn is_pair_shape(s: &str) -> bool {
    s.split_once('x')
        .is_some_and(|(a, b)| !a.is_empty() && !b.is_empty() && is_signed_digits(a) && is_signed_digits(b))
}

/// `AxB:CxD`.
fn is_rect_shape(s: &str) -> bool {
    s.split_once(':')
        .is_some_and(|(a, b)| is_pair_shape(a) && is_pair_shape(b))
}

/// `[-][W]x[-][H]`, either side may be empty.
fn is_dimension_shape(s: &str) -> bool {
    s.split_once('x')
        .is_some_and(|(w, h)| is_signed_digits(w) && is_signed_digits(h))
}

fn matches(kind: SegmentKind, text: &str) -> bool {
    match kind {
        SegmentKind::Meta => text == "meta",
        SegmentKind::Trim => text == "trim" || text.starts_with("trim:"),
        SegmentKind::Crop => is_rect_shape(text),
        SegmentKind::FitIn => text == "fit-in",
        SegmentKind::Stretch => text == "stretch",
        SegmentKind::Dimension => is_dimension_shape(text),
        SegmentKind::Padding => is_pair_shape(text) || is_rect_shape(text),
        SegmentKind::Alignment => ALIGNMENT_KEYWORDS.contains(&text),
        SegmentKind::Filters => text.starts_with(FILTERS_PREFIX),
        SegmentKind::ImagePath => false,
    }
}

/// Split off the next segment. The `filters:` segment ends at the first `/`
/// outside parentheses, so filter arguments may contain slashes.
///
/// Returns `(segment, rest)`; `rest` is `None` when no `/` follows.
fn split_segment(rest: &str) -> (&str, Option<&str>) {
    let end = if rest.starts_with(FILTERS_PREFIX) {
        let mut depth = 0i32;
        rest.char_indices()
            .find(|&(_, c)| {
                match c {
                    '(' => depth += 1,
                    ')' => depth -= 1,
                    '/' if depth <= 0 => return true,
                    _ => {}
                }
                false
            })
            .map(|(i, _)| i)
    } else {
        rest.find('/')
    };

    match end {
        Some(i) => (&rest[..i], Some(&rest[i + 1..])),
        None => (rest, None),
    }
}

/// Classify `text` against the slots starting at `slot`.
///
/// Returns the matched kind and the slot to resume from.
fn classify(text: &str, slot: usize) -> Option<(SegmentKind, usize)> {
    SLOTS[slot..]
        .iter()
        .enumerate()
        .find(|(_, kind)| matches(**kind, text))
        .map(|(offset, &kind)| {
            let index = slot + offset;
            // Alignment keywords may repeat; the resolver rejects conflicts
            let next = if kind == SegmentKind::Alignment {
                index
            } else {
                index + 1
            };
            (kind, next)
        })
}

/// Tokenize a path (signature prefix already removed).
///
/// A structural segment must be followed by `/`; whatever remains once a
/// segment fails to classify is the image identifier.
pub fn tokenize(path: &str) -> Result<Vec<PathSegment<'_>>, ParseError> {
    let mut rest = path.strip_prefix('/').unwrap_or(path);
    let mut slot = 0;
    let mut segments = Vec::new();

    while slot < SLOTS.len() {
        let (head, tail) = split_segment(rest);
        let Some(tail) = tail else { break };
        let Some((kind, next)) = classify(head, slot) else {
            break;
        };
        segments.push(PathSegment { kind, text: head });
        rest = tail;
        slot = next;
    }

    if rest.is_empty() {
        return Err(ParseError::MalformedPath(format!(
            "`{path}` has no image identifier"
        )));
    }
    segments.push(PathSegment {
        kind: SegmentKind::ImagePath,
        text: rest,
    });
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(path: &str) -> Vec<(SegmentKind, &str)> {
        tokenize(path)
            .unwrap()
            .into_iter()
            .map(|s| (s.kind, s.text))
            .collect()
    }

    #[test]
    fn image_only() {
        assert_eq!(kinds("gopher.png"), vec![(SegmentKind::ImagePath, "gopher.png")]);
    }

    #[test]
    fn leading_slash_is_ignored() {
        assert_eq!(
            kinds("/fit-in/100x100/a.png"),
            vec![
                (SegmentKind::FitIn, "fit-in"),
                (SegmentKind::Dimension, "100x100"),
                (SegmentKind::ImagePath, "a.png"),
            ]
        );
    }

    #[test]
    fn image_keeps_embedded_slashes() {
        assert_eq!(
            kinds("100x100/a/b/c.png"),
            vec![
                (SegmentKind::Dimension, "100x100"),
                (SegmentKind::ImagePath, "a/b/c.png"),
            ]
        );
    }

    #[test]
    fn crop_before_dimension_padding_after() {
        assert_eq!(
            kinds("10x20:300x500/fit-in/100x200/5x5/a.png"),
            vec![
                (SegmentKind::Crop, "10x20:300x500"),
                (SegmentKind::FitIn, "fit-in"),
                (SegmentKind::Dimension, "100x200"),
                (SegmentKind::Padding, "5x5"),
                (SegmentKind::ImagePath, "a.png"),
            ]
        );
    }

    #[test]
    fn stretch_before_dimension_or_after_alignment() {
        assert_eq!(
            kinds("stretch/100x100/a.png")[0],
            (SegmentKind::Stretch, "stretch")
        );
        assert_eq!(
            kinds("100x100/left/stretch/a.png")[2],
            (SegmentKind::Stretch, "stretch")
        );
    }

    #[test]
    fn alignment_repeats() {
        assert_eq!(
            kinds("200x100/right/top/smart/a.png"),
            vec![
                (SegmentKind::Dimension, "200x100"),
                (SegmentKind::Alignment, "right"),
                (SegmentKind::Alignment, "top"),
                (SegmentKind::Alignment, "smart"),
                (SegmentKind::ImagePath, "a.png"),
            ]
        );
    }

    #[test]
    fn out_of_order_segment_starts_image() {
        // Dimension slot is already behind us once alignment matched
        assert_eq!(
            kinds("left/100x100/a.png"),
            vec![
                (SegmentKind::Alignment, "left"),
                (SegmentKind::ImagePath, "100x100/a.png"),
            ]
        );
    }

    #[test]
    fn filters_segment_is_paren_aware() {
        assert_eq!(
            kinds("filters:watermark(logos/x.png,0,0):blur(2)/photos/a.png"),
            vec![
                (
                    SegmentKind::Filters,
                    "filters:watermark(logos/x.png,0,0):blur(2)"
                ),
                (SegmentKind::ImagePath, "photos/a.png"),
            ]
        );
    }

    #[test]
    fn malformed_lookalikes_are_still_classified() {
        assert_eq!(kinds("--200x100/a.png")[0].0, SegmentKind::Dimension);
        assert_eq!(kinds("trim:nope/a.png")[0].0, SegmentKind::Trim);
    }

    #[test]
    fn trailing_structural_segment_is_image() {
        // No `/` after it, so it cannot be structural
        assert_eq!(kinds("100x100"), vec![(SegmentKind::ImagePath, "100x100")]);
    }

    #[test]
    fn empty_image_is_malformed() {
        assert!(matches!(tokenize("100x100/"), Err(ParseError::MalformedPath(_))));
        assert!(matches!(tokenize(""), Err(ParseError::MalformedPath(_))));
        assert!(matches!(tokenize("/"), Err(ParseError::MalformedPath(_))));
    }
}
