//! Path grammar: raw request path → [`OperationPlan`].
//!
//! ```text
//! [unsafe|<signature>]/[meta/][trim[:tol|:top-left|:bottom-right]/][LxT:RxB/]
//!     [fit-in/][stretch/][-Wx-H/][LxT[:RxB]/][left|right|center/][top|bottom|middle/][smart/]
//!     [filters:name(args)[:name(args)]*/]<image>
//! ```
//!
//! Parsing happens in three steps, each independently testable:
//!
//! 1. [`tokenizer`] splits the path and tags each leading segment with the
//!    structural slot it matches, in fixed precedence. The first segment that
//!    matches nothing starts the image identifier.
//! 2. [`resolvers`] turn one tagged segment into a typed value.
//! 3. [`builder`] merges them into an [`OperationPlan`] and enforces the
//!    cross-segment rules (fit-in vs stretch, padding needs fit-in, ...).
//!
//! The builder is the only validation gate: a plan that comes out of
//! [`parse_request_path`] is complete and consistent.

pub mod builder;
pub mod resolvers;
pub mod tokenizer;

use crate::plan::{OperationPlan, Signature};
use thiserror::Error;

pub use tokenizer::{PathSegment, SegmentKind};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed path: {0}")]
    MalformedPath(String),
    #[error("conflicting alignment: {0}")]
    ConflictingAlignment(String),
}

/// Characters allowed in a URL-safe base64 signature.
fn is_signature_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '=')
}

/// Split the leading `unsafe` or signature segment off a request path.
///
/// The prefix is mandatory. Verifying the signature is the caller's job;
/// this only records it.
pub fn split_signature(raw: &str) -> Result<(Signature, &str), ParseError> {
    let raw = raw.strip_prefix('/').unwrap_or(raw);
    let (head, rest) = raw
        .split_once('/')
        .ok_or_else(|| ParseError::MalformedPath(format!("`{raw}` has no image identifier")))?;

    if head == "unsafe" {
        return Ok((Signature::Unsafe, rest));
    }
    if head.len() >= 8 && head.chars().all(is_signature_char) {
        return Ok((Signature::Signed(head.to_string()), rest));
    }
    Err(ParseError::MalformedPath(format!(
        "expected `unsafe/` or a signature, found `{head}/`"
    )))
}

/// Parse a path whose signature prefix has already been removed.
pub fn parse_path(signature: Signature, path: &str) -> Result<OperationPlan, ParseError> {
    let segments = tokenizer::tokenize(path)?;
    builder::build_plan(signature, &segments)
}

/// Parse a full request path, `unsafe/` or signature prefix included.
pub fn parse_request_path(raw: &str) -> Result<OperationPlan, ParseError> {
    let (signature, path) = split_signature(raw)?;
    parse_path(signature, path)
}


#[cfg(test)]
mod proptests {
    use super::resolvers::{Dimension, resolve_dimension};
    use super::*;
    use proptest::prelude::*;

    fn axis(flip: bool, size: Option<u32>) -> String {
        let sign = if flip { "-" } else { "" };
        format!("{sign}{}", size.map(|s| s.to_string()).unwrap_or_default())
    }

    fn request_path() -> impl Strategy<Value = String> {
        let trim = prop_oneof![
            Just(String::new()),
            Just("trim/".to_string()),
            (0u8..=255).prop_map(|t| format!("trim:{t}/")),
            Just("trim:bottom-right/".to_string()),
        ];
        let crop = prop_oneof![
            Just(String::new()),
            (0u32..500, 0u32..500, 0u32..500, 0u32..500)
                .prop_map(|(l, t, r, b)| format!("{l}x{t}:{r}x{b}/")),
        ];
        let resize = (
            prop_oneof![Just(""), Just("fit-in/"), Just("stretch/")],
            any::<bool>(),
            1u32..2000,
            any::<bool>(),
            proptest::option::of(1u32..2000),
        )
            .prop_map(|(mode, fw, w, fh, h)| {
                format!("{mode}{}x{}/", axis(fw, Some(w)), axis(fh, h))
            });
        let align = prop_oneof![
            Just(""),
            Just("left/"),
            Just("right/top/"),
            Just("center/bottom/"),
            Just("smart/"),
        ];
        let filters = proptest::collection::vec(
            prop_oneof![
                Just("blur(2)"),
                Just("grayscale()"),
                Just("rotate(90)"),
                Just("fill(FF0)"),
                Just("quality(70)"),
                Just("watermark(a/b.png,10p,repeat,30)"),
            ],
            0..4,
        )
        .prop_map(|calls| {
            if calls.is_empty() {
                String::new()
            } else {
                format!("filters:{}/", calls.join(":"))
            }
        });

        // Image ids whose leading segment looks structural
        let image = prop_oneof![
            Just("photos/a.png"),
            Just("100x100/a.png"),
            Just("-x/a.png"),
            Just("trim/a.png"),
            Just("fit-in/a.png"),
            Just("meta/a.png"),
            Just("left/a.png"),
            Just("filters:grayscale()/a.png"),
        ];

        (trim, crop, resize, align, filters, image).prop_map(
            |(trim, crop, resize, align, filters, image)| {
                // stretch takes no alignment
                let align = if resize.starts_with("stretch/") { "" } else { align };
                format!("unsafe/{trim}{crop}{resize}{align}{filters}{image}")
            },
        )
    }

    proptest! {
        #[test]
        fn prop_dimension_signs_become_flips(
            flip_h in any::<bool>(),
            width in proptest::option::of(0u32..100_000),
            flip_v in any::<bool>(),
            height in proptest::option::of(0u32..100_000),
        ) {
            let segment = format!("{}x{}", axis(flip_h, width), axis(flip_v, height));
            let parsed = resolve_dimension(&segment);
            if width.is_none() && height.is_none() && !flip_h && !flip_v {
                prop_assert!(parsed.is_err());
            } else {
                prop_assert_eq!(parsed.unwrap(), Dimension { width, height, flip_h, flip_v });
            }
        }

        #[test]
        fn prop_canonical_path_round_trips(path in request_path()) {
            // Structural-looking image ids can make the whole path invalid
            // (e.g. `stretch/100x100/left/a.png`); only valid plans must round trip.
            let Ok(plan) = parse_request_path(&path) else {
                return Ok(());
            };
            let canonical = plan.to_string();
            let reparsed = parse_request_path(&canonical);
            prop_assert!(reparsed.is_ok(), "{} -> {}", path, canonical);
            prop_assert_eq!(plan, reparsed.unwrap());
        }
    }
}
