//! The operation plan and its parts.
//!
//! An [`OperationPlan`] is the fully resolved description of one request,
//! produced by [`path::parse_request_path`](crate::path::parse_request_path)
//! and consumed by the [`pipeline`](crate::pipeline). Plans are immutable
//! values: the pipeline borrows one for the duration of a single render and
//! nothing is shared between requests.
//!
//! `Display` renders the canonical path form. Re-parsing it yields an equal
//! plan, which is what [`OperationPlan::result_key`] relies on.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// Tolerance used by `trim` when the segment carries no explicit value.
pub const DEFAULT_TRIM_TOLERANCE: u8 = 1;

/// Path prefix that either opts out of signing or carries the signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signature {
    Unsafe,
    Signed(String),
}

/// Which corner is sampled as the background reference for trimming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrimAnchor {
    TopLeft,
    BottomRight,
    #[default]
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TrimSpec {
    pub enabled: bool,
    pub anchor: TrimAnchor,
    pub tolerance: Option<u8>,
}

impl TrimSpec {
    pub fn effective_tolerance(&self) -> u8 {
        self.tolerance.unwrap_or(DEFAULT_TRIM_TOLERANCE)
    }
}

/// Crop rectangle as `left x top : right x bottom`.
///
/// Signed so out-of-range rectangles can be represented and clamped later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Inset added around a fit-in canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Padding {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HAlign {
    Left,
    Right,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VAlign {
    Top,
    Bottom,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ResizeSpec {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub flip_h: bool,
    pub flip_v: bool,
    pub fit_in: bool,
    pub stretch: bool,
    pub h_align: Option<HAlign>,
    pub v_align: Option<VAlign>,
    pub smart: bool,
    pub padding: Option<Padding>,
}

impl ResizeSpec {
    /// True when at least one axis has a non-zero size.
    pub fn has_dimension(&self) -> bool {
        self.width.is_some_and(|w| w > 0) || self.height.is_some_and(|h| h > 0)
    }

    pub fn has_alignment(&self) -> bool {
        self.h_align.is_some() || self.v_align.is_some()
    }
}

/// One `name(arg,...)` entry of the `filters:` segment, arguments uninterpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<String>,
}

impl FilterCall {
    pub fn new(name: impl Into<String>, args: &[&str]) -> Self {
        Self {
            name: name.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl fmt::Display for FilterCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.args.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationPlan {
    pub signature: Signature,
    /// Return JSON metadata instead of image bytes.
    pub meta: bool,
    pub trim: TrimSpec,
    pub crop: Option<CropRect>,
    pub resize: ResizeSpec,
    pub filters: Vec<FilterCall>,
    pub image: String,
}

impl OperationPlan {
    /// Plan that loads `image` and re-encodes it unchanged.
    pub fn for_image(image: impl Into<String>) -> Self {
        Self {
            signature: Signature::Unsafe,
            meta: false,
            trim: TrimSpec::default(),
            crop: None,
            resize: ResizeSpec::default(),
            filters: Vec::new(),
            image: image.into(),
        }
    }

    /// Canonical path without the signature prefix.
    ///
    /// This is the string a signature is computed over.
    pub fn operations_path(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        if self.meta {
            parts.push("meta".into());
        }
        if self.trim.enabled {
            let qualifier = match (self.trim.anchor, self.trim.tolerance) {
                (TrimAnchor::TopLeft, _) => ":top-left".to_string(),
                (TrimAnchor::BottomRight, _) => ":bottom-right".to_string(),
                (TrimAnchor::Default, Some(t)) => format!(":{t}"),
                (TrimAnchor::Default, None) => String::new(),
            };
            parts.push(format!("trim{qualifier}"));
        }
        if let Some(c) = self.crop {
            parts.push(format!("{}x{}:{}x{}", c.left, c.top, c.right, c.bottom));
        }

        let r = &self.resize;
        if r.fit_in {
            parts.push("fit-in".into());
        }
        if r.stretch {
            parts.push("stretch".into());
        }
        if r.width.is_some() || r.height.is_some() || r.flip_h || r.flip_v {
            let axis = |flip: bool, size: Option<u32>| {
                format!(
                    "{}{}",
                    if flip { "-" } else { "" },
                    size.map(|s| s.to_string()).unwrap_or_default()
                )
            };
            parts.push(format!("{}x{}", axis(r.flip_h, r.width), axis(r.flip_v, r.height)));
        }
        if let Some(p) = r.padding {
            parts.push(format!("{}x{}:{}x{}", p.left, p.top, p.right, p.bottom));
        }
        match r.h_align {
            Some(HAlign::Left) => parts.push("left".into()),
            Some(HAlign::Right) => parts.push("right".into()),
            Some(HAlign::Center) => parts.push("center".into()),
            None => {}
        }
        match r.v_align {
            Some(VAlign::Top) => parts.push("top".into()),
            Some(VAlign::Bottom) => parts.push("bottom".into()),
            Some(VAlign::Center) => parts.push("middle".into()),
            None => {}
        }
        if r.smart {
            parts.push("smart".into());
        }
        if !self.filters.is_empty() {
            let calls: Vec<String> = self.filters.iter().map(|c| c.to_string()).collect();
            parts.push(format!("filters:{}", calls.join(":")));
        }
        parts.push(self.image.clone());
        parts.join("/")
    }

    /// Stable storage key: SHA-256 of the canonical path.
    pub fn result_key(&self) -> String {
        let digest = Sha256::digest(self.to_string().as_bytes());
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for OperationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.signature {
            Signature::Unsafe => write!(f, "unsafe/")?,
            Signature::Signed(hash) => write!(f, "{hash}/")?,
        }
        f.write_str(&self.operations_path())
    }
}
