//! # pathimg
//!
//! Image transformations addressed by a compact URL path. The path names the
//! source image and every operation applied to it, so a URL alone fully
//! describes the result:
//!
//! ```text
//! unsafe/trim/10x20:300x400/fit-in/300x200/left/top/filters:blur(2):format(webp)/photos/a.jpg
//! ```
//!
//! # Architecture: Parse, Validate, Render
//!
//! ```text
//! 1. Parse     raw path   →  OperationPlan   (tokenizer → resolvers → builder)
//! 2. Validate  plan       →  Vec<Filter>     (filter dispatch table)
//! 3. Render    plan+bytes →  Rendered        (trim → crop → resize → filters → encode)
//! ```
//!
//! Parsing and validation do no pixel work, so every structural error is
//! reported before the source image is even loaded. Rendering talks to pixels
//! through the [`imaging::PixelEngine`] trait only; the production engine is
//! [`imaging::RustEngine`] and tests use a recording mock.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`path`] | Path grammar: tokenizer, segment resolvers and plan builder |
//! | [`plan`] | The [`plan::OperationPlan`] data model and its canonical form |
//! | [`filters`] | Filter dispatch table: arity, argument coercion, typed filters |
//! | [`pipeline`] | Stage orchestration, cancellation, output format selection |
//! | [`imaging`] | Pixel engine trait, geometry math, `image`-crate engine |
//! | [`loader`] | Source image loading from a directory or memory |
//! | [`config`] | `config.toml` loading, validation and merging |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Classification by Shape
//!
//! Every leading segment is tried against a fixed sequence of structural
//! slots. A segment that *looks* like a dimension is a dimension even when its
//! numbers are bad, so `--100x100/a.png` is an error instead of an image
//! called `--100x100/a.png`. The first segment that matches no slot starts the
//! image identifier, which may itself contain `/`.
//!
//! ## One Validation Gate
//!
//! Resolvers are pure string-to-value functions and check only their own
//! segment. Rules that span segments (fit-in vs stretch, padding needs
//! fit-in) live in [`path::builder`], so a plan that exists is consistent.
//!
//! ## Canonical Paths
//!
//! [`plan::OperationPlan`] renders back to a canonical path, and re-parsing
//! that path yields the same plan. Two spellings of one transformation share
//! a [`plan::OperationPlan::result_key`].

pub mod config;
pub mod filters;
pub mod imaging;
pub mod loader;
pub mod output;
pub mod path;
pub mod pipeline;
pub mod plan;

#[cfg(test)]
pub(crate) mod test_helpers;
