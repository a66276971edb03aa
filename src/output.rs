//! CLI output formatting.
//!
//! # Plan Display
//!
//! `parse` prints the plan as an indented tree, canonical path first, so a
//! user can see how each segment of their path was read:
//!
//! ```text
//! unsafe/trim/fit-in/300x200/left/filters:grayscale()/gopher.png
//!     Image: gopher.png
//!     Trim: default corner, tolerance 1
//!     Resize: fit-in 300x200
//!         Align: left
//!     Filters
//!         001 grayscale()
//!     Key: 5d41402a...
//! ```
//!
//! `render` and `batch` print one line per result:
//!
//! ```text
//! gopher.png → out.png (image/png, 300x200, 18213 bytes)
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>` or `String`)
//! for testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::pipeline::Rendered;
use crate::plan::{HAlign, OperationPlan, ResizeSpec, Signature, TrimAnchor, VAlign};
use std::path::Path;

fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn dimension(value: Option<u32>) -> String {
    value
        .filter(|&v| v > 0)
        .map(|v| v.to_string())
        .unwrap_or_else(|| "auto".into())
}

fn resize_lines(resize: &ResizeSpec) -> Vec<String> {
    let mut lines = Vec::new();
    let mode = if resize.fit_in {
        "fit-in "
    } else if resize.stretch {
        "stretch "
    } else {
        ""
    };
    if resize.has_dimension() {
        lines.push(format!(
            "{}Resize: {mode}{}x{}",
            indent(1),
            dimension(resize.width),
            dimension(resize.height)
        ));
    }

    let h = resize.h_align.map(|a| match a {
        HAlign::Left => "left",
        HAlign::Right => "right",
        HAlign::Center => "center",
    });
    let v = resize.v_align.map(|a| match a {
        VAlign::Top => "top",
        VAlign::Bottom => "bottom",
        VAlign::Center => "middle",
    });
    let align: Vec<&str> = [h, v, resize.smart.then_some("smart")]
        .into_iter()
        .flatten()
        .collect();
    if !align.is_empty() {
        lines.push(format!("{}Align: {}", indent(2), align.join("/")));
    }

    let flips: Vec<&str> = [
        resize.flip_h.then_some("horizontal"),
        resize.flip_v.then_some("vertical"),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !flips.is_empty() {
        lines.push(format!("{}Flip: {}", indent(2), flips.join(", ")));
    }

    if let Some(p) = resize.padding {
        lines.push(format!(
            "{}Padding: {}x{}:{}x{}",
            indent(2),
            p.left,
            p.top,
            p.right,
            p.bottom
        ));
    }
    lines
}

/// Format a parsed plan as an indented tree.
pub fn format_plan(plan: &OperationPlan) -> Vec<String> {
    let mut lines = vec![plan.to_string()];
    lines.push(format!("{}Image: {}", indent(1), plan.image));

    if let Signature::Signed(hash) = &plan.signature {
        lines.push(format!("{}Signature: {hash}", indent(1)));
    }
    if plan.meta {
        lines.push(format!("{}Meta: JSON output", indent(1)));
    }
    if plan.trim.enabled {
        let corner = match plan.trim.anchor {
            TrimAnchor::TopLeft => "top-left",
            TrimAnchor::BottomRight => "bottom-right",
            TrimAnchor::Default => "default corner",
        };
        lines.push(format!(
            "{}Trim: {corner}, tolerance {}",
            indent(1),
            plan.trim.effective_tolerance()
        ));
    }
    if let Some(c) = plan.crop {
        lines.push(format!(
            "{}Crop: {}x{}:{}x{}",
            indent(1),
            c.left,
            c.top,
            c.right,
            c.bottom
        ));
    }
    lines.extend(resize_lines(&plan.resize));

    if !plan.filters.is_empty() {
        lines.push(format!("{}Filters", indent(1)));
        for (i, call) in plan.filters.iter().enumerate() {
            lines.push(format!("{}{} {call}", indent(2), format_index(i + 1)));
        }
    }
    lines.push(format!("{}Key: {}", indent(1), plan.result_key()));
    lines
}

pub fn print_plan(plan: &OperationPlan) {
    for line in format_plan(plan) {
        println!("{}", line);
    }
}

/// One summary line for a finished render.
pub fn format_rendered(image: &str, destination: &Path, rendered: &Rendered) -> String {
    format!(
        "{image} → {} ({}, {}x{}, {} bytes)",
        destination.display(),
        rendered.content_type,
        rendered.width,
        rendered.height,
        rendered.bytes.len()
    )
}

pub fn print_rendered(image: &str, destination: &Path, rendered: &Rendered) {
    println!("{}", format_rendered(image, destination, rendered));
}

/// Closing line of a batch run.
pub fn format_batch_summary(ok: usize, failed: usize) -> String {
    let noun = if ok == 1 { "image" } else { "images" };
    if failed == 0 {
        format!("Rendered {ok} {noun}")
    } else {
        format!("Rendered {ok} {noun}, {failed} failed")
    }
}
