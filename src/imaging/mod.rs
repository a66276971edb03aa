//! Pixel work: engine trait, geometry math and the `image`-crate engine.
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension and placement math (unit testable)
//! - **Parameters**: Value types shared by the engine and the filter table
//! - **Backend**: [`PixelEngine`] trait + test mock
//! - **Rust backend**: [`RustEngine`], the production engine

pub mod backend;
pub mod calculations;
pub mod params;
pub mod rust_backend;

pub use backend::{EngineError, PixelEngine};
pub use params::{Axis, Color, FillMode, OutputFormat, Quality, Rect, Rotation};
pub use rust_backend::RustEngine;
