//! TerraTess - multi-resolution Earth models on a triangular tessellation.
//!
//! This library represents three-dimensional scalar/vector Earth models on
//! a multi-level triangular tessellation of a sphere or ellipsoid. Each
//! grid vertex carries a radial profile of model values; point queries
//! locate the enclosing triangle by walking the tessellation and combine
//! barycentric (horizontal) with radial (vertical) interpolation.
//!
//! # High-Level API
//!
//! ```ignore
//! use terratess::io::FileFormat;
//! use terratess::model::Model;
//!
//! let model = Model::load("crust.terratess")?;
//! let mut position = model.position();
//! position.set(43.67, 7.23, 6350.0)?;
//! let vp = position.value(0)?;
//!
//! model.save("copy.terratess", FileFormat::Binary)?;
//! ```

pub mod earth;
pub mod error;
pub mod grid;
pub mod io;
pub mod logging;
pub mod model;
pub mod polygon;
pub mod position;
pub mod profile;

/// Version of the terratess library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
