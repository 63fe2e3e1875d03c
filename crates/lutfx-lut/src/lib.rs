//! # lutfx-lut
//!
//! Reading `.cube` color lookup tables and preparing them for a GPU
//! color-transform primitive.
//!
//! # Pipeline
//!
//! ```text
//! .cube text --cube::read--> RawCube --normalize--> NormalizedLut
//!                            (file order,           (unit range,
//!                             file domain)           backend layout)
//! ```
//!
//! - [`RawCube`] - validated table exactly as declared in the file
//! - [`NormalizedLut`] - per-channel curves (1D) or a strided RGBA volume (3D)
//!
//! # Usage
//!
//! ```rust
//! use lutfx_lut::{cube, normalize, NormalizedLut};
//!
//! let raw = cube::parse_str("LUT_1D_SIZE 2\n0 0 0\n1 1 1\n").unwrap();
//! let NormalizedLut::OneD(tables) = normalize(&raw).unwrap() else { unreachable!() };
//! assert_eq!(tables.red, vec![0.0, 1.0]);
//! ```
//!
//! # Dependencies
//!
//! - [`rayon`] - Parallel sample remapping
//! - [`bytemuck`] - Byte view of the volume buffer
//! - [`thiserror`] - Error handling
//!
//! # Used By
//!
//! - `lutfx-compute` - Compiled LUT cache and effect composition

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod error;
pub mod cube;
pub mod normalize;

pub use cube::{Dimension, RawCube};
pub use error::{LutError, LutResult};
pub use normalize::{normalize, ChannelTables, NormalizedLut, VolumeBuffer};
