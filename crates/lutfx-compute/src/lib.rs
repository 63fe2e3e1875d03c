//! Compiled LUT cache and effect composition.
//!
//! Turns `.cube` files into device-bound color-transform handles through a
//! [`GraphicsBackend`], caches them per path, and wires them into a
//! cross-fade effect against the untouched source image.
//!
//! # Architecture
//!
//! ```text
//! LutRenderer
//!     +-- LutCache        (path -> Arc<CompiledLut>, one compile per path)
//!     |       +-- CubeReader -> normalize -> GraphicsBackend::compile_*
//!     +-- EffectComposer  (transform stage + cross-fade)
//!             +-- GraphicsBackend::compile_cross_fade
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lutfx_compute::{CpuBackend, CpuBitmap, LutRenderer};
//!
//! let renderer = LutRenderer::new(Arc::new(CpuBackend::new()));
//! let effect = renderer.create_effect("look.cube", 0.75, &bitmap)?;
//! let graded = effect.render();
//! ```

#![warn(missing_docs)]

pub mod backend;
pub mod cache;
pub mod compose;

pub use backend::{CpuBackend, CpuBitmap, CpuEffect, CpuLut, GraphicsBackend, TransformKind, TransformStage};
pub use cache::{CacheConfig, CacheStats, CompiledLut, CubeFileReader, CubeReader, LutCache};
pub use compose::{EffectComposer, LutRenderer};

use lutfx_lut::LutError;
use thiserror::Error;

/// Cache and composition errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputeError {
    /// Reading or normalizing the .cube file failed.
    #[error(transparent)]
    Lut(#[from] LutError),

    /// The backend rejected the compiled data, passed through as reported.
    #[error("backend compile failed: {0}")]
    BackendCompileFailure(String),

    /// Pixel data does not match the declared bitmap dimensions.
    #[error("invalid bitmap: {0}")]
    InvalidBitmap(String),

    /// Transform stage and compiled table disagree on the primitive.
    #[error("unsupported transform: {0}")]
    Unsupported(String),
}

/// Result type for cache and composition operations.
pub type ComputeResult<T> = Result<T, ComputeError>;
