//! Graphics backend collaborator.
//!
//! The backend owns the device, compiles LUT data into device-bound
//! primitives, and builds the cross-fade effect graph. This crate only
//! parameterizes those primitives and never inspects the handles.
//!
//! # Architecture
//!
//! ```text
//! GraphicsBackend
//!     +-- CpuBackend  (rayon reference implementation)
//!     +-- <GPU backends live outside this crate>
//! ```

mod cpu_backend;

pub use cpu_backend::{CpuBackend, CpuBitmap, CpuEffect, CpuLut};

use lutfx_lut::{ChannelTables, Dimension};

use crate::ComputeResult;

/// Dimension-specific color transform primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    /// Per-channel 1D table transfer.
    TableTransfer,
    /// Volumetric 3D lookup.
    LookupTable3D,
}

impl TransformKind {
    /// Primitive that applies a table of the given dimension.
    pub fn for_dimension(dimension: Dimension) -> Self {
        match dimension {
            Dimension::OneD => Self::TableTransfer,
            Dimension::ThreeD => Self::LookupTable3D,
        }
    }
}

/// A compiled LUT primitive with the source bitmap bound as its input.
pub struct TransformStage<'a, B: GraphicsBackend + ?Sized> {
    /// Which primitive the handle belongs to.
    pub kind: TransformKind,
    /// Compiled table.
    pub lut: &'a B::Lut,
    /// Bitmap fed into the primitive.
    pub input: &'a B::Bitmap,
}

/// Operations the core needs from a graphics backend.
///
/// Handles returned by the `compile_*` calls are bound to the device that
/// was current when they were compiled. [`device_generation`] must change
/// whenever that device is recreated.
///
/// [`device_generation`]: GraphicsBackend::device_generation
pub trait GraphicsBackend: Send + Sync {
    /// Compiled LUT primitive.
    type Lut: Send + Sync;
    /// Source image type.
    type Bitmap;
    /// Executable effect graph.
    type Effect;

    /// Backend name.
    fn name(&self) -> &'static str;

    /// Version stamp of the current device.
    fn device_generation(&self) -> u64;

    /// Compile three per-channel transfer curves.
    fn compile_table_transfer(&self, tables: &ChannelTables) -> ComputeResult<Self::Lut>;

    /// Compile a strided RGBA f32 volume.
    ///
    /// `strides` are the row and slice pitch in bytes.
    fn compile_volumetric_lookup(
        &self,
        extents: [u32; 3],
        strides: [u32; 2],
        buffer: &[u8],
    ) -> ComputeResult<Self::Lut>;

    /// Cross-fade the graded stage (input 0) with the original (input 1).
    ///
    /// `weight` 0 yields the original, 1 the graded image. Values outside
    /// `[0, 1]` are passed through as given.
    fn compile_cross_fade(
        &self,
        graded: TransformStage<'_, Self>,
        original: &Self::Bitmap,
        weight: f32,
    ) -> ComputeResult<Self::Effect>;
}
