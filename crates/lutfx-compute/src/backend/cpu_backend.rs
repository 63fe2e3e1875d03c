//! CPU backend using rayon for parallelization.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lutfx_lut::normalize::TEXEL_BYTES;
use lutfx_lut::ChannelTables;
use rayon::prelude::*;
use tracing::{debug, trace};

use super::{GraphicsBackend, TransformKind, TransformStage};
use crate::{ComputeError, ComputeResult};

/// CPU image - RGBA f32 pixels stored in RAM.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuBitmap {
    width: u32,
    height: u32,
    pixels: Arc<[[f32; 4]]>,
}

impl CpuBitmap {
    /// Wrap `width * height` RGBA pixels in row-major order.
    pub fn new(pixels: Vec<[f32; 4]>, width: u32, height: u32) -> ComputeResult<Self> {
        let expected = (width as usize) * (height as usize);
        if pixels.len() != expected {
            return Err(ComputeError::InvalidBitmap(format!(
                "bitmap {width}x{height} needs {expected} pixels, got {}",
                pixels.len()
            )));
        }
        Ok(Self { width, height, pixels: pixels.into() })
    }

    /// Build from 8-bit RGBA bytes.
    pub fn from_rgba8(data: &[u8], width: u32, height: u32) -> ComputeResult<Self> {
        let pixels = data
            .chunks_exact(4)
            .map(|p| [p[0], p[1], p[2], p[3]].map(|v| v as f32 / 255.0))
            .collect();
        Self::new(pixels, width, height)
    }

    /// Convert to 8-bit RGBA bytes, clamping out-of-range values.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|p| p.iter().map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8))
            .collect()
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel data, row-major.
    pub fn pixels(&self) -> &[[f32; 4]] {
        &self.pixels
    }
}

#[derive(Debug)]
enum LutData {
    Table(ChannelTables),
    Volume { size: usize, texels: Vec<[f32; 4]> },
}

/// Compiled LUT held in RAM.
#[derive(Debug, Clone)]
pub struct CpuLut {
    generation: u64,
    data: Arc<LutData>,
}

impl CpuLut {
    /// Primitive this LUT was compiled for.
    pub fn kind(&self) -> TransformKind {
        match *self.data {
            LutData::Table(_) => TransformKind::TableTransfer,
            LutData::Volume { .. } => TransformKind::LookupTable3D,
        }
    }

    /// Device generation the LUT was compiled against.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn apply(&self, rgb: [f32; 3]) -> [f32; 3] {
        match &*self.data {
            LutData::Table(tables) => {
                let [r, g, b] = tables.channels();
                [sample_curve(r, rgb[0]), sample_curve(g, rgb[1]), sample_curve(b, rgb[2])]
            }
            LutData::Volume { size, texels } => sample_volume(texels, *size, rgb),
        }
    }
}

/// Linear interpolation along a transfer curve, input clamped to [0, 1].
fn sample_curve(curve: &[f32], value: f32) -> f32 {
    let last = curve.len() - 1;
    let v = value.clamp(0.0, 1.0) * last as f32;
    let i0 = (v as usize).min(last);
    let i1 = (i0 + 1).min(last);
    let f = v - i0 as f32;
    curve[i0] + f * (curve[i1] - curve[i0])
}

/// Trilinear lookup in a blue-fastest volume.
fn sample_volume(texels: &[[f32; 4]], size: usize, rgb: [f32; 3]) -> [f32; 3] {
    let s = size;
    let scale = (s - 1) as f32;

    let r = rgb[0].clamp(0.0, 1.0) * scale;
    let g = rgb[1].clamp(0.0, 1.0) * scale;
    let b = rgb[2].clamp(0.0, 1.0) * scale;

    let r0 = (r as usize).min(s - 1);
    let g0 = (g as usize).min(s - 1);
    let b0 = (b as usize).min(s - 1);
    let r1 = (r0 + 1).min(s - 1);
    let g1 = (g0 + 1).min(s - 1);
    let b1 = (b0 + 1).min(s - 1);

    let fr = r - r0 as f32;
    let fg = g - g0 as f32;
    let fb = b - b0 as f32;

    let idx = |ri: usize, gi: usize, bi: usize, ch: usize| -> f32 {
        texels[ri * s * s + gi * s + bi][ch]
    };

    let mut out = [0.0f32; 3];
    for (ch, o) in out.iter_mut().enumerate() {
        let c00 = idx(r0, g0, b0, ch) * (1.0 - fr) + idx(r1, g0, b0, ch) * fr;
        let c10 = idx(r0, g1, b0, ch) * (1.0 - fr) + idx(r1, g1, b0, ch) * fr;
        let c01 = idx(r0, g0, b1, ch) * (1.0 - fr) + idx(r1, g0, b1, ch) * fr;
        let c11 = idx(r0, g1, b1, ch) * (1.0 - fr) + idx(r1, g1, b1, ch) * fr;

        let c0 = c00 * (1.0 - fg) + c10 * fg;
        let c1 = c01 * (1.0 - fg) + c11 * fg;
        *o = c0 * (1.0 - fb) + c1 * fb;
    }
    out
}

/// Cross-fade effect ready to render.
#[derive(Debug, Clone)]
pub struct CpuEffect {
    lut: CpuLut,
    input: CpuBitmap,
    original: CpuBitmap,
    weight: f32,
}

impl CpuEffect {
    /// Blend weight (0 = original, 1 = graded).
    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Primitive feeding input 0 of the cross-fade.
    pub fn transform_kind(&self) -> TransformKind {
        self.lut.kind()
    }

    /// Execute the graph: transform input, then cross-fade with the original.
    pub fn render(&self) -> CpuBitmap {
        let w = self.weight;
        let pixels: Vec<[f32; 4]> = self
            .input
            .pixels
            .par_iter()
            .zip(self.original.pixels.par_iter())
            .map(|(src, orig)| {
                let graded = self.lut.apply([src[0], src[1], src[2]]);
                [
                    w * graded[0] + (1.0 - w) * orig[0],
                    w * graded[1] + (1.0 - w) * orig[1],
                    w * graded[2] + (1.0 - w) * orig[2],
                    w * src[3] + (1.0 - w) * orig[3],
                ]
            })
            .collect();

        CpuBitmap {
            width: self.original.width,
            height: self.original.height,
            pixels: pixels.into(),
        }
    }
}

/// Reference backend that executes every primitive on the CPU.
#[derive(Debug, Default)]
pub struct CpuBackend {
    generation: AtomicU64,
}

impl CpuBackend {
    /// Creates a backend on device generation 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate device loss: handles compiled before this call go stale.
    pub fn lose_device(&self) -> u64 {
        let next = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation = next, "cpu device recreated");
        next
    }
}

impl GraphicsBackend for CpuBackend {
    type Lut = CpuLut;
    type Bitmap = CpuBitmap;
    type Effect = CpuEffect;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn device_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn compile_table_transfer(&self, tables: &ChannelTables) -> ComputeResult<CpuLut> {
        let len = tables.len();
        if len < 2 || tables.green.len() != len || tables.blue.len() != len {
            return Err(ComputeError::BackendCompileFailure(format!(
                "table transfer needs equal curves of at least 2 entries, got {}/{}/{}",
                tables.red.len(),
                tables.green.len(),
                tables.blue.len()
            )));
        }

        trace!(entries = len, "compile table transfer");
        Ok(CpuLut {
            generation: self.device_generation(),
            data: Arc::new(LutData::Table(tables.clone())),
        })
    }

    fn compile_volumetric_lookup(
        &self,
        extents: [u32; 3],
        strides: [u32; 2],
        buffer: &[u8],
    ) -> ComputeResult<CpuLut> {
        let [n, n_g, n_b] = extents;
        if n < 2 || n != n_g || n != n_b {
            return Err(ComputeError::BackendCompileFailure(format!(
                "volumetric lookup needs a cube of edge >= 2, got {extents:?}"
            )));
        }

        let size = n as usize;
        let [row, slice] = strides.map(|s| s as usize);
        let texel = TEXEL_BYTES as usize;
        if row < size * texel || slice < size * row {
            return Err(ComputeError::BackendCompileFailure(format!(
                "strides {strides:?} too small for {size}^3 RGBA f32"
            )));
        }

        let required = (size - 1) * slice + (size - 1) * row + size * texel;
        if buffer.len() < required {
            return Err(ComputeError::BackendCompileFailure(format!(
                "buffer holds {} bytes, layout needs {required}",
                buffer.len()
            )));
        }

        let mut texels = Vec::with_capacity(size * size * size);
        for r in 0..size {
            for g in 0..size {
                for b in 0..size {
                    let at = r * slice + g * row + b * texel;
                    texels.push(bytemuck::pod_read_unaligned::<[f32; 4]>(&buffer[at..at + texel]));
                }
            }
        }

        trace!(size, "compile volumetric lookup");
        Ok(CpuLut {
            generation: self.device_generation(),
            data: Arc::new(LutData::Volume { size, texels }),
        })
    }

    fn compile_cross_fade(
        &self,
        graded: TransformStage<'_, Self>,
        original: &CpuBitmap,
        weight: f32,
    ) -> ComputeResult<CpuEffect> {
        if graded.lut.kind() != graded.kind {
            return Err(ComputeError::Unsupported(format!(
                "{:?} stage given a {:?} table",
                graded.kind,
                graded.lut.kind()
            )));
        }

        let current = self.device_generation();
        if graded.lut.generation != current {
            return Err(ComputeError::BackendCompileFailure(format!(
                "LUT compiled for device generation {}, current is {current}",
                graded.lut.generation
            )));
        }

        let input = graded.input;
        if (input.width, input.height) != (original.width, original.height) {
            return Err(ComputeError::InvalidBitmap(format!(
                "cross-fade inputs differ in size: {}x{} vs {}x{}",
                input.width, input.height, original.width, original.height
            )));
        }

        Ok(CpuEffect {
            lut: graded.lut.clone(),
            input: input.clone(),
            original: original.clone(),
            weight,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use lutfx_lut::{normalize, Dimension, NormalizedLut, RawCube};

    fn volume_lut(backend: &CpuBackend, cube: &RawCube) -> CpuLut {
        let NormalizedLut::ThreeD(volume) = normalize(cube).unwrap() else {
            panic!("expected 3D volume");
        };
        backend
            .compile_volumetric_lookup(volume.extents(), volume.strides(), volume.as_bytes())
            .unwrap()
    }

    #[test]
    fn identity_volume_round_trips_colors() {
        let backend = CpuBackend::new();
        let lut = volume_lut(&backend, &RawCube::identity(Dimension::ThreeD, 5));

        let out = lut.apply([0.3, 0.6, 0.9]);
        assert_relative_eq!(out[0], 0.3, epsilon = 1e-5);
        assert_relative_eq!(out[1], 0.6, epsilon = 1e-5);
        assert_relative_eq!(out[2], 0.9, epsilon = 1e-5);
    }

    #[test]
    fn volume_axes_are_not_swapped() {
        // Cube that outputs only the red input in every channel.
        let mut cube = RawCube::identity(Dimension::ThreeD, 2);
        for s in cube.samples.iter_mut() {
            *s = [s[0], s[0], s[0]];
        }
        let backend = CpuBackend::new();
        let lut = volume_lut(&backend, &cube);

        assert_eq!(lut.apply([1.0, 0.0, 0.0]), [1.0, 1.0, 1.0]);
        assert_eq!(lut.apply([0.0, 0.0, 1.0]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn curve_interpolates_linearly() {
        assert_relative_eq!(sample_curve(&[0.0, 1.0], 0.25), 0.25);
        assert_relative_eq!(sample_curve(&[0.0, 0.5, 0.6], 0.75), 0.55, epsilon = 1e-6);
        assert_relative_eq!(sample_curve(&[0.2, 0.4], -3.0), 0.2);
        assert_relative_eq!(sample_curve(&[0.2, 0.4], 3.0), 0.4);
    }

    #[test]
    fn rejects_short_buffer() {
        let backend = CpuBackend::new();
        let err = backend
            .compile_volumetric_lookup([2, 2, 2], [32, 64], &[0u8; 64])
            .unwrap_err();
        assert!(matches!(err, ComputeError::BackendCompileFailure(_)));
    }

    #[test]
    fn rejects_mismatched_curves() {
        let backend = CpuBackend::new();
        let tables = ChannelTables {
            red: vec![0.0, 1.0],
            green: vec![0.0, 1.0],
            blue: vec![0.0],
        };
        assert!(backend.compile_table_transfer(&tables).is_err());
    }

    #[test]
    fn stage_kind_must_match_table() {
        let backend = CpuBackend::new();
        let tables = ChannelTables {
            red: vec![0.0, 1.0],
            green: vec![0.0, 1.0],
            blue: vec![0.0, 1.0],
        };
        let lut = backend.compile_table_transfer(&tables).unwrap();
        let bitmap = CpuBitmap::new(vec![[0.5; 4]], 1, 1).unwrap();
        let stage = TransformStage {
            kind: TransformKind::LookupTable3D,
            lut: &lut,
            input: &bitmap,
        };
        assert!(matches!(
            backend.compile_cross_fade(stage, &bitmap, 1.0),
            Err(ComputeError::Unsupported(_))
        ));
    }

    #[test]
    fn stale_lut_is_rejected_after_device_loss() {
        let backend = CpuBackend::new();
        let lut = volume_lut(&backend, &RawCube::identity(Dimension::ThreeD, 2));
        backend.lose_device();

        let bitmap = CpuBitmap::new(vec![[0.5; 4]], 1, 1).unwrap();
        let stage = TransformStage {
            kind: TransformKind::LookupTable3D,
            lut: &lut,
            input: &bitmap,
        };
        assert!(backend.compile_cross_fade(stage, &bitmap, 1.0).is_err());
    }

    #[test]
    fn rgba8_conversion() {
        let bitmap = CpuBitmap::from_rgba8(&[0, 128, 255, 255], 1, 1).unwrap();
        assert_relative_eq!(bitmap.pixels()[0][1], 128.0 / 255.0);
        assert_eq!(bitmap.to_rgba8(), vec![0, 128, 255, 255]);
        assert!(matches!(
            CpuBitmap::from_rgba8(&[0; 4], 2, 1),
            Err(ComputeError::InvalidBitmap(_))
        ));
    }

    #[test]
    fn cross_fade_rejects_mismatched_bitmaps() {
        let backend = CpuBackend::new();
        let lut = volume_lut(&backend, &RawCube::identity(Dimension::ThreeD, 2));
        let input = CpuBitmap::new(vec![[0.5; 4]; 2], 2, 1).unwrap();
        let original = CpuBitmap::new(vec![[0.5; 4]; 2], 1, 2).unwrap();
        let stage = TransformStage {
            kind: TransformKind::LookupTable3D,
            lut: &lut,
            input: &input,
        };
        assert!(matches!(
            backend.compile_cross_fade(stage, &original, 1.0),
            Err(ComputeError::InvalidBitmap(_))
        ));
    }
}
