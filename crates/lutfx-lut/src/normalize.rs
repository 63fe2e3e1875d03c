//! Domain rescaling and backend buffer layout.
//!
//! Raw .cube samples are expressed in the file's `[DOMAIN_MIN, DOMAIN_MAX]`
//! range. Backends expect unit-range tables, and volumetric lookup
//! primitives additionally expect a blue-fastest RGBA buffer rather than
//! the red-fastest order .cube files use.
//!
//! # Layout
//!
//! ```text
//! file:   i = r + g*n + b*n²     (R fastest)
//! buffer: d = r*n² + g*n + b     (B fastest, rows of n texels, slices of n² texels)
//! ```

use rayon::prelude::*;
use tracing::debug;

use crate::cube::{Dimension, RawCube};
use crate::LutResult;

/// Bytes per texel of the volumetric buffer (RGBA f32).
pub const TEXEL_BYTES: u32 = std::mem::size_of::<[f32; 4]>() as u32;

/// Per-channel transfer curves for a table-transfer primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelTables {
    /// Red curve.
    pub red: Vec<f32>,
    /// Green curve.
    pub green: Vec<f32>,
    /// Blue curve.
    pub blue: Vec<f32>,
}

impl ChannelTables {
    /// Entries per curve.
    #[inline]
    pub fn len(&self) -> usize {
        self.red.len()
    }

    /// True if the curves hold no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.red.is_empty()
    }

    /// Curves in R, G, B order.
    pub fn channels(&self) -> [&[f32]; 3] {
        [&self.red, &self.green, &self.blue]
    }
}

/// Strided RGBA buffer for a volumetric lookup primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeBuffer {
    /// Cube edge length.
    pub size: usize,
    /// `size^3` texels, blue fastest, alpha fixed at 1.0.
    pub data: Vec<[f32; 4]>,
}

impl VolumeBuffer {
    /// Texel counts along each axis.
    pub fn extents(&self) -> [u32; 3] {
        [self.size as u32; 3]
    }

    /// Row and slice pitch in bytes.
    pub fn strides(&self) -> [u32; 2] {
        let n = self.size as u32;
        [n * TEXEL_BYTES, n * n * TEXEL_BYTES]
    }

    /// Raw bytes of the buffer, as handed to the backend.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Texel for grid position `(r, g, b)`.
    #[inline]
    pub fn at(&self, r: usize, g: usize, b: usize) -> [f32; 4] {
        let n = self.size;
        self.data[r * n * n + g * n + b]
    }
}

/// Normalized table, ready for a backend compile call.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedLut {
    /// Three unit-range curves.
    OneD(ChannelTables),
    /// Unit-range volume in backend layout.
    ThreeD(VolumeBuffer),
}

impl NormalizedLut {
    /// Dimension of the source table.
    pub fn dimension(&self) -> Dimension {
        match self {
            Self::OneD(_) => Dimension::OneD,
            Self::ThreeD(_) => Dimension::ThreeD,
        }
    }

    /// Grid edge length.
    pub fn size(&self) -> usize {
        match self {
            Self::OneD(t) => t.len(),
            Self::ThreeD(v) => v.size,
        }
    }
}

/// Destination offset of the sample at file index `i` in a cube of edge `n`.
#[inline]
pub fn destination_index(i: usize, n: usize) -> usize {
    let r = i % n;
    let g = (i / n) % n;
    let b = i / (n * n);
    r * n * n + g * n + b
}

/// File index of the sample stored at destination offset `d`.
#[inline]
fn source_index(d: usize, n: usize) -> usize {
    let r = d / (n * n);
    let g = (d / n) % n;
    let b = d % n;
    r + g * n + b * n * n
}

/// Rescales a parsed table to unit range and lays it out for the backend.
///
/// Invariants are rechecked first, so a hand-built `RawCube` with a short
/// sample list or an empty domain fails here instead of indexing out of
/// bounds.
pub fn normalize(cube: &RawCube) -> LutResult<NormalizedLut> {
    cube.validate()?;

    let min = cube.domain_min;
    let range = cube.domain_range();
    let scale = [1.0 / range[0], 1.0 / range[1], 1.0 / range[2]];
    let remap = |rgb: [f32; 3]| -> [f32; 3] {
        [
            (rgb[0] - min[0]) * scale[0],
            (rgb[1] - min[1]) * scale[1],
            (rgb[2] - min[2]) * scale[2],
        ]
    };

    let lut = match cube.dimension {
        Dimension::OneD => {
            let samples = &cube.samples;
            let channel = |ch: usize| -> Vec<f32> {
                samples.par_iter().map(|&rgb| remap(rgb)[ch]).collect()
            };
            NormalizedLut::OneD(ChannelTables {
                red: channel(0),
                green: channel(1),
                blue: channel(2),
            })
        }
        Dimension::ThreeD => {
            let n = cube.size;
            // Gather: every destination texel pulls its own source sample.
            let data = (0..cube.capacity())
                .into_par_iter()
                .map(|d| {
                    let [r, g, b] = remap(cube.samples[source_index(d, n)]);
                    [r, g, b, 1.0]
                })
                .collect();
            NormalizedLut::ThreeD(VolumeBuffer { size: n, data })
        }
    };

    debug!(dimension = ?cube.dimension, size = cube.size, "normalized LUT");
    Ok(lut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LutError;
    use approx::assert_relative_eq;

    fn encoded_cube(n: usize) -> RawCube {
        // Each sample encodes its own file-order grid position.
        let samples = (0..n * n * n)
            .map(|i| [(i % n) as f32, ((i / n) % n) as f32, (i / (n * n)) as f32])
            .collect();
        RawCube {
            dimension: Dimension::ThreeD,
            size: n,
            domain_min: [0.0; 3],
            domain_max: [1.0; 3],
            samples,
        }
    }

    #[test]
    fn unit_domain_is_identity() {
        let mut cube = RawCube::identity(Dimension::OneD, 5);
        cube.samples[2] = [0.25, -0.5, 3.0];

        let NormalizedLut::OneD(tables) = normalize(&cube).unwrap() else {
            panic!("expected 1D tables");
        };
        for (i, rgb) in cube.samples.iter().enumerate() {
            assert_eq!(tables.red[i], rgb[0]);
            assert_eq!(tables.green[i], rgb[1]);
            assert_eq!(tables.blue[i], rgb[2]);
        }
    }

    #[test]
    fn unit_domain_is_identity_3d() {
        let cube = encoded_cube(3);
        let NormalizedLut::ThreeD(volume) = normalize(&cube).unwrap() else {
            panic!("expected 3D volume");
        };
        for (i, rgb) in cube.samples.iter().enumerate() {
            let texel = volume.data[destination_index(i, 3)];
            assert_eq!(&texel[..3], &rgb[..]);
        }
    }

    #[test]
    fn permutation_places_every_sample() {
        for n in [2usize, 3, 5, 8] {
            let cube = encoded_cube(n);
            let NormalizedLut::ThreeD(volume) = normalize(&cube).unwrap() else {
                panic!("expected 3D volume");
            };

            assert_eq!(volume.data.len(), n * n * n);
            for i in 0..n * n * n {
                let r = i % n;
                let g = (i / n) % n;
                let b = i / (n * n);
                let expected = [r as f32, g as f32, b as f32, 1.0];
                assert_eq!(volume.data[r * n * n + g * n + b], expected, "n={n} i={i}");
                assert_eq!(volume.at(r, g, b), expected);
            }
        }
    }

    #[test]
    fn destination_index_is_a_permutation() {
        let n = 6;
        let mut seen = vec![false; n * n * n];
        for i in 0..n * n * n {
            let d = destination_index(i, n);
            assert!(!seen[d], "offset {d} hit twice");
            seen[d] = true;
            assert_eq!(source_index(d, n), i);
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn domain_rescale() {
        let cube = RawCube {
            dimension: Dimension::OneD,
            size: 2,
            domain_min: [-1.0, 0.0, 0.5],
            domain_max: [1.0, 4.0, 1.5],
            samples: vec![[-1.0, 0.0, 0.5], [0.0, 2.0, 1.5]],
        };
        let NormalizedLut::OneD(tables) = normalize(&cube).unwrap() else {
            panic!("expected 1D tables");
        };
        assert_relative_eq!(tables.red[0], 0.0);
        assert_relative_eq!(tables.red[1], 0.5);
        assert_relative_eq!(tables.green[1], 0.5);
        assert_relative_eq!(tables.blue[0], 0.0);
        assert_relative_eq!(tables.blue[1], 1.0);
    }

    #[test]
    fn volume_layout_metadata() {
        let cube = RawCube::identity(Dimension::ThreeD, 4);
        let NormalizedLut::ThreeD(volume) = normalize(&cube).unwrap() else {
            panic!("expected 3D volume");
        };

        assert_eq!(volume.extents(), [4, 4, 4]);
        assert_eq!(volume.strides(), [4 * 16, 16 * 16]);
        assert_eq!(volume.as_bytes().len(), 64 * 16);
        assert!(volume.data.iter().all(|t| t[3] == 1.0));
        // Blue fastest: the second texel steps blue, not red.
        assert_relative_eq!(volume.data[1][2], 1.0 / 3.0);
        assert_relative_eq!(volume.data[1][0], 0.0);
    }

    #[test]
    fn rejects_invalid_raw_cube() {
        let mut cube = RawCube::identity(Dimension::ThreeD, 2);
        cube.samples.pop();
        assert!(matches!(
            normalize(&cube),
            Err(LutError::SampleCountMismatch { expected: 8, found: 7 })
        ));
    }
}
