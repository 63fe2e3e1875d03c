//! Adobe/Resolve .cube LUT format support.
//!
//! The .cube format is a simple text-based LUT format widely supported
//! by DaVinci Resolve, Adobe applications, and many other tools.
//!
//! # Format
//!
//! ```text
//! # Comment
//! TITLE "LUT Name"
//! LUT_3D_SIZE 33
//! DOMAIN_MIN 0.0 0.0 0.0
//! DOMAIN_MAX 1.0 1.0 1.0
//! 0.0 0.0 0.0
//! ...
//! 1.0 1.0 1.0
//! ```
//!
//! # Parsing rules
//!
//! Reading happens in two passes over the source. The first pass looks for
//! the first `LUT_1D_SIZE` or `LUT_3D_SIZE` directive and stops there; only
//! that one is honored. The second pass starts again from the top, applies
//! `DOMAIN_MIN` / `DOMAIN_MAX`, and collects every line whose first three
//! tokens are floats as a sample row. Anything else (`TITLE`, a second size
//! directive, vendor metadata) is skipped silently, but the row count must
//! then match the declared capacity exactly.
//!
//! # Example
//!
//! ```rust,ignore
//! use lutfx_lut::cube;
//!
//! let cube = cube::read("grade.cube")?;
//! assert_eq!(cube.samples.len(), cube.capacity());
//! ```

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Cursor, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, trace};

use crate::{LutError, LutResult};

/// Smallest accepted grid edge length.
pub const MIN_SIZE: usize = 2;

/// Largest accepted 1D table length.
pub const MAX_SIZE_1D: usize = 65536;

/// Largest accepted 3D cube edge length.
pub const MAX_SIZE_3D: usize = 256;

/// Minimum per-channel `DOMAIN_MAX - DOMAIN_MIN`.
pub const DOMAIN_EPSILON: f32 = 1.0e-4;

/// Table dimensionality declared by the size directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    /// Three independent per-channel curves (`LUT_1D_SIZE`).
    OneD,
    /// Volumetric RGB cube (`LUT_3D_SIZE`).
    ThreeD,
}

impl Dimension {
    /// Maps a numeric rank (1 or 3) to a dimension.
    pub fn from_rank(rank: u32) -> LutResult<Self> {
        match rank {
            1 => Ok(Self::OneD),
            3 => Ok(Self::ThreeD),
            other => Err(LutError::UnsupportedDimension(other)),
        }
    }

    /// Numeric rank (1 or 3).
    pub fn rank(self) -> u32 {
        match self {
            Self::OneD => 1,
            Self::ThreeD => 3,
        }
    }

    /// Size directive keyword.
    pub fn directive(self) -> &'static str {
        match self {
            Self::OneD => "LUT_1D_SIZE",
            Self::ThreeD => "LUT_3D_SIZE",
        }
    }

    /// Largest accepted size for this dimension.
    pub fn max_size(self) -> usize {
        match self {
            Self::OneD => MAX_SIZE_1D,
            Self::ThreeD => MAX_SIZE_3D,
        }
    }

    /// Number of samples a table of edge length `size` holds.
    #[inline]
    pub fn capacity(self, size: usize) -> usize {
        match self {
            Self::OneD => size,
            Self::ThreeD => size * size * size,
        }
    }
}

/// A parsed, validated .cube table in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCube {
    /// 1D curves or 3D cube.
    pub dimension: Dimension,
    /// Grid edge length.
    pub size: usize,
    /// Input domain minimum (per channel)
    pub domain_min: [f32; 3],
    /// Input domain maximum (per channel)
    pub domain_max: [f32; 3],
    /// Samples in declaration order, R varying fastest for 3D tables.
    pub samples: Vec<[f32; 3]>,
}

impl RawCube {
    /// Creates an identity table.
    ///
    /// Samples are generated in file order (R fastest, then G, then B).
    ///
    /// # Panics
    ///
    /// Panics if `size` is below [`MIN_SIZE`].
    pub fn identity(dimension: Dimension, size: usize) -> Self {
        assert!(size >= MIN_SIZE, "identity LUT size {size} is below {MIN_SIZE}");
        let step = |i: usize| i as f32 / (size - 1) as f32;
        let samples = match dimension {
            Dimension::OneD => (0..size).map(|i| [step(i); 3]).collect(),
            Dimension::ThreeD => {
                let mut data = Vec::with_capacity(dimension.capacity(size));
                for b in 0..size {
                    for g in 0..size {
                        for r in 0..size {
                            data.push([step(r), step(g), step(b)]);
                        }
                    }
                }
                data
            }
        };

        Self {
            dimension,
            size,
            domain_min: [0.0; 3],
            domain_max: [1.0; 3],
            samples,
        }
    }

    /// Declared sample count (`size` or `size^3`).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.dimension.capacity(self.size)
    }

    /// Per-channel `domain_max - domain_min`.
    pub fn domain_range(&self) -> [f32; 3] {
        [
            self.domain_max[0] - self.domain_min[0],
            self.domain_max[1] - self.domain_min[1],
            self.domain_max[2] - self.domain_min[2],
        ]
    }

    /// Checks the sample count and domain invariants.
    pub fn validate(&self) -> LutResult<()> {
        if self.size < MIN_SIZE || self.size > self.dimension.max_size() {
            return Err(LutError::MalformedHeader(format!(
                "{} {} outside [{}, {}]",
                self.dimension.directive(),
                self.size,
                MIN_SIZE,
                self.dimension.max_size()
            )));
        }

        if self.samples.len() != self.capacity() {
            return Err(LutError::SampleCountMismatch {
                expected: self.capacity(),
                found: self.samples.len(),
            });
        }

        let range = self.domain_range();
        for (ch, name) in ['R', 'G', 'B'].into_iter().enumerate() {
            // Written as a negated comparison so NaN ranges are rejected too.
            if !(range[ch] > DOMAIN_EPSILON) {
                return Err(LutError::DegenerateDomain {
                    channel: name,
                    min: self.domain_min[ch],
                    max: self.domain_max[ch],
                });
            }
        }

        Ok(())
    }
}

/// Reads and validates a .cube file.
pub fn read<P: AsRef<Path>>(path: P) -> LutResult<RawCube> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| LutError::not_found(path, &e))?;
    parse_source(BufReader::new(file), path)
}

/// Parses a .cube table from a seekable reader.
pub fn parse<R: BufRead + Seek>(reader: R) -> LutResult<RawCube> {
    parse_source(reader, Path::new("<reader>"))
}

/// Parses a .cube table held in memory.
pub fn parse_str(text: &str) -> LutResult<RawCube> {
    parse(Cursor::new(text.as_bytes()))
}

fn parse_source<R: BufRead + Seek>(mut reader: R, origin: &Path) -> LutResult<RawCube> {
    let io_err = |e: io::Error| LutError::not_found(origin, &e);

    let (dimension, size) = scan_size(&mut reader, origin)?;
    let capacity = dimension.capacity(size);
    debug!(path = %origin.display(), ?dimension, size, "cube header");

    reader.seek(SeekFrom::Start(0)).map_err(io_err)?;

    let mut domain_min = [0.0_f32; 3];
    let mut domain_max = [1.0_f32; 3];
    let mut samples: Vec<[f32; 3]> = Vec::with_capacity(capacity);
    // Rows past capacity are only counted, never stored.
    let mut found = 0usize;

    for line in reader.split(b'\n') {
        let line = line.map_err(io_err)?;
        let line = String::from_utf8_lossy(&line);
        let mut tokens = line.split_whitespace();

        let Some(first) = tokens.next() else {
            continue;
        };
        if first.starts_with('#') {
            continue;
        }

        match first {
            "DOMAIN_MIN" => domain_min = parse_triple(tokens, "DOMAIN_MIN")?,
            "DOMAIN_MAX" => domain_max = parse_triple(tokens, "DOMAIN_MAX")?,
            _ => {
                if let Some(rgb) = parse_row(first, tokens) {
                    if found < capacity {
                        samples.push(rgb);
                    }
                    found += 1;
                } else {
                    trace!(line = %line.trim(), "skipping non-sample line");
                }
            }
        }
    }

    if found != capacity {
        return Err(LutError::SampleCountMismatch {
            expected: capacity,
            found,
        });
    }

    let cube = RawCube {
        dimension,
        size,
        domain_min,
        domain_max,
        samples,
    };
    cube.validate()?;

    debug!(samples = found, ?domain_min, ?domain_max, "cube parsed");
    Ok(cube)
}

/// First pass: locate the first size directive.
fn scan_size<R: BufRead>(reader: &mut R, origin: &Path) -> LutResult<(Dimension, usize)> {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| LutError::not_found(origin, &e))?;
        if read == 0 {
            break;
        }

        let line = String::from_utf8_lossy(&buf);
        let mut tokens = line.split_whitespace();
        let dimension = match tokens.next() {
            Some("LUT_1D_SIZE") => Dimension::OneD,
            Some("LUT_3D_SIZE") => Dimension::ThreeD,
            _ => continue,
        };

        let size: usize = tokens
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| {
                LutError::MalformedHeader(format!("invalid {} value", dimension.directive()))
            })?;

        if !(MIN_SIZE..=dimension.max_size()).contains(&size) {
            return Err(LutError::MalformedHeader(format!(
                "{} {} outside [{}, {}]",
                dimension.directive(),
                size,
                MIN_SIZE,
                dimension.max_size()
            )));
        }

        return Ok((dimension, size));
    }

    Err(LutError::MalformedHeader(
        "missing LUT_1D_SIZE or LUT_3D_SIZE".into(),
    ))
}

/// Parses a float token in full, no trailing garbage and no leading `+`.
#[inline]
fn parse_float(token: &str) -> Option<f32> {
    if token.starts_with('+') {
        return None;
    }
    token.parse().ok()
}

/// Accepts a sample row: three leading float tokens, extra tokens ignored.
fn parse_row<'a>(first: &str, mut rest: impl Iterator<Item = &'a str>) -> Option<[f32; 3]> {
    let r = parse_float(first)?;
    let g = parse_float(rest.next()?)?;
    let b = parse_float(rest.next()?)?;
    Some([r, g, b])
}

fn parse_triple<'a>(
    mut tokens: impl Iterator<Item = &'a str>,
    keyword: &str,
) -> LutResult<[f32; 3]> {
    let mut out = [0.0_f32; 3];
    for v in out.iter_mut() {
        *v = tokens
            .next()
            .and_then(parse_float)
            .ok_or_else(|| LutError::MalformedHeader(format!("invalid {keyword} line")))?;
    }
    Ok(out)
}

/// Writes a table to a .cube file.
///
/// # Example
///
/// ```rust,ignore
/// let cube = RawCube::identity(Dimension::ThreeD, 33);
/// cube::write("identity.cube", &cube)?;
/// ```
pub fn write<P: AsRef<Path>>(path: P, cube: &RawCube) -> LutResult<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| LutError::not_found(path, &e))?;
    let mut writer = BufWriter::new(file);
    write_to(&mut writer, cube)
        .and_then(|_| writer.flush())
        .map_err(|e| LutError::not_found(path, &e))
}

/// Writes a table as .cube text, samples in file order.
pub fn write_to<W: Write>(writer: &mut W, cube: &RawCube) -> io::Result<()> {
    writeln!(writer, "# Generated by lutfx")?;
    writeln!(writer, "{} {}", cube.dimension.directive(), cube.size)?;

    let min = cube.domain_min;
    let max = cube.domain_max;
    if min != [0.0; 3] || max != [1.0; 3] {
        writeln!(writer, "DOMAIN_MIN {} {} {}", min[0], min[1], min[2])?;
        writeln!(writer, "DOMAIN_MAX {} {} {}", max[0], max[1], max[2])?;
    }
    writeln!(writer)?;

    for rgb in &cube.samples {
        writeln!(writer, "{:.6} {:.6} {:.6}", rgb[0], rgb[1], rgb[2])?;
    }

    Ok(())
}
