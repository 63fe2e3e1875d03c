//! LUT error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for LUT operations.
pub type LutResult<T> = Result<T, LutError>;

/// Errors that can occur while reading or normalizing a LUT.
///
/// Cloneable so a single failed load can be reported to every caller
/// that was waiting on it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LutError {
    /// The LUT file could not be opened or read.
    #[error("cannot read LUT {path}: {kind}")]
    NotFound {
        /// Path that was requested.
        path: PathBuf,
        /// Underlying I/O failure.
        kind: io::ErrorKind,
    },

    /// No size directive, a size outside bounds, or an unparsable header value.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// Number of data rows differs from the declared capacity.
    #[error("expected {expected} samples, found {found}")]
    SampleCountMismatch {
        /// Declared capacity (`size` or `size^3`).
        expected: usize,
        /// Rows actually accepted.
        found: usize,
    },

    /// Domain range is empty or inverted on a channel.
    #[error("degenerate domain on {channel} channel: [{min}, {max}]")]
    DegenerateDomain {
        /// Channel name (`R`, `G` or `B`).
        channel: char,
        /// Domain minimum.
        min: f32,
        /// Domain maximum.
        max: f32,
    },

    /// Dimension other than 1D or 3D.
    #[error("unsupported LUT dimension: {0}")]
    UnsupportedDimension(u32),
}

impl LutError {
    /// Builds a `NotFound` from an I/O error.
    pub fn not_found(path: impl Into<PathBuf>, err: &io::Error) -> Self {
        Self::NotFound {
            path: path.into(),
            kind: err.kind(),
        }
    }
}
