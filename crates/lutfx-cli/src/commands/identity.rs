//! Identity LUT generation command

use crate::{DimensionArg, IdentityArgs};
use anyhow::{bail, Context, Result};
use lutfx_lut::cube::{self, MIN_SIZE};
use lutfx_lut::{Dimension, RawCube};
use tracing::info;

pub fn run(args: IdentityArgs) -> Result<()> {
    let dimension = match args.dimension {
        DimensionArg::One => Dimension::OneD,
        DimensionArg::Three => Dimension::ThreeD,
    };

    if args.size < MIN_SIZE || args.size > dimension.max_size() {
        bail!(
            "Size {} out of range for a {}D LUT (expected {}..={})",
            args.size,
            dimension.rank(),
            MIN_SIZE,
            dimension.max_size()
        );
    }

    let lut = RawCube::identity(dimension, args.size);
    cube::write(&args.output, &lut)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    info!(
        output = %args.output.display(),
        size = args.size,
        samples = lut.samples.len(),
        "wrote identity LUT"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_readable_identity() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("id.cube");
        run(IdentityArgs {
            output: output.clone(),
            dimension: DimensionArg::Three,
            size: 5,
        })
        .unwrap();

        let lut = cube::read(&output).unwrap();
        assert_eq!(lut, RawCube::identity(Dimension::ThreeD, 5));
    }

    #[test]
    fn rejects_out_of_range_size() {
        let dir = tempfile::tempdir().unwrap();
        let args = |size| IdentityArgs {
            output: dir.path().join("bad.cube"),
            dimension: DimensionArg::Three,
            size,
        };

        assert!(run(args(1)).is_err());
        assert!(run(args(257)).is_err());
        assert!(!dir.path().join("bad.cube").exists());
    }
}
