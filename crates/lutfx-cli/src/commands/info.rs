//! LUT information command

use crate::InfoArgs;
use anyhow::{Context, Result};
use lutfx_lut::cube;
use tracing::debug;

pub fn run(args: InfoArgs) -> Result<()> {
    for path in &args.input {
        debug!(path = %path.display(), "reading LUT");
        let lut = cube::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

        println!("{}", path.display());
        println!("  Dimension: {}D", lut.dimension.rank());
        println!("  Size:      {}", lut.size);
        println!("  Samples:   {}", lut.samples.len());
        println!(
            "  Domain:    [{} {} {}] .. [{} {} {}]",
            lut.domain_min[0],
            lut.domain_min[1],
            lut.domain_min[2],
            lut.domain_max[0],
            lut.domain_max[1],
            lut.domain_max[2]
        );
    }
    Ok(())
}
