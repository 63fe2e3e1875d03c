//! LUT application command

use crate::ApplyArgs;
use anyhow::{Context, Result};
use lutfx_compute::{CpuBackend, LutRenderer};
use std::sync::Arc;
use tracing::info;

pub fn run(args: ApplyArgs) -> Result<()> {
    let bitmap = super::load_png(&args.input)?;
    info!(
        lut = %args.lut.display(),
        input = %args.input.display(),
        mix = args.mix,
        "applying LUT"
    );

    let renderer = LutRenderer::new(Arc::new(CpuBackend::new()));
    let effect = renderer
        .create_effect(&args.lut, args.mix, &bitmap)
        .with_context(|| format!("Failed to load LUT {}", args.lut.display()))?;
    let graded = effect.render();

    super::save_png(&args.output, &graded)?;
    info!(output = %args.output.display(), "done");
    Ok(())
}
