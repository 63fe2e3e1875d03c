//! CLI subcommands and shared PNG helpers.

pub mod apply;
pub mod identity;
pub mod info;

use anyhow::{bail, Context, Result};
use lutfx_compute::CpuBitmap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Decode a PNG into an RGBA f32 bitmap.
pub fn load_png(path: &Path) -> Result<CpuBitmap> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let decoder = png::Decoder::new(BufReader::new(file));
    let mut reader = decoder
        .read_info()
        .with_context(|| format!("Failed to decode {}", path.display()))?;

    let buf_size = reader
        .output_buffer_size()
        .context("Cannot determine PNG output buffer size")?;
    let mut buf = vec![0u8; buf_size];
    let info = reader.next_frame(&mut buf)?;
    let data = &buf[..info.buffer_size()];

    let rgba: Vec<u8> = match (info.color_type, info.bit_depth) {
        (png::ColorType::Rgba, png::BitDepth::Eight) => data.to_vec(),
        (png::ColorType::Rgb, png::BitDepth::Eight) => data
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        (png::ColorType::Grayscale, png::BitDepth::Eight) => {
            data.iter().flat_map(|&g| [g, g, g, 255]).collect()
        }
        (png::ColorType::GrayscaleAlpha, png::BitDepth::Eight) => data
            .chunks_exact(2)
            .flat_map(|ga| [ga[0], ga[0], ga[0], ga[1]])
            .collect(),
        (color_type, bit_depth) => {
            bail!("Unsupported PNG layout: {:?} {:?}", color_type, bit_depth)
        }
    };

    Ok(CpuBitmap::from_rgba8(&rgba, info.width, info.height)?)
}

/// Encode an RGBA bitmap as 8-bit PNG.
pub fn save_png(path: &Path, bitmap: &CpuBitmap) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), bitmap.width(), bitmap.height());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);

    let mut writer = encoder.write_header()?;
    writer.write_image_data(&bitmap.to_rgba8())?;
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("px.png");
        let bitmap = CpuBitmap::from_rgba8(&[10, 20, 30, 255, 200, 100, 0, 128], 2, 1).unwrap();

        save_png(&path, &bitmap).unwrap();
        let loaded = load_png(&path).unwrap();

        assert_eq!(loaded.width(), 2);
        assert_eq!(loaded.to_rgba8(), bitmap.to_rgba8());
    }
}
