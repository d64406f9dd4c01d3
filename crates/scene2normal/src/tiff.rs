use anyhow::{Context, Result};
use fibscene::normal_map_to_rgb8;
use image::{ImageFormat, RgbImage};
use ndarray::Array3;
use std::path::Path;

/// Write a `(height, width, 3)` byte map as an RGB TIFF.
pub fn write_rgb8_tiff(path: &Path, map: &Array3<u8>) -> Result<()> {
    let ((width, height), bytes) = normal_map_to_rgb8(map);

    let image = RgbImage::from_raw(width, height, bytes)
        .with_context(|| format!("{}x{} RGB buffer has the wrong length", width, height))?;

    image
        .save_with_format(path, ImageFormat::Tiff)
        .with_context(|| format!("writing {}", path.display()))?;

    Ok(())
}
