use anyhow::{ensure, Result};
use clap::Parser;
use fibscene::{
    ExtractorConfig, DEFAULT_BACKGROUND, DEFAULT_LAYER_COUNT, DEFAULT_MAX_HEIGHT,
    DEFAULT_RESOLUTION,
};
use std::path::PathBuf;

use crate::batch::BatchSettings;

/// `scene2normal` - turn voxel scene descriptions into surface-normal maps.
///
/// Every file in the input directory is parsed as a scene of spheres,
/// cylinders and cuboids, rendered to a layered heightfield and written as
/// `<file name>_normal_map.tif` (8-bit RGB).
#[derive(Parser, Debug, Clone)]
#[command(name = "scene2normal", version, about, long_about = None)]
pub struct Config {
    /// Directory holding the scene description files.
    #[arg(long, env = "SCENE_INPUT_DIR", default_value = "config_data")]
    pub input_dir: PathBuf,

    /// Directory the normal maps are written to; created if missing.
    #[arg(long, env = "SCENE_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Side length of the square output maps, in pixels.
    #[arg(long, env = "SCENE_RESOLUTION", default_value_t = DEFAULT_RESOLUTION)]
    pub resolution: u32,

    /// Number of (entry, exit) layers the extractor records per pixel.
    #[arg(long, env = "SCENE_LAYERS", default_value_t = DEFAULT_LAYER_COUNT)]
    pub layers: usize,

    /// Largest representable height; heightfield values above it are clamped.
    #[arg(long, env = "SCENE_MAX_HEIGHT", default_value_t = DEFAULT_MAX_HEIGHT)]
    pub max_height: f32,

    /// Value written where a ray hits no geometry.
    #[arg(long, env = "SCENE_BACKGROUND", default_value_t = DEFAULT_BACKGROUND)]
    pub background: f32,

    /// Log failing files and continue instead of stopping at the first one.
    #[arg(long, env = "SCENE_KEEP_GOING", default_value_t = false)]
    pub keep_going: bool,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.resolution > 0, "--resolution must be > 0");
        ensure!(self.layers > 0, "--layers must be > 0");
        ensure!(
            self.max_height.is_finite() && self.max_height > 0.0,
            "--max-height must be a positive finite number, got {}",
            self.max_height
        );
        ensure!(
            self.background.is_finite(),
            "--background must be finite, got {}",
            self.background
        );
        Ok(())
    }

    pub fn extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig::square(self.resolution, self.layers, self.max_height)
    }

    /// Validated, read-only settings for one batch run.
    pub fn into_settings(self) -> Result<BatchSettings> {
        self.validate()?;

        Ok(BatchSettings {
            extractor: self.extractor_config(),
            input_dir: self.input_dir,
            output_dir: self.output_dir,
            background: self.background,
            keep_going: self.keep_going,
        })
    }
}
