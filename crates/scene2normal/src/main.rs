mod batch;
mod config;
mod tiff;

use anyhow::{bail, Result};
use clap::Parser;
use fibscene::CpuExtractor;
use log::{error, info};

use crate::batch::run_batch;
use crate::config::Config;

fn main() -> Result<()> {
    env_logger::init();

    let config = Config::parse();
    info!("Starting with {:?}", config);

    let settings = config.into_settings()?;
    let report = run_batch(&settings, CpuExtractor::new)?;

    info!(
        "Wrote {} normal maps to {}",
        report.written.len(),
        settings.output_dir.display()
    );

    if !report.is_success() {
        for (path, reason) in &report.failed {
            error!("FAILED {}: {}", path.display(), reason);
        }
        bail!("{} of {} scene files failed", report.failed.len(), report.failed.len() + report.written.len());
    }

    Ok(())
}
