//! Manual utility commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use assetline_pipeline::{FontStyleTask, OtfTask, Runner, SpriteTask, Task};

use super::config::load_config;

/// Build `img/icons/icons.svg` from `iconsprite/*.svg`.
pub async fn svg_sprite(config_path: &Path) -> Result<()> {
    run_task(config_path, Arc::new(SpriteTask)).await
}

/// Convert `fonts/*.otf` to TrueType next to the sources.
pub async fn otf2ttf(config_path: &Path) -> Result<()> {
    run_task(config_path, Arc::new(OtfTask)).await
}

/// Regenerate `scss/fonts.scss` from the built fonts.
pub async fn fonts_style(config_path: &Path) -> Result<()> {
    run_task(config_path, Arc::new(FontStyleTask)).await
}

async fn run_task(config_path: &Path, task: Arc<dyn Task>) -> Result<()> {
    let config = load_config(config_path)?;
    let runner = Runner::new(Arc::new(config.path_spec()));

    let report = runner.run_task(task).await?;
    for artifact in &report.artifacts {
        tracing::info!("Wrote {}", artifact.path.display());
    }

    Ok(())
}
