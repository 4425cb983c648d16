//! One-shot build command.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use assetline_pipeline::{Pipeline, Runner};

use super::config::load_config;

/// Run the build command.
pub async fn run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let runner = Runner::new(Arc::new(config.path_spec()));

    tracing::info!(
        "Building {} into {}",
        config.paths.source.display(),
        config.paths.output.display()
    );

    let result = Pipeline::new().build(&runner).await?;

    tracing::info!(
        "Ran {} tasks writing {} files in {}ms",
        result.tasks,
        result.files,
        result.duration_ms
    );

    tracing::info!("Output: {}", result.output_dir.display());

    Ok(())
}
