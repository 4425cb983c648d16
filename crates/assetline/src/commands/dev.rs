//! Development command: build, watch and serve concurrently.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use assetline_pipeline::{Pipeline, Runner};
use assetline_server::{watch_sources, DevServer, ReloadHub, ReloadNotifier};

use super::config::load_config;

/// Run the dev command.
///
/// A failed initial build is reported but does not stop the watcher or the
/// server; the next change gets another chance.
pub async fn run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let paths = Arc::new(config.path_spec());

    let hub = ReloadHub::new();
    let notifier = ReloadNotifier::new(hub.clone(), &config.paths.output);
    let runner = Runner::new(paths).with_listener(Arc::new(notifier));
    let pipeline = Pipeline::new();

    let build = async {
        match pipeline.build(&runner).await {
            Ok(result) => tracing::info!(
                "Initial build finished: {} files in {}ms",
                result.files,
                result.duration_ms
            ),
            Err(e) => tracing::error!("Initial build failed: {}", e),
        }
        Ok::<_, anyhow::Error>(())
    };

    let watch = async {
        watch_sources(runner.clone(), pipeline.watch_handlers()).await?;
        Ok::<_, anyhow::Error>(())
    };

    let serve = async {
        DevServer::new(config.server_config(), hub.clone()).start().await?;
        Ok::<_, anyhow::Error>(())
    };

    tokio::try_join!(build, watch, serve)?;

    Ok(())
}
