//! The build plan and the watch handler table.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::clean::CleanTask;
use crate::css::CssTask;
use crate::fonts::FontTask;
use crate::html::HtmlTask;
use crate::images::ImageTask;
use crate::js::JsTask;
use crate::paths::AssetKind;
use crate::task::{concurrent, sequence, Plan, Runner, Task, TaskError};

/// Result of a full build.
#[derive(Debug)]
pub struct BuildResult {
    /// Number of tasks that ran
    pub tasks: usize,

    /// Number of files written
    pub files: usize,

    /// Total build time in milliseconds
    pub duration_ms: u64,

    /// Output directory
    pub output_dir: PathBuf,
}

/// The asset tasks, shared between the build plan and the watcher.
#[derive(Clone)]
pub struct Pipeline {
    clean: Arc<dyn Task>,
    html: Arc<dyn Task>,
    css: Arc<dyn Task>,
    js: Arc<dyn Task>,
    images: Arc<dyn Task>,
    fonts: Arc<dyn Task>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            clean: Arc::new(CleanTask),
            html: Arc::new(HtmlTask),
            css: Arc::new(CssTask),
            js: Arc::new(JsTask),
            images: Arc::new(ImageTask),
            fonts: Arc::new(FontTask),
        }
    }

    /// The task that builds a category.
    pub fn task(&self, kind: AssetKind) -> Arc<dyn Task> {
        match kind {
            AssetKind::Html => Arc::clone(&self.html),
            AssetKind::Css => Arc::clone(&self.css),
            AssetKind::Js => Arc::clone(&self.js),
            AssetKind::Img => Arc::clone(&self.images),
            AssetKind::Fonts => Arc::clone(&self.fonts),
        }
    }

    /// Clean, then every asset task concurrently.
    pub fn build_plan(&self) -> Plan {
        sequence([
            Plan::from(Arc::clone(&self.clean)),
            concurrent(
                [AssetKind::Js, AssetKind::Css, AssetKind::Img, AssetKind::Html, AssetKind::Fonts]
                    .into_iter()
                    .map(|kind| Plan::from(self.task(kind))),
            ),
        ])
    }

    /// Which task re-runs when a file of each watched category changes.
    pub fn watch_handlers(&self) -> HashMap<AssetKind, Arc<dyn Task>> {
        AssetKind::WATCHED
            .into_iter()
            .map(|kind| (kind, self.task(kind)))
            .collect()
    }

    /// Run the full build plan.
    pub async fn build(&self, runner: &Runner) -> Result<BuildResult, TaskError> {
        let start = Instant::now();
        let reports = runner.run(self.build_plan()).await?;

        Ok(BuildResult {
            tasks: reports.len(),
            files: reports.iter().map(|r| r.artifacts.len()).sum(),
            duration_ms: start.elapsed().as_millis() as u64,
            output_dir: runner.paths().output_root.clone(),
        })
    }
}
