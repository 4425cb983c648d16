//! Source watching: re-runs the task of whichever category changed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;

use assetline_pipeline::{AssetKind, PathSpec, Runner, Task};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc as async_mpsc;

use crate::server::ServerError;

/// File watcher for detecting changes under a directory.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Create a new recursive watcher on `root`.
    ///
    /// Returns the watcher and a channel of changed file paths. Every
    /// create, modify and remove event is forwarded as-is.
    pub fn new(root: &Path) -> Result<(Self, async_mpsc::Receiver<PathBuf>), std::io::Error> {
        let (sync_tx, sync_rx) = mpsc::channel();
        let (async_tx, async_rx) = async_mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            if let Ok(event) = res {
                let _ = sync_tx.send(event);
            }
        })
        .map_err(std::io::Error::other)?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(std::io::Error::other)?;

        std::thread::spawn(move || {
            while let Ok(event) = sync_rx.recv() {
                if !is_change(&event.kind) {
                    continue;
                }
                for path in event.paths {
                    if async_tx.blocking_send(path).is_err() {
                        return;
                    }
                }
            }
        });

        Ok((Self { _watcher: watcher }, async_rx))
    }
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Maps changed source files to the task of their category.
pub struct ChangeRouter {
    paths: Arc<PathSpec>,
    canonical_root: Option<PathBuf>,
    handlers: HashMap<AssetKind, Arc<dyn Task>>,
}

impl ChangeRouter {
    pub fn new(paths: Arc<PathSpec>, handlers: HashMap<AssetKind, Arc<dyn Task>>) -> Self {
        let canonical_root = paths.source_root.canonicalize().ok();
        Self {
            paths,
            canonical_root,
            handlers,
        }
    }

    /// The category and task a changed path triggers, if any.
    ///
    /// Watch backends report paths either as given or canonicalized; both
    /// are rebased onto the configured source root before matching.
    pub fn route(&self, changed: &Path) -> Option<(AssetKind, Arc<dyn Task>)> {
        let root = &self.paths.source_root;
        let path = if changed.starts_with(root) {
            changed.to_path_buf()
        } else {
            let canonical = self.canonical_root.as_ref()?;
            root.join(changed.strip_prefix(canonical).ok()?)
        };

        let kind = self.paths.watch_category(&path)?;
        let task = self.handlers.get(&kind)?;
        Some((kind, Arc::clone(task)))
    }
}

/// Watch the source root and run the matching task for every change.
///
/// Runs until the watcher stops. Task failures are reported through the
/// runner's listener and never stop the loop.
pub async fn watch_sources(
    runner: Runner,
    handlers: HashMap<AssetKind, Arc<dyn Task>>,
) -> Result<(), ServerError> {
    let paths = Arc::clone(runner.paths());
    let (watcher, mut rx) =
        FileWatcher::new(&paths.source_root).map_err(|e| ServerError::WatchError(e.to_string()))?;

    let router = ChangeRouter::new(paths, handlers);
    tracing::info!("Watching {}", router.paths.source_root.display());

    while let Some(changed) = rx.recv().await {
        let Some((kind, task)) = router.route(&changed) else {
            continue;
        };

        tracing::info!("{} changed ({})", changed.display(), kind);
        let runner = runner.clone();
        tokio::spawn(async move {
            // Failures are already logged and forwarded by the runner.
            let _ = runner.run_task(task).await;
        });
    }

    // Keep watcher alive
    drop(watcher);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use assetline_pipeline::{Artifact, Pipeline, TaskError};
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn watches_file_changes() {
        let temp = tempdir().unwrap();
        let test_file = temp.path().join("index.html");

        let (watcher, mut rx) = FileWatcher::new(temp.path()).unwrap();

        // Give inotify time to set up
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(&test_file, "<p>created</p>").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;
        drop(watcher);

        assert!(event.is_ok(), "timeout waiting for file watch event");
        assert!(event.unwrap().is_some(), "channel should not be closed");
    }

    fn router(source: &Path) -> ChangeRouter {
        let paths = Arc::new(PathSpec::new(source, source.join("../dist")));
        ChangeRouter::new(paths, Pipeline::new().watch_handlers())
    }

    #[test]
    fn routes_each_category_to_its_own_task() {
        let router = router(Path::new("src"));

        let route = |p: &str| router.route(Path::new(p)).map(|(kind, task)| (kind, task.name()));

        assert_eq!(route("src/_header.html"), Some((AssetKind::Html, "html")));
        assert_eq!(route("src/scss/_vars.scss"), Some((AssetKind::Css, "css")));
        assert_eq!(route("src/js/app/menu.js"), Some((AssetKind::Js, "js")));
        assert_eq!(route("src/img/a/b.png"), Some((AssetKind::Img, "images")));
        assert_eq!(route("src/fonts/Inter.ttf"), None);
        assert_eq!(route("elsewhere/index.html"), None);
    }

    #[test]
    fn rebases_canonical_paths() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("scss")).unwrap();

        let router = router(&src);
        let canonical = src.canonicalize().unwrap().join("scss/style.scss");

        let (kind, _) = router.route(&canonical).unwrap();
        assert_eq!(kind, AssetKind::Css);
    }

    struct CountingTask(Arc<AtomicUsize>);

    impl Task for CountingTask {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn run(&self, _paths: &PathSpec) -> Result<Vec<Artifact>, TaskError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn change_runs_only_the_matching_task() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("scss")).unwrap();
        fs::create_dir_all(src.join("js")).unwrap();

        let css_runs = Arc::new(AtomicUsize::new(0));
        let js_runs = Arc::new(AtomicUsize::new(0));
        let mut handlers: HashMap<AssetKind, Arc<dyn Task>> = HashMap::new();
        handlers.insert(AssetKind::Css, Arc::new(CountingTask(Arc::clone(&css_runs))));
        handlers.insert(AssetKind::Js, Arc::new(CountingTask(Arc::clone(&js_runs))));

        let runner = Runner::new(Arc::new(PathSpec::new(&src, temp.path().join("dist"))));
        let watch = tokio::spawn(watch_sources(runner, handlers));
        tokio::time::sleep(Duration::from_millis(200)).await;

        fs::write(src.join("scss/style.scss"), ".a { color: red; }").unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        while css_runs.load(Ordering::SeqCst) == 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        watch.abort();

        assert!(css_runs.load(Ordering::SeqCst) >= 1);
        assert_eq!(js_runs.load(Ordering::SeqCst), 0);
    }
}
