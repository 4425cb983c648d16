//! Task abstraction and the sequence/concurrent combinators.

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;

use crate::paths::{AssetKind, PathSpec};

/// A file written by a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Asset category
    pub kind: AssetKind,

    /// Path of the written file
    pub path: PathBuf,

    /// Whether this is the minified/optimized variant
    pub minified: bool,
}

impl Artifact {
    pub fn new(kind: AssetKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            minified: false,
        }
    }

    pub fn minified(kind: AssetKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            minified: true,
        }
    }
}

/// Outcome of a successful task run.
#[derive(Debug, Clone)]
pub struct TaskReport {
    /// Task name
    pub task: &'static str,

    /// Files written, in write order
    pub artifacts: Vec<Artifact>,

    /// Wall time in milliseconds
    pub duration_ms: u64,
}

/// Errors that can occur while running a task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Failed to read {path}: {message}")]
    ReadError { path: String, message: String },

    #[error("Failed to transform {path}: {message}")]
    TransformError { path: String, message: String },

    #[error("Failed to write {path}: {message}")]
    WriteError { path: String, message: String },

    #[error("Failed to clean {path}: {message}")]
    CleanError { path: String, message: String },

    #[error("Task did not complete: {0}")]
    JoinError(String),
}

impl TaskError {
    pub fn read(path: &Path, message: impl ToString) -> Self {
        Self::ReadError {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    pub fn transform(path: &Path, message: impl ToString) -> Self {
        Self::TransformError {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    pub fn write(path: &Path, message: impl ToString) -> Self {
        Self::WriteError {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }
}

/// A unit of work in the pipeline.
///
/// Tasks are synchronous and I/O bound; the runner executes them on the
/// blocking thread pool.
pub trait Task: Send + Sync {
    /// Task identifier used in logs and reports (e.g., "css")
    fn name(&self) -> &'static str;

    /// Run the task against the path table, returning the files written.
    fn run(&self, paths: &PathSpec) -> Result<Vec<Artifact>, TaskError>;
}

/// Receives the outcome of every task run.
pub trait OutputListener: Send + Sync {
    fn task_succeeded(&self, report: &TaskReport);

    fn task_failed(&self, task: &'static str, error: &TaskError);
}

/// A composition of tasks.
#[derive(Clone)]
pub enum Plan {
    /// Run a single task
    Task(Arc<dyn Task>),

    /// Run steps in order, each after the previous one succeeded
    Sequence(Vec<Plan>),

    /// Run branches together and settle when all of them settled
    Concurrent(Vec<Plan>),
}

impl Plan {
    pub fn task(task: impl Task + 'static) -> Self {
        Plan::Task(Arc::new(task))
    }
}

impl From<Arc<dyn Task>> for Plan {
    fn from(task: Arc<dyn Task>) -> Self {
        Plan::Task(task)
    }
}

/// Run `steps` one after another, stopping at the first failure.
pub fn sequence(steps: impl IntoIterator<Item = Plan>) -> Plan {
    Plan::Sequence(steps.into_iter().collect())
}

/// Run `branches` concurrently.
///
/// Every branch runs to completion even when a sibling fails; the first
/// failure (in completion order) is returned afterwards.
pub fn concurrent(branches: impl IntoIterator<Item = Plan>) -> Plan {
    Plan::Concurrent(branches.into_iter().collect())
}

pub type PlanFuture = Pin<Box<dyn Future<Output = Result<Vec<TaskReport>, TaskError>> + Send>>;

/// Executes plans and reports task outcomes.
#[derive(Clone)]
pub struct Runner {
    paths: Arc<PathSpec>,
    listener: Option<Arc<dyn OutputListener>>,
}

impl Runner {
    pub fn new(paths: Arc<PathSpec>) -> Self {
        Self {
            paths,
            listener: None,
        }
    }

    /// Notify `listener` after every task run.
    pub fn with_listener(mut self, listener: Arc<dyn OutputListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn paths(&self) -> &Arc<PathSpec> {
        &self.paths
    }

    /// Run a single task on the blocking pool.
    pub async fn run_task(&self, task: Arc<dyn Task>) -> Result<TaskReport, TaskError> {
        let name = task.name();
        tracing::info!("Starting '{}'", name);

        let start = Instant::now();
        let paths = Arc::clone(&self.paths);
        let result = tokio::task::spawn_blocking(move || task.run(&paths))
            .await
            .map_err(|e| TaskError::JoinError(e.to_string()))
            .and_then(|r| r);

        match result {
            Ok(artifacts) => {
                let report = TaskReport {
                    task: name,
                    artifacts,
                    duration_ms: start.elapsed().as_millis() as u64,
                };
                tracing::info!(
                    "Finished '{}' after {}ms ({} files)",
                    name,
                    report.duration_ms,
                    report.artifacts.len()
                );
                if let Some(listener) = &self.listener {
                    listener.task_succeeded(&report);
                }
                Ok(report)
            }
            Err(e) => {
                tracing::error!("'{}' failed: {}", name, e);
                if let Some(listener) = &self.listener {
                    listener.task_failed(name, &e);
                }
                Err(e)
            }
        }
    }

    /// Run a plan, returning the reports of every task that ran.
    pub fn run(&self, plan: Plan) -> PlanFuture {
        let runner = self.clone();
        Box::pin(async move {
            match plan {
                Plan::Task(task) => runner.run_task(task).await.map(|report| vec![report]),

                Plan::Sequence(steps) => {
                    let mut reports = Vec::new();
                    for step in steps {
                        reports.extend(runner.run(step).await?);
                    }
                    Ok(reports)
                }

                Plan::Concurrent(branches) => {
                    let mut set = JoinSet::new();
                    for branch in branches {
                        set.spawn(runner.run(branch));
                    }

                    let mut reports = Vec::new();
                    let mut first_error = None;
                    while let Some(joined) = set.join_next().await {
                        match joined {
                            Ok(Ok(branch_reports)) => reports.extend(branch_reports),
                            Ok(Err(e)) => {
                                first_error.get_or_insert(e);
                            }
                            Err(e) => {
                                first_error.get_or_insert(TaskError::JoinError(e.to_string()));
                            }
                        }
                    }

                    match first_error {
                        Some(e) => Err(e),
                        None => Ok(reports),
                    }
                }
            }
        })
    }
}

pub(crate) fn read_bytes(path: &Path) -> Result<Vec<u8>, TaskError> {
    fs::read(path).map_err(|e| TaskError::read(path, e))
}

pub(crate) fn read_string(path: &Path) -> Result<String, TaskError> {
    fs::read_to_string(path).map_err(|e| TaskError::read(path, e))
}

/// Write a file, creating parent directories as needed.
pub(crate) fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), TaskError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TaskError::write(path, e))?;
    }
    fs::write(path, contents).map_err(|e| TaskError::write(path, e))?;
    tracing::debug!("Wrote {}", path.display());
    Ok(())
}
