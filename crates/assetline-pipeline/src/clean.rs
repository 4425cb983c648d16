//! Output directory removal.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use crate::paths::PathSpec;
use crate::task::{Artifact, Task, TaskError};

/// Removes the output root before a build.
#[derive(Debug, Default)]
pub struct CleanTask;

impl Task for CleanTask {
    fn name(&self) -> &'static str {
        "clean"
    }

    fn run(&self, paths: &PathSpec) -> Result<Vec<Artifact>, TaskError> {
        let root = &paths.clean;

        if root.as_os_str().is_empty() {
            return Err(clean_error(root, "empty output path"));
        }

        let resolved_root = resolve(root).map_err(|e| clean_error(root, e))?;
        let resolved_source = resolve(&paths.source_root).map_err(|e| clean_error(root, e))?;
        if resolved_source.starts_with(&resolved_root) {
            return Err(clean_error(
                root,
                "refusing to remove a directory that contains the sources",
            ));
        }

        match fs::remove_dir_all(root) {
            Ok(()) => tracing::debug!("Removed {}", root.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("{} does not exist, nothing to clean", root.display());
            }
            Err(e) => return Err(clean_error(root, e)),
        }

        Ok(Vec::new())
    }
}

/// Absolute form of `path` with the longest existing prefix canonicalized,
/// so `.`, `..` and symlinks compare equal to what they point at.
fn resolve(path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;

    for ancestor in absolute.ancestors() {
        if let Ok(canonical) = fs::canonicalize(ancestor) {
            let rest = absolute.strip_prefix(ancestor).unwrap_or(Path::new(""));
            return Ok(canonical.join(rest));
        }
    }

    Ok(absolute)
}

fn clean_error(path: &Path, message: impl ToString) -> TaskError {
    TaskError::CleanError {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn removes_everything_under_output_root() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("dist");
        fs::create_dir_all(out.join("css/nested")).unwrap();
        fs::write(out.join("index.html"), "old").unwrap();
        fs::write(out.join("css/nested/a.css"), "old").unwrap();
        fs::write(temp.path().join("keep.txt"), "keep").unwrap();

        let paths = PathSpec::new(temp.path().join("src"), &out);
        CleanTask.run(&paths).unwrap();

        assert!(!out.exists());
        assert!(temp.path().join("keep.txt").exists());
    }

    #[test]
    fn missing_output_root_is_already_clean() {
        let temp = tempdir().unwrap();
        let paths = PathSpec::new(temp.path().join("src"), temp.path().join("dist"));

        assert!(CleanTask.run(&paths).unwrap().is_empty());
    }

    #[test]
    fn refuses_to_remove_the_source_tree() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();

        let paths = PathSpec::new(&src, temp.path());
        assert!(matches!(
            CleanTask.run(&paths),
            Err(TaskError::CleanError { .. })
        ));
        assert!(src.exists());
    }

    #[test]
    fn refuses_an_output_root_spelled_through_its_parent() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("index.html"), "keep").unwrap();

        let paths = PathSpec::new(&src, src.join(".."));
        assert!(matches!(
            CleanTask.run(&paths),
            Err(TaskError::CleanError { .. })
        ));
        assert!(src.join("index.html").exists());
    }

    #[test]
    fn refuses_relative_current_directory_output() {
        // Tests run from the crate directory, which holds `src`.
        let paths = PathSpec::new("src", ".");

        assert!(matches!(
            CleanTask.run(&paths),
            Err(TaskError::CleanError { .. })
        ));
        assert!(Path::new("src/clean.rs").exists());
    }

    #[test]
    fn resolves_missing_paths_under_existing_parents() {
        let temp = tempdir().unwrap();
        let canonical = fs::canonicalize(temp.path()).unwrap();

        assert_eq!(
            resolve(&temp.path().join("dist/css")).unwrap(),
            canonical.join("dist/css")
        );
    }
}
