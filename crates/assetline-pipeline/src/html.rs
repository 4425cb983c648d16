//! HTML pages: include expansion and `<picture>` markup.

use crate::include;
use crate::paths::{AssetKind, PathSpec};
use crate::task::{read_string, write_file, Artifact, Task, TaskError};
use crate::webp;

/// Builds every top-level page of the source root.
#[derive(Debug, Default)]
pub struct HtmlTask;

impl Task for HtmlTask {
    fn name(&self) -> &'static str {
        "html"
    }

    fn run(&self, paths: &PathSpec) -> Result<Vec<Artifact>, TaskError> {
        let glob = &paths.src.html;
        let mut artifacts = Vec::new();

        for page in glob.files() {
            let source = read_string(&page)?;
            let expanded =
                include::expand_str(&source, &page).map_err(|e| TaskError::transform(&page, e))?;
            let html = webp::html(&expanded);

            let output = paths.build.html.join(glob.relative(&page));
            write_file(&output, html)?;
            artifacts.push(Artifact::new(AssetKind::Html, output));
        }

        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn builds_pages_and_skips_partials() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("parts")).unwrap();
        fs::write(
            src.join("index.html"),
            "<body>@@include('parts/_hero.html', {\"alt\": \"Hero\"})</body>",
        )
        .unwrap();
        fs::write(src.join("parts/_hero.html"), "<img src=\"img/hero.jpg\" alt=\"@@alt\">").unwrap();
        fs::write(src.join("_footer.html"), "<footer></footer>").unwrap();

        let paths = PathSpec::new(&src, temp.path().join("dist"));
        let artifacts = HtmlTask.run(&paths).unwrap();

        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].path, temp.path().join("dist/index.html"));
        assert_eq!(
            fs::read_to_string(temp.path().join("dist/index.html")).unwrap(),
            "<body><picture><source srcset=\"img/hero.webp\" type=\"image/webp\"><img src=\"img/hero.jpg\" alt=\"Hero\"></picture></body>"
        );
        assert!(!temp.path().join("dist/_footer.html").exists());
        assert!(!temp.path().join("dist/parts").exists());
    }

    #[test]
    fn lone_partial_produces_nothing() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("_header.html"), "<header></header>").unwrap();

        let paths = PathSpec::new(&src, temp.path().join("dist"));

        assert!(HtmlTask.run(&paths).unwrap().is_empty());
        assert!(!temp.path().join("dist").exists());
    }

    #[test]
    fn broken_include_fails_the_task() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("index.html"), "@@include('_missing.html')").unwrap();

        let paths = PathSpec::new(&src, temp.path().join("dist"));

        assert!(matches!(
            HtmlTask.run(&paths),
            Err(TaskError::TransformError { .. })
        ));
    }
}
