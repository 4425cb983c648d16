//! Script copy and minification.

use std::path::Path;

use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;

use crate::paths::{minified_path, AssetKind, PathSpec};
use crate::task::{read_string, write_file, Artifact, Task, TaskError};

/// Copies the script entry and writes its minified sibling.
#[derive(Debug, Default)]
pub struct JsTask;

impl Task for JsTask {
    fn name(&self) -> &'static str {
        "js"
    }

    fn run(&self, paths: &PathSpec) -> Result<Vec<Artifact>, TaskError> {
        let glob = &paths.src.js;
        let script = glob.files().into_iter().next().ok_or_else(|| {
            TaskError::read(Path::new(&glob.pattern()), "script entry not found")
        })?;

        let source = read_string(&script)?;

        let output = paths.build.js.join(glob.relative(&script));
        write_file(&output, &source)?;

        let minified = minify_js(&source).map_err(|e| TaskError::transform(&script, e))?;
        let minified_output = minified_path(&output);
        write_file(&minified_output, minified)?;

        Ok(vec![
            Artifact::new(AssetKind::Js, output),
            Artifact::minified(AssetKind::Js, minified_output),
        ])
    }
}

/// Minify and mangle a classic (non-module) browser script.
///
/// Top-level names are left alone since they are globals shared with other
/// scripts on the page.
pub fn minify_js(source: &str) -> Result<String, String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::cjs()).parse();
    if let Some(error) = ret.errors.first() {
        return Err(format!("JS parse error: {}", error));
    }

    let mut program = ret.program;
    let options = MinifierOptions {
        mangle: Some(MangleOptions::default()),
        compress: Some(CompressOptions::smallest()),
    };
    let ret = Minifier::new(options).minify(&allocator, &mut program);

    let code = Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            comments: CommentOptions::disabled(),
            ..CodegenOptions::default()
        })
        .with_scoping(ret.scoping)
        .build(&program)
        .code;

    Ok(code)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    const SCRIPT: &str = r#"
// menu toggle
function toggleMenu(element) {
    const isOpen = element.classList.contains('open');
    element.classList.toggle('open', !isOpen);
    return !isOpen;
}

document.querySelector('.burger').addEventListener('click', function () {
    toggleMenu(document.body);
});
"#;

    #[test]
    fn minifies_and_keeps_globals() {
        let minified = minify_js(SCRIPT).unwrap();

        assert!(minified.len() < SCRIPT.len());
        assert!(!minified.contains("menu toggle"));
        assert!(minified.contains("addEventListener"));
        assert!(!minified.contains("isOpen"));
    }

    #[test]
    fn reports_parse_errors() {
        assert!(minify_js("function (").is_err());
    }

    #[test]
    fn writes_copy_and_minified_script() {
        let temp = tempdir().unwrap();
        let js = temp.path().join("src/js");
        fs::create_dir_all(&js).unwrap();
        fs::write(js.join("index.js"), SCRIPT).unwrap();
        fs::write(js.join("helper.js"), "export const x = 1;").unwrap();

        let paths = PathSpec::new(temp.path().join("src"), temp.path().join("dist"));
        let artifacts = JsTask.run(&paths).unwrap();

        let out = temp.path().join("dist/js");
        assert_eq!(
            artifacts.iter().map(|a| a.path.clone()).collect::<Vec<_>>(),
            vec![out.join("index.js"), out.join("index.min.js")]
        );
        assert_eq!(fs::read_to_string(out.join("index.js")).unwrap(), SCRIPT);
        assert!(!out.join("helper.js").exists());
    }

    #[test]
    fn parse_error_keeps_the_plain_copy() {
        let temp = tempdir().unwrap();
        let js = temp.path().join("src/js");
        fs::create_dir_all(&js).unwrap();
        fs::write(js.join("index.js"), "let = ;").unwrap();

        let paths = PathSpec::new(temp.path().join("src"), temp.path().join("dist"));

        assert!(matches!(JsTask.run(&paths), Err(TaskError::TransformError { .. })));
        assert!(temp.path().join("dist/js/index.js").exists());
        assert!(!temp.path().join("dist/js/index.min.js").exists());
    }

    #[test]
    fn missing_entry_is_a_read_error() {
        let temp = tempdir().unwrap();
        let paths = PathSpec::new(temp.path().join("src"), temp.path().join("dist"));

        assert!(matches!(JsTask.run(&paths), Err(TaskError::ReadError { .. })));
        assert!(!temp.path().join("dist/js").exists());
    }
}
