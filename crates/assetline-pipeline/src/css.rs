//! Stylesheet pipeline: SCSS, media query grouping, vendor prefixes, WebP
//! backgrounds and minification.

use std::path::Path;
use std::sync::LazyLock;

use lightningcss::rules::media::MediaRule;
use lightningcss::rules::CssRule;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use lightningcss::traits::ToCss;

use crate::paths::{minified_path, AssetKind, PathSpec};
use crate::task::{write_file, Artifact, Task, TaskError};
use crate::webp;

/// Browser coverage used for vendor prefixes.
const BROWSERSLIST: &str = "last 5 versions";

static TARGETS: LazyLock<Targets> = LazyLock::new(|| {
    match Browsers::from_browserslist([BROWSERSLIST]) {
        Ok(browsers) => Targets {
            browsers,
            ..Targets::default()
        },
        Err(e) => {
            tracing::warn!("Invalid browserslist query '{}': {}", BROWSERSLIST, e);
            Targets::default()
        }
    }
});

/// Compiles the SCSS entry into `style.css` and `style.min.css`.
#[derive(Debug, Default)]
pub struct CssTask;

impl Task for CssTask {
    fn name(&self) -> &'static str {
        "css"
    }

    fn run(&self, paths: &PathSpec) -> Result<Vec<Artifact>, TaskError> {
        let glob = &paths.src.css;
        let entry = glob.files().into_iter().next().ok_or_else(|| {
            TaskError::read(Path::new(&glob.pattern()), "stylesheet entry not found")
        })?;

        let compiled = compile_scss(&entry)?;
        let css = prepare_css(&compiled).map_err(|e| TaskError::transform(&entry, e))?;
        let css = webp::css(&css);

        let output = paths.build.css.join(format!(
            "{}.css",
            entry.file_stem().and_then(|s| s.to_str()).unwrap_or("style")
        ));
        write_file(&output, &css)?;

        let minified = minify_css(&css).map_err(|e| TaskError::transform(&output, e))?;
        let minified_output = minified_path(&output);
        write_file(&minified_output, minified)?;

        Ok(vec![
            Artifact::new(AssetKind::Css, output),
            Artifact::minified(AssetKind::Css, minified_output),
        ])
    }
}

/// Compile an SCSS file to expanded CSS.
///
/// Imports resolve relative to the importing file and to the entry's
/// directory.
pub fn compile_scss(entry: &Path) -> Result<String, TaskError> {
    if !entry.is_file() {
        return Err(TaskError::read(entry, "stylesheet entry not found"));
    }

    let mut options = grass::Options::default().style(grass::OutputStyle::Expanded);
    if let Some(dir) = entry.parent() {
        options = options.load_path(dir);
    }

    grass::from_path(entry, &options).map_err(|e| TaskError::transform(entry, e))
}

/// Group media queries and add vendor prefixes, keeping expanded output.
pub fn prepare_css(css: &str) -> Result<String, String> {
    let mut stylesheet = StyleSheet::parse(css, ParserOptions::default())
        .map_err(|e| format!("CSS parse error: {}", e))?;

    group_media_queries(&mut stylesheet.rules.0);

    stylesheet
        .minify(MinifyOptions {
            targets: *TARGETS,
            ..MinifyOptions::default()
        })
        .map_err(|e| format!("CSS prefix error: {}", e))?;

    let printed = stylesheet
        .to_css(PrinterOptions {
            targets: *TARGETS,
            ..PrinterOptions::default()
        })
        .map_err(|e| format!("CSS print error: {}", e))?;

    Ok(printed.code)
}

/// Merge top-level `@media` rules with identical queries.
///
/// Groups keep the position of the first occurrence among themselves and
/// are moved after every other top-level rule.
pub fn group_media_queries<'i, R>(rules: &mut Vec<CssRule<'i, R>>) {
    let mut others = Vec::with_capacity(rules.len());
    let mut groups: Vec<(String, MediaRule<'i, R>)> = Vec::new();

    for rule in rules.drain(..) {
        let CssRule::Media(media) = rule else {
            others.push(rule);
            continue;
        };

        let key = media
            .query
            .to_css_string(PrinterOptions::default())
            .unwrap_or_default();

        match groups.iter_mut().find(|(query, _)| *query == key) {
            Some((_, group)) => group.rules.0.extend(media.rules.0),
            None => groups.push((key, media)),
        }
    }

    others.extend(groups.into_iter().map(|(_, media)| CssRule::Media(media)));
    *rules = others;
}

/// Minify CSS using lightningcss.
pub fn minify_css(css: &str) -> Result<String, String> {
    let mut stylesheet = StyleSheet::parse(css, ParserOptions::default())
        .map_err(|e| format!("CSS parse error: {}", e))?;

    stylesheet
        .minify(MinifyOptions {
            targets: *TARGETS,
            ..MinifyOptions::default()
        })
        .map_err(|e| format!("CSS minify error: {}", e))?;

    let minified = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            targets: *TARGETS,
            ..PrinterOptions::default()
        })
        .map_err(|e| format!("CSS minify error: {}", e))?;

    Ok(minified.code)
}
