//! Path table: where each asset kind is read from, written to and watched.

use std::fmt;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use walkdir::WalkDir;

/// Logical asset categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKind {
    Html,
    Css,
    Js,
    Img,
    Fonts,
}

impl AssetKind {
    /// Categories with a watch glob, in dispatch order.
    pub const WATCHED: [AssetKind; 4] = [AssetKind::Html, AssetKind::Css, AssetKind::Js, AssetKind::Img];

    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::Html => "html",
            AssetKind::Css => "css",
            AssetKind::Js => "js",
            AssetKind::Img => "img",
            AssetKind::Fonts => "fonts",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const HTML_SRC: &str = "[!_]*.html";
const CSS_SRC: &str = "scss/style.scss";
const JS_SRC: &str = "js/index.js";
const IMG_SRC: &str = "img/**/*.{jpg,jpeg,png,svg,gif,ico,webp}";
const FONTS_SRC: &str = "fonts/*.ttf";

const HTML_WATCH: &str = "**/*.html";
const CSS_WATCH: &str = "scss/**/*.scss";
const JS_WATCH: &str = "js/**/*.js";

const SPRITE_SRC: &str = "iconsprite/*.svg";
const OTF_SRC: &str = "fonts/*.otf";

/// A glob anchored at the source root.
///
/// Matching is done on paths relative to the root, and `*` never crosses a
/// directory separator.
#[derive(Debug, Clone)]
pub struct SourceGlob {
    root: PathBuf,
    pattern: String,
    base: PathBuf,
    matcher: GlobMatcher,
}

impl SourceGlob {
    /// Anchor `pattern` at `root`.
    ///
    /// Panics on an invalid pattern; every pattern used by the path table is
    /// a constant covered by tests.
    pub fn new(root: &Path, pattern: &str) -> Self {
        let matcher = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .expect("Invalid glob pattern")
            .compile_matcher();

        let base = glob_base(pattern);
        let base = if base.as_os_str().is_empty() {
            root.to_path_buf()
        } else {
            root.join(base)
        };

        Self {
            root: root.to_path_buf(),
            pattern: pattern.to_string(),
            base,
            matcher,
        }
    }

    /// The full pattern, prefixed by the source root.
    pub fn pattern(&self) -> String {
        format!("{}/{}", self.root.display(), self.pattern)
    }

    /// Directory that every match lives under.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Whether `path` (which must be under the source root) matches.
    pub fn is_match(&self, path: &Path) -> bool {
        path.strip_prefix(&self.root)
            .map(|relative| self.matcher.is_match(relative))
            .unwrap_or(false)
    }

    /// Path of a match relative to the glob base.
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.base).unwrap_or(path)
    }

    /// All matching files, sorted. Empty when the base does not exist.
    pub fn files(&self) -> Vec<PathBuf> {
        if !self.base.exists() {
            return Vec::new();
        }

        let mut files: Vec<PathBuf> = WalkDir::new(&self.base)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| self.is_match(p))
            .collect();

        files.sort();
        files
    }
}

/// Leading directories of a pattern that contain no glob syntax.
///
/// A pattern without any glob syntax names a file, so its parent is the
/// base.
fn glob_base(pattern: &str) -> PathBuf {
    let components: Vec<&str> = pattern.split('/').collect();
    let literal = components
        .iter()
        .take_while(|c| !c.contains(['*', '?', '[', '{']))
        .count();

    let take = if literal == components.len() {
        literal.saturating_sub(1)
    } else {
        literal
    };

    components[..take].iter().collect()
}

/// Output directories.
#[derive(Debug, Clone)]
pub struct BuildPaths {
    pub html: PathBuf,
    pub css: PathBuf,
    pub js: PathBuf,
    pub img: PathBuf,
    pub fonts: PathBuf,
}

/// Source globs of the build tasks.
#[derive(Debug, Clone)]
pub struct SourcePaths {
    pub html: SourceGlob,
    pub css: SourceGlob,
    pub js: SourceGlob,
    pub img: SourceGlob,
    pub fonts: SourceGlob,
}

/// Globs whose changes re-run a task.
#[derive(Debug, Clone)]
pub struct WatchPaths {
    pub html: SourceGlob,
    pub css: SourceGlob,
    pub js: SourceGlob,
    pub img: SourceGlob,
}

/// The complete path table, built once at startup.
#[derive(Debug, Clone)]
pub struct PathSpec {
    pub source_root: PathBuf,
    pub output_root: PathBuf,
    pub build: BuildPaths,
    pub src: SourcePaths,
    pub watch: WatchPaths,
    /// Directory removed by the clean task
    pub clean: PathBuf,
    /// Icons combined by the sprite task
    pub sprite_src: SourceGlob,
    /// Sprite document written by the sprite task
    pub sprite_out: PathBuf,
    /// OpenType fonts converted in place
    pub otf_src: SourceGlob,
    /// Where converted TrueType fonts are written
    pub otf_out: PathBuf,
    /// Generated font include stylesheet
    pub font_manifest: PathBuf,
}

impl PathSpec {
    /// Build the path table for the given roots.
    pub fn new(source_root: impl AsRef<Path>, output_root: impl AsRef<Path>) -> Self {
        let src = source_root.as_ref();
        let out = output_root.as_ref();

        Self {
            source_root: src.to_path_buf(),
            output_root: out.to_path_buf(),
            build: BuildPaths {
                html: out.to_path_buf(),
                css: out.join("css"),
                js: out.join("js"),
                img: out.join("img"),
                fonts: out.join("fonts"),
            },
            src: SourcePaths {
                html: SourceGlob::new(src, HTML_SRC),
                css: SourceGlob::new(src, CSS_SRC),
                js: SourceGlob::new(src, JS_SRC),
                img: SourceGlob::new(src, IMG_SRC),
                fonts: SourceGlob::new(src, FONTS_SRC),
            },
            watch: WatchPaths {
                html: SourceGlob::new(src, HTML_WATCH),
                css: SourceGlob::new(src, CSS_WATCH),
                js: SourceGlob::new(src, JS_WATCH),
                img: SourceGlob::new(src, IMG_SRC),
            },
            clean: out.to_path_buf(),
            sprite_src: SourceGlob::new(src, SPRITE_SRC),
            sprite_out: out.join("img").join("icons").join("icons.svg"),
            otf_src: SourceGlob::new(src, OTF_SRC),
            otf_out: src.join("fonts"),
            font_manifest: src.join("scss").join("fonts.scss"),
        }
    }

    /// The watch glob of a category, if it is watched.
    pub fn watch_glob(&self, kind: AssetKind) -> Option<&SourceGlob> {
        match kind {
            AssetKind::Html => Some(&self.watch.html),
            AssetKind::Css => Some(&self.watch.css),
            AssetKind::Js => Some(&self.watch.js),
            AssetKind::Img => Some(&self.watch.img),
            AssetKind::Fonts => None,
        }
    }

    /// First watched category whose glob matches `path`.
    pub fn watch_category(&self, path: &Path) -> Option<AssetKind> {
        AssetKind::WATCHED
            .into_iter()
            .find(|kind| self.watch_glob(*kind).is_some_and(|g| g.is_match(path)))
    }
}

/// `name.ext` becomes `name.min.ext`.
pub fn minified_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => path.with_file_name(format!("{}.min.{}", stem, ext)),
        None => path.with_file_name(format!("{}.min", stem)),
    }
}
