//! SVG stack sprite generation.
//!
//! Every icon becomes a nested `<svg id="...">` that is hidden unless it is
//! the URL fragment target, so `icons.svg#name` renders a single icon.

use crate::paths::{AssetKind, PathSpec};
use crate::svg;
use crate::task::{read_string, write_file, Artifact, Task, TaskError};

const SPRITE_OPEN: &str = concat!(
    r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink">"#,
    "<style>:root&gt;svg{display:none}:root&gt;svg:target{display:block}</style>\n",
);

const SPRITE_CLOSE: &str = "</svg>\n";

/// Combines the icon sources into one stack sprite.
#[derive(Debug, Default)]
pub struct SpriteTask;

impl Task for SpriteTask {
    fn name(&self) -> &'static str {
        "svg-sprite"
    }

    fn run(&self, paths: &PathSpec) -> Result<Vec<Artifact>, TaskError> {
        let icons = paths.sprite_src.files();
        if icons.is_empty() {
            tracing::warn!("No icons match {}", paths.sprite_src.pattern());
            return Ok(Vec::new());
        }

        let mut sprite = String::from(SPRITE_OPEN);
        for icon in &icons {
            let id = icon
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            let source = read_string(icon)?;
            let symbol = stack_entry(id, &source)
                .ok_or_else(|| TaskError::transform(icon, "no <svg> root element"))?;
            sprite.push_str(&symbol);
        }
        sprite.push_str(SPRITE_CLOSE);

        write_file(&paths.sprite_out, sprite)?;
        Ok(vec![Artifact::new(AssetKind::Img, paths.sprite_out.clone())])
    }
}

/// Root attributes the sprite itself provides.
const REPLACED_ATTRIBUTES: [&str; 4] = ["id", "viewBox", "xmlns", "xmlns:xlink"];

/// Render one icon as a nested, id-addressable `<svg>`.
///
/// The icon's root attributes are kept so presentation defaults such as
/// `fill` and `stroke` still apply to its children.
pub fn stack_entry(id: &str, source: &str) -> Option<String> {
    let root = svg::parse_root(&svg::optimize(source))?;

    let mut entry = format!("<svg id=\"{}\"", escape_attribute(id));
    if let Some(view_box) = root.view_box() {
        entry.push_str(&format!(" viewBox=\"{}\"", quote_escaped(&view_box)));
    }
    for (name, value) in &root.attributes {
        if REPLACED_ATTRIBUTES.contains(&name.as_str()) {
            continue;
        }
        entry.push_str(&format!(" {}=\"{}\"", name, quote_escaped(value)));
    }
    entry.push('>');
    entry.push_str(&root.inner);
    entry.push_str("</svg>");
    Some(entry)
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

/// Values taken from markup are already escaped, except that single-quoted
/// ones may contain `"`.
fn quote_escaped(value: &str) -> String {
    value.replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn renders_entry_with_view_box_and_size() {
        let entry = stack_entry(
            "cart",
            "<?xml version=\"1.0\"?>\n<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 24 24\" width=\"24\" height=\"24\" fill=\"none\">\n  <path d=\"M1 1\"/>\n</svg>",
        )
        .unwrap();

        assert_eq!(
            entry,
            "<svg id=\"cart\" viewBox=\"0 0 24 24\" width=\"24\" height=\"24\" fill=\"none\"><path d=\"M1 1\"/></svg>"
        );
    }

    #[test]
    fn stroke_icons_keep_their_presentation_attributes() {
        let entry = stack_entry(
            "menu",
            r#"<svg xmlns="http://www.w3.org/2000/svg" id="old" viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="2" stroke-linecap="round"><path d="M3 12h18"/></svg>"#,
        )
        .unwrap();

        assert_eq!(
            entry,
            r#"<svg id="menu" viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="2" stroke-linecap="round"><path d="M3 12h18"/></svg>"#
        );
    }

    #[test]
    fn keeps_extra_namespaces_and_escaping() {
        let entry = stack_entry(
            "logo",
            r#"<svg xmlns:xlink="http://www.w3.org/1999/xlink" xmlns:sketch="http://www.bohemiancoding.com/sketch/ns" aria-label='Tom &amp; "Jerry"' viewBox="0 0 4 4"><g/></svg>"#,
        )
        .unwrap();

        assert_eq!(
            entry,
            r#"<svg id="logo" viewBox="0 0 4 4" xmlns:sketch="http://www.bohemiancoding.com/sketch/ns" aria-label="Tom &amp; &quot;Jerry&quot;"><g/></svg>"#
        );
    }

    #[test]
    fn derives_missing_view_box() {
        let entry = stack_entry("dot", "<svg width=\"10\" height=\"10\"><circle r=\"5\"/></svg>").unwrap();
        assert!(entry.starts_with("<svg id=\"dot\" viewBox=\"0 0 10 10\" width=\"10\""));
    }

    #[test]
    fn builds_sprite_in_name_order() {
        let temp = tempdir().unwrap();
        let icons = temp.path().join("src/iconsprite");
        fs::create_dir_all(&icons).unwrap();
        fs::write(icons.join("search.svg"), "<svg viewBox=\"0 0 2 2\"><g/></svg>").unwrap();
        fs::write(icons.join("arrow.svg"), "<svg viewBox=\"0 0 1 1\"><path/></svg>").unwrap();

        let paths = PathSpec::new(temp.path().join("src"), temp.path().join("dist"));
        let artifacts = SpriteTask.run(&paths).unwrap();

        let out = temp.path().join("dist/img/icons/icons.svg");
        assert_eq!(artifacts[0].path, out);

        let sprite = fs::read_to_string(out).unwrap();
        assert!(sprite.starts_with(SPRITE_OPEN));
        assert!(sprite.ends_with(SPRITE_CLOSE));
        let arrow = sprite.find("id=\"arrow\"").unwrap();
        let search = sprite.find("id=\"search\"").unwrap();
        assert!(arrow < search);
    }

    #[test]
    fn rejects_files_without_svg_root() {
        let temp = tempdir().unwrap();
        let icons = temp.path().join("src/iconsprite");
        fs::create_dir_all(&icons).unwrap();
        fs::write(icons.join("bad.svg"), "<html></html>").unwrap();

        let paths = PathSpec::new(temp.path().join("src"), temp.path().join("dist"));

        assert!(matches!(SpriteTask.run(&paths), Err(TaskError::TransformError { .. })));
    }

    #[test]
    fn no_icons_no_sprite() {
        let temp = tempdir().unwrap();
        let paths = PathSpec::new(temp.path().join("src"), temp.path().join("dist"));

        assert!(SpriteTask.run(&paths).unwrap().is_empty());
        assert!(!temp.path().join("dist").exists());
    }
}
