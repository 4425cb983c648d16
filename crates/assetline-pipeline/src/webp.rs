//! WebP fallbacks in markup and stylesheets.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Raster extensions that get a `.webp` sibling.
const RASTER_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Class set on the document root by browsers that support WebP.
const WEBP_CLASS: &str = ".webp";

static HTML_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<picture\b[^>]*>|</picture\s*>|<img\b[^>]*>").expect("Invalid tag regex")
});

static SRC_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)\ssrc\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("Invalid src regex")
});

static CSS_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^{}]+)\{([^{}]*)\}").expect("Invalid rule regex"));

static CSS_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("Invalid comment regex"));

static CSS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(url\(\s*['"]?[^'")]*?)\.(?:jpe?g|png)((?:[?#][^'")]*)?['"]?\s*\))"#)
        .expect("Invalid url regex")
});

/// Wrap raster `<img>` tags in a `<picture>` with a WebP `<source>`.
///
/// Images already inside a `<picture>` element are left alone.
pub fn html(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    let mut depth = 0usize;

    for tag in HTML_TOKEN.find_iter(source) {
        let text = tag.as_str();
        let lower = text.get(..8).unwrap_or(text).to_ascii_lowercase();

        if lower.starts_with("<picture") {
            depth += 1;
            continue;
        }
        if lower.starts_with("</pictur") {
            depth = depth.saturating_sub(1);
            continue;
        }
        if depth > 0 {
            continue;
        }

        let Some(webp) = image_src(text).and_then(|src| webp_url(&src)) else {
            continue;
        };

        out.push_str(&source[last..tag.start()]);
        out.push_str("<picture><source srcset=\"");
        out.push_str(&webp);
        out.push_str("\" type=\"image/webp\">");
        out.push_str(text);
        out.push_str("</picture>");
        last = tag.end();
    }

    out.push_str(&source[last..]);
    out
}

fn image_src(tag: &str) -> Option<String> {
    let caps = SRC_ATTR.captures(tag)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// `a/b.JPG?v=2` becomes `a/b.webp?v=2`; anything else is `None`.
fn webp_url(url: &str) -> Option<String> {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let (path, suffix) = url.split_at(end);
    let dot = path.rfind('.')?;
    let ext = path[dot + 1..].to_ascii_lowercase();

    if !RASTER_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }

    Some(format!("{}.webp{}", &path[..dot], suffix))
}

/// Add `.webp`-prefixed rules that swap raster backgrounds for WebP.
///
/// Each style rule with a `background` or `background-image` declaration
/// that references a jpg/jpeg/png `url()` is followed by a sibling rule
/// carrying only those declarations, pointed at the `.webp` file.
pub fn css(source: &str) -> String {
    CSS_RULE
        .replace_all(source, |caps: &Captures| {
            let whole = &caps[0];
            let Some(rule) = webp_rule(&caps[1], &caps[2]) else {
                return whole.to_string();
            };
            format!("{}\n{}", whole, rule)
        })
        .into_owned()
}

fn webp_rule(prelude: &str, body: &str) -> Option<String> {
    // The prelude can begin with the tail of a preceding statement.
    let selector = prelude.rsplit(';').next().unwrap_or(prelude);
    let selector = CSS_COMMENT.replace_all(selector, "");
    let selector = selector.trim();

    if selector.is_empty() || selector.starts_with('@') {
        return None;
    }

    let declarations: Vec<String> = body
        .split(';')
        .filter_map(|decl| {
            let (property, _) = decl.split_once(':')?;
            let property = property.trim().to_ascii_lowercase();
            if property != "background" && property != "background-image" {
                return None;
            }
            if !CSS_URL.is_match(decl) {
                return None;
            }
            Some(CSS_URL.replace_all(decl.trim(), "${1}.webp${2}").into_owned())
        })
        .collect();

    if declarations.is_empty() {
        return None;
    }

    let indent: String = prelude
        .rsplit('\n')
        .next()
        .unwrap_or("")
        .chars()
        .take_while(|c| c.is_whitespace())
        .collect();

    let selectors: Vec<String> = selector
        .split(',')
        .map(|s| format!("{} {}", WEBP_CLASS, s.trim()))
        .collect();

    let mut rule = format!("{}{} {{\n", indent, selectors.join(", "));
    for decl in declarations {
        rule.push_str(&format!("{}  {};\n", indent, decl));
    }
    rule.push_str(&format!("{}}}", indent));
    Some(rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn wraps_raster_images() {
        let html = html(r#"<p><img src="img/photo.jpg" alt="x"></p>"#);
        assert_eq!(
            html,
            r#"<p><picture><source srcset="img/photo.webp" type="image/webp"><img src="img/photo.jpg" alt="x"></picture></p>"#
        );
    }

    #[test]
    fn keeps_query_suffix_and_ignores_case() {
        let html = html("<img class='a' src='logo.PNG?v=3'>");
        assert!(html.contains(r#"srcset="logo.webp?v=3""#));
    }

    #[test]
    fn leaves_vector_and_existing_pictures_alone() {
        let svg = r#"<img src="icon.svg">"#;
        assert_eq!(html(svg), svg);

        let picture = r#"<picture><source srcset="a.avif"><img src="a.jpg"></picture><img src="b.png">"#;
        let out = html(picture);
        assert!(out.starts_with(r#"<picture><source srcset="a.avif"><img src="a.jpg"></picture>"#));
        assert!(out.ends_with(
            r#"<picture><source srcset="b.webp" type="image/webp"><img src="b.png"></picture>"#
        ));
    }

    #[test]
    fn data_src_is_not_a_src() {
        let tag = r#"<img data-src="a.jpg">"#;
        assert_eq!(html(tag), tag);
    }

    #[test]
    fn adds_webp_background_rule() {
        let css = css(".hero {\n  color: red;\n  background-image: url(\"../img/hero.jpg\");\n}\n");
        assert_eq!(
            css,
            ".hero {\n  color: red;\n  background-image: url(\"../img/hero.jpg\");\n}\n.webp .hero {\n  background-image: url(\"../img/hero.webp\");\n}\n"
        );
    }

    #[test]
    fn prefixes_every_selector() {
        let css = css("a, .b:hover{background:url(x.png) no-repeat}");
        assert!(css.contains(".webp a, .webp .b:hover {"));
        assert!(css.contains("background:url(x.webp) no-repeat;"));
    }

    #[test]
    fn handles_rules_inside_media_and_after_statements() {
        let source = "@charset \"UTF-8\";\n@media (max-width: 600px) {\n  .a {\n    background: url(a.jpeg);\n  }\n}\n";
        let out = css(source);

        assert!(out.contains("  .webp .a {\n    background: url(a.webp);\n  }"));
        assert!(!out.contains(".webp @"));
    }

    #[test]
    fn ignores_other_properties_and_formats() {
        let source = ".a { border-image: url(a.png); background: url(b.svg); }";
        assert_eq!(css(source), source);
    }
}
