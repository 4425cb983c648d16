//! Lightweight SVG cleanup and root-element parsing.
//!
//! Only textual transforms; the document structure is never rewritten, so
//! `viewBox` and every other attribute survive. Whitespace inside `<text>`
//! elements is content and is left as written.

use std::sync::LazyLock;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

static PROLOG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<\?xml.*?\?>").expect("Invalid prolog regex"));

static DOCTYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<!DOCTYPE[^>\[]*(\[.*?\])?\s*>").expect("Invalid doctype regex"));

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("Invalid comment regex"));

static METADATA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<metadata\b[^>]*/>|<metadata\b.*?</metadata\s*>").expect("Invalid metadata regex")
});

static BETWEEN_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s+<").expect("Invalid whitespace regex"));

static TEXT_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<text\b[^>]*/>|<text\b.*?</text\s*>").expect("Invalid text element regex")
});

/// Strip the prolog, doctype, comments, metadata and inter-tag whitespace.
pub fn optimize(source: &str) -> String {
    let out = PROLOG.replace_all(source, "");
    let out = DOCTYPE.replace_all(&out, "");
    let out = COMMENT.replace_all(&out, "");
    let out = METADATA.replace_all(&out, "");
    collapse_whitespace(&out).trim().to_string()
}

/// Drop whitespace between tags everywhere except inside text elements.
fn collapse_whitespace(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut last = 0;

    for text in TEXT_ELEMENT.find_iter(source) {
        push_collapsed(&mut out, &source[last..text.start()], true);
        out.push_str(text.as_str());
        last = text.end();
    }
    push_collapsed(&mut out, &source[last..], false);

    out
}

fn push_collapsed(out: &mut String, segment: &str, before_element: bool) {
    let collapsed = BETWEEN_TAGS.replace_all(segment, "><");
    let mut segment: &str = &collapsed;

    if out.ends_with('>') && segment.trim_start().starts_with('<') {
        segment = segment.trim_start();
    }
    if before_element && segment.trim_end().ends_with('>') {
        segment = segment.trim_end();
    }
    out.push_str(segment);
}

/// The outermost `<svg>` element of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvgRoot {
    /// Attributes in document order, values as written (still escaped)
    pub attributes: Vec<(String, String)>,

    /// Markup between the opening and closing tags
    pub inner: String,
}

impl SvgRoot {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The `viewBox`, or one derived from `width` and `height`.
    pub fn view_box(&self) -> Option<String> {
        if let Some(view_box) = self.attribute("viewBox") {
            return Some(view_box.to_string());
        }

        let width = self.attribute("width").and_then(parse_length)?;
        let height = self.attribute("height").and_then(parse_length)?;
        Some(format!("0 0 {} {}", width, height))
    }
}

/// Find the root `<svg>` element of a document.
///
/// Returns `None` when the first element is not `<svg>` or the document is
/// not well-formed up to the root's closing tag.
pub fn parse_root(source: &str) -> Option<SvgRoot> {
    let mut reader = Reader::from_str(source);

    loop {
        match reader.read_event().ok()? {
            Event::Start(elem) => {
                let attributes = root_attributes(&elem)?;
                let start = reader.buffer_position() as usize;
                let inner = inner_markup(&mut reader, source, start)?;
                return Some(SvgRoot { attributes, inner });
            }
            Event::Empty(elem) => {
                let attributes = root_attributes(&elem)?;
                return Some(SvgRoot {
                    attributes,
                    inner: String::new(),
                });
            }
            Event::Eof => return None,
            _ => {}
        }
    }
}

fn root_attributes(elem: &BytesStart<'_>) -> Option<Vec<(String, String)>> {
    if elem.local_name().as_ref() != b"svg" {
        return None;
    }

    elem.attributes()
        .map(|attr| {
            let attr = attr.ok()?;
            let key = std::str::from_utf8(attr.key.as_ref()).ok()?;
            let value = std::str::from_utf8(&attr.value).ok()?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Everything up to the end tag that closes the element opened at `start`.
fn inner_markup(reader: &mut Reader<&[u8]>, source: &str, start: usize) -> Option<String> {
    let mut depth = 0usize;

    loop {
        let before = reader.buffer_position() as usize;
        match reader.read_event().ok()? {
            Event::Start(_) => depth += 1,
            Event::End(_) if depth == 0 => return source.get(start..before).map(str::to_string),
            Event::End(_) => depth -= 1,
            Event::Eof => return None,
            _ => {}
        }
    }
}

/// `24`, `24px` and `24.5` are lengths; percentages and other units are not.
fn parse_length(value: &str) -> Option<f64> {
    let value = value.trim();
    let number = value.strip_suffix("px").unwrap_or(value);
    number.parse::<f64>().ok().filter(|n| n.is_finite() && *n >= 0.0)
}
