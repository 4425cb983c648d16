//! OpenType (CFF) to TrueType conversion.
//!
//! Glyph outlines are read with `ttf-parser`, cubic segments are
//! approximated with quadratic splines, and new `glyf`/`loca` tables are
//! assembled. Every other table is carried over, except the CFF tables and
//! the ones whose layout depends on the outline format.

use ttf_parser::{Face, GlyphId, OutlineBuilder};

use crate::sfnt::{push_u16, push_u32, FontError, Sfnt, SfntBuilder, Tag, TRUETYPE_FLAVOR};

/// Maximum distance, in font units, between a cubic and its quadratic
/// approximation.
const TOLERANCE: f32 = 1.0;

/// Upper bound on quadratic pieces per cubic segment.
const MAX_SPLITS: usize = 16;

/// Offset of `indexToLocFormat` inside `head`.
const HEAD_LOCA_FORMAT_OFFSET: usize = 50;

const ON_CURVE: u8 = 0x01;
const X_SHORT: u8 = 0x02;
const Y_SHORT: u8 = 0x04;
const X_SAME_OR_POSITIVE: u8 = 0x10;
const Y_SAME_OR_POSITIVE: u8 = 0x20;

/// Convert an OpenType font to a TrueType-flavored font.
///
/// Fonts that already carry `glyf` outlines are re-emitted as-is apart from
/// the sfnt version.
pub fn otf_to_ttf(font_data: &[u8]) -> Result<Vec<u8>, FontError> {
    let font = Sfnt::parse(font_data)?;

    if font.table(Tag::GLYF).is_some() {
        let mut builder = SfntBuilder::new(TRUETYPE_FLAVOR);
        for table in &font.tables {
            builder.insert(table.tag, table.data.to_vec());
        }
        return Ok(builder.build());
    }

    if font.table(Tag::CFF).is_none() && font.table(Tag::CFF2).is_none() {
        return Err(FontError::MissingTable(Tag::CFF));
    }
    let head = font
        .table(Tag::HEAD)
        .ok_or(FontError::MissingTable(Tag::HEAD))?;
    if head.len() < HEAD_LOCA_FORMAT_OFFSET + 2 {
        return Err(FontError::Truncated(head.len()));
    }

    let face = Face::parse(font_data, 0).map_err(|e| FontError::Outline(e.to_string()))?;
    let glyphs = build_glyphs(&face);

    let mut head = head.to_vec();
    head[HEAD_LOCA_FORMAT_OFFSET..HEAD_LOCA_FORMAT_OFFSET + 2].copy_from_slice(&1i16.to_be_bytes());

    let mut builder = SfntBuilder::new(TRUETYPE_FLAVOR);
    for table in &font.tables {
        match table.tag {
            Tag::CFF | Tag::CFF2 | Tag::VORG => {}
            Tag::HEAD | Tag::MAXP | Tag::POST | Tag::GLYF | Tag::LOCA => {}
            tag => {
                builder.insert(tag, table.data.to_vec());
            }
        }
    }

    builder
        .insert(Tag::HEAD, head)
        .insert(Tag::GLYF, glyphs.glyf)
        .insert(Tag::LOCA, glyphs.loca)
        .insert(Tag::MAXP, maxp_v1(face.number_of_glyphs(), &glyphs.stats));

    if let Some(post) = font.table(Tag::POST) {
        builder.insert(Tag::POST, post_v3(post));
    }

    tracing::debug!(
        "Converted {} glyphs to TrueType outlines",
        face.number_of_glyphs()
    );

    Ok(builder.build())
}

/// A point of a TrueType contour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Point {
    pub x: i16,
    pub y: i16,
    pub on_curve: bool,
}

#[derive(Debug, Default)]
struct GlyphStats {
    max_points: u16,
    max_contours: u16,
}

struct GlyphTables {
    glyf: Vec<u8>,
    loca: Vec<u8>,
    stats: GlyphStats,
}

fn build_glyphs(face: &Face<'_>) -> GlyphTables {
    let mut glyf = Vec::new();
    let mut loca = Vec::new();
    let mut stats = GlyphStats::default();

    for id in 0..face.number_of_glyphs() {
        push_u32(&mut loca, glyf.len() as u32);

        let mut pen = QuadPen::default();
        if face.outline_glyph(GlyphId(id), &mut pen).is_none() {
            continue;
        }
        let contours = pen.finish();
        if contours.is_empty() {
            continue;
        }

        let points: usize = contours.iter().map(Vec::len).sum();
        stats.max_points = stats.max_points.max(points as u16);
        stats.max_contours = stats.max_contours.max(contours.len() as u16);

        encode_simple_glyph(&contours, &mut glyf);
        crate::sfnt::pad4(&mut glyf);
    }
    push_u32(&mut loca, glyf.len() as u32);

    GlyphTables { glyf, loca, stats }
}

/// `maxp` version 1.0, as required for TrueType outlines.
fn maxp_v1(num_glyphs: u16, stats: &GlyphStats) -> Vec<u8> {
    let mut maxp = Vec::with_capacity(32);
    push_u32(&mut maxp, 0x0001_0000);
    push_u16(&mut maxp, num_glyphs);
    push_u16(&mut maxp, stats.max_points);
    push_u16(&mut maxp, stats.max_contours);
    // maxCompositePoints, maxCompositeContours
    push_u16(&mut maxp, 0);
    push_u16(&mut maxp, 0);
    // maxZones
    push_u16(&mut maxp, 2);
    // twilight points, storage, function defs, instruction defs, stack,
    // instruction size, component elements, component depth
    for _ in 0..8 {
        push_u16(&mut maxp, 0);
    }
    maxp
}

/// `post` version 3.0: the fixed header only, no glyph names.
fn post_v3(post: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; 32];
    let keep = post.len().min(32);
    out[..keep].copy_from_slice(&post[..keep]);
    out[0..4].copy_from_slice(&0x0003_0000u32.to_be_bytes());
    out
}

/// Collects outline segments as quadratic TrueType contours.
#[derive(Debug, Default)]
pub(crate) struct QuadPen {
    contours: Vec<Vec<Point>>,
    current: Vec<Point>,
    last: (f32, f32),
}

impl QuadPen {
    pub(crate) fn finish(mut self) -> Vec<Vec<Point>> {
        self.close_contour();
        self.contours
    }

    fn push(&mut self, x: f32, y: f32, on_curve: bool) {
        self.current.push(Point {
            x: round(x),
            y: round(y),
            on_curve,
        });
        if on_curve {
            self.last = (x, y);
        }
    }

    fn close_contour(&mut self) {
        let mut contour = std::mem::take(&mut self.current);
        if contour.len() > 1 {
            let first = contour[0];
            if contour.last() == Some(&first) {
                contour.pop();
            }
        }
        if contour.len() > 1 {
            self.contours.push(contour);
        }
    }
}

impl OutlineBuilder for QuadPen {
    fn move_to(&mut self, x: f32, y: f32) {
        self.close_contour();
        self.push(x, y, true);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.push(x, y, true);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.push(x1, y1, false);
        self.push(x, y, true);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let quads = cubic_to_quads(self.last, (x1, y1), (x2, y2), (x, y), TOLERANCE);
        for (control, end) in quads {
            self.push(control.0, control.1, false);
            self.push(end.0, end.1, true);
        }
    }

    fn close(&mut self) {
        self.close_contour();
    }
}

type Vec2 = (f32, f32);

/// Approximate a cubic Bezier with quadratic pieces.
///
/// Returns `(control, end)` pairs. The number of pieces is chosen from the
/// cubic's third difference so that each piece stays within `tolerance`.
pub(crate) fn cubic_to_quads(
    p0: Vec2,
    c1: Vec2,
    c2: Vec2,
    p3: Vec2,
    tolerance: f32,
) -> Vec<(Vec2, Vec2)> {
    let dx = p3.0 - 3.0 * c2.0 + 3.0 * c1.0 - p0.0;
    let dy = p3.1 - 3.0 * c2.1 + 3.0 * c1.1 - p0.1;
    let error = (3f32).sqrt() / 36.0 * (dx * dx + dy * dy).sqrt();
    let pieces = ((error / tolerance).cbrt().ceil() as usize).clamp(1, MAX_SPLITS);

    let mut out = Vec::with_capacity(pieces);
    for i in 0..pieces {
        let t0 = i as f32 / pieces as f32;
        let t1 = (i + 1) as f32 / pieces as f32;
        let (q0, q1, q2, q3) = sub_cubic(p0, c1, c2, p3, t0, t1);
        let control = (
            (3.0 * (q1.0 + q2.0) - q0.0 - q3.0) / 4.0,
            (3.0 * (q1.1 + q2.1) - q0.1 - q3.1) / 4.0,
        );
        out.push((control, q3));
    }
    out
}

/// Control points of the cubic restricted to `[t0, t1]`.
fn sub_cubic(p0: Vec2, c1: Vec2, c2: Vec2, p3: Vec2, t0: f32, t1: f32) -> (Vec2, Vec2, Vec2, Vec2) {
    let point = |t: f32| {
        let mt = 1.0 - t;
        let a = mt * mt * mt;
        let b = 3.0 * mt * mt * t;
        let c = 3.0 * mt * t * t;
        let d = t * t * t;
        (
            a * p0.0 + b * c1.0 + c * c2.0 + d * p3.0,
            a * p0.1 + b * c1.1 + c * c2.1 + d * p3.1,
        )
    };
    let tangent = |t: f32| {
        let mt = 1.0 - t;
        let a = 3.0 * mt * mt;
        let b = 6.0 * mt * t;
        let c = 3.0 * t * t;
        (
            a * (c1.0 - p0.0) + b * (c2.0 - c1.0) + c * (p3.0 - c2.0),
            a * (c1.1 - p0.1) + b * (c2.1 - c1.1) + c * (p3.1 - c2.1),
        )
    };

    let scale = (t1 - t0) / 3.0;
    let start = point(t0);
    let end = point(t1);
    let d0 = tangent(t0);
    let d1 = tangent(t1);
    (
        start,
        (start.0 + scale * d0.0, start.1 + scale * d0.1),
        (end.0 - scale * d1.0, end.1 - scale * d1.1),
        end,
    )
}

/// Append a simple glyph description to `out`.
pub(crate) fn encode_simple_glyph(contours: &[Vec<Point>], out: &mut Vec<u8>) {
    let points = contours.iter().flatten();
    let x_min = points.clone().map(|p| p.x).min().unwrap_or(0);
    let x_max = points.clone().map(|p| p.x).max().unwrap_or(0);
    let y_min = points.clone().map(|p| p.y).min().unwrap_or(0);
    let y_max = points.clone().map(|p| p.y).max().unwrap_or(0);

    out.extend_from_slice(&(contours.len() as i16).to_be_bytes());
    for value in [x_min, y_min, x_max, y_max] {
        out.extend_from_slice(&value.to_be_bytes());
    }

    let mut end = 0usize;
    for contour in contours {
        end += contour.len();
        push_u16(out, (end - 1) as u16);
    }
    // instructionLength
    push_u16(out, 0);

    let mut flags = Vec::new();
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    let (mut prev_x, mut prev_y) = (0i32, 0i32);

    for point in points {
        let dx = point.x as i32 - prev_x;
        let dy = point.y as i32 - prev_y;
        prev_x = point.x as i32;
        prev_y = point.y as i32;

        let mut flag = if point.on_curve { ON_CURVE } else { 0 };
        flag |= encode_delta(dx, X_SHORT, X_SAME_OR_POSITIVE, &mut xs);
        flag |= encode_delta(dy, Y_SHORT, Y_SAME_OR_POSITIVE, &mut ys);
        flags.push(flag);
    }

    out.extend_from_slice(&flags);
    out.extend_from_slice(&xs);
    out.extend_from_slice(&ys);
}

fn encode_delta(delta: i32, short: u8, same_or_positive: u8, out: &mut Vec<u8>) -> u8 {
    if delta == 0 {
        same_or_positive
    } else if delta.abs() <= 255 {
        out.push(delta.unsigned_abs() as u8);
        if delta > 0 {
            short | same_or_positive
        } else {
            short
        }
    } else {
        out.extend_from_slice(&(delta as i16).to_be_bytes());
        0
    }
}

fn round(value: f32) -> i16 {
    value.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
