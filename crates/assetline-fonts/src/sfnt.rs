//! Minimal sfnt (TrueType / OpenType) container reading and writing.
//!
//! Only the table directory is interpreted here. Table contents are handled
//! by the encoders that need them.

use std::collections::BTreeMap;
use std::fmt;

/// sfnt version of fonts with TrueType outlines.
pub const TRUETYPE_FLAVOR: u32 = 0x0001_0000;

/// sfnt version of fonts with CFF outlines.
pub const CFF_FLAVOR: u32 = u32::from_be_bytes(*b"OTTO");

/// Legacy Apple TrueType flavor.
const APPLE_FLAVOR: u32 = u32::from_be_bytes(*b"true");

const COLLECTION_TAG: u32 = u32::from_be_bytes(*b"ttcf");

const HEADER_LEN: usize = 12;
const RECORD_LEN: usize = 16;

/// Magic number used for `head.checkSumAdjustment`.
const CHECKSUM_MAGIC: u32 = 0xB1B0_AFBA;

/// Offset of `checkSumAdjustment` inside the `head` table.
pub(crate) const HEAD_CHECKSUM_OFFSET: usize = 8;

/// A four-byte table tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    pub const HEAD: Tag = Tag(*b"head");
    pub const MAXP: Tag = Tag(*b"maxp");
    pub const POST: Tag = Tag(*b"post");
    pub const GLYF: Tag = Tag(*b"glyf");
    pub const LOCA: Tag = Tag(*b"loca");
    pub const CFF: Tag = Tag(*b"CFF ");
    pub const CFF2: Tag = Tag(*b"CFF2");
    pub const VORG: Tag = Tag(*b"VORG");

    /// Tag as a big-endian integer.
    pub fn to_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Errors that can occur while reading or converting fonts.
#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("Font data truncated at offset {0}")]
    Truncated(usize),

    #[error("Unsupported sfnt version: {0:#010x}")]
    UnsupportedFlavor(u32),

    #[error("Font collections are not supported")]
    Collection,

    #[error("Table '{0}' lies outside the font data")]
    TableOutOfBounds(Tag),

    #[error("Missing required table: '{0}'")]
    MissingTable(Tag),

    #[error("Failed to read outlines: {0}")]
    Outline(String),

    #[error("Compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

/// One entry of the table directory, borrowing its data from the font.
#[derive(Debug, Clone, Copy)]
pub struct TableRecord<'a> {
    pub tag: Tag,
    pub checksum: u32,
    pub data: &'a [u8],
}

/// A parsed sfnt font.
#[derive(Debug, Clone)]
pub struct Sfnt<'a> {
    /// The sfnt version (`0x00010000` or `OTTO`).
    pub flavor: u32,

    /// Tables in directory order.
    pub tables: Vec<TableRecord<'a>>,
}

impl<'a> Sfnt<'a> {
    /// Parse the offset table and table directory.
    pub fn parse(data: &'a [u8]) -> Result<Self, FontError> {
        let flavor = read_u32(data, 0)?;
        match flavor {
            TRUETYPE_FLAVOR | CFF_FLAVOR | APPLE_FLAVOR => {}
            COLLECTION_TAG => return Err(FontError::Collection),
            other => return Err(FontError::UnsupportedFlavor(other)),
        }

        let num_tables = read_u16(data, 4)? as usize;
        let mut tables = Vec::with_capacity(num_tables);

        for i in 0..num_tables {
            let record = HEADER_LEN + i * RECORD_LEN;
            let tag = Tag(
                data.get(record..record + 4)
                    .ok_or(FontError::Truncated(record))?
                    .try_into()
                    .map_err(|_| FontError::Truncated(record))?,
            );
            let checksum = read_u32(data, record + 4)?;
            let offset = read_u32(data, record + 8)? as usize;
            let length = read_u32(data, record + 12)? as usize;

            let table = offset
                .checked_add(length)
                .and_then(|end| data.get(offset..end))
                .ok_or(FontError::TableOutOfBounds(tag))?;

            tables.push(TableRecord {
                tag,
                checksum,
                data: table,
            });
        }

        Ok(Self { flavor, tables })
    }

    /// Look up a table by tag.
    pub fn table(&self, tag: Tag) -> Option<&'a [u8]> {
        self.tables.iter().find(|t| t.tag == tag).map(|t| t.data)
    }

    /// Size of the font when laid out as a plain sfnt with padded tables.
    pub fn sfnt_size(&self) -> u32 {
        let tables: usize = self.tables.iter().map(|t| align4(t.data.len())).sum();
        (HEADER_LEN + RECORD_LEN * self.tables.len() + tables) as u32
    }
}

/// Assembles an sfnt from owned tables.
///
/// Tables are written sorted by tag, each padded to four bytes, with fresh
/// checksums and `head.checkSumAdjustment`.
#[derive(Debug, Clone)]
pub struct SfntBuilder {
    flavor: u32,
    tables: BTreeMap<Tag, Vec<u8>>,
}

impl SfntBuilder {
    pub fn new(flavor: u32) -> Self {
        Self {
            flavor,
            tables: BTreeMap::new(),
        }
    }

    /// Add or replace a table.
    pub fn insert(&mut self, tag: Tag, data: Vec<u8>) -> &mut Self {
        self.tables.insert(tag, data);
        self
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.tables.contains_key(&tag)
    }

    /// Serialize the font.
    pub fn build(mut self) -> Vec<u8> {
        if let Some(head) = self.tables.get_mut(&Tag::HEAD) {
            if head.len() >= HEAD_CHECKSUM_OFFSET + 4 {
                head[HEAD_CHECKSUM_OFFSET..HEAD_CHECKSUM_OFFSET + 4].fill(0);
            }
        }

        let num_tables = self.tables.len();
        let (search_range, entry_selector, range_shift) = search_params(num_tables);

        let mut out = Vec::new();
        push_u32(&mut out, self.flavor);
        push_u16(&mut out, num_tables as u16);
        push_u16(&mut out, search_range);
        push_u16(&mut out, entry_selector);
        push_u16(&mut out, range_shift);

        let mut offset = HEADER_LEN + RECORD_LEN * num_tables;
        let mut head_offset = None;
        for (tag, data) in &self.tables {
            if *tag == Tag::HEAD {
                head_offset = Some(offset);
            }
            out.extend_from_slice(&tag.0);
            push_u32(&mut out, checksum(data));
            push_u32(&mut out, offset as u32);
            push_u32(&mut out, data.len() as u32);
            offset += align4(data.len());
        }

        for data in self.tables.values() {
            out.extend_from_slice(data);
            pad4(&mut out);
        }

        if let Some(head) = head_offset {
            let adjustment = CHECKSUM_MAGIC.wrapping_sub(checksum(&out));
            let at = head + HEAD_CHECKSUM_OFFSET;
            if out.len() >= at + 4 {
                out[at..at + 4].copy_from_slice(&adjustment.to_be_bytes());
            }
        }

        out
    }
}

/// OpenType table checksum: the wrapping sum of big-endian u32 words,
/// with the data zero-padded to a multiple of four.
pub fn checksum(data: &[u8]) -> u32 {
    data.chunks(4).fold(0u32, |sum, chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum.wrapping_add(u32::from_be_bytes(word))
    })
}

fn search_params(num_tables: usize) -> (u16, u16, u16) {
    if num_tables == 0 {
        return (0, 0, 0);
    }
    let entry_selector = usize::BITS - 1 - num_tables.leading_zeros();
    let search_range = (1usize << entry_selector) * RECORD_LEN;
    let range_shift = num_tables * RECORD_LEN - search_range;
    (search_range as u16, entry_selector as u16, range_shift as u16)
}

pub(crate) fn align4(len: usize) -> usize {
    (len + 3) & !3
}

pub(crate) fn pad4(out: &mut Vec<u8>) {
    out.resize(align4(out.len()), 0);
}

pub(crate) fn read_u16(data: &[u8], offset: usize) -> Result<u16, FontError> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(FontError::Truncated(offset))
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> Result<u32, FontError> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(FontError::Truncated(offset))
}

pub(crate) fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Builds a small TrueType-flavored font for unit tests.
#[cfg(test)]
pub(crate) fn sample_font() -> Vec<u8> {
    let mut head = vec![0u8; 54];
    head[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
    head[12..16].copy_from_slice(&0x5F0F_3CF5u32.to_be_bytes());
    head[18..20].copy_from_slice(&1000u16.to_be_bytes());

    let mut maxp = vec![0u8; 6];
    maxp[0..4].copy_from_slice(&0x0000_5000u32.to_be_bytes());
    maxp[4..6].copy_from_slice(&1u16.to_be_bytes());

    let mut builder = SfntBuilder::new(TRUETYPE_FLAVOR);
    builder
        .insert(Tag::HEAD, head)
        .insert(Tag::MAXP, maxp)
        .insert(Tag(*b"name"), b"assetline test font name table".repeat(8))
        .insert(Tag::GLYF, vec![0u8; 12])
        .insert(Tag::LOCA, vec![0, 0, 0, 0, 0, 0, 0, 12]);
    builder.build()
}
