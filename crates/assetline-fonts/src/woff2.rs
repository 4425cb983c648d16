//! WOFF2 encoding.
//!
//! Tables are stored with the null transform, including `glyf` and `loca`
//! (transform version 3), and compressed as a single brotli stream. The
//! directory is in tag order except that `loca` directly follows `glyf`.

use std::io::Write;

use crate::sfnt::{pad4, push_u16, push_u32, FontError, Sfnt, TableRecord, Tag};

const SIGNATURE: &[u8; 4] = b"wOF2";

/// Brotli quality and window size.
const BROTLI_QUALITY: u32 = 11;
const BROTLI_LGWIN: u32 = 22;

/// Table tags with a one-byte encoding in the table directory.
const KNOWN_TAGS: [&[u8; 4]; 63] = [
    b"cmap", b"head", b"hhea", b"hmtx", b"maxp", b"name", b"OS/2", b"post", b"cvt ", b"fpgm",
    b"glyf", b"loca", b"prep", b"CFF ", b"VORG", b"EBDT", b"EBLC", b"gasp", b"hdmx", b"kern",
    b"LTSH", b"PCLT", b"VDMX", b"vhea", b"vmtx", b"BASE", b"GDEF", b"GPOS", b"GSUB", b"EBSC",
    b"JSTF", b"MATH", b"CBDT", b"CBLC", b"COLR", b"CPAL", b"SVG ", b"sbix", b"acnt", b"avar",
    b"bdat", b"bloc", b"bsln", b"cvar", b"fdsc", b"feat", b"fmtx", b"fvar", b"gvar", b"hsty",
    b"just", b"lcar", b"mort", b"morx", b"opbd", b"prop", b"trak", b"Zapf", b"Silf", b"Glat",
    b"Gloc", b"Feat", b"Sill",
];

/// Index value meaning "arbitrary tag follows".
const CUSTOM_TAG: u8 = 0x3f;

/// Transform version 3 on glyf/loca means no transform.
const NULL_GLYF_TRANSFORM: u8 = 3 << 6;

/// Encode an sfnt font as WOFF2.
pub fn encode_woff2(font_data: &[u8]) -> Result<Vec<u8>, FontError> {
    let font = Sfnt::parse(font_data)?;

    let tables = stream_order(&font);

    let mut directory = Vec::new();
    let mut stream = Vec::new();
    for table in &tables {
        write_entry(&mut directory, table.tag, table.data.len() as u32);
        stream.extend_from_slice(table.data);
    }

    let compressed = brotli_compress(&stream)?;

    let mut out = Vec::with_capacity(48 + directory.len() + compressed.len() + 3);
    out.extend_from_slice(SIGNATURE);
    push_u32(&mut out, font.flavor);
    // length, patched once the padded size is known
    push_u32(&mut out, 0);
    push_u16(&mut out, tables.len() as u16);
    push_u16(&mut out, 0);
    push_u32(&mut out, font.sfnt_size());
    push_u32(&mut out, compressed.len() as u32);
    // majorVersion, minorVersion
    push_u16(&mut out, 1);
    push_u16(&mut out, 0);
    // metaOffset, metaLength, metaOrigLength, privOffset, privLength
    for _ in 0..5 {
        push_u32(&mut out, 0);
    }
    out.extend_from_slice(&directory);
    out.extend_from_slice(&compressed);
    pad4(&mut out);

    let total_len = out.len() as u32;
    out[8..12].copy_from_slice(&total_len.to_be_bytes());

    tracing::debug!(
        "WOFF2: {} tables, {} -> {} bytes",
        tables.len(),
        font_data.len(),
        out.len()
    );

    Ok(out)
}

/// Tag order, with `loca` moved right behind `glyf`.
fn stream_order<'a>(font: &Sfnt<'a>) -> Vec<TableRecord<'a>> {
    let mut tables = font.tables.clone();
    tables.sort_by_key(|t| t.tag);

    let loca = tables.iter().position(|t| t.tag == Tag::LOCA);
    if let Some(loca) = loca {
        let record = tables.remove(loca);
        match tables.iter().position(|t| t.tag == Tag::GLYF) {
            Some(glyf) => tables.insert(glyf + 1, record),
            None => tables.insert(loca, record),
        }
    }

    tables
}

fn write_entry(out: &mut Vec<u8>, tag: Tag, orig_len: u32) {
    let index = KNOWN_TAGS.iter().position(|known| **known == tag.0);

    let mut flags = index.map(|i| i as u8).unwrap_or(CUSTOM_TAG);
    if tag == Tag::GLYF || tag == Tag::LOCA {
        flags |= NULL_GLYF_TRANSFORM;
    }

    out.push(flags);
    if index.is_none() {
        out.extend_from_slice(&tag.0);
    }
    push_base128(out, orig_len);
}

/// Write a `UIntBase128`: big-endian groups of seven bits, the high bit
/// set on every byte but the last.
fn push_base128(out: &mut Vec<u8>, value: u32) {
    let mut groups = [0u8; 5];
    let mut len = 0;
    let mut rest = value;
    loop {
        groups[len] = (rest & 0x7f) as u8;
        len += 1;
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }

    for i in (0..len).rev() {
        let continuation = if i == 0 { 0 } else { 0x80 };
        out.push(groups[i] | continuation);
    }
}

fn brotli_compress(data: &[u8]) -> Result<Vec<u8>, FontError> {
    let mut writer = brotli::CompressorWriter::new(Vec::new(), 4096, BROTLI_QUALITY, BROTLI_LGWIN);
    writer.write_all(data)?;
    writer.flush()?;
    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::sfnt::{read_u16, read_u32, sample_font, SfntBuilder};

    /// Minimal decoder for null-transformed fonts: directory, stream, then
    /// the tables reassembled into an sfnt.
    fn decode(woff2: &[u8]) -> Vec<u8> {
        assert_eq!(&woff2[0..4], SIGNATURE);
        let flavor = read_u32(woff2, 4).unwrap();
        let num_tables = read_u16(woff2, 12).unwrap() as usize;
        let compressed_len = read_u32(woff2, 20).unwrap() as usize;

        let mut pos = 48;
        let mut entries = Vec::new();
        for _ in 0..num_tables {
            let flags = woff2[pos];
            pos += 1;
            let tag = match (flags & 0x3f) as usize {
                index if index < KNOWN_TAGS.len() => Tag(*KNOWN_TAGS[index]),
                _ => {
                    let tag = Tag(woff2[pos..pos + 4].try_into().unwrap());
                    pos += 4;
                    tag
                }
            };
            let transform = flags >> 6;
            if tag == Tag::GLYF || tag == Tag::LOCA {
                assert_eq!(transform, 3, "{} must use the null transform", tag);
            } else {
                assert_eq!(transform, 0);
            }

            let mut length = 0u32;
            loop {
                let byte = woff2[pos];
                pos += 1;
                length = (length << 7) | u32::from(byte & 0x7f);
                if byte & 0x80 == 0 {
                    break;
                }
            }
            entries.push((tag, length as usize));
        }

        let mut stream = Vec::new();
        brotli::Decompressor::new(&woff2[pos..pos + compressed_len], 4096)
            .read_to_end(&mut stream)
            .unwrap();

        let mut builder = SfntBuilder::new(flavor);
        let mut offset = 0;
        for (tag, length) in entries {
            builder.insert(tag, stream[offset..offset + length].to_vec());
            offset += length;
        }
        assert_eq!(offset, stream.len());
        builder.build()
    }

    fn base128(value: u32) -> Vec<u8> {
        let mut out = Vec::new();
        push_base128(&mut out, value);
        out
    }

    #[test]
    fn encodes_base128() {
        assert_eq!(base128(0), vec![0x00]);
        assert_eq!(base128(127), vec![0x7f]);
        assert_eq!(base128(128), vec![0x81, 0x00]);
        assert_eq!(base128(63_000), vec![0x83, 0xec, 0x18]);
    }

    #[test]
    fn known_tags_use_single_byte_flags() {
        let mut out = Vec::new();
        write_entry(&mut out, Tag(*b"cmap"), 10);
        assert_eq!(out, vec![0x00, 10]);

        let mut out = Vec::new();
        write_entry(&mut out, Tag::GLYF, 10);
        assert_eq!(out, vec![10 | 0xc0, 10]);

        let mut out = Vec::new();
        write_entry(&mut out, Tag(*b"DSIG"), 10);
        assert_eq!(out, vec![0x3f, b'D', b'S', b'I', b'G', 10]);
    }

    #[test]
    fn stream_decompresses_to_concatenated_tables() {
        let font_data = sample_font();
        let font = Sfnt::parse(&font_data).unwrap();
        let woff2 = encode_woff2(&font_data).unwrap();

        assert_eq!(&woff2[0..4], b"wOF2");
        assert_eq!(read_u32(&woff2, 8).unwrap() as usize, woff2.len());
        assert_eq!(read_u16(&woff2, 12).unwrap(), 5);
        assert_eq!(read_u32(&woff2, 16).unwrap() as usize, font_data.len());

        let compressed_len = read_u32(&woff2, 20).unwrap() as usize;
        let mut directory_len = 0;
        for table in &font.tables {
            let mut entry = Vec::new();
            write_entry(&mut entry, table.tag, table.data.len() as u32);
            directory_len += entry.len();
        }
        let stream_start = 48 + directory_len;
        assert_eq!(woff2.len(), (stream_start + compressed_len + 3) & !3);

        let mut decoded = Vec::new();
        brotli::Decompressor::new(&woff2[stream_start..stream_start + compressed_len], 4096)
            .read_to_end(&mut decoded)
            .unwrap();

        let tables = stream_order(&font);
        let expected: Vec<u8> = tables.iter().flat_map(|t| t.data.iter().copied()).collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn loca_directly_follows_glyf() {
        let font_data = sample_font();
        let font = Sfnt::parse(&font_data).unwrap();

        let order: Vec<Tag> = stream_order(&font).iter().map(|t| t.tag).collect();
        assert_eq!(
            order,
            vec![Tag::GLYF, Tag::LOCA, Tag::HEAD, Tag::MAXP, Tag(*b"name")]
        );
    }

    #[test]
    fn decodes_back_to_the_same_tables() {
        let font_data = sample_font();
        let decoded = decode(&encode_woff2(&font_data).unwrap());

        let original = Sfnt::parse(&font_data).unwrap();
        let restored = Sfnt::parse(&decoded).unwrap();
        assert_eq!(restored.flavor, original.flavor);
        assert_eq!(restored.tables.len(), original.tables.len());
        for table in &original.tables {
            assert_eq!(restored.table(table.tag), Some(table.data), "{}", table.tag);
        }
        assert_eq!(decoded, font_data);
    }
}
