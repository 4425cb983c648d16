//! WOFF 1.0 encoding.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::sfnt::{pad4, push_u16, push_u32, FontError, Sfnt};

const SIGNATURE: &[u8; 4] = b"wOFF";
const HEADER_LEN: usize = 44;
const ENTRY_LEN: usize = 20;

/// Encode an sfnt font as WOFF 1.0.
///
/// Every table is zlib-compressed and stored compressed only when that
/// makes it smaller.
pub fn encode_woff(font_data: &[u8]) -> Result<Vec<u8>, FontError> {
    let font = Sfnt::parse(font_data)?;

    let mut tables = font.tables.clone();
    tables.sort_by_key(|t| t.tag);

    let data_start = HEADER_LEN + ENTRY_LEN * tables.len();
    let mut directory = Vec::with_capacity(ENTRY_LEN * tables.len());
    let mut body = Vec::new();

    for table in &tables {
        let compressed = zlib(table.data)?;
        let stored: &[u8] = if compressed.len() < table.data.len() {
            &compressed
        } else {
            table.data
        };

        directory.extend_from_slice(&table.tag.0);
        push_u32(&mut directory, (data_start + body.len()) as u32);
        push_u32(&mut directory, stored.len() as u32);
        push_u32(&mut directory, table.data.len() as u32);
        push_u32(&mut directory, table.checksum);

        body.extend_from_slice(stored);
        pad4(&mut body);
    }

    let total_len = data_start + body.len();

    let mut out = Vec::with_capacity(total_len);
    out.extend_from_slice(SIGNATURE);
    push_u32(&mut out, font.flavor);
    push_u32(&mut out, total_len as u32);
    push_u16(&mut out, tables.len() as u16);
    push_u16(&mut out, 0);
    push_u32(&mut out, font.sfnt_size());
    // majorVersion, minorVersion
    push_u16(&mut out, 1);
    push_u16(&mut out, 0);
    // metaOffset, metaLength, metaOrigLength, privOffset, privLength
    for _ in 0..5 {
        push_u32(&mut out, 0);
    }
    out.extend_from_slice(&directory);
    out.extend_from_slice(&body);

    tracing::debug!(
        "WOFF: {} tables, {} -> {} bytes",
        tables.len(),
        font_data.len(),
        out.len()
    );

    Ok(out)
}

fn zlib(data: &[u8]) -> Result<Vec<u8>, FontError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
