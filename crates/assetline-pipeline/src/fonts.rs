//! Web font tasks: WOFF/WOFF2 encoding, the font include stylesheet and
//! OpenType to TrueType conversion.

use std::fs;
use std::io::ErrorKind;

use assetline_fonts::{encode_woff, encode_woff2, otf_to_ttf};
use rayon::prelude::*;

use crate::paths::{AssetKind, PathSpec};
use crate::task::{read_bytes, write_file, Artifact, Task, TaskError};

/// Encodes every TrueType font as WOFF and WOFF2.
#[derive(Debug, Default)]
pub struct FontTask;

impl Task for FontTask {
    fn name(&self) -> &'static str {
        "fonts"
    }

    fn run(&self, paths: &PathSpec) -> Result<Vec<Artifact>, TaskError> {
        let glob = &paths.src.fonts;

        let encoded: Vec<Vec<Artifact>> = glob
            .files()
            .par_iter()
            .map(|src| {
                let data = read_bytes(src)?;
                let (woff, woff2) = rayon::join(|| encode_woff(&data), || encode_woff2(&data));

                let base = paths.build.fonts.join(glob.relative(src));
                let mut written = Vec::with_capacity(2);
                for (font, extension) in [(woff, "woff"), (woff2, "woff2")] {
                    let font = font.map_err(|e| TaskError::transform(src, e))?;
                    let dest = base.with_extension(extension);
                    write_file(&dest, font)?;
                    written.push(Artifact::new(AssetKind::Fonts, dest));
                }
                Ok(written)
            })
            .collect::<Result<_, TaskError>>()?;

        Ok(encoded.into_iter().flatten().collect())
    }
}

/// Regenerates the SCSS font include file from the built fonts.
#[derive(Debug, Default)]
pub struct FontStyleTask;

impl Task for FontStyleTask {
    fn name(&self) -> &'static str {
        "fonts-style"
    }

    fn run(&self, paths: &PathSpec) -> Result<Vec<Artifact>, TaskError> {
        let fonts_dir = &paths.build.fonts;

        let mut files: Vec<String> = match fs::read_dir(fonts_dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                .filter_map(|e| e.file_name().to_str().map(str::to_string))
                .collect(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!("{} does not exist; run a build first", fonts_dir.display());
                Vec::new()
            }
            Err(e) => return Err(TaskError::read(fonts_dir, e)),
        };
        files.sort();

        let manifest: String = files.iter().map(|file| font_declaration(file)).collect();
        write_file(&paths.font_manifest, manifest)?;

        Ok(vec![Artifact::new(AssetKind::Css, paths.font_manifest.clone())])
    }
}

/// One `@include font(...)` line for a font file.
///
/// The family name is the file name up to its first dot.
pub fn font_declaration(file_name: &str) -> String {
    let family = file_name.split('.').next().unwrap_or(file_name);
    format!(
        "@include font(\"{}\", \"{}\", \"400\", \"regular\");\n",
        family, file_name
    )
}

/// Converts OpenType (CFF) fonts to TrueType next to their sources.
#[derive(Debug, Default)]
pub struct OtfTask;

impl Task for OtfTask {
    fn name(&self) -> &'static str {
        "otf2ttf"
    }

    fn run(&self, paths: &PathSpec) -> Result<Vec<Artifact>, TaskError> {
        let glob = &paths.otf_src;

        glob.files()
            .par_iter()
            .map(|src| {
                let data = read_bytes(src)?;
                let ttf = otf_to_ttf(&data).map_err(|e| TaskError::transform(src, e))?;

                let dest = paths.otf_out.join(glob.relative(src)).with_extension("ttf");
                write_file(&dest, ttf)?;
                Ok(Artifact::new(AssetKind::Fonts, dest))
            })
            .collect()
    }
}

/// A minimal TrueType font for pipeline tests.
#[cfg(test)]
pub(crate) fn truetype_font() -> Vec<u8> {
    use assetline_fonts::{SfntBuilder, Tag};

    let mut head = vec![0u8; 54];
    head[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
    head[12..16].copy_from_slice(&0x5F0F_3CF5u32.to_be_bytes());
    head[18..20].copy_from_slice(&1000u16.to_be_bytes());

    let mut builder = SfntBuilder::new(0x0001_0000);
    builder
        .insert(Tag::HEAD, head)
        .insert(Tag(*b"name"), b"pipeline font fixture ".repeat(16))
        .insert(Tag::GLYF, vec![0u8; 12])
        .insert(Tag::LOCA, vec![0, 0, 0, 0, 0, 0, 0, 12]);
    builder.build()
}
