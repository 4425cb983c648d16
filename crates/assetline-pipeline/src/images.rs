//! Image pipeline: WebP variants, then optimized originals.

use std::panic;
use std::path::Path;

use image::DynamicImage;
use mozjpeg::{ColorSpace, Compress};
use oxipng::{Interlacing, Options};
use rayon::prelude::*;

use crate::paths::{AssetKind, PathSpec};
use crate::svg;
use crate::task::{read_bytes, write_file, Artifact, Task, TaskError};

/// Lossy WebP quality.
pub const WEBP_QUALITY: f32 = 70.0;

/// JPEG re-encode quality.
pub const JPEG_QUALITY: f32 = 75.0;

/// oxipng preset, the optipng `-o` level.
pub const PNG_OPTIMIZATION_LEVEL: u8 = 3;

/// Formats rasterized to WebP by the first pass.
const WEBP_SOURCES: [&str; 5] = ["jpg", "jpeg", "png", "gif", "ico"];

/// Writes a `.webp` variant of every raster image, then an optimized copy
/// of every image in its original format.
#[derive(Debug, Default)]
pub struct ImageTask;

impl Task for ImageTask {
    fn name(&self) -> &'static str {
        "images"
    }

    fn run(&self, paths: &PathSpec) -> Result<Vec<Artifact>, TaskError> {
        let glob = &paths.src.img;
        let sources = glob.files();
        let out = &paths.build.img;

        let mut artifacts: Vec<Artifact> = sources
            .par_iter()
            .filter(|src| WEBP_SOURCES.contains(&extension(src).as_str()))
            .map(|src| {
                let dest = out.join(glob.relative(src)).with_extension("webp");
                let bytes = read_bytes(src)?;
                let encoded = encode_webp(&bytes).map_err(|e| TaskError::transform(src, e))?;
                write_file(&dest, encoded)?;
                Ok(Artifact::new(AssetKind::Img, dest))
            })
            .collect::<Result<_, TaskError>>()?;

        tracing::debug!("Encoded {} WebP images", artifacts.len());

        let optimized: Vec<Artifact> = sources
            .par_iter()
            .map(|src| {
                let dest = out.join(glob.relative(src));
                let bytes = read_bytes(src)?;
                let optimized = optimize(&bytes, &extension(src))
                    .map_err(|e| TaskError::transform(src, e))?;

                if optimized.len() < bytes.len() {
                    tracing::debug!(
                        "{}: {} -> {} bytes",
                        src.display(),
                        bytes.len(),
                        optimized.len()
                    );
                    write_file(&dest, optimized)?;
                } else {
                    write_file(&dest, bytes)?;
                }
                Ok(Artifact::minified(AssetKind::Img, dest))
            })
            .collect::<Result<_, TaskError>>()?;

        artifacts.extend(optimized);
        Ok(artifacts)
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Decode a raster image and encode it as lossy WebP.
pub fn encode_webp(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let decoded = image::load_from_memory(bytes).map_err(|e| e.to_string())?;
    let rgba = DynamicImage::ImageRgba8(decoded.to_rgba8());

    let encoder = webp::Encoder::from_image(&rgba).map_err(|e| e.to_string())?;
    Ok(encoder.encode(WEBP_QUALITY).to_vec())
}

/// Optimize an image in its own format.
///
/// PNGs are interlaced and recompressed losslessly, JPEGs are re-encoded as
/// progressive. The result may be larger than the input; callers keep
/// whichever is smaller.
pub fn optimize(bytes: &[u8], extension: &str) -> Result<Vec<u8>, String> {
    match extension {
        "png" => {
            let mut options = Options::from_preset(PNG_OPTIMIZATION_LEVEL);
            options.interlace = Some(Interlacing::Adam7);
            oxipng::optimize_from_memory(bytes, &options).map_err(|e| e.to_string())
        }
        "jpg" | "jpeg" => {
            let decoded = image::load_from_memory(bytes).map_err(|e| e.to_string())?;
            encode_progressive_jpeg(&decoded)
        }
        "svg" => {
            let source = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
            Ok(svg::optimize(source).into_bytes())
        }
        _ => Ok(bytes.to_vec()),
    }
}

/// libjpeg reports errors by unwinding, so the encoder runs under
/// `catch_unwind`.
fn encode_progressive_jpeg(image: &DynamicImage) -> Result<Vec<u8>, String> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    let encoded = panic::catch_unwind(|| -> std::io::Result<Vec<u8>> {
        let mut compress = Compress::new(ColorSpace::JCS_RGB);
        compress.set_size(width as usize, height as usize);
        compress.set_quality(JPEG_QUALITY);
        compress.set_progressive_mode();

        let mut started = compress.start_compress(Vec::new())?;
        started.write_scanlines(rgb.as_raw())?;
        started.finish()
    })
    .map_err(|_| "JPEG encoder failed".to_string())?;

    encoded.map_err(|e| e.to_string())
}
