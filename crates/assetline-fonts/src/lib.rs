//! sfnt font tooling for the asset pipeline.
//!
//! Encodes TrueType/OpenType fonts as WOFF and WOFF2 and converts CFF-based
//! OpenType fonts to TrueType outlines.

pub mod otf;
pub mod sfnt;
pub mod woff;
pub mod woff2;

pub use otf::otf_to_ttf;
pub use sfnt::{FontError, Sfnt, SfntBuilder, Tag};
pub use woff::encode_woff;
pub use woff2::encode_woff2;
