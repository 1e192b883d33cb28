//! Raster image type and the external decoder seam, grounded in the
//! "Exceptions via setjmp/longjmp" design note: real-world image codecs
//! (JPEG, PNG, ...) are explicitly out of scope for this crate, so
//! decoding is an injected trait rather than a bundled dependency.

use std::fmt;

#[derive(Debug)]
pub struct DecodeError(pub String);

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image decode failed: {}", self.0)
    }
}

impl std::error::Error for DecodeError {}

/// Owned, decoded raster: tightly packed 8-bit sRGB, row-major, no padding.
pub struct RgbImage {
    pub cols: u32,
    pub rows: u32,
    pub pixels: Vec<u8>,
}

impl RgbImage {
    pub fn as_image(&self) -> crate::signature::Image<'_> {
        crate::signature::Image { cols: self.cols, rows: self.rows, pixels: &self.pixels }
    }
}

/// Codec plug-in point. The binary crate wires a real decoder (or several,
/// dispatched by file extension/magic) into the indexer; this crate only
/// needs the trait and a trivial built-in implementation for round-trip
/// tests.
pub trait ThumbnailDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<RgbImage, DecodeError>;
}

/// Decodes a raw packed-RGB test fixture: `u32 cols`, `u32 rows`, then
/// `cols * rows * 3` bytes, all little-endian. Not a real image format;
/// exists so the rest of the crate can be exercised without pulling in an
/// actual codec dependency.
pub struct RawRgbDecoder;

impl ThumbnailDecoder for RawRgbDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<RgbImage, DecodeError> {
        if bytes.len() < 8 {
            return Err(DecodeError("truncated header".into()));
        }
        let cols = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let rows = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let expected = 8 + cols as usize * rows as usize * 3;
        if bytes.len() != expected {
            return Err(DecodeError(format!("expected {} bytes, got {}", expected, bytes.len())));
        }
        Ok(RgbImage { cols, rows, pixels: bytes[8..].to_vec() })
    }
}

pub fn encode_raw_rgb(img: &RgbImage) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + img.pixels.len());
    out.extend_from_slice(&img.cols.to_le_bytes());
    out.extend_from_slice(&img.rows.to_le_bytes());
    out.extend_from_slice(&img.pixels);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_rgb_round_trips() {
        let img = RgbImage { cols: 4, rows: 3, pixels: (0..36).map(|i| i as u8).collect() };
        let bytes = encode_raw_rgb(&img);
        let decoded = RawRgbDecoder.decode(&bytes).unwrap();
        assert_eq!(decoded.cols, 4);
        assert_eq!(decoded.rows, 3);
        assert_eq!(decoded.pixels, img.pixels);
    }

    #[test]
    fn rejects_truncated_input() {
        let result = RawRgbDecoder.decode(&[1, 2, 3]);
        assert!(result.is_err());
    }
}
