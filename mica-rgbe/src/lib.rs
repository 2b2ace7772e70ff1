//! mica-rgbe: Radiance RGBE (.hdr) codec.
//!
//! RGBE packs a floating-point RGB pixel into four bytes: three 8-bit
//! mantissas sharing one 8-bit biased exponent. This crate decodes
//! and encodes the complete Radiance picture format around that pixel
//! encoding: an ASCII header followed by binary scanlines, each
//! scanline either flat (4 bytes per pixel) or new-style run-length
//! encoded (four independent channel planes).
//!
//! # Stream layout
//!
//! ```text
//! Header (ASCII, \n-terminated lines):
//!   #?RADIANCE                signature (any "#?" program name)
//!   FORMAT=32-bit_rle_rgbe    mandatory; GAMMA=/EXPOSURE=/comments ignored
//!                             blank line ends the header
//!   -Y <height> +X <width>    resolution (the only supported orientation)
//!
//! Scanline (width outside 8..=32767): flat, width x 4 RGBE bytes.
//! Scanline (otherwise): [2, 2, hi, lo] signature with hi < 128 and
//!   (hi << 8 | lo) == width, then four RLE channel planes (R, G, B,
//!   E). Plane opcodes: > 128 repeats the next byte (op - 128) times;
//!   <= 128 copies op raw bytes; 0 never occurs in valid input.
//! ```
//!
//! # Failure semantics
//!
//! Any header, opcode, or count inconsistency aborts the whole image:
//! the format is strict, ordered, and byte-exact, so there is no
//! partial decode and no recovery.
//!
//! # Usage
//!
//! ```
//! use mica_rgbe::{decode_hdr, encode_hdr, HdrImage};
//!
//! let image = HdrImage {
//!     width: 2,
//!     height: 1,
//!     pixels: vec![[0.5, 1.0, 2.0], [0.0, 0.0, 0.0]],
//! };
//! let bytes = encode_hdr(&image);
//! let decoded = decode_hdr(&bytes).unwrap();
//! assert_eq!(decoded.width, 2);
//! ```

mod decode;
mod encode;

pub use decode::decode_hdr;
pub use encode::encode_hdr;

// =============================================================================
// Constants
// =============================================================================

/// Mandatory header format declaration.
pub const HDR_FORMAT_LINE: &str = "FORMAT=32-bit_rle_rgbe";

/// Scanlines narrower than this are always flat-encoded.
pub(crate) const MIN_RLE_WIDTH: usize = 8;

/// Scanlines wider than this cannot carry the RLE width signature.
pub(crate) const MAX_RLE_WIDTH: usize = 0x7fff;

/// Runs shorter than this are emitted as raw copies when encoding.
pub(crate) const MIN_RUN_LENGTH: usize = 4;

/// Values below this encode as the all-zero pixel.
pub(crate) const RGBE_ZERO_THRESHOLD: f32 = 1e-32;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur while decoding an HDR stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RgbeError {
    /// The header violates the line grammar: bad signature, missing
    /// or wrong `FORMAT=`, an unrecognized header line, or a garbled
    /// resolution line.
    #[error("malformed HDR header: {0}")]
    MalformedHeader(String),

    /// The resolution line is well-formed but not `-Y <h> +X <w>`.
    #[error("unsupported HDR orientation (only `-Y <h> +X <w>` is supported)")]
    UnsupportedOrientation,

    /// An RLE opcode or count is inconsistent with the scanline width.
    #[error("corrupt HDR scanline")]
    CorruptScanline,

    /// The stream ended before the declared pixel data did.
    #[error("truncated HDR stream")]
    Truncated,

    /// Bytes remain after the last declared scanline.
    #[error("trailing bytes after HDR pixel data")]
    TrailingBytes,
}

// =============================================================================
// Image
// =============================================================================

/// A decoded HDR image: row-major scanlines of linear RGB.
///
/// `pixels.len()` must equal `width * height`; all components are
/// finite and non-negative.
#[derive(Debug, Clone, PartialEq)]
pub struct HdrImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<[f32; 3]>,
}

impl HdrImage {
    /// Scanline `y` as a slice of `width` pixels.
    pub fn scanline(&self, y: usize) -> &[[f32; 3]] {
        &self.pixels[y * self.width..(y + 1) * self.width]
    }
}

// =============================================================================
// Pixel conversions
// =============================================================================

/// Unpack one RGBE pixel to linear RGB.
///
/// A zero exponent byte means the exact black pixel; otherwise each
/// channel is `mantissa * 2^(exponent - 128) / 256`.
pub fn rgbe_to_float(rgbe: [u8; 4]) -> [f32; 3] {
    let [rm, gm, bm, eb] = rgbe;
    if eb == 0 {
        return [0.0, 0.0, 0.0];
    }
    let factor = 2f64.powi(eb as i32 - 128) / 256.0;
    [
        (rm as f64 * factor) as f32,
        (gm as f64 * factor) as f32,
        (bm as f64 * factor) as f32,
    ]
}

/// Pack one linear RGB pixel into RGBE.
///
/// The dominant channel is split into a power-of-two exponent and a
/// normalized mantissa; all three channels share the resulting 0-256
/// mantissa scale, and the exponent is biased by +128.
pub fn float_to_rgbe(rgb: [f32; 3]) -> [u8; 4] {
    let [rv, gv, bv] = rgb;
    let max_v = rv.max(gv).max(bv);
    if max_v < RGBE_ZERO_THRESHOLD {
        return [0, 0, 0, 0];
    }
    let (max_m, exponent) = frexp(max_v);
    let factor = (1.0 / max_v) * max_m * 256.0;
    [
        (rv * factor) as u8,
        (gv * factor) as u8,
        (bv * factor) as u8,
        (exponent + 128) as u8,
    ]
}

/// Split a positive normal float into mantissa in [0.5, 1) and a
/// power-of-two exponent, so `mantissa * 2^exponent` reproduces the
/// input. The zero threshold above keeps subnormals out.
fn frexp(value: f32) -> (f32, i32) {
    let bits = value.to_bits();
    let exponent = ((bits >> 23) & 0xff) as i32 - 126;
    let mantissa = f32::from_bits((bits & 0x807f_ffff) | (126 << 23));
    (mantissa, exponent)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_white_round_trips_exactly() {
        // frexp(1.0) = (0.5, 1), so the mantissa scale is 128 and the
        // biased exponent 129; unpacking gives 128 * 2 / 256 = 1.0.
        let rgbe = float_to_rgbe([1.0, 1.0, 1.0]);
        assert_eq!(rgbe, [128, 128, 128, 129]);
        assert_eq!(rgbe_to_float(rgbe), [1.0, 1.0, 1.0]);
    }

    #[test]
    fn below_threshold_is_exact_black() {
        assert_eq!(float_to_rgbe([1e-33, 0.0, 0.0]), [0, 0, 0, 0]);
        assert_eq!(rgbe_to_float([200, 10, 5, 0]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn shared_exponent_follows_dominant_channel() {
        let rgbe = float_to_rgbe([4.0, 1.0, 0.25]);
        // frexp(4.0) = (0.5, 3): scale 64, bias 131.
        assert_eq!(rgbe, [128, 32, 8, 131]);
        assert_eq!(rgbe_to_float(rgbe), [4.0, 1.0, 0.25]);
    }

    #[test]
    fn quantization_error_is_bounded_by_mantissa_unit() {
        for i in 0..1000 {
            let value = 0.001 + i as f32 * 9.87;
            let pixel = [value, value * 0.7, value * 0.1];
            let decoded = rgbe_to_float(float_to_rgbe(pixel));
            let unit = value / 128.0; // one mantissa step of the max channel
            for c in 0..3 {
                let error = (decoded[c] - pixel[c]).abs();
                assert!(
                    error <= unit + 1e-6,
                    "pixel {pixel:?} decoded {decoded:?}, channel {c} error {error}"
                );
            }
        }
    }

    #[test]
    fn frexp_matches_reference_points() {
        assert_eq!(frexp(1.0), (0.5, 1));
        assert_eq!(frexp(0.5), (0.5, 0));
        assert_eq!(frexp(6.0), (0.75, 3));
    }

    #[test]
    fn frexp_reconstructs_input() {
        for value in [1.0f32, 0.5, 6.0, 1e-20, 12345.678, 1e4] {
            let (mantissa, exponent) = frexp(value);
            assert!((0.5..1.0).contains(&mantissa));
            assert_eq!(mantissa * 2f32.powi(exponent), value);
        }
    }
}
