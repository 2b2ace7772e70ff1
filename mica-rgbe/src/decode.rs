//! HDR decoder: header grammar plus flat and RLE scanlines.
//!
//! Decoding is strict: any grammar violation, opcode inconsistency,
//! or size mismatch fails the whole image with no partial output.

use crate::{
    rgbe_to_float, HdrImage, RgbeError, HDR_FORMAT_LINE, MAX_RLE_WIDTH, MIN_RLE_WIDTH,
};

/// Decode a complete Radiance HDR byte stream.
///
/// # Errors
/// See [`RgbeError`]; every variant is terminal for the image.
pub fn decode_hdr(buffer: &[u8]) -> Result<HdrImage, RgbeError> {
    let mut cursor = 0usize;
    let (width, height) = decode_header(buffer, &mut cursor)?;

    let mut pixels = Vec::with_capacity(width * height);
    for _ in 0..height {
        decode_scanline(buffer, &mut cursor, width, &mut pixels)?;
    }
    if cursor != buffer.len() {
        return Err(RgbeError::TrailingBytes);
    }

    Ok(HdrImage {
        width,
        height,
        pixels,
    })
}

/// Read one `\n`-terminated ASCII line, advancing the cursor past the
/// terminator.
fn read_line<'a>(buffer: &'a [u8], cursor: &mut usize) -> Result<&'a str, RgbeError> {
    let rest = buffer.get(*cursor..).ok_or(RgbeError::Truncated)?;
    let end = rest
        .iter()
        .position(|&b| b == b'\n')
        .ok_or(RgbeError::Truncated)?;
    let line = &rest[..end];
    if !line.is_ascii() {
        return Err(RgbeError::MalformedHeader("non-ASCII line".to_string()));
    }
    *cursor += end + 1;
    std::str::from_utf8(line)
        .map_err(|_| RgbeError::MalformedHeader("non-ASCII line".to_string()))
}

/// Parse the header and resolution line, returning (width, height).
fn decode_header(buffer: &[u8], cursor: &mut usize) -> Result<(usize, usize), RgbeError> {
    let signature = read_line(buffer, cursor)?;
    if !signature.starts_with("#?") {
        return Err(RgbeError::MalformedHeader(format!(
            "bad signature line {signature:?}"
        )));
    }

    let mut format_found = false;
    loop {
        let line = read_line(buffer, cursor)?;
        if line.is_empty() {
            break;
        } else if line.starts_with("FORMAT=") {
            if line != HDR_FORMAT_LINE {
                return Err(RgbeError::MalformedHeader(format!(
                    "unsupported format {line:?}"
                )));
            }
            format_found = true;
        } else if line.starts_with("GAMMA=") || line.starts_with("EXPOSURE=") {
            // Accepted and ignored; pixel values stay as stored.
        } else if line.starts_with('#') {
            // Comment.
        } else {
            return Err(RgbeError::MalformedHeader(format!(
                "unknown header line {line:?}"
            )));
        }
    }
    if !format_found {
        return Err(RgbeError::MalformedHeader(
            "missing FORMAT= line".to_string(),
        ));
    }

    decode_resolution(read_line(buffer, cursor)?)
}

/// An axis token is a sign followed by X or Y.
fn is_axis_token(token: &str) -> bool {
    matches!(token, "-Y" | "+Y" | "-X" | "+X")
}

fn decode_resolution(line: &str) -> Result<(usize, usize), RgbeError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let [axis_a, dim_a, axis_b, dim_b] = tokens.as_slice() else {
        return Err(RgbeError::MalformedHeader(format!(
            "bad resolution line {line:?}"
        )));
    };
    if !(is_axis_token(axis_a) && is_axis_token(axis_b)) {
        return Err(RgbeError::MalformedHeader(format!(
            "bad resolution line {line:?}"
        )));
    }
    if *axis_a != "-Y" || *axis_b != "+X" {
        return Err(RgbeError::UnsupportedOrientation);
    }
    let height: usize = dim_a
        .parse()
        .map_err(|_| RgbeError::MalformedHeader(format!("bad height {dim_a:?}")))?;
    let width: usize = dim_b
        .parse()
        .map_err(|_| RgbeError::MalformedHeader(format!("bad width {dim_b:?}")))?;
    if width == 0 || height == 0 {
        return Err(RgbeError::MalformedHeader(format!(
            "degenerate resolution {width}x{height}"
        )));
    }
    Ok((width, height))
}

/// Decode one scanline, appending `width` pixels.
///
/// Widths outside the RLE-signable range are always flat; otherwise
/// the 4-byte peek decides, falling back to flat when it is not the
/// `[2, 2, hi, lo]` signature.
fn decode_scanline(
    buffer: &[u8],
    cursor: &mut usize,
    width: usize,
    pixels: &mut Vec<[f32; 3]>,
) -> Result<(), RgbeError> {
    if width < MIN_RLE_WIDTH || width > MAX_RLE_WIDTH {
        return decode_flat_scanline(buffer, cursor, width, pixels);
    }
    let peek = buffer
        .get(*cursor..*cursor + 4)
        .ok_or(RgbeError::Truncated)?;
    if peek[0] != 2 || peek[1] != 2 || peek[2] & 0x80 != 0 {
        return decode_flat_scanline(buffer, cursor, width, pixels);
    }
    if ((peek[2] as usize) << 8) | peek[3] as usize != width {
        return Err(RgbeError::CorruptScanline);
    }
    *cursor += 4;
    decode_rle_scanline(buffer, cursor, width, pixels)
}

fn decode_flat_scanline(
    buffer: &[u8],
    cursor: &mut usize,
    width: usize,
    pixels: &mut Vec<[f32; 3]>,
) -> Result<(), RgbeError> {
    let bytes = buffer
        .get(*cursor..*cursor + width * 4)
        .ok_or(RgbeError::Truncated)?;
    for rgbe in bytes.chunks_exact(4) {
        pixels.push(rgbe_to_float([rgbe[0], rgbe[1], rgbe[2], rgbe[3]]));
    }
    *cursor += width * 4;
    Ok(())
}

/// Decode the four RLE channel planes (R, G, B, E) of one scanline.
fn decode_rle_scanline(
    buffer: &[u8],
    cursor: &mut usize,
    width: usize,
    pixels: &mut Vec<[f32; 3]>,
) -> Result<(), RgbeError> {
    let mut planes = [const { Vec::new() }; 4];
    for plane in &mut planes {
        *plane = decode_rle_plane(buffer, cursor, width)?;
    }
    for i in 0..width {
        pixels.push(rgbe_to_float([
            planes[0][i],
            planes[1][i],
            planes[2][i],
            planes[3][i],
        ]));
    }
    Ok(())
}

fn decode_rle_plane(
    buffer: &[u8],
    cursor: &mut usize,
    width: usize,
) -> Result<Vec<u8>, RgbeError> {
    let mut plane = vec![0u8; width];
    let mut size = 0usize;
    while size < width {
        let opcode = *buffer.get(*cursor).ok_or(RgbeError::Truncated)?;
        *cursor += 1;
        if opcode > 128 {
            let count = (opcode - 128) as usize;
            if size + count > width {
                return Err(RgbeError::CorruptScanline);
            }
            let value = *buffer.get(*cursor).ok_or(RgbeError::Truncated)?;
            *cursor += 1;
            plane[size..size + count].fill(value);
            size += count;
        } else {
            let count = opcode as usize;
            if count == 0 || size + count > width {
                return Err(RgbeError::CorruptScanline);
            }
            let bytes = buffer
                .get(*cursor..*cursor + count)
                .ok_or(RgbeError::Truncated)?;
            plane[size..size + count].copy_from_slice(bytes);
            *cursor += count;
            size += count;
        }
    }
    Ok(plane)
}
