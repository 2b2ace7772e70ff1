//! HDR encoder: header emission plus flat and RLE scanlines.

use crate::{float_to_rgbe, HdrImage, HDR_FORMAT_LINE, MAX_RLE_WIDTH, MIN_RLE_WIDTH, MIN_RUN_LENGTH};

/// Encode an image as a Radiance HDR byte stream.
///
/// Scanlines in the RLE-signable width range are run-length encoded
/// per channel plane; narrower or wider scanlines are written flat.
/// The output always round-trips through [`decode_hdr`].
///
/// [`decode_hdr`]: crate::decode_hdr
pub fn encode_hdr(image: &HdrImage) -> Vec<u8> {
    let mut buffer = Vec::new();
    encode_header(&mut buffer, image.width, image.height);
    for y in 0..image.height {
        encode_scanline(&mut buffer, image.scanline(y));
    }
    buffer
}

fn encode_header(buffer: &mut Vec<u8>, width: usize, height: usize) {
    buffer.extend_from_slice(b"#?RADIANCE\n");
    buffer.extend_from_slice(HDR_FORMAT_LINE.as_bytes());
    buffer.extend_from_slice(b"\n\n");
    buffer.extend_from_slice(format!("-Y {height} +X {width}\n").as_bytes());
}

fn encode_scanline(buffer: &mut Vec<u8>, scanline: &[[f32; 3]]) {
    let width = scanline.len();
    if width < MIN_RLE_WIDTH || width > MAX_RLE_WIDTH {
        for &pixel in scanline {
            buffer.extend_from_slice(&float_to_rgbe(pixel));
        }
    } else {
        encode_rle_scanline(buffer, scanline);
    }
}

fn encode_rle_scanline(buffer: &mut Vec<u8>, scanline: &[[f32; 3]]) {
    let width = scanline.len();
    buffer.extend_from_slice(&[2, 2, (width >> 8) as u8, (width & 0xff) as u8]);

    let mut planes = [const { Vec::new() }; 4];
    for &pixel in scanline {
        let rgbe = float_to_rgbe(pixel);
        for (plane, byte) in planes.iter_mut().zip(rgbe) {
            plane.push(byte);
        }
    }
    for plane in &planes {
        encode_rle_plane(buffer, plane);
    }
}

/// Greedy single-plane RLE: scan for the next run of at least
/// `MIN_RUN_LENGTH` equal bytes (capped at 127), flush everything
/// before it as raw chunks of at most 128 bytes, then emit the run.
fn encode_rle_plane(buffer: &mut Vec<u8>, plane: &[u8]) {
    let width = plane.len();
    let mut size = 0;
    while size < width {
        let mut run_begin = size;
        let mut run_count = 1;
        while run_begin < width {
            while run_begin + run_count < width
                && run_count < 127
                && plane[run_begin + run_count] == plane[run_begin]
            {
                run_count += 1;
            }
            if run_count < MIN_RUN_LENGTH {
                run_begin += run_count;
                run_count = 1;
            } else {
                break;
            }
        }

        while size < run_begin {
            let raw_count = (run_begin - size).min(128);
            buffer.push(raw_count as u8);
            buffer.extend_from_slice(&plane[size..size + raw_count]);
            size += raw_count;
        }

        if run_count >= MIN_RUN_LENGTH {
            buffer.push((run_count + 128) as u8);
            buffer.push(plane[run_begin]);
            size += run_count;
        }
    }
}
