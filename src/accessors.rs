//! Typed reads over a buffered [`Frame`]'s payload.
//!
//! Integer/float readers treat the payload as little-endian (every binary
//! protocol hosting them — Unicore binary, u-blox, SBF, SPARTN — is
//! little-endian on the wire); RTCM's payload is read in MSB-first bit order
//! instead, via [`get_unsigned_bits`]/[`get_signed_bits`]. All readers are
//! side-effect-free: repeated calls over the same frame return identical
//! results, and nothing here mutates a [`ParseState`](crate::state::ParseState).
use crate::state::Frame;

fn read<const N: usize>(bytes: &[u8]) -> Option<[u8; N]> {
    bytes.get(..N)?.try_into().ok()
}

macro_rules! le_reader {
    ($name:ident, $no_offset:ident, $ty:ty) => {
        #[doc = concat!(
            "Reads a little-endian `", stringify!($ty), "` at `frame.payload()[offset..]`."
        )]
        pub fn $name(frame: &Frame<'_>, offset: usize) -> Option<$ty> {
            let bytes = frame.payload().get(offset..)?;
            read(bytes).map(<$ty>::from_le_bytes)
        }

        #[doc = concat!(
            "Reads a little-endian `", stringify!($ty), "` at `frame.raw()[offset..]`, ",
            "ignoring the protocol's payload offset."
        )]
        pub fn $no_offset(frame: &Frame<'_>, offset: usize) -> Option<$ty> {
            let bytes = frame.raw().get(offset..)?;
            read(bytes).map(<$ty>::from_le_bytes)
        }
    };
}

le_reader!(get_u8, get_u8_no_offset, u8);
le_reader!(get_u16, get_u16_no_offset, u16);
le_reader!(get_u32, get_u32_no_offset, u32);
le_reader!(get_u64, get_u64_no_offset, u64);
le_reader!(get_i8, get_i8_no_offset, i8);
le_reader!(get_i16, get_i16_no_offset, i16);
le_reader!(get_i32, get_i32_no_offset, i32);
le_reader!(get_i64, get_i64_no_offset, i64);
le_reader!(get_f32, get_f32_no_offset, f32);
le_reader!(get_f64, get_f64_no_offset, f64);

/// Reads a NUL-terminated ASCII/UTF-8 string starting at
/// `frame.payload()[offset..]`; `None` if no NUL terminator is present in
/// the remainder of the frame or the bytes are not valid UTF-8.
pub fn get_string<'a>(frame: &Frame<'a>, offset: usize) -> Option<&'a str> {
    let region = frame.payload().get(offset..)?;
    let end = region.iter().position(|&b| b == 0)?;
    std::str::from_utf8(&region[..end]).ok()
}

/// The NMEA/hash-sentence name: the ASCII run between the leading preamble
/// character (`$`/`#`, already excluded by `payload_offset == 1`) and the
/// first comma. Works directly off a raw buffered frame, so it is usable
/// before a [`Frame`] view even exists (e.g. in tests constructing raw byte
/// vectors), hence the free-function `&[u8]` signature rather than `Frame`.
pub fn sentence_name(raw_frame: &[u8]) -> Option<&str> {
    let body = raw_frame.get(1..)?;
    let comma = body.iter().position(|&b| b == b',')?;
    std::str::from_utf8(&body[..comma]).ok()
}

/// Reads `width` (1..=32) bits MSB-first from `payload`, starting at bit
/// `start` (bit 0 is the MSB of `payload[0]`) — RTCM's bit-packed field
/// layout.
pub fn get_unsigned_bits(payload: &[u8], start: usize, width: usize) -> Option<u32> {
    if width == 0 || width > 32 {
        return None;
    }
    if (start + width + 7) / 8 > payload.len() {
        return None;
    }
    let mut value: u32 = 0;
    for i in 0..width {
        let bit_index = start + i;
        let byte = payload[bit_index / 8];
        let bit = (byte >> (7 - (bit_index % 8))) & 1;
        value = (value << 1) | u32::from(bit);
    }
    Some(value)
}

/// As [`get_unsigned_bits`], sign-extended from the top bit of the
/// extracted field.
pub fn get_signed_bits(payload: &[u8], start: usize, width: usize) -> Option<i32> {
    let unsigned = get_unsigned_bits(payload, start, width)?;
    if width == 32 {
        return Some(unsigned as i32);
    }
    let sign_bit = 1u32 << (width - 1);
    Some(if unsigned & sign_bit != 0 {
        (unsigned as i64 - (1i64 << width)) as i32
    } else {
        unsigned as i32
    })
}
