//! Text encoding helpers: CP-1252 transcoding, ligature decoding, and the
//! base32 variant used by `kindle:` URIs.

use crate::error::{Error, Result};

/// Convert CP-1252 bytes to a UTF-8 string.
///
/// Uses the WHATWG windows-1252 mapping, which covers the 0x80..0x9F block
/// the ISO-8859-1 table leaves undefined.
pub fn cp1252_to_utf8(input: &[u8]) -> String {
    let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(input);
    decoded.into_owned()
}

/// Decode a two-byte ligature marker into a single CP-1252 byte.
///
/// Index labels encode OE/oe/AE/ae/ss ligatures as a control byte (1..=5)
/// followed by the base character. Returns 0 when the pair is not a
/// ligature.
pub fn ligature_to_cp1252(byte1: u8, byte2: u8) -> u8 {
    match (byte1, byte2) {
        (1, b'E') => 0x8C, // OE
        (2, b'e') => 0x9C, // oe
        (3, b'E') => 0xC6, // AE
        (4, b'e') => 0xE6, // ae
        (5, b's') => 0xDF, // ss
        _ => 0,
    }
}

/// Decode a two-byte ligature marker into a UTF-16 code point.
/// Returns 0 when the pair is not a ligature.
pub fn ligature_to_utf16(byte1: u16, byte2: u16) -> u16 {
    match (byte1, byte2) {
        (1, 0x45) => 0x152, // OE
        (2, 0x65) => 0x153, // oe
        (3, 0x45) => 0xC6,  // AE
        (4, 0x65) => 0xE6,  // ae
        (5, 0x73) => 0xDF,  // ss
        _ => 0,
    }
}

/// Decode the Kindle base32 variant (alphabet `0-9A-V`, case-insensitive)
/// used by `kindle:pos`/`kindle:flow`/`kindle:embed` tokens.
pub fn base32_decode(encoded: &str) -> Result<u32> {
    let mut result: u32 = 0;
    for c in encoded.bytes() {
        let val = match c {
            b'0'..=b'9' => u32::from(c - b'0'),
            b'A'..=b'V' => u32::from(c - b'A') + 10,
            b'a'..=b'v' => u32::from(c - b'a') + 10,
            _ => {
                return Err(Error::corrupt(format!(
                    "invalid base32 character: {:#04x}",
                    c
                )));
            }
        };
        result = result
            .checked_mul(32)
            .and_then(|r| r.checked_add(val))
            .ok_or_else(|| Error::corrupt("base32 value overflow"))?;
    }
    Ok(result)
}

/// Population count of a bitmask byte.
#[inline]
pub fn bitcount(byte: u8) -> u32 {
    byte.count_ones()
}
