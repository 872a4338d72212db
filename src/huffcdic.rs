//! HUFF/CDIC decompression.
//!
//! Huffman-compressed MOBI text carries one HUFF record (the code tables)
//! followed by CDIC records (the symbol dictionaries). Symbols may
//! themselves be Huffman streams; expansion recurses with a bounded depth
//! so crafted dictionaries cannot loop forever.

use crate::buffer::Reader;
use crate::error::{Error, Result};

pub const HUFF_MAGIC: &[u8] = b"HUFF";
pub const CDIC_MAGIC: &[u8] = b"CDIC";
pub const HUFF_HEADER_LEN: usize = 24;
pub const CDIC_HEADER_LEN: usize = 16;
/// A HUFF record must at least hold its header and both code tables.
pub const HUFF_RECORD_MINSIZE: usize = HUFF_HEADER_LEN + 256 * 4 + 64 * 4;

const MAX_RECURSION_DEPTH: usize = 15;
const MAX_CDIC_CODE_BITS: u32 = 24;

/// Parsed HUFF/CDIC state for one document.
pub struct HuffCdic {
    table1: [u32; 256],
    mincode_table: [u32; 33],
    maxcode_table: [u32; 33],
    index_count: usize,
    code_length: u32,
    symbol_offsets: Vec<u16>,
    /// One payload block per CDIC record, starting after its header.
    symbols: Vec<Vec<u8>>,
}

impl HuffCdic {
    /// Parse a HUFF record and its CDIC records.
    pub fn from_records(huff: &[u8], cdics: &[&[u8]]) -> Result<Self> {
        let mut state = Self {
            table1: [0; 256],
            mincode_table: [0; 33],
            maxcode_table: [0; 33],
            index_count: 0,
            code_length: 0,
            symbol_offsets: Vec::new(),
            symbols: Vec::new(),
        };
        state.parse_huff(huff)?;
        for (num, cdic) in cdics.iter().enumerate() {
            state.parse_cdic(cdic, num)?;
        }
        Ok(state)
    }

    fn parse_huff(&mut self, data: &[u8]) -> Result<()> {
        if data.len() < HUFF_RECORD_MINSIZE {
            return Err(Error::corrupt(format!(
                "HUFF record too short ({} bytes)",
                data.len()
            )));
        }
        let mut reader = Reader::new(data);
        if !reader.match_magic(HUFF_MAGIC) {
            return Err(Error::corrupt("HUFF magic not found"));
        }
        reader.seek(4);
        let header_length = reader.get_u32() as usize;
        if header_length < HUFF_HEADER_LEN {
            return Err(Error::corrupt("HUFF header length too small"));
        }
        let data1_offset = reader.get_u32() as usize;
        let data2_offset = reader.get_u32() as usize;
        // the remaining header bytes hold little-endian copies of the same
        // offsets; skip them

        if data1_offset + 256 * 4 > data.len() {
            return Err(Error::corrupt("HUFF code table out of bounds"));
        }
        reader.set_pos(data1_offset);
        for entry in self.table1.iter_mut() {
            *entry = reader.get_u32();
        }

        if data2_offset + 64 * 4 > data.len() {
            return Err(Error::corrupt("HUFF min/max table out of bounds"));
        }
        reader.set_pos(data2_offset);
        self.mincode_table[0] = 0;
        self.maxcode_table[0] = 0xFFFF_FFFF;
        for i in 1..33u32 {
            let mincode = reader.get_u32();
            let maxcode = reader.get_u32();
            self.mincode_table[i as usize] = mincode.wrapping_shl(32 - i);
            self.maxcode_table[i as usize] =
                maxcode.wrapping_add(1).wrapping_shl(32 - i).wrapping_sub(1);
        }
        reader.ok()
    }

    fn parse_cdic(&mut self, data: &[u8], num: usize) -> Result<()> {
        let mut reader = Reader::new(data);
        if !reader.match_magic(CDIC_MAGIC) {
            return Err(Error::corrupt("CDIC magic not found"));
        }
        reader.seek(4);
        let header_length = reader.get_u32() as usize;
        let index_count = reader.get_u32() as usize;
        let code_length = reader.get_u32();
        reader.ok()?;
        if header_length < CDIC_HEADER_LEN {
            return Err(Error::corrupt("CDIC header length too small"));
        }
        if index_count == 0 {
            return Err(Error::corrupt("CDIC index count is zero"));
        }
        if code_length == 0 || code_length > MAX_CDIC_CODE_BITS {
            return Err(Error::corrupt(format!(
                "CDIC code length {code_length} out of range"
            )));
        }
        if self.code_length != 0 && self.code_length != code_length {
            log::warn!(
                "CDIC record {num}: code length {code_length} differs from previous {}",
                self.code_length
            );
        }
        if self.index_count != 0 && self.index_count != index_count {
            log::warn!(
                "CDIC record {num}: index count {index_count} differs from previous {}",
                self.index_count
            );
        }
        self.code_length = code_length;
        self.index_count = index_count;

        // each record carries at most 2^code_length offsets
        let remaining = index_count.saturating_sub(self.symbol_offsets.len());
        let take = remaining.min(1usize << code_length);
        if CDIC_HEADER_LEN + take * 2 > data.len() {
            return Err(Error::corrupt("CDIC offset table truncated"));
        }
        for _ in 0..take {
            self.symbol_offsets.push(reader.get_u16());
        }
        reader.ok()?;

        self.symbols.push(data[CDIC_HEADER_LEN..].to_vec());
        Ok(())
    }

    /// Decompress one text record, emitting at most `max_out` bytes.
    pub fn decompress(&self, input: &[u8], max_out: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(max_out.min(4 * input.len() + 16));
        self.unpack(input, &mut out, max_out, 0)?;
        Ok(out)
    }

    fn unpack(&self, input: &[u8], out: &mut Vec<u8>, max_out: usize, depth: usize) -> Result<()> {
        if depth > MAX_RECURSION_DEPTH {
            return Err(Error::corrupt("HUFF recursion limit exceeded"));
        }
        let mut bitcount: i32 = 32;
        let mut bitsleft: i64 = input.len() as i64 * 8;
        let mut pos = 0usize;
        let mut buffer = fill_buffer(input, pos);

        loop {
            if bitcount <= 0 {
                bitcount += 32;
                pos += 4;
                buffer = fill_buffer(input, pos);
            }
            let code = ((buffer >> bitcount) & 0xFFFF_FFFF) as u32;

            let t1 = self.table1[(code >> 24) as usize];
            let mut code_length = t1 & 0x1F;
            let mut maxcode = (t1 >> 8)
                .wrapping_add(1)
                .wrapping_shl(32 - code_length)
                .wrapping_sub(1);
            if code_length == 0 {
                return Err(Error::corrupt("HUFF code length is zero"));
            }
            if t1 & 0x80 == 0 {
                // walk the code length up until the code fits
                while code_length < 32 && code < self.mincode_table[code_length as usize] {
                    code_length += 1;
                }
                maxcode = self.maxcode_table[code_length as usize];
            }

            bitcount -= code_length as i32;
            bitsleft -= i64::from(code_length);
            if bitsleft < 0 {
                break;
            }

            let index = (maxcode.wrapping_sub(code) >> (32 - code_length)) as usize;
            if index >= self.symbol_offsets.len() {
                return Err(Error::corrupt(format!(
                    "HUFF symbol index {index} out of bounds"
                )));
            }
            // dictionary selector truncates when index_count is not a
            // power of two; existing files depend on this
            let dict = index >> self.code_length;
            let block = self
                .symbols
                .get(dict)
                .ok_or_else(|| Error::corrupt(format!("CDIC block {dict} missing")))?;
            let offset = self.symbol_offsets[index] as usize;
            if offset + 2 > block.len() {
                return Err(Error::corrupt("CDIC symbol offset out of bounds"));
            }
            let symbol_length = u16::from_be_bytes([block[offset], block[offset + 1]]);
            let is_decompressed = symbol_length & 0x8000 != 0;
            let length = (symbol_length & 0x7FFF) as usize;
            if offset + 2 + length > block.len() {
                return Err(Error::corrupt("CDIC symbol data out of bounds"));
            }
            let payload = &block[offset + 2..offset + 2 + length];

            if is_decompressed {
                let take = length.min(max_out - out.len());
                out.extend_from_slice(&payload[..take]);
            } else {
                self.unpack(payload, out, max_out, depth + 1)?;
            }
            if out.len() >= max_out {
                break;
            }
        }
        Ok(())
    }
}

/// Read up to eight bytes at `pos` as a big-endian u64, zero-padded.
fn fill_buffer(data: &[u8], pos: usize) -> u64 {
    let mut word = [0u8; 8];
    if pos < data.len() {
        let n = (data.len() - pos).min(8);
        word[..n].copy_from_slice(&data[pos..pos + n]);
    }
    u64::from_be_bytes(word)
}
