//! Document state and the decoder facade.
//!
//! A [`Document`] owns the record sequence plus one header bundle per
//! half. Hybrid KF7/KF8 files carry two bundles over the shared record
//! list; [`Document::swap_halves`] exchanges which one is active, and the
//! loader leaves the KF8 half active unless told otherwise.

use std::borrow::Cow;
use std::io::Write;

use crate::buffer::Reader;
use crate::encoding::cp1252_to_utf8;
use crate::error::{Error, Result};
use crate::exth::{self, ExthRecord, EXTH_KF8BOUNDARY};
use crate::headers::{
    index_opt, MobiHeader, Record0Header, COMPRESSION_HUFFCDIC, COMPRESSION_NONE,
    COMPRESSION_PALMDOC, NOTSET, RECORD0_HEADER_LEN,
};
use crate::huffcdic::HuffCdic;
use crate::palmdoc;
use crate::pdb::{load_records, PdbHeader, PdbRecord};
use crate::rawml::{self, Rawml};
use crate::resources::BOUNDARY_MAGIC;

/// Fallback decompression window when record 0 declares no record size.
const DEFAULT_TEXT_RECORD_SIZE: usize = 4096;

/// Decrypt hook for encrypted documents. The core ships no cipher; a
/// caller with key material supplies one and errors (`DrmExpired`,
/// `DrmKeyNotFound`) surface unchanged.
pub trait TextDecryptor {
    fn decrypt(&self, record: &[u8], seq_number: usize) -> Result<Vec<u8>>;
}

/// Loader options.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Keep the KF7 half active when loading a hybrid file.
    pub prefer_kf7: bool,
}

/// Per-half headers: Record0, MOBI, EXTH, and the record numbering base
/// of the half (0, or boundary + 1 for the KF8 half of a hybrid file).
#[derive(Debug, Clone)]
pub struct HeaderBundle {
    pub record0: Record0Header,
    pub mobi: Option<MobiHeader>,
    pub exth: Vec<ExthRecord>,
    pub record_offset: usize,
}

/// A loaded MOBI container.
pub struct Document {
    pub pdb: PdbHeader,
    records: Vec<PdbRecord>,
    active: HeaderBundle,
    other: Option<HeaderBundle>,
    decryptor: Option<Box<dyn TextDecryptor>>,
}

impl Document {
    /// Load a document from an in-memory file image. Hybrid files come up
    /// with the KF8 half active.
    pub fn load(bytes: &[u8]) -> Result<Self> {
        Self::load_with(bytes, LoadOptions::default())
    }

    pub fn load_with(bytes: &[u8], options: LoadOptions) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let pdb = PdbHeader::parse(&mut reader)?;
        let records = load_records(bytes, &pdb)?;
        let active = parse_bundle(&records, &pdb, 0, 0)?;
        let mut doc = Self {
            pdb,
            records,
            active,
            other: None,
            decryptor: None,
        };

        if let Some(boundary) = doc.kf8_boundary() {
            log::debug!("hybrid file, KF8 half at record {}", boundary + 1);
            let kf8 = parse_bundle(&doc.records, &doc.pdb, boundary + 1, boundary + 1)?;
            doc.other = Some(kf8);
            if !options.prefer_kf7 {
                doc.swap_halves();
            }
        }
        Ok(doc)
    }

    /// Install the decrypt hook used for encrypted text records.
    pub fn set_decryptor(&mut self, decryptor: Box<dyn TextDecryptor>) {
        self.decryptor = Some(decryptor);
    }

    /// Exchange the active and sibling header bundles of a hybrid file.
    /// Involutive; returns false for single-format files.
    pub fn swap_halves(&mut self) -> bool {
        match self.other.as_mut() {
            Some(other) => {
                std::mem::swap(&mut self.active, other);
                true
            }
            None => false,
        }
    }

    pub fn is_hybrid(&self) -> bool {
        self.other.is_some()
    }

    /// Sequence number of the `BOUNDARY` record of a hybrid file.
    pub fn kf8_boundary(&self) -> Option<usize> {
        let bundles = [Some(&self.active), self.other.as_ref()];
        for bundle in bundles.into_iter().flatten() {
            let Some(value) = exth::find_tag(&bundle.exth, EXTH_KF8BOUNDARY)
                .and_then(|r| r.as_u32())
                .filter(|&v| v != 0 && v != NOTSET)
            else {
                continue;
            };
            let boundary = value as usize - 1;
            if let Some(record) = self.records.get(boundary) {
                if record.data.starts_with(BOUNDARY_MAGIC) {
                    return Some(boundary);
                }
            }
        }
        None
    }

    pub fn record_by_seq(&self, seq: usize) -> Option<&PdbRecord> {
        self.records.get(seq)
    }

    pub fn record_by_uid(&self, uid: u32) -> Option<&PdbRecord> {
        self.records.iter().find(|r| r.uid == uid)
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Record lookup relative to the active half.
    pub fn half_record(&self, index: usize) -> Result<&PdbRecord> {
        self.records
            .get(self.active.record_offset + index)
            .ok_or_else(|| {
                Error::corrupt(format!(
                    "record {} missing (half offset {})",
                    index, self.active.record_offset
                ))
            })
    }

    pub fn record_offset(&self) -> usize {
        self.active.record_offset
    }

    pub fn record0_header(&self) -> &Record0Header {
        &self.active.record0
    }

    pub fn mobi_header(&self) -> Option<&MobiHeader> {
        self.active.mobi.as_ref()
    }

    pub fn exth_records(&self) -> &[ExthRecord] {
        &self.active.exth
    }

    pub fn is_cp1252(&self) -> bool {
        self.active.mobi.as_ref().is_none_or(|m| m.is_cp1252())
    }

    pub fn version(&self) -> Option<u32> {
        self.active.mobi.as_ref().and_then(|m| m.version)
    }

    /// Full book name from record 0, transcoded to UTF-8.
    pub fn full_name(&self) -> Option<String> {
        let mobi = self.active.mobi.as_ref()?;
        let offset = mobi.full_name_offset? as usize;
        let length = mobi.full_name_length? as usize;
        let record0 = self.records.get(self.active.record_offset)?;
        let bytes = record0.data.get(offset..offset + length)?;
        Some(if self.is_cp1252() {
            cp1252_to_utf8(bytes)
        } else {
            String::from_utf8_lossy(bytes).into_owned()
        })
    }

    /// Concatenated decompressed text of all text records.
    pub fn rawml(&self) -> Result<Vec<u8>> {
        let mut text = Vec::with_capacity((self.active.record0.text_length as usize).min(1 << 22));
        self.for_each_text_record(|chunk| {
            text.extend_from_slice(chunk);
            Ok(())
        })?;
        Ok(text)
    }

    /// Stream the decompressed text record-by-record into a writer.
    pub fn dump_rawml<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.for_each_text_record(|chunk| {
            writer.write_all(chunk)?;
            Ok(())
        })
    }

    /// Reconstruct the document tree: flow parts, markup parts, resources
    /// and navigation indices.
    pub fn parse_rawml(&self) -> Result<Rawml> {
        rawml::parse_rawml(self)
    }

    fn init_huffcdic(&self) -> Result<HuffCdic> {
        let mobi = self
            .active
            .mobi
            .as_ref()
            .ok_or(Error::Uninitialized("no MOBI header for HUFF lookup"))?;
        let huff_index = index_opt(mobi.huff_rec_index)
            .ok_or_else(|| Error::corrupt("HUFF record index not set"))? as usize;
        let huff_count = mobi.huff_rec_count.unwrap_or(0) as usize;
        if huff_count < 2 {
            return Err(Error::corrupt("HUFF record count too small"));
        }
        let huff = self.half_record(huff_index)?;
        let mut cdics: Vec<&[u8]> = Vec::new();
        for i in 1..huff_count {
            cdics.push(&self.half_record(huff_index + i)?.data);
        }
        HuffCdic::from_records(&huff.data, &cdics)
    }

    fn for_each_text_record<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let record0 = &self.active.record0;
        if record0.text_record_count == 0 {
            return Err(Error::corrupt("no text records declared"));
        }
        let compression = record0.compression_type;
        let cap = if record0.text_record_size > 0 {
            record0.text_record_size as usize
        } else {
            DEFAULT_TEXT_RECORD_SIZE
        };
        let extra_flags = self
            .active
            .mobi
            .as_ref()
            .and_then(|m| m.extra_flags)
            .unwrap_or(0);
        let huffcdic = if compression == COMPRESSION_HUFFCDIC {
            Some(self.init_huffcdic()?)
        } else {
            None
        };

        for i in 0..record0.text_record_count as usize {
            let seq = self.active.record_offset + 1 + i;
            let record = self
                .records
                .get(seq)
                .ok_or_else(|| Error::corrupt(format!("text record {seq} missing")))?;

            let data: Cow<[u8]> = if record0.is_encrypted() {
                let decryptor = self.decryptor.as_ref().ok_or_else(|| {
                    Error::UnsupportedFormat(
                        "document is encrypted and no decryptor is set".into(),
                    )
                })?;
                Cow::Owned(decryptor.decrypt(&record.data, seq)?)
            } else {
                Cow::Borrowed(record.data.as_slice())
            };

            let extra = record_extra_size(&data, extra_flags);
            let payload = &data[..data.len() - extra];
            let chunk = match compression {
                COMPRESSION_NONE => payload.to_vec(),
                COMPRESSION_PALMDOC => palmdoc::decompress(payload, cap)?,
                COMPRESSION_HUFFCDIC => huffcdic
                    .as_ref()
                    .expect("HUFF state initialized above")
                    .decompress(payload, cap)?,
                other => {
                    return Err(Error::UnsupportedFormat(format!(
                        "unknown compression type {other}"
                    )));
                }
            };
            f(&chunk)?;
        }
        Ok(())
    }
}

/// Size of the trailing data regions appended to one text record, per the
/// `extra_flags` bitfield. For every set bit above bit 0 a backward
/// variable-width integer at the record tail gives that region's length;
/// bit 0 adds a final byte whose low two bits (plus one) count multibyte
/// overlap bytes.
pub fn record_extra_size(data: &[u8], flags: u16) -> usize {
    let mut num = 0usize;
    let mut bit_flags = flags >> 1;
    while bit_flags != 0 {
        if bit_flags & 1 != 0 {
            if num >= data.len() {
                break;
            }
            let mut reader = Reader::new(data);
            reader.set_pos(data.len() - num - 1);
            let (size, _) = reader.get_varlen_backward();
            let size = size as usize;
            if size == 0 || size > data.len() - num {
                break;
            }
            num += size;
        }
        bit_flags >>= 1;
    }
    if flags & 1 != 0 && num < data.len() {
        let overlap = (data[data.len() - num - 1] & 0x03) as usize + 1;
        num += overlap.min(data.len() - num);
    }
    num.min(data.len())
}

fn parse_bundle(
    records: &[PdbRecord],
    pdb: &PdbHeader,
    seq: usize,
    record_offset: usize,
) -> Result<HeaderBundle> {
    let record0 = records
        .get(seq)
        .ok_or_else(|| Error::corrupt(format!("record 0 missing at {seq}")))?;
    if record0.size() < RECORD0_HEADER_LEN {
        return Err(Error::corrupt("record 0 too short"));
    }
    let mut reader = Reader::new(&record0.data);
    let r0 = Record0Header::parse(&mut reader)?;
    let mut mobi = None;
    let mut exth_records = Vec::new();
    if pdb.is_mobi() {
        let header = MobiHeader::parse(&mut reader)?;
        if header.has_exth() {
            exth_records = exth::parse_exth(&mut reader)?;
        }
        mobi = Some(header);
    }
    Ok(HeaderBundle {
        record0: r0,
        mobi,
        exth: exth_records,
        record_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extra_size_single_trailer() {
        // 11 data bytes, trailer "xx" + backward varlen 0x83 (value 3,
        // covering itself and the two trailer bytes)
        let mut record = b"hello world".to_vec();
        record.extend_from_slice(&[b'x', b'x', 0x83]);
        assert_eq!(record_extra_size(&record, 0b10), 3);
    }

    #[test]
    fn test_extra_size_multibyte_overlap() {
        let mut record = b"hello world".to_vec();
        record.push(0x02); // overlap = (2 & 3) + 1 = 3
        assert_eq!(record_extra_size(&record, 0b1), 3);
    }

    #[test]
    fn test_extra_size_combined() {
        // bit-0 overlap byte sits closest to the text; regions for the
        // higher bits are stripped from the record tail first
        let mut record = b"0123456789".to_vec();
        record.push(0x00); // overlap byte: (0 & 3) + 1 = 1
        record.extend_from_slice(&[b'a', 0x82]); // bit-1 region of 2 bytes
        assert_eq!(record_extra_size(&record, 0b11), 3);
    }

    #[test]
    fn test_extra_size_no_flags() {
        assert_eq!(record_extra_size(b"abc", 0), 0);
    }

    #[test]
    fn test_extra_size_never_exceeds_record() {
        let record = [0xFF, 0xFF];
        assert!(record_extra_size(&record, 0xFFFF) <= record.len());
    }
}
