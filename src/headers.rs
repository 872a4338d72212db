//! Record 0 headers: the PalmDOC compression header and the MOBI header.
//!
//! MOBI header fields past the declared length are simply absent; they are
//! modeled as `Option` and populated only when `header_length` covers
//! them, so a short v3 header and a full KF8 header share one type.

use crate::buffer::Reader;
use crate::error::{Error, Result};

pub const RECORD0_HEADER_LEN: usize = 16;
pub const MOBI_MAGIC: &[u8] = b"MOBI";

pub const COMPRESSION_NONE: u16 = 1;
pub const COMPRESSION_PALMDOC: u16 = 2;
pub const COMPRESSION_HUFFCDIC: u16 = 17480;

pub const ENCRYPTION_NONE: u16 = 0;
pub const ENCRYPTION_OLD_MOBIPOCKET: u16 = 1;
pub const ENCRYPTION_MOBIPOCKET: u16 = 2;

pub const MOBI_ENCODING_CP1252: u32 = 1252;
pub const MOBI_ENCODING_UTF8: u32 = 65001;
pub const MOBI_ENCODING_UTF16: u32 = 65002;

/// "Not set" sentinel for 32-bit index fields.
pub const NOTSET: u32 = 0xFFFF_FFFF;
/// "Not set" sentinel for 16-bit fields.
pub const NOTSET16: u16 = 0xFFFF;

/// Returns `None` for absent or sentinel index values.
pub fn index_opt(value: Option<u32>) -> Option<u32> {
    value.filter(|&v| v != NOTSET)
}

/// 16-byte PalmDOC header at the start of record 0.
#[derive(Debug, Clone, Default)]
pub struct Record0Header {
    pub compression_type: u16,
    pub text_length: u32,
    pub text_record_count: u16,
    pub text_record_size: u16,
    pub encryption_type: u16,
    pub unknown1: u16,
}

impl Record0Header {
    pub fn parse(reader: &mut Reader) -> Result<Self> {
        let compression_type = reader.get_u16();
        reader.seek(2); // unused
        let header = Self {
            compression_type,
            text_length: reader.get_u32(),
            text_record_count: reader.get_u16(),
            text_record_size: reader.get_u16(),
            encryption_type: reader.get_u16(),
            unknown1: reader.get_u16(),
        };
        reader
            .ok()
            .map_err(|_| Error::corrupt("record 0 header truncated"))?;
        Ok(header)
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption_type != ENCRYPTION_NONE
    }
}

/// MOBI header following the PalmDOC header in record 0.
///
/// Field offsets are record-0-relative, as in the on-disk layout.
#[derive(Debug, Clone, Default)]
pub struct MobiHeader {
    pub header_length: u32,
    pub mobi_type: Option<u32>,      // 24
    pub text_encoding: Option<u32>,  // 28
    pub uid: Option<u32>,            // 32
    pub version: Option<u32>,        // 36
    pub orth_index: Option<u32>,     // 40
    pub infl_index: Option<u32>,     // 44
    pub names_index: Option<u32>,    // 48
    pub keys_index: Option<u32>,     // 52
    pub extra0_index: Option<u32>,   // 56
    pub extra1_index: Option<u32>,   // 60
    pub extra2_index: Option<u32>,   // 64
    pub extra3_index: Option<u32>,   // 68
    pub extra4_index: Option<u32>,   // 72
    pub extra5_index: Option<u32>,   // 76
    pub non_text_index: Option<u32>, // 80
    pub full_name_offset: Option<u32>, // 84
    pub full_name_length: Option<u32>, // 88
    pub locale: Option<u32>,         // 92
    pub input_lang: Option<u32>,     // 96
    pub output_lang: Option<u32>,    // 100
    pub min_version: Option<u32>,    // 104
    pub image_index: Option<u32>,    // 108
    pub huff_rec_index: Option<u32>, // 112
    pub huff_rec_count: Option<u32>, // 116
    pub huff_table_offset: Option<u32>, // 120
    pub huff_table_length: Option<u32>, // 124
    pub exth_flags: Option<u32>,     // 128
    pub unknown6: Option<u32>,       // 164
    pub drm_offset: Option<u32>,     // 168
    pub drm_count: Option<u32>,      // 172
    pub drm_size: Option<u32>,       // 176
    pub drm_flags: Option<u32>,      // 180
    /// 192: FDST record index for KF8; the same word holds the two 16-bit
    /// text-range indices in older files (see [`Self::first_text_index`]).
    pub fdst_index: Option<u32>,
    pub fdst_section_count: Option<u32>, // 196
    pub fcis_index: Option<u32>,     // 200
    pub fcis_count: Option<u32>,     // 204
    pub flis_index: Option<u32>,     // 208
    pub flis_count: Option<u32>,     // 212
    pub unknown10: Option<u32>,      // 216
    pub unknown11: Option<u32>,      // 220
    pub srcs_index: Option<u32>,     // 224
    pub srcs_count: Option<u32>,     // 228
    pub unknown12: Option<u32>,      // 232
    pub unknown13: Option<u32>,      // 236
    pub extra_flags: Option<u16>,    // 242
    pub ncx_index: Option<u32>,      // 244
    pub fragment_index: Option<u32>, // 248
    pub skeleton_index: Option<u32>, // 252
    pub datp_index: Option<u32>,     // 256
    pub guide_index: Option<u32>,    // 260
}

impl MobiHeader {
    /// Parse at the reader's current position (record 0 offset 16). The
    /// reader is left at the end of the declared header area, where an
    /// EXTH block may follow.
    pub fn parse(reader: &mut Reader) -> Result<Self> {
        if !reader.match_magic(MOBI_MAGIC) {
            return Err(Error::corrupt("MOBI magic not found"));
        }
        reader.seek(4);
        let header_length = reader.get_u32();
        reader.ok()?;
        if header_length == 0 {
            return Err(Error::corrupt("MOBI header length is zero"));
        }

        // header_length counts from the magic; limit reads to it
        let header_end = (reader.pos() - 8).saturating_add(header_length as usize);
        let saved_limit = reader.set_limit(header_end.min(reader.limit()));

        let mut header = MobiHeader {
            header_length,
            ..Default::default()
        };
        header.mobi_type = reader.try_u32();
        header.text_encoding = reader.try_u32();
        header.uid = reader.try_u32();
        header.version = reader.try_u32();
        header.orth_index = reader.try_u32();
        header.infl_index = reader.try_u32();
        header.names_index = reader.try_u32();
        header.keys_index = reader.try_u32();
        header.extra0_index = reader.try_u32();
        header.extra1_index = reader.try_u32();
        header.extra2_index = reader.try_u32();
        header.extra3_index = reader.try_u32();
        header.extra4_index = reader.try_u32();
        header.extra5_index = reader.try_u32();
        header.non_text_index = reader.try_u32();
        header.full_name_offset = reader.try_u32();
        header.full_name_length = reader.try_u32();
        header.locale = reader.try_u32();
        header.input_lang = reader.try_u32();
        header.output_lang = reader.try_u32();
        header.min_version = reader.try_u32();
        header.image_index = reader.try_u32();
        header.huff_rec_index = reader.try_u32();
        header.huff_rec_count = reader.try_u32();
        header.huff_table_offset = reader.try_u32();
        header.huff_table_length = reader.try_u32();
        header.exth_flags = reader.try_u32();
        skip_optional(reader, 32);
        header.unknown6 = reader.try_u32();
        header.drm_offset = reader.try_u32();
        header.drm_count = reader.try_u32();
        header.drm_size = reader.try_u32();
        header.drm_flags = reader.try_u32();
        skip_optional(reader, 8);
        header.fdst_index = reader.try_u32();
        header.fdst_section_count = reader.try_u32();
        header.fcis_index = reader.try_u32();
        header.fcis_count = reader.try_u32();
        header.flis_index = reader.try_u32();
        header.flis_count = reader.try_u32();
        header.unknown10 = reader.try_u32();
        header.unknown11 = reader.try_u32();
        header.srcs_index = reader.try_u32();
        header.srcs_count = reader.try_u32();
        header.unknown12 = reader.try_u32();
        header.unknown13 = reader.try_u32();
        skip_optional(reader, 2);
        header.extra_flags = reader.try_u16();
        header.ncx_index = reader.try_u32();
        header.fragment_index = reader.try_u32();
        header.skeleton_index = reader.try_u32();
        header.datp_index = reader.try_u32();
        header.guide_index = reader.try_u32();

        reader.set_limit(saved_limit);
        reader.set_pos(header_end.min(saved_limit));
        Ok(header)
    }

    pub fn has_exth(&self) -> bool {
        self.exth_flags.is_some_and(|f| f & 0x40 != 0)
    }

    pub fn is_kf8(&self) -> bool {
        self.version.is_some_and(|v| v >= 8)
    }

    pub fn is_cp1252(&self) -> bool {
        self.text_encoding.is_none_or(|e| e == MOBI_ENCODING_CP1252)
    }

    pub fn is_dictionary(&self) -> bool {
        index_opt(self.orth_index).is_some()
    }

    /// First text-range index of pre-KF8 files (high half of the word that
    /// holds `fdst_index` on KF8).
    pub fn first_text_index(&self) -> Option<u16> {
        self.fdst_index.map(|v| (v >> 16) as u16)
    }

    pub fn last_text_index(&self) -> Option<u16> {
        self.fdst_index.map(|v| v as u16)
    }
}

/// Advance past unknown header bytes without latching the error state when
/// the declared header ends inside them.
fn skip_optional(reader: &mut Reader, n: usize) {
    let step = n.min(reader.remaining());
    reader.seek(step as isize);
}
