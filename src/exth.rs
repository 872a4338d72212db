//! EXTH record list and tag catalog.
//!
//! EXTH records carry typed metadata key/value pairs after the MOBI
//! header. The semantic type of a record's payload depends on its tag via
//! a static catalog; unknown tags are kept as binary.

use crate::buffer::Reader;
use crate::encoding::cp1252_to_utf8;
use crate::error::{Error, Result};

pub const EXTH_MAGIC: &[u8] = b"EXTH";

/// Well-known EXTH tags used by the decoder itself.
pub const EXTH_KF8BOUNDARY: u32 = 121;

/// Payload interpretation for an EXTH tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExthType {
    Numeric,
    String,
    Binary,
}

/// One parsed EXTH record. Multiple records may share a tag (subject,
/// author).
#[derive(Debug, Clone)]
pub struct ExthRecord {
    pub tag: u32,
    pub data: Vec<u8>,
}

impl ExthRecord {
    /// Big-endian numeric payload, if it is exactly four bytes.
    pub fn as_u32(&self) -> Option<u32> {
        let bytes: [u8; 4] = self.data.as_slice().try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }

    /// Payload decoded per the catalog type and document encoding.
    pub fn display_value(&self, utf8: bool) -> String {
        match exth_meta(self.tag).map(|m| m.kind) {
            Some(ExthType::Numeric) => self
                .as_u32()
                .map(|v| v.to_string())
                .unwrap_or_else(|| format!("{:02x?}", self.data)),
            Some(ExthType::String) => {
                if utf8 {
                    String::from_utf8_lossy(&self.data).into_owned()
                } else {
                    cp1252_to_utf8(&self.data)
                }
            }
            _ => format!("{:02x?}", self.data),
        }
    }
}

/// Catalog entry: tag number, display name, payload type.
pub struct ExthMeta {
    pub tag: u32,
    pub name: &'static str,
    pub kind: ExthType,
}

#[rustfmt::skip]
static EXTH_CATALOG: &[ExthMeta] = &[
    ExthMeta { tag: 1,   name: "drm server id",      kind: ExthType::String },
    ExthMeta { tag: 2,   name: "drm commerce id",    kind: ExthType::String },
    ExthMeta { tag: 3,   name: "drm ebookbase id",   kind: ExthType::String },
    ExthMeta { tag: 100, name: "author",             kind: ExthType::String },
    ExthMeta { tag: 101, name: "publisher",          kind: ExthType::String },
    ExthMeta { tag: 102, name: "imprint",            kind: ExthType::String },
    ExthMeta { tag: 103, name: "description",        kind: ExthType::String },
    ExthMeta { tag: 104, name: "isbn",               kind: ExthType::String },
    ExthMeta { tag: 105, name: "subject",            kind: ExthType::String },
    ExthMeta { tag: 106, name: "published",          kind: ExthType::String },
    ExthMeta { tag: 107, name: "review",             kind: ExthType::String },
    ExthMeta { tag: 108, name: "contributor",        kind: ExthType::String },
    ExthMeta { tag: 109, name: "rights",             kind: ExthType::String },
    ExthMeta { tag: 110, name: "subject code",       kind: ExthType::String },
    ExthMeta { tag: 111, name: "type",               kind: ExthType::String },
    ExthMeta { tag: 112, name: "source",             kind: ExthType::String },
    ExthMeta { tag: 113, name: "asin",               kind: ExthType::String },
    ExthMeta { tag: 114, name: "version",            kind: ExthType::Numeric },
    ExthMeta { tag: 115, name: "sample",             kind: ExthType::Numeric },
    ExthMeta { tag: 116, name: "start reading",      kind: ExthType::Numeric },
    ExthMeta { tag: 117, name: "adult",              kind: ExthType::String },
    ExthMeta { tag: 118, name: "price",              kind: ExthType::String },
    ExthMeta { tag: 119, name: "currency",           kind: ExthType::String },
    ExthMeta { tag: 121, name: "kf8 boundary",       kind: ExthType::Numeric },
    ExthMeta { tag: 125, name: "resources count",    kind: ExthType::Numeric },
    ExthMeta { tag: 129, name: "kf8 cover uri",      kind: ExthType::String },
    ExthMeta { tag: 200, name: "short dict name",    kind: ExthType::String },
    ExthMeta { tag: 201, name: "cover offset",       kind: ExthType::Numeric },
    ExthMeta { tag: 202, name: "thumbnail offset",   kind: ExthType::Numeric },
    ExthMeta { tag: 203, name: "has fake cover",     kind: ExthType::Numeric },
    ExthMeta { tag: 204, name: "creator software",   kind: ExthType::Numeric },
    ExthMeta { tag: 205, name: "creator major",      kind: ExthType::Numeric },
    ExthMeta { tag: 206, name: "creator minor",      kind: ExthType::Numeric },
    ExthMeta { tag: 207, name: "creator build",      kind: ExthType::Numeric },
    ExthMeta { tag: 208, name: "watermark",          kind: ExthType::Binary },
    ExthMeta { tag: 209, name: "tamper keys",        kind: ExthType::Binary },
    ExthMeta { tag: 300, name: "font signature",     kind: ExthType::Binary },
    ExthMeta { tag: 401, name: "clipping limit",     kind: ExthType::Numeric },
    ExthMeta { tag: 402, name: "publisher limit",    kind: ExthType::Numeric },
    ExthMeta { tag: 404, name: "tts disabled",       kind: ExthType::Numeric },
    ExthMeta { tag: 405, name: "rental",             kind: ExthType::Numeric },
    ExthMeta { tag: 406, name: "rental expiration",  kind: ExthType::Binary },
    ExthMeta { tag: 501, name: "cde type",           kind: ExthType::String },
    ExthMeta { tag: 502, name: "last update",        kind: ExthType::String },
    ExthMeta { tag: 503, name: "updated title",      kind: ExthType::String },
    ExthMeta { tag: 524, name: "language",           kind: ExthType::String },
    ExthMeta { tag: 525, name: "alignment",          kind: ExthType::String },
    ExthMeta { tag: 535, name: "creator build rev",  kind: ExthType::String },
];

/// Look up catalog metadata for an EXTH tag.
pub fn exth_meta(tag: u32) -> Option<&'static ExthMeta> {
    EXTH_CATALOG.iter().find(|m| m.tag == tag)
}

/// Parse the EXTH block at the reader's current position.
pub fn parse_exth(reader: &mut Reader) -> Result<Vec<ExthRecord>> {
    if !reader.match_magic(EXTH_MAGIC) {
        return Err(Error::corrupt("EXTH magic not found"));
    }
    let block_start = reader.pos();
    reader.seek(4);
    let length = reader.get_u32() as usize;
    let rec_count = reader.get_u32();
    reader.ok()?;
    if length < 12 || rec_count == 0 {
        return Err(Error::corrupt(format!(
            "EXTH header inconsistent: length {length}, {rec_count} records"
        )));
    }
    // record reads stay inside the declared block
    let saved_limit = reader.set_limit((block_start + length).min(reader.limit()));

    let mut records = Vec::with_capacity((rec_count as usize).min(reader.remaining() / 8));
    for _ in 0..rec_count {
        let tag = reader.get_u32();
        let size = reader.get_u32() as usize;
        if reader.failed() {
            break;
        }
        // record size includes the 8 header bytes
        if size < 8 {
            log::warn!("skipping EXTH tag {tag}: record too short");
            continue;
        }
        let data = reader.get_raw(size - 8);
        if reader.failed() {
            break;
        }
        records.push(ExthRecord {
            tag,
            data: data.to_vec(),
        });
    }
    reader.set_limit(saved_limit);
    Ok(records)
}

/// First record carrying `tag`, if any.
pub fn find_tag(records: &[ExthRecord], tag: u32) -> Option<&ExthRecord> {
    records.iter().find(|r| r.tag == tag)
}
