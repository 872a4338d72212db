//! INDX record parsing: TAGX schemas, IDXT entry offsets, ORDT character
//! remapping, and the CNCX string pool.
//!
//! An index is one meta record (TAGX + ORDT + header constants) followed
//! by a run of data records whose IDXT tables delimit the entries. Entry
//! tag payloads are variable-width integers selected by per-entry control
//! bytes against the TAGX bitmasks.

use crate::buffer::Reader;
use crate::encoding::{bitcount, cp1252_to_utf8, ligature_to_cp1252};
use crate::error::{Error, Result};
use crate::headers::{MOBI_ENCODING_UTF8, MOBI_ENCODING_UTF16};

pub const INDX_MAGIC: &[u8] = b"INDX";
pub const TAGX_MAGIC: &[u8] = b"TAGX";
pub const IDXT_MAGIC: &[u8] = b"IDXT";
pub const ORDT_MAGIC: &[u8] = b"ORDT";
pub const LIGT_MAGIC: &[u8] = b"LIGT";

/// Upper bound on a decoded entry label in bytes.
pub const INDX_LABEL_SIZEMAX: usize = 1024;
/// Upper bound on values carried by a single tag.
pub const INDX_TAGVALUES_MAX: usize = 100;

/// Tag addresses: `(tag id, value index)`.
pub const TAG_SKEL_COUNT: (u8, usize) = (1, 0);
pub const TAG_SKEL_POSITION: (u8, usize) = (6, 0);
pub const TAG_SKEL_LENGTH: (u8, usize) = (6, 1);
pub const TAG_FRAG_AID_CNCX: (u8, usize) = (2, 0);
pub const TAG_FRAG_FILE_NR: (u8, usize) = (3, 0);
pub const TAG_FRAG_SEQUENCE_NR: (u8, usize) = (4, 0);
pub const TAG_FRAG_POSITION: (u8, usize) = (6, 0);
pub const TAG_FRAG_LENGTH: (u8, usize) = (6, 1);
pub const TAG_ORTH_STARTPOS: (u8, usize) = (1, 0);
pub const TAG_ORTH_ENDPOS: (u8, usize) = (2, 0);
pub const TAG_GUIDE_TITLE_CNCX: (u8, usize) = (1, 0);
pub const TAG_NCX_FILEPOS: (u8, usize) = (1, 0);
pub const TAG_NCX_TEXT_CNCX: (u8, usize) = (3, 0);
pub const TAG_NCX_LEVEL: (u8, usize) = (4, 0);
pub const TAG_NCX_POSFID: (u8, usize) = (6, 0);
pub const TAG_NCX_POSOFF: (u8, usize) = (6, 1);
pub const TAG_NCX_PARENT: (u8, usize) = (21, 0);
pub const TAG_NCX_CHILD_START: (u8, usize) = (22, 0);
pub const TAG_NCX_CHILD_END: (u8, usize) = (23, 0);

/// One TAGX schema row.
#[derive(Debug, Clone)]
pub struct TagxTag {
    pub tag: u8,
    pub values_count: u8,
    pub bitmask: u8,
    pub control_byte: u8,
}

/// Parsed TAGX section.
#[derive(Debug, Clone, Default)]
pub struct Tagx {
    pub control_byte_count: usize,
    pub tags: Vec<TagxTag>,
}

/// Parsed ORDT metadata: `ordt2` remaps label positions to UTF-16 code
/// units. `ordt1` is read and kept but carries no known semantics.
#[derive(Debug, Clone, Default)]
pub struct Ordt {
    pub kind: u32,
    pub offsets_count: usize,
    pub ordt1: Vec<u8>,
    pub ordt2: Vec<u16>,
}

impl Ordt {
    fn is_present(&self) -> bool {
        !self.ordt2.is_empty()
    }
}

/// A single typed tag on an index entry.
#[derive(Debug, Clone)]
pub struct IndexTag {
    pub tag_id: u8,
    pub values: Vec<u32>,
}

/// One index entry: decoded label plus its tag values.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub label: String,
    pub tags: Vec<IndexTag>,
}

impl IndexEntry {
    /// Value of `tag_arr.0` at position `tag_arr.1`, if present.
    pub fn tag_value(&self, tag_arr: (u8, usize)) -> Option<u32> {
        self.tags
            .iter()
            .find(|t| t.tag_id == tag_arr.0)
            .and_then(|t| t.values.get(tag_arr.1))
            .copied()
    }
}

/// A fully parsed index tree.
#[derive(Debug, Clone, Default)]
pub struct Index {
    /// 0 = normal, 2 = inflection.
    pub kind: u32,
    pub encoding: u32,
    pub total_entries_count: usize,
    pub entries: Vec<IndexEntry>,
    pub cncx_records_count: u32,
    /// First CNCX string-pool record, when the index has one.
    pub cncx: Option<Vec<u8>>,
}

impl Index {
    /// Fetch the varlen-prefixed string at `offset` in the CNCX pool.
    pub fn cncx_string(&self, offset: u32) -> Option<String> {
        let pool = self.cncx.as_deref()?;
        let mut reader = Reader::new(pool);
        reader.set_pos(offset as usize);
        let (length, _) = reader.get_varlen();
        let bytes = reader.get_raw(length as usize);
        if reader.failed() {
            return None;
        }
        Some(if self.encoding == MOBI_ENCODING_UTF8 {
            String::from_utf8_lossy(bytes).into_owned()
        } else {
            cp1252_to_utf8(bytes)
        })
    }
}

/// Header constants shared by meta and data INDX records.
#[derive(Debug, Default)]
struct IndxRecordHeader {
    header_length: u32,
    kind: u32,
    idxt_offset: u32,
    entries_count: u32,
    encoding: u32,
    total_entries_count: u32,
    ordt_offset: u32,
    ligt_offset: u32,
    ordt_entries_count: u32,
    cncx_records_count: u32,
    ordt_type: u32,
    ordt2_entries_count: u32,
    ordt1_offset: u32,
    ordt2_offset: u32,
}

impl IndxRecordHeader {
    fn parse(reader: &mut Reader) -> Result<Self> {
        if !reader.match_magic(INDX_MAGIC) {
            return Err(Error::corrupt("INDX magic not found"));
        }
        reader.seek(4);
        let header_length = reader.get_u32();
        if header_length == 0 {
            return Err(Error::corrupt("INDX header length is zero"));
        }
        reader.seek(4); // zeros
        let mut header = IndxRecordHeader {
            header_length,
            ..Default::default()
        };
        header.kind = reader.get_u32(); // 12
        reader.seek(4); // 16: gen
        header.idxt_offset = reader.get_u32(); // 20
        header.entries_count = reader.get_u32(); // 24
        header.encoding = reader.get_u32(); // 28
        reader.seek(4); // 32: zeros
        header.total_entries_count = reader.get_u32(); // 36
        header.ordt_offset = reader.get_u32(); // 40
        header.ligt_offset = reader.get_u32(); // 44
        header.ordt_entries_count = reader.get_u32(); // 48
        header.cncx_records_count = reader.get_u32(); // 52
        reader.ok()?;
        // later-generation headers carry a second ORDT block at 164
        if header.header_length >= 180 && reader.limit() >= 180 {
            reader.set_pos(164);
            header.ordt_type = reader.get_u32();
            header.ordt2_entries_count = reader.get_u32();
            header.ordt1_offset = reader.get_u32();
            header.ordt2_offset = reader.get_u32();
            reader.ok()?;
        }
        Ok(header)
    }
}

fn parse_tagx(reader: &mut Reader) -> Result<Tagx> {
    reader.seek(4); // skip magic
    let header_length = reader.get_u32();
    reader.ok()?;
    if header_length < 12 {
        return Err(Error::corrupt(format!(
            "TAGX header length too small: {header_length}"
        )));
    }
    let control_byte_count = reader.get_u32() as usize;
    let rows = (header_length as usize - 12) / 4;
    if rows * 4 > reader.remaining() {
        return Err(Error::corrupt("TAGX rows exceed record size"));
    }
    let mut tags = Vec::with_capacity(rows);
    for _ in 0..rows {
        tags.push(TagxTag {
            tag: reader.get_u8(),
            values_count: reader.get_u8(),
            bitmask: reader.get_u8(),
            control_byte: reader.get_u8(),
        });
    }
    reader.ok()?;
    Ok(Tagx {
        control_byte_count,
        tags,
    })
}

fn parse_ordt(reader: &mut Reader, header: &IndxRecordHeader) -> Result<Ordt> {
    let mut ordt = Ordt {
        kind: header.ordt_type,
        offsets_count: header.ordt2_entries_count as usize,
        ordt1: Vec::new(),
        ordt2: Vec::new(),
    };
    reader.set_pos(header.ordt1_offset as usize);
    if reader.match_magic(ORDT_MAGIC) {
        reader.seek(4);
        if ordt.offsets_count > reader.remaining() {
            return Err(Error::corrupt("ORDT1 entries exceed record size"));
        }
        // read and keep; no known consumer
        for _ in 0..ordt.offsets_count {
            ordt.ordt1.push(reader.get_u8());
        }
        log::debug!("ORDT1: read {} entries", ordt.offsets_count);
    }
    reader.set_pos(header.ordt2_offset as usize);
    if reader.match_magic(ORDT_MAGIC) {
        reader.seek(4);
        if ordt.offsets_count * 2 > reader.remaining() {
            return Err(Error::corrupt("ORDT2 entries exceed record size"));
        }
        for _ in 0..ordt.offsets_count {
            ordt.ordt2.push(reader.get_u16());
        }
        log::debug!("ORDT2: read {} entries", ordt.offsets_count);
    }
    reader.ok()?;
    Ok(ordt)
}

/// IDXT table: entry start offsets plus a final sentinel at the table's
/// own position, so `offsets[i]..offsets[i+1]` spans entry `i`.
fn parse_idxt(reader: &mut Reader, entries_count: usize) -> Result<Vec<usize>> {
    let idxt_offset = reader.pos();
    if !reader.match_magic(IDXT_MAGIC) {
        return Err(Error::corrupt("IDXT magic not found"));
    }
    reader.seek(4);
    if entries_count * 2 > reader.remaining() {
        return Err(Error::corrupt("IDXT entries exceed record size"));
    }
    let mut offsets = Vec::with_capacity(entries_count + 1);
    for _ in 0..entries_count {
        offsets.push(reader.get_u16() as usize);
    }
    reader.ok()?;
    offsets.push(idxt_offset);
    Ok(offsets)
}

/// Decode an entry label remapped through ORDT2, resolving UTF-16
/// surrogate pairs and replacing invalid sequences with U+FFFD.
fn decode_ordt_label(reader: &mut Reader, label_length: usize, ordt: &Ordt) -> String {
    let mut units: Vec<u16> = Vec::new();
    let mut consumed = 0;
    while consumed < label_length {
        let offset = if ordt.kind == 1 {
            consumed += 1;
            u16::from(reader.get_u8())
        } else {
            consumed += 2;
            reader.get_u16()
        };
        if reader.failed() {
            break;
        }
        let unit = if (offset as usize) < ordt.offsets_count {
            *ordt.ordt2.get(offset as usize).unwrap_or(&offset)
        } else {
            // out-of-range offsets pass through as literal code points
            offset
        };
        units.push(unit);
    }

    let mut label = String::new();
    let mut i = 0;
    while i < units.len() {
        let unit = units[i];
        let cp: u32 = match unit {
            0xD800..=0xDBFF => {
                if i + 1 < units.len() && (0xDC00..=0xDFFF).contains(&units[i + 1]) {
                    let low = units[i + 1];
                    i += 1;
                    (u32::from(unit) << 10) + u32::from(low) - 0x35F_DC00
                } else {
                    0xFFFD
                }
            }
            0xDC00..=0xDFFF => 0xFFFD,
            _ => u32::from(unit),
        };
        i += 1;
        let c = match char::from_u32(cp) {
            Some(c) if !is_noncharacter(cp) => c,
            _ => '\u{FFFD}',
        };
        if label.len() + c.len_utf8() > INDX_LABEL_SIZEMAX {
            log::warn!("index label exceeds {INDX_LABEL_SIZEMAX} bytes, truncated");
            break;
        }
        label.push(c);
    }
    label
}

fn is_noncharacter(cp: u32) -> bool {
    (0xFDD0..=0xFDEF).contains(&cp) || (cp & 0xFFFE) == 0xFFFE
}

/// Decode a plain label: zero bytes are dropped, control bytes 0x01..=0x05
/// introduce two-byte ligatures.
fn decode_plain_label(reader: &mut Reader, label_length: usize, encoding: u32) -> String {
    let raw = reader.get_raw(label_length);
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() && bytes.len() < INDX_LABEL_SIZEMAX {
        let c = raw[i];
        if c == 0 {
            i += 1;
            continue;
        }
        if c <= 5 {
            if i + 1 < raw.len() {
                let ligature = ligature_to_cp1252(c, raw[i + 1]);
                if ligature != 0 {
                    bytes.push(ligature);
                    i += 2;
                    continue;
                }
            }
            i += 1;
            continue;
        }
        bytes.push(c);
        i += 1;
    }
    if encoding == MOBI_ENCODING_UTF8 {
        String::from_utf8_lossy(&bytes).into_owned()
    } else {
        cp1252_to_utf8(&bytes)
    }
}

/// Parse one entry delimited by `start..end` within a data record.
fn parse_entry(
    data: &[u8],
    start: usize,
    end: usize,
    tagx: &Tagx,
    ordt: &Ordt,
    encoding: u32,
) -> Result<IndexEntry> {
    let mut reader = Reader::new(data);
    reader.set_limit(end);
    reader.set_pos(start);

    let label_length = reader.get_u8() as usize;
    reader.ok()?;
    if label_length > end - start {
        return Err(Error::corrupt(format!(
            "entry label length {label_length} exceeds entry size"
        )));
    }
    let label = if ordt.is_present() {
        decode_ordt_label(&mut reader, label_length, ordt)
    } else {
        decode_plain_label(&mut reader, label_length, encoding)
    };

    let control_start = reader.pos();
    reader.seek(tagx.control_byte_count as isize);
    reader.ok()?;
    let control_bytes = &data[control_start..control_start + tagx.control_byte_count];

    // first pass: decide which tags are present and how many values follow
    struct Pending {
        tag: u8,
        values_per_entry: u8,
        value_count: Option<u32>,
        value_bytes: Option<u32>,
    }
    let mut pending: Vec<Pending> = Vec::new();
    let mut control_index = 0usize;
    for row in &tagx.tags {
        if row.control_byte & 1 != 0 {
            control_index += 1;
            continue;
        }
        let Some(&control) = control_bytes.get(control_index) else {
            break;
        };
        let value = control & row.bitmask;
        if value == 0 {
            continue;
        }
        let (value_count, value_bytes) = if value == row.bitmask {
            if bitcount(row.bitmask) > 1 {
                // a single varlen gives the total byte count of the values
                let (bytes, _) = reader.get_varlen();
                (None, Some(bytes))
            } else {
                (Some(1), None)
            }
        } else {
            let mut mask = row.bitmask;
            let mut shifted = value;
            while mask & 1 == 0 {
                mask >>= 1;
                shifted >>= 1;
            }
            (Some(u32::from(shifted)), None)
        };
        pending.push(Pending {
            tag: row.tag,
            values_per_entry: row.values_count,
            value_count,
            value_bytes,
        });
    }

    // second pass: read the values
    let mut tags = Vec::with_capacity(pending.len());
    for p in pending {
        let mut values = Vec::new();
        if let Some(count) = p.value_count {
            let total = count as usize * p.values_per_entry as usize;
            for _ in 0..total.min(INDX_TAGVALUES_MAX) {
                let (value, consumed) = reader.get_varlen();
                if consumed == 0 {
                    break;
                }
                values.push(value);
            }
        } else if let Some(bytes) = p.value_bytes {
            let mut read = 0usize;
            while read < bytes as usize && values.len() < INDX_TAGVALUES_MAX {
                let (value, consumed) = reader.get_varlen();
                if consumed == 0 {
                    break;
                }
                read += consumed;
                values.push(value);
            }
        }
        tags.push(IndexTag {
            tag_id: p.tag,
            values,
        });
    }

    Ok(IndexEntry { label, tags })
}

/// Parse a whole index: the meta record at `first_record`, its data
/// records, and the trailing CNCX pool if declared.
///
/// `record` maps a sequence number to record bytes.
pub fn parse_index<'a, F>(mut record: F, first_record: usize) -> Result<Index>
where
    F: FnMut(usize) -> Result<&'a [u8]>,
{
    let meta_data = record(first_record)?;
    let mut reader = Reader::new(meta_data);
    let meta = IndxRecordHeader::parse(&mut reader)?;

    reader.set_pos(meta.header_length as usize);
    if !reader.match_magic(TAGX_MAGIC) {
        return Err(Error::corrupt("INDX meta record has no TAGX section"));
    }
    let tagx = parse_tagx(&mut reader)?;
    let ordt = if meta.encoding == MOBI_ENCODING_UTF16 || meta.ordt2_entries_count > 0 {
        parse_ordt(&mut reader, &meta)?
    } else {
        Ordt::default()
    };

    let mut index = Index {
        kind: meta.kind,
        encoding: meta.encoding,
        total_entries_count: meta.total_entries_count as usize,
        entries: Vec::with_capacity((meta.total_entries_count as usize).min(1024)),
        cncx_records_count: meta.cncx_records_count,
        cncx: None,
    };

    // the meta entries count is the number of data records that follow
    let data_records = meta.entries_count as usize;
    for i in 1..=data_records {
        let data = record(first_record + i)?;
        let mut reader = Reader::new(data);
        let header = IndxRecordHeader::parse(&mut reader)?;
        if header.idxt_offset == 0 {
            return Err(Error::corrupt("INDX data record missing IDXT offset"));
        }
        reader.set_pos(header.idxt_offset as usize);
        let offsets = parse_idxt(&mut reader, header.entries_count as usize)?;
        for pair in offsets.windows(2) {
            let (start, end) = (pair[0], pair[1]);
            if start >= end || end > data.len() {
                return Err(Error::corrupt(format!(
                    "INDX entry bounds invalid: {start}..{end}"
                )));
            }
            index
                .entries
                .push(parse_entry(data, start, end, &tagx, &ordt, meta.encoding)?);
        }
    }

    if meta.cncx_records_count > 0 {
        let cncx = record(first_record + data_records + 1)?;
        index.cncx = Some(cncx.to_vec());
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Writer;

    /// INDX meta record declaring one data record and the given TAGX rows.
    fn build_meta(
        data_records: u32,
        total_entries: u32,
        cncx_count: u32,
        tagx_rows: &[(u8, u8, u8, u8)],
    ) -> Vec<u8> {
        let mut w = Writer::new();
        w.add_raw(INDX_MAGIC);
        w.add_u32(192); // header length
        w.add_u32(0);
        w.add_u32(0); // type
        w.add_u32(0); // gen
        w.add_u32(0); // idxt offset (meta: none)
        w.add_u32(data_records);
        w.add_u32(1252); // encoding
        w.add_u32(0);
        w.add_u32(total_entries);
        w.add_u32(0); // ordt offset
        w.add_u32(0); // ligt offset
        w.add_u32(0); // ordt entries
        w.add_u32(cncx_count);
        w.add_zeros(192 - w.len());
        // TAGX section
        w.add_raw(TAGX_MAGIC);
        w.add_u32((12 + tagx_rows.len() * 4) as u32);
        w.add_u32(1); // control byte count
        for &(tag, count, mask, control) in tagx_rows {
            w.add_u8(tag);
            w.add_u8(count);
            w.add_u8(mask);
            w.add_u8(control);
        }
        w.into_inner()
    }

    /// INDX data record holding pre-encoded entries.
    fn build_data(entries: &[&[u8]]) -> Vec<u8> {
        let mut w = Writer::new();
        w.add_raw(INDX_MAGIC);
        w.add_u32(192);
        w.add_u32(0);
        w.add_u32(0);
        w.add_u32(0);
        let idxt_pos_slot = w.len();
        w.add_u32(0); // patched below
        w.add_u32(entries.len() as u32);
        w.add_u32(1252);
        w.add_zeros(192 - w.len());
        let mut offsets = Vec::new();
        for e in entries {
            offsets.push(w.len() as u16);
            w.add_raw(e);
        }
        let idxt_pos = w.len() as u32;
        w.add_raw(IDXT_MAGIC);
        for off in offsets {
            w.add_u16(off);
        }
        let mut bytes = w.into_inner();
        bytes[idxt_pos_slot..idxt_pos_slot + 4].copy_from_slice(&idxt_pos.to_be_bytes());
        bytes
    }

    /// Entry with a label, one control byte, and raw tag payload bytes.
    fn build_entry(label: &str, control: u8, payload: &[u8]) -> Vec<u8> {
        let mut w = Writer::new();
        w.add_u8(label.len() as u8);
        w.add_string(label);
        w.add_u8(control);
        w.add_raw(payload);
        w.into_inner()
    }

    // skeleton-like schema: tag 1 (count), tag 6 (position, length)
    const SKEL_ROWS: &[(u8, u8, u8, u8)] =
        &[(1, 1, 0x03, 0), (6, 2, 0x0C, 0), (0, 0, 0, 1)];

    #[test]
    fn test_parse_simple_index() {
        let meta = build_meta(1, 2, 0, SKEL_ROWS);
        // control 0x05: tag1 present once, tag6 present once (2 values)
        let mut payload = Writer::new();
        payload.add_varlen(3); // tag 1 value: fragment count
        payload.add_varlen(0); // tag 6: position
        payload.add_varlen(120); // tag 6: length
        let e0 = build_entry("SKEL0000", 0x05, &payload.into_inner());

        let mut payload = Writer::new();
        payload.add_varlen(1);
        payload.add_varlen(120);
        payload.add_varlen(1922);
        let e1 = build_entry("SKEL0001", 0x05, &payload.into_inner());

        let data = build_data(&[&e0, &e1]);
        let records = [meta, data];
        let index = parse_index(|i| Ok(records[i].as_slice()), 0).unwrap();

        assert_eq!(index.entries.len(), 2);
        let first = &index.entries[0];
        assert_eq!(first.label, "SKEL0000");
        assert_eq!(first.tag_value(TAG_SKEL_COUNT), Some(3));
        assert_eq!(first.tag_value(TAG_SKEL_POSITION), Some(0));
        assert_eq!(first.tag_value(TAG_SKEL_LENGTH), Some(120));
        let second = &index.entries[1];
        assert_eq!(second.tag_value(TAG_SKEL_POSITION), Some(120));
        assert_eq!(second.tag_value(TAG_SKEL_LENGTH), Some(1922));
    }

    #[test]
    fn test_absent_tag() {
        let meta = build_meta(1, 1, 0, SKEL_ROWS);
        // control 0x04: only tag 6 present
        let mut payload = Writer::new();
        payload.add_varlen(7);
        payload.add_varlen(9);
        let e0 = build_entry("X", 0x04, &payload.into_inner());
        let data = build_data(&[&e0]);
        let records = [meta, data];
        let index = parse_index(|i| Ok(records[i].as_slice()), 0).unwrap();

        let entry = &index.entries[0];
        assert_eq!(entry.tag_value(TAG_SKEL_COUNT), None);
        assert_eq!(entry.tag_value(TAG_SKEL_POSITION), Some(7));
    }

    #[test]
    fn test_repeat_count_from_shifted_mask() {
        let meta = build_meta(1, 1, 0, SKEL_ROWS);
        // tag 6 mask is 0x0C; control 0x08 shifts down to repeat count 2,
        // so 2 * values_count(2) = 4 varlens follow
        let mut payload = Writer::new();
        for v in [1u32, 2, 3, 4] {
            payload.add_varlen(v);
        }
        let e0 = build_entry("R", 0x08, &payload.into_inner());
        let data = build_data(&[&e0]);
        let records = [meta, data];
        let index = parse_index(|i| Ok(records[i].as_slice()), 0).unwrap();

        let tag = index.entries[0]
            .tags
            .iter()
            .find(|t| t.tag_id == 6)
            .unwrap();
        assert_eq!(tag.values, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_cncx_pool() {
        let meta = build_meta(1, 1, 1, SKEL_ROWS);
        let mut payload = Writer::new();
        payload.add_varlen(1);
        let e0 = build_entry("C", 0x01, &payload.into_inner());
        let data = build_data(&[&e0]);
        // varlen-prefixed strings
        let mut cncx = Writer::new();
        cncx.add_varlen(5);
        cncx.add_string("cover");
        let toc_offset = cncx.len() as u32;
        cncx.add_varlen(3);
        cncx.add_string("toc");
        let records = [meta, data, cncx.into_inner()];
        let index = parse_index(|i| Ok(records[i].as_slice()), 0).unwrap();

        assert_eq!(index.cncx_string(0).as_deref(), Some("cover"));
        assert_eq!(index.cncx_string(toc_offset).as_deref(), Some("toc"));
        assert_eq!(index.cncx_string(500), None);
    }

    #[test]
    fn test_missing_tagx_is_corrupt() {
        let mut meta = build_meta(1, 1, 0, SKEL_ROWS);
        let tagx_at = 192;
        meta[tagx_at..tagx_at + 4].copy_from_slice(b"JUNK");
        let records = [meta];
        assert!(parse_index(|i| Ok(records[i].as_slice()), 0).is_err());
    }

    #[test]
    fn test_missing_idxt_offset_is_corrupt() {
        let meta = build_meta(1, 1, 0, SKEL_ROWS);
        let mut data = build_data(&[&build_entry("A", 0, &[])]);
        data[20..24].copy_from_slice(&[0; 4]); // zero the IDXT offset
        let records = [meta, data];
        assert!(parse_index(|i| Ok(records[i].as_slice()), 0).is_err());
    }

    #[test]
    fn test_plain_label_ligature_and_zeros() {
        let mut w = Writer::new();
        w.add_raw(&[b'c', 0, 1, b'E', b'x']);
        let bytes = w.into_inner();
        let mut r = Reader::new(&bytes);
        let label = decode_plain_label(&mut r, 5, 1252);
        assert_eq!(label, "c\u{152}x"); // OE ligature
    }

    #[test]
    fn test_ordt_label_surrogates() {
        let ordt = Ordt {
            kind: 2,
            offsets_count: 2,
            ordt1: Vec::new(),
            ordt2: vec![0xD83D, 0xDE00],
        };
        // two 2-byte positions mapping through ordt2 to a surrogate pair
        let bytes = [0x00, 0x00, 0x00, 0x01];
        let mut r = Reader::new(&bytes);
        let label = decode_ordt_label(&mut r, 4, &ordt);
        assert_eq!(label, "\u{1F600}");
    }

    #[test]
    fn test_ordt_label_unpaired_surrogate() {
        let ordt = Ordt {
            kind: 2,
            offsets_count: 1,
            ordt1: Vec::new(),
            ordt2: vec![0xD83D],
        };
        let bytes = [0x00, 0x00];
        let mut r = Reader::new(&bytes);
        assert_eq!(decode_ordt_label(&mut r, 2, &ordt), "\u{FFFD}");
    }

    #[test]
    fn test_plain_label_capped() {
        let raw = vec![b'a'; 2000];
        let mut r = Reader::new(&raw);
        let label = decode_plain_label(&mut r, 2000, 1252);
        assert_eq!(label.len(), INDX_LABEL_SIZEMAX);
    }

    #[test]
    fn test_ordt_label_passthrough() {
        let ordt = Ordt {
            kind: 2,
            offsets_count: 1,
            ordt1: Vec::new(),
            ordt2: vec![0x41],
        };
        // offset 0 maps to 'A'; offset 0x42 is out of range, passes through
        let bytes = [0x00, 0x00, 0x00, 0x42];
        let mut r = Reader::new(&bytes);
        assert_eq!(decode_ordt_label(&mut r, 4, &ordt), "AB");
    }
}
