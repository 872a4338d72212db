//! PalmDB container parsing: file header, record directory, record data.

use crate::buffer::Reader;
use crate::error::{Error, Result};

pub const PALMDB_HEADER_LEN: usize = 78;
pub const PALMDB_NAME_MAX: usize = 32;
pub const RECORD_INFO_LEN: usize = 8;

/// 78-byte PalmDB file header.
#[derive(Debug, Clone)]
pub struct PdbHeader {
    pub name: String,
    pub attributes: u16,
    pub version: u16,
    pub ctime: u32,
    pub mtime: u32,
    pub btime: u32,
    pub mod_num: u32,
    pub appinfo_offset: u32,
    pub sortinfo_offset: u32,
    pub type_code: [u8; 4],
    pub creator: [u8; 4],
    pub uid: u32,
    pub next_rec: u32,
    pub rec_count: u16,
}

impl PdbHeader {
    pub fn parse(reader: &mut Reader) -> Result<Self> {
        let name_raw = reader.get_raw(PALMDB_NAME_MAX);
        let name_end = name_raw.iter().position(|&b| b == 0).unwrap_or(name_raw.len());
        let name = String::from_utf8_lossy(&name_raw[..name_end]).into_owned();

        let header = Self {
            name,
            attributes: reader.get_u16(),
            version: reader.get_u16(),
            ctime: reader.get_u32(),
            mtime: reader.get_u32(),
            btime: reader.get_u32(),
            mod_num: reader.get_u32(),
            appinfo_offset: reader.get_u32(),
            sortinfo_offset: reader.get_u32(),
            type_code: reader.get_raw(4).try_into().unwrap_or([0; 4]),
            creator: reader.get_raw(4).try_into().unwrap_or([0; 4]),
            uid: reader.get_u32(),
            next_rec: reader.get_u32(),
            rec_count: reader.get_u16(),
        };
        reader.ok().map_err(|_| Error::corrupt("PalmDB header truncated"))?;

        if &header.type_code != b"BOOK" && &header.type_code != b"TEXt" {
            return Err(Error::UnsupportedFormat(format!(
                "unknown PalmDB type: {}",
                String::from_utf8_lossy(&header.type_code)
            )));
        }
        if header.rec_count == 0 {
            return Err(Error::corrupt("no records in PalmDB directory"));
        }
        Ok(header)
    }

    /// True for MOBI containers (as opposed to bare PalmDOC text).
    pub fn is_mobi(&self) -> bool {
        &self.type_code == b"BOOK" && &self.creator == b"MOBI"
    }
}

/// One record: directory metadata plus its raw payload.
#[derive(Debug, Clone)]
pub struct PdbRecord {
    pub uid: u32,
    pub offset: u32,
    pub attributes: u8,
    pub data: Vec<u8>,
}

impl PdbRecord {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Parse the record directory and slice each record's payload out of the
/// file image. Record sizes are implied by the following record's offset;
/// the final record runs to end of file.
pub fn load_records(file: &[u8], header: &PdbHeader) -> Result<Vec<PdbRecord>> {
    let count = header.rec_count as usize;
    let dir_end = PALMDB_HEADER_LEN + count * RECORD_INFO_LEN;
    if file.len() < dir_end {
        return Err(Error::corrupt("record directory truncated"));
    }

    let mut reader = Reader::new(file);
    reader.set_pos(PALMDB_HEADER_LEN);

    struct Info {
        offset: u32,
        attributes: u8,
        uid: u32,
    }
    let mut infos = Vec::with_capacity(count);
    for _ in 0..count {
        let offset = reader.get_u32();
        let attributes = reader.get_u8();
        let uid_hi = reader.get_u8();
        let uid_lo = reader.get_u16();
        infos.push(Info {
            offset,
            attributes,
            uid: u32::from(uid_hi) << 16 | u32::from(uid_lo),
        });
    }
    reader.ok()?;

    let mut records = Vec::with_capacity(count);
    for (i, info) in infos.iter().enumerate() {
        let start = info.offset as usize;
        let end = if i + 1 < count {
            infos[i + 1].offset as usize
        } else {
            file.len()
        };
        if start < dir_end || start > end || end > file.len() {
            return Err(Error::corrupt(format!(
                "record {i} has invalid bounds {start}..{end}"
            )));
        }
        records.push(PdbRecord {
            uid: info.uid,
            offset: info.offset,
            attributes: info.attributes,
            data: file[start..end].to_vec(),
        });
    }
    Ok(records)
}
