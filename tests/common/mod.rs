//! Builders for synthetic MOBI files used by the integration tests.
#![allow(dead_code)]

use rawml::buffer::Writer;
use rawml::headers::NOTSET;

pub const PALMDB_HEADER_LEN: usize = 78;
pub const RECORD_INFO_LEN: usize = 8;
pub const MOBI_HEADER_LENGTH: u32 = 248;

/// Record 0 parameters; defaults describe a small uncompressed KF7 book.
pub struct Record0Opts {
    pub compression: u16,
    pub encryption: u16,
    pub text_length: u32,
    pub text_record_count: u16,
    pub text_record_size: u16,
    pub version: u32,
    pub encoding: u32,
    pub locale: u32,
    pub extra_flags: u16,
    pub image_index: u32,
    pub fdst_index: u32,
    pub fdst_section_count: u32,
    pub ncx_index: u32,
    pub fragment_index: u32,
    pub skeleton_index: u32,
    pub exth: Vec<(u32, Vec<u8>)>,
    pub full_name: Option<String>,
}

impl Default for Record0Opts {
    fn default() -> Self {
        Self {
            compression: 1,
            encryption: 0,
            text_length: 0,
            text_record_count: 1,
            text_record_size: 4096,
            version: 6,
            encoding: 65001,
            locale: 0x0409,
            extra_flags: 0,
            image_index: NOTSET,
            fdst_index: NOTSET,
            fdst_section_count: 0,
            ncx_index: NOTSET,
            fragment_index: NOTSET,
            skeleton_index: NOTSET,
            exth: Vec::new(),
            full_name: None,
        }
    }
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

/// Assemble record 0: PalmDOC header, MOBI header, optional EXTH block
/// and full-name payload.
pub fn build_record0(opts: &Record0Opts) -> Vec<u8> {
    let mut buf = vec![0u8; 16 + MOBI_HEADER_LENGTH as usize];
    put_u16(&mut buf, 0, opts.compression);
    put_u32(&mut buf, 4, opts.text_length);
    put_u16(&mut buf, 8, opts.text_record_count);
    put_u16(&mut buf, 10, opts.text_record_size);
    put_u16(&mut buf, 12, opts.encryption);

    buf[16..20].copy_from_slice(b"MOBI");
    put_u32(&mut buf, 20, MOBI_HEADER_LENGTH);
    put_u32(&mut buf, 24, 2); // mobi type: book
    put_u32(&mut buf, 28, opts.encoding);
    put_u32(&mut buf, 32, 0x1234); // uid
    put_u32(&mut buf, 36, opts.version);
    for offset in (40..=80).step_by(4) {
        put_u32(&mut buf, offset, NOTSET); // index block
    }
    put_u32(&mut buf, 92, opts.locale);
    put_u32(&mut buf, 104, opts.version); // min_version
    put_u32(&mut buf, 108, opts.image_index);
    put_u32(&mut buf, 112, NOTSET); // huff record index
    if !opts.exth.is_empty() {
        put_u32(&mut buf, 128, 0x40);
    }
    put_u32(&mut buf, 164, NOTSET);
    put_u32(&mut buf, 168, NOTSET); // drm offset
    put_u32(&mut buf, 192, opts.fdst_index);
    put_u32(&mut buf, 196, opts.fdst_section_count);
    put_u16(&mut buf, 242, opts.extra_flags);
    put_u32(&mut buf, 244, opts.ncx_index);
    put_u32(&mut buf, 248, opts.fragment_index);
    put_u32(&mut buf, 252, opts.skeleton_index);
    put_u32(&mut buf, 256, NOTSET); // datp index
    put_u32(&mut buf, 260, NOTSET); // guide index

    if !opts.exth.is_empty() {
        let mut w = Writer::new();
        w.add_raw(b"EXTH");
        let length: usize = 12 + opts.exth.iter().map(|(_, d)| d.len() + 8).sum::<usize>();
        w.add_u32(length as u32);
        w.add_u32(opts.exth.len() as u32);
        for (tag, data) in &opts.exth {
            w.add_u32(*tag);
            w.add_u32((data.len() + 8) as u32);
            w.add_raw(data);
        }
        buf.extend_from_slice(&w.into_inner());
    }

    if let Some(name) = &opts.full_name {
        let offset = buf.len() as u32;
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
        put_u32(&mut buf, 84, offset);
        put_u32(&mut buf, 88, name.len() as u32);
    }
    buf
}

/// Wrap records in a PalmDB container with a BOOKMOBI signature.
pub fn build_file(records: &[Vec<u8>]) -> Vec<u8> {
    let mut w = Writer::new();
    w.add_string("synthetic book");
    w.add_zeros(32 - 14);
    w.add_u16(0); // attributes
    w.add_u16(0); // version
    w.add_u32(0); // ctime
    w.add_u32(0); // mtime
    w.add_u32(0); // btime
    w.add_u32(0); // mod num
    w.add_u32(0); // appinfo
    w.add_u32(0); // sortinfo
    w.add_raw(b"BOOK");
    w.add_raw(b"MOBI");
    w.add_u32(1);
    w.add_u32(0);
    w.add_u16(records.len() as u16);

    let mut offset = PALMDB_HEADER_LEN + records.len() * RECORD_INFO_LEN;
    for (i, record) in records.iter().enumerate() {
        w.add_u32(offset as u32);
        w.add_u8(0);
        w.add_u8(0);
        w.add_u16(i as u16 * 2);
        offset += record.len();
    }
    for record in records {
        w.add_raw(record);
    }
    w.into_inner()
}

/// A minimal valid uncompressed book: record 0 plus one text record.
pub fn minimal_book(text: &[u8]) -> Vec<u8> {
    let record0 = build_record0(&Record0Opts {
        text_length: text.len() as u32,
        full_name: Some("Synthetic Book".to_string()),
        ..Default::default()
    });
    build_file(&[record0, text.to_vec()])
}
