//! End-to-end decoding of synthetic MOBI containers.

mod common;

use common::{build_file, build_record0, minimal_book, Record0Opts};
use rawml::headers::{COMPRESSION_PALMDOC, ENCRYPTION_MOBIPOCKET};
use rawml::{palmdoc, Document, Error, LoadOptions, TextDecryptor};

#[test]
fn test_load_minimal_book() {
    let text = b"<html><body><p>Hello</p></body></html>";
    let file = minimal_book(text);
    let doc = Document::load(&file).unwrap();

    assert_eq!(doc.pdb.name, "synthetic book");
    assert_eq!(doc.record_count(), 2);
    assert_eq!(doc.full_name().as_deref(), Some("Synthetic Book"));
    assert_eq!(doc.rawml().unwrap(), text);
    assert!(doc.kf8_boundary().is_none());
    assert!(!doc.is_hybrid());
}

#[test]
fn test_palmdoc_compressed_text() {
    let text = b"Hello, World! Hello, World!";
    let record0 = build_record0(&Record0Opts {
        compression: COMPRESSION_PALMDOC,
        text_length: text.len() as u32,
        ..Default::default()
    });
    let file = build_file(&[record0, palmdoc::compress(text)]);
    let doc = Document::load(&file).unwrap();
    assert_eq!(doc.rawml().unwrap(), text);
}

#[test]
fn test_dump_rawml_matches_rawml() {
    let text = b"stream me";
    let file = minimal_book(text);
    let doc = Document::load(&file).unwrap();
    let mut out = Vec::new();
    doc.dump_rawml(&mut out).unwrap();
    assert_eq!(out, doc.rawml().unwrap());
}

#[test]
fn test_trailing_data_stripped() {
    let text = b"visible text";
    let mut record = text.to_vec();
    record.extend_from_slice(&[0xAA, 0xBB, 0x83]); // 3-byte trailing region
    let record0 = build_record0(&Record0Opts {
        text_length: text.len() as u32,
        extra_flags: 0b10,
        ..Default::default()
    });
    let file = build_file(&[record0, record]);
    let doc = Document::load(&file).unwrap();
    assert_eq!(doc.rawml().unwrap(), text);
}

#[test]
fn test_record_lookup() {
    let file = minimal_book(b"text");
    let doc = Document::load(&file).unwrap();
    assert_eq!(doc.record_by_seq(1).unwrap().data, b"text");
    // builder assigns uid 2*i
    assert_eq!(doc.record_by_uid(2).unwrap().data, b"text");
    assert!(doc.record_by_seq(99).is_none());
}

#[test]
fn test_rejects_non_palm_file() {
    assert!(matches!(
        Document::load(b"not a palmdb file at all"),
        Err(Error::BufferEnd) | Err(Error::Corrupt(_)) | Err(Error::UnsupportedFormat(_))
    ));
}

#[test]
fn test_parse_rawml_single_part() {
    let text = b"<html><body><p>one part</p></body></html>";
    let file = minimal_book(text);
    let doc = Document::load(&file).unwrap();
    let rawml = doc.parse_rawml().unwrap();
    assert_eq!(rawml.flow.len(), 1);
    assert_eq!(rawml.markup.len(), 1);
    assert_eq!(rawml.markup[0].data, text);
}

fn hybrid_file() -> Vec<u8> {
    let kf7_text = b"KF7 half text".to_vec();
    let kf8_text = b"KF8 half text".to_vec();
    // records: kf7 record0, kf7 text, BOUNDARY, kf8 record0, kf8 text
    // EXTH 121 holds the one-based boundary record number
    let kf7_record0 = build_record0(&Record0Opts {
        text_length: kf7_text.len() as u32,
        version: 6,
        exth: vec![(121, 3u32.to_be_bytes().to_vec())],
        full_name: Some("Hybrid KF7".to_string()),
        ..Default::default()
    });
    let kf8_record0 = build_record0(&Record0Opts {
        text_length: kf8_text.len() as u32,
        version: 8,
        full_name: Some("Hybrid KF8".to_string()),
        ..Default::default()
    });
    build_file(&[
        kf7_record0,
        kf7_text,
        b"BOUNDARY".to_vec(),
        kf8_record0,
        kf8_text,
    ])
}

#[test]
fn test_hybrid_defaults_to_kf8() {
    let doc = Document::load(&hybrid_file()).unwrap();
    assert!(doc.is_hybrid());
    assert_eq!(doc.kf8_boundary(), Some(2));
    assert_eq!(doc.version(), Some(8));
    assert_eq!(doc.full_name().as_deref(), Some("Hybrid KF8"));
    assert_eq!(doc.rawml().unwrap(), b"KF8 half text");
}

#[test]
fn test_hybrid_prefer_kf7() {
    let doc =
        Document::load_with(&hybrid_file(), LoadOptions { prefer_kf7: true }).unwrap();
    assert_eq!(doc.version(), Some(6));
    assert_eq!(doc.full_name().as_deref(), Some("Hybrid KF7"));
    assert_eq!(doc.rawml().unwrap(), b"KF7 half text");
}

#[test]
fn test_hybrid_swap_is_involutive() {
    let mut doc = Document::load(&hybrid_file()).unwrap();
    assert_eq!(doc.version(), Some(8));
    assert!(doc.swap_halves());
    assert_eq!(doc.version(), Some(6));
    assert_eq!(doc.rawml().unwrap(), b"KF7 half text");
    assert!(doc.swap_halves());
    assert_eq!(doc.version(), Some(8));
    assert_eq!(doc.rawml().unwrap(), b"KF8 half text");
}

#[test]
fn test_swap_is_noop_for_plain_files() {
    let mut doc = Document::load(&minimal_book(b"text")).unwrap();
    assert!(!doc.swap_halves());
    assert_eq!(doc.rawml().unwrap(), b"text");
}

struct XorDecryptor(u8);

impl TextDecryptor for XorDecryptor {
    fn decrypt(&self, record: &[u8], _seq_number: usize) -> rawml::Result<Vec<u8>> {
        Ok(record.iter().map(|b| b ^ self.0).collect())
    }
}

#[test]
fn test_encrypted_without_decryptor() {
    let text: Vec<u8> = b"secret text".iter().map(|b| b ^ 0x5A).collect();
    let record0 = build_record0(&Record0Opts {
        encryption: ENCRYPTION_MOBIPOCKET,
        text_length: text.len() as u32,
        ..Default::default()
    });
    let file = build_file(&[record0, text]);
    let doc = Document::load(&file).unwrap();
    assert!(matches!(doc.rawml(), Err(Error::UnsupportedFormat(_))));
}

#[test]
fn test_encrypted_with_decryptor() {
    let text: Vec<u8> = b"secret text".iter().map(|b| b ^ 0x5A).collect();
    let record0 = build_record0(&Record0Opts {
        encryption: ENCRYPTION_MOBIPOCKET,
        text_length: text.len() as u32,
        ..Default::default()
    });
    let file = build_file(&[record0, text]);
    let mut doc = Document::load(&file).unwrap();
    doc.set_decryptor(Box::new(XorDecryptor(0x5A)));
    assert_eq!(doc.rawml().unwrap(), b"secret text");
}
