//! Property tests: the decoder must stay in bounds and never panic on
//! malformed input, and the codecs must round-trip.

mod common;

use common::minimal_book;
use proptest::prelude::*;
use rawml::buffer::{Reader, Writer};
use rawml::{palmdoc, Document};

proptest! {
    #[test]
    fn load_never_panics_on_random_bytes(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        // errors are fine, panics are not
        let _ = Document::load(&data);
    }

    #[test]
    fn load_survives_single_byte_mutation(pos in 0usize..256, byte in any::<u8>()) {
        let mut file = minimal_book(b"<html><body>mutation target</body></html>");
        let pos = pos % file.len();
        file[pos] = byte;
        if let Ok(doc) = Document::load(&file) {
            let _ = doc.rawml();
            let _ = doc.parse_rawml();
            let _ = doc.full_name();
        }
    }

    #[test]
    fn varlen_roundtrip(value in 0u32..(1 << 28)) {
        let mut w = Writer::new();
        let written = w.add_varlen(value);
        prop_assert!((1..=4).contains(&written));
        let bytes = w.into_inner();
        let mut r = Reader::new(&bytes);
        let (decoded, consumed) = r.get_varlen();
        prop_assert_eq!(decoded, value);
        prop_assert_eq!(consumed, written);
    }

    #[test]
    fn palmdoc_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..2000)) {
        let compressed = palmdoc::compress(&data);
        let decompressed = palmdoc::decompress(&compressed, data.len().max(1)).unwrap();
        prop_assert_eq!(decompressed, data);
    }

    #[test]
    fn palmdoc_decompress_terminates_on_garbage(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        // bounded output whatever the input
        if let Ok(out) = palmdoc::decompress(&data, 4096) {
            prop_assert!(out.len() <= 4096);
        }
    }
}
