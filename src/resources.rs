//! Resource record classification and decoding.
//!
//! Records after the first-resource index are classified by magic prefix.
//! FONT records may be zlib-deflated and XOR-obfuscated; AUDI/VIDE records
//! wrap their payload behind a header-declared offset.

use std::io::Read;

use crate::buffer::Reader;
use crate::error::{Error, Result};

pub const FONT_MAGIC: &[u8] = b"FONT";
pub const AUDIO_MAGIC: &[u8] = b"AUDI";
pub const VIDEO_MAGIC: &[u8] = b"VIDE";
pub const BOUNDARY_MAGIC: &[u8] = b"BOUNDARY";
/// Trailing end-of-file marker record.
pub const EOF_MAGIC: &[u8] = b"\xE9\x8E\r\n";

const FONT_HEADER_LEN: usize = 24;
const FONT_OBFUSCATION_BLOCK: usize = 1040;

/// Content type of a flow, markup or resource part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Html,
    Css,
    Svg,
    Opf,
    Ncx,
    Jpg,
    Gif,
    Png,
    Bmp,
    Otf,
    Ttf,
    Mp3,
    Mp4,
    Pdf,
    Font,
    Audio,
    Video,
    Break,
    Unknown,
}

/// Extension and MIME metadata for a [`FileType`].
pub struct FileMeta {
    pub extension: &'static str,
    pub mime_type: &'static str,
}

/// Static metadata table.
pub fn file_meta(file_type: FileType) -> FileMeta {
    let (extension, mime_type) = match file_type {
        FileType::Html => ("html", "application/xhtml+xml"),
        FileType::Css => ("css", "text/css"),
        FileType::Svg => ("svg", "image/svg+xml"),
        FileType::Opf => ("opf", "application/oebps-package+xml"),
        FileType::Ncx => ("ncx", "application/x-dtbncx+xml"),
        FileType::Jpg => ("jpg", "image/jpeg"),
        FileType::Gif => ("gif", "image/gif"),
        FileType::Png => ("png", "image/png"),
        FileType::Bmp => ("bmp", "image/bmp"),
        FileType::Otf => ("otf", "application/vnd.ms-opentype"),
        FileType::Ttf => ("ttf", "application/x-font-truetype"),
        FileType::Mp3 => ("mp3", "audio/mpeg"),
        FileType::Mp4 => ("mp4", "video/mp4"),
        FileType::Pdf => ("pdf", "application/pdf"),
        _ => ("dat", "application/octet-stream"),
    };
    FileMeta {
        extension,
        mime_type,
    }
}

/// Classify a resource record by its magic prefix. `Break` marks the end
/// of the resource run; `Unknown` records are skipped but keep their
/// sequence position.
pub fn determine_resource_type(data: &[u8]) -> FileType {
    if data.len() < 4 {
        return FileType::Unknown;
    }
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        FileType::Jpg
    } else if data.starts_with(b"GIF8") {
        FileType::Gif
    } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        FileType::Png
    } else if data.starts_with(b"BM") {
        FileType::Bmp
    } else if data.starts_with(FONT_MAGIC) {
        FileType::Font
    } else if data.starts_with(AUDIO_MAGIC) {
        FileType::Audio
    } else if data.starts_with(VIDEO_MAGIC) {
        FileType::Video
    } else if data.starts_with(BOUNDARY_MAGIC) || data.starts_with(EOF_MAGIC) {
        FileType::Break
    } else {
        FileType::Unknown
    }
}

/// Sniff the type of an FDST flow section.
pub fn determine_flow_type(data: &[u8], part_number: usize) -> FileType {
    if part_number == 0 {
        return FileType::Html;
    }
    let head = &data[..data.len().min(1024)];
    if memchr::memmem::find(head, b"<svg").is_some() {
        FileType::Svg
    } else {
        FileType::Css
    }
}

/// Decode an embedded font record: strip the FONT wrapper, undo the XOR
/// obfuscation, inflate the payload, then sniff TTF vs OTF.
pub fn decode_font_resource(data: &[u8]) -> Result<(Vec<u8>, FileType)> {
    let mut reader = Reader::new(data);
    if !reader.match_magic(FONT_MAGIC) {
        return Err(Error::corrupt("FONT magic not found"));
    }
    reader.seek(4);
    let usable_size = reader.get_u32() as usize;
    let flags = reader.get_u32();
    let data_offset = reader.get_u32() as usize;
    let xor_key_len = reader.get_u32() as usize;
    let xor_key_offset = reader.get_u32() as usize;
    reader.ok()?;

    if data_offset < FONT_HEADER_LEN || data_offset > data.len() {
        return Err(Error::corrupt("FONT data offset out of bounds"));
    }
    let mut payload = data[data_offset..].to_vec();

    // flag 0x02: payload XOR-obfuscated with an embedded key
    if flags & 0x02 != 0 {
        if xor_key_len == 0 || xor_key_offset + xor_key_len > data.len() {
            return Err(Error::corrupt("FONT obfuscation key out of bounds"));
        }
        let key = &data[xor_key_offset..xor_key_offset + xor_key_len];
        for (i, byte) in payload
            .iter_mut()
            .take(FONT_OBFUSCATION_BLOCK * xor_key_len)
            .enumerate()
        {
            *byte ^= key[i % xor_key_len];
        }
    }

    // flag 0x01: payload is zlib-deflated
    if flags & 0x01 != 0 {
        let mut inflated = Vec::with_capacity(usable_size);
        let mut decoder = flate2::read::ZlibDecoder::new(payload.as_slice());
        decoder
            .read_to_end(&mut inflated)
            .map_err(|e| Error::corrupt(format!("FONT payload inflate failed: {e}")))?;
        payload = inflated;
    }

    let file_type = if payload.starts_with(b"OTTO") {
        FileType::Otf
    } else if payload.starts_with(&[0x00, 0x01, 0x00, 0x00]) || payload.starts_with(b"true") {
        FileType::Ttf
    } else {
        log::warn!("decoded font resource has unknown signature");
        FileType::Ttf
    };
    Ok((payload, file_type))
}

/// Strip the AUDI/VIDE wrapper: a magic plus a 32-bit payload offset.
pub fn decode_media_resource(data: &[u8]) -> Result<Vec<u8>> {
    let mut reader = Reader::new(data);
    reader.seek(4);
    let offset = reader.get_u32() as usize;
    reader.ok()?;
    if offset < 8 || offset > data.len() {
        return Err(Error::corrupt("media resource offset out of bounds"));
    }
    Ok(data[offset..].to_vec())
}
