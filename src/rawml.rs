//! Rawml reconstruction: flow split, resource records, skeleton+fragment
//! markup assembly, link rewriting, and encoding normalization.

use crate::buffer::Reader;
use crate::document::Document;
use crate::encoding::cp1252_to_utf8;
use crate::error::{Error, Result};
use crate::headers::index_opt;
use crate::index::{
    self, Index, TAG_FRAG_FILE_NR, TAG_FRAG_LENGTH, TAG_FRAG_POSITION, TAG_SKEL_COUNT,
    TAG_SKEL_LENGTH, TAG_SKEL_POSITION,
};
use crate::links;
use crate::resources::{
    decode_font_resource, decode_media_resource, determine_flow_type, determine_resource_type,
    file_meta, FileType,
};

pub const FDST_MAGIC: &[u8] = b"FDST";
pub const REPLICA_MAGIC: &[u8] = b"%MOP";

/// One reconstructed part: a flow section, an HTML markup part, or a
/// decoded resource.
#[derive(Debug, Clone)]
pub struct Part {
    pub uid: u32,
    pub file_type: FileType,
    pub data: Vec<u8>,
}

impl Part {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Output file name for this part in its list role.
    pub fn file_name(&self, role: PartRole) -> String {
        let ext = file_meta(self.file_type).extension;
        match role {
            PartRole::Markup => format!("part{:05}.{ext}", self.uid),
            PartRole::Flow => format!("flow{:05}.{ext}", self.uid),
            PartRole::Resource => format!("resource{:05}.{ext}", self.uid),
        }
    }
}

/// Which list a part belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartRole {
    Markup,
    Flow,
    Resource,
}

/// The reconstructed document tree. Owns every part and parsed index.
#[derive(Default)]
pub struct Rawml {
    pub version: Option<u32>,
    pub flow: Vec<Part>,
    pub markup: Vec<Part>,
    pub resources: Vec<Part>,
    pub fdst: Option<Vec<(u32, u32)>>,
    pub skel: Option<Index>,
    pub frag: Option<Index>,
    pub guide: Option<Index>,
    pub ncx: Option<Index>,
    pub orth: Option<Index>,
}

impl Rawml {
    pub fn is_kf8(&self) -> bool {
        self.version.is_some_and(|v| v >= 8)
    }

    pub fn markup_by_uid(&self, uid: u32) -> Option<&Part> {
        self.markup.iter().find(|p| p.uid == uid)
    }

    pub fn flow_by_uid(&self, uid: u32) -> Option<&Part> {
        self.flow.iter().find(|p| p.uid == uid)
    }

    pub fn resource_by_uid(&self, uid: u32) -> Option<&Part> {
        self.resources.iter().find(|p| p.uid == uid)
    }
}

/// Flow-division table: `(start, end)` byte pairs over the rawml text.
pub fn parse_fdst(data: &[u8]) -> Result<Vec<(u32, u32)>> {
    let mut reader = Reader::new(data);
    if !reader.match_magic(FDST_MAGIC) {
        return Err(Error::corrupt("FDST magic not found"));
    }
    reader.seek(4);
    let section_offset = reader.get_u32() as usize;
    let section_count = reader.get_u32() as usize;
    reader.ok()?;
    reader.set_pos(section_offset);
    if section_count * 8 > reader.remaining() {
        return Err(Error::corrupt("FDST section table exceeds record size"));
    }
    let mut sections = Vec::with_capacity(section_count);
    for _ in 0..section_count {
        let start = reader.get_u32();
        let end = reader.get_u32();
        if reader.failed() {
            return Err(Error::corrupt("FDST section table truncated"));
        }
        sections.push((start, end));
    }
    Ok(sections)
}

/// Split the decompressed text into flow parts along the FDST table, or
/// extract the Print Replica PDF, or keep a single HTML flow.
fn reconstruct_flow(rawml: &mut Rawml, text: &[u8]) -> Result<()> {
    if let Some(sections) = rawml.fdst.as_ref().filter(|s| s.len() > 1) {
        for (i, &(start, end)) in sections.iter().enumerate() {
            let (start, end) = (start as usize, end as usize);
            if start > end || end > text.len() {
                return Err(Error::corrupt(format!(
                    "FDST section {i} out of bounds: {start}..{end}"
                )));
            }
            let data = text[start..end].to_vec();
            rawml.flow.push(Part {
                uid: i as u32,
                file_type: determine_flow_type(&data, i),
                data,
            });
        }
        return Ok(());
    }

    if text.starts_with(REPLICA_MAGIC) {
        // Print Replica container: offset and length of the wrapped PDF
        // live at bytes 12..20
        let mut reader = Reader::new(text);
        reader.set_pos(12);
        let pdf_offset = reader.get_u32() as usize;
        let pdf_length = reader.get_u32() as usize;
        reader.ok()?;
        if pdf_offset + pdf_length > text.len() {
            return Err(Error::corrupt("replica PDF bounds exceed text"));
        }
        rawml.flow.push(Part {
            uid: 0,
            file_type: FileType::Pdf,
            data: text[pdf_offset..pdf_offset + pdf_length].to_vec(),
        });
        return Ok(());
    }

    rawml.flow.push(Part {
        uid: 0,
        file_type: FileType::Html,
        data: text.to_vec(),
    });
    Ok(())
}

/// Walk resource records from the first-resource index, classify them by
/// magic, and decode FONT/AUDI/VIDE payloads. Stops at a BOUNDARY record.
fn reconstruct_resources(doc: &Document, rawml: &mut Rawml) -> Result<()> {
    let first = doc
        .mobi_header()
        .and_then(|m| index_opt(m.image_index))
        .map(|v| v as usize)
        .unwrap_or(0);

    let mut uid = 0u32;
    let mut seq = doc.record_offset() + first;
    while let Some(record) = doc.record_by_seq(seq) {
        seq += 1;
        let file_type = determine_resource_type(&record.data);
        match file_type {
            FileType::Unknown => {
                uid += 1;
                continue;
            }
            FileType::Break => break,
            FileType::Font => {
                match decode_font_resource(&record.data) {
                    Ok((data, kind)) => rawml.resources.push(Part {
                        uid,
                        file_type: kind,
                        data,
                    }),
                    Err(e) => log::warn!("skipping font resource {uid}: {e}"),
                }
            }
            FileType::Audio | FileType::Video => {
                let kind = if file_type == FileType::Audio {
                    FileType::Mp3
                } else {
                    FileType::Mp4
                };
                match decode_media_resource(&record.data) {
                    Ok(data) => rawml.resources.push(Part {
                        uid,
                        file_type: kind,
                        data,
                    }),
                    Err(e) => log::warn!("skipping media resource {uid}: {e}"),
                }
            }
            _ => rawml.resources.push(Part {
                uid,
                file_type,
                data: record.data.clone(),
            }),
        }
        uid += 1;
    }
    Ok(())
}

/// Assemble markup parts by splicing fragment chunks into their skeleton
/// at the labeled insert positions.
fn reconstruct_parts(rawml: &mut Rawml) -> Result<()> {
    let flow0 = rawml
        .flow
        .first()
        .ok_or(Error::Uninitialized("flow parts not reconstructed"))?;

    let (Some(skel), Some(frag)) = (rawml.skel.as_ref(), rawml.frag.as_ref()) else {
        // no skeleton data: the whole flow is one markup part
        rawml.markup.push(Part {
            uid: 0,
            file_type: flow0.file_type,
            data: flow0.data.clone(),
        });
        return Ok(());
    };

    let text = flow0.data.as_slice();
    let mut markup = Vec::with_capacity(skel.entries.len());
    let mut frag_cursor = 0usize;
    for (i, entry) in skel.entries.iter().enumerate() {
        let count = entry
            .tag_value(TAG_SKEL_COUNT)
            .ok_or_else(|| Error::corrupt("skeleton entry missing fragment count"))?;
        let position = entry
            .tag_value(TAG_SKEL_POSITION)
            .ok_or_else(|| Error::corrupt("skeleton entry missing position"))?
            as usize;
        let length = entry
            .tag_value(TAG_SKEL_LENGTH)
            .ok_or_else(|| Error::corrupt("skeleton entry missing length"))? as usize;
        if position + length > text.len() {
            return Err(Error::corrupt(format!(
                "skeleton {i} out of bounds: {position}+{length}"
            )));
        }
        let mut skel_text = text[position..position + length].to_vec();

        for _ in 0..count {
            let frag_entry = frag.entries.get(frag_cursor).ok_or_else(|| {
                Error::corrupt(format!("fragment {frag_cursor} missing for skeleton {i}"))
            })?;
            frag_cursor += 1;

            let file_nr = frag_entry
                .tag_value(TAG_FRAG_FILE_NR)
                .ok_or_else(|| Error::corrupt("fragment entry missing file number"))?;
            if file_nr as usize != i {
                return Err(Error::corrupt(format!(
                    "fragment file number {file_nr} does not match skeleton {i}"
                )));
            }
            let frag_position = frag_entry
                .tag_value(TAG_FRAG_POSITION)
                .ok_or_else(|| Error::corrupt("fragment entry missing position"))?
                as usize;
            let frag_length = frag_entry
                .tag_value(TAG_FRAG_LENGTH)
                .ok_or_else(|| Error::corrupt("fragment entry missing length"))?
                as usize;
            if frag_position + frag_length > text.len() {
                return Err(Error::corrupt(format!(
                    "fragment {} out of bounds: {frag_position}+{frag_length}",
                    frag_cursor - 1
                )));
            }

            // the label is the decimal insert position in the assembled
            // stream; make it skeleton-relative
            let insert_position = links::parse_leading_u32(&frag_entry.label) as usize;
            let local = insert_position.checked_sub(position).ok_or_else(|| {
                Error::corrupt(format!(
                    "fragment insert position {insert_position} before skeleton {i}"
                ))
            })?;
            if local > skel_text.len() {
                return Err(Error::corrupt(format!(
                    "fragment insert position {insert_position} past skeleton {i} end"
                )));
            }
            skel_text.splice(local..local, text[frag_position..frag_position + frag_length].iter().copied());
        }

        markup.push(Part {
            uid: i as u32,
            file_type: FileType::Html,
            data: skel_text,
        });
    }
    rawml.markup = markup;
    Ok(())
}

/// Transcode CP-1252 markup and stylesheet parts to UTF-8 in place.
fn markup_to_utf8(rawml: &mut Rawml) {
    let convert = |part: &mut Part| {
        if matches!(part.file_type, FileType::Html | FileType::Css) {
            part.data = cp1252_to_utf8(&part.data).into_bytes();
        }
    };
    rawml.markup.iter_mut().for_each(convert);
    rawml.flow.iter_mut().skip(1).for_each(convert);
}

/// Run the full reconstruction pipeline over a loaded document.
pub fn parse_rawml(doc: &Document) -> Result<Rawml> {
    let text = doc.rawml()?;
    let mut rawml = Rawml {
        version: doc.version(),
        ..Default::default()
    };

    let mobi = doc.mobi_header();
    let record_bytes = |seq: usize| doc.half_record(seq).map(|r| r.data.as_slice());

    // FDST flow table (KF8)
    if let Some(mobi) = mobi {
        if mobi.fdst_section_count.unwrap_or(0) > 1 {
            if let Some(fdst_index) = index_opt(mobi.fdst_index) {
                rawml.fdst = Some(parse_fdst(record_bytes(fdst_index as usize)?)?);
            }
        }
    }

    reconstruct_flow(&mut rawml, &text)?;
    reconstruct_resources(doc, &mut rawml)?;

    if let Some(mobi) = mobi {
        let skel_index = index_opt(mobi.skeleton_index);
        let frag_index = index_opt(mobi.fragment_index);
        if let (Some(skel), Some(frag)) = (skel_index, frag_index) {
            rawml.skel = Some(index::parse_index(record_bytes, skel as usize)?);
            rawml.frag = Some(index::parse_index(record_bytes, frag as usize)?);
        }

        // secondary indices are optional: corruption drops the index, not
        // the whole document
        if let Some(guide) = index_opt(mobi.guide_index) {
            match index::parse_index(record_bytes, guide as usize) {
                Ok(index) => rawml.guide = Some(index),
                Err(e) => log::warn!("dropping corrupt guide index: {e}"),
            }
        }
        if let Some(ncx) = index_opt(mobi.ncx_index) {
            match index::parse_index(record_bytes, ncx as usize) {
                Ok(index) => rawml.ncx = Some(index),
                Err(e) => log::warn!("dropping corrupt ncx index: {e}"),
            }
        }
        if !mobi.is_kf8() {
            if let Some(orth) = index_opt(mobi.orth_index) {
                match index::parse_index(record_bytes, orth as usize) {
                    Ok(index) => rawml.orth = Some(index),
                    Err(e) => log::warn!("dropping corrupt orth index: {e}"),
                }
            }
        }
    }

    reconstruct_parts(&mut rawml)?;
    links::reconstruct_links(&mut rawml)?;
    if doc.is_cp1252() {
        markup_to_utf8(&mut rawml);
    }
    Ok(rawml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Writer;

    #[test]
    fn test_parse_fdst() {
        let mut w = Writer::new();
        w.add_raw(FDST_MAGIC);
        w.add_u32(12);
        w.add_u32(2);
        w.add_u32(0);
        w.add_u32(1000);
        w.add_u32(1000);
        w.add_u32(2500);
        let sections = parse_fdst(&w.into_inner()).unwrap();
        assert_eq!(sections, vec![(0, 1000), (1000, 2500)]);
    }

    #[test]
    fn test_parse_fdst_bad_magic() {
        assert!(parse_fdst(b"JUNK\x00\x00\x00\x0c\x00\x00\x00\x00").is_err());
    }

    #[test]
    fn test_flow_split() {
        let mut rawml = Rawml {
            fdst: Some(vec![(0, 11), (11, 27)]),
            ..Default::default()
        };
        let text = b"<html></html>p { margin: 0 }";
        // section bounds intentionally cover only part of the text
        let text = &text[..27];
        reconstruct_flow(&mut rawml, text).unwrap();
        assert_eq!(rawml.flow.len(), 2);
        assert_eq!(rawml.flow[0].file_type, FileType::Html);
        assert_eq!(rawml.flow[1].file_type, FileType::Css);
        assert_eq!(rawml.flow[0].data, &text[..11]);
    }

    #[test]
    fn test_flow_split_out_of_bounds() {
        let mut rawml = Rawml {
            fdst: Some(vec![(0, 10), (10, 500)]),
            ..Default::default()
        };
        assert!(reconstruct_flow(&mut rawml, b"short text here").is_err());
    }

    #[test]
    fn test_flow_replica() {
        let mut w = Writer::new();
        w.add_raw(REPLICA_MAGIC);
        w.add_zeros(8);
        w.add_u32(24); // pdf offset
        w.add_u32(8); // pdf length
        w.add_zeros(4);
        w.add_raw(b"%PDF-1.4");
        let text = w.into_inner();
        let mut rawml = Rawml::default();
        reconstruct_flow(&mut rawml, &text).unwrap();
        assert_eq!(rawml.flow.len(), 1);
        assert_eq!(rawml.flow[0].file_type, FileType::Pdf);
        assert_eq!(rawml.flow[0].data, b"%PDF-1.4");
    }

    #[test]
    fn test_single_flow() {
        let mut rawml = Rawml::default();
        reconstruct_flow(&mut rawml, b"<html>whole book</html>").unwrap();
        assert_eq!(rawml.flow.len(), 1);
        assert_eq!(rawml.flow[0].file_type, FileType::Html);
    }

    #[test]
    fn test_parts_without_skeleton() {
        let mut rawml = Rawml::default();
        reconstruct_flow(&mut rawml, b"<html>plain</html>").unwrap();
        reconstruct_parts(&mut rawml).unwrap();
        assert_eq!(rawml.markup.len(), 1);
        assert_eq!(rawml.markup[0].data, b"<html>plain</html>");
    }

    fn index_of(entries: Vec<crate::index::IndexEntry>) -> Index {
        Index {
            entries,
            ..Default::default()
        }
    }

    fn entry(label: &str, tags: &[(u8, &[u32])]) -> crate::index::IndexEntry {
        crate::index::IndexEntry {
            label: label.to_string(),
            tags: tags
                .iter()
                .map(|&(tag_id, values)| crate::index::IndexTag {
                    tag_id,
                    values: values.to_vec(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_parts_skeleton_assembly() {
        let text = b"<html><body></body></html>FRAGMENT";
        let mut rawml = Rawml {
            version: Some(8),
            skel: Some(index_of(vec![entry(
                "SKEL0000",
                &[(1, &[1]), (6, &[0, 26])],
            )])),
            frag: Some(index_of(vec![entry(
                "12",
                &[(2, &[0]), (3, &[0]), (4, &[0]), (6, &[26, 8])],
            )])),
            ..Default::default()
        };
        reconstruct_flow(&mut rawml, text).unwrap();
        reconstruct_parts(&mut rawml).unwrap();
        assert_eq!(rawml.markup.len(), 1);
        assert_eq!(
            rawml.markup[0].data,
            b"<html><body>FRAGMENT</body></html>"
        );
    }

    #[test]
    fn test_parts_fragment_file_number_mismatch() {
        let text = b"0123456789ABCDEF";
        let mut rawml = Rawml {
            version: Some(8),
            skel: Some(index_of(vec![entry("S", &[(1, &[1]), (6, &[0, 8])])])),
            frag: Some(index_of(vec![entry(
                "4",
                &[(2, &[0]), (3, &[5]), (4, &[0]), (6, &[8, 4])],
            )])),
            ..Default::default()
        };
        reconstruct_flow(&mut rawml, text).unwrap();
        assert!(reconstruct_parts(&mut rawml).is_err());
    }

    #[test]
    fn test_part_file_names() {
        let part = Part {
            uid: 3,
            file_type: FileType::Css,
            data: Vec::new(),
        };
        assert_eq!(part.file_name(PartRole::Flow), "flow00003.css");
        let part = Part {
            uid: 0,
            file_type: FileType::Html,
            data: Vec::new(),
        };
        assert_eq!(part.file_name(PartRole::Markup), "part00000.html");
    }
}
