//! Link rewriting: turns `kindle:` URIs, `filepos=` offsets and
//! `recindex=` references into portable `href`/`src` attributes.
//!
//! Matches are only accepted inside tag attributes (or CSS `url(...)`
//! values); the scanners track the last opening and closing delimiter to
//! reject hits in text content. Rewriting assembles a fragment list of
//! borrowed source slices and owned replacement strings, then flattens it
//! into the part's new buffer.

use crate::encoding::base32_decode;
use crate::error::{Error, Result};
use crate::fragment::FragmentList;
use crate::index::{TAG_FRAG_FILE_NR, TAG_ORTH_ENDPOS, TAG_ORTH_STARTPOS, TAG_SKEL_POSITION};
use crate::rawml::{Part, Rawml};
use crate::resources::{file_meta, FileType};
use crate::structure::OffsetArray;

/// Upper bound on a captured attribute value.
const ATTRVALUE_MAX: usize = 150;

const KINDLE_NEEDLE: &[u8] = b"kindle:";
const POSFID_PREFIX: &str = "kindle:pos:fid:";
const FLOW_PREFIX: &str = "kindle:flow:";
const EMBED_PREFIX: &str = "kindle:embed:";

/// One attribute hit: the byte range to replace and the captured value.
#[derive(Debug)]
struct AttrMatch {
    start: usize,
    end: usize,
    value: Vec<u8>,
    is_url: bool,
}

/// Find the next `kindle:` value inside a tag attribute (HTML) or url
/// value (CSS), starting at `from`.
fn search_links_kf8(data: &[u8], from: usize, is_css: bool) -> Option<AttrMatch> {
    let (tag_open, tag_close) = if is_css { (b'{', b'}') } else { (b'<', b'>') };
    let mut last_border = tag_close;
    let mut i = from;
    while i < data.len() {
        let byte = data[i];
        if byte == tag_open || byte == tag_close {
            last_border = byte;
        }
        if data[i..].starts_with(KINDLE_NEEDLE) {
            if last_border != tag_open {
                // not inside a tag or rule body
                i += KINDLE_NEEDLE.len();
                continue;
            }
            // walk back to the value start
            let mut back = i as isize;
            while back >= from as isize {
                let c = data[back as usize];
                if c.is_ascii_whitespace() || c == tag_open || c == b'=' || c == b'(' {
                    break;
                }
                back -= 1;
            }
            let is_url = back >= 0 && data[back as usize] == b'(';
            let start = (back + 1) as usize;
            let (end, value) = capture_value(data, start, &[tag_close, b')']);
            return Some(AttrMatch {
                start,
                end,
                value,
                is_url,
            });
        }
        i += 1;
    }
    None
}

/// Find the next `filepos=` or `recindex=` attribute in KF7 markup.
fn search_links_kf7(data: &[u8], from: usize) -> Option<AttrMatch> {
    let mut last_border = b'>';
    let mut i = from;
    while i < data.len() {
        let byte = data[i];
        if byte == b'<' || byte == b'>' {
            last_border = byte;
        }
        if data[i..].starts_with(b"filepos=") || data[i..].starts_with(b"recindex=") {
            if last_border != b'<' {
                i += 8;
                continue;
            }
            // the whole name=value attribute is replaced
            let mut back = i as isize;
            while back >= from as isize {
                let c = data[back as usize];
                if c.is_ascii_whitespace() || c == b'<' {
                    break;
                }
                back -= 1;
            }
            let start = (back + 1) as usize;
            let (end, value) = capture_value(data, start, &[b'>']);
            return Some(AttrMatch {
                start,
                end,
                value,
                is_url: false,
            });
        }
        i += 1;
    }
    None
}

/// Capture a value from `start` until whitespace or a stop byte; trailing
/// `/` of a self-closing tag is excluded.
fn capture_value(data: &[u8], start: usize, stops: &[u8]) -> (usize, Vec<u8>) {
    let mut end = start;
    let mut value = Vec::new();
    while end < data.len()
        && !data[end].is_ascii_whitespace()
        && !stops.contains(&data[end])
        && value.len() < ATTRVALUE_MAX
    {
        value.push(data[end]);
        end += 1;
    }
    if end < data.len() && data[end] == b'>' && value.last() == Some(&b'/') {
        end -= 1;
        value.pop();
    }
    (end, value)
}

/// Value and position of the first `attr=` occurrence in `data`.
/// `only_quoted` rejects unquoted values (e.g. bare `filepos=00012`).
fn attribute_value(data: &[u8], attr: &str, only_quoted: bool) -> Option<(usize, Vec<u8>)> {
    let needle = [attr.as_bytes(), b"="].concat();
    let mut last_border = 0u8;
    let mut i = 0;
    while i < data.len() {
        let byte = data[i];
        if byte == b'<' || byte == b'>' {
            last_border = byte;
        }
        if data[i..].starts_with(&needle) && i + needle.len() < data.len() {
            if last_border == b'>' {
                // inside text content
                i += needle.len();
                continue;
            }
            // the attribute name must follow a tag start or whitespace
            if i > 0 && data[i - 1] != b'<' && !data[i - 1].is_ascii_whitespace() {
                i += needle.len();
                continue;
            }
            let mut pos = i + needle.len();
            let separator = match data[pos] {
                q @ (b'"' | b'\'') => {
                    pos += 1;
                    q
                }
                _ if only_quoted => {
                    i += needle.len();
                    continue;
                }
                _ => b' ',
            };
            let value_start = pos;
            let mut value = Vec::new();
            while pos < data.len()
                && data[pos] != separator
                && data[pos] != b'>'
                && value.len() < ATTRVALUE_MAX
            {
                value.push(data[pos]);
                pos += 1;
            }
            return Some((value_start, value));
        }
        i += 1;
    }
    None
}

/// Parse the leading decimal digits of a label.
pub(crate) fn parse_leading_u32(label: &str) -> u32 {
    let digits: String = label.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// Resolve `kindle:pos:fid:x:off:y` to a skeleton part number and an
/// offset from that part's beginning.
fn offset_by_posoff(rawml: &Rawml, pos_fid: u32, pos_off: u32) -> Result<(u32, usize)> {
    let frag = rawml
        .frag
        .as_ref()
        .ok_or(Error::Uninitialized("fragment index not parsed"))?;
    let skel = rawml
        .skel
        .as_ref()
        .ok_or(Error::Uninitialized("skeleton index not parsed"))?;
    let entry = frag
        .entries
        .get(pos_fid as usize)
        .ok_or_else(|| Error::corrupt(format!("no fragment entry for pos:fid:{pos_fid}")))?;
    let insert_position = parse_leading_u32(&entry.label) as usize;
    let file_nr = entry
        .tag_value(TAG_FRAG_FILE_NR)
        .ok_or_else(|| Error::corrupt("fragment entry missing file number"))?;
    let skel_entry = skel
        .entries
        .get(file_nr as usize)
        .ok_or_else(|| Error::corrupt(format!("no skeleton entry {file_nr}")))?;
    let skel_position = skel_entry
        .tag_value(TAG_SKEL_POSITION)
        .ok_or_else(|| Error::corrupt("skeleton entry missing position"))? as usize;
    let offset = insert_position
        .checked_sub(skel_position)
        .ok_or_else(|| Error::corrupt("fragment insert position before its skeleton"))?;
    Ok((file_nr, offset + pos_off as usize))
}

/// Closest `id` (or `aid`) attribute value at or after `offset` in a part.
fn id_by_offset(part: &Part, offset: usize) -> Result<String> {
    if offset > part.data.len() {
        return Err(Error::corrupt(format!(
            "id search offset {offset} past part end"
        )));
    }
    let window = &part.data[offset..];
    let found = attribute_value(window, "id", true).or_else(|| attribute_value(window, "aid", true));
    Ok(found
        .map(|(_, v)| String::from_utf8_lossy(&v).into_owned())
        .unwrap_or_default())
}

/// `kindle:pos:fid:x:off:y` -> `"partNNNNN.html#id"` (quotes included).
fn posfid_to_link(rawml: &Rawml, value: &str) -> Result<String> {
    let found = value
        .find(POSFID_PREFIX)
        .ok_or_else(|| Error::Param("value carries no pos:fid target"))?;
    let rest = &value[found + POSFID_PREFIX.len()..];
    // fixed layout: XXXX:off:YYYYYYYYYY
    let (fid_str, off_str) = match (rest.get(..4), rest.get(9..19)) {
        (Some(fid), Some(off)) => (fid, off),
        _ => return Err(Error::corrupt(format!("malformed pos:fid link: {value}"))),
    };
    let pos_fid = base32_decode(fid_str)?;
    let pos_off = base32_decode(off_str)?;
    let (file_nr, offset) = offset_by_posoff(rawml, pos_fid, pos_off)?;
    let part = rawml
        .markup_by_uid(file_nr)
        .ok_or_else(|| Error::corrupt(format!("no markup part {file_nr}")))?;
    let id = id_by_offset(part, offset)?;
    Ok(if pos_off != 0 {
        format!("\"part{file_nr:05}.html#{id}\"")
    } else {
        format!("\"part{file_nr:05}.html\"")
    })
}

/// `kindle:flow:XXXX` -> `"flowNNNNN.ext"`.
fn flow_to_link(rawml: &Rawml, value: &str) -> Result<String> {
    let found = value
        .find(FLOW_PREFIX)
        .ok_or_else(|| Error::Param("value carries no flow target"))?;
    let rest = &value[found + FLOW_PREFIX.len()..];
    let fid_str = rest
        .get(..4)
        .ok_or_else(|| Error::corrupt(format!("malformed flow link: {value}")))?;
    let part_id = base32_decode(fid_str)?;
    let flow = rawml
        .flow_by_uid(part_id)
        .ok_or_else(|| Error::corrupt(format!("no flow part {part_id}")))?;
    let extension = file_meta(flow.file_type).extension;
    Ok(format!("\"flow{part_id:05}.{extension}\""))
}

/// `kindle:embed:XXXX` -> `"resourceNNNNN.ext"`.
fn embed_to_link(rawml: &Rawml, value: &str) -> Result<String> {
    let found = value
        .find(EMBED_PREFIX)
        .ok_or_else(|| Error::Param("value carries no embed target"))?;
    let rest = &value[found + EMBED_PREFIX.len()..];
    let fid_str = rest
        .get(..4)
        .ok_or_else(|| Error::corrupt(format!("malformed embed link: {value}")))?;
    // embed numbering is one-based
    let part_id = base32_decode(fid_str)?.wrapping_sub(1);
    let extension = rawml
        .resource_by_uid(part_id)
        .map(|r| file_meta(r.file_type).extension)
        .unwrap_or(file_meta(FileType::Unknown).extension);
    Ok(format!("\"resource{part_id:05}.{extension}\""))
}

/// Rewrite one KF8 part; `None` when it holds no kindle links.
fn rewrite_part_kf8(rawml: &Rawml, part: &Part) -> Result<Option<Vec<u8>>> {
    let data = part.data.as_slice();
    let is_css = part.file_type == FileType::Css;
    let mut list = FragmentList::new();
    let mut data_in = 0usize;
    let mut from = 0usize;
    let mut changed = false;

    while let Some(m) = search_links_kf8(data, from, is_css) {
        from = m.end;
        let value = String::from_utf8_lossy(&m.value).into_owned();
        let link = if value.contains(POSFID_PREFIX) {
            posfid_to_link(rawml, &value)?
        } else if value.contains(FLOW_PREFIX) {
            flow_to_link(rawml, &value)?
        } else if value.contains(EMBED_PREFIX) {
            embed_to_link(rawml, &value)?
        } else {
            log::debug!("unknown kindle link target: {value}");
            continue;
        };
        list.append_borrowed(data_in, &data[data_in..m.start]);
        let link = if m.is_url {
            // url(...) values carry no quotes
            link[1..link.len() - 1].to_string()
        } else {
            link
        };
        list.append_owned(link.into_bytes());
        data_in = m.end;
        changed = true;
    }
    if !changed {
        return Ok(None);
    }
    list.append_borrowed(data_in, &data[data_in..]);
    Ok(Some(list.flatten()))
}

/// Replace `kindle:` links across all markup and non-primary flow parts.
fn reconstruct_links_kf8(rawml: &mut Rawml) -> Result<()> {
    // resolve against the original parts, apply afterwards: pos:fid
    // resolution reads id attributes from unmodified skeleton parts
    let mut replacements: Vec<(bool, usize, Vec<u8>)> = Vec::new();
    for (i, part) in rawml.markup.iter().enumerate() {
        if let Some(data) = rewrite_part_kf8(rawml, part)? {
            replacements.push((true, i, data));
        }
    }
    for (i, part) in rawml.flow.iter().enumerate().skip(1) {
        if let Some(data) = rewrite_part_kf8(rawml, part)? {
            replacements.push((false, i, data));
        }
    }
    for (is_markup, i, data) in replacements {
        let part = if is_markup {
            &mut rawml.markup[i]
        } else {
            &mut rawml.flow[i]
        };
        part.data = data;
    }
    Ok(())
}

/// Collect the distinct `filepos` targets referenced by a part.
fn filepos_targets(part: &Part, links: &mut OffsetArray) {
    let data = part.data.as_slice();
    let mut cursor = 0usize;
    while cursor < data.len() {
        let Some((value_offset, value)) = attribute_value(&data[cursor..], "filepos", false)
        else {
            break;
        };
        let filepos = parse_leading_u32(&String::from_utf8_lossy(&value));
        if filepos > 0 {
            links.insert(filepos);
        }
        cursor += value_offset;
    }
}

/// Rewrite `filepos`/`recindex` attributes in KF7 markup, inject anchor
/// targets, and bracket dictionary entries.
fn reconstruct_links_kf7(rawml: &mut Rawml) -> Result<()> {
    let Some(part_index) = (!rawml.markup.is_empty()).then_some(0) else {
        return Ok(());
    };

    let mut links = OffsetArray::with_capacity(25);
    filepos_targets(&rawml.markup[part_index], &mut links);
    for ncx_part in rawml.markup.iter().filter(|p| p.file_type == FileType::Ncx) {
        filepos_targets(ncx_part, &mut links);
    }
    links.sort_unique(true);

    let orth_inserts = orth_entry_inserts(rawml)?;

    let part = &rawml.markup[part_index];
    let data = part.data.as_slice();
    let mut list = FragmentList::new();
    let mut data_in = 0usize;
    let mut from = 0usize;
    while let Some(m) = search_links_kf7(data, from) {
        from = m.end;
        let value = String::from_utf8_lossy(&m.value).into_owned();
        let link = if value.starts_with("filepos=") {
            let target = parse_leading_u32(value.trim_start_matches(|c: char| !c.is_ascii_digit()));
            format!("href=\"#{target:010}\"")
        } else if value.starts_with("recindex=") {
            let mut target = parse_leading_u32(value.trim_start_matches(|c: char| !c.is_ascii_digit()));
            target = target.saturating_sub(1);
            let extension = rawml
                .resource_by_uid(target)
                .map(|r| file_meta(r.file_type).extension)
                .unwrap_or(file_meta(FileType::Unknown).extension);
            format!("src=\"resource{target:05}.{extension}\"")
        } else {
            log::debug!("unknown link attribute: {value}");
            continue;
        };
        list.append_borrowed(data_in, &data[data_in..m.start]);
        list.append_owned(link.into_bytes());
        data_in = m.end;
    }
    if list.is_empty() {
        list.append_borrowed(0, data);
    } else {
        list.append_borrowed(data_in, &data[data_in..]);
    }

    // inject an empty anchor at every distinct link target offset
    let mut cursor = 0usize;
    for &offset in links.as_slice() {
        let anchor = format!("<a id=\"{offset:010}\"></a>");
        cursor = list.insert_at(cursor, offset as usize, anchor.into_bytes())?;
    }

    // dictionary markup: bracket each orth entry at its start position
    let mut cursor = 0usize;
    let mut prev_start = 0usize;
    for (start, text_len, open_tag) in orth_inserts {
        if start < prev_start {
            cursor = 0;
        }
        cursor = list.insert_at(cursor, start, open_tag.into_bytes())?;
        prev_start = start;
        if text_len > 0 {
            cursor = list.insert_at(cursor, start + text_len, b"</idx:entry>".to_vec())?;
        }
    }

    let new_data = list.flatten();
    rawml.markup[part_index].data = new_data;
    Ok(())
}

/// Precompute dictionary entry insertions: `(start, text_len, open tag)`.
fn orth_entry_inserts(rawml: &Rawml) -> Result<Vec<(usize, usize, String)>> {
    let Some(orth) = rawml.orth.as_ref() else {
        return Ok(Vec::new());
    };
    let mut inserts = Vec::with_capacity(orth.entries.len());
    for entry in &orth.entries {
        let start = entry
            .tag_value(TAG_ORTH_STARTPOS)
            .ok_or_else(|| Error::corrupt("orth entry missing start position"))?
            as usize;
        let text_len = entry.tag_value(TAG_ORTH_ENDPOS).unwrap_or(0) as usize;
        let open_tag = if text_len == 0 {
            format!(
                "<idx:entry><idx:orth value=\"{}\"></idx:orth></idx:entry>",
                entry.label
            )
        } else {
            format!(
                "<idx:entry scriptable=\"yes\"><idx:orth value=\"{}\"></idx:orth>",
                entry.label
            )
        };
        inserts.push((start, text_len, open_tag));
    }
    Ok(inserts)
}

/// Replace offset links with portable ones, KF8 or KF7 flavor.
pub fn reconstruct_links(rawml: &mut Rawml) -> Result<()> {
    if rawml.is_kf8() {
        reconstruct_links_kf8(rawml)
    } else {
        reconstruct_links_kf7(rawml)
    }
}
