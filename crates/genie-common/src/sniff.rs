//! Content-type detection from raw bytes.
//!
//! Uploaded attachments are labelled by what their bytes look like, never by
//! the type the client declared. Detection follows the WHATWG MIME sniffing
//! rules for the formats users realistically upload: at most the first 512
//! bytes are examined and the result is always a valid MIME type, falling
//! back to `application/octet-stream`.

/// Number of leading bytes considered.
pub const SNIFF_LEN: usize = 512;

/// Returned when nothing more specific matches and the data looks binary.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Returned for data with no binary bytes.
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Prefixes matched byte for byte.
const PREFIXES: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"\xFE\xFF", "text/plain; charset=utf-16be"),
    (b"\xFF\xFE", "text/plain; charset=utf-16le"),
    (b"\xEF\xBB\xBF", TEXT_PLAIN),
    (b"\x00\x00\x01\x00", "image/x-icon"),
    (b"\x00\x00\x02\x00", "image/x-icon"),
    (b"BM", "image/bmp"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"ID3", "audio/mpeg"),
    (b"OggS\x00", "application/ogg"),
    (b"MThd\x00\x00\x00\x06", "audio/midi"),
    (b"\x1A\x45\xDF\xA3", "video/webm"),
    (b"\x1F\x8B\x08", "application/x-gzip"),
    (b"PK\x03\x04", "application/zip"),
    (b"Rar!\x1A\x07\x00", "application/x-rar-compressed"),
    (b"Rar!\x1A\x07\x01\x00", "application/x-rar-compressed"),
    (b"\x00asm", "application/wasm"),
];

/// Container formats where bytes 4..8 are a length and must be ignored.
const MASKED: &[(&[u8], &[u8], &str)] = &[
    (
        b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF\xFF\xFF",
        b"RIFF\x00\x00\x00\x00WEBPVP",
        "image/webp",
    ),
    (
        b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        b"RIFF\x00\x00\x00\x00WAVE",
        "audio/wave",
    ),
    (
        b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        b"RIFF\x00\x00\x00\x00AVI ",
        "video/avi",
    ),
    (
        b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        b"FORM\x00\x00\x00\x00AIFF",
        "audio/aiff",
    ),
];

/// Markup openers recognized as HTML after leading whitespace, case-insensitively.
const HTML_TAGS: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

/// Detects the MIME type of `data`.
///
/// ```
/// use genie_common::sniff::sniff_content_type;
///
/// assert_eq!(sniff_content_type(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"), "image/png");
/// assert_eq!(sniff_content_type(b"hello"), "text/plain; charset=utf-8");
/// assert_eq!(sniff_content_type(&[0, 1, 2, 3]), "application/octet-stream");
/// ```
#[must_use]
pub fn sniff_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];

    if let Some(ct) = sniff_markup(data) {
        return ct;
    }

    if let Some((_, ct)) = PREFIXES.iter().find(|(sig, _)| data.starts_with(sig)) {
        return ct;
    }

    if let Some((_, _, ct)) = MASKED
        .iter()
        .find(|(mask, pattern, _)| masked_match(data, mask, pattern))
    {
        return ct;
    }

    if is_mp4(data) {
        return "video/mp4";
    }

    if data.iter().copied().any(is_binary_byte) {
        OCTET_STREAM
    } else {
        TEXT_PLAIN
    }
}

fn sniff_markup(data: &[u8]) -> Option<&'static str> {
    let start = data
        .iter()
        .position(|&b| !matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | b' '))?;
    let data = &data[start..];

    for tag in HTML_TAGS {
        if data.len() > tag.len()
            && data[..tag.len()].eq_ignore_ascii_case(tag)
            && matches!(data[tag.len()], b' ' | b'>')
        {
            return Some("text/html; charset=utf-8");
        }
    }

    data.starts_with(b"<?xml")
        .then_some("text/xml; charset=utf-8")
}

fn masked_match(data: &[u8], mask: &[u8], pattern: &[u8]) -> bool {
    data.len() >= pattern.len()
        && data
            .iter()
            .zip(mask.iter().zip(pattern))
            .all(|(byte, (mask, expected))| byte & mask == *expected)
}

/// ISO base media file with an `ftyp` box naming an `mp4` brand.
fn is_mp4(data: &[u8]) -> bool {
    if data.len() < 12 || &data[4..8] != b"ftyp" {
        return false;
    }

    let box_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if !box_size.is_multiple_of(4) || data.len() < box_size {
        return false;
    }

    // Brands start at 8; offset 12 holds the minor version.
    (8..box_size)
        .step_by(4)
        .filter(|&offset| offset != 12)
        .any(|offset| data.get(offset..offset + 3) == Some(b"mp4".as_slice()))
}

const fn is_binary_byte(byte: u8) -> bool {
    matches!(byte, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn sniffing_is_total(data in proptest::collection::vec(any::<u8>(), 0..1024)) {
            let ct = sniff_content_type(&data);
            prop_assert!(ct.contains('/'));
        }

        #[test]
        fn png_header_wins(tail in proptest::collection::vec(any::<u8>(), 0..256)) {
            let mut data = b"\x89PNG\x0D\x0A\x1A\x0A".to_vec();
            data.extend(tail);
            prop_assert_eq!(sniff_content_type(&data), "image/png");
        }
    }
}
