//! Output encodings for entry names.
//!
//! `href` attributes get URL path-segment escaping, text content gets minimal
//! XML escaping. The two are never mixed: a name is encoded once per context.

const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Bytes kept as-is inside a relative URL path segment.
fn is_uri_safe(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')')
}

/// Appends `name` percent-encoded for use as one relative URL path segment.
///
/// Everything outside the unreserved set is encoded, including `/`, `?`, `#`
/// and all non-ASCII bytes.
pub fn append_uri_part(out: &mut Vec<u8>, name: &[u8]) {
    for &b in name {
        if is_uri_safe(b) {
            out.push(b);
        } else {
            out.extend_from_slice(&[b'%', HEX_UPPER[usize::from(b >> 4)], HEX_UPPER[usize::from(b & 0x0f)]]);
        }
    }
}

/// Appends `text` with the five XML special characters replaced by entities.
pub fn append_minimal_xml(out: &mut Vec<u8>, text: &[u8]) {
    let mut start = 0;
    for (i, &b) in text.iter().enumerate() {
        let entity: &[u8] = match b {
            b'&' => b"&amp;",
            b'<' => b"&lt;",
            b'>' => b"&gt;",
            b'"' => b"&quot;",
            b'\'' => b"&#39;",
            _ => continue,
        };
        out.extend_from_slice(&text[start..i]);
        out.extend_from_slice(entity);
        start = i + 1;
    }
    out.extend_from_slice(&text[start..]);
}
