//! JSON array elements for `?json` listings.

use serde::Serialize;

use crate::listing::DirEntry;

#[derive(Serialize)]
struct JsonEntry<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    size: i64,
    mtime: i64,
}

/// Appends `{"name":...,"type":"file"|"dir","size":N,"mtime":N}`, preceded by
/// a comma unless it is the first element of the array.
///
/// Names that are not valid UTF-8 are written lossily, keeping the document valid JSON.
pub fn append_entry(out: &mut Vec<u8>, entry: &DirEntry, is_dir: bool, first: bool) -> serde_json::Result<()> {
    if !first {
        out.push(b',');
    }
    let name = String::from_utf8_lossy(entry.name());
    let element = JsonEntry {
        name: &name,
        kind: if is_dir { "dir" } else { "file" },
        size: entry.size,
        mtime: entry.mtime,
    };
    serde_json::to_writer(out, &element)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elements_are_comma_joined() {
        let mut out = b"[".to_vec();
        append_entry(&mut out, &DirEntry::new(b"A", 10, 0), true, true).unwrap();
        append_entry(&mut out, &DirEntry::new(b"b.txt", 20, 100), false, false).unwrap();
        out.push(b']');
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"[{"name":"A","type":"dir","size":0,"mtime":10},{"name":"b.txt","type":"file","size":100,"mtime":20}]"#
        );
    }

    #[test]
    fn test_names_are_json_escaped() {
        let mut out = Vec::new();
        append_entry(&mut out, &DirEntry::new(b"say \"hi\"\\\n", 0, 1), false, true).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"{"name":"say \"hi\"\\\n","type":"file","size":1,"mtime":0}"#
        );
    }

    #[test]
    fn test_non_utf8_name_stays_valid_json() {
        let mut out = Vec::new();
        append_entry(&mut out, &DirEntry::new(b"bad\xff", 0, 0), false, true).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["name"], "bad\u{fffd}");
    }
}
