//! Entity tags derived from file metadata.

use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;

/// Which metadata fields feed into an entity tag. All off means entity tags are disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EtagFlags {
    pub inode: bool,
    pub size: bool,
    pub mtime: bool,
}

impl EtagFlags {
    pub const ALL: EtagFlags = EtagFlags {
        inode: true,
        size: true,
        mtime: true,
    };

    pub fn is_enabled(&self) -> bool {
        self.inode || self.size || self.mtime
    }
}

/// Builds a quoted strong entity tag from `meta`, or `None` when tags are disabled.
pub fn from_metadata(meta: &Metadata, flags: EtagFlags) -> Option<String> {
    if !flags.is_enabled() {
        return None;
    }
    let mut parts = Vec::with_capacity(3);
    if flags.inode {
        parts.push(format!("{:x}", meta.ino()));
    }
    if flags.size {
        parts.push(format!("{:x}", meta.size()));
    }
    if flags.mtime {
        parts.push(format!("{:x}", meta.mtime()));
    }
    Some(format!("\"{}\"", parts.join("-")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_flags_produce_no_tag() {
        let meta = std::fs::metadata(std::env::temp_dir()).unwrap();
        assert_eq!(from_metadata(&meta, EtagFlags::default()), None);
    }

    #[test]
    fn test_tag_changes_with_size() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("f");
        std::fs::write(&path, b"abc").unwrap();
        let flags = EtagFlags {
            size: true,
            ..EtagFlags::default()
        };
        let first = from_metadata(&std::fs::metadata(&path).unwrap(), flags).unwrap();
        assert_eq!(first, "\"3\"");
        std::fs::write(&path, b"abcdefghijklmnop").unwrap();
        let second = from_metadata(&std::fs::metadata(&path).unwrap(), flags).unwrap();
        assert_eq!(second, "\"10\"");
    }
}
