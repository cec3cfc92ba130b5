//! Content type lookup for file rows.
//!
//! Order: extended attribute (when enabled), the server's extension map,
//! `mime_guess`, then `application/octet-stream`.

use std::borrow::Cow;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Extended attribute holding a per-file content type.
const CONTENT_TYPE_XATTR: &str = "user.Content-Type";

/// Server-configured suffix → content type assignments.
#[derive(Debug, Clone, Default)]
pub struct MimeMap {
    by_suffix: Vec<(Vec<u8>, String)>,
}

impl MimeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an assignment such as `(".txt", "text/plain;charset=utf-8")`.
    pub fn insert(&mut self, suffix: impl Into<String>, content_type: impl Into<String>) {
        self.by_suffix
            .push((suffix.into().into_bytes(), content_type.into()));
    }

    /// Longest configured suffix matching `name`.
    fn lookup(&self, name: &[u8]) -> Option<&str> {
        self.by_suffix
            .iter()
            .filter(|(suffix, _)| name.ends_with(suffix))
            .max_by_key(|(suffix, _)| suffix.len())
            .map(|(_, ct)| ct.as_str())
    }

    /// Content type for `name` by extension, falling back to `mime_guess`.
    pub fn by_extension(&self, name: &[u8]) -> Option<Cow<'_, str>> {
        if let Some(ct) = self.lookup(name) {
            return Some(Cow::Borrowed(ct));
        }
        mime_guess::from_path(Path::new(OsStr::from_bytes(name)))
            .first_raw()
            .map(Cow::Borrowed)
    }
}

impl<S: Into<String>, T: Into<String>> FromIterator<(S, T)> for MimeMap {
    fn from_iter<I: IntoIterator<Item = (S, T)>>(iter: I) -> Self {
        let mut map = MimeMap::new();
        for (suffix, ct) in iter {
            map.insert(suffix, ct);
        }
        map
    }
}

/// Reads the content type stored in the file's extended attributes, if any.
pub fn by_xattr(path: &Path) -> Option<String> {
    match xattr::get(path, CONTENT_TYPE_XATTR) {
        Ok(Some(value)) => String::from_utf8(value).ok().filter(|v| !v.is_empty()),
        _ => None,
    }
}

/// Resolves content types for entries of one directory.
#[derive(Debug, Clone, Copy)]
pub struct MimeResolver<'a> {
    pub map: &'a MimeMap,
    pub use_xattr: bool,
}

impl MimeResolver<'_> {
    pub fn resolve(&self, dir: &Path, name: &[u8]) -> Cow<'_, str> {
        if self.use_xattr
            && let Some(ct) = by_xattr(&dir.join(OsStr::from_bytes(name)))
        {
            return Cow::Owned(ct);
        }
        self.map
            .by_extension(name)
            .unwrap_or(Cow::Borrowed(OCTET_STREAM))
    }
}
