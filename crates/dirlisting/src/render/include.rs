//! HEADER and README file inclusion.
//!
//! Encoded includes are wrapped in `<pre>` and XML-escaped. Escaping can grow
//! a file several times over, so files above [`INCLUDE_INMEMORY_MAX`] are
//! escaped one read buffer at a time straight into spill files.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use crate::body::ResponseBody;
use crate::render::escape;
use crate::render::html::Page;

/// Largest include escaped into a single in-memory chunk.
pub const INCLUDE_INMEMORY_MAX: u64 = 32768;

const READ_BUF_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    Header,
    Readme,
}

impl IncludeKind {
    fn open_tag(self) -> &'static [u8] {
        match self {
            IncludeKind::Header => b"<pre class=\"header\">",
            IncludeKind::Readme => b"<pre class=\"readme\">",
        }
    }
}

/// Resolves an include name against the listed directory unless it is absolute.
pub fn include_path(page: &Page, name: &str) -> PathBuf {
    if name.starts_with('/') {
        PathBuf::from(name)
    } else {
        page.physical_path.join(name)
    }
}

/// Appends the named include file to `body`.
///
/// Missing, empty, or unreadable files are skipped. Only a failure to write
/// spill files is returned as an error.
pub fn append_include(
    body: &mut ResponseBody,
    page: &Page,
    name: &str,
    kind: IncludeKind,
    encode: bool,
) -> io::Result<()> {
    let path = include_path(page, name);
    let Some((file, len)) = open_include(&path, page.follow_symlink) else {
        return Ok(());
    };

    if !encode {
        body.append_file_ref(file, 0, len);
        return Ok(());
    }

    body.append_mem(kind.open_tag());
    let spill = len > INCLUDE_INMEMORY_MAX;
    let mut buf = vec![0u8; READ_BUF_SIZE];
    let mut encoded = Vec::with_capacity(if spill { READ_BUF_SIZE * 2 } else { len as usize + 256 });
    let mut offset = 0u64;
    loop {
        let read = match file.read_at(&mut buf, offset) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                log::warn!("reading {}: {}", path.display(), e);
                break;
            }
        };
        offset += read as u64;
        escape::append_minimal_xml(&mut encoded, &buf[..read]);
        if spill {
            body.append_mem_to_tempfile(&encoded)?;
            encoded.clear();
        }
    }
    if !spill {
        body.append_buffer(encoded);
    }
    body.append_mem(b"</pre>");
    Ok(())
}

fn open_include(path: &Path, follow_symlink: bool) -> Option<(File, u64)> {
    let mut options = OpenOptions::new();
    options.read(true);
    if !follow_symlink {
        options.custom_flags(libc::O_NOFOLLOW);
    }
    let file = match options.open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            log::warn!("opening {}: {}", path.display(), e);
            return None;
        }
    };
    match file.metadata() {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Some((file, meta.len())),
        Ok(_) => None,
        Err(e) => {
            log::warn!("stat {}: {}", path.display(), e);
            None
        }
    }
}
