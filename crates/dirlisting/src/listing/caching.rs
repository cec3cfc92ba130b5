//! On-disk cache of rendered listings.
//!
//! Each listed directory gets its own cache file under the cache root, at the
//! directory's physical path plus `dirlist.html` or `dirlist.json`. Writers
//! fill a uniquely named temp file next to it and rename it into place, so a
//! reader only ever sees complete files. Deleting one cache file is enough to
//! refresh one directory; nothing here invalidates entries on its own.

use std::ffi::OsString;
use std::fs::{DirBuilder, File, Metadata};
use std::io::{self, Write};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::fs::{DirBuilderExt, MetadataExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use http::header;
use tempfile::NamedTempFile;

use crate::body::ResponseBody;
use crate::etag;
use crate::request::Request;

/// Cache root and freshness window for one configuration scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDescriptor {
    pub root: PathBuf,
    /// Seconds a cache file stays fresh after it was written. Always positive.
    pub max_age: i64,
}

/// Which rendering a cache file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheFormat {
    Html,
    Json,
}

impl CacheFormat {
    pub fn file_name(self) -> &'static str {
        match self {
            CacheFormat::Html => "dirlist.html",
            CacheFormat::Json => "dirlist.json",
        }
    }

    fn temp_prefix(self) -> &'static str {
        match self {
            CacheFormat::Html => "dirlist.html.",
            CacheFormat::Json => "dirlist.json.",
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum CacheError {
    CreateDir { path: PathBuf, source: io::Error },
    CreateTemp { path: PathBuf, source: io::Error },
    Write { path: PathBuf, source: io::Error },
    Rename { path: PathBuf, source: io::Error },
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateDir { path, source } => write!(f, "creating cache dir {}: {}", path.display(), source),
            Self::CreateTemp { path, source } => write!(f, "creating cache file in {}: {}", path.display(), source),
            Self::Write { path, source } => write!(f, "writing cache file {}: {}", path.display(), source),
            Self::Rename { path, source } => write!(f, "renaming cache file to {}: {}", path.display(), source),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CreateDir { source, .. }
            | Self::CreateTemp { source, .. }
            | Self::Write { source, .. }
            | Self::Rename { source, .. } => Some(source),
        }
    }
}

// ============================================================================
// Lookup
// ============================================================================

/// A fresh cache file, opened and ready to be attached to a response.
#[derive(Debug)]
pub struct CachedBody {
    pub path: PathBuf,
    pub file: File,
    pub metadata: Metadata,
    /// Seconds until the file goes stale.
    pub max_age_remaining: i64,
}

#[derive(Debug)]
pub enum CacheLookup {
    Fresh(CachedBody),
    /// Missing or expired; the listing must be generated.
    Stale,
    /// No cache configured for this request.
    Disabled,
}

/// Current time in seconds since the epoch.
pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Resolves cache paths and opens cache files for one request.
#[derive(Debug, Clone, Default)]
pub struct CacheManager {
    desc: Option<Arc<CacheDescriptor>>,
}

impl CacheManager {
    pub fn new(desc: Option<Arc<CacheDescriptor>>) -> Self {
        Self { desc }
    }

    pub fn is_enabled(&self) -> bool {
        self.desc.is_some()
    }

    pub fn max_age(&self) -> Option<i64> {
        self.desc.as_ref().map(|d| d.max_age)
    }

    /// Cache directory mirroring `physical_path` below the cache root.
    pub fn cache_dir(&self, physical_path: &Path) -> Option<PathBuf> {
        let desc = self.desc.as_ref()?;
        // Plain byte concatenation: `Path::join` would discard the root for an absolute path
        let root = desc.root.as_os_str().as_bytes();
        let root = root.strip_suffix(b"/").unwrap_or(root);
        let physical = physical_path.as_os_str().as_bytes();
        let mut joined = Vec::with_capacity(root.len() + physical.len() + 1);
        joined.extend_from_slice(root);
        if !physical.starts_with(b"/") {
            joined.push(b'/');
        }
        joined.extend_from_slice(physical);
        Some(PathBuf::from(OsString::from_vec(joined)))
    }

    pub fn cache_path(&self, physical_path: &Path, format: CacheFormat) -> Option<PathBuf> {
        Some(self.cache_dir(physical_path)?.join(format.file_name()))
    }

    pub fn lookup(&self, physical_path: &Path, format: CacheFormat) -> CacheLookup {
        self.lookup_at(physical_path, format, now_secs())
    }

    /// Like [`lookup`](Self::lookup), with the clock passed in.
    ///
    /// Fresh iff `mtime + max_age >= now`.
    pub fn lookup_at(&self, physical_path: &Path, format: CacheFormat, now: i64) -> CacheLookup {
        let (Some(desc), Some(path)) = (self.desc.as_ref(), self.cache_path(physical_path, format)) else {
            return CacheLookup::Disabled;
        };
        let Ok(file) = File::open(&path) else {
            return CacheLookup::Stale;
        };
        let metadata = match file.metadata() {
            Ok(meta) if meta.is_file() => meta,
            _ => return CacheLookup::Stale,
        };
        let expires = metadata.mtime().saturating_add(desc.max_age);
        if expires < now {
            log::debug!("cache stale: {}", path.display());
            return CacheLookup::Stale;
        }
        CacheLookup::Fresh(CachedBody {
            path,
            file,
            metadata,
            max_age_remaining: expires - now,
        })
    }

    /// Creates the mirrored directory tree (mode 0700) and a temp file in it.
    pub fn begin_write(&self, physical_path: &Path, format: CacheFormat) -> Result<CacheWriteSession, CacheError> {
        let Some(dir) = self.cache_dir(physical_path) else {
            return Err(CacheError::CreateDir {
                path: physical_path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "cache is not enabled"),
            });
        };
        if !dir.is_dir() {
            DirBuilder::new()
                .recursive(true)
                .mode(0o700)
                .create(&dir)
                .map_err(|source| CacheError::CreateDir {
                    path: dir.clone(),
                    source,
                })?;
        }
        // Temp files are created 0600
        let temp = tempfile::Builder::new()
            .prefix(format.temp_prefix())
            .rand_bytes(6)
            .tempfile_in(&dir)
            .map_err(|source| CacheError::CreateTemp {
                path: dir.clone(),
                source,
            })?;
        Ok(CacheWriteSession {
            temp,
            final_path: dir.join(format.file_name()),
        })
    }

    /// Writes a complete rendered HTML body to the cache in one go.
    pub fn store_body(&self, physical_path: &Path, body: &ResponseBody) -> Result<CommittedCache, CacheError> {
        let mut session = self.begin_write(physical_path, CacheFormat::Html)?;
        session.tee_body(body)?;
        session.commit()
    }
}

// ============================================================================
// Write session
// ============================================================================

/// A cache file being written. Dropping it without [`commit`](Self::commit) removes the temp file.
#[derive(Debug)]
pub struct CacheWriteSession {
    temp: NamedTempFile,
    final_path: PathBuf,
}

/// A cache file that was renamed into place.
#[derive(Debug)]
pub struct CommittedCache {
    pub path: PathBuf,
    /// Metadata of the written file, taken before the rename.
    pub metadata: Metadata,
}

impl CacheWriteSession {
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    pub fn tee(&mut self, data: &[u8]) -> Result<(), CacheError> {
        self.temp.as_file_mut().write_all(data).map_err(|source| CacheError::Write {
            path: self.temp.path().to_path_buf(),
            source,
        })
    }

    /// Copies every chunk of `body` into the cache file without consuming it.
    pub fn tee_body(&mut self, body: &ResponseBody) -> Result<u64, CacheError> {
        body.copy_to(self.temp.as_file_mut()).map_err(|source| CacheError::Write {
            path: self.temp.path().to_path_buf(),
            source,
        })
    }

    pub fn metadata(&self) -> io::Result<Metadata> {
        self.temp.as_file().metadata()
    }

    /// Renames the temp file to the final cache path.
    pub fn commit(self) -> Result<CommittedCache, CacheError> {
        let metadata = self.metadata().map_err(|source| CacheError::Write {
            path: self.temp.path().to_path_buf(),
            source,
        })?;
        let final_path = self.final_path;
        match self.temp.persist(&final_path) {
            Ok(_file) => Ok(CommittedCache {
                path: final_path,
                metadata,
            }),
            // The returned temp file is dropped here, which unlinks it
            Err(e) => Err(CacheError::Rename {
                path: final_path,
                source: e.error,
            }),
        }
    }

    /// Discards the temp file.
    pub fn abort(self) {
        let path = self.temp.path().to_path_buf();
        if let Err(e) = self.temp.close() {
            log::warn!("removing cache temp file {}: {}", path.display(), e);
        }
    }
}

// ============================================================================
// Streaming tee
// ============================================================================

/// Forwards streamed output to the response and, while attached, to a cache file.
///
/// The cache side is dropped (and its temp file removed) as soon as writing
/// to it fails or the response switches to chunked encoding, without
/// affecting the response itself.
#[derive(Debug, Default)]
pub struct CacheTee {
    session: Option<CacheWriteSession>,
}

impl CacheTee {
    pub fn new(session: Option<CacheWriteSession>) -> Self {
        Self { session }
    }

    pub fn is_attached(&self) -> bool {
        self.session.is_some()
    }

    pub fn forward_bytes(&mut self, r: &mut Request, data: Vec<u8>) {
        if let Some(session) = self.writable_session(r)
            && let Err(e) = session.tee(&data)
        {
            self.detach(&e.to_string());
        }
        r.body.append_buffer(data);
    }

    pub fn forward(&mut self, r: &mut Request, body: ResponseBody) {
        if let Some(session) = self.writable_session(r)
            && let Err(e) = session.tee_body(&body)
        {
            self.detach(&e.to_string());
        }
        r.body.append_body(body);
    }

    /// Session to write to, detaching first if the response went chunked.
    fn writable_session(&mut self, r: &Request) -> Option<&mut CacheWriteSession> {
        if self.session.is_some() && r.send_chunked {
            self.detach("response switched to chunked encoding");
        }
        self.session.as_mut()
    }

    pub fn detach(&mut self, reason: &str) {
        if let Some(session) = self.session.take() {
            log::warn!("dropping cache file {}: {}", session.final_path().display(), reason);
            session.abort();
        }
    }

    pub fn take_session(&mut self) -> Option<CacheWriteSession> {
        self.session.take()
    }
}

// ============================================================================
// Response headers
// ============================================================================

/// Sets `Cache-Control: max-age=N` unless an outer layer already set `Cache-Control`.
pub fn apply_cache_control(r: &mut Request, max_age: i64) {
    if !r.has_header(&header::CACHE_CONTROL) {
        r.set_header(header::CACHE_CONTROL, &format!("max-age={}", max_age));
    }
}

/// Sets `ETag` from the cache file's metadata when entity tags are enabled.
pub fn apply_etag(r: &mut Request, metadata: &Metadata) {
    if let Some(tag) = etag::from_metadata(metadata, r.conf.etag_flags) {
        r.set_header(header::ETAG, &tag);
    }
}
