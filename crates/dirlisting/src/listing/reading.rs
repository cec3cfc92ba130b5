//! Bounded-batch directory scanning.
//!
//! [`ScanCursor::resume`] reads at most [`SCAN_BATCH`] raw directory entries
//! per call, filters them, and hands survivors to an [`EntrySink`]. The caller
//! yields to the event loop whenever it gets [`ScanStatus::Progress`] back.

use std::ffi::OsStr;
use std::fs::{self, ReadDir};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::bytes::{Regex, RegexSet};

use crate::config::{ConfigError, ListingConfig};
use crate::listing::sorting::DirEntry;
use crate::listing::streaming::EntrySink;

/// Raw directory entries read per resume.
pub const SCAN_BATCH: usize = 32;

// ============================================================================
// Exclude patterns
// ============================================================================

/// Error raised while evaluating an exclude filter against a name.
#[derive(Debug, Clone)]
pub struct ExcludeError {
    pub message: String,
}

impl std::fmt::Display for ExcludeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "exclude match failed: {}", self.message)
    }
}

impl std::error::Error for ExcludeError {}

/// Decides whether an entry name is excluded from the listing.
///
/// An `Err` counts as a match: the entry is left out.
pub trait NameFilter: std::fmt::Debug + Send + Sync {
    fn is_match(&self, name: &[u8]) -> Result<bool, ExcludeError>;
}

/// Compiled `exclude` patterns. A name is excluded when any pattern matches.
#[derive(Debug, Clone)]
pub struct ExcludeSet {
    set: Arc<RegexSet>,
}

impl ExcludeSet {
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        // Compile one by one first so the error names the offending pattern
        for pattern in patterns {
            if let Err(e) = Regex::new(pattern) {
                return Err(ConfigError::InvalidExclude {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                });
            }
        }
        let set = RegexSet::new(patterns).map_err(|e| ConfigError::InvalidExclude {
            pattern: patterns.join(" | "),
            message: e.to_string(),
        })?;
        Ok(Self { set: Arc::new(set) })
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

impl NameFilter for ExcludeSet {
    fn is_match(&self, name: &[u8]) -> Result<bool, ExcludeError> {
        Ok(self.set.is_match(name))
    }
}

// ============================================================================
// Entry filter
// ============================================================================

/// Per-request rules deciding which names make it into the listing.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    pub hide_dot_files: bool,
    /// README/HEADER file names configured to be hidden.
    pub hidden_names: Vec<Vec<u8>>,
    pub excludes: Option<Arc<dyn NameFilter>>,
}

impl ScanFilter {
    pub fn from_config(conf: &ListingConfig) -> Self {
        let mut hidden_names = Vec::new();
        if conf.hide_readme_file
            && let Some(name) = &conf.show_readme
        {
            hidden_names.push(name.as_bytes().to_vec());
        }
        if conf.hide_header_file
            && let Some(name) = &conf.show_header
        {
            hidden_names.push(name.as_bytes().to_vec());
        }
        Self {
            hide_dot_files: conf.hide_dot_files,
            hidden_names,
            excludes: conf.excludes.clone(),
        }
    }

    /// Whether `name` should be listed. Length limits are checked by the cursor.
    pub fn admits(&self, name: &[u8]) -> bool {
        if name.first() == Some(&b'.') && (self.hide_dot_files || name == b"." || name == b"..") {
            return false;
        }
        if self.hidden_names.iter().any(|hidden| hidden.as_slice() == name) {
            return false;
        }
        if let Some(excludes) = &self.excludes {
            match excludes.is_match(name) {
                Ok(false) => {}
                Ok(true) => return false,
                Err(e) => {
                    log::debug!("excluding {:?}: {}", String::from_utf8_lossy(name), e);
                    return false;
                }
            }
        }
        true
    }
}

// ============================================================================
// Cursor
// ============================================================================

/// Result of one [`ScanCursor::resume`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    /// The batch filled up; more entries may remain. Carries the raw entries read.
    Progress(usize),
    /// The directory is exhausted and its handle closed.
    Done,
}

/// Resumable iteration state over one open directory.
#[derive(Debug)]
pub struct ScanCursor {
    dir: PathBuf,
    entries: Option<ReadDir>,
    name_max: usize,
    filter: ScanFilter,
    batch: usize,
}

impl ScanCursor {
    /// Opens `dir` for scanning. Errors here mean the directory cannot be listed at all.
    pub fn open(dir: &Path, filter: ScanFilter) -> io::Result<Self> {
        let entries = fs::read_dir(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            entries: Some(entries),
            name_max: name_max_for(dir),
            filter,
            batch: SCAN_BATCH,
        })
    }

    /// Overrides the number of raw entries read per resume (minimum 1).
    pub fn with_batch_size(mut self, batch: usize) -> Self {
        self.batch = batch.max(1);
        self
    }

    /// Overrides the longest entry name accepted; longer names are skipped.
    pub fn with_name_max(mut self, name_max: usize) -> Self {
        self.name_max = name_max;
        self
    }

    /// Longest entry name that still fits in a full path.
    pub fn name_max(&self) -> usize {
        self.name_max
    }

    pub fn is_open(&self) -> bool {
        self.entries.is_some()
    }

    /// Reads up to one batch of entries into `sink`.
    ///
    /// A read error closes the cursor; entries already handed to the sink must
    /// then be discarded by the caller.
    pub fn resume(&mut self, sink: &mut dyn EntrySink) -> io::Result<ScanStatus> {
        let Some(entries) = self.entries.as_mut() else {
            return Ok(ScanStatus::Done);
        };

        let mut count = 0;
        while count < self.batch {
            let Some(entry) = entries.next() else {
                break;
            };
            count += 1;
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    self.entries = None;
                    return Err(e);
                }
            };
            let file_name = entry.file_name();
            let name = file_name.as_bytes();
            if !self.filter.admits(name) || name.len() > self.name_max {
                continue;
            }
            // Follows symlinks. Entries removed since readdir are skipped.
            let Ok(meta) = fs::metadata(self.dir.join(OsStr::from_bytes(name))) else {
                continue;
            };
            sink.accept(DirEntry::new(name, meta.mtime(), meta.size() as i64), meta.is_dir());
        }

        // A full batch yields even when the stream happens to be exhausted
        if count == self.batch {
            return Ok(ScanStatus::Progress(count));
        }
        self.entries = None;
        Ok(ScanStatus::Done)
    }
}

/// `PATH_MAX` minus the directory path and its separator.
fn name_max_for(dir: &Path) -> usize {
    let path_max = usize::try_from(libc::PATH_MAX).unwrap_or(4096);
    let dir_len = dir.as_os_str().len();
    // Directory paths carry a trailing separator already
    let separator = usize::from(!dir.as_os_str().as_bytes().ends_with(b"/"));
    path_max.saturating_sub(dir_len + separator + 1)
}
