//! Destinations for scanned entries.
//!
//! Sorted HTML collects entries into a [`StorePair`] and renders at the end.
//! JSON and unsorted HTML render each entry as soon as it is read into a
//! pending buffer, which the controller moves into the response in bunches.

use crate::listing::sorting::{DirEntry, EntryStore, SortedEntries};
use crate::render::RowRenderer;
use crate::render::json;

/// Pending streamed output is held back until it reaches this size (or the scan ends).
pub const STREAM_FLUSH_AT: usize = 16384 - 1024;

/// Receives every entry that survives scan filtering.
pub trait EntrySink {
    fn accept(&mut self, entry: DirEntry, is_dir: bool);
}

// ============================================================================
// Buffered stores
// ============================================================================

/// Directory and file stores filled by a buffered scan.
#[derive(Debug, Default)]
pub struct StorePair {
    pub dirs: EntryStore,
    pub files: EntryStore,
}

impl StorePair {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.dirs.count() as usize + self.files.count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty() && self.files.is_empty()
    }

    /// Closes both stores, sorting each one independently when `sort` is set.
    pub fn into_sorted(self, sort: bool) -> (SortedEntries, SortedEntries) {
        (self.dirs.into_sorted(sort), self.files.into_sorted(sort))
    }
}

impl EntrySink for StorePair {
    fn accept(&mut self, entry: DirEntry, is_dir: bool) {
        if is_dir {
            self.dirs.append(entry);
        } else {
            self.files.append(entry);
        }
    }
}

// ============================================================================
// Streaming sinks
// ============================================================================

/// Renders a JSON array incrementally. The opening `[` is pending from the start.
#[derive(Debug)]
pub struct JsonStream {
    pending: Vec<u8>,
    first: bool,
}

impl Default for JsonStream {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonStream {
    pub fn new() -> Self {
        let mut pending = Vec::with_capacity(STREAM_FLUSH_AT + 1024);
        pending.push(b'[');
        Self { pending, first: true }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether enough output is pending to be worth moving into the response.
    pub fn should_flush(&self) -> bool {
        self.pending.len() >= STREAM_FLUSH_AT
    }

    pub fn take_pending(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }

    /// Closes the array.
    pub fn finish(&mut self) {
        self.pending.push(b']');
    }
}

impl EntrySink for JsonStream {
    fn accept(&mut self, entry: DirEntry, is_dir: bool) {
        match json::append_entry(&mut self.pending, &entry, is_dir, self.first) {
            Ok(()) => self.first = false,
            Err(e) => log::error!("rendering JSON entry {:?}: {}", String::from_utf8_lossy(entry.name()), e),
        }
    }
}

/// Renders unsorted HTML rows in directory order.
#[derive(Debug)]
pub struct HtmlStream {
    rows: RowRenderer,
    pending: Vec<u8>,
}

impl HtmlStream {
    pub fn new(rows: RowRenderer) -> Self {
        Self {
            rows,
            pending: Vec::with_capacity(STREAM_FLUSH_AT + 1024),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn should_flush(&self) -> bool {
        self.pending.len() >= STREAM_FLUSH_AT
    }

    pub fn take_pending(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }
}

impl EntrySink for HtmlStream {
    fn accept(&mut self, entry: DirEntry, is_dir: bool) {
        self.rows.row(&mut self.pending, &entry, is_dir);
    }
}
