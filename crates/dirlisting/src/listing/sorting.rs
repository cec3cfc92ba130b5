//! Entry records, the append-only stores that hold them, and the name sort.
//!
//! A buffered scan fills two [`EntryStore`]s (directories and files). When the
//! scan completes each store is turned into [`SortedEntries`] exactly once,
//! which is read-only from then on.

use std::cmp::Ordering;

/// Stores grow by this many entries at a time.
pub const STORE_BLOCK: usize = 32;

// ============================================================================
// Entries
// ============================================================================

/// One directory child as seen by the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    name: Box<[u8]>,
    /// Modification time, seconds since the epoch.
    pub mtime: i64,
    /// Size in bytes.
    pub size: i64,
}

impl DirEntry {
    pub fn new(name: &[u8], mtime: i64, size: i64) -> Self {
        Self {
            name: name.into(),
            mtime,
            size,
        }
    }

    /// Raw file name bytes, without any path component.
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    pub fn name_len(&self) -> u32 {
        // Names are bounded by PATH_MAX long before they get near u32::MAX
        self.name.len() as u32
    }
}

// ============================================================================
// Stores
// ============================================================================

/// Append-only collection of entries filled during one scan.
#[derive(Debug, Default)]
pub struct EntryStore {
    entries: Vec<DirEntry>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: DirEntry) {
        if self.entries.len() == self.entries.capacity() {
            self.entries.reserve_exact(STORE_BLOCK);
        }
        self.entries.push(entry);
    }

    pub fn count(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ends the append phase. With `sort`, entries are ordered by name bytes.
    pub fn into_sorted(mut self, sort: bool) -> SortedEntries {
        if sort {
            comb_sort(&mut self.entries);
        }
        SortedEntries { entries: self.entries }
    }
}

/// Read-only entries of a completed scan.
#[derive(Debug, Default)]
pub struct SortedEntries {
    entries: Vec<DirEntry>,
}

impl SortedEntries {
    pub fn iter(&self) -> std::slice::Iter<'_, DirEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_slice(&self) -> &[DirEntry] {
        &self.entries
    }
}

impl<'a> IntoIterator for &'a SortedEntries {
    type Item = &'a DirEntry;
    type IntoIter = std::slice::Iter<'a, DirEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// ============================================================================
// Sorting logic
// ============================================================================

/// Byte-wise name comparison, no locale or case folding.
fn compare_names(a: &DirEntry, b: &DirEntry) -> Ordering {
    a.name().cmp(b.name())
}

/// Next comb sort gap: shrink by 10/13, with 9 and 10 bumped to 11.
fn next_gap(gap: usize) -> usize {
    match gap * 10 / 13 {
        9 | 10 => 11,
        0 => 1,
        g => g,
    }
}

/// In-place comb sort by name.
pub fn comb_sort(entries: &mut [DirEntry]) {
    let len = entries.len();
    let mut gap = len;
    let mut swapped = false;
    while gap > 1 || swapped {
        if gap > 1 {
            gap = next_gap(gap);
        }
        swapped = false;
        for i in 0..len - gap {
            let j = i + gap;
            if compare_names(&entries[i], &entries[j]) == Ordering::Greater {
                entries.swap(i, j);
                swapped = true;
            }
        }
    }
}
