//! Directory listing engine - scanning, entry stores, streaming sinks, caching.

pub mod caching;
pub mod reading;
pub mod sorting;
pub mod streaming;

pub use caching::{
    CacheDescriptor, CacheError, CacheFormat, CacheLookup, CacheManager, CacheTee, CacheWriteSession, CachedBody,
    CommittedCache,
};
pub use reading::{ExcludeError, ExcludeSet, NameFilter, SCAN_BATCH, ScanCursor, ScanFilter, ScanStatus};
pub use sorting::{DirEntry, EntryStore, SortedEntries};
pub use streaming::{EntrySink, HtmlStream, JsonStream, STREAM_FLUSH_AT, StorePair};

#[cfg(test)]
mod caching_test;
