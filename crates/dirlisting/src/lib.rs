//! Directory listings generated on demand for a single-threaded HTTP server.
//!
//! A listing request is scanned in bounded batches so a huge directory never
//! blocks the event loop, rendered as HTML or JSON, and optionally written to
//! an on-disk response cache that later requests are served from.
//!
//! Entry point is [`DirListing::start`], which either finishes the request
//! immediately (cache hit, 403, 503) or hands back a [`ListingTask`] that the
//! server resumes whenever the connection is scheduled again.

#![cfg(unix)]
// Deny unused code to catch dead code early
#![deny(unused)]
// Warn on unused dependencies to catch platform-specific cfg mismatches
#![warn(unused_crate_dependencies)]
// Warn on redundant path prefixes (e.g., std::path::Path when Path is imported)
#![warn(unused_qualifications)]
// Use log::* macros instead of println!/eprintln! for proper log level control
#![deny(clippy::print_stdout, clippy::print_stderr)]

// Silence the dev-dependency false positive (env_logger is used by tests/ only)
#[cfg(test)]
use env_logger as _;

pub mod body;
pub mod config;
pub mod controller;
pub mod etag;
pub mod listing;
pub mod mime;
pub mod render;
pub mod request;


pub use body::ResponseBody;
pub use config::{ConfigError, ListingConfig, ListingSettings, ScopedConfig};
pub use controller::{
    AdmissionCounter, AdmissionSlot, DirListing, Dispatch, ListingError, ListingState, ListingTask, ServerLimits, Step,
};
pub use listing::{CacheDescriptor, CacheLookup, CacheManager, DirEntry, EntryStore, ScanCursor, ScanStatus};
pub use request::{Connection, Request, RequestConf};
