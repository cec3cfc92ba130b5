//! Request handling for directory listings.
//!
//! [`DirListing::start`] runs the synchronous part of a request: it declines
//! requests that are not listings, serves fresh cache hits, enforces the
//! admission ceiling and opens the directory. Anything that needs more than
//! one batch comes back as a [`ListingTask`] for the server to resume.

pub mod admission;
pub mod task;

use std::io;

use http::header::{self, HeaderMap};
use http::{Method, StatusCode, Version};

use crate::config::{ListingConfig, ScopedConfig};
use crate::listing::caching::{self, CacheFormat, CacheLookup, CacheManager, CachedBody};
use crate::listing::reading::{ScanCursor, ScanFilter};
use crate::render::{self, JSON_CONTENT_TYPE};
use crate::request::{Connection, Request};

pub use admission::{AdmissionCounter, AdmissionSlot};
pub use task::{ListingState, ListingTask, Step};

/// Seconds a client is asked to wait after a 503.
pub const RETRY_AFTER_SECS: &str = "2";

// ============================================================================
// Errors and results
// ============================================================================

/// Failures surfaced to the connection layer. Everything else degrades in place.
#[derive(Debug)]
pub enum ListingError {
    /// Writing overflow output to a temp file failed.
    Spill(io::Error),
    /// Reading the directory failed after it was opened.
    Scan(io::Error),
    /// Sending the 103 interim response failed.
    EarlyHints(io::Error),
}

impl std::fmt::Display for ListingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spill(e) => write!(f, "writing listing to temp file: {}", e),
            Self::Scan(e) => write!(f, "reading directory: {}", e),
            Self::EarlyHints(e) => write!(f, "sending early hints: {}", e),
        }
    }
}

impl std::error::Error for ListingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spill(e) | Self::Scan(e) | Self::EarlyHints(e) => Some(e),
        }
    }
}

/// Outcome of [`DirListing::start`].
#[derive(Debug)]
pub enum Dispatch {
    /// Not a listing request; another handler should take it.
    Declined,
    /// The response is complete (listing, cache hit, 403 or 503).
    Finished,
    /// More batches to go; resume the task when the scheduler runs the request again.
    Pending(ListingTask),
}

/// Server-wide limits the handler derives its settings from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerLimits {
    pub max_conns: usize,
}

impl ServerLimits {
    /// One sixteenth of the connection limit, at least one.
    pub fn admission_ceiling(&self) -> usize {
        (self.max_conns >> 4).max(1)
    }
}

// ============================================================================
// Handler
// ============================================================================

/// Directory listing handler for one event loop.
#[derive(Debug, Clone)]
pub struct DirListing {
    config: ScopedConfig,
    admission: AdmissionCounter,
}

impl DirListing {
    pub fn new(config: ScopedConfig, limits: &ServerLimits) -> Self {
        Self {
            config,
            admission: AdmissionCounter::from_limits(limits),
        }
    }

    pub fn admission(&self) -> &AdmissionCounter {
        &self.admission
    }

    pub fn config(&self) -> &ScopedConfig {
        &self.config
    }

    /// Handles `r` with the configuration scoped to its URL path.
    pub fn start(&self, r: &mut Request, conn: &mut dyn Connection) -> Result<Dispatch, ListingError> {
        if !is_listing_request(r) {
            return Ok(Dispatch::Declined);
        }
        let conf = self.config.resolve(&r.uri_path);
        self.start_with(r, conf, conn)
    }

    /// Handles `r` with an explicit configuration snapshot.
    pub fn start_with(
        &self,
        r: &mut Request,
        mut conf: ListingConfig,
        conn: &mut dyn Connection,
    ) -> Result<Dispatch, ListingError> {
        if !is_listing_request(r) || !conf.activate {
            return Ok(Dispatch::Declined);
        }
        if r.conf.log_request_handling {
            log::debug!("handling the request as dir-listing: {}", r.uri_path);
        }
        if r.query.as_deref() == Some("json") {
            conf.use_json();
        }

        let cache = CacheManager::new(conf.cache.clone());
        let format = if conf.json { CacheFormat::Json } else { CacheFormat::Html };
        if let CacheLookup::Fresh(hit) = cache.lookup(&r.physical_path, format)
            && serve_cached(r, &conf, hit)
        {
            return Ok(Dispatch::Finished);
        }

        let Some(slot) = self.admission.try_acquire() else {
            log::debug!(
                "dir-listing ceiling of {} reached, refusing {}",
                self.admission.ceiling(),
                r.uri_path
            );
            r.status = Some(StatusCode::SERVICE_UNAVAILABLE);
            r.set_header(header::RETRY_AFTER, RETRY_AFTER_SECS);
            return Ok(Dispatch::Finished);
        };

        let cursor = match ScanCursor::open(&r.physical_path, ScanFilter::from_config(&conf)) {
            Ok(cursor) => cursor,
            Err(e) => {
                log::error!("opendir {}: {}", r.physical_path.display(), e);
                r.status = Some(StatusCode::FORBIDDEN);
                return Ok(Dispatch::Finished);
            }
        };

        let wants_hints = conf.auto_layout && (conf.external_css.is_some() || conf.external_js.is_some());
        let mut task = ListingTask::begin(r, conf, cache, cursor, slot)?;
        r.handler_claimed = true;

        match task.resume(r, conn)? {
            Step::Finished => Ok(Dispatch::Finished),
            Step::Pending => {
                if wants_hints && !r.body_started && r.version >= Version::HTTP_2 {
                    send_early_hints(r, conn)?;
                }
                Ok(Dispatch::Pending(task))
            }
        }
    }
}

/// GET or HEAD on a path with a trailing slash, not yet claimed by another handler.
fn is_listing_request(r: &Request) -> bool {
    !r.handler_claimed && r.uri_path.ends_with('/') && (r.method == Method::GET || r.method == Method::HEAD)
}

/// Adds `Link` preload headers for the external stylesheet and script.
pub fn early_hint_links(r: &mut Request, conf: &ListingConfig) {
    if let Some(css) = &conf.external_css {
        r.append_header(header::LINK, &format!("<{}>; rel=\"preload\"; as=\"style\"", css));
    }
    if let Some(js) = &conf.external_js {
        r.append_header(header::LINK, &format!("<{}>; rel=\"preload\"; as=\"script\"", js));
    }
}

/// Sends `103 Early Hints` carrying the response's `Link` headers.
fn send_early_hints(r: &Request, conn: &mut dyn Connection) -> Result<(), ListingError> {
    let status = StatusCode::from_u16(103).map_err(|e| ListingError::EarlyHints(io::Error::other(e)))?;
    let mut hints = HeaderMap::new();
    for value in r.headers.get_all(header::LINK) {
        hints.append(header::LINK, value.clone());
    }
    conn.send_informational(status, &hints).map_err(ListingError::EarlyHints)?;
    log::debug!("sent early hints for {}", r.uri_path);
    Ok(())
}

/// Answers from a fresh cache file. Returns `false` (leaving the response
/// untouched) when the file cannot back a response.
fn serve_cached(r: &mut Request, conf: &ListingConfig, hit: CachedBody) -> bool {
    let len = hit.metadata.len();
    if len == 0 {
        log::debug!("ignoring empty cache file {}", hit.path.display());
        return false;
    }
    log::debug!(
        "cache hit: {} (fresh for {}s)",
        hit.path.display(),
        hit.max_age_remaining
    );
    let content_type = if conf.json {
        JSON_CONTENT_TYPE.to_string()
    } else {
        render::content_type(conf.encoding.as_deref())
    };
    r.set_header(header::CONTENT_TYPE, &content_type);
    r.body.append_file_ref(hit.file, 0, len);
    caching::apply_cache_control(r, hit.max_age_remaining);
    caching::apply_etag(r, &hit.metadata);
    if conf.auto_layout {
        early_hint_links(r, conf);
    }
    r.status = Some(StatusCode::OK);
    r.handler_claimed = true;
    r.body_finished = true;
    true
}
