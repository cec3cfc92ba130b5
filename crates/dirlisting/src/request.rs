//! The slice of the server's request object that directory listings touch.
//!
//! Parsing, connection I/O and header serialization live in the surrounding
//! server. This module only holds what the listing handler reads (method,
//! paths, per-request settings) and what it fills in (status, headers, body).

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode, Version};

use crate::body::ResponseBody;
use crate::etag::EtagFlags;
use crate::mime::MimeMap;

/// Per-request server settings, resolved by the configuration system.
#[derive(Debug, Clone)]
pub struct RequestConf {
    /// Fields feeding entity tags; all off disables them.
    pub etag_flags: EtagFlags,
    /// Server tag, used as the page footer when none is configured.
    pub server_tag: Option<String>,
    /// Prefer content types stored in extended attributes.
    pub use_xattr: bool,
    /// Follow symlinks when opening include files.
    pub follow_symlink: bool,
    /// Streaming with a bounded buffer: enables listing backpressure.
    pub stream_response_bufmin: bool,
    /// Log how the request is handled.
    pub log_request_handling: bool,
    /// Server extension → content type map.
    pub mimetypes: Arc<MimeMap>,
}

impl Default for RequestConf {
    fn default() -> Self {
        Self {
            etag_flags: EtagFlags::ALL,
            server_tag: None,
            use_xattr: false,
            follow_symlink: true,
            stream_response_bufmin: false,
            log_request_handling: false,
            mimetypes: Arc::new(MimeMap::new()),
        }
    }
}

/// Request state shared between the server core and the listing handler.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub version: Version,
    /// Decoded URL path, like `/pub/files/`.
    pub uri_path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    /// Filesystem path the URL maps to, with a trailing separator.
    pub physical_path: PathBuf,
    pub conf: RequestConf,

    /// Set once some handler owns the response.
    pub handler_claimed: bool,
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub body: ResponseBody,
    /// Some of the body may already have been handed to the transport.
    pub body_started: bool,
    pub body_finished: bool,
    /// The transport switched to chunked transfer encoding.
    pub send_chunked: bool,
    /// Response headers were already written to the client.
    pub headers_sent: bool,
}

impl Request {
    pub fn new(method: Method, uri_path: impl Into<String>, physical_path: impl Into<PathBuf>) -> Self {
        Self {
            method,
            version: Version::HTTP_11,
            uri_path: uri_path.into(),
            query: None,
            physical_path: physical_path.into(),
            conf: RequestConf::default(),
            handler_claimed: false,
            status: None,
            headers: HeaderMap::new(),
            body: ResponseBody::default(),
            body_started: false,
            body_finished: false,
            send_chunked: false,
            headers_sent: false,
        }
    }

    /// Replaces any existing value of `name`. Values that are not valid header text are dropped.
    pub fn set_header(&mut self, name: HeaderName, value: &str) {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => log::warn!("dropping invalid {} header value: {:?}", name, value),
        }
    }

    /// Adds a value for `name`, keeping the ones already present.
    pub fn append_header(&mut self, name: HeaderName, value: &str) {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.append(name, value);
            }
            Err(_) => log::warn!("dropping invalid {} header value: {:?}", name, value),
        }
    }

    pub fn has_header(&self, name: &HeaderName) -> bool {
        self.headers.contains_key(name)
    }

    pub fn header_str(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Hooks into the connection and scheduler driving a request.
pub trait Connection {
    /// Whether the transport can accept more output right now.
    fn is_writable(&self) -> bool;

    /// Asks the event loop to run this request again on its next turn.
    fn schedule_resume(&mut self);

    /// Sends an informational (1xx) response ahead of the final one.
    fn send_informational(&mut self, status: StatusCode, headers: &HeaderMap) -> io::Result<()>;

    /// Drops any cached metadata the server holds for `path`.
    fn invalidate_stat_cache(&mut self, _path: &Path) {}
}
