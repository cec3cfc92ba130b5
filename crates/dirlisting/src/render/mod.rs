//! Turning entry records into response bytes.
//!
//! Everything here is formatting only: rows and JSON elements are appended to
//! plain byte buffers, and page chrome goes straight into the response body.

pub mod assets;
pub mod escape;
pub mod html;
pub mod include;
pub mod json;
pub mod size;

pub use html::{Page, RowRenderer, append_footer, append_header, content_type, format_mtime};
pub use size::format_size;

/// Content type of JSON listings.
pub const JSON_CONTENT_TYPE: &str = "application/json";
