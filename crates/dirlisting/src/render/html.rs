//! HTML page chrome and table rows.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local, TimeZone};

use crate::body::ResponseBody;
use crate::config::ListingConfig;
use crate::listing::DirEntry;
use crate::mime::{MimeMap, MimeResolver};
use crate::render::assets;
use crate::render::escape::{append_minimal_xml, append_uri_part};
use crate::render::include::{IncludeKind, append_include};
use crate::render::size::format_size;
use crate::request::Request;

const MTIME_FORMAT: &str = "%Y-%b-%d %H:%M:%S";

const TABLE_HEAD: &[u8] = b"</h2>\n\
<div class=\"list\">\n\
<table summary=\"Directory Listing\" cellpadding=\"0\" cellspacing=\"0\">\n\
<thead><tr>\
<th class=\"n\">Name</th>\
<th class=\"m\">Last Modified</th>\
<th class=\"s\">Size</th>\
<th class=\"t\">Type</th>\
</tr></thead>\n\
<tbody>\n";

const PARENT_ROW: &[u8] = b"<tr class=\"d\">\
<td class=\"n\"><a href=\"../\">..</a>/</td>\
<td class=\"m\" data-value=\"-1\">&nbsp;</td>\
<td class=\"s\" data-value=\"-1\">- &nbsp;</td>\
<td class=\"t\">Directory</td>\
</tr>\n";

const TABLE_FOOT: &[u8] = b"</tbody>\n</table>\n</div>\n";

/// `Content-Type` of an HTML listing.
pub fn content_type(encoding: Option<&str>) -> String {
    match encoding {
        Some(charset) => format!("text/html;charset={}", charset),
        None => "text/html".to_string(),
    }
}

/// Modification time in local time, like `2024-Mar-05 14:07:59`.
pub fn format_mtime(mtime: i64) -> String {
    if let Some(local) = Local.timestamp_opt(mtime, 0).earliest() {
        return local.format(MTIME_FORMAT).to_string();
    }
    DateTime::from_timestamp(mtime, 0)
        .map(|utc| utc.format(MTIME_FORMAT).to_string())
        .unwrap_or_default()
}

// ============================================================================
// Rows
// ============================================================================

/// Renders table rows for entries of one directory.
#[derive(Debug, Clone)]
pub struct RowRenderer {
    dir: PathBuf,
    mimes: Arc<MimeMap>,
    use_xattr: bool,
}

impl RowRenderer {
    pub fn new(dir: impl Into<PathBuf>, mimes: Arc<MimeMap>, use_xattr: bool) -> Self {
        Self {
            dir: dir.into(),
            mimes,
            use_xattr,
        }
    }

    pub fn from_request(r: &Request) -> Self {
        Self::new(r.physical_path.clone(), Arc::clone(&r.conf.mimetypes), r.conf.use_xattr)
    }

    pub fn row(&self, out: &mut Vec<u8>, entry: &DirEntry, is_dir: bool) {
        if is_dir {
            self.dir_row(out, entry);
        } else {
            self.file_row(out, entry);
        }
    }

    pub fn dir_row(&self, out: &mut Vec<u8>, entry: &DirEntry) {
        out.extend_from_slice(b"<tr class=\"d\"><td class=\"n\"><a href=\"");
        append_uri_part(out, entry.name());
        out.extend_from_slice(b"/\">");
        append_minimal_xml(out, entry.name());
        out.extend_from_slice(b"</a>/</td><td class=\"m\">");
        out.extend_from_slice(format_mtime(entry.mtime).as_bytes());
        out.extend_from_slice(
            b"</td><td class=\"s\" data-value=\"-1\">- &nbsp;</td><td class=\"t\">Directory</td></tr>\n",
        );
    }

    pub fn file_row(&self, out: &mut Vec<u8>, entry: &DirEntry) {
        out.extend_from_slice(b"<tr><td class=\"n\"><a href=\"");
        append_uri_part(out, entry.name());
        out.extend_from_slice(b"\">");
        append_minimal_xml(out, entry.name());
        out.extend_from_slice(b"</a></td><td class=\"m\">");
        out.extend_from_slice(format_mtime(entry.mtime).as_bytes());
        out.extend_from_slice(b"</td><td class=\"s\" data-value=\"");
        out.extend_from_slice(entry.size.to_string().as_bytes());
        out.extend_from_slice(b"\">");
        out.extend_from_slice(format_size(entry.size).as_bytes());
        out.extend_from_slice(b"</td><td class=\"t\">");
        let resolver = MimeResolver {
            map: &self.mimes,
            use_xattr: self.use_xattr,
        };
        out.extend_from_slice(resolver.resolve(&self.dir, entry.name()).as_bytes());
        out.extend_from_slice(b"</td></tr>\n");
    }
}

// ============================================================================
// Page
// ============================================================================

/// Request details the page header and footer need.
#[derive(Debug, Clone)]
pub struct Page {
    pub uri_path: String,
    pub physical_path: PathBuf,
    pub server_tag: Option<String>,
    pub follow_symlink: bool,
}

impl Page {
    pub fn from_request(r: &Request) -> Self {
        Self {
            uri_path: r.uri_path.clone(),
            physical_path: r.physical_path.clone(),
            server_tag: r.conf.server_tag.clone(),
            follow_symlink: r.conf.follow_symlink,
        }
    }
}

/// Appends everything above the first row: document head, HEADER include,
/// title, table head and the parent row.
pub fn append_header(body: &mut ResponseBody, conf: &ListingConfig, page: &Page) -> io::Result<()> {
    if conf.auto_layout {
        let mut out = Vec::with_capacity(2048);
        out.extend_from_slice(b"<!DOCTYPE html>\n<html>\n<head>\n");
        if let Some(charset) = &conf.encoding {
            out.extend_from_slice(b"<meta charset=\"");
            out.extend_from_slice(charset.as_bytes());
            out.extend_from_slice(b"\">\n");
        }
        out.extend_from_slice(b"<title>Index of ");
        append_minimal_xml(&mut out, page.uri_path.as_bytes());
        out.extend_from_slice(b"</title>\n");
        match &conf.external_css {
            Some(css) => {
                out.extend_from_slice(
                    b"<meta name=\"viewport\" content=\"initial-scale=1\">\
                      <link rel=\"stylesheet\" type=\"text/css\" href=\"",
                );
                out.extend_from_slice(css.as_bytes());
                out.extend_from_slice(b"\">\n");
            }
            None => out.extend_from_slice(assets::INLINE_STYLE.as_bytes()),
        }
        out.extend_from_slice(b"</head>\n<body>\n");
        body.append_buffer(out);
    }

    if let Some(name) = &conf.show_header {
        append_include(body, page, name, IncludeKind::Header, conf.encode_header)?;
    }

    let mut out = Vec::with_capacity(1024);
    out.extend_from_slice(b"<h2>Index of ");
    append_minimal_xml(&mut out, page.uri_path.as_bytes());
    out.extend_from_slice(TABLE_HEAD);
    if page.uri_path != "/" {
        out.extend_from_slice(PARENT_ROW);
    }
    body.append_buffer(out);
    Ok(())
}

/// Appends everything below the last row: table close, README include,
/// footer line and the sort script.
pub fn append_footer(body: &mut ResponseBody, conf: &ListingConfig, page: &Page) -> io::Result<()> {
    body.append_mem(TABLE_FOOT);

    if let Some(name) = &conf.show_readme {
        append_include(body, page, name, IncludeKind::Readme, conf.encode_readme)?;
    }

    if conf.auto_layout {
        let mut out = Vec::with_capacity(8192);
        if let Some(footer) = conf.set_footer.as_ref().or(page.server_tag.as_ref()) {
            out.extend_from_slice(b"<div class=\"foot\">");
            out.extend_from_slice(footer.as_bytes());
            out.extend_from_slice(b"</div>\n");
        }
        match &conf.external_js {
            Some(js) => {
                out.extend_from_slice(b"<script type=\"text/javascript\" src=\"");
                out.extend_from_slice(js.as_bytes());
                out.extend_from_slice(b"\"></script>\n");
            }
            None => assets::append_resort_script(&mut out),
        }
        out.extend_from_slice(b"</body>\n</html>\n");
        body.append_buffer(out);
    }
    Ok(())
}
