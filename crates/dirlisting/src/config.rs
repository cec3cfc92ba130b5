//! Directory listing configuration.
//!
//! Settings are read from JSON whose keys mirror the server's `dir-listing.*`
//! directives. Each configuration scope is compiled once into a
//! [`ListingOverlay`]; a request gets its own [`ListingConfig`] snapshot by
//! applying every matching overlay on top of the defaults.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::listing::{CacheDescriptor, ExcludeSet, NameFilter};

/// File name used when `show-readme` is `"enable"`.
pub const DEFAULT_README: &str = "README.txt";
/// File name used when `show-header` is `"enable"`.
pub const DEFAULT_HEADER: &str = "HEADER.txt";
/// Cache max-age when a `cache` block does not set one.
pub const DEFAULT_CACHE_MAX_AGE: i32 = 15;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    /// An `exclude` pattern failed to compile.
    InvalidExclude { pattern: String, message: String },
    /// A `cache` block with a non-zero max-age has no `path`.
    CacheMissingPath,
    /// The cache path exists but is not a directory.
    CachePathNotDir(PathBuf),
    /// The settings document is not valid JSON or has unknown keys.
    Json(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidExclude { pattern, message } => {
                write!(f, "dir-listing.exclude: invalid pattern {:?}: {}", pattern, message)
            }
            Self::CacheMissingPath => write!(f, "dir-listing.cache must include \"path\""),
            Self::CachePathNotDir(path) => {
                write!(f, "dir-listing.cache \"path\" => \"{}\" is not a dir", path.display())
            }
            Self::Json(msg) => write!(f, "invalid dir-listing settings: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

// ============================================================================
// Raw settings
// ============================================================================

/// One scope's worth of `dir-listing.*` settings. Every key is optional; unset
/// keys leave the outer value alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ListingSettings {
    #[serde(alias = "dir-listing")]
    pub activate: Option<bool>,
    pub exclude: Option<Vec<String>>,
    pub hide_dotfiles: Option<bool>,
    pub external_css: Option<String>,
    pub external_js: Option<String>,
    pub encoding: Option<String>,
    pub show_readme: Option<String>,
    pub hide_readme_file: Option<bool>,
    pub show_header: Option<String>,
    pub hide_header_file: Option<bool>,
    pub set_footer: Option<String>,
    pub encode_readme: Option<bool>,
    pub encode_header: Option<bool>,
    pub auto_layout: Option<bool>,
    pub cache: Option<CacheSettings>,
    pub sort: Option<bool>,
}

/// Raw `cache` block.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CacheSettings {
    pub path: Option<PathBuf>,
    pub max_age: Option<i32>,
}

// ============================================================================
// Compiled overlay
// ============================================================================

/// Validated settings for one scope, with patterns compiled and the cache resolved.
#[derive(Debug, Clone, Default)]
pub struct ListingOverlay {
    settings: ListingSettings,
    excludes: Option<Option<Arc<dyn NameFilter>>>,
    cache: Option<Option<Arc<CacheDescriptor>>>,
}

impl ListingOverlay {
    pub fn compile(settings: ListingSettings) -> Result<Self, ConfigError> {
        let excludes = match &settings.exclude {
            None => None,
            Some(patterns) if patterns.is_empty() => Some(None),
            Some(patterns) => {
                let set: Arc<dyn NameFilter> = Arc::new(ExcludeSet::new(patterns)?);
                Some(Some(set))
            }
        };
        let cache = settings.cache.as_ref().map(parse_cache).transpose()?;
        Ok(Self {
            settings,
            excludes,
            cache,
        })
    }
}

fn parse_cache(cache: &CacheSettings) -> Result<Option<Arc<CacheDescriptor>>, ConfigError> {
    let max_age = cache.max_age.unwrap_or(DEFAULT_CACHE_MAX_AGE);
    let Some(path) = &cache.path else {
        if max_age > 0 {
            return Err(ConfigError::CacheMissingPath);
        }
        return Ok(None);
    };
    match std::fs::metadata(path) {
        Ok(meta) if !meta.is_dir() => return Err(ConfigError::CachePathNotDir(path.clone())),
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("dir-listing.cache \"path\" => \"{}\" does not exist", path.display());
        }
        Err(_) => {}
    }
    // A zero max-age turns caching off, including a cache enabled by an outer scope
    if max_age <= 0 {
        return Ok(None);
    }
    Ok(Some(Arc::new(CacheDescriptor {
        root: path.clone(),
        max_age: i64::from(max_age),
    })))
}

/// `None` for a blank value so an inner scope can unset an outer one.
fn non_blank(value: &str) -> Option<String> {
    if value.is_empty() { None } else { Some(value.to_string()) }
}

/// Maps the `show-readme`/`show-header` keywords onto a file name.
fn include_name(value: &str, default_name: &str) -> Option<String> {
    match value {
        "" | "disable" => None,
        "enable" => Some(default_name.to_string()),
        other => Some(other.to_string()),
    }
}

// ============================================================================
// Resolved configuration
// ============================================================================

/// Configuration snapshot for one request.
#[derive(Debug, Clone)]
pub struct ListingConfig {
    pub activate: bool,
    /// Render JSON instead of HTML (set per request by `?json`).
    pub json: bool,
    /// Sort on the server; when off, HTML rows are streamed in directory order.
    pub sort: bool,
    pub hide_dot_files: bool,
    pub show_readme: Option<String>,
    pub hide_readme_file: bool,
    pub encode_readme: bool,
    pub show_header: Option<String>,
    pub hide_header_file: bool,
    pub encode_header: bool,
    pub excludes: Option<Arc<dyn NameFilter>>,
    pub external_css: Option<String>,
    pub external_js: Option<String>,
    pub encoding: Option<String>,
    pub set_footer: Option<String>,
    /// Wrap rows in a full HTML document with stylesheet and script.
    pub auto_layout: bool,
    pub cache: Option<Arc<CacheDescriptor>>,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            activate: false,
            json: false,
            sort: true,
            hide_dot_files: true,
            show_readme: None,
            hide_readme_file: false,
            encode_readme: true,
            show_header: None,
            hide_header_file: false,
            encode_header: true,
            excludes: None,
            external_css: None,
            external_js: None,
            encoding: None,
            set_footer: None,
            auto_layout: true,
            cache: None,
        }
    }
}

impl ListingConfig {
    /// Parses one settings document and applies it to the defaults.
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let settings: ListingSettings = serde_json::from_str(contents)?;
        let mut conf = Self::default();
        conf.apply(&ListingOverlay::compile(settings)?);
        Ok(conf)
    }

    /// Applies the keys set in `overlay`, leaving the others untouched.
    pub fn apply(&mut self, overlay: &ListingOverlay) {
        let s = &overlay.settings;
        if let Some(v) = s.activate {
            self.activate = v;
        }
        if let Some(v) = s.hide_dotfiles {
            self.hide_dot_files = v;
        }
        if let Some(v) = &s.external_css {
            self.external_css = non_blank(v);
        }
        if let Some(v) = &s.external_js {
            self.external_js = non_blank(v);
        }
        if let Some(v) = &s.encoding {
            self.encoding = non_blank(v);
        }
        if let Some(v) = &s.show_readme {
            self.show_readme = include_name(v, DEFAULT_README);
        }
        if let Some(v) = s.hide_readme_file {
            self.hide_readme_file = v;
        }
        if let Some(v) = &s.show_header {
            self.show_header = include_name(v, DEFAULT_HEADER);
        }
        if let Some(v) = s.hide_header_file {
            self.hide_header_file = v;
        }
        if let Some(v) = &s.set_footer {
            self.set_footer = non_blank(v);
        }
        if let Some(v) = s.encode_readme {
            self.encode_readme = v;
        }
        if let Some(v) = s.encode_header {
            self.encode_header = v;
        }
        if let Some(v) = s.auto_layout {
            self.auto_layout = v;
        }
        if let Some(v) = s.sort {
            self.sort = v;
        }
        if let Some(excludes) = &overlay.excludes {
            self.excludes = excludes.clone();
        }
        if let Some(cache) = &overlay.cache {
            self.cache = cache.clone();
        }
    }

    /// Switches the snapshot to JSON output, which never uses the page layout.
    pub fn use_json(&mut self) {
        self.json = true;
        self.auto_layout = false;
    }
}

// ============================================================================
// Scopes
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScopedDocument {
    #[serde(default)]
    global: ListingSettings,
    #[serde(default)]
    scopes: Vec<ScopeDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScopeDocument {
    prefix: String,
    settings: ListingSettings,
}

#[derive(Debug, Clone)]
struct Scope {
    prefix: String,
    overlay: ListingOverlay,
}

/// Global listing configuration plus URL-path-prefix scopes, compiled at startup.
#[derive(Debug, Clone, Default)]
pub struct ScopedConfig {
    global: ListingConfig,
    scopes: Vec<Scope>,
}

impl ScopedConfig {
    pub fn new(global: ListingConfig) -> Self {
        Self {
            global,
            scopes: Vec::new(),
        }
    }

    /// Parses `{"global": {...}, "scopes": [{"prefix": "/pub/", "settings": {...}}]}`.
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let doc: ScopedDocument = serde_json::from_str(contents)?;
        let mut global = ListingConfig::default();
        global.apply(&ListingOverlay::compile(doc.global)?);
        let mut scoped = Self::new(global);
        for scope in doc.scopes {
            scoped.push_scope(scope.prefix, scope.settings)?;
        }
        Ok(scoped)
    }

    /// Adds a scope applied to every URL path starting with `prefix`. Later scopes win.
    pub fn push_scope(&mut self, prefix: impl Into<String>, settings: ListingSettings) -> Result<(), ConfigError> {
        self.scopes.push(Scope {
            prefix: prefix.into(),
            overlay: ListingOverlay::compile(settings)?,
        });
        Ok(())
    }

    pub fn global(&self) -> &ListingConfig {
        &self.global
    }

    /// Configuration snapshot for a request to `uri_path`.
    pub fn resolve(&self, uri_path: &str) -> ListingConfig {
        let mut conf = self.global.clone();
        for scope in self.scopes.iter().filter(|s| uri_path.starts_with(&s.prefix)) {
            conf.apply(&scope.overlay);
        }
        conf
    }
}
