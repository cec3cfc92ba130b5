//! End-to-end listings driven through the public handler API.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use http::header::{self, HeaderMap};
use http::{Method, StatusCode};

use dirlisting::listing::{CacheFormat, CacheLookup};
use dirlisting::{
    CacheDescriptor, CacheManager, Connection, DirListing, Dispatch, ListingConfig, Request, ScopedConfig,
    ServerLimits, Step,
};

#[derive(Default)]
struct TestConn {
    resumes: usize,
    invalidated: Vec<PathBuf>,
}

impl Connection for TestConn {
    fn is_writable(&self) -> bool {
        true
    }

    fn schedule_resume(&mut self) {
        self.resumes += 1;
    }

    fn send_informational(&mut self, _status: StatusCode, _headers: &HeaderMap) -> io::Result<()> {
        Ok(())
    }

    fn invalidate_stat_cache(&mut self, path: &Path) {
        self.invalidated.push(path.to_path_buf());
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn handler(conf: ListingConfig) -> DirListing {
    DirListing::new(ScopedConfig::new(conf), &ServerLimits { max_conns: 1024 })
}

fn active() -> ListingConfig {
    ListingConfig {
        activate: true,
        ..ListingConfig::default()
    }
}

fn cached(root: &Path) -> ListingConfig {
    ListingConfig {
        cache: conf_cache(root),
        ..active()
    }
}

fn physical(dir: &Path) -> PathBuf {
    let mut path = dir.as_os_str().to_owned();
    path.push("/");
    PathBuf::from(path)
}

/// Runs one request to completion, returning the request and the number of yields.
fn serve(listing: &DirListing, dir: &Path, query: Option<&str>) -> (Request, usize) {
    let mut r = Request::new(Method::GET, "/files/", physical(dir));
    r.query = query.map(str::to_string);
    let mut conn = TestConn::default();
    match listing.start(&mut r, &mut conn).expect("listing starts") {
        Dispatch::Declined => panic!("request was declined"),
        Dispatch::Finished => {}
        Dispatch::Pending(mut task) => loop {
            if task.resume(&mut r, &mut conn).expect("listing resumes") == Step::Finished {
                break;
            }
        },
    }
    (r, conn.resumes)
}

fn body_text(r: &Request) -> String {
    String::from_utf8(r.body.to_vec().expect("body readable")).expect("utf-8 body")
}

fn sample_dir() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().expect("temp dir");
    fs::create_dir(tmp.path().join("A")).unwrap();
    fs::write(tmp.path().join("b.txt"), b"hello").unwrap();
    fs::write(tmp.path().join(".hidden"), b"secret").unwrap();
    tmp
}

#[test]
fn test_sorted_html_lists_directories_first() {
    init_logging();
    let tmp = sample_dir();
    let (r, resumes) = serve(&handler(active()), tmp.path(), None);

    assert_eq!(r.status, Some(StatusCode::OK));
    assert_eq!(resumes, 0);
    let html = body_text(&r);
    let dir_row = html.find("<a href=\"A/\">A</a>/").expect("directory row");
    let file_row = html.find("<a href=\"b.txt\">b.txt</a>").expect("file row");
    assert!(dir_row < file_row);
    assert!(!html.contains(".hidden"));
    assert!(html.contains("<td class=\"s\" data-value=\"5\">0.1K</td>"));
    assert!(html.ends_with("</body>\n</html>\n"));
}

#[test]
fn test_json_listing_shape() {
    init_logging();
    let tmp = sample_dir();
    let (r, _) = serve(&handler(active()), tmp.path(), Some("json"));

    assert_eq!(r.header_str(&header::CONTENT_TYPE), Some("application/json"));
    let parsed: serde_json::Value = serde_json::from_str(&body_text(&r)).expect("valid JSON");
    let mut entries: Vec<(String, String, i64)> = parsed
        .as_array()
        .expect("top-level array")
        .iter()
        .map(|e| {
            (
                e["name"].as_str().unwrap().to_string(),
                e["type"].as_str().unwrap().to_string(),
                e["size"].as_i64().unwrap(),
            )
        })
        .collect();
    entries.sort();
    let dir_size = fs::metadata(tmp.path().join("A")).unwrap().len() as i64;
    assert_eq!(
        entries,
        vec![
            ("A".to_string(), "dir".to_string(), dir_size),
            ("b.txt".to_string(), "file".to_string(), 5),
        ]
    );
    assert!(parsed[0]["mtime"].is_i64());
}

#[test]
fn test_large_directory_yields_between_batches() {
    init_logging();
    let tmp = tempfile::tempdir().expect("temp dir");
    for i in 0..70 {
        fs::write(tmp.path().join(format!("f{:03}", i)), b"x").unwrap();
    }
    let (r, resumes) = serve(&handler(active()), tmp.path(), None);
    // 70 entries in batches of 32
    assert_eq!(resumes, 2);
    let html = body_text(&r);
    assert_eq!(html.matches("<tr><td class=\"n\">").count(), 70);
    assert!(html.find("f000").unwrap() < html.find("f069").unwrap());
}

#[test]
fn test_full_batches_each_yield() {
    init_logging();
    for count in [32, 64, 96] {
        let tmp = tempfile::tempdir().expect("temp dir");
        for i in 0..count {
            fs::write(tmp.path().join(format!("f{:03}", i)), b"x").unwrap();
        }
        let (r, resumes) = serve(&handler(active()), tmp.path(), None);
        assert_eq!(resumes, count / 32, "yields for {} entries", count);
        assert_eq!(body_text(&r).matches("<tr><td class=\"n\">").count(), count);
    }
}

#[test]
fn test_repeated_requests_render_identically() {
    init_logging();
    let tmp = sample_dir();
    for i in 0..50 {
        fs::write(tmp.path().join(format!("extra-{}", i)), b"x").unwrap();
    }
    let buffered = handler(active());
    assert_eq!(body_text(&serve(&buffered, tmp.path(), None).0), body_text(&serve(&buffered, tmp.path(), None).0));

    let streamed = handler(ListingConfig { sort: false, ..active() });
    let first = body_text(&serve(&streamed, tmp.path(), None).0);
    assert_eq!(first, body_text(&serve(&streamed, tmp.path(), None).0));
    assert_eq!(first.matches("<tr><td class=\"n\">").count(), 51);
}

#[test]
fn test_cache_hit_serves_without_rescanning() {
    init_logging();
    let tmp = sample_dir();
    let cache_root = tempfile::tempdir().expect("cache dir");
    let listing = handler(cached(cache_root.path()));

    let (first, _) = serve(&listing, tmp.path(), None);
    assert_eq!(first.header_str(&header::CACHE_CONTROL), Some("max-age=60"));
    assert!(first.has_header(&header::ETAG));
    let cache = CacheManager::new(conf_cache(cache_root.path()));
    let cache_file = cache.cache_path(&physical(tmp.path()), CacheFormat::Html).unwrap();
    assert_eq!(fs::read(&cache_file).unwrap(), first.body.to_vec().unwrap());

    // A hit does not look at the directory again
    fs::remove_file(tmp.path().join("b.txt")).unwrap();
    let (second, _) = serve(&listing, tmp.path(), None);
    assert_eq!(body_text(&second), body_text(&first));
    assert_eq!(second.header_str(&header::ETAG), first.header_str(&header::ETAG));
    assert!(second.header_str(&header::CACHE_CONTROL).unwrap().starts_with("max-age="));
    assert_eq!(listing.admission().in_flight(), 0);
}

#[test]
fn test_expired_cache_is_rewritten() {
    init_logging();
    let tmp = sample_dir();
    let cache_root = tempfile::tempdir().expect("cache dir");
    let listing = handler(cached(cache_root.path()));
    let cache = CacheManager::new(conf_cache(cache_root.path()));
    let dir = physical(tmp.path());

    serve(&listing, tmp.path(), None);
    let cache_file = cache.cache_path(&dir, CacheFormat::Html).unwrap();
    let old = SystemTime::now() - Duration::from_secs(3600);
    fs::File::options().write(true).open(&cache_file).unwrap().set_modified(old).unwrap();
    assert!(matches!(cache.lookup(&dir, CacheFormat::Html), CacheLookup::Stale));

    fs::write(tmp.path().join("new.txt"), b"fresh").unwrap();
    let (r, _) = serve(&listing, tmp.path(), None);
    assert!(body_text(&r).contains("new.txt"));
    assert!(matches!(cache.lookup(&dir, CacheFormat::Html), CacheLookup::Fresh(_)));
    assert_eq!(fs::read(&cache_file).unwrap(), r.body.to_vec().unwrap());
}

#[test]
fn test_streamed_listing_is_cached_through_the_tee() {
    init_logging();
    let tmp = sample_dir();
    for i in 0..40 {
        fs::write(tmp.path().join(format!("s{}", i)), b"x").unwrap();
    }
    let cache_root = tempfile::tempdir().expect("cache dir");
    let conf = ListingConfig {
        sort: false,
        ..cached(cache_root.path())
    };
    let (r, resumes) = serve(&handler(conf), tmp.path(), None);
    assert_eq!(resumes, 1);

    let cache = CacheManager::new(conf_cache(cache_root.path()));
    let cache_file = cache.cache_path(&physical(tmp.path()), CacheFormat::Html).unwrap();
    assert_eq!(fs::read(&cache_file).unwrap(), r.body.to_vec().unwrap());
}

#[test]
fn test_json_listing_is_cached_separately() {
    init_logging();
    let tmp = sample_dir();
    let cache_root = tempfile::tempdir().expect("cache dir");
    let listing = handler(cached(cache_root.path()));
    let (r, _) = serve(&listing, tmp.path(), Some("json"));

    let cache = CacheManager::new(conf_cache(cache_root.path()));
    let dir = physical(tmp.path());
    let json_file = cache.cache_path(&dir, CacheFormat::Json).unwrap();
    assert_eq!(fs::read(&json_file).unwrap(), r.body.to_vec().unwrap());
    assert!(matches!(cache.lookup(&dir, CacheFormat::Html), CacheLookup::Stale));

    let (hit, _) = serve(&listing, tmp.path(), Some("json"));
    assert_eq!(hit.header_str(&header::CONTENT_TYPE), Some("application/json"));
    assert_eq!(body_text(&hit), body_text(&r));
}

#[test]
fn test_chunked_response_abandons_the_cache_file() {
    init_logging();
    let tmp = sample_dir();
    let cache_root = tempfile::tempdir().expect("cache dir");
    let conf = ListingConfig {
        sort: false,
        ..cached(cache_root.path())
    };
    let listing = handler(conf);
    let mut r = Request::new(Method::GET, "/files/", physical(tmp.path()));
    r.send_chunked = true;
    let mut conn = TestConn::default();
    assert!(matches!(listing.start(&mut r, &mut conn).unwrap(), Dispatch::Finished));

    assert!(body_text(&r).contains("b.txt"));
    let cache = CacheManager::new(conf_cache(cache_root.path()));
    let dir = cache.cache_dir(&physical(tmp.path())).unwrap();
    let leftovers: Vec<_> = fs::read_dir(&dir).map(|d| d.collect()).unwrap_or_default();
    assert!(leftovers.is_empty());
    assert!(conn.invalidated.is_empty());
}

#[test]
fn test_missing_directory_is_forbidden() {
    init_logging();
    let tmp = tempfile::tempdir().expect("temp dir");
    let (r, _) = serve(&handler(active()), &tmp.path().join("missing"), None);
    assert_eq!(r.status, Some(StatusCode::FORBIDDEN));
}

fn conf_cache(root: &Path) -> Option<Arc<CacheDescriptor>> {
    Some(Arc::new(CacheDescriptor {
        root: root.to_path_buf(),
        max_age: 60,
    }))
}
