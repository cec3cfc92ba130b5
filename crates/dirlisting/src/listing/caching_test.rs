//! Tests for cache path mapping, freshness, and the write session lifecycle.

use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;
use std::sync::Arc;

use http::Method;

use super::caching::*;
use crate::body::ResponseBody;
use crate::request::Request;

fn manager(root: &Path, max_age: i64) -> CacheManager {
    CacheManager::new(Some(Arc::new(CacheDescriptor {
        root: root.to_path_buf(),
        max_age,
    })))
}

fn entries_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_cache_path_mirrors_physical_path() {
    let cache = manager(Path::new("/var/cache/dirlist/"), 15);
    assert_eq!(
        cache.cache_path(Path::new("/srv/www/pub/"), CacheFormat::Html).unwrap(),
        Path::new("/var/cache/dirlist/srv/www/pub/dirlist.html")
    );
    assert_eq!(
        cache.cache_path(Path::new("/srv/www/pub/"), CacheFormat::Json).unwrap(),
        Path::new("/var/cache/dirlist/srv/www/pub/dirlist.json")
    );
}

#[test]
fn test_disabled_manager() {
    let cache = CacheManager::new(None);
    assert!(!cache.is_enabled());
    assert!(cache.cache_path(Path::new("/srv/"), CacheFormat::Html).is_none());
    assert!(matches!(
        cache.lookup(Path::new("/srv/"), CacheFormat::Html),
        CacheLookup::Disabled
    ));
}

#[test]
fn test_missing_cache_file_is_stale() {
    let root = tempfile::tempdir().expect("temp dir");
    let cache = manager(root.path(), 15);
    assert!(matches!(
        cache.lookup(Path::new("/srv/www/"), CacheFormat::Html),
        CacheLookup::Stale
    ));
}

#[test]
fn test_commit_publishes_file_and_creates_private_dirs() {
    let root = tempfile::tempdir().expect("temp dir");
    let cache = manager(root.path(), 15);
    let physical = Path::new("/srv/www/pub/");

    let mut session = cache.begin_write(physical, CacheFormat::Html).unwrap();
    let temp_path = session.temp_path().to_path_buf();
    assert!(
        temp_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("dirlist.html.")
    );
    assert_eq!(fs::metadata(&temp_path).unwrap().permissions().mode() & 0o777, 0o600);

    session.tee(b"<html>").unwrap();
    session.tee(b"</html>").unwrap();
    // Not visible under the final name until committed
    assert!(!session.final_path().exists());

    let committed = session.commit().unwrap();
    assert_eq!(fs::read(&committed.path).unwrap(), b"<html></html>");
    assert_eq!(committed.metadata.len(), 13);
    assert!(!temp_path.exists());

    let dir = cache.cache_dir(physical).unwrap();
    assert_eq!(fs::metadata(&dir).unwrap().permissions().mode() & 0o777, 0o700);
    assert_eq!(entries_in(&dir), vec!["dirlist.html"]);
}

#[test]
fn test_abort_removes_temp_file() {
    let root = tempfile::tempdir().expect("temp dir");
    let cache = manager(root.path(), 15);
    let physical = Path::new("/data/");
    let mut session = cache.begin_write(physical, CacheFormat::Json).unwrap();
    session.tee(b"[").unwrap();
    session.abort();
    assert!(entries_in(&cache.cache_dir(physical).unwrap()).is_empty());
}

#[test]
fn test_dropped_session_removes_temp_file() {
    let root = tempfile::tempdir().expect("temp dir");
    let cache = manager(root.path(), 15);
    let physical = Path::new("/data/");
    {
        let mut session = cache.begin_write(physical, CacheFormat::Html).unwrap();
        session.tee(b"partial").unwrap();
    }
    assert!(entries_in(&cache.cache_dir(physical).unwrap()).is_empty());
}

#[test]
fn test_freshness_window() {
    let root = tempfile::tempdir().expect("temp dir");
    let cache = manager(root.path(), 15);
    let physical = Path::new("/srv/");
    let mut session = cache.begin_write(physical, CacheFormat::Html).unwrap();
    session.tee(b"cached").unwrap();
    let committed = session.commit().unwrap();
    let mtime = committed.metadata.mtime();

    match cache.lookup_at(physical, CacheFormat::Html, mtime + 5) {
        CacheLookup::Fresh(hit) => {
            assert_eq!(hit.max_age_remaining, 10);
            assert_eq!(hit.path, committed.path);
        }
        other => panic!("Expected fresh hit, got: {:?}", other),
    }
    // Boundary is inclusive
    assert!(matches!(
        cache.lookup_at(physical, CacheFormat::Html, mtime + 15),
        CacheLookup::Fresh(_)
    ));
    assert!(matches!(
        cache.lookup_at(physical, CacheFormat::Html, mtime + 16),
        CacheLookup::Stale
    ));
    // Other format is a separate file
    assert!(matches!(
        cache.lookup_at(physical, CacheFormat::Json, mtime),
        CacheLookup::Stale
    ));
}

#[test]
fn test_store_body_copies_all_chunks() {
    let root = tempfile::tempdir().expect("temp dir");
    let cache = manager(root.path(), 15);
    let mut body = ResponseBody::new(root.path());
    body.append_mem(b"head ");
    body.append_mem_to_tempfile(b"spilled ").unwrap();
    body.append_mem(b"tail");

    let committed = cache.store_body(Path::new("/x/"), &body).unwrap();
    assert_eq!(fs::read(committed.path).unwrap(), b"head spilled tail");
    // The response body itself is left intact
    assert_eq!(body.to_vec().unwrap(), b"head spilled tail");
}

#[test]
fn test_begin_write_fails_when_root_is_a_file() {
    let root = tempfile::tempdir().expect("temp dir");
    let file_root = root.path().join("plain");
    fs::write(&file_root, b"x").unwrap();
    let cache = manager(&file_root, 15);
    let err = cache.begin_write(Path::new("/srv/"), CacheFormat::Html).unwrap_err();
    assert!(matches!(err, CacheError::CreateDir { .. }));
}

#[test]
fn test_tee_detaches_on_chunked_response() {
    let root = tempfile::tempdir().expect("temp dir");
    let cache = manager(root.path(), 15);
    let physical = Path::new("/srv/");
    let session = cache.begin_write(physical, CacheFormat::Html).unwrap();
    let mut tee = CacheTee::new(Some(session));
    let mut r = Request::new(Method::GET, "/", root.path());

    tee.forward_bytes(&mut r, b"first".to_vec());
    assert!(tee.is_attached());

    r.send_chunked = true;
    tee.forward_bytes(&mut r, b" second".to_vec());
    assert!(!tee.is_attached());
    // The response keeps everything regardless
    assert_eq!(r.body.to_vec().unwrap(), b"first second");
    assert!(entries_in(&cache.cache_dir(physical).unwrap()).is_empty());
}

#[test]
fn test_cache_control_respects_existing_header() {
    let mut r = Request::new(Method::GET, "/", "/tmp/");
    apply_cache_control(&mut r, 10);
    assert_eq!(r.header_str(&http::header::CACHE_CONTROL), Some("max-age=10"));

    let mut r = Request::new(Method::GET, "/", "/tmp/");
    r.set_header(http::header::CACHE_CONTROL, "no-store");
    apply_cache_control(&mut r, 10);
    assert_eq!(r.header_str(&http::header::CACHE_CONTROL), Some("no-store"));
}
