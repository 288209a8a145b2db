//! Integration tests for the artifact store backends

use std::process::Command;

use httpmock::prelude::*;

use chromecat::store::{ArtifactStore, FsStore, HttpStore, PNG_CONTENT_TYPE, StoreError};

fn curl_available() -> bool {
    Command::new("curl").arg("--version").output().is_ok()
}

#[test]
fn test_fs_store_roundtrip() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = FsStore::new(dir.path());

    store
        .put("diffs/1700000000000-footer-diff.png", b"png bytes", PNG_CONTENT_TYPE)
        .expect("put should succeed");

    let path = dir.path().join("diffs/1700000000000-footer-diff.png");
    assert!(path.exists(), "artifact file not created");
    assert_eq!(
        store.get("diffs/1700000000000-footer-diff.png").unwrap(),
        Some(b"png bytes".to_vec())
    );
    assert_eq!(store.get("diffs/absent.png").unwrap(), None);

    // No temporary files left behind
    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("diffs"))
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().contains("partial"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_fs_store_overwrites_and_rejects_escapes() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = FsStore::new(dir.path());

    store.put("regions/a.png", b"one", PNG_CONTENT_TYPE).unwrap();
    store.put("regions/a.png", b"two", PNG_CONTENT_TYPE).unwrap();
    assert_eq!(store.get("regions/a.png").unwrap(), Some(b"two".to_vec()));

    for key in ["../outside.png", "/abs.png", "regions//a.png", ""] {
        assert!(
            matches!(store.put(key, b"x", PNG_CONTENT_TYPE), Err(StoreError::InvalidKey(_))),
            "{:?} should be rejected",
            key
        );
    }
}

#[test]
fn test_http_store_put_sends_body_and_token() {
    if !curl_available() {
        eprintln!("curl not available, skipping");
        return;
    }
    let server = MockServer::start();
    let upload = server.mock(|when, then| {
        when.method(PUT)
            .path("/bucket/regions/1-footer-live.png")
            .header("Authorization", "Bearer s3cret")
            .header("Content-Type", "image/png");
        then.status(200);
    });

    let store = HttpStore::new(server.url("/bucket/")).with_token(Some("s3cret".to_string()));
    store
        .put("regions/1-footer-live.png", b"\x89PNG data", PNG_CONTENT_TYPE)
        .expect("upload should succeed");

    upload.assert();
}

#[test]
fn test_http_store_get_and_missing() {
    if !curl_available() {
        eprintln!("curl not available, skipping");
        return;
    }
    let server = MockServer::start();
    let found = server.mock(|when, then| {
        when.method(GET).path("/bucket/diffs/1-footer-diff.png");
        then.status(200).body("diff bytes");
    });
    let missing = server.mock(|when, then| {
        when.method(GET).path("/bucket/diffs/absent.png");
        then.status(404).body("Not Found");
    });

    let store = HttpStore::new(server.url("/bucket"));
    assert_eq!(
        store.get("diffs/1-footer-diff.png").unwrap(),
        Some(b"diff bytes".to_vec())
    );
    assert_eq!(store.get("diffs/absent.png").unwrap(), None);

    found.assert();
    missing.assert();
}

#[test]
fn test_http_store_server_error() {
    if !curl_available() {
        eprintln!("curl not available, skipping");
        return;
    }
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(PUT);
        then.status(503);
    });

    let store = HttpStore::new(server.base_url());
    let err = store.put("regions/a.png", b"x", PNG_CONTENT_TYPE).unwrap_err();
    match err {
        StoreError::Http { key, reason } => {
            assert_eq!(key, "regions/a.png");
            assert_eq!(reason, "HTTP 503");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}
