//! Local Directory Adapter Tests
//!
//! Full pipeline runs against `LocalDirectory` in a temporary directory.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::CONTENT_TYPE;
use hyper::Request;
use tempfile::tempdir;
use wave_uploadr::config::LocalConfig;
use wave_uploadr::local::LocalDirectory;
use wave_uploadr::upload::{upload, StorageError, UploadFile, UploadOptions, UploadRules, Uploader};

const BOUNDARY: &str = "local-test-boundary";

fn request_with_file(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Request<Full<Bytes>> {
    let mut body = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
        BOUNDARY, field, filename, content_type
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

#[tokio::test]
async fn test_upload_stores_file_under_root() {
    let dir = tempdir().unwrap();
    let storage = LocalDirectory::from_config(&LocalConfig {
        root: dir.path().to_path_buf(),
    })
    .await
    .unwrap();

    let errors = upload(
        request_with_file("File", "report.pdf", "application/pdf", b"%PDF-1.7"),
        &storage,
    )
    .await
    .unwrap();

    assert!(errors.is_empty());
    assert_eq!(std::fs::read(dir.path().join("report.pdf")).unwrap(), b"%PDF-1.7");
}

#[tokio::test]
async fn test_rules_reject_before_write() {
    let dir = tempdir().unwrap();
    let storage = LocalDirectory::new(dir.path()).await.unwrap().with_options(UploadOptions {
        rules: UploadRules {
            allowed_types: ["image/png".to_string()].into_iter().collect(),
            max_size: None,
        },
        ..UploadOptions::default()
    });

    let errors = upload(
        request_with_file("File", "script.sh", "text/x-shellscript", b"#!/bin/sh"),
        &storage,
    )
    .await
    .unwrap();

    assert_eq!(errors.get("file").unwrap(), &["not an allowed type".to_string()]);
    assert!(!dir.path().join("script.sh").exists());
}

#[tokio::test]
async fn test_custom_field_name() {
    let dir = tempdir().unwrap();
    let storage = LocalDirectory::new(dir.path()).await.unwrap().with_options(UploadOptions {
        field_name: "Avatar Image".to_string(),
        ..UploadOptions::default()
    });
    assert_eq!(storage.field_name(), "Avatar Image");

    upload(
        request_with_file("Avatar Image", "me.png", "image/png", b"PNG"),
        &storage,
    )
    .await
    .unwrap();

    assert!(dir.path().join("me.png").exists());
}

#[tokio::test]
async fn test_spilled_upload_is_copied() {
    let dir = tempdir().unwrap();
    let storage = LocalDirectory::new(dir.path().join("store"))
        .await
        .unwrap()
        .with_options(UploadOptions {
            memory_limit: 16,
            ..UploadOptions::default()
        });
    let data = vec![7u8; 1000];

    upload(
        request_with_file("File", "big.bin", "application/octet-stream", &data),
        &storage,
    )
    .await
    .unwrap();

    assert_eq!(std::fs::read(dir.path().join("store/big.bin")).unwrap(), data);
}

#[tokio::test]
async fn test_put_rejects_escaping_paths() {
    let dir = tempdir().unwrap();
    let storage = LocalDirectory::new(dir.path().join("store")).await.unwrap();

    for path in ["../escape.txt", "/etc/passwd", "a/../../b"] {
        let err = storage
            .put(path, UploadFile::from_bytes("x"), 1, "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(_)), "{}", path);
    }
    assert!(!dir.path().join("escape.txt").exists());
}
