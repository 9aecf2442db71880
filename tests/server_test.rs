//! HTTP Server Integration Tests
//!
//! Starts the server on an OS-assigned port, backed by a temporary local
//! directory, and drives it with real multipart requests.

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use std::net::SocketAddr;
use std::path::Path;
use tempfile::TempDir;
use wave_uploadr::config::{
    Config, LocalConfig, MetricsConfig, ServerConfig, StorageBackend, StorageConfig, UploadConfig,
};
use wave_uploadr::server::Server;
use wave_uploadr::upload::UploadRules;

fn test_config(root: &Path) -> Config {
    Config {
        server: ServerConfig {
            address: "127.0.0.1:0".into(),
            upload_path: "/upload".into(),
        },
        storage: StorageConfig {
            backend: StorageBackend::Local,
            s3: None,
            local: Some(LocalConfig {
                root: root.to_path_buf(),
            }),
        },
        upload: UploadConfig {
            rules: UploadRules {
                allowed_types: ["image/png".to_string()].into_iter().collect(),
                max_size: Some(4096),
            },
            ..UploadConfig::default()
        },
        metrics: MetricsConfig::default(),
    }
}

/// Start a server in the background and return its address
async fn start_server() -> (SocketAddr, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let server = Server::new(test_config(dir.path())).await.unwrap();
    let addr = server.local_addr();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    (addr, dir)
}

fn png_form(filename: &str, data: Vec<u8>) -> Form {
    Form::new().part(
        "File",
        Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str("image/png")
            .unwrap(),
    )
}

#[tokio::test]
async fn test_health_check() {
    let (addr, _dir) = start_server().await;

    let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_upload_created() {
    let (addr, dir) = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{}/upload", addr))
        .multipart(png_form("avatar.png", vec![1u8; 2048]))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["path"], "avatar.png");

    let stored = std::fs::read(dir.path().join("avatar.png")).unwrap();
    assert_eq!(stored.len(), 2048);
}

#[tokio::test]
async fn test_upload_invalid() {
    let (addr, dir) = start_server().await;
    let client = reqwest::Client::new();

    let form = Form::new().part(
        "File",
        Part::bytes(vec![0u8; 8000])
            .file_name("huge.jpg")
            .mime_str("image/jpeg")
            .unwrap(),
    );
    let response = client
        .post(format!("http://{}/upload", addr))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = response.json().await.unwrap();
    let messages = body["errors"]["file"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0], "not an allowed type");
    assert_eq!(messages[1], "is too big 8.0 kB");

    assert!(!dir.path().join("huge.jpg").exists());
}

#[tokio::test]
async fn test_upload_without_file() {
    let (addr, _dir) = start_server().await;
    let client = reqwest::Client::new();

    let form = Form::new().text("Title", "no attachment");
    let response = client
        .post(format!("http://{}/upload", addr))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_upload_not_multipart() {
    let (addr, _dir) = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{}/upload", addr))
        .header("Content-Type", "application/json")
        .body("{}")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_wrong_method() {
    let (addr, _dir) = start_server().await;

    let response = reqwest::get(format!("http://{}/upload", addr)).await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_unknown_path() {
    let (addr, _dir) = start_server().await;

    let response = reqwest::get(format!("http://{}/nope", addr)).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (addr, _dir) = start_server().await;
    let client = reqwest::Client::new();

    client
        .post(format!("http://{}/upload", addr))
        .multipart(png_form("counted.png", vec![2u8; 16]))
        .send()
        .await
        .unwrap();

    let response = reqwest::get(format!("http://{}/metrics", addr)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let text = response.text().await.unwrap();
    assert!(text.contains("wave_uploads_total"));
    assert!(text.contains("wave_upload_bytes_total"));
}
