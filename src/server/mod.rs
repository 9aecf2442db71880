//! HTTP server module
//!
//! Accepts multipart uploads on the configured path and runs them through the
//! upload pipeline against the configured storage backend.
//!
//! # Endpoints
//!
//! * `POST {upload_path}` - `201` with `{"path": ...}` when stored, `204` when
//!   no file was attached, `422` with the validation messages, `400` for a
//!   malformed form, `500` when storage fails
//! * `GET /health` - returns "ok"
//! * `GET /metrics` - Prometheus text format (when enabled)
//!
//! # Example
//!
//! ```no_run
//! use wave_uploadr::{config::Config, server::Server};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load("config.yaml")?;
//! let server = Server::new(config).await?;
//! println!("listening on {}", server.local_addr());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{Config, StorageBackend};
use crate::local::LocalDirectory;
use crate::metrics::{self, UploadStatus};
use crate::s3::S3Bucket;
use crate::upload::{
    self, FileHeader, FormError, StorageError, UploadError, UploadFile, UploadOptions, Uploader,
    ValidationErrors,
};
use async_trait::async_trait;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{body::Incoming, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Storage setup failed: {0}")]
    StorageError(String),

    #[error("Server error: {0}")]
    RuntimeError(String),
}

/// Storage target shared by every connection
#[derive(Clone)]
pub struct Target {
    /// Label used in logs and metrics
    pub name: String,
    pub uploader: Arc<dyn Uploader>,
}

impl Target {
    pub fn new(name: impl Into<String>, uploader: Arc<dyn Uploader>) -> Self {
        Self {
            name: name.into(),
            uploader,
        }
    }

    /// Build the adapter named by `storage.backend`
    pub async fn from_config(config: &Config) -> Result<Self, ServerError> {
        let options = UploadOptions::from(&config.upload);

        match config.storage.backend {
            StorageBackend::S3 => {
                let s3 = config.storage.s3.clone().ok_or_else(|| {
                    ServerError::StorageError("storage.s3 not configured".to_string())
                })?;
                let bucket = S3Bucket::new(s3)
                    .await
                    .map_err(|e| ServerError::StorageError(e.to_string()))?;
                let name = bucket.name().to_string();
                Ok(Self::new(name, Arc::new(bucket.uploader_with(options))))
            }
            StorageBackend::Local => {
                let local = config.storage.local.as_ref().ok_or_else(|| {
                    ServerError::StorageError("storage.local not configured".to_string())
                })?;
                let directory = LocalDirectory::from_config(local)
                    .await
                    .map_err(|e| ServerError::StorageError(e.to_string()))?;
                Ok(Self::new("local", Arc::new(directory.with_options(options))))
            }
        }
    }
}

/// Per-request settings shared across connections
struct AppState {
    upload_path: String,
    metrics_enabled: bool,
    target: Target,
}

/// HTTP Server
pub struct Server {
    state: Arc<AppState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Build the configured storage target and bind the listener
    pub async fn new(config: Config) -> Result<Self, ServerError> {
        let target = Target::from_config(&config).await?;
        Self::with_target(config, target).await
    }

    /// Bind the listener in front of an already constructed target.
    ///
    /// Port 0 binds an OS-assigned port; see [`Server::local_addr`].
    pub async fn with_target(config: Config, target: Target) -> Result<Self, ServerError> {
        let addr: SocketAddr = config
            .server
            .address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        // Actual bound address (differs from `addr` for port 0)
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!(
            address = %local_addr,
            target = %target.name,
            upload_path = %config.server.upload_path,
            "Server bound"
        );

        Ok(Self {
            state: Arc::new(AppState {
                upload_path: config.server.upload_path,
                metrics_enabled: config.metrics.enabled,
                target,
            }),
            listener,
            local_addr,
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until Ctrl-C
    pub async fn run(self) -> Result<(), ServerError> {
        info!("Starting server on {}", self.local_addr);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
                signal = &mut shutdown => {
                    signal.map_err(|e| ServerError::RuntimeError(e.to_string()))?;
                    info!("Shutting down server");
                    return Ok(());
                }
            };

            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);

                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { handle_request(req, state).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection from {}: {}", peer_addr, e);
                }
            });
        }
    }
}

/// Route a request
async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<String>, hyper::Error> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    info!("Handling {} {}", method, path);

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/health") => text_response(StatusCode::OK, "ok"),
        (&Method::GET, "/metrics") if state.metrics_enabled => metrics_response(),
        (&Method::POST, p) if p == state.upload_path => handle_upload(req, &state).await,
        (_, p) if p == state.upload_path => {
            text_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
        }
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}

async fn handle_upload(req: Request<Incoming>, state: &AppState) -> Response<String> {
    let target = &state.target;
    let recorder = Recorder::new(target.uploader.as_ref());

    match upload::upload(req, &recorder).await {
        Ok(errors) if errors.has_any() => {
            metrics::record_upload(&target.name, UploadStatus::Invalid);
            metrics::record_validation_errors(&errors);
            json_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                &serde_json::json!({ "errors": errors }),
            )
        }
        Ok(_) => match recorder.stored_path() {
            Some(path) => {
                metrics::record_upload(&target.name, UploadStatus::Success);
                json_response(StatusCode::CREATED, &serde_json::json!({ "path": path }))
            }
            None => {
                metrics::record_upload(&target.name, UploadStatus::Skipped);
                empty_response(StatusCode::NO_CONTENT)
            }
        },
        Err(e) => {
            metrics::record_upload(&target.name, UploadStatus::Failure);
            let (status, kind) = classify(&e);
            metrics::record_error(kind);

            if status.is_server_error() {
                error!(target_name = %target.name, error = %e, "Upload failed");
            } else {
                warn!(target_name = %target.name, error = %e, "Bad upload request");
            }
            json_response(status, &serde_json::json!({ "error": e.to_string() }))
        }
    }
}

/// HTTP status and metric label for an upload error
fn classify(error: &UploadError) -> (StatusCode, &'static str) {
    match error {
        UploadError::Form(FormError::Io(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "spool"),
        UploadError::Form(_) => (StatusCode::BAD_REQUEST, "form"),
        UploadError::InvalidContentLength(_) => (StatusCode::BAD_REQUEST, "content_length"),
        UploadError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "size"),
        UploadError::Validate(_) => (StatusCode::INTERNAL_SERVER_ERROR, "validate"),
        UploadError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
    }
}

/// Wraps the shared uploader to remember where a file was stored
struct Recorder<'a> {
    inner: &'a dyn Uploader,
    stored: Mutex<Option<String>>,
}

impl<'a> Recorder<'a> {
    fn new(inner: &'a dyn Uploader) -> Self {
        Self {
            inner,
            stored: Mutex::new(None),
        }
    }

    fn stored_path(&self) -> Option<String> {
        self.stored.lock().ok().and_then(|stored| stored.clone())
    }
}

#[async_trait]
impl Uploader for Recorder<'_> {
    fn field_name(&self) -> &str {
        self.inner.field_name()
    }

    fn path(&self, header: &FileHeader) -> String {
        self.inner.path(header)
    }

    fn validate(&self, header: &FileHeader) -> Result<ValidationErrors, UploadError> {
        self.inner.validate(header)
    }

    async fn put(
        &self,
        path: &str,
        file: UploadFile,
        size: u64,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.inner.put(path, file, size, content_type).await?;
        if let Ok(mut stored) = self.stored.lock() {
            *stored = Some(path.to_string());
        }
        Ok(())
    }

    fn memory_limit(&self) -> usize {
        self.inner.memory_limit()
    }
}

fn metrics_response() -> Response<String> {
    match metrics::encode() {
        Ok((content_type, body)) => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", content_type)
            .body(String::from_utf8_lossy(&body).into_owned())
            .expect("Failed to build metrics response"),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn text_response(status: StatusCode, body: &str) -> Response<String> {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain")
        .body(body.to_string())
        .expect("Failed to build text response")
}

fn json_response(status: StatusCode, body: &serde_json::Value) -> Response<String> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(body.to_string())
        .expect("Failed to build JSON response")
}

fn empty_response(status: StatusCode) -> Response<String> {
    Response::builder()
        .status(status)
        .body(String::new())
        .expect("Failed to build empty response")
}
