//! Multipart form extraction
//!
//! Pulls a single named file part out of a `multipart/form-data` request and
//! spools it into an [`UploadFile`]. Part parsing itself is delegated to
//! `multer`.

use super::spool::{Spooler, UploadFile};
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::Request;
use std::io;
use thiserror::Error;

/// Default in-memory buffer for a file part (32 MiB)
pub const DEFAULT_MEMORY_LIMIT: usize = 32 << 20;

/// Form extraction errors
#[derive(Error, Debug)]
pub enum FormError {
    /// The request has no file part under the requested field
    #[error("no file attached for field '{0}'")]
    MissingFile(String),

    #[error("request is not multipart/form-data")]
    NotMultipart,

    #[error("malformed multipart body: {0}")]
    Multipart(#[from] multer::Error),

    #[error("failed to spool file part: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata for one attached file part
#[derive(Debug, Clone)]
pub struct FileHeader {
    field: String,
    filename: String,
    headers: HeaderMap,
}

impl FileHeader {
    pub fn new(field: impl Into<String>, filename: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            field: field.into(),
            filename: filename.into(),
            headers,
        }
    }

    /// Form field the part was submitted under
    pub fn field_name(&self) -> &str {
        &self.field
    }

    /// Filename supplied by the client
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Raw part headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Declared content type, or `""` when absent
    pub fn content_type(&self) -> &str {
        self.header_str(CONTENT_TYPE.as_str()).unwrap_or("")
    }

    /// Declared content length as sent, `None` when absent or empty
    pub fn content_length(&self) -> Option<&str> {
        self.header_str(CONTENT_LENGTH.as_str())
            .filter(|value| !value.is_empty())
    }

    /// Record a resolved size so later readers see a consistent value
    pub fn set_content_length(&mut self, size: u64) {
        self.headers.insert(CONTENT_LENGTH, HeaderValue::from(size));
    }

    fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Extract the file part named `field` from a multipart request.
///
/// A part with the right name but no filename is a plain form value, not a
/// file, and is reported as [`FormError::MissingFile`] just like an absent
/// field.
pub async fn form_file<B>(
    req: Request<B>,
    field: &str,
    memory_limit: usize,
) -> Result<(UploadFile, FileHeader), FormError>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or(FormError::NotMultipart)?;
    if !content_type
        .to_ascii_lowercase()
        .starts_with("multipart/form-data")
    {
        return Err(FormError::NotMultipart);
    }
    let boundary = multer::parse_boundary(content_type)?;

    let stream = req.into_body().into_data_stream();
    let mut multipart = multer::Multipart::new(stream, boundary);

    while let Some(mut part) = multipart.next_field().await? {
        if part.name() != Some(field) {
            continue;
        }
        let filename = match part.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => continue,
        };
        let headers = part.headers().clone();

        let mut spooler = Spooler::new(memory_limit);
        while let Some(chunk) = part.chunk().await? {
            spooler = spool_chunk(spooler, chunk).await?;
        }
        let file = finish_spool(spooler).await?;

        tracing::debug!(
            field = field,
            filename = %filename,
            in_memory = file.is_in_memory(),
            "Extracted file part"
        );

        return Ok((file, FileHeader::new(field, filename, headers)));
    }

    Err(FormError::MissingFile(field.to_string()))
}

/// Append `chunk`, running file I/O on the blocking pool once spilled
async fn spool_chunk(mut spooler: Spooler, chunk: Bytes) -> io::Result<Spooler> {
    if !spooler.needs_disk(chunk.len()) {
        spooler.write(&chunk)?;
        return Ok(spooler);
    }

    tokio::task::spawn_blocking(move || -> io::Result<Spooler> {
        spooler.write(&chunk)?;
        Ok(spooler)
    })
    .await
    .map_err(io::Error::other)?
}

async fn finish_spool(spooler: Spooler) -> io::Result<UploadFile> {
    if !spooler.needs_disk(0) {
        return spooler.finish();
    }

    tokio::task::spawn_blocking(move || spooler.finish())
        .await
        .map_err(io::Error::other)?
}
