//! Upload module
//!
//! Extracts one file from a multipart request, resolves its size, runs the
//! storage target's validators and, only when they all pass, hands the file
//! to the target's `put`.
//!
//! Validation failures and operational errors travel on separate channels:
//! the former come back as [`ValidationErrors`] inside `Ok`, the latter as
//! [`UploadError`].
//!
//! # Example
//!
//! ```no_run
//! use wave_uploadr::s3::S3Bucket;
//! use wave_uploadr::config::S3Config;
//! use wave_uploadr::upload::upload;
//! use hyper::{body::Incoming, Request};
//!
//! # async fn handle(req: Request<Incoming>, config: S3Config) -> anyhow::Result<()> {
//! let bucket = S3Bucket::new(config).await?;
//! let errors = upload(req, &bucket.uploader()).await?;
//! if errors.has_any() {
//!     println!("rejected: {}", errors);
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use hyper::body::Body;
use hyper::Request;
use std::io::{Seek, SeekFrom};
use thiserror::Error;

pub mod form;
pub mod spool;
pub mod validate;
pub mod validators;

pub use form::{FileHeader, FormError};
pub use spool::UploadFile;
pub use validate::{ValidationErrors, Validator};
pub use validators::{humanize_bytes, FileTypeValidator, MaxFileSizeValidator, UploadRules};

/// Storage adapter errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Upload pipeline errors
///
/// These are operational failures. A file that fails validation is not an
/// error; see [`upload`].
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("failed to read form file: {0}")]
    Form(#[from] FormError),

    #[error("invalid content length '{0}'")]
    InvalidContentLength(String),

    #[error("failed to determine file size: {0}")]
    Io(#[from] std::io::Error),

    #[error("validation could not run: {0}")]
    Validate(String),

    #[error("failed to store file: {0}")]
    Storage(#[from] StorageError),
}

/// A storage target able to receive validated uploads
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Form field holding the file
    fn field_name(&self) -> &str;

    /// Destination path for a file
    fn path(&self, header: &FileHeader) -> String;

    /// Check a file before it is stored.
    ///
    /// Return validation messages in `Ok`; reserve `Err` for checks that
    /// could not run at all.
    fn validate(&self, header: &FileHeader) -> Result<ValidationErrors, UploadError>;

    /// Persist `file` at `path`
    async fn put(
        &self,
        path: &str,
        file: UploadFile,
        size: u64,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// In-memory buffer size used when spooling the file part
    fn memory_limit(&self) -> usize {
        form::DEFAULT_MEMORY_LIMIT
    }
}

/// Field name, rules and spool size shared by the storage adapters
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOptions {
    pub field_name: String,
    pub rules: UploadRules,
    pub memory_limit: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            field_name: "File".to_string(),
            rules: UploadRules::default(),
            memory_limit: form::DEFAULT_MEMORY_LIMIT,
        }
    }
}

impl From<&crate::config::UploadConfig> for UploadOptions {
    fn from(config: &crate::config::UploadConfig) -> Self {
        Self {
            field_name: config.field_name.clone(),
            rules: config.rules.clone(),
            memory_limit: config.memory_limit,
        }
    }
}

/// Validate the uploader's file field from `req` and store it.
///
/// Returns:
/// - `Ok(empty)` when no file was attached (nothing is stored)
/// - `Ok(errors)` when validation failed (nothing is stored)
/// - `Ok(empty)` after a successful `put`
/// - `Err(_)` for extraction, sizing, validation-hook or storage failures
#[tracing::instrument(
    name = "upload",
    skip(req, uploader),
    fields(
        upload.field = %uploader.field_name(),
        upload.path = tracing::field::Empty,
        upload.bytes = tracing::field::Empty
    ),
    err
)]
pub async fn upload<B, U>(req: Request<B>, uploader: &U) -> Result<ValidationErrors, UploadError>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    U: Uploader + ?Sized,
{
    let field = uploader.field_name();
    let (mut file, mut header) = match form::form_file(req, field, uploader.memory_limit()).await
    {
        Ok(found) => found,
        Err(FormError::MissingFile(_)) => {
            tracing::debug!(field = field, "No file attached, skipping upload");
            return Ok(ValidationErrors::new());
        }
        Err(e) => return Err(e.into()),
    };

    let size = match header.content_length() {
        Some(declared) => declared
            .parse::<u64>()
            .map_err(|_| UploadError::InvalidContentLength(declared.to_string()))?,
        None => {
            let size = resolve_size(&mut file)?;
            header.set_content_length(size);
            size
        }
    };
    tracing::Span::current().record("upload.bytes", size);

    let errors = uploader.validate(&header)?;
    if errors.has_any() {
        tracing::info!(
            filename = %header.filename(),
            errors = errors.count(),
            "Upload rejected by validation"
        );
        return Ok(errors);
    }

    let path = uploader.path(&header);
    tracing::Span::current().record("upload.path", path.as_str());

    uploader
        .put(&path, file, size, header.content_type())
        .await?;

    tracing::info!(path = %path, bytes = size, "Upload stored");
    Ok(errors)
}

/// Size of a seekable stream, leaving it rewound to the start
pub fn resolve_size<S: Seek + ?Sized>(stream: &mut S) -> std::io::Result<u64> {
    let size = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(0))?;
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor, Read};

    struct BrokenSeek;

    impl Seek for BrokenSeek {
        fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "not seekable"))
        }
    }

    #[test]
    fn test_resolve_size_rewinds() {
        let mut stream = Cursor::new(vec![7u8; 2048]);
        stream.set_position(100);

        assert_eq!(resolve_size(&mut stream).unwrap(), 2048);
        assert_eq!(stream.position(), 0);

        let mut all = Vec::new();
        stream.read_to_end(&mut all).unwrap();
        assert_eq!(all.len(), 2048);
    }

    #[test]
    fn test_resolve_size_propagates_seek_error() {
        let err = resolve_size(&mut BrokenSeek).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);

        let err: UploadError = err.into();
        assert!(matches!(err, UploadError::Io(_)));
    }

    #[test]
    fn test_resolve_size_spooled_file() {
        let mut file = UploadFile::from_bytes(vec![1u8; 300]);
        assert_eq!(resolve_size(&mut file).unwrap(), 300);
        assert_eq!(file.into_bytes().unwrap().len(), 300);
    }
}
