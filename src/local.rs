//! Local directory adapter
//!
//! Stores uploads under a root directory, keyed by the client-supplied
//! filename. Handy for development and for deployments without an object
//! store.

use crate::config::LocalConfig;
use crate::metrics;
use crate::upload::{
    FileHeader, StorageError, UploadError, UploadFile, UploadOptions, Uploader, ValidationErrors,
};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;
use tokio::fs;

/// A directory receiving uploads
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    root: PathBuf,
    options: UploadOptions,
}

impl LocalDirectory {
    /// Open `root`, creating it when missing
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();

        fs::create_dir_all(&root).await.map_err(|e| {
            StorageError::Config(format!(
                "Failed to create storage directory {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(Self {
            root,
            options: UploadOptions::default(),
        })
    }

    /// Open the directory named by a [`LocalConfig`]
    pub async fn from_config(config: &LocalConfig) -> Result<Self, StorageError> {
        Self::new(config.root.clone()).await
    }

    /// Replace field name, rules and spool size
    pub fn with_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a storage path below the root, refusing traversal
    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let escapes = Path::new(path).components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if path.is_empty() || escapes || path.contains('\\') {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl Uploader for LocalDirectory {
    fn field_name(&self) -> &str {
        &self.options.field_name
    }

    fn path(&self, header: &FileHeader) -> String {
        header.filename().to_string()
    }

    fn validate(&self, header: &FileHeader) -> Result<ValidationErrors, UploadError> {
        Ok(self.options.rules.validate(&self.options.field_name, header))
    }

    #[tracing::instrument(
        name = "local.put",
        skip(self, file, content_type),
        fields(local.root = %self.root.display(), upload.bytes = size),
        err
    )]
    async fn put(
        &self,
        path: &str,
        file: UploadFile,
        size: u64,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let target = self.resolve(path)?;
        let start = Instant::now();

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let written = if let Some(bytes) = file.as_bytes() {
            fs::write(&target, bytes).await?;
            bytes.len() as u64
        } else if let Some(spooled) = file.path() {
            fs::copy(spooled, &target).await?
        } else {
            return Err(StorageError::Upload("upload has no backing data".into()));
        };

        metrics::record_upload_duration("local", start.elapsed().as_secs_f64());
        metrics::record_upload_bytes(written);

        if written != size {
            tracing::warn!(
                declared = size,
                written = written,
                "Stored size differs from declared size"
            );
        }

        tracing::info!(
            path = %target.display(),
            size_bytes = written,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local upload stored"
        );

        Ok(())
    }

    fn memory_limit(&self) -> usize {
        self.options.memory_limit
    }
}
