//! S3 bucket adapter
//!
//! Implements [`Uploader`] on top of `aws-sdk-s3` for AWS and S3-compatible
//! stores (MinIO, RustFS, ...).
//!
//! Construction provisions the bucket lazily: a `HeadBucket` probe, followed
//! by `CreateBucket` with the `public-read` ACL when the probe fails. Objects
//! are written with `PutObject` and the same ACL. The SDK's own retries are
//! disabled.
//!
//! # Example
//!
//! ```no_run
//! use wave_uploadr::config::S3Config;
//! use wave_uploadr::s3::S3Bucket;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = S3Config {
//!     bucket: "avatars".to_string(),
//!     region: "us-east-1".to_string(),
//!     endpoint: Some("http://localhost:9000".to_string()),
//!     access_key: Some("minioadmin".to_string()),
//!     secret_key: Some("minioadmin".to_string()),
//!     create_bucket: true,
//! };
//!
//! let bucket = S3Bucket::new(config).await?;
//! let uploader = bucket.uploader();
//! # Ok(())
//! # }
//! ```

mod credentials;

pub use credentials::{
    Credentials, CredentialsError, CredentialsProvider, ACCESS_KEY_VAR, SECRET_KEY_VAR,
};

use crate::config::S3Config;
use crate::metrics;
use crate::upload::{
    FileHeader, StorageError, UploadError, UploadFile, UploadOptions, Uploader, ValidationErrors,
};
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Region, RequestChecksumCalculation, ResponseChecksumValidation};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketCannedAcl, BucketLocationConstraint, CreateBucketConfiguration, ObjectCannedAcl,
};
use aws_sdk_s3::Client;
use std::time::Instant;
use thiserror::Error;

/// S3 adapter errors
#[derive(Error, Debug)]
pub enum S3Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to create bucket '{bucket}': {message}")]
    CreateBucket { bucket: String, message: String },
}

impl From<CredentialsError> for S3Error {
    fn from(e: CredentialsError) -> Self {
        S3Error::ConfigError(e.to_string())
    }
}

/// A provisioned S3 bucket
#[derive(Clone)]
pub struct S3Bucket {
    client: Client,
    config: S3Config,
}

impl S3Bucket {
    /// Connect to the configured bucket, creating it when `create_bucket` is
    /// set and it does not exist yet
    pub async fn new(config: S3Config) -> Result<Self, S3Error> {
        let client = Self::build_client(&config).await?;
        let bucket = Self { client, config };

        if bucket.config.create_bucket {
            bucket.ensure_exists().await?;
        }

        Ok(bucket)
    }

    async fn build_client(config: &S3Config) -> Result<Client, S3Error> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .retry_config(RetryConfig::disabled());

        if let Some(creds) = CredentialsProvider::from_config(config)? {
            loader = loader.credentials_provider(aws_credential_types::Credentials::from(creds));
        }
        if let Some(ref endpoint) = config.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            // Custom endpoints (MinIO etc.) rarely support virtual-hosted buckets
            .force_path_style(config.endpoint.is_some())
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .response_checksum_validation(ResponseChecksumValidation::WhenRequired)
            .build();

        Ok(Client::from_conf(s3_config))
    }

    #[tracing::instrument(
        name = "s3.ensure_bucket",
        skip(self),
        fields(s3.bucket = %self.config.bucket),
        err
    )]
    async fn ensure_exists(&self) -> Result<(), S3Error> {
        let name = &self.config.bucket;

        match self.client.head_bucket().bucket(name).send().await {
            Ok(_) => {
                tracing::debug!("Bucket exists");
                return Ok(());
            }
            Err(e) => {
                tracing::info!(
                    error = %DisplayErrorContext(&e),
                    "Bucket not reachable, creating it"
                );
            }
        }

        let mut request = self
            .client
            .create_bucket()
            .bucket(name)
            .acl(BucketCannedAcl::PublicRead);

        // us-east-1 is the implicit location and must not be sent
        if self.config.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(
                        self.config.region.as_str(),
                    ))
                    .build(),
            );
        }

        request.send().await.map_err(|e| S3Error::CreateBucket {
            bucket: name.clone(),
            message: DisplayErrorContext(&e).to_string(),
        })?;

        tracing::info!("Created bucket");
        Ok(())
    }

    /// Get the bucket name
    pub fn name(&self) -> &str {
        &self.config.bucket
    }

    /// Get the region
    pub fn region(&self) -> &str {
        &self.config.region
    }

    /// Underlying SDK client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Uploader with the default options: field `File`, no validation rules
    pub fn uploader(&self) -> S3Uploader {
        self.uploader_with(UploadOptions::default())
    }

    /// Uploader with explicit field name, rules and spool size
    pub fn uploader_with(&self, options: UploadOptions) -> S3Uploader {
        S3Uploader {
            client: self.client.clone(),
            bucket: self.config.bucket.clone(),
            options,
        }
    }
}

/// [`Uploader`] writing objects into one S3 bucket
///
/// Objects are keyed by the client-supplied filename.
#[derive(Clone)]
pub struct S3Uploader {
    client: Client,
    bucket: String,
    options: UploadOptions,
}

impl S3Uploader {
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl Uploader for S3Uploader {
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
        name = "s3.put_object",
        skip(self, file),
        fields(
            s3.bucket = %self.bucket,
            s3.key = %path,
            upload.bytes = size,
            s3.etag = tracing::field::Empty
        ),
        err
    )]
    async fn put(
        &self,
        path: &str,
        file: UploadFile,
        size: u64,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let start_time = Instant::now();

        // `file` owns the spilled temp file and must outlive the request
        let body = if let Some(bytes) = file.as_bytes() {
            ByteStream::from(bytes.clone())
        } else if let Some(spooled) = file.path() {
            ByteStream::from_path(spooled)
                .await
                .map_err(|e| StorageError::Upload(e.to_string()))?
        } else {
            return Err(StorageError::Upload("upload has no backing data".into()));
        };

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(body)
            .content_length(size as i64)
            .acl(ObjectCannedAcl::PublicRead);
        if !content_type.is_empty() {
            request = request.content_type(content_type);
        }

        let result = request.send().await;
        metrics::record_upload_duration(&self.bucket, start_time.elapsed().as_secs_f64());

        match result {
            Ok(output) => {
                let etag = output.e_tag().unwrap_or_default();
                tracing::Span::current().record("s3.etag", etag);
                metrics::record_upload_bytes(size);

                tracing::info!(
                    etag = %etag,
                    duration_ms = start_time.elapsed().as_millis(),
                    "PutObject completed"
                );
                Ok(())
            }
            Err(e) => {
                metrics::record_error("s3_put_object");
                let message = DisplayErrorContext(&e).to_string();
                tracing::error!(
                    error = %message,
                    duration_ms = start_time.elapsed().as_millis(),
                    "PutObject failed"
                );
                Err(StorageError::Upload(message))
            }
        }
    }

    fn memory_limit(&self) -> usize {
        self.options.memory_limit
    }
}
