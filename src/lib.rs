//! Wave Uploadr Library
//!
//! Validated multipart uploads to pluggable storage.
//!
//! # Features
//!
//! - **One-call pipeline**: [`upload::upload`] extracts, sizes, validates and
//!   stores a single form file
//! - **Pluggable storage**: anything implementing [`upload::Uploader`]; S3 and
//!   local-directory adapters are included
//! - **Validators**: file type allow-lists and size limits with field-keyed,
//!   human-readable messages
//!
//! # Example
//!
//! ```no_run
//! use wave_uploadr::{config::Config, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let server = Server::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod local;
pub mod metrics;
pub mod s3;
pub mod server;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use server::Server;
pub use upload::{upload, UploadError, Uploader, ValidationErrors};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
