//! HTTP storage backend for cloudup.
//!
//! [`HttpBackend`] implements [`StorageBackend`](cloudup_ops::StorageBackend)
//! against the storage server's REST API:
//!
//! - `GET {server}/folders/check-exists?name=&parentPath=` answers `{"exists": bool}`
//! - `POST {server}/files/upload` takes a multipart form with the streamed
//!   `file` plus `path`, `conflictAction` and `customName` fields
//!
//! # Example
//!
//! ```no_run
//! use cloudup_api::{ClientConfig, HttpBackend};
//! use cloudup_core::UploadConfig;
//! use cloudup_ops::UploadOrchestrator;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = HttpBackend::new(&ClientConfig::new("https://files.example.com/api"))?;
//! let orchestrator = UploadOrchestrator::new(backend, UploadConfig::default());
//! # Ok(())
//! # }
//! ```

mod client;
mod config;

pub use client::HttpBackend;
pub use config::{ClientConfig, DEFAULT_USER_AGENT};
