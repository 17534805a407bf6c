//! Object-storage collaborator for jobflow.
//!
//! Failed steps leave their stderr, gzip-compressed, in object storage. This
//! crate provides what the status path needs to reach it:
//!
//! - [`S3Path`]: parsing of fully qualified `scheme://bucket/key` paths
//! - [`ObjectStore`]: the read interface, with an HTTP implementation
//!   ([`HttpObjectStore`]) and, behind the `test-utils` feature, an in-memory
//!   one (`MemoryObjectStore`)
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use jobflow_storage::{HttpObjectStore, ObjectStore, S3Path};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = HttpObjectStore::new("https://s3.us-east-1.amazonaws.com", Duration::from_secs(30))?;
//! let path = S3Path::parse("s3://my-logs/j-123/steps/s-456/")?.with_key_suffix("stderr.gz");
//!
//! let bytes = store.get_object(&path.bucket, &path.key).await?;
//! println!("{} bytes", bytes.len());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod path;
pub mod store;

pub use error::{Result, StorageError};
pub use path::S3Path;
pub use store::{HttpObjectStore, ObjectStore};

#[cfg(any(test, feature = "test-utils"))]
pub use store::mock::MemoryObjectStore;
