//! Object store bindings.
//!
//! This module provides the [`ObjectStore`] trait and an HTTP implementation
//! using path-style requests (`GET {endpoint}/{bucket}/{key}`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use tracing::debug;

use crate::error::{Result, StorageError};

/// Read access to object storage.
///
/// Only the single operation the diagnostic path needs is modelled; listing,
/// copying and deleting objects are handled elsewhere.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the full contents of an object.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the object does not exist, and
    /// another variant for any other failure.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
}

/// Path-style HTTP object store client.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpObjectStore {
    /// Create a new client for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Config` if the endpoint is not a valid base URL
    /// or the HTTP client cannot be built.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| StorageError::Config(format!("failed to create HTTP client: {e}")))?;

        Self::with_client(client, endpoint)
    }

    /// Create a new client with a custom reqwest client.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Config` if the endpoint is not a valid base URL.
    pub fn with_client(client: reqwest::Client, endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| StorageError::Config(format!("invalid endpoint {endpoint:?}: {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(StorageError::Config(format!(
                "endpoint {endpoint} cannot be used as a base URL"
            )));
        }

        Ok(Self { client, endpoint })
    }

    /// Get the endpoint of the storage service.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn object_url(&self, bucket: &str, key: &str) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| StorageError::Config("endpoint cannot be a base URL".to_string()))?
            .pop_if_empty()
            .push(bucket)
            .extend(key.split('/'));
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let url = self.object_url(bucket, key)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body = response
                .bytes()
                .await
                .map_err(|e| StorageError::Request(e.to_string()))?;
            debug!(bucket, key, bytes = body.len(), "Fetched object");
            return Ok(body.to_vec());
        }

        let not_found = || StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };

        if status == StatusCode::NOT_FOUND {
            return Err(not_found());
        }

        let body = response.text().await.unwrap_or_default();
        if body.contains("<Code>NoSuchKey</Code>") {
            return Err(not_found());
        }

        Err(StorageError::Service {
            status: status.as_u16(),
            message: if body.is_empty() {
                status.to_string()
            } else {
                body
            },
        })
    }
}

/// An in-memory object store for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// An object store backed by a map, with injectable failures.
    #[derive(Debug, Default)]
    pub struct MemoryObjectStore {
        objects: Mutex<HashMap<(String, String), Vec<u8>>>,
        failures: Mutex<HashMap<(String, String), StorageError>>,
        gets: Mutex<Vec<(String, String)>>,
    }

    impl MemoryObjectStore {
        /// Create an empty store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Store an object.
        pub fn put(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) {
            self.objects
                .lock()
                .insert((bucket.to_string(), key.to_string()), body.into());
        }

        /// Make every read of the given object fail with `error`.
        pub fn fail_with(&self, bucket: &str, key: &str, error: StorageError) {
            self.failures
                .lock()
                .insert((bucket.to_string(), key.to_string()), error);
        }

        /// Every `(bucket, key)` read so far, in order.
        #[must_use]
        pub fn requested(&self) -> Vec<(String, String)> {
            self.gets.lock().clone()
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryObjectStore {
        async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
            let lookup = (bucket.to_string(), key.to_string());
            self.gets.lock().push(lookup.clone());

            if let Some(error) = self.failures.lock().get(&lookup) {
                return Err(error.clone());
            }

            self.objects
                .lock()
                .get(&lookup)
                .cloned()
                .ok_or_else(|| StorageError::NotFound {
                    bucket: lookup.0,
                    key: lookup.1,
                })
        }
    }
}
