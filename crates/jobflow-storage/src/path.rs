//! Fully qualified object paths (`scheme://bucket/key`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

/// A parsed `scheme://bucket/key` object path.
///
/// The bucket is the first path segment after the scheme; the key is the
/// remainder verbatim, so it may be empty (`s3://bucket/`) or a nested
/// prefix (`s3://bucket/a/b/`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct S3Path {
    /// URI scheme without the `://` separator, e.g. `s3`.
    pub scheme: String,
    /// Bucket name.
    pub bucket: String,
    /// Object key (possibly empty).
    pub key: String,
}

impl S3Path {
    /// Parse a fully qualified object path.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidPath` if the scheme separator is missing,
    /// the scheme is not alphanumeric, or the bucket is empty.
    pub fn parse(path: &str) -> Result<Self> {
        let invalid = |reason| StorageError::InvalidPath {
            path: path.to_string(),
            reason,
        };

        let (scheme, rest) = path
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme separator"))?;

        if scheme.is_empty()
            || !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(invalid("invalid scheme"));
        }

        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(invalid("empty bucket"));
        }

        Ok(Self {
            scheme: scheme.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// Return a copy of this path whose key ends with `suffix`.
    ///
    /// The suffix is appended verbatim, so a directory-like key
    /// (`logs/step/`) becomes `logs/step/<suffix>`. A key that already ends
    /// with the suffix is left alone.
    #[must_use]
    pub fn with_key_suffix(&self, suffix: &str) -> Self {
        let mut path = self.clone();
        if !path.key.ends_with(suffix) {
            path.key.push_str(suffix);
        }
        path
    }
}

impl fmt::Display for S3Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.key)
    }
}

impl FromStr for S3Path {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_nested_key() {
        let path = S3Path::parse("s3://some-bucket/a/b/c").unwrap();
        assert_eq!(path.scheme, "s3");
        assert_eq!(path.bucket, "some-bucket");
        assert_eq!(path.key, "a/b/c");
    }

    #[test]
    fn parse_roundtrips() {
        for original in [
            "s3://some-bucket/a/b/c",
            "s3://logs/j-123/steps/s-456/",
            "s3://bucket/",
            "s3a://bucket/file.txt",
            "gs://bucket/with//double/slash",
        ] {
            let path = S3Path::parse(original).unwrap();
            assert_eq!(
                format!("{}://{}/{}", path.scheme, path.bucket, path.key),
                original
            );
            assert_eq!(path.to_string(), original);
        }
    }

    #[test]
    fn parse_empty_key() {
        let path = S3Path::parse("s3://bucket/").unwrap();
        assert_eq!(path.bucket, "bucket");
        assert_eq!(path.key, "");

        let bare = S3Path::parse("s3://bucket").unwrap();
        assert_eq!(bare.bucket, "bucket");
        assert_eq!(bare.key, "");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(S3Path::parse("bucket/key").is_err());
        assert!(S3Path::parse("://bucket/key").is_err());
        assert!(S3Path::parse("s3:///key").is_err());
        assert!(S3Path::parse("s 3://bucket/key").is_err());
    }

    #[test]
    fn key_suffix_appended_to_directory() {
        let path = S3Path::parse("s3://logs/j-1/steps/s-1/").unwrap();
        let log = path.with_key_suffix("stderr.gz");
        assert_eq!(log.key, "j-1/steps/s-1/stderr.gz");
        assert_eq!(log.bucket, "logs");
    }

    #[test]
    fn key_suffix_not_duplicated() {
        let path = S3Path::parse("s3://logs/j-1/steps/s-1/stderr.gz").unwrap();
        let log = path.with_key_suffix("stderr.gz");
        assert_eq!(log.key, "j-1/steps/s-1/stderr.gz");
    }
}
