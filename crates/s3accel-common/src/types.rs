//! Core type definitions for s3accel
//!
//! Object identity (bucket, key, URI) and the head-request metadata the block
//! cache consults to find the end of an object.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// URI scheme accepted by [`ObjectUri::parse`]
pub const S3_URI_SCHEME: &str = "s3";

/// Bucket names accepted by S3: 3 to 63 bytes
const BUCKET_NAME_LEN: std::ops::RangeInclusive<usize> = 3..=63;

/// Longest object key S3 stores, in UTF-8 bytes
const MAX_OBJECT_KEY_BYTES: usize = 1024;

/// Name of the bucket holding an object
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct BucketName(String);

impl BucketName {
    /// Validate `name` against the S3 bucket naming rules
    pub fn new(name: impl Into<String>) -> Result<Self, BucketNameError> {
        let name = name.into();
        check_bucket_name(&name)?;
        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn check_bucket_name(name: &str) -> Result<(), BucketNameError> {
    if !BUCKET_NAME_LEN.contains(&name.len()) {
        return Err(BucketNameError::Length(name.len()));
    }

    let bytes = name.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let mut prev = 0u8;
    for (i, &b) in bytes.iter().enumerate() {
        let edge = i == 0 || i == bytes.len() - 1;
        match b {
            _ if alnum(b) => {}
            b'-' | b'.' if edge => return Err(BucketNameError::Edge(char::from(b))),
            b'.' if prev == b'.' => return Err(BucketNameError::AdjacentPeriods),
            b'-' | b'.' => {}
            _ => {
                let c = name[i..].chars().next().unwrap_or(char::REPLACEMENT_CHARACTER);
                return Err(BucketNameError::Char(c));
            }
        }
        prev = b;
    }

    if name.parse::<std::net::Ipv4Addr>().is_ok() {
        return Err(BucketNameError::IpAddress);
    }
    Ok(())
}

impl fmt::Debug for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BucketName({:?})", self.0)
    }
}

/// Why a string is not a valid bucket name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BucketNameError {
    #[error("length {0} is outside 3..=63")]
    Length(usize),
    #[error("'{0}' cannot start or end a bucket name")]
    Edge(char),
    #[error("'{0}' is not allowed in a bucket name")]
    Char(char),
    #[error("'..' is not allowed in a bucket name")]
    AdjacentPeriods,
    #[error("bucket name looks like an IPv4 address")]
    IpAddress,
}

/// Key of an object within its bucket
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn new(key: impl Into<String>) -> Result<Self, ObjectKeyError> {
        let key = key.into();
        match key.len() {
            0 => Err(ObjectKeyError::Empty),
            len if len > MAX_OBJECT_KEY_BYTES => Err(ObjectKeyError::TooLong(len)),
            _ => Ok(Self(key)),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey({:?})", self.0)
    }
}

/// Why a string is not a valid object key
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectKeyError {
    #[error("object key is empty")]
    Empty,
    #[error("object key is {0} bytes, the limit is 1024")]
    TooLong(usize),
}

/// Location of an immutable object: `s3://bucket/key`
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize, Display)]
#[display("s3://{bucket}/{key}")]
pub struct ObjectUri {
    bucket: BucketName,
    key: ObjectKey,
}

impl ObjectUri {
    /// Create a URI from validated parts
    #[must_use]
    pub const fn new(bucket: BucketName, key: ObjectKey) -> Self {
        Self { bucket, key }
    }

    /// Create a URI, validating the bucket and key
    pub fn of(bucket: impl Into<String>, key: impl Into<String>) -> Result<Self, Error> {
        Ok(Self::new(BucketName::new(bucket)?, ObjectKey::new(key)?))
    }

    /// Parse a `s3://bucket/key` string
    pub fn parse(uri: &str) -> Result<Self, Error> {
        let rest = uri
            .strip_prefix(S3_URI_SCHEME)
            .and_then(|r| r.strip_prefix("://"))
            .ok_or_else(|| Error::InvalidUri(format!("{uri}: expected s3:// scheme")))?;

        let (bucket, key) = rest
            .split_once('/')
            .ok_or_else(|| Error::InvalidUri(format!("{uri}: missing object key")))?;

        Self::of(bucket, key)
    }

    #[must_use]
    pub const fn bucket(&self) -> &BucketName {
        &self.bucket
    }

    #[must_use]
    pub const fn key(&self) -> &ObjectKey {
        &self.key
    }
}

impl FromStr for ObjectUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Result of a head request. Objects are immutable, so this never changes
/// once fetched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Object size in bytes
    pub content_length: u64,
    /// Entity tag, when the store reports one
    pub etag: Option<String>,
}

impl ObjectMetadata {
    #[must_use]
    pub const fn new(content_length: u64) -> Self {
        Self {
            content_length,
            etag: None,
        }
    }

    /// Set the entity tag
    #[must_use]
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }
}
