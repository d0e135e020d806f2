//! Object transport abstraction
//!
//! The block cache consumes an [`ObjectClient`] for head and ranged get
//! requests. Retries, timeouts and connection pooling belong to the client;
//! the cache surfaces whatever the client returns.

pub mod memory;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use s3accel_common::{Error, ObjectMetadata, ObjectUri, Result};

use crate::range::Range;

pub use memory::InMemoryObjectClient;

/// Client for an immutable object store
#[async_trait]
pub trait ObjectClient: Send + Sync + 'static {
    /// Fetch the object's metadata
    async fn head_object(&self, uri: &ObjectUri) -> Result<ObjectMetadata>;

    /// Fetch the object's bytes, optionally restricted to `range`
    async fn get_object(&self, uri: &ObjectUri, range: Option<Range>) -> Result<ObjectContent>;
}

/// Body of a get request, delivered as a stream of chunks
///
/// Dropping the content releases the underlying transport resources.
pub struct ObjectContent {
    stream: BoxStream<'static, Result<Bytes>>,
}

impl ObjectContent {
    /// Wrap a chunk stream
    #[must_use]
    pub fn new(stream: BoxStream<'static, Result<Bytes>>) -> Self {
        Self { stream }
    }

    /// Content that is already fully in memory
    #[must_use]
    pub fn from_bytes(data: Bytes) -> Self {
        Self::new(stream::once(async move { Ok(data) }).boxed())
    }

    /// Drain the stream into one buffer.
    ///
    /// When `expected_len` is given, a body of any other length is an error.
    pub async fn collect(mut self, expected_len: Option<u64>) -> Result<Bytes> {
        let capacity = expected_len
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or_default();
        let mut buffer = BytesMut::with_capacity(capacity);

        while let Some(chunk) = self.stream.next().await {
            buffer.extend_from_slice(&chunk?);
        }

        if let Some(expected) = expected_len {
            let actual = buffer.len() as u64;
            if actual != expected {
                return Err(Error::ShortRead { expected, actual });
            }
        }

        Ok(buffer.freeze())
    }
}

impl std::fmt::Debug for ObjectContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectContent").finish_non_exhaustive()
    }
}
